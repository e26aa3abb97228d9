use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::enums::Role;
use crate::models::user::User;

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, full_name, role, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.id,
            user.full_name,
            user.role.as_str(),
            user.is_active as i32,
            user.created_at.to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &str) -> Result<Option<User>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, full_name, role, is_active, created_at FROM users WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i32>(3)?,
            row.get::<_, String>(4)?,
        ))
    });

    match result {
        Ok((id, full_name, role, is_active, created_at)) => Ok(Some(User {
            id,
            full_name,
            role: Role::from_str(&role)?,
            is_active: is_active != 0,
            created_at: NaiveDateTime::parse_from_str(&created_at, "%Y-%m-%d %H:%M:%S")
                .unwrap_or_default(),
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
