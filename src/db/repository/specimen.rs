use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::specimen::SpecimenType;

/// All specimen types, alphabetical.
pub fn list_specimen_types(conn: &Connection) -> Result<Vec<SpecimenType>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id, name FROM specimen_types ORDER BY name")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(SpecimenType {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert a specimen type and return its id.
///
/// The name is unique case-insensitively; a collision surfaces as
/// `ConstraintViolation` so callers can treat it as "already exists".
pub fn insert_specimen_type(conn: &Connection, name: &str) -> Result<i64, DatabaseError> {
    let result = conn.execute(
        "INSERT INTO specimen_types (name) VALUES (?1)",
        params![name],
    );

    match result {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(DatabaseError::ConstraintViolation(format!(
                "specimen type already exists: {name}"
            )))
        }
        Err(e) => Err(e.into()),
    }
}

/// Case-insensitive lookup by name.
pub fn get_specimen_type_by_name(
    conn: &Connection,
    name: &str,
) -> Result<Option<SpecimenType>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id, name FROM specimen_types WHERE name = ?1")?;
    match stmt.query_row(params![name], |row| {
        Ok(SpecimenType {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    }) {
        Ok(specimen) => Ok(Some(specimen)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn delete_specimen_type(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    let rows = conn.execute("DELETE FROM specimen_types WHERE id = ?1", params![id])?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "SpecimenType".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}
