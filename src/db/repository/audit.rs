use std::str::FromStr;

use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::enums::HistoryAction;
use crate::models::history::HistoryEvent;

/// Append one audit entry for a requisition.
///
/// The timestamp is stamped server-side at insert time. There is no update or
/// delete counterpart: history is append-only and removed only by the owning
/// record's cascade. Fails with `NotFound` when the requisition is gone.
pub fn append_history(
    conn: &Connection,
    uhid: &str,
    user_id: &str,
    action: &HistoryAction,
    comments: Option<&str>,
) -> Result<i64, DatabaseError> {
    let result = conn.execute(
        "INSERT INTO form_history (uhid, user_id, action, comments, timestamp)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))",
        params![uhid, user_id, action.as_str(), comments],
    );

    match result {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(DatabaseError::NotFound {
                entity_type: "Requisition".into(),
                id: uhid.to_string(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// All history entries for a record, oldest first.
///
/// Ordered by timestamp with the auto-increment id breaking ties, since the
/// stored timestamps share one-second resolution.
pub fn history_for_record(
    conn: &Connection,
    uhid: &str,
) -> Result<Vec<HistoryEvent>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, uhid, user_id, action, comments, timestamp
         FROM form_history WHERE uhid = ?1
         ORDER BY timestamp, id",
    )?;

    let rows = stmt
        .query_map(params![uhid], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut events = Vec::with_capacity(rows.len());
    for (id, uhid, user_id, action, comments, timestamp) in rows {
        events.push(HistoryEvent {
            id,
            uhid,
            user_id,
            action: HistoryAction::from_str(&action)?,
            comments,
            timestamp: chrono::NaiveDateTime::parse_from_str(&timestamp, "%Y-%m-%d %H:%M:%S")
                .unwrap_or_default(),
        });
    }
    Ok(events)
}

/// Number of history entries for a record.
pub fn history_count(conn: &Connection, uhid: &str) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM form_history WHERE uhid = ?1",
        params![uhid],
        |row| row.get(0),
    )?;
    Ok(count)
}
