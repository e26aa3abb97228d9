use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

/// The authenticated identity behind a lifecycle call.
///
/// Supplied explicitly by the caller on every operation — the core never
/// reads an ambient "current user" from session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}
