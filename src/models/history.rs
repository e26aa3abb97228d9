use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::HistoryAction;

/// One append-only audit entry against a requisition.
///
/// Timestamps are stamped server-side at append time; retrieval orders by
/// timestamp with the auto-increment id as the tie-breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub id: i64,
    pub uhid: String,
    pub user_id: String,
    pub action: HistoryAction,
    pub comments: Option<String>,
    pub timestamp: NaiveDateTime,
}
