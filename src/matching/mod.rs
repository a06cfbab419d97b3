//! Match coordination between needs and offers.
//!
//! A match pairs a need and/or an offer and walks a small state machine.
//! The coordinator is the only writer of need status and the offer helped
//! counter; both change only as cascades of match transitions.

pub mod coordinator;
pub mod state;

use serde::Serialize;

use crate::db::models::MatchRow;

/// Match record as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct MatchBody {
    pub id: String,
    pub need_id: Option<String>,
    pub offer_id: Option<String>,
    pub initiated_by: String,
    pub responded_by: Option<String>,
    pub message: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<MatchRow> for MatchBody {
    fn from(row: MatchRow) -> Self {
        Self {
            id: row.id,
            need_id: row.need_id,
            offer_id: row.offer_id,
            initiated_by: row.initiated_by,
            responded_by: row.responded_by,
            message: row.message,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
