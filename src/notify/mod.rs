//! Notification store and fan-out.
//!
//! A notification is always persisted before any push is attempted;
//! delivery to live connections is best-effort on top of that.

pub mod announce;
pub mod crud;
pub mod fanout;

use serde::Serialize;

/// Closed notification type set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Match,
    Message,
    System,
    Offer,
    Announcement,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::Message => "message",
            Self::System => "system",
            Self::Offer => "offer",
            Self::Announcement => "announcement",
        }
    }
}

/// Full notification record, as persisted and as pushed over WebSocket.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationBody {
    pub id: String,
    pub recipient_id: String,
    pub title: String,
    pub description: String,
    pub kind: String,
    pub entity_id: Option<String>,
    pub read: bool,
    pub action_taken: bool,
    pub created_at: String,
}
