//! Conversation store and message delivery.
//!
//! Conversations are participant-set-unique and never deleted. Messages are
//! append-only; the only mutation is the batch false→true read flip. All
//! read-side payloads (sender names, participant details) are composed at
//! query time from the users table — nothing is denormalized into the
//! conversation rows beyond the last-message cache.

pub mod conversations;
pub mod delivery;
pub mod messages;

use serde::Serialize;

/// Participant details joined in at read time.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantBody {
    pub id: String,
    pub display_name: String,
    pub role: String,
}

/// A message as returned to clients and pushed over WebSocket.
#[derive(Debug, Clone, Serialize)]
pub struct MessageBody {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub read: bool,
    pub seq: i64,
    pub created_at: String,
}

/// Compact conversation state attached to new-message pushes so clients can
/// update their list view without re-fetching.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub participant_ids: Vec<String>,
    pub last_message: Option<String>,
    pub last_message_at: Option<String>,
}

/// Full conversation as returned by the REST surface.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationBody {
    pub id: String,
    pub participants: Vec<ParticipantBody>,
    pub last_message: Option<String>,
    pub last_message_at: Option<String>,
    pub has_unread: bool,
    pub created_at: String,
}
