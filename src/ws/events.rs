//! Server-to-client event envelopes.
//!
//! Events are adjacently tagged JSON: `{"event": "...", "data": {...}}`.

use serde::Serialize;

use crate::chat::{ConversationSummary, MessageBody};
use crate::notify::NotificationBody;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Sent to all conversation participants except the sender.
    NewMessage {
        message: MessageBody,
        conversation: ConversationSummary,
    },
    /// Sent to all other participants after a batch read flip commits.
    ReadReceipt {
        conversation_id: String,
        user_id: String,
    },
    /// Sent to the recipient's live handles after a notification persists.
    NewNotification { notification: NotificationBody },
    /// Lightweight signal after "mark all read" — no payload.
    NotificationsCleared {},
    /// Broadcast to all connections.
    NewAnnouncement {
        id: String,
        title: String,
        important: bool,
    },
}
