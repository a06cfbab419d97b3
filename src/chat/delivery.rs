//! Routing of committed chat events to live connections and, for offline
//! recipients, to the notification store.

use crate::chat::{ConversationSummary, MessageBody};
use crate::notify::{fanout, NotificationKind};
use crate::state::AppState;
use crate::ws::events::ServerEvent;

const PREVIEW_LEN: usize = 80;

fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_LEN {
        return content.to_string();
    }
    let truncated: String = content.chars().take(PREVIEW_LEN).collect();
    format!("{}…", truncated)
}

/// Push a freshly committed message to every other participant. Online
/// recipients get the message on all their handles; offline recipients get a
/// persisted notification so the message isn't silently missed.
pub async fn deliver_new_message(
    state: &AppState,
    message: &MessageBody,
    summary: &ConversationSummary,
    recipients: &[String],
) {
    for recipient in recipients {
        if state.connections.is_online(recipient) {
            state.connections.send_to_user(
                recipient,
                &ServerEvent::NewMessage {
                    message: message.clone(),
                    conversation: summary.clone(),
                },
            );
        } else {
            fanout::notify_best_effort(
                state,
                recipient,
                &format!("New message from {}", message.sender_name),
                &preview(&message.content),
                NotificationKind::Message,
                Some(message.conversation_id.clone()),
            )
            .await;
        }
    }
}

/// Push a read receipt to the other participants' live handles. Offline
/// participants get nothing; receipts are ephemeral.
pub fn deliver_read_receipt(
    state: &AppState,
    conversation_id: &str,
    reader_id: &str,
    recipients: &[String],
) {
    for recipient in recipients {
        state.connections.send_to_user(
            recipient,
            &ServerEvent::ReadReceipt {
                conversation_id: conversation_id.to_string(),
                user_id: reader_id.to_string(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_keeps_short_content() {
        assert_eq!(preview("hello"), "hello");
    }

    #[test]
    fn preview_truncates_long_content() {
        let long = "x".repeat(200);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_LEN + 1);
        assert!(p.ends_with('…'));
    }
}
