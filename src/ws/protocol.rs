//! Client-to-server frame dispatch.
//!
//! Frames are JSON: `{"request_id": "...", "event": "...", "data": {...}}`.
//! Every frame is handled under the identity resolved at connect time; the
//! protocol never trusts an identity claim embedded in a frame.

use axum::extract::ws::Message;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::chat;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct ClientFrame {
    #[serde(default)]
    request_id: String,
    #[serde(flatten)]
    command: ClientCommand,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
enum ClientCommand {
    SendMessage {
        conversation_id: String,
        content: String,
    },
    MarkRead {
        conversation_id: String,
    },
}

/// Handle an incoming text (JSON) frame: decode, dispatch, ack.
pub async fn handle_text_frame(
    text: &str,
    tx: &mpsc::UnboundedSender<Message>,
    state: &AppState,
    user_id: &str,
) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(
                user_id = %user_id,
                error = %e,
                "Failed to decode client frame"
            );
            send_error_ack(tx, "", &AppError::validation("malformed frame"));
            return;
        }
    };

    let request_id = frame.request_id;

    match frame.command {
        ClientCommand::SendMessage {
            conversation_id,
            content,
        } => match chat::messages::append_and_deliver(state, user_id, &conversation_id, &content)
            .await
        {
            Ok((message, _conversation)) => {
                send_ack(tx, &request_id, json!({ "message": message }));
            }
            Err(e) => send_error_ack(tx, &request_id, &e),
        },
        ClientCommand::MarkRead { conversation_id } => {
            match chat::messages::mark_read_and_deliver(state, user_id, &conversation_id).await {
                Ok(_flipped) => {
                    send_ack(tx, &request_id, json!({ "success": true }));
                }
                Err(e) => send_error_ack(tx, &request_id, &e),
            }
        }
    }
}

/// Send a success ack for a client frame.
fn send_ack(tx: &mpsc::UnboundedSender<Message>, request_id: &str, data: serde_json::Value) {
    let ack = json!({
        "request_id": request_id,
        "ok": true,
        "data": data,
    });
    send_json(tx, &ack);
}

/// Send an error ack carrying the error kind so clients can branch.
fn send_error_ack(tx: &mpsc::UnboundedSender<Message>, request_id: &str, error: &AppError) {
    let ack = json!({
        "request_id": request_id,
        "ok": false,
        "error": {
            "kind": error.kind(),
            "message": error.public_message(),
        },
    });
    send_json(tx, &ack);
}

fn send_json(tx: &mpsc::UnboundedSender<Message>, value: &serde_json::Value) {
    if let Ok(text) = serde_json::to_string(value) {
        let _ = tx.send(Message::Text(text.into()));
    }
}
