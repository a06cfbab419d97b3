//! Message append, history, read flips, and unread accounting.
//!
//! The message insert and the parent conversation's last-message cache update
//! happen under the same connection lock, so sequential callers never observe
//! a committed message with a stale cache.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::middleware::Claims;
use crate::chat::conversations::require_membership;
use crate::chat::{delivery, ConversationSummary, MessageBody};
use crate::error::AppError;
use crate::state::AppState;

fn sender_name(conn: &Connection, user_id: &str) -> Result<String, AppError> {
    let name: Option<String> = conn
        .query_row(
            "SELECT display_name FROM users WHERE id = ?1",
            [user_id],
            |row| row.get(0),
        )
        .ok();
    Ok(name.unwrap_or_else(|| "Unknown".to_string()))
}

/// Persist a message and update the conversation cache; returns the message,
/// the refreshed summary, and the other participants for delivery.
async fn append_message(
    state: &AppState,
    sender_id: &str,
    conversation_id: &str,
    content: &str,
) -> Result<(MessageBody, ConversationSummary, Vec<String>), AppError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::validation("message content cannot be empty"));
    }

    let db = state.db.clone();
    let sender = sender_id.to_string();
    let conv_id = conversation_id.to_string();
    let text = content.to_string();

    let result = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        let participants = require_membership(&conn, &conv_id, &sender)?;

        // Per-conversation sequence: commit order is message order
        let next_seq: i64 = conn.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE conversation_id = ?1",
            [&conv_id],
            |row| row.get(0),
        )?;

        let msg_id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO messages (id, conversation_id, sender_id, content, read, seq, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
            rusqlite::params![msg_id, conv_id, sender, text, next_seq, now],
        )?;

        // Cache update in the same logical operation as the insert
        conn.execute(
            "UPDATE conversations SET last_message = ?1, last_message_at = ?2 WHERE id = ?3",
            rusqlite::params![text, now, conv_id],
        )?;

        let message = MessageBody {
            id: msg_id,
            conversation_id: conv_id.clone(),
            sender_id: sender.clone(),
            sender_name: sender_name(&conn, &sender)?,
            content: text.clone(),
            read: false,
            seq: next_seq,
            created_at: now.clone(),
        };

        let summary = ConversationSummary {
            id: conv_id,
            participant_ids: participants.clone(),
            last_message: Some(text),
            last_message_at: Some(now),
        };

        let recipients: Vec<String> = participants.into_iter().filter(|p| p != &sender).collect();

        Ok::<_, AppError>((message, summary, recipients))
    })
    .await??;

    Ok(result)
}

/// Append a message, then push it to every other participant's live handles
/// (offline participants get a persisted notification instead).
pub async fn append_and_deliver(
    state: &AppState,
    sender_id: &str,
    conversation_id: &str,
    content: &str,
) -> Result<(MessageBody, ConversationSummary), AppError> {
    let (message, summary, recipients) =
        append_message(state, sender_id, conversation_id, content).await?;

    delivery::deliver_new_message(state, &message, &summary, &recipients).await;

    Ok((message, summary))
}

/// Flip read=true on every unread message not sent by the reader, then push
/// read receipts to the other participants. The flip commits before any push.
pub async fn mark_read_and_deliver(
    state: &AppState,
    reader_id: &str,
    conversation_id: &str,
) -> Result<usize, AppError> {
    let db = state.db.clone();
    let reader = reader_id.to_string();
    let conv_id = conversation_id.to_string();

    let (flipped, recipients) = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        let participants = require_membership(&conn, &conv_id, &reader)?;

        // Batch flip; zero rows is a no-op, not an error
        let flipped = conn.execute(
            "UPDATE messages SET read = 1
             WHERE conversation_id = ?1 AND sender_id != ?2 AND read = 0",
            rusqlite::params![conv_id, reader],
        )?;

        let recipients: Vec<String> =
            participants.into_iter().filter(|p| p != &reader).collect();

        Ok::<_, AppError>((flipped, recipients))
    })
    .await??;

    delivery::deliver_read_receipt(state, conversation_id, reader_id, &recipients);

    Ok(flipped)
}

// --- REST handlers ---

#[derive(Debug, serde::Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// POST /api/conversations/{id}/messages
pub async fn send_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(conversation_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageBody>), AppError> {
    let (message, _summary) =
        append_and_deliver(&state, &claims.sub, &conversation_id, &body.content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/conversations/{id}/messages — ascending creation order
/// (oldest first) for chronological rendering.
pub async fn get_messages(
    State(state): State<AppState>,
    claims: Claims,
    Path(conversation_id): Path<String>,
) -> Result<Json<Vec<MessageBody>>, AppError> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    let messages = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        require_membership(&conn, &conversation_id, &user_id)?;

        let mut stmt = conn.prepare(
            "SELECT m.id, m.conversation_id, m.sender_id, u.display_name, m.content,
                    m.read, m.seq, m.created_at
             FROM messages m
             LEFT JOIN users u ON u.id = m.sender_id
             WHERE m.conversation_id = ?1
             ORDER BY m.seq ASC",
        )?;

        let rows: Vec<MessageBody> = stmt
            .query_map([&conversation_id], |row| {
                Ok(MessageBody {
                    id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    sender_id: row.get(2)?,
                    sender_name: row
                        .get::<_, Option<String>>(3)?
                        .unwrap_or_else(|| "Unknown".to_string()),
                    content: row.get(4)?,
                    read: row.get(5)?,
                    seq: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok::<_, AppError>(rows)
    })
    .await??;

    Ok(Json(messages))
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub success: bool,
    pub updated: usize,
}

/// POST /api/conversations/{id}/read
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    claims: Claims,
    Path(conversation_id): Path<String>,
) -> Result<Json<MarkReadResponse>, AppError> {
    let updated = mark_read_and_deliver(&state, &claims.sub, &conversation_id).await?;
    Ok(Json(MarkReadResponse {
        success: true,
        updated,
    }))
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

/// GET /api/messages/unread-count — unread messages addressed to the caller
/// across all of their conversations.
pub async fn unread_count(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<UnreadCountResponse>, AppError> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    let count = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*)
             FROM messages m
             JOIN conversation_participants cp
               ON cp.conversation_id = m.conversation_id AND cp.user_id = ?1
             WHERE m.sender_id != ?1 AND m.read = 0",
            [&user_id],
            |row| row.get(0),
        )?;
        Ok::<_, AppError>(count)
    })
    .await??;

    Ok(Json(UnreadCountResponse { count }))
}
