//! Conversation creation, listing, and membership checks.
//!
//! The participant set is normalized into a sorted, '|'-joined key with a
//! UNIQUE index, so two conversations can never share the exact same set —
//! even under concurrent creation, where the loser of the insert race
//! re-reads the winner's row.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::middleware::Claims;
use crate::chat::{messages, ConversationBody, ParticipantBody};
use crate::db::models;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub participant_ids: Vec<String>,
    #[serde(default)]
    pub initial_message: Option<String>,
}

/// Normalize a participant set into the dedup key: sorted, deduped, joined.
pub(crate) fn participant_key(ids: &[String]) -> String {
    let mut sorted: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.join("|")
}

/// Participant ids of a conversation, or NotFound if it doesn't exist.
pub(crate) fn participant_ids(
    conn: &Connection,
    conversation_id: &str,
) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM conversation_participants WHERE conversation_id = ?1 ORDER BY user_id",
    )?;
    let ids: Vec<String> = stmt
        .query_map([conversation_id], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();

    if ids.is_empty() {
        return Err(AppError::not_found("conversation not found"));
    }
    Ok(ids)
}

/// Membership gate: non-participants get NotFound, never Forbidden —
/// conversation existence is itself hidden from outsiders.
pub(crate) fn require_membership(
    conn: &Connection,
    conversation_id: &str,
    user_id: &str,
) -> Result<Vec<String>, AppError> {
    let ids = participant_ids(conn, conversation_id)?;
    if !ids.iter().any(|id| id == user_id) {
        return Err(AppError::not_found("conversation not found"));
    }
    Ok(ids)
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn load_participants(
    conn: &Connection,
    conversation_id: &str,
) -> Result<Vec<ParticipantBody>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.display_name, u.role
         FROM conversation_participants cp
         JOIN users u ON u.id = cp.user_id
         WHERE cp.conversation_id = ?1
         ORDER BY u.display_name",
    )?;
    let participants: Vec<ParticipantBody> = stmt
        .query_map([conversation_id], |row| {
            Ok(ParticipantBody {
                id: row.get(0)?,
                display_name: row.get(1)?,
                role: row.get(2)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(participants)
}

fn load_conversation_body(
    conn: &Connection,
    conversation_id: &str,
    viewer_id: &str,
) -> Result<ConversationBody, AppError> {
    let (last_message, last_message_at, created_at): (Option<String>, Option<String>, String) =
        conn.query_row(
            "SELECT last_message, last_message_at, created_at FROM conversations WHERE id = ?1",
            [conversation_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?
        .ok_or_else(|| AppError::not_found("conversation not found"))?;

    let has_unread: bool = conn.query_row(
        "SELECT EXISTS(
             SELECT 1 FROM messages
             WHERE conversation_id = ?1 AND sender_id != ?2 AND read = 0)",
        rusqlite::params![conversation_id, viewer_id],
        |row| row.get(0),
    )?;

    Ok(ConversationBody {
        id: conversation_id.to_string(),
        participants: load_participants(conn, conversation_id)?,
        last_message,
        last_message_at,
        has_unread,
        created_at,
    })
}

/// POST /api/conversations — Create or get a conversation.
///
/// Idempotent on the participant set: a second call with the same people
/// returns the existing conversation (200) and does NOT append the initial
/// message again. A fresh conversation (201) gets the initial message
/// appended through the normal message path, with delivery.
pub async fn create_conversation(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationBody>), AppError> {
    let requester_id = claims.sub.clone();

    if body.participant_ids.is_empty() {
        return Err(AppError::validation("participant_ids cannot be empty"));
    }
    if body.participant_ids.iter().any(|id| id == &requester_id) {
        return Err(AppError::validation(
            "cannot start a conversation with yourself",
        ));
    }

    // Full participant set = {requester} ∪ participant_ids
    let mut all_ids = body.participant_ids.clone();
    all_ids.push(requester_id.clone());
    let key = participant_key(&all_ids);

    let db = state.db.clone();
    let requester = requester_id.clone();

    let (conversation_id, is_new) = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        // Every id must resolve to an existing user
        for id in &all_ids {
            if models::get_user(&conn, id)?.is_none() {
                return Err(AppError::not_found(format!("user {} not found", id)));
            }
        }

        // Dedup: return the existing conversation for this exact set
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM conversations WHERE participant_key = ?1",
                [&key],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok::<_, AppError>((id, false));
        }

        let conv_id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let insert = conn.execute(
            "INSERT INTO conversations (id, participant_key, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![conv_id, key, now],
        );

        match insert {
            Ok(_) => {
                let mut sorted = all_ids.clone();
                sorted.sort_unstable();
                sorted.dedup();
                for user_id in &sorted {
                    conn.execute(
                        "INSERT INTO conversation_participants (conversation_id, user_id) VALUES (?1, ?2)",
                        rusqlite::params![conv_id, user_id],
                    )?;
                }
                Ok((conv_id, true))
            }
            Err(e) if is_unique_violation(&e) => {
                // Lost the creation race — return the winner's row
                let id: String = conn.query_row(
                    "SELECT id FROM conversations WHERE participant_key = ?1",
                    [&key],
                    |row| row.get(0),
                )?;
                Ok((id, false))
            }
            Err(e) => Err(e.into()),
        }
    })
    .await??;

    // Initial message goes through the normal append/delivery path, and only
    // for a newly created conversation.
    if is_new {
        if let Some(content) = body.initial_message.as_deref() {
            if !content.trim().is_empty() {
                messages::append_and_deliver(&state, &requester_id, &conversation_id, content)
                    .await?;
            }
        }
    }

    let db = state.db.clone();
    let conv_id = conversation_id.clone();
    let conversation = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;
        load_conversation_body(&conn, &conv_id, &requester)
    })
    .await??;

    let status = if is_new {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(conversation)))
}

/// GET /api/conversations — All conversations containing the caller, newest
/// activity first; conversations with no messages yet sort last.
pub async fn list_conversations(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<ConversationBody>>, AppError> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    let conversations = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        let mut stmt = conn.prepare(
            "SELECT c.id
             FROM conversations c
             JOIN conversation_participants cp ON cp.conversation_id = c.id
             WHERE cp.user_id = ?1
             ORDER BY CASE WHEN c.last_message_at IS NULL THEN 1 ELSE 0 END,
                      c.last_message_at DESC,
                      c.created_at DESC",
        )?;
        let ids: Vec<String> = stmt
            .query_map([&user_id], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();

        let mut bodies = Vec::with_capacity(ids.len());
        for id in &ids {
            bodies.push(load_conversation_body(&conn, id, &user_id)?);
        }
        Ok::<_, AppError>(bodies)
    })
    .await??;

    Ok(Json(conversations))
}

/// GET /api/conversations/{id} — Participants only; others get NotFound.
pub async fn get_conversation(
    State(state): State<AppState>,
    claims: Claims,
    Path(conversation_id): Path<String>,
) -> Result<Json<ConversationBody>, AppError> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    let conversation = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        require_membership(&conn, &conversation_id, &user_id)?;
        load_conversation_body(&conn, &conversation_id, &user_id)
    })
    .await??;

    Ok(Json(conversation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_key_is_order_independent() {
        let a = participant_key(&["u2".into(), "u1".into(), "u3".into()]);
        let b = participant_key(&["u3".into(), "u1".into(), "u2".into()]);
        assert_eq!(a, b);
        assert_eq!(a, "u1|u2|u3");
    }

    #[test]
    fn participant_key_dedups() {
        let key = participant_key(&["u1".into(), "u2".into(), "u1".into()]);
        assert_eq!(key, "u1|u2");
    }
}
