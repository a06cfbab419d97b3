//! Recipient-scoped notification endpoints.
//!
//! Every mutation is guarded by `recipient_id = caller` in the WHERE clause;
//! a zero-row update means the notification either doesn't exist or belongs
//! to someone else, and both cases surface as NotFound.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::auth::middleware::Claims;
use crate::error::AppError;
use crate::notify::{fanout, NotificationBody};
use crate::state::AppState;

/// GET /api/notifications — List own notifications, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<NotificationBody>>, AppError> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    let notifications = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        let mut stmt = conn.prepare(
            "SELECT id, recipient_id, title, description, kind, entity_id, read, action_taken, created_at
             FROM notifications
             WHERE recipient_id = ?1
             ORDER BY created_at DESC",
        )?;

        let rows: Vec<NotificationBody> = stmt
            .query_map([&user_id], |row| {
                Ok(NotificationBody {
                    id: row.get(0)?,
                    recipient_id: row.get(1)?,
                    title: row.get(2)?,
                    description: row.get(3)?,
                    kind: row.get(4)?,
                    entity_id: row.get(5)?,
                    read: row.get(6)?,
                    action_taken: row.get(7)?,
                    created_at: row.get(8)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok::<_, AppError>(rows)
    })
    .await??;

    Ok(Json(notifications))
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

/// GET /api/notifications/unread-count
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
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND read = 0",
            [&user_id],
            |row| row.get(0),
        )?;
        Ok::<_, AppError>(count)
    })
    .await??;

    Ok(Json(UnreadCountResponse { count }))
}

/// POST /api/notifications/{id}/read — Mark one notification read.
pub async fn mark_read(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    set_flag(&state, &claims.sub, &id, "read").await?;
    Ok(StatusCode::OK)
}

/// POST /api/notifications/{id}/action — Mark the notification's action taken.
pub async fn mark_action_taken(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    set_flag(&state, &claims.sub, &id, "action_taken").await?;
    Ok(StatusCode::OK)
}

async fn set_flag(
    state: &AppState,
    user_id: &str,
    notification_id: &str,
    column: &'static str,
) -> Result<(), AppError> {
    let db = state.db.clone();
    let uid = user_id.to_string();
    let nid = notification_id.to_string();

    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        // column is a compile-time constant, never caller input
        let sql = format!(
            "UPDATE notifications SET {} = 1 WHERE id = ?1 AND recipient_id = ?2",
            column
        );
        let updated = conn.execute(&sql, rusqlite::params![nid, uid])?;

        if updated == 0 {
            return Err(AppError::not_found("notification not found"));
        }
        Ok::<_, AppError>(())
    })
    .await??;

    Ok(())
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub updated: usize,
}

/// POST /api/notifications/read-all — Bulk mark all read, then signal live
/// handles so open tabs can clear their badges.
pub async fn mark_all_read(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<MarkAllReadResponse>, AppError> {
    let updated = fanout::mark_all_read(&state, &claims.sub).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}

/// DELETE /api/notifications/{id} — Recipients may delete their own
/// notifications; anyone else sees NotFound.
pub async fn delete_notification(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        let deleted = conn.execute(
            "DELETE FROM notifications WHERE id = ?1 AND recipient_id = ?2",
            rusqlite::params![id, user_id],
        )?;

        if deleted == 0 {
            return Err(AppError::not_found("notification not found"));
        }
        Ok::<_, AppError>(())
    })
    .await??;

    Ok(StatusCode::NO_CONTENT)
}
