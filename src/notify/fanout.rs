//! Persist-then-push notification fan-out.

use chrono::Utc;
use uuid::Uuid;

use crate::db::models;
use crate::error::AppError;
use crate::notify::{NotificationBody, NotificationKind};
use crate::state::AppState;
use crate::ws::events::ServerEvent;

/// Create a notification for a user and push it to their live connections.
///
/// Fails with NotFound if the recipient does not exist. The row is persisted
/// first; the push is best-effort and its failures never reach the caller.
pub async fn notify(
    state: &AppState,
    recipient_id: &str,
    title: &str,
    description: &str,
    kind: NotificationKind,
    entity_id: Option<String>,
) -> Result<NotificationBody, AppError> {
    let db = state.db.clone();
    let recipient = recipient_id.to_string();
    let title = title.to_string();
    let description = description.to_string();

    let notification = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        if models::get_user(&conn, &recipient)?.is_none() {
            return Err(AppError::not_found("recipient not found"));
        }

        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO notifications (id, recipient_id, title, description, kind, entity_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![id, recipient, title, description, kind.as_str(), entity_id, now],
        )?;

        Ok::<_, AppError>(NotificationBody {
            id,
            recipient_id: recipient,
            title,
            description,
            kind: kind.as_str().to_string(),
            entity_id,
            read: false,
            action_taken: false,
            created_at: now,
        })
    })
    .await??;

    // Best-effort push to every live handle; persistence is the contract.
    state.connections.send_to_user(
        &notification.recipient_id,
        &ServerEvent::NewNotification {
            notification: notification.clone(),
        },
    );

    Ok(notification)
}

/// Notify, logging instead of propagating — for call sites where the primary
/// operation already committed and a notification failure must not undo it.
pub async fn notify_best_effort(
    state: &AppState,
    recipient_id: &str,
    title: &str,
    description: &str,
    kind: NotificationKind,
    entity_id: Option<String>,
) {
    if let Err(e) = notify(state, recipient_id, title, description, kind, entity_id).await {
        tracing::warn!(
            recipient_id = %recipient_id,
            error = %e,
            "failed to create notification"
        );
    }
}

/// Flip read=true for all of a user's unread notifications in one atomic
/// update, then push a lightweight cleared signal to their live handles.
pub async fn mark_all_read(state: &AppState, user_id: &str) -> Result<usize, AppError> {
    let db = state.db.clone();
    let uid = user_id.to_string();

    let updated = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        let updated = conn.execute(
            "UPDATE notifications SET read = 1 WHERE recipient_id = ?1 AND read = 0",
            [&uid],
        )?;
        Ok::<_, AppError>(updated)
    })
    .await??;

    // Pushed only after the flip commits.
    state
        .connections
        .send_to_user(user_id, &ServerEvent::NotificationsCleared {});

    Ok(updated)
}
