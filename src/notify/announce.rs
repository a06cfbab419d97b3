//! Announcement publishing.
//!
//! Announcement listing/editing belongs to the excluded CRUD layer; this is
//! the publish path, which persists the record and broadcasts it to every
//! live connection. The broadcast itself is fire-and-forget.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::middleware::Claims;
use crate::error::AppError;
use crate::roles;
use crate::state::AppState;
use crate::ws::events::ServerEvent;

#[derive(Debug, Deserialize)]
pub struct PublishAnnouncementRequest {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub important: bool,
}

#[derive(Debug, Serialize)]
pub struct AnnouncementResponse {
    pub id: String,
    pub title: String,
    pub body: Option<String>,
    pub important: bool,
    pub created_by: String,
    pub created_at: String,
}

/// POST /api/announcements — Organization/administrator only.
pub async fn publish_announcement(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<PublishAnnouncementRequest>,
) -> Result<(StatusCode, Json<AnnouncementResponse>), AppError> {
    if body.title.trim().is_empty() {
        return Err(AppError::validation("title cannot be empty"));
    }

    let db = state.db.clone();
    let user_id = claims.sub.clone();
    let title = body.title.trim().to_string();
    let text = body.body.clone();
    let important = body.important;

    let announcement = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        roles::require_capability(&conn, &user_id, roles::can_publish_announcements)?;

        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO announcements (id, title, body, important, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![id, title, text, important, user_id, now],
        )?;

        Ok::<_, AppError>(AnnouncementResponse {
            id,
            title,
            body: text,
            important,
            created_by: user_id,
            created_at: now,
        })
    })
    .await??;

    state.connections.broadcast_to_all(&ServerEvent::NewAnnouncement {
        id: announcement.id.clone(),
        title: announcement.title.clone(),
        important: announcement.important,
    });

    tracing::info!(announcement_id = %announcement.id, "announcement published");

    Ok((StatusCode::CREATED, Json(announcement)))
}
