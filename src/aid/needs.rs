//! Minimal need creation/read endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aid::{need_status, Category};
use crate::auth::middleware::Claims;
use crate::db::models;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateNeedRequest {
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NeedResponse {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub status: String,
    pub created_at: String,
}

impl From<models::Need> for NeedResponse {
    fn from(n: models::Need) -> Self {
        Self {
            id: n.id,
            owner_id: n.owner_id,
            title: n.title,
            description: n.description,
            category: n.category,
            status: n.status,
            created_at: n.created_at,
        }
    }
}

/// POST /api/needs — Create an aid request. JWT auth required.
pub async fn create_need(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<CreateNeedRequest>,
) -> Result<(StatusCode, Json<NeedResponse>), AppError> {
    if body.title.trim().is_empty() {
        return Err(AppError::validation("title cannot be empty"));
    }
    let category = Category::from_str(&body.category)
        .ok_or_else(|| AppError::validation(format!("unknown category: {}", body.category)))?;

    let db = state.db.clone();
    let owner_id = claims.sub.clone();

    let need = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO needs (id, owner_id, title, description, category, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                id,
                owner_id,
                body.title.trim(),
                body.description,
                category.as_str(),
                need_status::OPEN,
                now
            ],
        )?;

        models::get_need(&conn, &id)?.ok_or_else(|| AppError::internal("need vanished after insert"))
    })
    .await??;

    tracing::info!(need_id = %need.id, category = %need.category, "need created");

    Ok((StatusCode::CREATED, Json(need.into())))
}

/// GET /api/needs/{id}
pub async fn get_need(
    State(state): State<AppState>,
    _claims: Claims,
    Path(id): Path<String>,
) -> Result<Json<NeedResponse>, AppError> {
    let db = state.db.clone();

    let need = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;
        models::get_need(&conn, &id)?.ok_or_else(|| AppError::not_found("need not found"))
    })
    .await??;

    Ok(Json(need.into()))
}
