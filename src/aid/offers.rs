//! Minimal offer creation/read endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aid::{offer_status, Category};
use crate::auth::middleware::Claims;
use crate::db::models;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateOfferRequest {
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OfferResponse {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub status: String,
    pub helped_count: i64,
    pub created_at: String,
}

impl From<models::Offer> for OfferResponse {
    fn from(o: models::Offer) -> Self {
        Self {
            id: o.id,
            owner_id: o.owner_id,
            title: o.title,
            description: o.description,
            category: o.category,
            status: o.status,
            helped_count: o.helped_count,
            created_at: o.created_at,
        }
    }
}

/// POST /api/offers — Create an aid offer. JWT auth required.
pub async fn create_offer(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<CreateOfferRequest>,
) -> Result<(StatusCode, Json<OfferResponse>), AppError> {
    if body.title.trim().is_empty() {
        return Err(AppError::validation("title cannot be empty"));
    }
    let category = Category::from_str(&body.category)
        .ok_or_else(|| AppError::validation(format!("unknown category: {}", body.category)))?;

    let db = state.db.clone();
    let owner_id = claims.sub.clone();

    let offer = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO offers (id, owner_id, title, description, category, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                id,
                owner_id,
                body.title.trim(),
                body.description,
                category.as_str(),
                offer_status::ACTIVE,
                now
            ],
        )?;

        models::get_offer(&conn, &id)?
            .ok_or_else(|| AppError::internal("offer vanished after insert"))
    })
    .await??;

    tracing::info!(offer_id = %offer.id, category = %offer.category, "offer created");

    Ok((StatusCode::CREATED, Json(offer.into())))
}

/// GET /api/offers/{id}
pub async fn get_offer(
    State(state): State<AppState>,
    _claims: Claims,
    Path(id): Path<String>,
) -> Result<Json<OfferResponse>, AppError> {
    let db = state.db.clone();

    let offer = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;
        models::get_offer(&conn, &id)?.ok_or_else(|| AppError::not_found("offer not found"))
    })
    .await??;

    Ok(Json(offer.into()))
}
