//! Boundary user provisioning.
//!
//! The full identity subsystem (credentials, password handling, account
//! recovery) is owned externally; this endpoint is the minimal surface the
//! core needs to resolve user ids and issue access tokens.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::jwt;
use crate::error::AppError;
use crate::roles::Role;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub display_name: String,
    /// One of: requester, helper, organization
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "requester".to_string()
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub access_token: String,
    pub role: String,
}

/// POST /api/auth/register
/// Create a user and issue an access token. Administrators cannot be
/// self-provisioned here; they come from the external identity subsystem.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    if req.display_name.trim().is_empty() {
        return Err(AppError::validation("display name cannot be empty"));
    }

    let role =
        Role::from_str(&req.role).ok_or_else(|| AppError::validation("unknown role"))?;
    if role == Role::Administrator {
        return Err(AppError::forbidden(
            "administrators cannot be self-provisioned",
        ));
    }

    let db = state.db.clone();
    let jwt_secret = state.jwt_secret.clone();
    let display_name = req.display_name.trim().to_string();

    let (user_id, access_token) = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        let user_id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO users (id, display_name, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![user_id, display_name, role.as_str(), now, now],
        )?;

        let access_token = jwt::issue_access_token(&jwt_secret, &user_id, role.as_str())
            .map_err(AppError::internal)?;

        Ok::<_, AppError>((user_id, access_token))
    })
    .await??;

    tracing::info!(user_id = %user_id, role = %role.as_str(), "user registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            access_token,
            role: role.as_str().to_string(),
        }),
    ))
}
