//! Match proposal, transition, withdrawal, and party-scoped reads.
//!
//! Pair uniqueness is enforced by the store (UNIQUE on the normalized pair
//! key), not by a read-then-write check, so concurrent proposals for the same
//! pair cannot both succeed. Transitions use a compare-and-swap on the current
//! status for the same reason.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use uuid::Uuid;

use crate::aid::{need_status, Category};
use crate::auth::middleware::Claims;
use crate::db::models::{self, MatchRow};
use crate::error::AppError;
use crate::matching::state::{can_transition, MatchStatus};
use crate::matching::MatchBody;
use crate::notify::{fanout, NotificationKind};
use crate::roles;
use crate::state::AppState;

/// The normalized pair key backing the uniqueness constraint. "-" stands in
/// for an absent side so one-sided matches dedup too (SQLite treats NULLs as
/// distinct in UNIQUE indexes).
fn pair_key(need_id: Option<&str>, offer_id: Option<&str>) -> String {
    format!("{}|{}", need_id.unwrap_or("-"), offer_id.unwrap_or("-"))
}

fn get_match(conn: &Connection, id: &str) -> Result<Option<MatchRow>, AppError> {
    let row = conn
        .query_row(
            "SELECT id, need_id, offer_id, initiated_by, responded_by, message, status,
                    created_at, updated_at
             FROM matches WHERE id = ?1",
            [id],
            |row| {
                Ok(MatchRow {
                    id: row.get(0)?,
                    need_id: row.get(1)?,
                    offer_id: row.get(2)?,
                    initiated_by: row.get(3)?,
                    responded_by: row.get(4)?,
                    message: row.get(5)?,
                    status: row.get(6)?,
                    created_at: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Owner ids of the linked need and offer, where linked.
fn match_owners(
    conn: &Connection,
    row: &MatchRow,
) -> Result<(Option<String>, Option<String>), AppError> {
    let need_owner = match row.need_id.as_deref() {
        Some(id) => models::get_need(conn, id)?.map(|n| n.owner_id),
        None => None,
    };
    let offer_owner = match row.offer_id.as_deref() {
        Some(id) => models::get_offer(conn, id)?.map(|o| o.owner_id),
        None => None,
    };
    Ok((need_owner, offer_owner))
}

/// Parties other than `actor`: the initiator plus both owners, deduped.
fn other_parties(row: &MatchRow, owners: &(Option<String>, Option<String>), actor: &str) -> Vec<String> {
    let mut parties = vec![row.initiated_by.clone()];
    if let Some(owner) = &owners.0 {
        parties.push(owner.clone());
    }
    if let Some(owner) = &owners.1 {
        parties.push(owner.clone());
    }
    parties.sort_unstable();
    parties.dedup();
    parties.retain(|p| p != actor);
    parties
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn display_name(conn: &Connection, user_id: &str) -> String {
    conn.query_row(
        "SELECT display_name FROM users WHERE id = ?1",
        [user_id],
        |row| row.get(0),
    )
    .unwrap_or_else(|_| "Someone".to_string())
}

#[derive(Debug, Deserialize)]
pub struct ProposeMatchRequest {
    #[serde(default)]
    pub need_id: Option<String>,
    #[serde(default)]
    pub offer_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// POST /api/matches — Propose a match referencing a need and/or an offer.
pub async fn propose(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<ProposeMatchRequest>,
) -> Result<(StatusCode, Json<MatchBody>), AppError> {
    if body.need_id.is_none() && body.offer_id.is_none() {
        return Err(AppError::validation(
            "a match must reference a need or an offer",
        ));
    }

    let db = state.db.clone();
    let initiator = claims.sub.clone();
    let need_id = body.need_id.clone();
    let offer_id = body.offer_id.clone();
    let message = body.message.clone();

    let (match_body, recipients, summary_line) = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        let need = match need_id.as_deref() {
            Some(id) => Some(
                models::get_need(&conn, id)?
                    .ok_or_else(|| AppError::not_found("need not found"))?,
            ),
            None => None,
        };
        let offer = match offer_id.as_deref() {
            Some(id) => Some(
                models::get_offer(&conn, id)?
                    .ok_or_else(|| AppError::not_found("offer not found"))?,
            ),
            None => None,
        };

        if let (Some(need), Some(offer)) = (&need, &offer) {
            if need.status != need_status::OPEN {
                return Err(AppError::conflict("need is not open for matching"));
            }
            let need_cat = Category::from_str(&need.category)
                .ok_or_else(|| AppError::internal("need has an unknown category"))?;
            let offer_cat = Category::from_str(&offer.category)
                .ok_or_else(|| AppError::internal("offer has an unknown category"))?;
            if !need_cat.compatible_with(offer_cat) {
                return Err(AppError::conflict(format!(
                    "categories {} and {} are not compatible",
                    need.category, offer.category
                )));
            }
        }

        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let key = pair_key(need_id.as_deref(), offer_id.as_deref());

        let insert = conn.execute(
            "INSERT INTO matches (id, need_id, offer_id, pair_key, initiated_by, message,
                                  status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?7)",
            rusqlite::params![id, need_id, offer_id, key, initiator, message, now],
        );
        match insert {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::conflict(
                    "a match already exists for this need/offer pair",
                ));
            }
            Err(e) => return Err(e.into()),
        }

        let row = get_match(&conn, &id)?
            .ok_or_else(|| AppError::internal("match vanished after insert"))?;
        let owners = (
            need.as_ref().map(|n| n.owner_id.clone()),
            offer.as_ref().map(|o| o.owner_id.clone()),
        );
        let recipients = other_parties(&row, &owners, &initiator);

        let subject = need
            .as_ref()
            .map(|n| n.title.clone())
            .or_else(|| offer.as_ref().map(|o| o.title.clone()))
            .unwrap_or_default();
        let summary_line = format!("{} proposed a match for \"{}\"", display_name(&conn, &initiator), subject);

        Ok::<_, AppError>((MatchBody::from(row), recipients, summary_line))
    })
    .await??;

    for recipient in &recipients {
        fanout::notify_best_effort(
            &state,
            recipient,
            "New match proposal",
            &summary_line,
            NotificationKind::Match,
            Some(match_body.id.clone()),
        )
        .await;
    }

    tracing::info!(match_id = %match_body.id, "match proposed");

    Ok((StatusCode::CREATED, Json(match_body)))
}

#[derive(Debug, Deserialize)]
pub struct TransitionMatchRequest {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// POST /api/matches/{id}/status — Drive the match state machine.
///
/// The status update is a compare-and-swap on the current status; a
/// concurrent transition makes the swap miss and surfaces as Conflict.
/// Cascaded need/offer updates run after the swap and are not transactional
/// with it: a cascade failure is logged and surfaced, never hidden.
pub async fn transition(
    State(state): State<AppState>,
    claims: Claims,
    Path(match_id): Path<String>,
    Json(body): Json<TransitionMatchRequest>,
) -> Result<Json<MatchBody>, AppError> {
    let target = MatchStatus::from_str(&body.status)
        .ok_or_else(|| AppError::validation(format!("unknown match status: {}", body.status)))?;

    let db = state.db.clone();
    let actor = claims.sub.clone();
    let mid = match_id.clone();
    let note = body.message.clone();

    let (match_body, recipients, title) = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        let row = get_match(&conn, &mid)?.ok_or_else(|| AppError::not_found("match not found"))?;
        let owners = match_owners(&conn, &row)?;

        if !roles::is_match_party(
            &actor,
            &row.initiated_by,
            owners.0.as_deref(),
            owners.1.as_deref(),
        ) {
            return Err(AppError::forbidden("not a party to this match"));
        }

        let current = MatchStatus::from_str(&row.status)
            .ok_or_else(|| AppError::internal("match has an unknown status"))?;
        if !can_transition(current, target) {
            return Err(AppError::conflict(format!(
                "cannot transition match from {} to {}",
                current.as_str(),
                target.as_str()
            )));
        }

        // Compare-and-swap on the current status. responded_by is recorded
        // only on the first transition out of pending.
        let now = Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE matches
             SET status = ?1,
                 responded_by = CASE WHEN status = 'pending'
                                     THEN COALESCE(responded_by, ?2)
                                     ELSE responded_by END,
                 message = COALESCE(?3, message),
                 updated_at = ?4
             WHERE id = ?5 AND status = ?6",
            rusqlite::params![target.as_str(), actor, note, now, mid, current.as_str()],
        )?;
        if updated == 0 {
            return Err(AppError::conflict("match status changed concurrently"));
        }

        // Cascades. These follow the committed status update; if one fails
        // the match keeps its new status and the error is logged and surfaced.
        let cascade: Result<(), rusqlite::Error> = (|| {
            match target {
                MatchStatus::Accepted => {
                    if let Some(need_id) = row.need_id.as_deref() {
                        conn.execute(
                            "UPDATE needs SET status = ?1 WHERE id = ?2",
                            rusqlite::params![need_status::MATCHED, need_id],
                        )?;
                    }
                }
                MatchStatus::Completed => {
                    if let Some(need_id) = row.need_id.as_deref() {
                        conn.execute(
                            "UPDATE needs SET status = ?1 WHERE id = ?2",
                            rusqlite::params![need_status::FULFILLED, need_id],
                        )?;
                    }
                    if let Some(offer_id) = row.offer_id.as_deref() {
                        conn.execute(
                            "UPDATE offers SET helped_count = helped_count + 1 WHERE id = ?1",
                            [offer_id],
                        )?;
                    }
                }
                MatchStatus::Pending | MatchStatus::Rejected => {}
            }
            Ok(())
        })();
        if let Err(e) = cascade {
            tracing::error!(
                match_id = %mid,
                status = target.as_str(),
                error = %e,
                "match transitioned but cascade failed"
            );
            return Err(AppError::internal("match updated but side effects failed"));
        }

        let row = get_match(&conn, &mid)?
            .ok_or_else(|| AppError::internal("match vanished during update"))?;
        let recipients = other_parties(&row, &owners, &actor);
        let title = format!("Match {}", target.as_str());

        Ok::<_, AppError>((MatchBody::from(row), recipients, title))
    })
    .await??;

    for recipient in &recipients {
        fanout::notify_best_effort(
            &state,
            recipient,
            &title,
            &format!("A match you are part of is now {}", match_body.status),
            NotificationKind::Match,
            Some(match_body.id.clone()),
        )
        .await;
    }

    tracing::info!(match_id = %match_body.id, status = %match_body.status, "match transitioned");

    Ok(Json(match_body))
}

/// DELETE /api/matches/{id} — Initiator-only hard delete. Withdrawal removes
/// the record at any status; cascades already applied are not reversed.
pub async fn withdraw(
    State(state): State<AppState>,
    claims: Claims,
    Path(match_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let db = state.db.clone();
    let actor = claims.sub.clone();

    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        let row = get_match(&conn, &match_id)?
            .ok_or_else(|| AppError::not_found("match not found"))?;
        if row.initiated_by != actor {
            return Err(AppError::forbidden("only the initiator may withdraw a match"));
        }

        conn.execute("DELETE FROM matches WHERE id = ?1", [&match_id])?;
        Ok::<_, AppError>(())
    })
    .await??;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/matches/{id} — Parties only; anyone else gets NotFound.
pub async fn get(
    State(state): State<AppState>,
    claims: Claims,
    Path(match_id): Path<String>,
) -> Result<Json<MatchBody>, AppError> {
    let db = state.db.clone();
    let actor = claims.sub.clone();

    let match_body = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        let row = get_match(&conn, &match_id)?
            .ok_or_else(|| AppError::not_found("match not found"))?;
        let owners = match_owners(&conn, &row)?;

        if !roles::is_match_party(
            &actor,
            &row.initiated_by,
            owners.0.as_deref(),
            owners.1.as_deref(),
        ) {
            return Err(AppError::not_found("match not found"));
        }

        Ok::<_, AppError>(MatchBody::from(row))
    })
    .await??;

    Ok(Json(match_body))
}

/// GET /api/matches — All matches the caller is a party to, newest first.
pub async fn list(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<MatchBody>>, AppError> {
    let db = state.db.clone();
    let actor = claims.sub.clone();

    let matches = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;

        let mut stmt = conn.prepare(
            "SELECT m.id, m.need_id, m.offer_id, m.initiated_by, m.responded_by, m.message,
                    m.status, m.created_at, m.updated_at
             FROM matches m
             LEFT JOIN needs n ON n.id = m.need_id
             LEFT JOIN offers o ON o.id = m.offer_id
             WHERE m.initiated_by = ?1 OR n.owner_id = ?1 OR o.owner_id = ?1
             ORDER BY m.created_at DESC",
        )?;

        let rows: Vec<MatchBody> = stmt
            .query_map([&actor], |row| {
                Ok(MatchRow {
                    id: row.get(0)?,
                    need_id: row.get(1)?,
                    offer_id: row.get(2)?,
                    initiated_by: row.get(3)?,
                    responded_by: row.get(4)?,
                    message: row.get(5)?,
                    status: row.get(6)?,
                    created_at: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            })?
            .filter_map(|r| r.ok())
            .map(MatchBody::from)
            .collect();

        Ok::<_, AppError>(rows)
    })
    .await??;

    Ok(Json(matches))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_uses_placeholder_for_absent_sides() {
        assert_eq!(pair_key(Some("n1"), Some("o1")), "n1|o1");
        assert_eq!(pair_key(Some("n1"), None), "n1|-");
        assert_eq!(pair_key(None, Some("o1")), "-|o1");
    }

    #[test]
    fn other_parties_dedups_and_excludes_actor() {
        let row = MatchRow {
            id: "m1".into(),
            need_id: Some("n1".into()),
            offer_id: Some("o1".into()),
            initiated_by: "helper".into(),
            responded_by: None,
            message: None,
            status: "pending".into(),
            created_at: String::new(),
            updated_at: String::new(),
        };
        let owners = (Some("requester".to_string()), Some("helper".to_string()));
        let parties = other_parties(&row, &owners, "helper");
        assert_eq!(parties, vec!["requester".to_string()]);
    }
}
