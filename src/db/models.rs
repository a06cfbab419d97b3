//! Database row types and shared fetch helpers.
//! These correspond 1:1 to the SQLite schema defined in migrations.rs.

use rusqlite::{Connection, OptionalExtension};

use crate::error::AppError;

/// User record in the users table
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Aid request with a category and a status owned by the Match Coordinator
#[derive(Debug, Clone)]
pub struct Need {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub status: String,
    pub created_at: String,
}

/// Available aid/resource with a running helped counter
#[derive(Debug, Clone)]
pub struct Offer {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub status: String,
    pub helped_count: i64,
    pub created_at: String,
}

/// Match record with its lifecycle status
#[derive(Debug, Clone)]
pub struct MatchRow {
    pub id: String,
    pub need_id: Option<String>,
    pub offer_id: Option<String>,
    pub initiated_by: String,
    pub responded_by: Option<String>,
    pub message: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

pub fn get_user(conn: &Connection, id: &str) -> Result<Option<User>, AppError> {
    let user = conn
        .query_row(
            "SELECT id, display_name, role, created_at, updated_at FROM users WHERE id = ?1",
            [id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    display_name: row.get(1)?,
                    role: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

pub fn get_need(conn: &Connection, id: &str) -> Result<Option<Need>, AppError> {
    let need = conn
        .query_row(
            "SELECT id, owner_id, title, description, category, status, created_at
             FROM needs WHERE id = ?1",
            [id],
            |row| {
                Ok(Need {
                    id: row.get(0)?,
                    owner_id: row.get(1)?,
                    title: row.get(2)?,
                    description: row.get(3)?,
                    category: row.get(4)?,
                    status: row.get(5)?,
                    created_at: row.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(need)
}

pub fn get_offer(conn: &Connection, id: &str) -> Result<Option<Offer>, AppError> {
    let offer = conn
        .query_row(
            "SELECT id, owner_id, title, description, category, status, helped_count, created_at
             FROM offers WHERE id = ?1",
            [id],
            |row| {
                Ok(Offer {
                    id: row.get(0)?,
                    owner_id: row.get(1)?,
                    title: row.get(2)?,
                    description: row.get(3)?,
                    category: row.get(4)?,
                    status: row.get(5)?,
                    helped_count: row.get(6)?,
                    created_at: row.get(7)?,
                })
            },
        )
        .optional()?;
    Ok(offer)
}
