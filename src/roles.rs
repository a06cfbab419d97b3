//! Closed role set and capability checks.
//!
//! Authorization questions are answered by pure functions over (actor, resource)
//! rather than role-string comparisons scattered through handlers, so each
//! capability is testable in isolation.

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Requester,
    Helper,
    Organization,
    Administrator,
}

impl Role {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "requester" => Some(Self::Requester),
            "helper" => Some(Self::Helper),
            "organization" => Some(Self::Organization),
            "administrator" => Some(Self::Administrator),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requester => "requester",
            Self::Helper => "helper",
            Self::Organization => "organization",
            Self::Administrator => "administrator",
        }
    }
}

/// Only organizations and administrators may publish platform-wide announcements.
pub fn can_publish_announcements(role: Role) -> bool {
    matches!(role, Role::Organization | Role::Administrator)
}

/// A match may be acted on by the need owner, the offer owner, or the
/// original initiator — nobody else, regardless of role.
pub fn is_match_party(
    actor_id: &str,
    initiated_by: &str,
    need_owner: Option<&str>,
    offer_owner: Option<&str>,
) -> bool {
    actor_id == initiated_by
        || need_owner.is_some_and(|o| o == actor_id)
        || offer_owner.is_some_and(|o| o == actor_id)
}

/// Look up the actor's role and fail with Forbidden unless `check` allows it.
/// Reads the current role from the DB (not the token) to reflect live changes.
pub fn require_capability(
    conn: &rusqlite::Connection,
    user_id: &str,
    check: fn(Role) -> bool,
) -> Result<(), AppError> {
    let role_str: String = conn
        .query_row("SELECT role FROM users WHERE id = ?1", [user_id], |row| {
            row.get(0)
        })
        .map_err(|_| AppError::forbidden("unknown user"))?;

    let role = Role::from_str(&role_str).ok_or_else(|| AppError::forbidden("unknown role"))?;

    if check(role) {
        Ok(())
    } else {
        Err(AppError::forbidden("insufficient role"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips() {
        for s in ["requester", "helper", "organization", "administrator"] {
            assert_eq!(Role::from_str(s).unwrap().as_str(), s);
        }
        assert!(Role::from_str("admin").is_none());
    }

    #[test]
    fn announcement_capability_is_org_or_admin() {
        assert!(!can_publish_announcements(Role::Requester));
        assert!(!can_publish_announcements(Role::Helper));
        assert!(can_publish_announcements(Role::Organization));
        assert!(can_publish_announcements(Role::Administrator));
    }

    #[test]
    fn match_party_check() {
        assert!(is_match_party("u1", "u1", None, None));
        assert!(is_match_party("u2", "u1", Some("u2"), None));
        assert!(is_match_party("u3", "u1", Some("u2"), Some("u3")));
        assert!(!is_match_party("u4", "u1", Some("u2"), Some("u3")));
    }
}
