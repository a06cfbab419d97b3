//! Match lifecycle state machine.
//!
//! `pending → {accepted, rejected}`, `accepted → completed`. Rejected and
//! completed are terminal; no transition leaves a terminal state.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

impl MatchStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed)
    }
}

/// Whether the state machine permits `from → to`.
pub fn can_transition(from: MatchStatus, to: MatchStatus) -> bool {
    matches!(
        (from, to),
        (MatchStatus::Pending, MatchStatus::Accepted)
            | (MatchStatus::Pending, MatchStatus::Rejected)
            | (MatchStatus::Accepted, MatchStatus::Completed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for s in ["pending", "accepted", "rejected", "completed"] {
            assert_eq!(MatchStatus::from_str(s).unwrap().as_str(), s);
        }
        assert!(MatchStatus::from_str("cancelled").is_none());
    }

    #[test]
    fn pending_branches() {
        assert!(can_transition(MatchStatus::Pending, MatchStatus::Accepted));
        assert!(can_transition(MatchStatus::Pending, MatchStatus::Rejected));
        assert!(!can_transition(MatchStatus::Pending, MatchStatus::Completed));
    }

    #[test]
    fn accepted_only_completes() {
        assert!(can_transition(MatchStatus::Accepted, MatchStatus::Completed));
        assert!(!can_transition(MatchStatus::Accepted, MatchStatus::Rejected));
        assert!(!can_transition(MatchStatus::Accepted, MatchStatus::Pending));
    }

    #[test]
    fn terminal_states_are_dead_ends() {
        for terminal in [MatchStatus::Rejected, MatchStatus::Completed] {
            assert!(terminal.is_terminal());
            for to in [
                MatchStatus::Pending,
                MatchStatus::Accepted,
                MatchStatus::Rejected,
                MatchStatus::Completed,
            ] {
                assert!(!can_transition(terminal, to));
            }
        }
    }

    #[test]
    fn no_self_transitions() {
        for s in [
            MatchStatus::Pending,
            MatchStatus::Accepted,
            MatchStatus::Rejected,
            MatchStatus::Completed,
        ] {
            assert!(!can_transition(s, s));
        }
    }
}
