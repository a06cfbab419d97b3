//! Needs and offers: the entities the Match Coordinator pairs up.
//!
//! Creation and read endpoints here are the boundary surface; listing,
//! search, and geospatial filtering belong to the excluded CRUD layer.

pub mod needs;
pub mod offers;

/// Need lifecycle statuses. Only the Match Coordinator moves a need between
/// these as a cascade side effect of match transitions.
pub mod need_status {
    pub const OPEN: &str = "open";
    pub const MATCHED: &str = "matched";
    pub const FULFILLED: &str = "fulfilled";
    pub const CLOSED: &str = "closed";
}

pub mod offer_status {
    pub const ACTIVE: &str = "active";
    pub const CLOSED: &str = "closed";
}

/// Closed aid category enumeration. Stored lowercase in the DB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Food,
    Shelter,
    Housing,
    Medical,
    Legal,
    Clothing,
    Transport,
    Education,
    Other,
}

impl Category {
    /// Case-insensitive parse.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "food" => Some(Self::Food),
            "shelter" => Some(Self::Shelter),
            "housing" => Some(Self::Housing),
            "medical" => Some(Self::Medical),
            "legal" => Some(Self::Legal),
            "clothing" => Some(Self::Clothing),
            "transport" => Some(Self::Transport),
            "education" => Some(Self::Education),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Food => "food",
            Self::Shelter => "shelter",
            Self::Housing => "housing",
            Self::Medical => "medical",
            Self::Legal => "legal",
            Self::Clothing => "clothing",
            Self::Transport => "transport",
            Self::Education => "education",
            Self::Other => "other",
        }
    }

    /// Two categories can be matched when they are identical, or for the one
    /// cross-equivalence in the domain: shelter and housing describe the same
    /// kind of aid from the two sides of the platform.
    pub fn compatible_with(self, other: Category) -> bool {
        if self == other {
            return true;
        }
        matches!(
            (self, other),
            (Category::Shelter, Category::Housing) | (Category::Housing, Category::Shelter)
        )
    }
}
