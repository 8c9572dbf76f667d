use serde::{Deserialize, Serialize};

/// Resolved privilege of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    /// Any identity without an Authorization Record, and the fail-closed
    /// result of a failed lookup.
    #[default]
    Customer,
}

impl Role {
    /// Interpret an Authorization Record lookup: existence means admin.
    #[must_use]
    pub const fn from_record_exists(exists: bool) -> Self {
        if exists { Self::Admin } else { Self::Customer }
    }

    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}
