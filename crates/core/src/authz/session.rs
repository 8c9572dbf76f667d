use serde::Serialize;

use super::Role;
use crate::types::Identity;

/// A client's view of who is signed in and what they may do.
///
/// Derived from identity-provider session changes and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub is_admin: bool,
    /// True while the identity provider has not reported yet or a role
    /// resolution is outstanding.
    pub loading: bool,
}

impl SessionState {
    /// State before the identity provider's first notification.
    #[must_use]
    pub const fn initial() -> Self {
        Self {
            identity: None,
            is_admin: false,
            loading: true,
        }
    }

    /// Enter the resolving state for a new identity (or none).
    ///
    /// The admin flag is cleared so it can never pair with an identity other
    /// than the one it was resolved for.
    pub fn begin(&mut self, identity: Option<Identity>) {
        self.identity = identity;
        self.is_admin = false;
        self.loading = true;
    }

    /// Apply a finished role resolution.
    pub const fn settle(&mut self, role: Role) {
        self.is_admin = role.is_admin();
        self.loading = false;
    }

    #[must_use]
    pub const fn is_signed_in(&self) -> bool {
        self.identity.is_some()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::initial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Email, Uid};

    fn identity(uid: &str) -> Identity {
        Identity {
            uid: Uid::new(uid),
            email: Email::parse(&format!("{uid}@example.com")).unwrap_or_else(|_| unreachable!()),
            display_name: None,
        }
    }

    #[test]
    fn begin_clears_admin_flag_for_new_identity() {
        let mut state = SessionState::initial();
        state.begin(Some(identity("a")));
        state.settle(Role::Admin);
        assert!(state.is_admin);
        assert!(!state.loading);

        state.begin(Some(identity("b")));
        assert!(!state.is_admin);
        assert!(state.loading);
        assert_eq!(state.identity.as_ref().map(|i| i.uid.as_str()), Some("b"));
    }
}
