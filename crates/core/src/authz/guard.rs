//! Route guard decision.
//!
//! The guard is a navigation convenience: it keeps users away from views
//! they cannot use, while the access policy at the store remains the gate
//! that actually protects data.

use super::SessionState;

/// What a protected route requires of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteRequirement {
    pub admin_only: bool,
}

impl RouteRequirement {
    pub const SIGNED_IN: Self = Self { admin_only: false };
    pub const ADMIN: Self = Self { admin_only: true };
}

/// Outcome of guarding one navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Session still resolving; show a placeholder.
    Loading,
    RedirectToSignIn,
    RedirectToHome,
    Render,
}

/// Decide a navigation.
///
/// Checks run in a fixed order: loading, then authentication, then
/// authorization. An unresolved role therefore never causes an
/// authorization redirect.
#[must_use]
pub const fn evaluate(state: &SessionState, requirement: RouteRequirement) -> GuardOutcome {
    if state.loading {
        return GuardOutcome::Loading;
    }
    if state.identity.is_none() {
        return GuardOutcome::RedirectToSignIn;
    }
    if requirement.admin_only && !state.is_admin {
        return GuardOutcome::RedirectToHome;
    }
    GuardOutcome::Render
}
