//! Per-client view of the identity provider.
//!
//! An [`AuthClient`] holds the current [`AuthSession`] of one browser client
//! and publishes every change to subscribers, the way an identity SDK fires
//! its auth-state listener.

use std::sync::Arc;

use tokio::sync::watch;

use right_water_core::types::{IdToken, Identity};

use super::{AuthError, AuthSession, IdentityProvider};

/// One client's sign-in state.
#[derive(Clone)]
pub struct AuthClient {
    provider: Arc<dyn IdentityProvider>,
    current: watch::Sender<Option<AuthSession>>,
}

impl AuthClient {
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (current, _) = watch::channel(None);
        Self { provider, current }
    }

    /// Pick up a session from a stored token.
    ///
    /// A token the provider no longer accepts signs the client out.
    pub async fn restore(&self, token: IdToken) -> Option<Identity> {
        let identity = self.provider.identity_for(&token).await;
        self.publish(
            identity
                .clone()
                .map(|identity| AuthSession { identity, token }),
        );
        identity
    }

    /// # Errors
    ///
    /// See [`IdentityProvider::sign_up`].
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthSession, AuthError> {
        let session = self.provider.sign_up(email, password, display_name).await?;
        self.publish(Some(session.clone()));
        Ok(session)
    }

    /// # Errors
    ///
    /// See [`IdentityProvider::sign_in`].
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let session = self.provider.sign_in(email, password).await?;
        self.publish(Some(session.clone()));
        Ok(session)
    }

    pub async fn sign_out(&self) {
        if let Some(token) = self.token() {
            self.provider.sign_out(&token).await;
        }
        self.publish(None);
    }

    /// Update the display name and refresh the session identity.
    ///
    /// # Errors
    ///
    /// [`AuthError::NotSignedIn`] without a session.
    pub async fn update_profile(&self, display_name: &str) -> Result<Identity, AuthError> {
        let token = self.token().ok_or(AuthError::NotSignedIn)?;
        let identity = self
            .provider
            .update_display_name(&token, display_name)
            .await?;
        self.publish(Some(AuthSession {
            identity: identity.clone(),
            token,
        }));
        Ok(identity)
    }

    /// Re-authenticate with the current password, then change it.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] when the current password is wrong.
    pub async fn reauthenticate_and_change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let token = self.token().ok_or(AuthError::NotSignedIn)?;
        self.provider
            .change_password(&token, current_password, new_password)
            .await
    }

    #[must_use]
    pub fn current(&self) -> Option<AuthSession> {
        self.current.borrow().clone()
    }

    #[must_use]
    pub fn token(&self) -> Option<IdToken> {
        self.current.borrow().as_ref().map(|s| s.token.clone())
    }

    /// Subscribe to session changes, starting with the current session.
    #[must_use]
    pub fn subscribe(&self) -> SessionChanges {
        SessionChanges {
            receiver: self.current.subscribe(),
            primed: false,
        }
    }

    fn publish(&self, session: Option<AuthSession>) {
        // Every publish is a notification, even if the value is unchanged.
        self.current.send_replace(session);
    }
}

/// Owned subscription to an [`AuthClient`]'s session changes.
///
/// Dropping it unsubscribes. Changes published faster than they are read
/// collapse into the latest one.
pub struct SessionChanges {
    receiver: watch::Receiver<Option<AuthSession>>,
    primed: bool,
}

impl SessionChanges {
    /// The next session value. The first call returns the current session
    /// immediately; `None` means the client is gone.
    pub async fn next(&mut self) -> Option<Option<AuthSession>> {
        if self.primed {
            self.receiver.changed().await.ok()?;
        } else {
            self.primed = true;
        }
        Some(self.receiver.borrow_and_update().clone())
    }
}
