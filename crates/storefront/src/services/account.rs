//! Account lifecycle spanning the identity provider and the `users`
//! collection.

use chrono::Utc;
use serde_json::json;
use thiserror::Error;

use right_water_core::authz::Collection;
use right_water_core::records::UserProfile;
use right_water_core::types::{IdToken, Identity, ProfileRole, Uid};

use crate::services::identity::{AuthClient, AuthError, AuthSession};
use crate::store::{DocumentStore, StoreError, to_body};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Sign-up and profile maintenance.
#[derive(Clone)]
pub struct AccountService {
    store: DocumentStore,
}

impl AccountService {
    #[must_use]
    pub const fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    /// Create an identity, sign the client in, and write its profile with
    /// the `user` role label.
    ///
    /// # Errors
    ///
    /// Identity provider errors, or store errors writing the profile.
    pub async fn register(
        &self,
        client: &AuthClient,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthSession, AccountError> {
        let session = client.sign_up(email, password, display_name).await?;
        let identity = &session.identity;

        let profile = UserProfile {
            uid: identity.uid.clone(),
            display_name: identity.display_name.clone().unwrap_or_default(),
            email: identity.email.to_string(),
            created_at: Utc::now(),
            role: ProfileRole::User,
        };
        self.store
            .create(
                Some(&session.token),
                Collection::Users,
                Some(identity.uid.as_str()),
                to_body(&profile)?,
            )
            .await
            .inspect_err(|e| {
                tracing::error!(uid = %identity.uid, error = %e, "failed to write user profile");
            })?;

        Ok(session)
    }

    /// # Errors
    ///
    /// Store errors.
    pub async fn profile(
        &self,
        token: Option<&IdToken>,
        uid: &Uid,
    ) -> Result<Option<UserProfile>, StoreError> {
        self.store
            .get(token, Collection::Users, uid.as_str())
            .await?
            .map(|doc| doc.decode())
            .transpose()
    }

    /// Change the display name on the identity and on the profile.
    ///
    /// # Errors
    ///
    /// [`AuthError::NotSignedIn`] without a session; store errors.
    pub async fn update_display_name(
        &self,
        client: &AuthClient,
        display_name: &str,
    ) -> Result<Identity, AccountError> {
        let identity = client.update_profile(display_name).await?;
        let token = client.token().ok_or(AuthError::NotSignedIn)?;
        self.store
            .update(
                Some(&token),
                Collection::Users,
                identity.uid.as_str(),
                json!({ "displayName": identity.display_name }),
            )
            .await?;
        Ok(identity)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use url::Url;

    use super::*;
    use crate::services::identity::{IdentityService, MemoryAccounts};
    use crate::services::mail::LogMailer;
    use crate::store::MemoryBackend;

    fn setup() -> (AccountService, AuthClient) {
        let identity = IdentityService::new(
            Arc::new(MemoryAccounts::new()),
            Arc::new(LogMailer),
            Url::parse("http://localhost").unwrap(),
            Duration::from_secs(60),
        );
        let store = DocumentStore::new(Arc::new(MemoryBackend::new()), Arc::new(identity.clone()));
        (AccountService::new(store), AuthClient::new(Arc::new(identity)))
    }

    #[tokio::test]
    async fn register_writes_profile_with_user_label() {
        let (accounts, client) = setup();
        let session = accounts
            .register(&client, "ana@example.com", "password123", "Ana")
            .await
            .unwrap();

        let profile = accounts
            .profile(Some(&session.token), &session.identity.uid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.role, ProfileRole::User);
        assert_eq!(profile.display_name, "Ana");
        assert_eq!(profile.email, "ana@example.com");
    }

    #[tokio::test]
    async fn profiles_are_private() {
        let (accounts, client) = setup();
        let ana = accounts
            .register(&client, "ana@example.com", "password123", "Ana")
            .await
            .unwrap();
        let bob = accounts
            .register(&client, "bob@example.com", "password123", "Bob")
            .await
            .unwrap();

        let peek = accounts.profile(Some(&bob.token), &ana.identity.uid).await;
        assert!(matches!(peek, Err(StoreError::PermissionDenied)));
    }

    #[tokio::test]
    async fn display_name_update_reaches_profile() {
        let (accounts, client) = setup();
        let session = accounts
            .register(&client, "ana@example.com", "password123", "Ana")
            .await
            .unwrap();
        accounts
            .update_display_name(&client, "Ana Maria")
            .await
            .unwrap();

        let profile = accounts
            .profile(Some(&session.token), &session.identity.uid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.display_name, "Ana Maria");
    }
}
