//! Email/password identity provider.
//!
//! Issues opaque bearer tokens for signed-in identities and verifies them
//! for the document and blob stores. Passwords are hashed with Argon2id.
//!
//! # Tokens
//!
//! Tokens are 256-bit random values kept in a `moka` cache with a fixed
//! time-to-live. A password reset revokes every token of the identity; a
//! password change revokes every token except the one that made the change.

pub mod accounts;
pub mod client;
mod error;

use std::sync::Arc;
use std::time::Duration;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use moka::future::Cache;
use rand::RngCore;
use url::Url;

use right_water_core::types::{Email, IdToken, Identity, Uid};

pub use accounts::{Account, AccountRepository, MemoryAccounts};
pub use client::{AuthClient, SessionChanges};
pub use error::AuthError;

use crate::db::RepositoryError;
use crate::services::mail::Mailer;
use crate::store::TokenVerifier;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum display name length.
pub const MAX_DISPLAY_NAME_LENGTH: usize = 100;

/// How long a password reset code stays valid.
const RESET_CODE_TTL: chrono::Duration = chrono::Duration::hours(1);

/// A signed-in identity together with the token proving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub identity: Identity,
    pub token: IdToken,
}

/// The identity provider boundary.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account and sign it in.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthSession, AuthError>;

    /// Sign in with email and password.
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    /// Revoke a token.
    async fn sign_out(&self, token: &IdToken);

    /// The identity a token currently proves, if any.
    async fn identity_for(&self, token: &IdToken) -> Option<Identity>;

    /// Email a password reset link. Unknown addresses succeed silently.
    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError>;

    /// Redeem a reset code and set a new password.
    async fn confirm_password_reset(&self, code: &str, new_password: &str)
    -> Result<(), AuthError>;

    /// Change the display name of the token's identity.
    async fn update_display_name(
        &self,
        token: &IdToken,
        display_name: &str,
    ) -> Result<Identity, AuthError>;

    /// Re-check the current password, then set a new one.
    async fn change_password(
        &self,
        token: &IdToken,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError>;
}

/// The built-in identity provider.
#[derive(Clone)]
pub struct IdentityService {
    inner: Arc<IdentityServiceInner>,
}

struct IdentityServiceInner {
    accounts: Arc<dyn AccountRepository>,
    tokens: Cache<String, Uid>,
    mailer: Arc<dyn Mailer>,
    base_url: Url,
}

impl IdentityService {
    /// Create an identity service.
    ///
    /// `base_url` is used to build the links in password reset emails.
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        mailer: Arc<dyn Mailer>,
        base_url: Url,
        token_ttl: Duration,
    ) -> Self {
        let tokens = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(token_ttl)
            .support_invalidation_closures()
            .build();

        Self {
            inner: Arc::new(IdentityServiceInner {
                accounts,
                tokens,
                mailer,
                base_url,
            }),
        }
    }

    async fn issue_token(&self, account: &Account) -> AuthSession {
        let token = random_token();
        self.inner
            .tokens
            .insert(token.clone(), account.uid.clone())
            .await;
        AuthSession {
            identity: account.identity(),
            token: IdToken::new(token),
        }
    }

    async fn account_for(&self, token: &IdToken) -> Result<Account, AuthError> {
        let uid = self
            .inner
            .tokens
            .get(token.expose())
            .await
            .ok_or(AuthError::NotSignedIn)?;
        self.inner
            .accounts
            .find_by_uid(&uid)
            .await?
            .ok_or(AuthError::NotSignedIn)
    }

    /// Drop every token of `uid` except `keep`.
    fn revoke_tokens_of(&self, uid: &Uid, keep: Option<&IdToken>) {
        let uid = uid.clone();
        let keep = keep.map(|t| t.expose().to_owned());
        let result = self
            .inner
            .tokens
            .invalidate_entries_if(move |token, owner| {
                owner == &uid && keep.as_deref() != Some(token.as_str())
            });
        if let Err(e) = result {
            tracing::error!(error = %e, "failed to revoke tokens");
        }
    }

    fn reset_link(&self, code: &str) -> Url {
        let mut link = self.inner.base_url.clone();
        link.set_path("/auth/password/reset");
        link.query_pairs_mut()
            .append_pair("code", code)
            .append_pair("continue", "/auth/login");
        link
    }
}

#[async_trait]
impl IdentityProvider for IdentityService {
    #[tracing::instrument(skip(self, password, display_name), fields(email = %email))]
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthSession, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;
        let display_name = validate_display_name(display_name)?;

        if self.inner.accounts.find_by_email(&email).await?.is_some() {
            return Err(AuthError::UserAlreadyExists);
        }

        let account = Account {
            uid: Uid::generate(),
            email,
            display_name: Some(display_name),
            password_hash: hash_password(password)?,
            created_at: Utc::now(),
        };
        self.inner
            .accounts
            .create(&account)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(uid = %account.uid, "account created");
        Ok(self.issue_token(&account).await)
    }

    #[tracing::instrument(skip(self, password), fields(email = %email))]
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;
        let account = self
            .inner
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        verify_password(password, &account.password_hash)?;

        tracing::info!(uid = %account.uid, "signed in");
        Ok(self.issue_token(&account).await)
    }

    async fn sign_out(&self, token: &IdToken) {
        self.inner.tokens.invalidate(token.expose()).await;
    }

    async fn identity_for(&self, token: &IdToken) -> Option<Identity> {
        match self.account_for(token).await {
            Ok(account) => Some(account.identity()),
            Err(AuthError::NotSignedIn) => None,
            Err(e) => {
                tracing::warn!(error = %e, "identity lookup failed");
                None
            }
        }
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        let Some(account) = self.inner.accounts.find_by_email(&email).await? else {
            tracing::debug!("password reset requested for unknown email");
            return Ok(());
        };

        let code = random_token();
        self.inner
            .accounts
            .store_reset_code(&code, &account.uid, Utc::now() + RESET_CODE_TTL)
            .await?;
        let link = self.reset_link(&code);
        self.inner
            .mailer
            .send_password_reset(&account.email, link.as_str())
            .await?;
        Ok(())
    }

    async fn confirm_password_reset(
        &self,
        code: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        validate_password(new_password)?;
        let (uid, expires_at) = self
            .inner
            .accounts
            .take_reset_code(code)
            .await?
            .ok_or(AuthError::InvalidResetCode)?;
        if expires_at < Utc::now() {
            return Err(AuthError::InvalidResetCode);
        }

        let hash = hash_password(new_password)?;
        self.inner.accounts.set_password_hash(&uid, &hash).await?;
        self.revoke_tokens_of(&uid, None);
        tracing::info!(uid = %uid, "password reset");
        Ok(())
    }

    async fn update_display_name(
        &self,
        token: &IdToken,
        display_name: &str,
    ) -> Result<Identity, AuthError> {
        let display_name = validate_display_name(display_name)?;
        let mut account = self.account_for(token).await?;
        self.inner
            .accounts
            .set_display_name(&account.uid, &display_name)
            .await?;
        account.display_name = Some(display_name);
        Ok(account.identity())
    }

    async fn change_password(
        &self,
        token: &IdToken,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let account = self.account_for(token).await?;
        verify_password(current_password, &account.password_hash)?;
        validate_password(new_password)?;

        let hash = hash_password(new_password)?;
        self.inner
            .accounts
            .set_password_hash(&account.uid, &hash)
            .await?;
        self.revoke_tokens_of(&account.uid, Some(token));
        tracing::info!(uid = %account.uid, "password changed");
        Ok(())
    }
}

#[async_trait]
impl TokenVerifier for IdentityService {
    async fn verify(&self, token: &IdToken) -> Option<Uid> {
        self.inner.tokens.get(token.expose()).await
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Validate password requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

fn validate_display_name(display_name: &str) -> Result<String, AuthError> {
    let trimmed = display_name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        return Err(AuthError::InvalidDisplayName);
    }
    Ok(trimmed.to_owned())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::mail::RecordingMailer;

    fn service() -> (IdentityService, RecordingMailer) {
        let mailer = RecordingMailer::default();
        let service = IdentityService::new(
            Arc::new(MemoryAccounts::new()),
            Arc::new(mailer.clone()),
            Url::parse("https://shop.example").unwrap(),
            Duration::from_secs(3600),
        );
        (service, mailer)
    }

    fn code_from(link: &str) -> String {
        let url = Url::parse(link).unwrap();
        url.query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("longenough").is_ok());
    }

    #[test]
    fn test_validate_display_name() {
        assert_eq!(validate_display_name("  Ana ").unwrap(), "Ana");
        assert!(validate_display_name("   ").is_err());
        assert!(validate_display_name(&"x".repeat(101)).is_err());
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(verify_password("wrong horse", &hash).is_err());
    }

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let (service, _) = service();
        let created = service
            .sign_up("ana@example.com", "password123", "Ana")
            .await
            .unwrap();
        assert_eq!(created.identity.display_name.as_deref(), Some("Ana"));

        let signed_in = service
            .sign_in("ana@example.com", "password123")
            .await
            .unwrap();
        assert_eq!(signed_in.identity.uid, created.identity.uid);
        assert_ne!(signed_in.token, created.token);
        assert_eq!(
            service.verify(&signed_in.token).await,
            Some(created.identity.uid)
        );
    }

    #[tokio::test]
    async fn duplicate_sign_up_is_rejected() {
        let (service, _) = service();
        service
            .sign_up("ana@example.com", "password123", "Ana")
            .await
            .unwrap();
        let err = service
            .sign_up("ana@example.com", "password456", "Other")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserAlreadyExists));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let (service, _) = service();
        service
            .sign_up("ana@example.com", "password123", "Ana")
            .await
            .unwrap();

        let wrong = service.sign_in("ana@example.com", "nope-nope").await;
        let unknown = service.sign_in("bob@example.com", "password123").await;
        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn sign_out_revokes_token() {
        let (service, _) = service();
        let session = service
            .sign_up("ana@example.com", "password123", "Ana")
            .await
            .unwrap();
        service.sign_out(&session.token).await;
        assert!(service.verify(&session.token).await.is_none());
        assert!(service.identity_for(&session.token).await.is_none());
    }

    #[tokio::test]
    async fn password_reset_flow() {
        let (service, mailer) = service();
        let session = service
            .sign_up("ana@example.com", "password123", "Ana")
            .await
            .unwrap();

        service.send_password_reset("ana@example.com").await.unwrap();
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("continue=%2Fauth%2Flogin"));
        let code = code_from(&sent[0].1);

        service
            .confirm_password_reset(&code, "new-password")
            .await
            .unwrap();
        assert!(service.verify(&session.token).await.is_none());
        assert!(service.sign_in("ana@example.com", "new-password").await.is_ok());

        // Codes are single-use.
        let reused = service.confirm_password_reset(&code, "another-one").await;
        assert!(matches!(reused, Err(AuthError::InvalidResetCode)));
    }

    #[tokio::test]
    async fn reset_for_unknown_email_sends_nothing() {
        let (service, mailer) = service();
        service.send_password_reset("nobody@example.com").await.unwrap();
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn change_password_requires_current_password() {
        let (service, _) = service();
        let first = service
            .sign_up("ana@example.com", "password123", "Ana")
            .await
            .unwrap();
        let second = service
            .sign_in("ana@example.com", "password123")
            .await
            .unwrap();

        let wrong = service
            .change_password(&first.token, "not-it-at-all", "new-password")
            .await;
        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));

        service
            .change_password(&first.token, "password123", "new-password")
            .await
            .unwrap();
        service.inner.tokens.run_pending_tasks().await;
        assert!(service.verify(&first.token).await.is_some());
        assert!(service.verify(&second.token).await.is_none());
    }

    #[tokio::test]
    async fn update_display_name_returns_fresh_identity() {
        let (service, _) = service();
        let session = service
            .sign_up("ana@example.com", "password123", "Ana")
            .await
            .unwrap();
        let identity = service
            .update_display_name(&session.token, "Ana Maria")
            .await
            .unwrap();
        assert_eq!(identity.display_name.as_deref(), Some("Ana Maria"));
        assert_eq!(
            service.identity_for(&session.token).await.unwrap(),
            identity
        );
    }
}
