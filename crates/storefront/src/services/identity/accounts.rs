//! Account storage for the identity provider.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use right_water_core::types::{Email, Identity, Uid};

use crate::db::RepositoryError;

/// A stored email/password identity.
#[derive(Debug, Clone)]
pub struct Account {
    pub uid: Uid,
    pub email: Email,
    pub display_name: Option<String>,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// The public identity of the account.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity {
            uid: self.uid.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Persistence for accounts and reset codes.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Store a new account. Fails with [`RepositoryError::Conflict`] if the
    /// email is taken.
    async fn create(&self, account: &Account) -> Result<(), RepositoryError>;

    async fn find_by_email(&self, email: &Email) -> Result<Option<Account>, RepositoryError>;

    async fn find_by_uid(&self, uid: &Uid) -> Result<Option<Account>, RepositoryError>;

    async fn set_display_name(&self, uid: &Uid, display_name: &str) -> Result<(), RepositoryError>;

    async fn set_password_hash(&self, uid: &Uid, password_hash: &str)
    -> Result<(), RepositoryError>;

    async fn store_reset_code(
        &self,
        code: &str,
        uid: &Uid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Remove a reset code and return its owner and expiry.
    async fn take_reset_code(
        &self,
        code: &str,
    ) -> Result<Option<(Uid, DateTime<Utc>)>, RepositoryError>;
}

/// In-memory [`AccountRepository`] for tests and local development.
#[derive(Default)]
pub struct MemoryAccounts {
    accounts: RwLock<HashMap<Uid, Account>>,
    resets: RwLock<HashMap<String, (Uid, DateTime<Utc>)>>,
}

impl MemoryAccounts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for MemoryAccounts {
    async fn create(&self, account: &Account) -> Result<(), RepositoryError> {
        let mut accounts = self.accounts.write().await;
        if accounts.values().any(|a| a.email == account.email) {
            return Err(RepositoryError::Conflict("account already exists".to_owned()));
        }
        accounts.insert(account.uid.clone(), account.clone());
        Ok(())
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<Account>, RepositoryError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|a| &a.email == email).cloned())
    }

    async fn find_by_uid(&self, uid: &Uid) -> Result<Option<Account>, RepositoryError> {
        Ok(self.accounts.read().await.get(uid).cloned())
    }

    async fn set_display_name(&self, uid: &Uid, display_name: &str) -> Result<(), RepositoryError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(uid).ok_or(RepositoryError::NotFound)?;
        account.display_name = Some(display_name.to_owned());
        Ok(())
    }

    async fn set_password_hash(
        &self,
        uid: &Uid,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(uid).ok_or(RepositoryError::NotFound)?;
        password_hash.clone_into(&mut account.password_hash);
        drop(accounts);
        self.resets.write().await.retain(|_, (owner, _)| owner != uid);
        Ok(())
    }

    async fn store_reset_code(
        &self,
        code: &str,
        uid: &Uid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.resets
            .write()
            .await
            .insert(code.to_owned(), (uid.clone(), expires_at));
        Ok(())
    }

    async fn take_reset_code(
        &self,
        code: &str,
    ) -> Result<Option<(Uid, DateTime<Utc>)>, RepositoryError> {
        Ok(self.resets.write().await.remove(code))
    }
}
