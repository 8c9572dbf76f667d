//! Administrator record management.
//!
//! Administrator privilege is the existence of an `admins/{uid}` document.
//! The storefront only reads these records; they are written here, directly
//! against the document backend and outside the access policy.
//!
//! # Usage
//!
//! ```bash
//! rw-cli admin grant --email owner@example.com --note "store owner"
//! rw-cli admin revoke --uid 3f9c2b7a1d4e8f6a0b5c
//! rw-cli admin list
//! ```
//!
//! # Environment Variables
//!
//! - `RIGHT_WATER_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection
//!   string for the storefront

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use right_water_core::authz::Collection;
use right_water_core::records::AuthorizationRecord;
use right_water_core::types::{Email, EmailError, Uid};
use right_water_storefront::db::{self, PgAccounts, PgBackend, RepositoryError};
use right_water_storefront::services::identity::AccountRepository;
use right_water_storefront::store::{DocumentBackend, Query, StoreError, to_body};

use super::database_url;

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    #[error("Account lookup failed: {0}")]
    Repository(#[from] RepositoryError),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// No account for the given uid or email.
    #[error("No account found for {0}")]
    UnknownAccount(String),

    #[error("{0} is already an administrator")]
    AlreadyAdmin(Uid),

    #[error("{0} is not an administrator")]
    NotAdmin(Uid),
}

/// Who a command acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Uid(String),
    Email(String),
}

/// The storage the admin commands work against.
pub struct AdminBackends {
    pub documents: Arc<dyn DocumentBackend>,
    pub accounts: Arc<dyn AccountRepository>,
}

/// An administrator as listed.
#[derive(Debug)]
pub struct AdminEntry {
    pub uid: Uid,
    /// Email of the account, if it still exists.
    pub email: Option<String>,
    pub record: AuthorizationRecord,
}

/// Connect to the storefront database.
///
/// # Errors
///
/// Returns an error if the URL is missing or the database is unreachable.
pub async fn connect() -> Result<AdminBackends, AdminError> {
    let database_url =
        database_url().ok_or(AdminError::MissingEnvVar("RIGHT_WATER_DATABASE_URL"))?;

    tracing::info!("Connecting to storefront database...");
    let pool = db::create_pool(&database_url).await?;

    Ok(AdminBackends {
        documents: Arc::new(PgBackend::new(pool.clone())),
        accounts: Arc::new(PgAccounts::new(pool)),
    })
}

async fn resolve(backends: &AdminBackends, target: &Target) -> Result<Uid, AdminError> {
    let account = match target {
        Target::Uid(uid) => backends.accounts.find_by_uid(&Uid::new(uid.as_str())).await?,
        Target::Email(email) => {
            let email = Email::parse(email)?;
            backends.accounts.find_by_email(&email).await?
        }
    };
    let described = match target {
        Target::Uid(uid) | Target::Email(uid) => uid.clone(),
    };
    account
        .map(|a| a.uid)
        .ok_or(AdminError::UnknownAccount(described))
}

/// Create the authorization record for an existing account.
///
/// # Errors
///
/// [`AdminError::UnknownAccount`] if no account matches, and
/// [`AdminError::AlreadyAdmin`] if the record already exists.
pub async fn grant(
    backends: &AdminBackends,
    target: &Target,
    note: Option<String>,
) -> Result<Uid, AdminError> {
    let uid = resolve(backends, target).await?;
    let record = AuthorizationRecord {
        granted_at: Utc::now(),
        note,
    };

    match backends
        .documents
        .insert(Collection::Admins, uid.as_str(), to_body(&record)?)
        .await
    {
        Ok(_) => Ok(uid),
        Err(StoreError::AlreadyExists) => Err(AdminError::AlreadyAdmin(uid)),
        Err(e) => Err(e.into()),
    }
}

/// Delete the authorization record of an account.
///
/// A uid target is revoked even when its account no longer exists.
///
/// # Errors
///
/// [`AdminError::NotAdmin`] if there was no record.
pub async fn revoke(backends: &AdminBackends, target: &Target) -> Result<Uid, AdminError> {
    let uid = match target {
        Target::Uid(uid) => Uid::new(uid.as_str()),
        Target::Email(_) => resolve(backends, target).await?,
    };

    if backends
        .documents
        .remove(Collection::Admins, uid.as_str())
        .await?
    {
        Ok(uid)
    } else {
        Err(AdminError::NotAdmin(uid))
    }
}

/// Every authorization record, with the account email where known.
///
/// # Errors
///
/// Store or account lookup errors.
pub async fn list(backends: &AdminBackends) -> Result<Vec<AdminEntry>, AdminError> {
    let documents = backends
        .documents
        .list(&Query::collection(Collection::Admins))
        .await?;

    let mut admins = Vec::with_capacity(documents.len());
    for document in documents {
        let uid = Uid::new(document.id.as_str());
        let email = backends
            .accounts
            .find_by_uid(&uid)
            .await?
            .map(|a| a.email.to_string());
        admins.push(AdminEntry {
            uid,
            email,
            record: document.decode()?,
        });
    }
    Ok(admins)
}
