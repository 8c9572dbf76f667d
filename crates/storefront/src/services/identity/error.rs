//! Identity provider error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::mail::MailError;

/// Errors that can occur during identity operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] right_water_core::EmailError),

    /// Invalid credentials (wrong password or unknown email).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An account with this email already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Display name empty or too long.
    #[error("invalid display name")]
    InvalidDisplayName,

    /// Reset code unknown, used, or expired.
    #[error("invalid or expired reset code")]
    InvalidResetCode,

    /// The operation needs a signed-in identity.
    #[error("not signed in")]
    NotSignedIn,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Reset email could not be sent.
    #[error("mail error: {0}")]
    Mail(#[from] MailError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
