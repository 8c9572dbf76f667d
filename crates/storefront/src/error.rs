//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding to the client. All route handlers return
//! `Result<T, AppError>`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use right_water_core::records::ValidationError;

use crate::services::account::AccountError;
use crate::services::blob::BlobError;
use crate::services::catalog::CatalogError;
use crate::services::identity::AuthError;
use crate::services::orders::OrderError;
use crate::store::StoreError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Document store rejected or failed the request.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Identity provider operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Malformed product input.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Image storage failed.
    #[error("Blob error: {0}")]
    Blob(#[from] BlobError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Auth(e) => Self::Auth(e),
            AccountError::Store(e) => Self::Store(e),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Validation(e) => Self::Validation(e),
            CatalogError::Store(e) => Self::Store(e),
            CatalogError::Blob(e) => Self::Blob(e),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Store(e) => Self::Store(e),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

impl AppError {
    const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Internal(_)
                | Self::Blob(_)
                | Self::Store(StoreError::InvalidDocument(_) | StoreError::Unavailable(_))
                | Self::Auth(
                    AuthError::Repository(_) | AuthError::Mail(_) | AuthError::PasswordHash
                )
        )
    }

    const fn status(&self) -> StatusCode {
        match self {
            Self::Store(err) => match err {
                StoreError::NotFound => StatusCode::NOT_FOUND,
                StoreError::AlreadyExists | StoreError::Conflict => StatusCode::CONFLICT,
                StoreError::PermissionDenied => StatusCode::FORBIDDEN,
                StoreError::Unauthenticated => StatusCode::UNAUTHORIZED,
                StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                StoreError::InvalidDocument(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::NotSignedIn => StatusCode::UNAUTHORIZED,
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::WeakPassword(_)
                | AuthError::InvalidEmail(_)
                | AuthError::InvalidDisplayName
                | AuthError::InvalidResetCode => StatusCode::BAD_REQUEST,
                AuthError::Repository(_) | AuthError::Mail(_) | AuthError::PasswordHash => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Blob(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// What the client is told. Denials never say which rule failed.
    fn public_message(&self) -> String {
        match self {
            Self::Store(err) => match err {
                StoreError::NotFound => "Not found".to_string(),
                StoreError::AlreadyExists => "Already exists".to_string(),
                StoreError::Conflict => "Changed by someone else, please retry".to_string(),
                StoreError::PermissionDenied => "Permission denied".to_string(),
                StoreError::Unauthenticated => "Please sign in again".to_string(),
                StoreError::Unavailable(_) => "Service temporarily unavailable".to_string(),
                StoreError::InvalidDocument(_) => "Internal server error".to_string(),
            },
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "Invalid credentials".to_string(),
                AuthError::UserAlreadyExists => {
                    "An account with this email already exists".to_string()
                }
                AuthError::WeakPassword(msg) => msg.clone(),
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                AuthError::InvalidDisplayName => "Please enter a display name".to_string(),
                AuthError::InvalidResetCode => {
                    "This reset link is invalid or has expired".to_string()
                }
                AuthError::NotSignedIn => "Please sign in".to_string(),
                AuthError::Repository(_) | AuthError::Mail(_) | AuthError::PasswordHash => {
                    "Authentication error".to_string()
                }
            },
            Self::Validation(err) => err.to_string(),
            Self::Blob(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::NotFound(_) | Self::BadRequest(_) => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (self.status(), self.public_message()).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from an identity id.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(uid: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(uid.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
