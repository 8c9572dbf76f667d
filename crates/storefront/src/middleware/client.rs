//! Extractor for the browser's client context.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use right_water_core::types::IdToken;

use crate::error::AppError;
use crate::services::clients::{ClientContext, new_client_id};
use crate::state::AppState;

/// Session keys.
pub mod session_keys {
    /// Id of the server-side client context.
    pub const CLIENT_ID: &str = "client_id";
    /// Identity token of the signed-in identity.
    pub const ID_TOKEN: &str = "id_token";
}

/// The calling browser's client context, created on first visit.
pub struct Client {
    pub context: Arc<ClientContext>,
    session: Session,
}

impl Client {
    /// Remember the identity token across requests.
    ///
    /// The session id is cycled to prevent fixation.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be written.
    pub async fn remember(&self, token: &IdToken) -> Result<(), AppError> {
        self.session.cycle_id().await.map_err(session_error)?;
        self.session
            .insert(session_keys::ID_TOKEN, token)
            .await
            .map_err(session_error)
    }

    /// Forget the identity token (sign-out).
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be written.
    pub async fn forget(&self) -> Result<(), AppError> {
        self.session
            .remove::<IdToken>(session_keys::ID_TOKEN)
            .await
            .map_err(session_error)?;
        Ok(())
    }

    /// The identity token of the current sign-in, if any.
    #[must_use]
    pub fn token(&self) -> Option<IdToken> {
        self.context.auth.token()
    }
}

fn session_error(err: tower_sessions::session::Error) -> AppError {
    AppError::Internal(format!("session error: {err}"))
}

impl FromRequestParts<AppState> for Client {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal("session layer missing".to_string()))?;

        let client_id = match session
            .get::<String>(session_keys::CLIENT_ID)
            .await
            .map_err(session_error)?
        {
            Some(id) => id,
            None => {
                let id = new_client_id();
                session
                    .insert(session_keys::CLIENT_ID, &id)
                    .await
                    .map_err(session_error)?;
                id
            }
        };
        let token = session
            .get::<IdToken>(session_keys::ID_TOKEN)
            .await
            .map_err(session_error)?;

        let context = state.clients().get_or_create(&client_id, token).await;
        Ok(Self { context, session })
    }
}
