//! Route guard extractors.
//!
//! Views that need a signed-in identity (or an administrator) take
//! [`RequireSignedIn`] or [`RequireAdmin`]. The extractor waits briefly for
//! the client's session state to settle, then applies the guard decision.
//! This only steers navigation; every data access is still checked by the
//! document store.

use std::time::Duration;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{FromRequestParts, OriginalUri},
    http::{HeaderValue, StatusCode, header::RETRY_AFTER, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;

use right_water_core::authz::{GuardOutcome, RouteRequirement, SessionState, guard};

use super::client::Client;
use crate::error::AppError;
use crate::services::identity::AuthSession;
use crate::state::AppState;

/// How long a request waits for a pending role resolution.
pub const SETTLE_WAIT: Duration = Duration::from_secs(2);

/// Seconds a client is asked to wait before retrying a loading view.
const RETRY_AFTER_SECS: &str = "1";

/// A request that passed the guard.
pub struct Guarded {
    pub client: Client,
    pub auth: AuthSession,
    pub state: SessionState,
}

/// Requires a signed-in identity.
pub struct RequireSignedIn(pub Guarded);

/// Requires a signed-in administrator.
pub struct RequireAdmin(pub Guarded);

/// Placeholder shown while the session is still resolving.
#[derive(Template, WebTemplate)]
#[template(path = "loading.html")]
pub struct LoadingTemplate;

/// Why a guarded request was not rendered.
#[derive(Debug)]
pub enum GuardRejection {
    Outcome { outcome: GuardOutcome, is_api: bool },
    Error(AppError),
}

impl From<AppError> for GuardRejection {
    fn from(err: AppError) -> Self {
        Self::Error(err)
    }
}

impl IntoResponse for GuardRejection {
    fn into_response(self) -> Response {
        let (outcome, is_api) = match self {
            Self::Error(err) => return err.into_response(),
            Self::Outcome { outcome, is_api } => (outcome, is_api),
        };

        match (outcome, is_api) {
            (GuardOutcome::Loading, api) => {
                let mut response = if api {
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(json!({ "status": "loading" })),
                    )
                        .into_response()
                } else {
                    (StatusCode::SERVICE_UNAVAILABLE, LoadingTemplate).into_response()
                };
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
                response
            }
            (GuardOutcome::RedirectToSignIn, true) => StatusCode::UNAUTHORIZED.into_response(),
            (GuardOutcome::RedirectToSignIn, false) => Redirect::to("/auth/login").into_response(),
            (GuardOutcome::RedirectToHome, true) => {
                (StatusCode::FORBIDDEN, "Permission denied").into_response()
            }
            (GuardOutcome::RedirectToHome, false) => Redirect::to("/").into_response(),
            // Never constructed as a rejection.
            (GuardOutcome::Render, _) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// Whether the request targets the JSON API.
///
/// Nested routers see the URI with their prefix stripped, so the original
/// URI is consulted when the router recorded one.
fn is_api_request(parts: &Parts) -> bool {
    let path = parts
        .extensions
        .get::<OriginalUri>()
        .map_or_else(|| parts.uri.path(), |original| original.0.path());
    path == "/api" || path.starts_with("/api/")
}

async fn guard_request(
    parts: &mut Parts,
    state: &AppState,
    requirement: RouteRequirement,
) -> Result<Guarded, GuardRejection> {
    let is_api = is_api_request(parts);
    let client = Client::from_request_parts(parts, state).await?;

    let auth = client.context.auth.current();
    let expected = auth.as_ref().map(|a| &a.identity.uid);
    let session_state = client.context.session.wait_settled_for(expected, SETTLE_WAIT).await;

    let outcome = guard::evaluate(&session_state, requirement);
    if outcome != GuardOutcome::Render {
        tracing::debug!(?outcome, path = %parts.uri.path(), "route guard redirect");
        return Err(GuardRejection::Outcome { outcome, is_api });
    }
    // The state settled for this identity, so a session is present.
    let auth = auth.ok_or(GuardRejection::Outcome {
        outcome: GuardOutcome::RedirectToSignIn,
        is_api,
    })?;

    Ok(Guarded {
        client,
        auth,
        state: session_state,
    })
}

impl FromRequestParts<AppState> for RequireSignedIn {
    type Rejection = GuardRejection;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        guard_request(parts, state, RouteRequirement::SIGNED_IN)
            .await
            .map(Self)
    }
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = GuardRejection;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        guard_request(parts, state, RouteRequirement::ADMIN)
            .await
            .map(Self)
    }
}
