//! Right Water storefront library.
//!
//! This crate provides the storefront and catalog administration service
//! as a library, allowing it to be tested and reused.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

use axum::{
    Router,
    http::{HeaderValue, header},
};
use tower_http::{
    services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tower_sessions::SessionStore;

use crate::state::AppState;

/// Build the storefront router over `state`, keeping HTTP sessions in
/// `sessions`.
///
/// Sentry layers are added by the binary so tests run without a client.
pub fn app<S>(state: AppState, sessions: S) -> Router
where
    S: SessionStore + Clone,
{
    let session_layer = middleware::create_session_layer(sessions, state.config());
    let media = ServeDir::new(&state.config().media_dir);

    Router::new()
        .merge(routes::routes())
        .nest_service("/media", media)
        .layer(session_layer)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
