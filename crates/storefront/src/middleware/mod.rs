//! HTTP middleware and extractors for the storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (hub per request, capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Security response headers
//! 4. Session layer (tower-sessions)
//!
//! # Extractors
//!
//! - [`Client`] - the browser's client context (auth client, session state)
//! - [`RequireSignedIn`] / [`RequireAdmin`] - route guard

pub mod client;
pub mod guard;
pub mod session;

pub use client::{Client, session_keys};
pub use guard::{GuardRejection, Guarded, RequireAdmin, RequireSignedIn};
pub use session::create_session_layer;
