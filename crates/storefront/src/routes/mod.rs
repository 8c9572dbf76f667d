//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                               - Home page (catalog)
//! GET  /health                         - Liveness
//! GET  /health/ready                   - Database readiness
//!
//! # Auth
//! GET  /auth/session                   - Session snapshot (JSON)
//! GET  /auth/login                     - Login page
//! POST /auth/login                     - Login action
//! GET  /auth/register                  - Register page
//! POST /auth/register                  - Register action (+ user profile)
//! POST /auth/logout                    - Logout action
//! GET  /auth/password/forgot           - Forgot password page
//! POST /auth/password/forgot           - Send reset link
//! GET  /auth/password/reset            - Reset form (from the emailed link)
//! POST /auth/password/reset            - Confirm reset
//! POST /auth/password/change           - Re-authenticate and change (signed in)
//! POST /auth/profile                   - Update display name (signed in)
//!
//! # API
//! GET  /api/products?q=                - Product list
//! GET  /api/products/{id}              - Product
//! GET  /api/orders                     - Orders (own, or all for admins)
//! POST /api/orders                     - Place order
//! GET  /api/orders/{id}                - Order
//!
//! # Account (signed in)
//! GET  /account                        - Profile and order history
//!
//! # Admin (administrators)
//! GET    /admin                          - Dashboard
//! GET    /admin/products?q=              - Catalog table
//! POST   /admin/products                 - Add (multipart)
//! GET    /admin/products/new             - Add form
//! GET    /admin/products/stream          - Live catalog (SSE)
//! GET    /admin/products/upload-progress - Current upload fraction
//! GET    /admin/products/{id}/edit       - Edit form
//! POST   /admin/products/{id}            - Edit (multipart)
//! DELETE /admin/products/{id}            - Delete
//! POST   /admin/products/{id}/delete     - Delete (form)
//! PATCH  /admin/orders/{id}/status       - Update order status (JSON)
//! POST   /admin/orders/{id}/status       - Update order status (form)
//! GET    /admin/statistics               - Statistics summary (JSON)
//! POST   /admin/statistics/refresh       - Recompute statistics
//! ```

pub mod account;
pub mod admin;
pub mod auth;
pub mod health;
pub mod home;
pub mod orders;
pub mod products;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::state::AppState;

/// Largest accepted product form, image included.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/session", get(auth::session))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", post(auth::logout))
        .route(
            "/password/forgot",
            get(auth::forgot_password_page).post(auth::forgot_password),
        )
        .route(
            "/password/reset",
            get(auth::reset_password_page).post(auth::reset_password),
        )
        .route("/password/change", post(auth::change_password))
        .route("/profile", post(auth::update_profile))
}

/// Create the JSON API router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(products::index))
        .route("/products/{id}", get(products::show))
        .route("/orders", get(orders::index).post(orders::create))
        .route("/orders/{id}", get(orders::show))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(admin::dashboard))
        .route(
            "/products",
            get(admin::products).post(admin::create_product),
        )
        .route("/products/new", get(admin::new_product))
        .route("/products/stream", get(admin::products_stream))
        .route("/products/upload-progress", get(admin::upload_progress))
        .route(
            "/products/{id}",
            post(admin::update_product).delete(admin::delete_product),
        )
        .route("/products/{id}/edit", get(admin::edit_product))
        .route("/products/{id}/delete", post(admin::delete_product_form))
        .route(
            "/orders/{id}/status",
            post(admin::update_order_status_form).patch(admin::update_order_status),
        )
        .route("/statistics", get(admin::statistics))
        .route("/statistics/refresh", post(admin::refresh_statistics))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/account", get(account::index))
        .nest("/auth", auth_routes())
        .nest("/api", api_routes())
        .nest("/admin", admin_routes())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use tower::ServiceExt;
    use tower_sessions::MemoryStore;

    use crate::config::StorefrontConfig;
    use crate::state::{AppState, Backends};

    fn app() -> axum::Router {
        let config = StorefrontConfig::with_defaults("http://localhost:3000");
        let state = AppState::new(config, Backends::in_memory()).unwrap();
        crate::app(state, MemoryStore::default())
    }

    async fn get(path: &str) -> axum::response::Response {
        app()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let response = get("/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "DENY");
    }

    #[tokio::test]
    async fn test_anonymous_views_redirect_to_sign_in() {
        for path in ["/account", "/admin", "/admin/products"] {
            let response = get(path).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{path}");
            assert_eq!(response.headers()[header::LOCATION], "/auth/login", "{path}");
        }
    }

    #[tokio::test]
    async fn test_anonymous_api_calls_are_unauthorized() {
        let response = get("/api/orders").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_public_catalog_is_readable() {
        let response = get("/api/products").await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
