//! Integration tests for Right Water.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p right-water-integration-tests
//! ```
//!
//! Each test starts its own storefront on an ephemeral port with in-memory
//! backends, so no database is needed. Tests drive it over HTTP with a
//! cookie-keeping `reqwest` client, one per simulated browser.

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, StatusCode, redirect};
use serde_json::Value;
use tokio::net::TcpListener;

use right_water_core::authz::Collection;
use right_water_core::records::AuthorizationRecord;
use right_water_core::types::{Email, IdToken, Uid};
use right_water_storefront::config::StorefrontConfig;
use right_water_storefront::services::blob::MemoryBlobStore;
use right_water_storefront::services::identity::{AccountRepository, IdentityProvider, MemoryAccounts};
use right_water_storefront::services::mail::RecordingMailer;
use right_water_storefront::state::{AppState, Backends};
use right_water_storefront::store::{DocumentBackend, MemoryBackend, to_body};

/// A storefront running on `127.0.0.1` with in-memory backends.
pub struct TestApp {
    pub base_url: String,
    pub state: AppState,
    pub documents: Arc<MemoryBackend>,
    pub accounts: Arc<MemoryAccounts>,
    pub blobs: Arc<MemoryBlobStore>,
    pub mailer: RecordingMailer,
}

impl TestApp {
    /// Start a storefront.
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let documents = Arc::new(MemoryBackend::new());
        let accounts = Arc::new(MemoryAccounts::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let mailer = RecordingMailer::default();
        let backends = Backends {
            pool: None,
            documents: documents.clone(),
            accounts: accounts.clone(),
            blobs: blobs.clone(),
            mailer: Arc::new(mailer.clone()),
        };

        let config = StorefrontConfig::with_defaults(base_url.clone());
        let state = AppState::new(config, backends).unwrap();
        let app = right_water_storefront::app(state.clone(), tower_sessions::MemoryStore::default());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            state,
            documents,
            accounts,
            blobs,
            mailer,
        }
    }

    /// A fresh browser: keeps cookies, does not follow redirects.
    #[must_use]
    pub fn browser(&self) -> Client {
        Client::builder()
            .cookie_store(true)
            .redirect(redirect::Policy::none())
            .build()
            .unwrap()
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Register through the form; the browser ends up signed in.
    pub async fn register(&self, browser: &Client, email: &str, password: &str, name: &str) {
        let response = browser
            .post(self.url("/auth/register"))
            .form(&[
                ("email", email),
                ("password", password),
                ("password_confirm", password),
                ("display_name", name),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
    }

    /// Sign in through the form and return the redirect target.
    pub async fn sign_in(&self, browser: &Client, email: &str, password: &str) -> String {
        let response = browser
            .post(self.url("/auth/login"))
            .form(&[("email", email), ("password", password)])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        location(&response)
    }

    pub async fn sign_out(&self, browser: &Client) {
        let response = browser
            .post(self.url("/auth/logout"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    /// The browser's session snapshot once role resolution has settled.
    pub async fn settled_session(&self, browser: &Client) -> Value {
        self.session_where(browser, |session| session["loading"] == Value::Bool(false))
            .await
    }

    /// Poll the session snapshot until `done` accepts it.
    pub async fn session_where(&self, browser: &Client, done: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..100 {
            let session: Value = browser
                .get(self.url("/auth/session"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            if done(&session) {
                return session;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("session never reached the expected state");
    }

    pub async fn uid_of(&self, email: &str) -> Uid {
        self.accounts
            .find_by_email(&Email::parse(email).unwrap())
            .await
            .unwrap()
            .unwrap()
            .uid
    }

    /// Create the authorization record directly, as `rw-cli admin grant`
    /// does.
    pub async fn grant_admin(&self, email: &str) -> Uid {
        let uid = self.uid_of(email).await;
        let record = AuthorizationRecord {
            granted_at: Utc::now(),
            note: None,
        };
        self.documents
            .insert(Collection::Admins, uid.as_str(), to_body(&record).unwrap())
            .await
            .unwrap();
        uid
    }

    /// A token straight from the identity provider, for store-level checks.
    pub async fn token_for(&self, email: &str, password: &str) -> IdToken {
        self.state
            .identity()
            .sign_in(email, password)
            .await
            .unwrap()
            .token
    }

    /// Insert a product without going through the access policy.
    pub async fn seed_product(&self, id: &str, name: &str, price: &str, stock: u32) {
        self.documents
            .insert(
                Collection::Products,
                id,
                serde_json::json!({
                    "name": name,
                    "price": price,
                    "stock": stock,
                    "description": "",
                    "image": format!("memory://products/{id}.png"),
                }),
            )
            .await
            .unwrap();
    }
}

/// The `Location` header of a redirect.
#[must_use]
pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}
