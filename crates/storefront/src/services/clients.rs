//! Per-browser client state.
//!
//! Each browser session owns an [`AuthClient`], a [`SessionStore`] driven by
//! it, and the progress of its current image upload. Contexts are cached by
//! client id and evicted after a period of inactivity; eviction drops the
//! session driver, which stops its subscription.

use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use moka::future::Cache;
use rand::RngCore;

use right_water_core::types::IdToken;

use crate::services::blob::UploadProgress;
use crate::services::identity::{AuthClient, IdentityProvider};
use crate::services::role::{AuthorizationLookup, RoleResolver};
use crate::services::session::{SessionDriver, SessionStore};

/// Idle time after which a client's state is dropped.
const CLIENT_IDLE: Duration = Duration::from_secs(30 * 60);

/// Everything the server keeps for one browser client.
pub struct ClientContext {
    pub auth: AuthClient,
    pub session: SessionStore,
    pub uploads: UploadProgress,
    driver: SessionDriver,
}

impl ClientContext {
    /// Whether the session driver is still following the client.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.driver.is_finished()
    }
}

/// Cache of [`ClientContext`]s keyed by client id.
#[derive(Clone)]
pub struct ClientRegistry {
    clients: Cache<String, Arc<ClientContext>>,
    identity: Arc<dyn IdentityProvider>,
    resolver: RoleResolver,
}

impl ClientRegistry {
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        lookup: Arc<dyn AuthorizationLookup>,
        role_lookup_timeout: Option<Duration>,
    ) -> Self {
        let clients = Cache::builder()
            .max_capacity(10_000)
            .time_to_idle(CLIENT_IDLE)
            .build();

        Self {
            clients,
            identity,
            resolver: RoleResolver::new(lookup, role_lookup_timeout),
        }
    }

    /// The context for `client_id`, created on first use.
    ///
    /// A new context restores its sign-in from `stored_token`, if any.
    pub async fn get_or_create(
        &self,
        client_id: &str,
        stored_token: Option<IdToken>,
    ) -> Arc<ClientContext> {
        self.clients
            .get_with(client_id.to_owned(), async {
                let auth = AuthClient::new(self.identity.clone());
                if let Some(token) = stored_token {
                    auth.restore(token).await;
                }
                let session = SessionStore::new(self.resolver.clone());
                let driver = session.drive(auth.subscribe());
                tracing::debug!(client_id, "client context created");
                Arc::new(ClientContext {
                    auth,
                    session,
                    uploads: UploadProgress::new(),
                    driver,
                })
            })
            .await
    }

    /// Forget a client, stopping its session driver.
    pub async fn remove(&self, client_id: &str) {
        self.clients.invalidate(client_id).await;
    }
}

/// A fresh random client id.
#[must_use]
pub fn new_client_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
