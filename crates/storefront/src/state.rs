//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;
use url::Url;

use crate::config::StorefrontConfig;
use crate::services::account::AccountService;
use crate::services::blob::{BlobStore, MemoryBlobStore};
use crate::services::catalog::CatalogManager;
use crate::services::clients::ClientRegistry;
use crate::services::identity::{AccountRepository, IdentityProvider, IdentityService, MemoryAccounts};
use crate::services::mail::{LogMailer, Mailer};
use crate::services::orders::OrderService;
use crate::services::statistics::StatisticsService;
use crate::store::{DocumentBackend, DocumentStore, MemoryBackend};

/// The managed collaborators the storefront runs against.
pub struct Backends {
    /// Database pool, when running against `PostgreSQL` (readiness checks).
    pub pool: Option<PgPool>,
    pub documents: Arc<dyn DocumentBackend>,
    pub accounts: Arc<dyn AccountRepository>,
    pub blobs: Arc<dyn BlobStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl Backends {
    /// Everything in memory. Used by tests and demos.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            pool: None,
            documents: Arc::new(MemoryBackend::new()),
            accounts: Arc::new(MemoryAccounts::new()),
            blobs: Arc::new(MemoryBlobStore::new()),
            mailer: Arc::new(LogMailer),
        }
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the services built over the configured backends.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: Option<PgPool>,
    store: DocumentStore,
    identity: Arc<dyn IdentityProvider>,
    clients: ClientRegistry,
    accounts: AccountService,
    catalog: CatalogManager,
    orders: OrderService,
    statistics: StatisticsService,
}

impl AppState {
    /// Wire the services over `backends`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config.base_url` is not a valid URL.
    pub fn new(config: StorefrontConfig, backends: Backends) -> Result<Self, url::ParseError> {
        let base_url = Url::parse(&config.base_url)?;
        let identity = IdentityService::new(
            backends.accounts,
            backends.mailer,
            base_url,
            config.token_ttl,
        );
        let store = DocumentStore::new(backends.documents, Arc::new(identity.clone()));
        let identity: Arc<dyn IdentityProvider> = Arc::new(identity);
        let clients = ClientRegistry::new(
            identity.clone(),
            Arc::new(store.clone()),
            config.role_lookup_timeout,
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                accounts: AccountService::new(store.clone()),
                catalog: CatalogManager::new(store.clone(), backends.blobs),
                orders: OrderService::new(store.clone()),
                statistics: StatisticsService::new(store.clone()),
                pool: backends.pool,
                config,
                store,
                identity,
                clients,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// The database pool, if running against `PostgreSQL`.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn store(&self) -> &DocumentStore {
        &self.inner.store
    }

    #[must_use]
    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.inner.identity
    }

    #[must_use]
    pub fn clients(&self) -> &ClientRegistry {
        &self.inner.clients
    }

    #[must_use]
    pub fn accounts(&self) -> &AccountService {
        &self.inner.accounts
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogManager {
        &self.inner.catalog
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    #[must_use]
    pub fn statistics(&self) -> &StatisticsService {
        &self.inner.statistics
    }
}
