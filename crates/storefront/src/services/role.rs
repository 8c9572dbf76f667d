//! Role resolution for signed-in identities.
//!
//! The only source of administrator privilege is the Authorization Record
//! `admins/{uid}`. Resolution fails closed: no identity, a missing record, a
//! failed read, or a timed-out read all resolve to [`Role::Customer`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use right_water_core::authz::{Collection, Role};

use crate::services::identity::AuthSession;
use crate::store::{DocumentStore, StoreError};

/// Reads the Authorization Record of a signed-in identity.
#[async_trait]
pub trait AuthorizationLookup: Send + Sync {
    /// Whether `admins/{uid}` exists for the session's identity.
    async fn record_exists(&self, session: &AuthSession) -> Result<bool, StoreError>;
}

#[async_trait]
impl AuthorizationLookup for DocumentStore {
    async fn record_exists(&self, session: &AuthSession) -> Result<bool, StoreError> {
        let record = self
            .get(
                Some(&session.token),
                Collection::Admins,
                session.identity.uid.as_str(),
            )
            .await?;
        Ok(record.is_some())
    }
}

/// Resolves the [`Role`] of an identity.
#[derive(Clone)]
pub struct RoleResolver {
    lookup: Arc<dyn AuthorizationLookup>,
    timeout: Option<Duration>,
}

impl RoleResolver {
    #[must_use]
    pub fn new(lookup: Arc<dyn AuthorizationLookup>, timeout: Option<Duration>) -> Self {
        Self { lookup, timeout }
    }

    /// Resolve the role of `session`, or [`Role::Customer`] when signed out.
    ///
    /// Never fails and never retries. The only side effect is the record read.
    pub async fn resolve(&self, session: Option<&AuthSession>) -> Role {
        let Some(session) = session else {
            return Role::Customer;
        };
        let uid = &session.identity.uid;

        let lookup = self.lookup.record_exists(session);
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, lookup).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(%uid, ?limit, "role lookup timed out; treating as customer");
                    return Role::Customer;
                }
            },
            None => lookup.await,
        };

        match outcome {
            Ok(exists) => Role::from_record_exists(exists),
            Err(e) => {
                tracing::warn!(%uid, error = %e, "role lookup failed; treating as customer");
                Role::Customer
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use right_water_core::types::{Email, IdToken, Identity, Uid};

    use super::*;

    /// Lookup answering from a fixed outcome and counting calls.
    struct Fixed {
        outcome: Result<bool, ()>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(outcome: Result<bool, ()>) -> Self {
            Self {
                outcome,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AuthorizationLookup for Fixed {
        async fn record_exists(&self, _session: &AuthSession) -> Result<bool, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.outcome
                .map_err(|()| StoreError::Unavailable("backend down".to_owned()))
        }
    }

    fn session(uid: &str) -> AuthSession {
        AuthSession {
            identity: Identity {
                uid: Uid::new(uid),
                email: Email::parse(&format!("{uid}@example.com")).unwrap(),
                display_name: None,
            },
            token: IdToken::new(format!("token-{uid}")),
        }
    }

    fn resolver(lookup: &Arc<Fixed>) -> RoleResolver {
        RoleResolver::new(lookup.clone(), Some(Duration::from_millis(50)))
    }

    #[tokio::test]
    async fn record_means_admin() {
        let lookup = Arc::new(Fixed::new(Ok(true)));
        assert_eq!(resolver(&lookup).resolve(Some(&session("a"))).await, Role::Admin);
    }

    #[tokio::test]
    async fn absent_record_means_customer() {
        let lookup = Arc::new(Fixed::new(Ok(false)));
        assert_eq!(
            resolver(&lookup).resolve(Some(&session("a"))).await,
            Role::Customer
        );
    }

    #[tokio::test]
    async fn no_identity_skips_lookup() {
        let lookup = Arc::new(Fixed::new(Ok(true)));
        assert_eq!(resolver(&lookup).resolve(None).await, Role::Customer);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn lookup_failure_fails_closed() {
        let lookup = Arc::new(Fixed::new(Err(())));
        assert_eq!(
            resolver(&lookup).resolve(Some(&session("a"))).await,
            Role::Customer
        );
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_timeout_fails_closed() {
        let lookup = Arc::new(Fixed {
            delay: Duration::from_secs(5),
            ..Fixed::new(Ok(true))
        });
        assert_eq!(
            resolver(&lookup).resolve(Some(&session("a"))).await,
            Role::Customer
        );
    }

    #[tokio::test]
    async fn resolution_is_idempotent() {
        let lookup = Arc::new(Fixed::new(Ok(true)));
        let resolver = resolver(&lookup);
        let s = session("a");
        let first = resolver.resolve(Some(&s)).await;
        let second = resolver.resolve(Some(&s)).await;
        assert_eq!(first, second);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
    }
}
