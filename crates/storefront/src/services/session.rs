//! Session State Store.
//!
//! Owns one client's [`SessionState`] and keeps it in step with the client's
//! identity-provider session. Every change bumps an epoch; a role resolution
//! is applied only if its epoch is still current, so a slow lookup for an
//! earlier identity can never overwrite the state of a later one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use right_water_core::authz::{Role, SessionState};
use right_water_core::types::Uid;

use crate::services::identity::{AuthSession, SessionChanges};
use crate::services::role::RoleResolver;

/// A pending role resolution for one session change.
#[derive(Debug)]
pub struct Ticket {
    epoch: u64,
    session: Option<AuthSession>,
}

impl Ticket {
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Explicitly owned session state for one client.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

struct SessionStoreInner {
    state: watch::Sender<SessionState>,
    epoch: AtomicU64,
    resolver: RoleResolver,
}

impl SessionStore {
    #[must_use]
    pub fn new(resolver: RoleResolver) -> Self {
        let (state, _) = watch::channel(SessionState::initial());
        Self {
            inner: Arc::new(SessionStoreInner {
                state,
                epoch: AtomicU64::new(0),
                resolver,
            }),
        }
    }

    /// Record a session change: mark loading, take the new identity, clear
    /// the admin flag, and start a new epoch.
    pub fn begin(&self, session: Option<AuthSession>) -> Ticket {
        let identity = session.as_ref().map(|s| s.identity.clone());
        let mut epoch = 0;
        // The epoch moves under the state lock so it always matches the
        // identity it was issued with.
        self.inner.state.send_modify(|state| {
            epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            state.begin(identity);
        });
        Ticket { epoch, session }
    }

    /// Resolve the ticket's role and apply it if the ticket is still current.
    ///
    /// Returns whether the result was applied.
    pub async fn complete(&self, ticket: Ticket) -> bool {
        let role = self.inner.resolver.resolve(ticket.session.as_ref()).await;
        self.apply(ticket.epoch, role)
    }

    /// Apply a resolved role for `epoch`. Stale epochs are discarded.
    pub fn apply(&self, epoch: u64, role: Role) -> bool {
        let applied = self.inner.state.send_if_modified(|state| {
            if self.inner.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            state.settle(role);
            true
        });
        if !applied {
            tracing::debug!(epoch, "discarding superseded role resolution");
        }
        applied
    }

    /// Process one session change to completion.
    pub async fn on_session_change(&self, session: Option<AuthSession>) -> bool {
        let ticket = self.begin(session);
        self.complete(ticket).await
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Watch the state. The receiver always sees the latest value.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Wait until the state has settled for `expected` (or for nobody).
    ///
    /// If it does not settle within `limit`, the returned state is marked
    /// loading, which the route guard turns into a placeholder.
    pub async fn wait_settled_for(&self, expected: Option<&Uid>, limit: Duration) -> SessionState {
        let settled_for = |state: &SessionState| {
            !state.loading && state.identity.as_ref().map(|i| &i.uid) == expected
        };

        let mut receiver = self.subscribe();
        let waited = tokio::time::timeout(limit, receiver.wait_for(settled_for)).await;
        if let Ok(Ok(state)) = waited {
            return state.clone();
        }

        let mut state = self.snapshot();
        if !settled_for(&state) {
            state.loading = true;
        }
        state
    }

    /// Follow a client's session changes until the subscription ends or the
    /// returned driver is stopped.
    ///
    /// Changes are processed in delivery order. Starting a resolution aborts
    /// any older one still in flight.
    #[must_use]
    pub fn drive(&self, mut changes: SessionChanges) -> SessionDriver {
        let store = self.clone();
        let task = tokio::spawn(async move {
            let mut in_flight = JoinSet::new();
            loop {
                tokio::select! {
                    change = changes.next() => {
                        let Some(session) = change else { break };
                        in_flight.abort_all();
                        let ticket = store.begin(session);
                        let store = store.clone();
                        in_flight.spawn(async move {
                            store.complete(ticket).await;
                        });
                    }
                    Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                }
            }
            in_flight.shutdown().await;
        });
        SessionDriver { task }
    }
}

/// Handle to a running [`SessionStore::drive`] loop.
///
/// Stopping or dropping it ends the subscription and aborts any in-flight
/// resolution.
pub struct SessionDriver {
    task: JoinHandle<()>,
}

impl SessionDriver {
    pub fn stop(self) {
        drop(self);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SessionDriver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use url::Url;

    use right_water_core::types::{Email, IdToken, Identity};

    use super::*;
    use crate::services::identity::{AuthClient, IdentityService, MemoryAccounts};
    use crate::services::mail::LogMailer;
    use crate::services::role::AuthorizationLookup;
    use crate::store::StoreError;

    /// Lookup whose answers are keyed by email; entries in `gates` block
    /// until notified.
    #[derive(Default)]
    struct Scripted {
        admins: Vec<String>,
        failing: Vec<String>,
        gates: Mutex<HashMap<String, Arc<Notify>>>,
        delays: HashMap<String, Duration>,
    }

    impl Scripted {
        fn gate(&self, email: &str) -> Arc<Notify> {
            let notify = Arc::new(Notify::new());
            self.gates
                .lock()
                .unwrap()
                .insert(email.to_owned(), notify.clone());
            notify
        }
    }

    #[async_trait]
    impl AuthorizationLookup for Scripted {
        async fn record_exists(&self, session: &AuthSession) -> Result<bool, StoreError> {
            let email = session.identity.email.to_string();
            let gate = self.gates.lock().unwrap().get(&email).cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if let Some(delay) = self.delays.get(&email) {
                tokio::time::sleep(*delay).await;
            }
            if self.failing.contains(&email) {
                return Err(StoreError::Unavailable("down".to_owned()));
            }
            Ok(self.admins.contains(&email))
        }
    }

    fn session(name: &str) -> AuthSession {
        AuthSession {
            identity: Identity {
                uid: Uid::new(name),
                email: Email::parse(&format!("{name}@example.com")).unwrap(),
                display_name: None,
            },
            token: IdToken::new(format!("token-{name}")),
        }
    }

    fn store_with(lookup: Arc<Scripted>) -> SessionStore {
        SessionStore::new(RoleResolver::new(lookup, None))
    }

    #[tokio::test]
    async fn starts_loading_and_settles_signed_out() {
        let store = store_with(Arc::new(Scripted::default()));
        assert!(store.snapshot().loading);

        assert!(store.on_session_change(None).await);
        let state = store.snapshot();
        assert!(!state.loading);
        assert!(state.identity.is_none());
        assert!(!state.is_admin);
    }

    #[tokio::test]
    async fn admin_record_sets_flag() {
        let lookup = Arc::new(Scripted {
            admins: vec!["ana@example.com".to_owned()],
            ..Scripted::default()
        });
        let store = store_with(lookup);
        store.on_session_change(Some(session("ana"))).await;
        let state = store.snapshot();
        assert!(state.is_admin);
        assert_eq!(state.identity.unwrap().uid, Uid::new("ana"));
    }

    #[tokio::test]
    async fn lookup_failure_leaves_signed_in_customer() {
        let lookup = Arc::new(Scripted {
            failing: vec!["ana@example.com".to_owned()],
            ..Scripted::default()
        });
        let store = store_with(lookup);
        store.on_session_change(Some(session("ana"))).await;
        let state = store.snapshot();
        assert!(state.is_signed_in());
        assert!(!state.is_admin);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn later_change_wins_over_slow_earlier_resolution() {
        let lookup = Arc::new(Scripted {
            admins: vec!["ana@example.com".to_owned()],
            ..Scripted::default()
        });
        let gate = lookup.gate("ana@example.com");
        let store = store_with(lookup);

        let first = store.begin(Some(session("ana")));
        let slow = tokio::spawn({
            let store = store.clone();
            async move { store.complete(first).await }
        });
        tokio::task::yield_now().await;

        let second = store.begin(Some(session("bob")));
        assert!(store.complete(second).await);

        gate.notify_one();
        assert!(!slow.await.unwrap());

        let state = store.snapshot();
        assert_eq!(state.identity.unwrap().uid, Uid::new("bob"));
        assert!(!state.is_admin);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn change_clears_admin_flag_immediately() {
        let lookup = Arc::new(Scripted {
            admins: vec!["ana@example.com".to_owned()],
            ..Scripted::default()
        });
        let store = store_with(lookup);
        store.on_session_change(Some(session("ana"))).await;
        assert!(store.snapshot().is_admin);

        let _ticket = store.begin(Some(session("bob")));
        let state = store.snapshot();
        assert!(!state.is_admin);
        assert!(state.loading);
    }

    #[tokio::test]
    async fn repeated_change_is_idempotent() {
        let lookup = Arc::new(Scripted {
            admins: vec!["ana@example.com".to_owned()],
            ..Scripted::default()
        });
        let store = store_with(lookup);
        store.on_session_change(Some(session("ana"))).await;
        let first = store.snapshot();
        store.on_session_change(Some(session("ana"))).await;
        assert_eq!(store.snapshot(), first);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_settled_times_out_as_loading() {
        let lookup = Arc::new(Scripted::default());
        let _gate = lookup.gate("ana@example.com");
        let store = store_with(lookup);
        let ticket = store.begin(Some(session("ana")));
        let pending = tokio::spawn({
            let store = store.clone();
            async move { store.complete(ticket).await }
        });

        let state = store
            .wait_settled_for(Some(&Uid::new("ana")), Duration::from_millis(100))
            .await;
        assert!(state.loading);
        pending.abort();
    }

    async fn auth_client() -> AuthClient {
        let provider = IdentityService::new(
            Arc::new(MemoryAccounts::new()),
            Arc::new(LogMailer),
            Url::parse("http://localhost").unwrap(),
            Duration::from_secs(600),
        );
        let client = AuthClient::new(Arc::new(provider));
        for name in ["ana", "bob"] {
            client
                .sign_up(&format!("{name}@example.com"), "password123", name)
                .await
                .unwrap();
        }
        client.sign_out().await;
        client
    }

    #[tokio::test(start_paused = true)]
    async fn driver_follows_client_in_order() {
        let lookup = Arc::new(Scripted {
            admins: vec!["ana@example.com".to_owned()],
            delays: HashMap::from([
                ("ana@example.com".to_owned(), Duration::from_secs(2)),
                ("bob@example.com".to_owned(), Duration::from_millis(10)),
            ]),
            ..Scripted::default()
        });
        let store = store_with(lookup);
        let client = auth_client().await;
        let driver = store.drive(client.subscribe());

        let ana = client.sign_in("ana@example.com", "password123").await.unwrap();
        store
            .subscribe()
            .wait_for(|s| s.identity.as_ref().map(|i| &i.uid) == Some(&ana.identity.uid))
            .await
            .unwrap();

        let bob = client.sign_in("bob@example.com", "password123").await.unwrap();
        let state = store
            .wait_settled_for(Some(&bob.identity.uid), Duration::from_secs(1))
            .await;
        assert!(!state.loading);
        assert!(!state.is_admin);

        // Well past the point where ana's lookup would have finished.
        tokio::time::sleep(Duration::from_secs(5)).await;
        let state = store.snapshot();
        assert_eq!(state.identity.unwrap().uid, bob.identity.uid);
        assert!(!state.is_admin);

        driver.stop();
    }

    #[tokio::test]
    async fn driver_ends_when_client_goes_away() {
        let store = store_with(Arc::new(Scripted::default()));
        let client = auth_client().await;
        let driver = store.drive(client.subscribe());
        store
            .wait_settled_for(None, Duration::from_secs(1))
            .await;
        drop(client);
        tokio::time::timeout(Duration::from_secs(1), async {
            while !driver.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
