//! Policy-enforcing façade over a [`DocumentBackend`].

use std::sync::Arc;

use serde_json::Value;

use right_water_core::authz::{AccessPolicy, AccessRequest, Caller, Collection, Operation};
use right_water_core::types::IdToken;

use super::{Document, DocumentBackend, Query, StoreError, TokenVerifier, Watch, merge};

/// How often [`DocumentStore::update`] re-reads a document that changed
/// under it before giving up.
const UPDATE_ATTEMPTS: u32 = 3;

/// The document store as clients see it.
///
/// Every call takes the caller's identity token (or none) and is checked
/// against the [`AccessPolicy`]. The caller's uid comes only from token
/// verification and the admin flag only from the store's own read of the
/// Authorization Record, so nothing in a request body can raise privilege.
#[derive(Clone)]
pub struct DocumentStore {
    backend: Arc<dyn DocumentBackend>,
    verifier: Arc<dyn TokenVerifier>,
    policy: Arc<AccessPolicy>,
}

impl DocumentStore {
    #[must_use]
    pub fn new(backend: Arc<dyn DocumentBackend>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            backend,
            verifier,
            policy: Arc::new(AccessPolicy::storefront()),
        }
    }

    /// The raw backend, for trusted callers (tooling, watches).
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn DocumentBackend> {
        &self.backend
    }

    /// Derive the caller for a token.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unauthenticated`] for a token that does not verify.
    pub async fn caller(&self, token: Option<&IdToken>) -> Result<Caller, StoreError> {
        let Some(token) = token else {
            return Ok(Caller::anonymous());
        };
        let uid = self
            .verifier
            .verify(token)
            .await
            .ok_or(StoreError::Unauthenticated)?;
        let is_admin = self
            .backend
            .get(Collection::Admins, uid.as_str())
            .await?
            .is_some();
        Ok(Caller::authenticated(uid, is_admin))
    }

    fn authorize(&self, request: &AccessRequest<'_>) -> Result<(), StoreError> {
        self.policy.check(request).map_err(|denied| {
            tracing::info!(
                collection = %request.collection,
                operation = %request.operation,
                document_id = request.document_id,
                uid = ?request.caller.uid(),
                reason = denied.reason(),
                "store access denied"
            );
            StoreError::PermissionDenied
        })
    }

    /// Read one document.
    ///
    /// # Errors
    ///
    /// [`StoreError::PermissionDenied`] if the caller may not read it.
    pub async fn get(
        &self,
        token: Option<&IdToken>,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let caller = self.caller(token).await?;
        let existing = self.backend.get(collection, id).await?;
        self.authorize(&AccessRequest {
            caller: &caller,
            collection,
            operation: Operation::Read,
            document_id: id,
            existing: existing.as_ref().map(|d| &d.data),
            incoming: None,
        })?;
        Ok(existing)
    }

    /// Run a query.
    ///
    /// All-or-nothing: the query is judged by its filters first, then every
    /// result is checked, and any failure denies the whole query. A query
    /// must be narrowed (for example to the caller's own orders) to succeed.
    ///
    /// # Errors
    ///
    /// [`StoreError::PermissionDenied`] as described above.
    pub async fn list(
        &self,
        token: Option<&IdToken>,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        let caller = self.caller(token).await?;
        self.list_as(&caller, query).await
    }

    pub(super) async fn list_as(
        &self,
        caller: &Caller,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        self.policy
            .check_query(caller, query.collection, &query.filters)
            .map_err(|denied| {
                tracing::info!(
                    collection = %query.collection,
                    uid = ?caller.uid(),
                    reason = denied.reason(),
                    "store query denied"
                );
                StoreError::PermissionDenied
            })?;
        let documents = self.backend.list(query).await?;
        for document in &documents {
            self.authorize(&AccessRequest {
                caller,
                collection: query.collection,
                operation: Operation::Read,
                document_id: &document.id,
                existing: Some(&document.data),
                incoming: None,
            })?;
        }
        Ok(documents)
    }

    /// Create a document. A fresh id is generated when `id` is `None`.
    ///
    /// Server-controlled fields (owner, id mirror, admin-only defaults) are
    /// stamped before the policy check.
    ///
    /// # Errors
    ///
    /// [`StoreError::PermissionDenied`] or [`StoreError::AlreadyExists`].
    pub async fn create(
        &self,
        token: Option<&IdToken>,
        collection: Collection,
        id: Option<&str>,
        data: Value,
    ) -> Result<Document, StoreError> {
        let caller = self.caller(token).await?;
        let id = id.map_or_else(new_document_id, str::to_owned);
        let Value::Object(mut body) = data else {
            return Err(StoreError::InvalidDocument(
                "document body must be an object".to_owned(),
            ));
        };
        self.policy.stamp(&caller, collection, &id, &mut body);
        let body = Value::Object(body);

        self.authorize(&AccessRequest {
            caller: &caller,
            collection,
            operation: Operation::Create,
            document_id: &id,
            existing: None,
            incoming: Some(&body),
        })?;
        self.backend.insert(collection, &id, body).await
    }

    /// Create or fully replace a document.
    ///
    /// Checked as a create when the document is missing and as an update
    /// otherwise.
    ///
    /// # Errors
    ///
    /// [`StoreError::PermissionDenied`] if the caller may not write it.
    pub async fn set(
        &self,
        token: Option<&IdToken>,
        collection: Collection,
        id: &str,
        data: Value,
    ) -> Result<Document, StoreError> {
        let caller = self.caller(token).await?;
        let existing = self.backend.get(collection, id).await?;
        let Some(existing) = existing else {
            return self.create(token, collection, Some(id), data).await;
        };
        self.authorize(&AccessRequest {
            caller: &caller,
            collection,
            operation: Operation::Update,
            document_id: id,
            existing: Some(&existing.data),
            incoming: Some(&data),
        })?;
        self.backend
            .replace(collection, id, &existing.data, data)
            .await
    }

    /// Merge `patch` into an existing document.
    ///
    /// The merge is applied to the body as read and written only if nothing
    /// changed in between; otherwise it is re-read, re-checked and retried.
    ///
    /// # Errors
    ///
    /// [`StoreError::PermissionDenied`], [`StoreError::NotFound`], or
    /// [`StoreError::Conflict`] when every attempt lost a race.
    pub async fn update(
        &self,
        token: Option<&IdToken>,
        collection: Collection,
        id: &str,
        patch: Value,
    ) -> Result<Document, StoreError> {
        let caller = self.caller(token).await?;
        for attempt in 1..=UPDATE_ATTEMPTS {
            let existing = self.backend.get(collection, id).await?;
            let Some(existing) = existing else {
                // Judge the request before revealing that the document is missing.
                self.authorize(&AccessRequest {
                    caller: &caller,
                    collection,
                    operation: Operation::Update,
                    document_id: id,
                    existing: None,
                    incoming: Some(&patch),
                })?;
                return Err(StoreError::NotFound);
            };
            let merged = merge(&existing.data, patch.clone())?;
            self.authorize(&AccessRequest {
                caller: &caller,
                collection,
                operation: Operation::Update,
                document_id: id,
                existing: Some(&existing.data),
                incoming: Some(&merged),
            })?;
            match self
                .backend
                .replace(collection, id, &existing.data, merged)
                .await
            {
                Err(StoreError::Conflict) => {
                    tracing::debug!(%collection, id, attempt, "concurrent write, retrying update");
                }
                result => return result,
            }
        }
        Err(StoreError::Conflict)
    }

    /// Delete a document.
    ///
    /// # Errors
    ///
    /// [`StoreError::PermissionDenied`] or [`StoreError::NotFound`].
    pub async fn delete(
        &self,
        token: Option<&IdToken>,
        collection: Collection,
        id: &str,
    ) -> Result<(), StoreError> {
        let caller = self.caller(token).await?;
        let existing = self.backend.get(collection, id).await?;
        self.authorize(&AccessRequest {
            caller: &caller,
            collection,
            operation: Operation::Delete,
            document_id: id,
            existing: existing.as_ref().map(|d| &d.data),
            incoming: None,
        })?;
        if existing.is_none() || !self.backend.remove(collection, id).await? {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Subscribe to a query.
    ///
    /// The returned [`Watch`] yields the full result set first and again
    /// after every write to the collection.
    ///
    /// # Errors
    ///
    /// Fails like [`list`](Self::list) for the initial snapshot.
    pub async fn watch(&self, token: Option<&IdToken>, query: Query) -> Result<Watch, StoreError> {
        // Subscribe before the first read so no write can fall in between.
        let changes = self.backend.changes();
        let caller = self.caller(token).await?;
        let initial = self.list_as(&caller, &query).await?;
        Ok(Watch::new(
            self.clone(),
            token.cloned(),
            query,
            changes,
            initial,
        ))
    }
}

/// A new random document id (20 characters).
#[must_use]
pub fn new_document_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(20);
    id
}
