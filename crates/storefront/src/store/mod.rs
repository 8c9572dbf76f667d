//! Document store.
//!
//! Two layers:
//!
//! - [`DocumentBackend`] is raw storage (Postgres `jsonb` or in-memory). It
//!   applies no rules and is only handed to trusted code: the enforced
//!   façade and the out-of-band admin tooling.
//! - [`DocumentStore`] wraps a backend and evaluates the access policy on
//!   every call, deriving the caller from a verified identity token.

mod enforced;
mod memory;
mod watch;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use right_water_core::authz::Collection;
use right_water_core::types::{IdToken, Uid};

pub use enforced::DocumentStore;
pub use memory::MemoryBackend;
pub use watch::Watch;

/// Errors surfaced by the document store.
///
/// `PermissionDenied` deliberately carries no detail: the failing rule is
/// logged server-side and never returned to the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found")]
    NotFound,
    #[error("document already exists")]
    AlreadyExists,
    #[error("document changed since it was read")]
    Conflict,
    #[error("permission denied")]
    PermissionDenied,
    #[error("identity token is invalid or expired")]
    Unauthenticated,
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidDocument(err.to_string())
    }
}

/// A stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub collection: Collection,
    pub id: String,
    /// Always a JSON object.
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Deserialize the body into a record type.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidDocument`] if the body does not match.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        T::deserialize(&self.data).map_err(|e| {
            StoreError::InvalidDocument(format!("{}/{}: {e}", self.collection, self.id))
        })
    }
}

/// Sort key of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

/// A query over one collection: equality filters, an optional sort field,
/// and an optional limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: Collection,
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    #[must_use]
    pub const fn collection(collection: Collection) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            descending: false,
        });
        self
    }

    #[must_use]
    pub fn order_by_desc(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            descending: true,
        });
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a document body satisfies every filter.
    #[must_use]
    pub fn matches(&self, data: &Value) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| data.get(field) == Some(expected))
    }
}

/// Raw document storage. No access rules are applied at this level.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError>;

    async fn list(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Insert a new document. Fails with [`StoreError::AlreadyExists`].
    async fn insert(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
    ) -> Result<Document, StoreError>;

    /// Replace the body of an existing document, provided it still equals
    /// `expected`. Fails with [`StoreError::NotFound`], or with
    /// [`StoreError::Conflict`] when another write got there first.
    async fn replace(
        &self,
        collection: Collection,
        id: &str,
        expected: &Value,
        data: Value,
    ) -> Result<Document, StoreError>;

    /// Remove a document, returning whether it existed.
    async fn remove(&self, collection: Collection, id: &str) -> Result<bool, StoreError>;

    /// Notifications of writes, one message per changed collection.
    fn changes(&self) -> broadcast::Receiver<Collection>;
}

/// Verifies identity tokens on behalf of the store.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// The uid a token proves, or `None` if it is invalid or expired.
    async fn verify(&self, token: &IdToken) -> Option<Uid>;
}

/// Serialize a record into a document body.
///
/// # Errors
///
/// Returns [`StoreError::InvalidDocument`] unless the record serializes to a
/// JSON object.
pub fn to_body<T: Serialize>(record: &T) -> Result<Value, StoreError> {
    match serde_json::to_value(record)? {
        body @ Value::Object(_) => Ok(body),
        _ => Err(StoreError::InvalidDocument(
            "document body must be an object".to_owned(),
        )),
    }
}

/// Shallow-merge `patch` into `base` (top-level fields replace).
fn merge(base: &Value, patch: Value) -> Result<Value, StoreError> {
    let (Value::Object(base), Value::Object(patch)) = (base, patch) else {
        return Err(StoreError::InvalidDocument(
            "document body must be an object".to_owned(),
        ));
    };
    let mut merged = base.clone();
    merged.extend(patch);
    Ok(Value::Object(merged))
}

/// Compare two field values for sorting.
///
/// Numbers compare numerically, everything else by its string form, and
/// missing values sort first.
fn compare_field(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}
