//! `PostgreSQL` document backend.
//!
//! Bodies live in one `documents` table as `jsonb`. A trigger publishes the
//! collection name on the `document_changes` channel after every write, so
//! watches also see writes made by other processes (such as `rw-cli admin
//! grant`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::PgListener;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use right_water_core::authz::Collection;

use super::{RepositoryError, conflict_or_database};
use crate::store::{Document, DocumentBackend, Query, StoreError};

/// Notification channel fed by the `documents` trigger.
pub const CHANGES_CHANNEL: &str = "document_changes";

#[derive(sqlx::FromRow)]
struct DocumentRow {
    collection: String,
    id: String,
    data: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = RepositoryError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let collection = row.collection.parse::<Collection>().map_err(|e| {
            RepositoryError::DataCorruption(format!("document {}: {e}", row.id))
        })?;
        Ok(Self {
            collection,
            id: row.id,
            data: row.data,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<RepositoryError> for StoreError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::Conflict(_) => Self::AlreadyExists,
            RepositoryError::DataCorruption(msg) => Self::InvalidDocument(msg),
            RepositoryError::Database(e) => Self::Unavailable(e.to_string()),
        }
    }
}

/// A [`DocumentBackend`] over the `documents` table.
pub struct PgBackend {
    pool: PgPool,
    changes: broadcast::Sender<Collection>,
}

impl PgBackend {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self { pool, changes }
    }

    /// Start forwarding database change notifications to watchers.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` if the listener connection cannot be set up.
    pub async fn listen(&self) -> Result<JoinHandle<()>, sqlx::Error> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(CHANGES_CHANNEL).await?;
        let changes = self.changes.clone();

        Ok(tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => match notification.payload().parse::<Collection>() {
                        Ok(collection) => {
                            let _ = changes.send(collection);
                        }
                        Err(e) => tracing::warn!(error = %e, "ignoring change notification"),
                    },
                    Err(e) => {
                        // PgListener reconnects on the next recv.
                        tracing::error!(error = %e, "document change listener failed");
                    }
                }
            }
        }))
    }

    async fn fetch(&self, collection: Collection, id: &str) -> Result<Option<Document>, RepositoryError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r"
            SELECT collection, id, data, created_at, updated_at
            FROM documents
            WHERE collection = $1 AND id = $2
            ",
        )
        .bind(collection.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Document::try_from).transpose()
    }
}

#[async_trait]
impl DocumentBackend for PgBackend {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.fetch(collection, id).await?)
    }

    async fn list(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT collection, id, data, created_at, updated_at FROM documents WHERE collection = ",
        );
        builder.push_bind(query.collection.as_str());

        if !query.filters.is_empty() {
            let filter: Map<String, Value> = query.filters.iter().cloned().collect();
            builder.push(" AND data @> ").push_bind(Value::Object(filter));
        }
        if let Some(order) = &query.order_by {
            builder
                .push(" ORDER BY data -> ")
                .push_bind(order.field.clone())
                .push(if order.descending { " DESC" } else { " ASC" })
                .push(", id");
        }
        if let Some(limit) = query.limit {
            builder
                .push(" LIMIT ")
                .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = builder
            .build_query_as::<DocumentRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(rows
            .into_iter()
            .map(Document::try_from)
            .collect::<Result<_, _>>()?)
    }

    async fn insert(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
    ) -> Result<Document, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r"
            INSERT INTO documents (collection, id, data)
            VALUES ($1, $2, $3)
            RETURNING collection, id, data, created_at, updated_at
            ",
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(data)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or_database(e, "document"))?;
        Ok(Document::try_from(row)?)
    }

    async fn replace(
        &self,
        collection: Collection,
        id: &str,
        expected: &Value,
        data: Value,
    ) -> Result<Document, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r"
            UPDATE documents
            SET data = $4, updated_at = NOW()
            WHERE collection = $1 AND id = $2 AND data = $3
            RETURNING collection, id, data, created_at, updated_at
            ",
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(expected)
        .bind(data)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        match row {
            Some(row) => Ok(Document::try_from(row)?),
            None if self.fetch(collection, id).await?.is_some() => Err(StoreError::Conflict),
            None => Err(StoreError::NotFound),
        }
    }

    async fn remove(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(result.rows_affected() > 0)
    }

    fn changes(&self) -> broadcast::Receiver<Collection> {
        self.changes.subscribe()
    }
}
