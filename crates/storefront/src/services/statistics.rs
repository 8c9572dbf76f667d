//! Store statistics kept in `statistics/summary`.

use chrono::Utc;

use right_water_core::authz::Collection;
use right_water_core::records::{OrderData, StatisticsSummary};
use right_water_core::types::IdToken;

use crate::store::{DocumentStore, Query, StoreError, to_body};

/// Reads and recomputes the statistics summary. Every call is subject to
/// the administrator-only rules of both source collections and the summary.
#[derive(Clone)]
pub struct StatisticsService {
    store: DocumentStore,
}

impl StatisticsService {
    #[must_use]
    pub const fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    /// Recompute the summary from the catalog and every order, and store it.
    ///
    /// # Errors
    ///
    /// Store errors, including [`StoreError::PermissionDenied`] for
    /// non-admins.
    pub async fn refresh(&self, token: Option<&IdToken>) -> Result<StatisticsSummary, StoreError> {
        let orders = self
            .store
            .list(token, &Query::collection(Collection::Orders))
            .await?
            .iter()
            .map(|doc| doc.decode::<OrderData>())
            .collect::<Result<Vec<_>, _>>()?;
        let products = self
            .store
            .list(token, &Query::collection(Collection::Products))
            .await?;

        let summary = StatisticsSummary::compute(products.len() as u64, &orders, Utc::now())
            .map_err(|e| StoreError::InvalidDocument(e.to_string()))?;
        self.store
            .set(
                token,
                Collection::Statistics,
                StatisticsSummary::DOCUMENT_ID,
                to_body(&summary)?,
            )
            .await?;

        tracing::info!(
            products = summary.product_count,
            orders = summary.order_count,
            "statistics refreshed"
        );
        Ok(summary)
    }

    /// The stored summary, if it was ever computed.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub async fn read(&self, token: Option<&IdToken>) -> Result<Option<StatisticsSummary>, StoreError> {
        self.store
            .get(token, Collection::Statistics, StatisticsSummary::DOCUMENT_ID)
            .await?
            .map(|doc| doc.decode())
            .transpose()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use right_water_core::types::Uid;

    use super::*;
    use crate::store::{DocumentBackend, MemoryBackend, TokenVerifier};

    struct PrefixVerifier;

    #[async_trait]
    impl TokenVerifier for PrefixVerifier {
        async fn verify(&self, token: &IdToken) -> Option<Uid> {
            token.expose().strip_prefix("token-").map(Uid::new)
        }
    }

    #[tokio::test]
    async fn admin_refreshes_and_reads_summary() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .insert(Collection::Admins, "boss", json!({}))
            .await
            .unwrap();
        backend
            .insert(
                Collection::Products,
                "water",
                json!({ "name": "Still Water", "price": "2.50" }),
            )
            .await
            .unwrap();
        let service = StatisticsService::new(DocumentStore::new(backend, Arc::new(PrefixVerifier)));
        let admin = IdToken::new("token-boss");

        assert!(service.read(Some(&admin)).await.unwrap().is_none());
        let summary = service.refresh(Some(&admin)).await.unwrap();
        assert_eq!(summary.product_count, 1);
        assert_eq!(summary.order_count, 0);
        assert_eq!(service.read(Some(&admin)).await.unwrap(), Some(summary));
    }

    #[tokio::test]
    async fn customers_cannot_touch_statistics() {
        let backend = Arc::new(MemoryBackend::new());
        let service = StatisticsService::new(DocumentStore::new(backend, Arc::new(PrefixVerifier)));
        let customer = IdToken::new("token-ana");

        assert!(matches!(
            service.refresh(Some(&customer)).await,
            Err(StoreError::PermissionDenied)
        ));
        assert!(matches!(
            service.read(Some(&customer)).await,
            Err(StoreError::PermissionDenied)
        ));
    }
}
