//! Order placement and management.

use chrono::Utc;
use serde_json::json;
use thiserror::Error;

use right_water_core::authz::Collection;
use right_water_core::records::{
    LineItem, MAX_LINE_QUANTITY, NewOrder, ORDER_OWNER_FIELD, Order, OrderData, ProductData,
};
use right_water_core::types::{IdToken, OrderStatus, PriceError, ProductId, Uid};

use crate::store::{Document, DocumentStore, Query, StoreError, to_body};

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("an order needs at least one item")]
    Empty,

    #[error("quantity must be between 1 and {max} for product {0}", max = MAX_LINE_QUANTITY)]
    InvalidQuantity(ProductId),

    #[error("order total is out of range: {0}")]
    Total(#[from] PriceError),

    #[error("unknown product: {0}")]
    UnknownProduct(ProductId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Order operations on behalf of a signed-in client.
#[derive(Clone)]
pub struct OrderService {
    store: DocumentStore,
}

impl OrderService {
    #[must_use]
    pub const fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    /// Place an order for `uid`, pricing every line from the catalog.
    ///
    /// The order names `request.user_id` when given, otherwise `uid`; the
    /// store refuses any owner other than the verified caller.
    ///
    /// # Errors
    ///
    /// Input errors before any write, then store errors.
    pub async fn place(
        &self,
        token: Option<&IdToken>,
        uid: &Uid,
        request: NewOrder,
    ) -> Result<Order, OrderError> {
        if request.items.is_empty() {
            return Err(OrderError::Empty);
        }

        let mut items = Vec::with_capacity(request.items.len());
        for line in request.items {
            if line.quantity == 0 || line.quantity > MAX_LINE_QUANTITY {
                return Err(OrderError::InvalidQuantity(line.product_id));
            }
            let product = self
                .store
                .get(token, Collection::Products, line.product_id.as_str())
                .await?
                .ok_or_else(|| OrderError::UnknownProduct(line.product_id.clone()))?
                .decode::<ProductData>()?;
            items.push(LineItem {
                product_id: line.product_id,
                name: product.name,
                unit_price: product.price,
                quantity: line.quantity,
            });
        }

        let owner = request.user_id.unwrap_or_else(|| uid.clone());
        let data = OrderData::pending(owner, items, Utc::now())?;
        let document = self
            .store
            .create(token, Collection::Orders, None, to_body(&data)?)
            .await?;

        tracing::info!(order_id = %document.id, total = %data.total, "order placed");
        Ok(decode_order(&document)?)
    }

    /// Orders visible to the client, newest first: every order for an
    /// administrator, otherwise only `uid`'s own.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub async fn list(
        &self,
        token: Option<&IdToken>,
        uid: &Uid,
        is_admin: bool,
    ) -> Result<Vec<Order>, OrderError> {
        let mut query = Query::collection(Collection::Orders);
        if !is_admin {
            query = query.where_eq(ORDER_OWNER_FIELD, uid.as_str());
        }
        let documents = self
            .store
            .list(token, &query.order_by_desc("createdAt"))
            .await?;
        Ok(documents
            .iter()
            .map(decode_order)
            .collect::<Result<_, _>>()?)
    }

    /// # Errors
    ///
    /// Store errors.
    pub async fn get(&self, token: Option<&IdToken>, id: &str) -> Result<Option<Order>, OrderError> {
        let document = self.store.get(token, Collection::Orders, id).await?;
        Ok(document.as_ref().map(decode_order).transpose()?)
    }

    /// Move an order to a new status. Administrators only.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub async fn update_status(
        &self,
        token: Option<&IdToken>,
        id: &str,
        status: OrderStatus,
    ) -> Result<Order, OrderError> {
        let document = self
            .store
            .update(token, Collection::Orders, id, json!({ "status": status }))
            .await?;
        tracing::info!(order_id = %id, %status, "order status updated");
        Ok(decode_order(&document)?)
    }
}

fn decode_order(document: &Document) -> Result<Order, StoreError> {
    Ok(Order {
        id: document.id.as_str().into(),
        data: document.decode()?,
    })
}
