//! Orders and the statistics summary derived from them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{OrderId, OrderStatus, Price, PriceError, ProductId, Uid};

/// Field of an order document that names its owner.
pub const ORDER_OWNER_FIELD: &str = "userId";

/// Largest quantity a single order line may request.
pub const MAX_LINE_QUANTITY: u32 = 10_000;

/// One product line of an order, priced at the time the order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Price,
    pub quantity: u32,
}

impl LineItem {
    /// Price of the line (unit price times quantity).
    ///
    /// # Errors
    ///
    /// [`PriceError::TooLarge`] when the line exceeds [`Price::MAX`].
    pub fn subtotal(&self) -> Result<Price, PriceError> {
        self.unit_price.times(self.quantity)
    }
}

/// Body of an `orders/{id}` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderData {
    /// Owner of the order. Stamped by the store on create.
    pub user_id: Uid,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub status: OrderStatus,
    pub total: Price,
    pub created_at: DateTime<Utc>,
}

impl OrderData {
    /// Build a pending order for `user_id`, totalling the lines.
    ///
    /// # Errors
    ///
    /// [`PriceError::TooLarge`] when the total exceeds [`Price::MAX`].
    pub fn pending(
        user_id: Uid,
        items: Vec<LineItem>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, PriceError> {
        let total = Price::total(items.iter().map(LineItem::subtotal))?;
        Ok(Self {
            user_id,
            items,
            status: OrderStatus::Pending,
            total,
            created_at,
        })
    }
}

/// An order together with its document id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(flatten)]
    pub data: OrderData,
}

/// What a customer submits when checking out: product references only.
/// Names and prices are looked up from the catalog.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub items: Vec<NewOrderLine>,
    /// Owner the client claims. The store accepts only the caller's own uid.
    #[serde(default)]
    pub user_id: Option<Uid>,
}

/// One requested product line.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Body of the `statistics/summary` document. Administrator-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSummary {
    pub product_count: u64,
    pub order_count: u64,
    /// Sum of totals over orders that were not cancelled.
    pub revenue: Price,
    pub orders_by_status: BTreeMap<String, u64>,
    pub refreshed_at: DateTime<Utc>,
}

impl StatisticsSummary {
    /// Document id under which the summary is stored.
    pub const DOCUMENT_ID: &'static str = "summary";

    /// Compute a summary from the full product count and order list.
    ///
    /// # Errors
    ///
    /// [`PriceError::TooLarge`] when revenue exceeds [`Price::MAX`].
    pub fn compute(
        product_count: u64,
        orders: &[OrderData],
        now: DateTime<Utc>,
    ) -> Result<Self, PriceError> {
        let mut orders_by_status: BTreeMap<String, u64> = OrderStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_owned(), 0))
            .collect();
        for order in orders {
            *orders_by_status
                .entry(order.status.as_str().to_owned())
                .or_default() += 1;
        }
        let revenue = Price::total(
            orders
                .iter()
                .filter(|o| o.status != OrderStatus::Cancelled)
                .map(|o| Ok(o.total)),
        )?;

        Ok(Self {
            product_count,
            order_count: orders.len() as u64,
            revenue,
            orders_by_status,
            refreshed_at: now,
        })
    }
}
