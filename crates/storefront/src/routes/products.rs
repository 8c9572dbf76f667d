//! Public product API.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use right_water_core::records::Product;

use crate::error::{AppError, Result};
use crate::middleware::Client;
use crate::state::AppState;

/// Search query for product listings.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

/// One product as shown on a page.
pub struct ProductCard {
    pub id: String,
    pub name: String,
    pub category: String,
    pub price: String,
    pub original_price: Option<String>,
    pub stock: u32,
    pub image: Option<String>,
}

impl From<&Product> for ProductCard {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.to_string(),
            name: product.data.name.clone(),
            category: product.data.category.clone().unwrap_or_default(),
            price: product.data.price.to_string(),
            original_price: product.data.original_price.map(|p| p.to_string()),
            stock: product.data.stock,
            image: product.data.image.clone(),
        }
    }
}

/// All products ordered by name, narrowed by `?q=`.
pub async fn index(
    State(state): State<AppState>,
    client: Client,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Product>>> {
    let products = state
        .catalog()
        .list(client.token().as_ref(), query.q.as_deref())
        .await?;
    Ok(Json(products))
}

pub async fn show(
    State(state): State<AppState>,
    client: Client,
    Path(id): Path<String>,
) -> Result<Json<Product>> {
    state
        .catalog()
        .get(client.token().as_ref(), &id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))
}
