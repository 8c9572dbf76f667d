//! Administrator views and catalog management.
//!
//! Every handler takes [`RequireAdmin`], which only decides what to show.
//! The document store re-checks the administrator's authorization record on
//! every write, so a forged request from a customer still fails with 403.

use std::convert::Infallible;
use std::str::FromStr;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Redirect, Response, Sse,
        sse::{Event, KeepAlive},
    },
};
use futures::{Stream, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use right_water_core::records::{Order, Product, ProductDraft, StatisticsSummary};
use right_water_core::types::OrderStatus;

use super::account::OrderRow;
use super::products::{ProductCard, SearchQuery};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::services::catalog::{CatalogError, ImageUpload};
use crate::state::AppState;

// =============================================================================
// Templates
// =============================================================================

/// Statistics as shown on the dashboard.
pub struct StatisticsView {
    pub product_count: u64,
    pub order_count: u64,
    pub revenue: String,
    pub by_status: Vec<(String, u64)>,
    pub refreshed: String,
}

impl From<StatisticsSummary> for StatisticsView {
    fn from(summary: StatisticsSummary) -> Self {
        Self {
            product_count: summary.product_count,
            order_count: summary.order_count,
            revenue: summary.revenue.to_string(),
            by_status: summary.orders_by_status.into_iter().collect(),
            refreshed: summary.refreshed_at.format("%Y-%m-%d %H:%M UTC").to_string(),
        }
    }
}

/// A choice in an order's status picker.
pub struct StatusOption {
    pub value: &'static str,
    pub selected: bool,
}

/// An order row with its status picker.
pub struct DashboardOrder {
    pub order: OrderRow,
    pub statuses: Vec<StatusOption>,
}

impl From<&Order> for DashboardOrder {
    fn from(order: &Order) -> Self {
        Self {
            order: OrderRow::from(order),
            statuses: OrderStatus::ALL
                .into_iter()
                .map(|status| StatusOption {
                    value: status.as_str(),
                    selected: status == order.data.status,
                })
                .collect(),
        }
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/dashboard.html")]
pub struct DashboardTemplate {
    pub display_name: String,
    pub statistics: Option<StatisticsView>,
    pub orders: Vec<DashboardOrder>,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/products.html")]
pub struct ProductsTemplate {
    pub products: Vec<ProductCard>,
    pub search: String,
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Add and edit form. `id` is `None` when adding.
#[derive(Template, WebTemplate)]
#[template(path = "admin/product_form.html")]
pub struct ProductFormTemplate {
    pub id: Option<String>,
    pub name: String,
    pub category: String,
    pub price: String,
    pub original_price: String,
    pub stock: u32,
    pub description: String,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CatalogMessageQuery {
    pub q: Option<String>,
    pub error: Option<String>,
    pub success: Option<String>,
}

// =============================================================================
// Dashboard
// =============================================================================

/// Statistics summary and every order, newest first.
pub async fn dashboard(
    State(state): State<AppState>,
    RequireAdmin(guarded): RequireAdmin,
) -> Result<impl IntoResponse> {
    let token = Some(&guarded.auth.token);
    let statistics = state.statistics().read(token).await?;
    let orders = state
        .orders()
        .list(token, &guarded.auth.identity.uid, true)
        .await?;

    Ok(DashboardTemplate {
        display_name: guarded
            .auth
            .identity
            .display_name
            .clone()
            .unwrap_or_default(),
        statistics: statistics.map(StatisticsView::from),
        orders: orders.iter().map(DashboardOrder::from).collect(),
    })
}

// =============================================================================
// Catalog
// =============================================================================

/// Catalog table, narrowed by `?q=`.
pub async fn products(
    State(state): State<AppState>,
    RequireAdmin(guarded): RequireAdmin,
    Query(query): Query<CatalogMessageQuery>,
) -> Result<impl IntoResponse> {
    let products = state
        .catalog()
        .list(Some(&guarded.auth.token), query.q.as_deref())
        .await?;

    Ok(ProductsTemplate {
        products: products.iter().map(ProductCard::from).collect(),
        search: query.q.unwrap_or_default(),
        error: query.error,
        success: query.success,
    })
}

/// Empty add form.
pub async fn new_product(RequireAdmin(_guarded): RequireAdmin) -> impl IntoResponse {
    ProductFormTemplate {
        id: None,
        name: String::new(),
        category: String::new(),
        price: String::new(),
        original_price: String::new(),
        stock: 0,
        description: String::new(),
        image: None,
    }
}

/// Edit form filled from the stored product.
pub async fn edit_product(
    State(state): State<AppState>,
    RequireAdmin(guarded): RequireAdmin,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let product = state
        .catalog()
        .get(Some(&guarded.auth.token), &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))?;
    let data = product.data;

    Ok(ProductFormTemplate {
        id: Some(product.id.into_inner()),
        name: data.name,
        category: data.category.unwrap_or_default(),
        price: data.price.amount().to_string(),
        original_price: data
            .original_price
            .map(|p| p.amount().to_string())
            .unwrap_or_default(),
        stock: data.stock,
        description: data.description,
        image: data.image,
    })
}

/// Read the multipart product form.
///
/// Text fields fill the draft; a non-empty `image` file field becomes the
/// upload. Unparseable numbers are reported as messages for the form.
async fn read_product_form(
    mut multipart: Multipart,
) -> Result<std::result::Result<(ProductDraft, Option<ImageUpload>), String>> {
    let mut draft = ProductDraft::default();
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        if name == "image" {
            let file_name = field.file_name().unwrap_or_default().to_owned();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_owned();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            if !file_name.is_empty() && !bytes.is_empty() {
                image = Some(ImageUpload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        let value = value.trim();
        match name.as_str() {
            "name" => draft.name = value.to_owned(),
            "category" => draft.category = value.to_owned(),
            "description" => draft.description = value.to_owned(),
            "price" => match parse_decimal(value) {
                Some(price) => draft.price = price,
                None => return Ok(Err("Please enter a valid price.".to_owned())),
            },
            "originalPrice" => {
                if !value.is_empty() {
                    match parse_decimal(value) {
                        Some(price) => draft.original_price = Some(price),
                        None => return Ok(Err("Please enter a valid original price.".to_owned())),
                    }
                }
            }
            "stock" => match value.parse::<i64>() {
                Ok(stock) => draft.stock = stock,
                Err(_) if value.is_empty() => draft.stock = 0,
                Err(_) => return Ok(Err("Please enter a whole number for stock.".to_owned())),
            },
            other => tracing::debug!(field = other, "ignoring unknown product form field"),
        }
    }

    Ok(Ok((draft, image)))
}

fn parse_decimal(value: &str) -> Option<Decimal> {
    if value.is_empty() {
        return Some(Decimal::ZERO);
    }
    Decimal::from_str(value).ok()
}

fn catalog_redirect(key: &str, message: &str) -> Redirect {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(key, message)
        .finish();
    Redirect::to(&format!("/admin/products?{query}"))
}

/// Turn a catalog result into the form's redirect. Input problems go back
/// to the page as a message; store and upload failures are errors.
fn catalog_outcome(result: std::result::Result<Product, CatalogError>, done: &str) -> Result<Redirect> {
    match result {
        Ok(_) => Ok(catalog_redirect("success", done)),
        Err(CatalogError::Validation(e)) => Ok(catalog_redirect("error", &capitalize(&e.to_string()))),
        Err(e) => Err(e.into()),
    }
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect::<String>() + "."
    })
}

/// Add a product from the multipart form.
pub async fn create_product(
    State(state): State<AppState>,
    RequireAdmin(guarded): RequireAdmin,
    multipart: Multipart,
) -> Result<Redirect> {
    let (draft, image) = match read_product_form(multipart).await? {
        Ok(form) => form,
        Err(message) => return Ok(catalog_redirect("error", &message)),
    };
    let result = state
        .catalog()
        .create(
            Some(&guarded.auth.token),
            &draft,
            image,
            &guarded.client.context.uploads,
        )
        .await;
    catalog_outcome(result, "Product added.")
}

/// Edit a product from the multipart form. Without a new image the stored
/// one is kept.
pub async fn update_product(
    State(state): State<AppState>,
    RequireAdmin(guarded): RequireAdmin,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Redirect> {
    let (draft, image) = match read_product_form(multipart).await? {
        Ok(form) => form,
        Err(message) => return Ok(catalog_redirect("error", &message)),
    };
    let result = state
        .catalog()
        .update(
            Some(&guarded.auth.token),
            &id,
            &draft,
            image,
            &guarded.client.context.uploads,
        )
        .await;
    catalog_outcome(result, "Product updated.")
}

pub async fn delete_product(
    State(state): State<AppState>,
    RequireAdmin(guarded): RequireAdmin,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state
        .catalog()
        .delete(Some(&guarded.auth.token), &id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Form variant of [`delete_product`] for pages without scripts.
pub async fn delete_product_form(
    State(state): State<AppState>,
    RequireAdmin(guarded): RequireAdmin,
    Path(id): Path<String>,
) -> Result<Redirect> {
    state
        .catalog()
        .delete(Some(&guarded.auth.token), &id)
        .await?;
    Ok(catalog_redirect("success", "Product deleted."))
}

/// Live catalog as server-sent events.
///
/// Each `products` event carries the full list ordered by name. A store
/// failure is sent as an `error` event and ends the stream.
pub async fn products_stream(
    State(state): State<AppState>,
    RequireAdmin(guarded): RequireAdmin,
    Query(query): Query<SearchQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let live = state.catalog().live(Some(&guarded.auth.token)).await?;
    let search = query.q;

    let events = live.map(move |snapshot| {
        let event = match snapshot {
            Ok(products) => {
                let products = match &search {
                    Some(term) => crate::services::catalog::filter_products(&products, term),
                    None => products,
                };
                let json = serde_json::to_string(&products).unwrap_or_else(|_| "[]".to_string());
                Event::default().event("products").data(json)
            }
            Err(e) => {
                tracing::warn!(error = %e, "catalog stream failed");
                Event::default().event("error").data("Catalog unavailable")
            }
        };
        Ok(event)
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Fraction of the client's current image upload, or `null` when idle.
pub async fn upload_progress(RequireAdmin(guarded): RequireAdmin) -> Json<serde_json::Value> {
    Json(json!({ "progress": guarded.client.context.uploads.current() }))
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
}

/// Move an order to a new status.
pub async fn update_order_status(
    State(state): State<AppState>,
    RequireAdmin(guarded): RequireAdmin,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<Order>> {
    let order = state
        .orders()
        .update_status(Some(&guarded.auth.token), &id, update.status)
        .await?;
    Ok(Json(order))
}

/// Form variant of [`update_order_status`] used by the dashboard.
pub async fn update_order_status_form(
    State(state): State<AppState>,
    RequireAdmin(guarded): RequireAdmin,
    Path(id): Path<String>,
    Form(update): Form<StatusUpdate>,
) -> Result<Redirect> {
    state
        .orders()
        .update_status(Some(&guarded.auth.token), &id, update.status)
        .await?;
    Ok(Redirect::to("/admin"))
}

// =============================================================================
// Statistics
// =============================================================================

pub async fn statistics(
    State(state): State<AppState>,
    RequireAdmin(guarded): RequireAdmin,
) -> Result<Response> {
    Ok(match state.statistics().read(Some(&guarded.auth.token)).await? {
        Some(summary) => Json(summary).into_response(),
        None => AppError::NotFound("statistics summary".to_string()).into_response(),
    })
}

/// Recompute the summary and return to the dashboard.
pub async fn refresh_statistics(
    State(state): State<AppState>,
    RequireAdmin(guarded): RequireAdmin,
) -> Result<Redirect> {
    let summary = state
        .statistics()
        .refresh(Some(&guarded.auth.token))
        .await?;
    tracing::info!(orders = summary.order_count, "statistics refreshed");
    Ok(Redirect::to("/admin"))
}
