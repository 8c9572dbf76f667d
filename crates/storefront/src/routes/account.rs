//! Account page for signed-in customers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
};

use right_water_core::records::Order;

use super::auth::{MessageQuery, error_message, success_message};
use crate::error::Result;
use crate::middleware::RequireSignedIn;
use crate::state::AppState;

/// One order as shown in a table.
pub struct OrderRow {
    pub id: String,
    pub placed: String,
    pub status: String,
    pub items: u64,
    pub total: String,
}

impl From<&Order> for OrderRow {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.to_string(),
            placed: order.data.created_at.format("%Y-%m-%d %H:%M").to_string(),
            status: order.data.status.to_string(),
            items: order.data.items.iter().map(|i| u64::from(i.quantity)).sum(),
            total: order.data.total.to_string(),
        }
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "account.html")]
pub struct AccountTemplate {
    pub display_name: String,
    pub email: String,
    pub member_since: Option<String>,
    pub is_admin: bool,
    pub orders: Vec<OrderRow>,
    pub error: Option<&'static str>,
    pub success: Option<&'static str>,
}

/// Profile details, the profile and password forms, and order history.
pub async fn index(
    State(state): State<AppState>,
    RequireSignedIn(guarded): RequireSignedIn,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse> {
    let token = Some(&guarded.auth.token);
    let identity = &guarded.auth.identity;

    let profile = state.accounts().profile(token, &identity.uid).await?;
    // Customers see their own orders here even when they are administrators.
    let orders = state.orders().list(token, &identity.uid, false).await?;

    Ok(AccountTemplate {
        display_name: identity.display_name.clone().unwrap_or_default(),
        email: identity.email.to_string(),
        member_since: profile.map(|p| p.created_at.format("%B %Y").to_string()),
        is_admin: guarded.state.is_admin,
        orders: orders.iter().map(OrderRow::from).collect(),
        error: query.error.as_deref().map(error_message),
        success: query.success.as_deref().map(success_message),
    })
}
