//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use tracing::instrument;

use super::products::{ProductCard, SearchQuery};
use crate::error::Result;
use crate::middleware::Client;
use crate::state::AppState;

#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    /// Greeting name, when signed in.
    pub signed_in_as: Option<String>,
    pub is_admin: bool,
    pub products: Vec<ProductCard>,
    pub search: String,
}

/// Catalog for everyone, with account links for the signed-in client.
///
/// The page never waits for a pending role lookup; the admin link simply
/// appears once it has settled.
#[instrument(skip(state, client))]
pub async fn home(
    State(state): State<AppState>,
    client: Client,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse> {
    let session = client.context.session.snapshot();
    let products = state
        .catalog()
        .list(client.token().as_ref(), query.q.as_deref())
        .await?;

    Ok(HomeTemplate {
        signed_in_as: session.identity.map(|identity| {
            identity
                .display_name
                .unwrap_or_else(|| identity.email.to_string())
        }),
        is_admin: session.is_admin && !session.loading,
        products: products.iter().map(ProductCard::from).collect(),
        search: query.q.unwrap_or_default(),
    })
}
