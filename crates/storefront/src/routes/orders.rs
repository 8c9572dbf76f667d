//! Order API for signed-in customers.
//!
//! Customers see their own orders; administrators see every order. The
//! document store makes the final call on each read and write.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use right_water_core::records::{NewOrder, Order};

use crate::error::{AppError, Result};
use crate::middleware::RequireSignedIn;
use crate::state::AppState;

/// Orders visible to the caller, newest first.
pub async fn index(
    State(state): State<AppState>,
    RequireSignedIn(guarded): RequireSignedIn,
) -> Result<Json<Vec<Order>>> {
    let orders = state
        .orders()
        .list(
            Some(&guarded.auth.token),
            &guarded.auth.identity.uid,
            guarded.state.is_admin,
        )
        .await?;
    Ok(Json(orders))
}

/// Place an order priced from the catalog.
pub async fn create(
    State(state): State<AppState>,
    RequireSignedIn(guarded): RequireSignedIn,
    Json(request): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = state
        .orders()
        .place(
            Some(&guarded.auth.token),
            &guarded.auth.identity.uid,
            request,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn show(
    State(state): State<AppState>,
    RequireSignedIn(guarded): RequireSignedIn,
    Path(id): Path<String>,
) -> Result<Json<Order>> {
    state
        .orders()
        .get(Some(&guarded.auth.token), &id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("order {id}")))
}
