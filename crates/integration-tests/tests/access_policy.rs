//! The document store refuses writes the caller's role does not allow,
//! whichever route or view made them.

#![allow(clippy::unwrap_used)]

use serde_json::json;

use right_water_core::authz::Collection;
use right_water_integration_tests::TestApp;
use right_water_storefront::services::catalog::CatalogError;
use right_water_storefront::services::orders::OrderError;
use right_water_storefront::store::{DocumentBackend, StoreError};

#[tokio::test]
async fn test_customer_token_cannot_delete_products() {
    let app = TestApp::spawn().await;
    app.seed_product("p1", "Jug", "12.00", 3).await;
    app.register(&app.browser(), "ada@example.com", "correct horse", "Ada")
        .await;
    let token = app.token_for("ada@example.com", "correct horse").await;

    let err = app
        .state
        .catalog()
        .delete(Some(&token), "p1")
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Store(StoreError::PermissionDenied)));
    assert!(app.state.catalog().get(None, "p1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_admin_token_deletes_products() {
    let app = TestApp::spawn().await;
    app.seed_product("p1", "Jug", "12.00", 3).await;
    app.register(&app.browser(), "owner@example.com", "correct horse", "Owner")
        .await;
    app.grant_admin("owner@example.com").await;
    let token = app.token_for("owner@example.com", "correct horse").await;

    app.state.catalog().delete(Some(&token), "p1").await.unwrap();
    assert!(app.state.catalog().get(None, "p1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_revoked_admin_loses_write_access() {
    let app = TestApp::spawn().await;
    app.seed_product("p1", "Jug", "12.00", 3).await;
    app.register(&app.browser(), "owner@example.com", "correct horse", "Owner")
        .await;
    let uid = app.grant_admin("owner@example.com").await;
    let token = app.token_for("owner@example.com", "correct horse").await;

    app.documents
        .remove(Collection::Admins, uid.as_str())
        .await
        .unwrap();

    let err = app
        .state
        .catalog()
        .delete(Some(&token), "p1")
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Store(StoreError::PermissionDenied)));
}

#[tokio::test]
async fn test_anonymous_reads_catalog_but_not_orders() {
    let app = TestApp::spawn().await;
    app.seed_product("p1", "Jug", "12.00", 3).await;

    app.documents
        .insert(
            Collection::Orders,
            "o1",
            json!({
                "userId": "u1",
                "items": [],
                "status": "pending",
                "total": "0",
                "createdAt": "2026-01-01T00:00:00Z",
            }),
        )
        .await
        .unwrap();

    let products = app.state.catalog().list(None, None).await.unwrap();
    assert_eq!(products.len(), 1);

    let err = app.state.orders().get(None, "o1").await.unwrap_err();
    assert!(matches!(err, OrderError::Store(StoreError::PermissionDenied)));
}
