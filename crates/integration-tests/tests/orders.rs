//! Order placement and visibility through the JSON API.

#![allow(clippy::unwrap_used)]

use reqwest::StatusCode;
use serde_json::{Value, json};

use right_water_core::authz::Collection;
use right_water_integration_tests::{TestApp, location};
use right_water_storefront::store::{DocumentBackend, Query};

async fn customer(app: &TestApp, email: &str) -> reqwest::Client {
    let browser = app.browser();
    app.register(&browser, email, "correct horse", "Customer")
        .await;
    app.settled_session(&browser).await;
    browser
}

#[tokio::test]
async fn test_customer_places_order_priced_from_catalog() {
    let app = TestApp::spawn().await;
    app.seed_product("p1", "Jug", "7.50", 10).await;
    let browser = customer(&app, "ada@example.com").await;
    let uid = app.uid_of("ada@example.com").await;

    let response = browser
        .post(app.url("/api/orders"))
        .json(&json!({ "items": [{ "productId": "p1", "quantity": 2 }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let order: Value = response.json().await.unwrap();
    assert_eq!(order["total"], "15.00");
    assert_eq!(order["userId"], uid.as_str());
    assert_eq!(order["status"], "pending");
    assert_eq!(order["items"][0]["name"], "Jug");

    let mine: Vec<Value> = browser
        .get(app.url("/api/orders"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);

    // Placing an order leaves stock alone.
    let product: Value = browser
        .get(app.url("/api/products/p1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(product["stock"], 10);
}

#[tokio::test]
async fn test_order_for_someone_else_is_refused() {
    let app = TestApp::spawn().await;
    app.seed_product("p1", "Jug", "7.50", 10).await;
    let browser = customer(&app, "ada@example.com").await;

    let response = browser
        .post(app.url("/api/orders"))
        .json(&json!({
            "items": [{ "productId": "p1", "quantity": 1 }],
            "userId": "someone-else",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let stored = app
        .documents
        .list(&Query::collection(Collection::Orders))
        .await
        .unwrap();
    assert!(stored.is_empty());
}

#[tokio::test]
async fn test_bad_order_lines_are_rejected() {
    let app = TestApp::spawn().await;
    app.seed_product("p1", "Jug", "7.50", 10).await;
    let browser = customer(&app, "ada@example.com").await;

    for body in [
        json!({ "items": [] }),
        json!({ "items": [{ "productId": "p1", "quantity": 0 }] }),
        json!({ "items": [{ "productId": "missing", "quantity": 1 }] }),
        json!({ "items": [{ "productId": "p1", "quantity": u32::MAX }] }),
    ] {
        let response = browser
            .post(app.url("/api/orders"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
    }
}

#[tokio::test]
async fn test_customers_cannot_see_each_others_orders() {
    let app = TestApp::spawn().await;
    app.seed_product("p1", "Jug", "7.50", 10).await;
    let ada = customer(&app, "ada@example.com").await;
    let bob = customer(&app, "bob@example.com").await;

    let order: Value = ada
        .post(app.url("/api/orders"))
        .json(&json!({ "items": [{ "productId": "p1", "quantity": 1 }] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = order["id"].as_str().unwrap();

    let peek = bob
        .get(app.url(&format!("/api/orders/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(peek.status(), StatusCode::FORBIDDEN);

    let bobs: Vec<Value> = bob
        .get(app.url("/api/orders"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(bobs.is_empty());

    let own = ada
        .get(app.url(&format!("/api/orders/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(own.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_sees_all_orders_and_moves_status() {
    let app = TestApp::spawn().await;
    app.seed_product("p1", "Jug", "7.50", 10).await;
    let ada = customer(&app, "ada@example.com").await;
    let order: Value = ada
        .post(app.url("/api/orders"))
        .json(&json!({ "items": [{ "productId": "p1", "quantity": 1 }] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = order["id"].as_str().unwrap();

    let owner = app.browser();
    app.register(&owner, "owner@example.com", "correct horse", "Owner")
        .await;
    app.grant_admin("owner@example.com").await;
    app.sign_out(&owner).await;
    app.sign_in(&owner, "owner@example.com", "correct horse").await;
    app.settled_session(&owner).await;

    let all: Vec<Value> = owner
        .get(app.url("/api/orders"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 1);

    let shipped: Value = owner
        .patch(app.url(&format!("/admin/orders/{id}/status")))
        .json(&json!({ "status": "shipped" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(shipped["status"], "shipped");

    let refused = ada
        .patch(app.url(&format!("/admin/orders/{id}/status")))
        .json(&json!({ "status": "cancelled" }))
        .send()
        .await
        .unwrap();
    assert_eq!(location(&refused), "/");
}

#[tokio::test]
async fn test_anonymous_api_calls_are_unauthorized() {
    let app = TestApp::spawn().await;
    let browser = app.browser();

    let placed = browser
        .post(app.url("/api/orders"))
        .json(&json!({ "items": [{ "productId": "p1", "quantity": 1 }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(placed.status(), StatusCode::UNAUTHORIZED);

    let listed = browser.get(app.url("/api/orders")).send().await.unwrap();
    assert_eq!(listed.status(), StatusCode::UNAUTHORIZED);

    // The catalog stays public.
    let products = browser.get(app.url("/api/products")).send().await.unwrap();
    assert_eq!(products.status(), StatusCode::OK);
}
