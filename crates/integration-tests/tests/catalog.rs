//! Admin catalog pages and the route guards in front of them.

#![allow(clippy::unwrap_used)]

use reqwest::{StatusCode, multipart};
use serde_json::Value;

use right_water_integration_tests::{TestApp, location};

/// An administrator's browser, signed in after the grant so the role is
/// resolved.
async fn admin_browser(app: &TestApp) -> reqwest::Client {
    let browser = app.browser();
    app.register(&browser, "owner@example.com", "correct horse", "Owner")
        .await;
    app.grant_admin("owner@example.com").await;
    app.sign_out(&browser).await;
    assert_eq!(
        app.sign_in(&browser, "owner@example.com", "correct horse").await,
        "/"
    );
    let session = app.settled_session(&browser).await;
    assert_eq!(session["isAdmin"], Value::Bool(true));
    browser
}

fn product_form(name: &str, price: &str, image: bool) -> multipart::Form {
    let form = multipart::Form::new()
        .text("name", name.to_owned())
        .text("category", "Filters")
        .text("description", "Carbon block")
        .text("price", price.to_owned())
        .text("originalPrice", "")
        .text("stock", "12");
    if image {
        let part = multipart::Part::bytes(vec![0x89, b'P', b'N', b'G'])
            .file_name("filter.png")
            .mime_str("image/png")
            .unwrap();
        form.part("image", part)
    } else {
        form
    }
}

#[tokio::test]
async fn test_admin_adds_product_with_image() {
    let app = TestApp::spawn().await;
    let browser = admin_browser(&app).await;

    let dashboard = browser.get(app.url("/admin")).send().await.unwrap();
    assert_eq!(dashboard.status(), StatusCode::OK);

    let created = browser
        .post(app.url("/admin/products"))
        .multipart(product_form("Under-sink filter", "49.90", true))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::SEE_OTHER);
    assert!(location(&created).starts_with("/admin/products?success="));

    let products: Vec<Value> = browser
        .get(app.url("/api/products"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(products.len(), 1);
    let product = products.first().unwrap();
    assert_eq!(product["name"], "Under-sink filter");
    assert_eq!(product["price"], "49.90");
    assert!(product["image"].as_str().unwrap().contains("products/"));
    assert_eq!(app.blobs.len().await, 1);

    let listing = browser
        .get(app.url("/admin/products?q=under"))
        .send()
        .await
        .unwrap();
    assert_eq!(listing.status(), StatusCode::OK);
    assert!(listing.text().await.unwrap().contains("Under-sink filter"));
}

#[tokio::test]
async fn test_invalid_product_goes_back_with_message() {
    let app = TestApp::spawn().await;
    let browser = admin_browser(&app).await;

    let without_image = browser
        .post(app.url("/admin/products"))
        .multipart(product_form("Jug", "12.00", false))
        .send()
        .await
        .unwrap();
    assert!(location(&without_image).starts_with("/admin/products?error="));

    let free = browser
        .post(app.url("/admin/products"))
        .multipart(product_form("Jug", "0", true))
        .send()
        .await
        .unwrap();
    assert!(location(&free).starts_with("/admin/products?error="));

    assert_eq!(app.blobs.len().await, 0);
    assert!(app.state.catalog().list(None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_deletes_product() {
    let app = TestApp::spawn().await;
    app.seed_product("p1", "Jug", "12.00", 3).await;
    let browser = admin_browser(&app).await;

    let deleted = browser
        .delete(app.url("/admin/products/p1"))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let missing = browser.get(app.url("/api/products/p1")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_live_product_stream_sends_snapshot() {
    let app = TestApp::spawn().await;
    app.seed_product("p1", "Jug", "12.00", 3).await;
    let browser = admin_browser(&app).await;

    let mut stream = browser
        .get(app.url("/admin/products/stream"))
        .send()
        .await
        .unwrap();
    assert_eq!(stream.status(), StatusCode::OK);

    let mut received = String::new();
    while !received.contains("\n\n") {
        let chunk = stream.chunk().await.unwrap().unwrap();
        received.push_str(&String::from_utf8_lossy(&chunk));
    }
    assert!(received.contains("event: products"));
    assert!(received.contains("\"Jug\""));
}

#[tokio::test]
async fn test_customers_are_sent_home() {
    let app = TestApp::spawn().await;
    app.seed_product("p1", "Jug", "12.00", 3).await;
    let browser = app.browser();
    app.register(&browser, "ada@example.com", "correct horse", "Ada")
        .await;
    app.settled_session(&browser).await;

    let dashboard = browser.get(app.url("/admin")).send().await.unwrap();
    assert_eq!(dashboard.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&dashboard), "/");

    let delete = browser
        .delete(app.url("/admin/products/p1"))
        .send()
        .await
        .unwrap();
    assert_eq!(delete.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&delete), "/");
    assert!(app.state.catalog().get(None, "p1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_anonymous_visitors_are_sent_to_sign_in() {
    let app = TestApp::spawn().await;
    let dashboard = app.browser().get(app.url("/admin")).send().await.unwrap();

    assert_eq!(dashboard.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&dashboard), "/auth/login");
}

#[tokio::test]
async fn test_statistics_refresh() {
    let app = TestApp::spawn().await;
    app.seed_product("p1", "Jug", "12.00", 3).await;
    let browser = admin_browser(&app).await;

    let before = browser
        .get(app.url("/admin/statistics"))
        .send()
        .await
        .unwrap();
    assert_eq!(before.status(), StatusCode::NOT_FOUND);

    let refreshed = browser
        .post(app.url("/admin/statistics/refresh"))
        .send()
        .await
        .unwrap();
    assert_eq!(location(&refreshed), "/admin");

    let summary: Value = browser
        .get(app.url("/admin/statistics"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["productCount"], 1);
    assert_eq!(summary["orderCount"], 0);
}
