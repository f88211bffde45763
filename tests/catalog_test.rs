mod common;

use axum::http::StatusCode;
use common::{money, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn listing_is_public_and_paginated() {
    let app = TestApp::spawn().await;
    for i in 0..3 {
        app.seed_product(&format!("Shirt {i}"), dec!(499), 10).await;
    }

    let (status, body) = app
        .request("GET", "/api/v1/products?per_page=2", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["total"], 3);
}

#[tokio::test]
async fn inactive_products_disappear_from_the_listing() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token(Uuid::new_v4());
    let (product_id, _) = app.seed_product("Discontinued", dec!(100), 10).await;

    let (status, _) = app
        .request(
            "PUT",
            &format!("/api/v1/products/{product_id}"),
            Some(&admin),
            Some(json!({ "is_active": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.request("GET", "/api/v1/products", None, None).await;
    assert!(body["data"]["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn detail_carries_variants_in_position_order() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token(Uuid::new_v4());

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/products",
            Some(&admin),
            Some(json!({
                "name": "Hoodie",
                "slug": "hoodie",
                "base_price": "1299",
                "variants": [
                    { "sku": "HD-S", "label": "Small", "price": "1299", "stock": 4 },
                    { "sku": "HD-M", "label": "Medium", "price": "1299", "stock": 6 },
                    { "sku": "HD-L", "label": "Large", "price": "1399", "stock": 0 },
                ],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let product_id = body["data"]["product"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["product"]["total_stock"], 10);

    let (status, body) = app
        .request("GET", &format!("/api/v1/products/{product_id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let variants = body["data"]["variants"].as_array().unwrap();
    assert_eq!(variants.len(), 3);
    assert_eq!(variants[0]["label"], "Small");
    assert_eq!(variants[2]["label"], "Large");
    assert_eq!(money(&variants[2]["price"]), dec!(1399));
}

#[tokio::test]
async fn product_creation_requires_admin() {
    let app = TestApp::spawn().await;
    let customer = app.customer_token(Uuid::new_v4());

    let payload = json!({
        "name": "Sneakers",
        "slug": "sneakers",
        "base_price": "2999",
        "variants": [{ "sku": "SN-9", "label": "Size 9", "price": "2999", "stock": 5 }],
    });

    let (status, _) = app
        .request("POST", "/api/v1/products", Some(&customer), Some(payload.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request("POST", "/api/v1/products", None, Some(payload))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn products_need_at_least_one_variant() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token(Uuid::new_v4());

    let (status, _) = app
        .request(
            "POST",
            "/api/v1/products",
            Some(&admin),
            Some(json!({
                "name": "Ghost",
                "slug": "ghost",
                "base_price": "10",
                "variants": [],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_product_is_not_found() {
    let app = TestApp::spawn().await;
    let (status, body) = app
        .request(
            "GET",
            &format!("/api/v1/products/{}", Uuid::new_v4()),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}
