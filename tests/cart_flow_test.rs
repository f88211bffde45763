mod common;

use axum::http::StatusCode;
use common::{money, CouponSeed, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait};
use serde_json::json;
use storefront_api::entities::{product_variant, ProductVariant};
use uuid::Uuid;

#[tokio::test]
async fn cart_requires_authentication() {
    let app = TestApp::spawn().await;
    let (status, _) = app.request("GET", "/api/v1/cart", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn first_fetch_creates_an_empty_cart() {
    let app = TestApp::spawn().await;
    let token = app.customer_token(Uuid::new_v4());

    let (status, body) = app.request("GET", "/api/v1/cart", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&body["data"]["cart"]["total"]), dec!(0));
    assert!(body["data"]["items"].as_array().unwrap().is_empty());

    // Same cart on the next fetch
    let cart_id = body["data"]["cart"]["id"].clone();
    let (_, again) = app.request("GET", "/api/v1/cart", Some(&token), None).await;
    assert_eq!(again["data"]["cart"]["id"], cart_id);
}

#[tokio::test]
async fn adding_items_recomputes_all_totals() {
    let app = TestApp::spawn().await;
    let token = app.customer_token(Uuid::new_v4());
    let (product_id, variant_id) = app.seed_product("Desk Lamp", dec!(199), 10).await;

    let (status, body) = app.add_to_cart(&token, product_id, variant_id, 2).await;
    assert_eq!(status, StatusCode::OK);

    let cart = &body["data"]["cart"];
    assert_eq!(money(&cart["subtotal"]), dec!(398.00));
    assert_eq!(money(&cart["shipping_total"]), dec!(49.00)); // below 500
    assert_eq!(money(&cart["tax_total"]), dec!(71.64)); // 398 * 0.18
    assert_eq!(money(&cart["total"]), dec!(518.64));

    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 2);
    assert_eq!(items[0]["product_name"], "Desk Lamp");
}

#[tokio::test]
async fn free_shipping_kicks_in_at_the_threshold() {
    let app = TestApp::spawn().await;
    let token = app.customer_token(Uuid::new_v4());
    let (product_id, variant_id) = app.seed_product("Bookshelf", dec!(250), 10).await;

    let (_, body) = app.add_to_cart(&token, product_id, variant_id, 2).await;
    let cart = &body["data"]["cart"];
    assert_eq!(money(&cart["subtotal"]), dec!(500.00));
    assert_eq!(money(&cart["shipping_total"]), dec!(0));
    assert_eq!(money(&cart["total"]), dec!(590.00)); // 500 + 90 tax
}

#[tokio::test]
async fn adding_same_variant_merges_the_line() {
    let app = TestApp::spawn().await;
    let token = app.customer_token(Uuid::new_v4());
    let (product_id, variant_id) = app.seed_product("Mug", dec!(99), 10).await;

    app.add_to_cart(&token, product_id, variant_id, 2).await;
    let (_, body) = app.add_to_cart(&token, product_id, variant_id, 3).await;

    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 5);
}

#[tokio::test]
async fn line_keeps_the_price_captured_at_add_time() {
    let app = TestApp::spawn().await;
    let token = app.customer_token(Uuid::new_v4());
    let (product_id, variant_id) = app.seed_product("Mug", dec!(99), 10).await;

    app.add_to_cart(&token, product_id, variant_id, 1).await;

    // Reprice the variant after the line was added
    let variant = ProductVariant::find_by_id(variant_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let mut active: product_variant::ActiveModel = variant.into();
    active.price = Set(dec!(250));
    active.update(&*app.state.db).await.unwrap();

    // Merging and quantity edits keep the add-time snapshot
    let (_, body) = app.add_to_cart(&token, product_id, variant_id, 1).await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(money(&items[0]["unit_price"]), dec!(99.00));
    assert_eq!(money(&body["data"]["cart"]["subtotal"]), dec!(198.00));

    let item_id = items[0]["id"].as_str().unwrap().to_string();
    let (_, body) = app
        .request(
            "PUT",
            &format!("/api/v1/cart/items/{item_id}"),
            Some(&token),
            Some(json!({ "quantity": 3 })),
        )
        .await;
    assert_eq!(money(&body["data"]["cart"]["subtotal"]), dec!(297.00));
}

#[tokio::test]
async fn adding_beyond_stock_is_rejected_with_available_quantity() {
    let app = TestApp::spawn().await;
    let token = app.customer_token(Uuid::new_v4());
    let (product_id, variant_id) = app.seed_product("Rare Print", dec!(999), 3).await;

    let (status, body) = app.add_to_cart(&token, product_id, variant_id, 4).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "insufficient_stock");
    assert_eq!(body["message"], "Only 3 items available");
}

#[tokio::test]
async fn merged_quantity_counts_against_stock() {
    let app = TestApp::spawn().await;
    let token = app.customer_token(Uuid::new_v4());
    let (product_id, variant_id) = app.seed_product("Notebook", dec!(49), 5).await;

    app.add_to_cart(&token, product_id, variant_id, 3).await;
    let (status, body) = app.add_to_cart(&token, product_id, variant_id, 3).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "insufficient_stock");
}

#[tokio::test]
async fn quantity_zero_removes_the_line() {
    let app = TestApp::spawn().await;
    let token = app.customer_token(Uuid::new_v4());
    let (product_id, variant_id) = app.seed_product("Poster", dec!(149), 10).await;

    let (_, body) = app.add_to_cart(&token, product_id, variant_id, 2).await;
    let item_id = body["data"]["items"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .request(
            "PUT",
            &format!("/api/v1/cart/items/{item_id}"),
            Some(&token),
            Some(json!({ "quantity": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["items"].as_array().unwrap().is_empty());
    assert_eq!(money(&body["data"]["cart"]["total"]), dec!(0));
}

#[tokio::test]
async fn removing_an_item_recomputes_totals() {
    let app = TestApp::spawn().await;
    let token = app.customer_token(Uuid::new_v4());
    let (p1, v1) = app.seed_product("Chair", dec!(300), 10).await;
    let (p2, v2) = app.seed_product("Table", dec!(700), 10).await;

    app.add_to_cart(&token, p1, v1, 1).await;
    let (_, body) = app.add_to_cart(&token, p2, v2, 1).await;
    assert_eq!(money(&body["data"]["cart"]["subtotal"]), dec!(1000.00));

    let item_id = body["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|i| i["product_name"] == "Table")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, body) = app
        .request(
            "DELETE",
            &format!("/api/v1/cart/items/{item_id}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let cart = &body["data"]["cart"];
    assert_eq!(money(&cart["subtotal"]), dec!(300.00));
    assert_eq!(money(&cart["shipping_total"]), dec!(49.00));
}

#[tokio::test]
async fn coupon_discount_flows_into_totals() {
    let app = TestApp::spawn().await;
    let token = app.customer_token(Uuid::new_v4());
    let (product_id, variant_id) = app.seed_product("Speaker", dec!(299), 10).await;
    app.seed_coupon("SAVE10", CouponSeed::default()).await;

    app.add_to_cart(&token, product_id, variant_id, 2).await;
    let (status, body) = app
        .request(
            "POST",
            "/api/v1/cart/coupon",
            Some(&token),
            Some(json!({ "code": "SAVE10" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let cart = &body["data"]["cart"];
    assert_eq!(money(&cart["subtotal"]), dec!(598.00));
    assert_eq!(money(&cart["discount_total"]), dec!(59.80));
    assert_eq!(money(&cart["shipping_total"]), dec!(0)); // 538.20 >= 500
    assert_eq!(money(&cart["tax_total"]), dec!(96.88));
    assert_eq!(money(&cart["total"]), dec!(635.08));

    // Removing the coupon restores the undiscounted totals
    let (status, body) = app
        .request("DELETE", "/api/v1/cart/coupon", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let cart = &body["data"]["cart"];
    assert_eq!(money(&cart["discount_total"]), dec!(0));
    assert_eq!(money(&cart["total"]), dec!(705.64));
}

#[tokio::test]
async fn coupon_on_empty_cart_is_rejected() {
    let app = TestApp::spawn().await;
    let token = app.customer_token(Uuid::new_v4());
    app.seed_coupon("SAVE10", CouponSeed::default()).await;

    app.request("GET", "/api/v1/cart", Some(&token), None).await;
    let (status, _) = app
        .request(
            "POST",
            "/api/v1/cart/coupon",
            Some(&token),
            Some(json!({ "code": "SAVE10" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn applied_coupon_terms_survive_later_edits() {
    let app = TestApp::spawn().await;
    let token = app.customer_token(Uuid::new_v4());
    let (product_id, variant_id) = app.seed_product("Kettle", dec!(1000), 10).await;
    let coupon_id = app.seed_coupon("SAVE10", CouponSeed::default()).await;

    app.add_to_cart(&token, product_id, variant_id, 1).await;
    app.request(
        "POST",
        "/api/v1/cart/coupon",
        Some(&token),
        Some(json!({ "code": "SAVE10" })),
    )
    .await;

    // Deactivate the coupon definition after it was applied
    app.state
        .services
        .coupons
        .deactivate_coupon(coupon_id)
        .await
        .unwrap();

    // Cart keeps the snapshot terms it captured at apply time
    let (_, body) = app.request("GET", "/api/v1/cart", Some(&token), None).await;
    assert_eq!(money(&body["data"]["cart"]["discount_total"]), dec!(100.00));
}

#[tokio::test]
async fn carts_are_isolated_per_customer() {
    let app = TestApp::spawn().await;
    let alice = app.customer_token(Uuid::new_v4());
    let bob = app.customer_token(Uuid::new_v4());
    let (product_id, variant_id) = app.seed_product("Vase", dec!(120), 10).await;

    app.add_to_cart(&alice, product_id, variant_id, 2).await;

    let (_, body) = app.request("GET", "/api/v1/cart", Some(&bob), None).await;
    assert!(body["data"]["items"].as_array().unwrap().is_empty());
}
