#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ConnectOptions, Database};
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};
use storefront_api::{
    auth::Role,
    build_router,
    config::AppConfig,
    db,
    entities::DiscountType,
    errors::ServiceError,
    events,
    services::{
        catalog::{CreateProductInput, CreateVariantInput, ProductWithVariants},
        coupons::CreateCouponInput,
        notifications::LogNotifier,
        payments::{self, GatewayOrder, GatewayPayment, GatewayRefund, PaymentGateway},
    },
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

/// In-process gateway stand-in. Orders are handed out with sequential
/// ids; tests register payments in whatever state they need.
pub struct FakeGateway {
    counter: AtomicU64,
    payments: Mutex<HashMap<String, GatewayPayment>>,
    /// Notes attached to each created order, newest last.
    pub order_notes: Mutex<Vec<Value>>,
    pub refunds: Mutex<Vec<(String, i64, Option<String>)>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            payments: Mutex::new(HashMap::new()),
            order_notes: Mutex::new(Vec::new()),
            refunds: Mutex::new(Vec::new()),
        }
    }

    /// Registers a captured payment for an order, returning its id.
    pub fn capture_payment(&self, order_id: &str, amount_minor: i64) -> String {
        self.register_payment(order_id, amount_minor, "captured")
    }

    pub fn register_payment(&self, order_id: &str, amount_minor: i64, status: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let id = format!("pay_{:08}", n);
        self.payments.lock().unwrap().insert(
            id.clone(),
            GatewayPayment {
                id: id.clone(),
                order_id: order_id.to_string(),
                amount: amount_minor,
                currency: "INR".to_string(),
                status: status.to_string(),
                method: Some("card".to_string()),
            },
        );
        id
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        _receipt: &str,
        notes: &Value,
    ) -> Result<GatewayOrder, ServiceError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.order_notes.lock().unwrap().push(notes.clone());
        Ok(GatewayOrder {
            id: format!("order_{:08}", n),
            amount: amount_minor,
            currency: currency.to_string(),
            status: "created".to_string(),
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, ServiceError> {
        self.payments
            .lock()
            .unwrap()
            .get(payment_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))
    }

    async fn create_refund(
        &self,
        payment_id: &str,
        amount_minor: i64,
        reason: Option<&str>,
    ) -> Result<GatewayRefund, ServiceError> {
        self.refunds
            .lock()
            .unwrap()
            .push((payment_id.to_string(), amount_minor, reason.map(String::from)));
        Ok(GatewayRefund {
            id: format!("rfnd_{}", payment_id),
            payment_id: payment_id.to_string(),
            amount: amount_minor,
            status: "processed".to_string(),
        })
    }
}

/// Full application over in-memory SQLite with a fake gateway.
pub struct TestApp {
    pub state: Arc<AppState>,
    pub router: Router,
    pub gateway: Arc<FakeGateway>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let mut config = AppConfig::for_tests("sqlite::memory:");
        config.gateway.webhook_secret = Some("test_webhook_secret".to_string());

        // A single pooled connection keeps every query on the same
        // in-memory database.
        let mut options = ConnectOptions::new(config.database_url.clone());
        options.max_connections(1).sqlx_logging(false);
        let connection = Database::connect(options).await.expect("connect sqlite");
        db::create_schema(&connection).await.expect("create schema");

        let (event_sender, event_receiver) = events::channel(256);
        tokio::spawn(events::process_events(event_receiver));

        let gateway = Arc::new(FakeGateway::new());
        let state = Arc::new(AppState::new(
            Arc::new(connection),
            config,
            event_sender,
            gateway.clone(),
            Arc::new(LogNotifier),
        ));
        let router = build_router(state.clone());

        Self {
            state,
            router,
            gateway,
        }
    }

    pub fn customer_token(&self, customer_id: Uuid) -> String {
        self.state
            .auth
            .issue_token(customer_id, Role::Customer)
            .expect("issue token")
    }

    pub fn admin_token(&self, admin_id: Uuid) -> String {
        self.state
            .auth
            .issue_token(admin_id, Role::Admin)
            .expect("issue token")
    }

    /// Signs a payment the way the gateway would, using the configured
    /// key secret.
    pub fn sign_payment(&self, gateway_order_id: &str, gateway_payment_id: &str) -> String {
        payments::sign_payment(
            &self.state.config.gateway.key_secret,
            gateway_order_id,
            gateway_payment_id,
        )
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Seeds a single-variant product, returning (product_id, variant_id).
    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> (Uuid, Uuid) {
        let ProductWithVariants { product, variants } = self
            .state
            .services
            .catalog
            .create_product(CreateProductInput {
                name: name.to_string(),
                slug: name.to_lowercase().replace(' ', "-"),
                description: None,
                base_price: price,
                variants: vec![CreateVariantInput {
                    sku: format!("SKU-{}", name.to_uppercase().replace(' ', "-")),
                    label: "Default".to_string(),
                    price,
                    stock,
                    is_available: true,
                }],
            })
            .await
            .expect("seed product");
        (product.id, variants[0].id)
    }

    pub async fn seed_coupon(&self, code: &str, input: CouponSeed) -> Uuid {
        let coupon = self
            .state
            .services
            .coupons
            .create_coupon(CreateCouponInput {
                code: code.to_string(),
                discount_type: input.discount_type,
                discount_value: input.discount_value,
                minimum_purchase: input.minimum_purchase,
                max_discount: input.max_discount,
                starts_at: Utc::now() - Duration::hours(1),
                ends_at: Utc::now() + Duration::days(30),
                usage_limit: input.usage_limit,
                usage_limit_per_user: input.usage_limit_per_user,
                first_order_only: Some(input.first_order_only),
            })
            .await
            .expect("seed coupon");
        coupon.id
    }

    /// Puts an item in the customer's cart through the API.
    pub async fn add_to_cart(
        &self,
        token: &str,
        product_id: Uuid,
        variant_id: Uuid,
        quantity: i32,
    ) -> (StatusCode, Value) {
        self.request(
            "POST",
            "/api/v1/cart/items",
            Some(token),
            Some(serde_json::json!({
                "product_id": product_id,
                "variant_id": variant_id,
                "quantity": quantity,
            })),
        )
        .await
    }

    /// Walks the happy checkout path for the customer and returns the
    /// created order body.
    pub async fn checkout(&self, token: &str) -> Value {
        let (status, session) = self
            .request("POST", "/api/v1/checkout", Some(token), None)
            .await;
        assert_eq!(status, StatusCode::OK, "checkout failed: {session}");

        let gateway_order_id = session["data"]["gateway_order_id"].as_str().unwrap();
        let amount_minor = session["data"]["amount_minor"].as_i64().unwrap();
        let payment_id = self.gateway.capture_payment(gateway_order_id, amount_minor);
        let signature = self.sign_payment(gateway_order_id, &payment_id);

        let (status, order) = self
            .request(
                "POST",
                "/api/v1/checkout/verify",
                Some(token),
                Some(serde_json::json!({
                    "gateway_order_id": gateway_order_id,
                    "gateway_payment_id": payment_id,
                    "gateway_signature": signature,
                    "shipping_address": { "line1": "1 Test Lane", "city": "Pune" },
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "verify failed: {order}");
        order["data"].clone()
    }
}

/// Reads a monetary field from a JSON body as a `Decimal`, whatever
/// the serializer emitted it as.
pub fn money(v: &Value) -> Decimal {
    match v {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        _ => panic!("not a money value: {v:?}"),
    }
}

/// Coupon seed parameters with storefront-typical defaults.
pub struct CouponSeed {
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub minimum_purchase: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub usage_limit_per_user: Option<i32>,
    pub first_order_only: bool,
}

impl Default for CouponSeed {
    fn default() -> Self {
        Self {
            discount_type: DiscountType::Percentage,
            discount_value: Decimal::from(10),
            minimum_purchase: None,
            max_discount: None,
            usage_limit: None,
            usage_limit_per_user: Some(1),
            first_order_only: false,
        }
    }
}
