use crate::{
    config::AppConfig,
    entities::{
        order, order_item, order_status_history, Order, OrderModel, OrderStatus, PaymentStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        carts::{self, CartService, CartWithItems},
        catalog::CatalogService,
        coupons::CouponService,
        notifications::Notifier,
        payments::{self, PaymentGateway},
        pricing,
    },
};
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Checkout workflow: payment-order creation against the gateway, and
/// the verified, atomic conversion of a cart into an order.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    carts: CartService,
    catalog: CatalogService,
    coupons: CouponService,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    event_sender: EventSender,
    gateway_key_id: String,
    gateway_key_secret: String,
    webhook_secret: Option<String>,
    currency: String,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        carts: CartService,
        catalog: CatalogService,
        coupons: CouponService,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        config: &AppConfig,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            carts,
            catalog,
            coupons,
            gateway,
            notifier,
            event_sender,
            gateway_key_id: config.gateway.key_id.clone(),
            gateway_key_secret: config.gateway.key_secret.clone(),
            webhook_secret: config.gateway.webhook_secret.clone(),
            currency: config.currency.clone(),
        }
    }

    /// Revalidates the cart and registers a payment order with the
    /// gateway. Writes nothing locally: until payment is verified the
    /// cart stays open and stock stays unreserved.
    #[instrument(skip(self, shipping_address))]
    pub async fn create_payment_order(
        &self,
        customer_id: Uuid,
        shipping_address: Option<serde_json::Value>,
    ) -> Result<CheckoutSession, ServiceError> {
        let CartWithItems { cart, items } =
            self.carts.load_for_checkout(&*self.db, customer_id).await?;
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Cannot check out an empty cart".to_string(),
            ));
        }

        for item in &items {
            let (product, variant) = self
                .catalog
                .find_variant(&*self.db, item.product_id, item.variant_id)
                .await?;
            if !product.is_active || !variant.is_available {
                return Err(ServiceError::ItemUnavailable(format!(
                    "{} ({})",
                    item.product_name, item.variant_label
                )));
            }
            if variant.stock < item.quantity {
                return Err(ServiceError::InsufficientStock {
                    available: variant.stock,
                });
            }
        }

        if let Some(snapshot) = carts::coupon_snapshot(&cart) {
            let coupon = self.coupons.find_by_code(&*self.db, &snapshot.code).await?;
            self.coupons
                .check_eligibility(&*self.db, &coupon, customer_id, cart.subtotal, Utc::now())
                .await?;
        }

        let amount_minor = payments::to_minor_units(cart.total)?;
        // Opaque metadata the gateway echoes back on its dashboard and
        // webhooks; enough to reconcile a stray payment by hand.
        let notes = serde_json::json!({
            "cart_id": cart.id,
            "customer_id": customer_id,
            "shipping_address": shipping_address,
        });
        let gateway_order = self
            .gateway
            .create_order(amount_minor, &self.currency, &cart.id.to_string(), &notes)
            .await?;

        self.event_sender
            .send_or_log(Event::CheckoutStarted {
                cart_id: cart.id,
                gateway_order_id: gateway_order.id.clone(),
                amount: cart.total,
            })
            .await;

        Ok(CheckoutSession {
            gateway_order_id: gateway_order.id,
            amount: cart.total,
            amount_minor,
            currency: self.currency.clone(),
            key_id: self.gateway_key_id.clone(),
        })
    }

    /// Verifies a completed payment and converts the cart into an order
    /// in one transaction: order snapshot, conditional stock decrements,
    /// coupon redemption, cart deletion. Any failure rolls all of it
    /// back and the payment stays eligible for retry or refund.
    ///
    /// Replays of an already-converted payment return the existing
    /// order; `gateway_payment_id` is unique so a racing duplicate
    /// insert cannot slip through either.
    #[instrument(skip(self, input))]
    pub async fn verify_and_convert(
        &self,
        customer_id: Uuid,
        input: VerifyPaymentInput,
    ) -> Result<OrderModel, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        payments::verify_payment_signature(
            &self.gateway_key_secret,
            &input.gateway_order_id,
            &input.gateway_payment_id,
            &input.gateway_signature,
        )?;

        if let Some(existing) = Order::find()
            .filter(order::Column::GatewayPaymentId.eq(input.gateway_payment_id.clone()))
            .one(&*self.db)
            .await?
        {
            info!(order_id = %existing.id, "Payment already converted, returning existing order");
            return Ok(existing);
        }

        let payment = self.gateway.fetch_payment(&input.gateway_payment_id).await?;
        if !payment.is_captured() {
            return Err(ServiceError::PaymentNotCaptured(payment.status));
        }
        if payment.order_id != input.gateway_order_id {
            return Err(ServiceError::SignatureInvalid);
        }

        let txn = self.db.begin().await?;
        let order = self
            .convert_cart(&txn, customer_id, &input, &payment.method)
            .await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PaymentCaptured {
                order_id: order.id,
                gateway_payment_id: input.gateway_payment_id,
            })
            .await;
        self.event_sender
            .send_or_log(Event::OrderCreated(order.id))
            .await;
        self.notifier.order_confirmed(&order).await;

        info!(order_id = %order.id, order_number = %order.order_number, "Cart converted to order");
        Ok(order)
    }

    async fn convert_cart(
        &self,
        txn: &DatabaseTransaction,
        customer_id: Uuid,
        input: &VerifyPaymentInput,
        payment_method: &Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let CartWithItems { cart, items } =
            self.carts.load_for_checkout(txn, customer_id).await?;
        if items.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "Cart is empty; nothing to convert".to_string(),
            ));
        }

        let snapshot = carts::coupon_snapshot(&cart);
        let totals = pricing::compute_totals(
            &items
                .iter()
                .map(|i| (i.unit_price, i.quantity))
                .collect::<Vec<_>>(),
            snapshot.as_ref(),
            self.carts.policy(),
        );

        let now = Utc::now();
        let order_id = Uuid::new_v4();

        if let Some(snapshot) = &snapshot {
            let coupon = self.coupons.find_by_code(txn, &snapshot.code).await?;
            self.coupons
                .check_eligibility(txn, &coupon, customer_id, totals.subtotal, now)
                .await?;
            self.coupons
                .redeem(txn, coupon.id, customer_id, order_id)
                .await?;
        }

        let mut depleted = Vec::new();
        for item in &items {
            let remaining = self
                .catalog
                .decrement_variant_stock(txn, item.product_id, item.variant_id, item.quantity)
                .await?;
            if remaining == 0 {
                depleted.push((item.product_id, item.variant_id));
            }
        }

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(generate_order_number()),
            customer_id: Set(customer_id),
            // Payment is already captured by the time an order row
            // exists, so orders enter the world confirmed.
            status: Set(OrderStatus::Confirmed),
            subtotal: Set(totals.subtotal),
            discount_total: Set(totals.discount),
            shipping_total: Set(totals.shipping),
            tax_total: Set(totals.tax),
            total: Set(totals.total),
            currency: Set(cart.currency.clone()),
            coupon_code: Set(cart.coupon_code.clone()),
            coupon_discount_type: Set(cart.coupon_discount_type),
            coupon_discount_value: Set(cart.coupon_discount_value),
            shipping_address: Set(input.shipping_address.clone()),
            payment_method: Set(payment_method.clone().unwrap_or_else(|| "razorpay".to_string())),
            payment_status: Set(PaymentStatus::Completed),
            gateway_order_id: Set(Some(input.gateway_order_id.clone())),
            gateway_payment_id: Set(Some(input.gateway_payment_id.clone())),
            gateway_signature: Set(Some(input.gateway_signature.clone())),
            paid_at: Set(Some(now)),
            refunded_amount: Set(Decimal::ZERO),
            tracking_number: Set(None),
            delivered_at: Set(None),
            cancelled_at: Set(None),
            return_reason: Set(None),
            return_requested_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let created = order_model.insert(txn).await?;

        for item in &items {
            let (_, variant) = self
                .catalog
                .find_variant(txn, item.product_id, item.variant_id)
                .await?;
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                variant_id: Set(item.variant_id),
                product_name: Set(item.product_name.clone()),
                variant_label: Set(item.variant_label.clone()),
                sku: Set(variant.sku),
                unit_price: Set(item.unit_price),
                quantity: Set(item.quantity),
                line_total: Set(item.line_total),
                created_at: Set(now),
            }
            .insert(txn)
            .await?;
        }

        order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(OrderStatus::Confirmed.as_str().to_string()),
            note: Set(Some("Order placed".to_string())),
            updated_by: Set(Some(customer_id)),
            created_at: Set(now),
        }
        .insert(txn)
        .await?;

        self.carts.delete_cart(txn, cart.id).await?;

        for (product_id, variant_id) in depleted {
            self.event_sender
                .send_or_log(Event::StockDepleted {
                    product_id,
                    variant_id,
                })
                .await;
        }

        Ok(created)
    }

    /// Issues a full or partial refund at the gateway and updates the
    /// order's refund bookkeeping. Every refund lands in the status
    /// history; a full refund also moves the order to `Refunded`.
    #[instrument(skip(self))]
    pub async fn refund(
        &self,
        order_id: Uuid,
        amount: Option<Decimal>,
        reason: Option<String>,
        updated_by: Option<Uuid>,
    ) -> Result<OrderModel, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !order.payment_status.is_refundable() {
            return Err(ServiceError::OrderStateInvalid(format!(
                "Order cannot be refunded from payment status {:?}",
                order.payment_status
            )));
        }

        let refundable = order.total - order.refunded_amount;
        let amount = amount.unwrap_or(refundable);
        if amount <= Decimal::ZERO || amount > refundable {
            return Err(ServiceError::ValidationError(format!(
                "Refund amount must be between 0 and {}",
                refundable.normalize()
            )));
        }

        let payment_id = order
            .gateway_payment_id
            .clone()
            .ok_or_else(|| {
                ServiceError::InvalidOperation("Order has no captured payment".to_string())
            })?;

        self.gateway
            .create_refund(
                &payment_id,
                payments::to_minor_units(amount)?,
                reason.as_deref(),
            )
            .await?;

        let refunded_total = order.refunded_amount + amount;
        let fully_refunded = refunded_total >= order.total;
        let now = Utc::now();

        let txn = self.db.begin().await?;
        let current_status = order.status;
        let mut active: order::ActiveModel = order.into();
        active.refunded_amount = Set(refunded_total);
        active.payment_status = Set(if fully_refunded {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        });
        if fully_refunded {
            active.status = Set(OrderStatus::Refunded);
        }
        active.updated_at = Set(now);
        let updated = active.update(&txn).await?;

        let note = match &reason {
            Some(reason) => format!("Refunded {}: {}", amount.normalize(), reason),
            None => format!("Refunded {}", amount.normalize()),
        };
        let history_status = if fully_refunded {
            OrderStatus::Refunded
        } else {
            current_status
        };
        order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(history_status.as_str().to_string()),
            note: Set(Some(note)),
            updated_by: Set(updated_by),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PaymentRefunded {
                order_id,
                amount,
            })
            .await;
        self.notifier.refund_issued(&updated, amount).await;

        Ok(updated)
    }

    /// Verifies and acknowledges a gateway webhook delivery. The
    /// authoritative conversion path is the client verify call; webhooks
    /// are recorded for observability only.
    #[instrument(skip(self, body, signature))]
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: &str,
    ) -> Result<(), ServiceError> {
        let secret = self.webhook_secret.as_deref().ok_or_else(|| {
            ServiceError::InvalidOperation("Webhook secret not configured".to_string())
        })?;

        payments::verify_webhook_signature(secret, body, signature)?;

        let event_type = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("event").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or_else(|| "unknown".to_string());

        info!(event_type = %event_type, "Gateway webhook received");
        self.event_sender
            .send_or_log(Event::WebhookReceived { event_type })
            .await;
        Ok(())
    }
}

fn generate_order_number() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("ORD-{}-{:06}", Utc::now().format("%Y%m%d%H%M%S"), suffix)
}

/// What the storefront client needs to open the gateway's payment UI.
#[derive(Debug, Serialize)]
pub struct CheckoutSession {
    pub gateway_order_id: String,
    pub amount: Decimal,
    pub amount_minor: i64,
    pub currency: String,
    pub key_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentInput {
    #[validate(length(min = 1))]
    pub gateway_order_id: String,
    #[validate(length(min = 1))]
    pub gateway_payment_id: String,
    #[validate(length(min = 1))]
    pub gateway_signature: String,
    pub shipping_address: Option<serde_json::Value>,
}
