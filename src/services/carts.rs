use crate::{
    config::AppConfig,
    entities::{cart, cart_item, Cart, CartItem, CartItemModel, CartModel},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        catalog::CatalogService,
        coupons::CouponService,
        pricing::{self, CouponSnapshot, PricingPolicy},
    },
};
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Per-customer cart workflow: line items, coupon application, and the
/// derived totals kept in lockstep with every mutation.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    catalog: CatalogService,
    coupons: CouponService,
    policy: PricingPolicy,
    currency: String,
    ttl_days: i64,
    event_sender: EventSender,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: CatalogService,
        coupons: CouponService,
        config: &AppConfig,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            catalog,
            coupons,
            policy: PricingPolicy::from_config(config),
            currency: config.currency.clone(),
            ttl_days: config.cart_ttl_days as i64,
            event_sender,
        }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }

    /// Returns the customer's cart, creating an empty one on first use.
    /// An expired cart is emptied in place rather than deleted, so the
    /// customer keeps the same cart id.
    #[instrument(skip(self))]
    pub async fn get_or_create_cart(&self, customer_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = self.get_or_create_row(&txn, customer_id).await?;
        let items = self.load_items(&txn, cart.id).await?;
        txn.commit().await?;
        Ok(CartWithItems { cart, items })
    }

    #[instrument(skip(self, input))]
    pub async fn add_item(
        &self,
        customer_id: Uuid,
        input: AddItemInput,
    ) -> Result<CartWithItems, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let txn = self.db.begin().await?;
        let cart = self.get_or_create_row(&txn, customer_id).await?;

        let (product, variant) = self
            .catalog
            .find_variant(&txn, input.product_id, input.variant_id)
            .await?;
        if !product.is_active || !variant.is_available {
            return Err(ServiceError::ItemUnavailable(format!(
                "{} ({})",
                product.name, variant.label
            )));
        }

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::VariantId.eq(input.variant_id))
            .one(&txn)
            .await?;

        let requested = existing.as_ref().map_or(0, |i| i.quantity) + input.quantity;
        if variant.stock < requested {
            return Err(ServiceError::InsufficientStock {
                available: variant.stock,
            });
        }

        let now = Utc::now();
        match existing {
            Some(item) => {
                // Merging keeps the unit price captured when the line
                // was first added; only the quantity moves.
                let unit_price = item.unit_price;
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(requested);
                active.line_total = Set(unit_price * sea_orm::prelude::Decimal::from(requested));
                active.updated_at = Set(now);
                active.update(&txn).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(input.product_id),
                    variant_id: Set(input.variant_id),
                    quantity: Set(input.quantity),
                    unit_price: Set(variant.price),
                    line_total: Set(variant.price * sea_orm::prelude::Decimal::from(input.quantity)),
                    product_name: Set(product.name),
                    variant_label: Set(variant.label),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?;
            }
        }

        let result = self.recompute_and_save(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: result.cart.id,
                variant_id: input.variant_id,
            })
            .await;

        Ok(result)
    }

    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        customer_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartWithItems, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Quantity cannot be negative".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let cart = self.require_cart(&txn, customer_id).await?;
        let item = self.require_item(&txn, cart.id, item_id).await?;
        let variant_id = item.variant_id;

        if quantity == 0 {
            item.delete(&txn).await?;
        } else {
            let (product, variant) = self
                .catalog
                .find_variant(&txn, item.product_id, item.variant_id)
                .await?;
            if !product.is_active || !variant.is_available {
                return Err(ServiceError::ItemUnavailable(format!(
                    "{} ({})",
                    product.name, variant.label
                )));
            }
            if variant.stock < quantity {
                return Err(ServiceError::InsufficientStock {
                    available: variant.stock,
                });
            }

            let unit_price = item.unit_price;
            let mut active: cart_item::ActiveModel = item.into();
            active.quantity = Set(quantity);
            active.line_total = Set(unit_price * sea_orm::prelude::Decimal::from(quantity));
            active.updated_at = Set(Utc::now());
            active.update(&txn).await?;
        }

        let result = self.recompute_and_save(&txn, cart).await?;
        txn.commit().await?;

        let event = if quantity == 0 {
            Event::CartItemRemoved {
                cart_id: result.cart.id,
                variant_id,
            }
        } else {
            Event::CartItemUpdated {
                cart_id: result.cart.id,
                variant_id,
            }
        };
        self.event_sender.send_or_log(event).await;

        Ok(result)
    }

    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        customer_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = self.require_cart(&txn, customer_id).await?;
        let item = self.require_item(&txn, cart.id, item_id).await?;
        let variant_id = item.variant_id;
        item.delete(&txn).await?;

        let result = self.recompute_and_save(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: result.cart.id,
                variant_id,
            })
            .await;

        Ok(result)
    }

    /// Applies a coupon, snapshotting its terms onto the cart. The
    /// definition is free to change afterwards; this cart keeps the
    /// terms it saw today, though eligibility is rechecked at checkout.
    #[instrument(skip(self))]
    pub async fn apply_coupon(
        &self,
        customer_id: Uuid,
        code: &str,
    ) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = self.require_cart(&txn, customer_id).await?;
        let items = self.load_items(&txn, cart.id).await?;
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Cannot apply a coupon to an empty cart".to_string(),
            ));
        }

        let subtotal = pricing::compute_totals(&line_items(&items), None, &self.policy).subtotal;
        let coupon = self.coupons.find_by_code(&txn, code).await?;
        self.coupons
            .check_eligibility(&txn, &coupon, customer_id, subtotal, Utc::now())
            .await?;

        let mut active: cart::ActiveModel = cart.into();
        active.coupon_code = Set(Some(coupon.code.clone()));
        active.coupon_discount_type = Set(Some(coupon.discount_type));
        active.coupon_discount_value = Set(Some(coupon.discount_value));
        active.coupon_max_discount = Set(coupon.max_discount);
        let cart = active.update(&txn).await?;

        let result = self.recompute_and_save(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CouponApplied {
                cart_id: result.cart.id,
                code: coupon.code,
            })
            .await;

        Ok(result)
    }

    #[instrument(skip(self))]
    pub async fn remove_coupon(&self, customer_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = self.require_cart(&txn, customer_id).await?;

        let mut active: cart::ActiveModel = cart.into();
        active.coupon_code = Set(None);
        active.coupon_discount_type = Set(None);
        active.coupon_discount_value = Set(None);
        active.coupon_max_discount = Set(None);
        let cart = active.update(&txn).await?;

        let result = self.recompute_and_save(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CouponRemoved {
                cart_id: result.cart.id,
            })
            .await;

        Ok(result)
    }

    /// Loads a cart with its items for the conversion flow, on the
    /// caller's transaction.
    pub async fn load_for_checkout<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        let cart = self.require_cart(conn, customer_id).await?;
        let items = self.load_items(conn, cart.id).await?;
        Ok(CartWithItems { cart, items })
    }

    /// Deletes a cart and its items. Used at the end of conversion, on
    /// the conversion transaction.
    pub async fn delete_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<(), ServiceError> {
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(conn)
            .await?;
        Cart::delete_many()
            .filter(cart::Column::Id.eq(cart_id))
            .exec(conn)
            .await?;
        Ok(())
    }

    async fn get_or_create_row<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: Uuid,
    ) -> Result<CartModel, ServiceError> {
        let now = Utc::now();
        if let Some(cart) = Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(conn)
            .await?
        {
            if !cart.is_expired(now) {
                return Ok(cart);
            }
            info!(cart_id = %cart.id, "Expired cart emptied");
            CartItem::delete_many()
                .filter(cart_item::Column::CartId.eq(cart.id))
                .exec(conn)
                .await?;
            let mut active: cart::ActiveModel = cart.into();
            active.coupon_code = Set(None);
            active.coupon_discount_type = Set(None);
            active.coupon_discount_value = Set(None);
            active.coupon_max_discount = Set(None);
            let cart = active.update(conn).await?;
            let refreshed = self.recompute_and_save(conn, cart).await?;
            return Ok(refreshed.cart);
        }

        let zero = sea_orm::prelude::Decimal::ZERO;
        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            currency: Set(self.currency.clone()),
            coupon_code: Set(None),
            coupon_discount_type: Set(None),
            coupon_discount_value: Set(None),
            coupon_max_discount: Set(None),
            subtotal: Set(zero),
            discount_total: Set(zero),
            shipping_total: Set(zero),
            tax_total: Set(zero),
            total: Set(zero),
            expires_at: Set(now + Duration::days(self.ttl_days)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;

        self.event_sender.send_or_log(Event::CartCreated(cart.id)).await;
        Ok(cart)
    }

    async fn require_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: Uuid,
    ) -> Result<CartModel, ServiceError> {
        Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(conn)
            .await?
            .filter(|c| !c.is_expired(Utc::now()))
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))
    }

    async fn require_item<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartItemModel, ServiceError> {
        CartItem::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart_id))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart item not found".to_string()))
    }

    async fn load_items<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<Vec<CartItemModel>, ServiceError> {
        Ok(CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(conn)
            .await?)
    }

    /// Recomputes the five derived totals from the current line items
    /// and coupon snapshot, refreshes the rolling TTL, and persists.
    async fn recompute_and_save<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart: CartModel,
    ) -> Result<CartWithItems, ServiceError> {
        let items = self.load_items(conn, cart.id).await?;
        let snapshot = coupon_snapshot(&cart);
        let totals = pricing::compute_totals(&line_items(&items), snapshot.as_ref(), &self.policy);

        let now = Utc::now();
        let mut active: cart::ActiveModel = cart.into();
        active.subtotal = Set(totals.subtotal);
        active.discount_total = Set(totals.discount);
        active.shipping_total = Set(totals.shipping);
        active.tax_total = Set(totals.tax);
        active.total = Set(totals.total);
        active.expires_at = Set(now + Duration::days(self.ttl_days));
        active.updated_at = Set(now);
        let cart = active.update(conn).await?;

        Ok(CartWithItems { cart, items })
    }
}

fn line_items(items: &[CartItemModel]) -> Vec<(sea_orm::prelude::Decimal, i32)> {
    items.iter().map(|i| (i.unit_price, i.quantity)).collect()
}

/// Coupon snapshot held on a cart row, if any.
pub fn coupon_snapshot(cart: &CartModel) -> Option<CouponSnapshot> {
    match (&cart.coupon_code, cart.coupon_discount_type, cart.coupon_discount_value) {
        (Some(code), Some(discount_type), Some(discount_value)) => Some(CouponSnapshot {
            code: code.clone(),
            discount_type,
            discount_value,
            max_discount: cart.coupon_max_discount,
        }),
        _ => None,
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemInput {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    #[validate(range(min = 1, max = 99, message = "Quantity must be between 1 and 99"))]
    pub quantity: i32,
}

/// A cart with its line items, the shape every cart endpoint returns.
#[derive(Debug, Serialize)]
pub struct CartWithItems {
    pub cart: CartModel,
    pub items: Vec<CartItemModel>,
}
