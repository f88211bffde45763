use crate::{
    entities::{
        coupon, coupon_redemption, order, Coupon, CouponModel, CouponRedemption, DiscountType,
        Order, PaymentStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::pricing::{self, CouponSnapshot},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Coupon engine: eligibility checks, discount terms, and redemption
/// bookkeeping.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    pub async fn find_by_code<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
    ) -> Result<CouponModel, ServiceError> {
        Coupon::find()
            .filter(coupon::Column::Code.eq(code))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", code)))
    }

    /// Full eligibility check for a customer at a given subtotal.
    ///
    /// Checks run in a fixed order so the caller always gets the same
    /// rejection for the same state: active, validity window, global
    /// usage limit, per-user limit, first-order rule, minimum purchase.
    pub async fn check_eligibility<C: ConnectionTrait>(
        &self,
        conn: &C,
        coupon: &CouponModel,
        customer_id: Uuid,
        subtotal: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        if !coupon.is_active {
            return Err(ServiceError::CouponIneligible(
                "This coupon is no longer active".to_string(),
            ));
        }
        if now < coupon.starts_at {
            return Err(ServiceError::CouponIneligible(
                "This coupon is not valid yet".to_string(),
            ));
        }
        if now > coupon.ends_at {
            return Err(ServiceError::CouponIneligible(
                "This coupon has expired".to_string(),
            ));
        }
        if let Some(limit) = coupon.usage_limit {
            if coupon.usage_count >= limit {
                return Err(ServiceError::CouponIneligible(
                    "This coupon has reached its usage limit".to_string(),
                ));
            }
        }
        let per_user = CouponRedemption::find()
            .filter(coupon_redemption::Column::CouponId.eq(coupon.id))
            .filter(coupon_redemption::Column::CustomerId.eq(customer_id))
            .count(conn)
            .await?;
        if per_user >= coupon.usage_limit_per_user as u64 {
            return Err(ServiceError::CouponIneligible(
                "You have already used this coupon".to_string(),
            ));
        }

        if coupon.first_order_only {
            // A paid order counts even if it was later cancelled; only
            // the payment matters for "first order".
            let prior_orders = Order::find()
                .filter(order::Column::CustomerId.eq(customer_id))
                .filter(order::Column::PaymentStatus.eq(PaymentStatus::Completed))
                .count(conn)
                .await?;
            if prior_orders > 0 {
                return Err(ServiceError::CouponIneligible(
                    "This coupon is only valid on your first order".to_string(),
                ));
            }
        }

        if subtotal < coupon.minimum_purchase {
            return Err(ServiceError::CouponIneligible(format!(
                "Minimum purchase of {} required",
                coupon.minimum_purchase.normalize()
            )));
        }

        Ok(())
    }

    /// Records a redemption inside the conversion transaction.
    ///
    /// The global usage counter is bumped with a conditional update so
    /// two concurrent conversions can never push it past the limit; the
    /// loser gets a `CouponIneligible` and its transaction rolls back.
    pub async fn redeem<C: ConnectionTrait>(
        &self,
        conn: &C,
        coupon_id: Uuid,
        customer_id: Uuid,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        let result = Coupon::update_many()
            .col_expr(
                coupon::Column::UsageCount,
                Expr::col(coupon::Column::UsageCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Id.eq(coupon_id))
            .filter(
                Condition::any()
                    .add(coupon::Column::UsageLimit.is_null())
                    .add(
                        Expr::col(coupon::Column::UsageCount)
                            .lt(Expr::col(coupon::Column::UsageLimit)),
                    ),
            )
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::CouponIneligible(
                "This coupon has reached its usage limit".to_string(),
            ));
        }

        coupon_redemption::ActiveModel {
            id: Set(Uuid::new_v4()),
            coupon_id: Set(coupon_id),
            customer_id: Set(customer_id),
            order_id: Set(order_id),
            redeemed_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;

        self.event_sender
            .send_or_log(Event::CouponRedeemed {
                coupon_id,
                order_id,
            })
            .await;

        Ok(())
    }

    /// Dry-run check for the storefront UI: would this coupon apply to
    /// the customer at the given subtotal, and for how much?
    pub async fn validate_for(
        &self,
        customer_id: Uuid,
        code: &str,
        subtotal: Decimal,
    ) -> Result<(CouponModel, Decimal), ServiceError> {
        let coupon = self.find_by_code(&*self.db, code).await?;
        self.check_eligibility(&*self.db, &coupon, customer_id, subtotal, Utc::now())
            .await?;
        let snapshot = CouponSnapshot {
            code: coupon.code.clone(),
            discount_type: coupon.discount_type,
            discount_value: coupon.discount_value,
            max_discount: coupon.max_discount,
        };
        let discount = pricing::coupon_discount(&snapshot, subtotal);
        Ok((coupon, discount))
    }

    #[instrument(skip(self, input))]
    pub async fn create_coupon(&self, input: CreateCouponInput) -> Result<CouponModel, ServiceError> {
        if input.discount_value <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Discount value must be positive".to_string(),
            ));
        }
        if input.discount_type == DiscountType::Percentage
            && input.discount_value > Decimal::from(100)
        {
            return Err(ServiceError::ValidationError(
                "Percentage discount cannot exceed 100".to_string(),
            ));
        }
        if input.ends_at <= input.starts_at {
            return Err(ServiceError::ValidationError(
                "Coupon must end after it starts".to_string(),
            ));
        }

        let existing = Coupon::find()
            .filter(coupon::Column::Code.eq(input.code.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Coupon code {} already exists",
                input.code
            )));
        }

        let now = Utc::now();
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(input.code.to_uppercase()),
            discount_type: Set(input.discount_type),
            discount_value: Set(input.discount_value),
            minimum_purchase: Set(input.minimum_purchase.unwrap_or(Decimal::ZERO)),
            max_discount: Set(input.max_discount),
            starts_at: Set(input.starts_at),
            ends_at: Set(input.ends_at),
            usage_limit: Set(input.usage_limit),
            usage_count: Set(0),
            usage_limit_per_user: Set(input.usage_limit_per_user.unwrap_or(1)),
            first_order_only: Set(input.first_order_only.unwrap_or(false)),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let created = model.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CouponCreated(created.id))
            .await;
        info!(coupon_id = %created.id, code = %created.code, "Coupon created");

        Ok(created)
    }

    pub async fn deactivate_coupon(&self, coupon_id: Uuid) -> Result<CouponModel, ServiceError> {
        let coupon = Coupon::find_by_id(coupon_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", coupon_id)))?;

        let mut active: coupon::ActiveModel = coupon.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    pub async fn list_coupons(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<CouponModel>, u64), ServiceError> {
        let paginator = Coupon::find()
            .order_by_desc(coupon::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let coupons = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((coupons, total))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCouponInput {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub minimum_purchase: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub usage_limit: Option<i32>,
    pub usage_limit_per_user: Option<i32>,
    pub first_order_only: Option<bool>,
}
