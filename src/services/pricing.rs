use crate::config::AppConfig;
use crate::entities::DiscountType;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Business constants for totals computation, resolved from config.
#[derive(Debug, Clone, Copy)]
pub struct PricingPolicy {
    pub tax_rate: Decimal,
    pub free_shipping_threshold: Decimal,
    pub shipping_fee: Decimal,
}

impl PricingPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            tax_rate: Decimal::from_f64_retain(config.tax_rate).unwrap_or(Decimal::ZERO),
            free_shipping_threshold: Decimal::from_f64_retain(config.free_shipping_threshold)
                .unwrap_or(Decimal::ZERO),
            shipping_fee: Decimal::from_f64_retain(config.shipping_fee).unwrap_or(Decimal::ZERO),
        }
    }
}

/// Coupon terms captured on the cart at apply time. Later edits to the
/// coupon definition never reach an already-applied cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponSnapshot {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub max_discount: Option<Decimal>,
}

/// The five derived monetary fields of a cart or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Discount for a coupon snapshot against a subtotal, rounded to 2 dp.
///
/// Percentage discounts are clamped to the coupon's max-discount ceiling
/// when one is set; fixed discounts can never exceed the subtotal.
pub fn coupon_discount(coupon: &CouponSnapshot, subtotal: Decimal) -> Decimal {
    let raw = match coupon.discount_type {
        DiscountType::Percentage => {
            let pct = subtotal * coupon.discount_value / Decimal::from(100);
            match coupon.max_discount {
                Some(cap) => pct.min(cap),
                None => pct,
            }
        }
        DiscountType::Fixed => coupon.discount_value.min(subtotal),
    };
    round2(raw.min(subtotal))
}

/// Deterministic totals computation.
///
/// Each of the five outputs is rounded to 2 decimal places
/// independently; the total is computed from the already-rounded parts
/// so repeated runs over the same inputs are bit-identical.
///
/// An empty cart is exempt from the flat shipping fee: there is
/// nothing to ship, and fresh carts must show a zero total.
pub fn compute_totals(
    line_items: &[(Decimal, i32)],
    coupon: Option<&CouponSnapshot>,
    policy: &PricingPolicy,
) -> CartTotals {
    let subtotal: Decimal = line_items
        .iter()
        .map(|(unit_price, quantity)| *unit_price * Decimal::from(*quantity))
        .sum();
    let subtotal = round2(subtotal);

    let discount = coupon.map_or(Decimal::ZERO, |c| coupon_discount(c, subtotal));

    let after_discount = subtotal - discount;

    let shipping = if after_discount >= policy.free_shipping_threshold || line_items.is_empty() {
        Decimal::ZERO
    } else {
        round2(policy.shipping_fee)
    };

    let tax = round2(after_discount * policy.tax_rate);
    let total = round2(after_discount + shipping + tax);

    CartTotals {
        subtotal,
        discount,
        shipping,
        tax,
        total,
    }
}
