use crate::{
    auth::AuthenticatedUser,
    errors::ApiError,
    handlers::common::{created_response, success_response, Paginated, PaginationParams},
    services::coupons::CreateCouponInput,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Coupon validation for customers plus admin management.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_coupons).post(create_coupon))
        .route("/validate", axum::routing::post(validate_coupon))
        .route("/{id}", axum::routing::delete(deactivate_coupon))
}

#[derive(Debug, Deserialize)]
struct ValidateCouponRequest {
    code: String,
}

/// Dry-run check against the caller's current cart.
async fn validate_coupon(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(input): Json<ValidateCouponRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state.services.carts.get_or_create_cart(user.id).await?;
    let (coupon, discount) = state
        .services
        .coupons
        .validate_for(user.id, input.code.trim(), cart.cart.subtotal)
        .await?;
    Ok(success_response(json!({
        "code": coupon.code,
        "discount": discount,
        "valid": true,
    })))
}

async fn list_coupons(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    user.require_admin()?;
    let (coupons, total) = state
        .services
        .coupons
        .list_coupons(params.page(), params.per_page())
        .await?;
    Ok(success_response(Paginated::new(coupons, total, &params)))
}

async fn create_coupon(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(input): Json<CreateCouponInput>,
) -> Result<impl IntoResponse, ApiError> {
    user.require_admin()?;
    let coupon = state.services.coupons.create_coupon(input).await?;
    Ok(created_response(coupon))
}

async fn deactivate_coupon(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    user.require_admin()?;
    let coupon = state.services.coupons.deactivate_coupon(id).await?;
    Ok(success_response(coupon))
}
