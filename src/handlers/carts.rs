use crate::{
    auth::AuthenticatedUser,
    errors::ApiError,
    handlers::common::success_response,
    services::carts::AddItemInput,
    AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_item))
        .route("/items/{item_id}", put(update_item).delete(remove_item))
        .route("/coupon", post(apply_coupon).delete(remove_coupon))
}

async fn get_cart(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state.services.carts.get_or_create_cart(user.id).await?;
    Ok(success_response(cart))
}

async fn add_item(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(input): Json<AddItemInput>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state.services.carts.add_item(user.id, input).await?;
    Ok(success_response(cart))
}

#[derive(Debug, Deserialize)]
struct UpdateQuantityRequest {
    quantity: i32,
}

async fn update_item(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(item_id): Path<Uuid>,
    Json(input): Json<UpdateQuantityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .carts
        .update_item_quantity(user.id, item_id, input.quantity)
        .await?;
    Ok(success_response(cart))
}

async fn remove_item(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state.services.carts.remove_item(user.id, item_id).await?;
    Ok(success_response(cart))
}

#[derive(Debug, Deserialize)]
struct ApplyCouponRequest {
    code: String,
}

async fn apply_coupon(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(input): Json<ApplyCouponRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .carts
        .apply_coupon(user.id, input.code.trim())
        .await?;
    Ok(success_response(cart))
}

async fn remove_coupon(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state.services.carts.remove_coupon(user.id).await?;
    Ok(success_response(cart))
}
