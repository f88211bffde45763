use crate::{
    auth::AuthenticatedUser,
    entities::OrderStatus,
    errors::ApiError,
    handlers::common::{success_response, Paginated, PaginationParams},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Customer-facing order endpoints.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_orders))
        .route("/{id}", get(get_order))
        .route("/{id}/cancel", post(cancel_order))
        .route("/{id}/return", post(request_return))
}

/// Admin order management, mounted under `/admin/orders`.
pub fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(admin_list_orders))
        .route("/{id}/status", put(admin_update_status))
        .route("/{id}/refund", post(admin_refund))
        .route("/{id}/return/resolve", post(admin_resolve_return))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (orders, total) = state
        .services
        .orders
        .list_orders(user.id, params.page(), params.per_page())
        .await?;
    Ok(success_response(Paginated::new(orders, total, &params)))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    // Admins can inspect any order; customers only their own
    let scope = if user.is_admin() { None } else { Some(user.id) };
    let order = state.services.orders.get_order(id, scope).await?;
    Ok(success_response(order))
}

#[derive(Debug, Deserialize)]
struct CancelRequest {
    reason: Option<String>,
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(input): Json<CancelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = if user.is_admin() { None } else { Some(user.id) };
    let order = state
        .services
        .orders
        .cancel_order(id, scope, input.reason)
        .await?;
    Ok(success_response(order))
}

#[derive(Debug, Deserialize)]
struct ReturnRequest {
    reason: String,
}

async fn request_return(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(input): Json<ReturnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .request_return(id, user.id, input.reason)
        .await?;
    Ok(success_response(order))
}

#[derive(Debug, Deserialize)]
struct AdminListParams {
    status: Option<OrderStatus>,
}

async fn admin_list_orders(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(filter): Query<AdminListParams>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    user.require_admin()?;
    let (orders, total) = state
        .services
        .orders
        .list_all_orders(filter.status, pagination.page(), pagination.per_page())
        .await?;
    Ok(success_response(Paginated::new(orders, total, &pagination)))
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    status: OrderStatus,
    tracking_number: Option<String>,
    note: Option<String>,
}

async fn admin_update_status(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require_admin()?;
    let order = state
        .services
        .orders
        .update_status(
            id,
            input.status,
            input.tracking_number,
            input.note,
            Some(user.id),
        )
        .await?;
    Ok(success_response(order))
}

#[derive(Debug, Deserialize)]
struct RefundRequest {
    /// Omitted amount means a full refund of the remainder
    amount: Option<Decimal>,
    reason: Option<String>,
}

async fn admin_refund(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(input): Json<RefundRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require_admin()?;
    let order = state
        .services
        .checkout
        .refund(id, input.amount, input.reason, Some(user.id))
        .await?;
    Ok(success_response(order))
}

#[derive(Debug, Deserialize)]
struct ResolveReturnRequest {
    approve: bool,
    note: Option<String>,
}

async fn admin_resolve_return(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(input): Json<ResolveReturnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require_admin()?;
    let order = state
        .services
        .orders
        .resolve_return(id, input.approve, input.note, Some(user.id))
        .await?;
    Ok(success_response(order))
}
