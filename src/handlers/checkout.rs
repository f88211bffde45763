use crate::{
    auth::AuthenticatedUser,
    errors::ApiError,
    handlers::common::{created_response, success_response, validate_input},
    services::checkout::VerifyPaymentInput,
    AppState,
};
use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_payment_order))
        .route("/verify", post(verify_payment))
}

#[derive(Debug, Deserialize)]
struct CreateCheckoutRequest {
    shipping_address: Option<serde_json::Value>,
}

/// Registers a payment order with the gateway for the caller's cart.
async fn create_payment_order(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    body: Option<Json<CreateCheckoutRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let shipping_address = body.and_then(|Json(input)| input.shipping_address);
    let session = state
        .services
        .checkout
        .create_payment_order(user.id, shipping_address)
        .await?;
    Ok(success_response(session))
}

/// Verifies a completed payment and converts the cart into an order.
async fn verify_payment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(input): Json<VerifyPaymentInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&input)?;
    let order = state
        .services
        .checkout
        .verify_and_convert(user.id, input)
        .await?;
    Ok(created_response(order))
}
