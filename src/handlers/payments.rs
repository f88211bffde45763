use crate::{errors::ApiError, handlers::common::success_response, AppState};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
    Router,
};
use serde_json::json;
use std::sync::Arc;

/// Gateway-facing endpoints. The webhook is authenticated by its
/// signature header, not by a bearer token.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook", post(receive_webhook))
}

async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get("X-Razorpay-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError::ServiceError(crate::errors::ServiceError::SignatureInvalid)
        })?;

    state
        .services
        .checkout
        .handle_webhook(&body, signature)
        .await?;

    Ok(success_response(json!({ "received": true })))
}
