pub mod carts;
pub mod checkout;
pub mod common;
pub mod coupons;
pub mod orders;
pub mod payments;
pub mod products;

use crate::AppState;
use axum::Router;
use std::sync::Arc;

/// Versioned API surface, mounted at `/api/v1`.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/products", products::routes())
        .nest("/cart", carts::routes())
        .nest("/coupons", coupons::routes())
        .nest("/checkout", checkout::routes())
        .nest("/payments", payments::routes())
        .nest("/orders", orders::routes())
        .nest("/admin/orders", orders::admin_routes())
}
