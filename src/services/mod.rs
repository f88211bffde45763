pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod coupons;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod pricing;

use crate::{config::AppConfig, events::EventSender};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// The wired service graph behind the HTTP surface.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: catalog::CatalogService,
    pub coupons: coupons::CouponService,
    pub carts: carts::CartService,
    pub checkout: checkout::CheckoutService,
    pub orders: orders::OrderService,
}

impl AppServices {
    /// Builds all services over a shared connection. The gateway and
    /// notifier are injected so tests can substitute fakes.
    pub fn build(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        event_sender: EventSender,
        gateway: Arc<dyn payments::PaymentGateway>,
        notifier: Arc<dyn notifications::Notifier>,
    ) -> Self {
        let catalog = catalog::CatalogService::new(db.clone(), event_sender.clone());
        let coupons = coupons::CouponService::new(db.clone(), event_sender.clone());
        let carts = carts::CartService::new(
            db.clone(),
            catalog.clone(),
            coupons.clone(),
            config,
            event_sender.clone(),
        );
        let checkout = checkout::CheckoutService::new(
            db.clone(),
            carts.clone(),
            catalog.clone(),
            coupons.clone(),
            gateway,
            notifier.clone(),
            config,
            event_sender.clone(),
        );
        let orders = orders::OrderService::new(db, catalog.clone(), notifier, config, event_sender);

        Self {
            catalog,
            coupons,
            carts,
            checkout,
            orders,
        }
    }
}
