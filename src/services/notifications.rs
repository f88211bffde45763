use crate::entities::OrderModel;
use async_trait::async_trait;
use tracing::info;

/// Outbound customer notifications. Delivery is best-effort and never
/// fails the workflow that triggered it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn order_confirmed(&self, order: &OrderModel);
    async fn order_status_changed(&self, order: &OrderModel, note: Option<&str>);
    async fn refund_issued(&self, order: &OrderModel, amount: rust_decimal::Decimal);
}

/// Default notifier: structured log lines in place of a mail/SMS
/// provider integration.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn order_confirmed(&self, order: &OrderModel) {
        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            customer_id = %order.customer_id,
            total = %order.total,
            "Notify: order confirmed"
        );
    }

    async fn order_status_changed(&self, order: &OrderModel, note: Option<&str>) {
        info!(
            order_id = %order.id,
            status = order.status.as_str(),
            note = note.unwrap_or(""),
            "Notify: order status changed"
        );
    }

    async fn refund_issued(&self, order: &OrderModel, amount: rust_decimal::Decimal) {
        info!(
            order_id = %order.id,
            amount = %amount,
            "Notify: refund issued"
        );
    }
}
