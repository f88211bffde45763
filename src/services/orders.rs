use crate::{
    config::AppConfig,
    entities::{
        order, order_item, order_status_history, Order, OrderItem, OrderItemModel, OrderModel,
        OrderStatus, OrderStatusHistory, OrderStatusHistoryModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{catalog::CatalogService, notifications::Notifier},
};
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Post-purchase order lifecycle: fulfilment transitions, customer
/// cancellation with restock, and the returns window.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    catalog: CatalogService,
    notifier: Arc<dyn Notifier>,
    event_sender: EventSender,
    return_window_days: i64,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: CatalogService,
        notifier: Arc<dyn Notifier>,
        config: &AppConfig,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            catalog,
            notifier,
            event_sender,
            return_window_days: config.return_window_days as i64,
        }
    }

    /// Loads an order with its frozen line items and status history.
    /// When `customer` is set, the order must belong to that customer.
    pub async fn get_order(
        &self,
        order_id: Uuid,
        customer: Option<Uuid>,
    ) -> Result<OrderDetail, ServiceError> {
        let order = self.require_order(&*self.db, order_id, customer).await?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        let history = OrderStatusHistory::find()
            .filter(order_status_history::Column::OrderId.eq(order_id))
            .order_by_asc(order_status_history::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(OrderDetail {
            order,
            items,
            history,
        })
    }

    pub async fn list_orders(
        &self,
        customer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let paginator = Order::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    pub async fn list_all_orders(
        &self,
        status: Option<OrderStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let mut query = Order::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }
        let paginator = query.paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// Admin status update. An authorized actor may move an order to
    /// any status, out of sequence included; customer-facing
    /// cancellation and returns keep their own stricter operations.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        tracking_number: Option<String>,
        note: Option<String>,
        updated_by: Option<Uuid>,
    ) -> Result<OrderModel, ServiceError> {
        let order = self.require_order(&*self.db, order_id, None).await?;
        let old_status = order.status;

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        if let Some(tracking) = tracking_number {
            active.tracking_number = Set(Some(tracking));
        }
        if new_status == OrderStatus::Delivered {
            active.delivered_at = Set(Some(now));
        }
        if new_status == OrderStatus::Cancelled {
            active.cancelled_at = Set(Some(now));
        }
        active.updated_at = Set(now);
        let updated = active.update(&txn).await?;

        self.record_history(&txn, order_id, new_status, note.clone(), updated_by)
            .await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.as_str().to_string(),
                new_status: new_status.as_str().to_string(),
            })
            .await;
        self.notifier
            .order_status_changed(&updated, note.as_deref())
            .await;

        Ok(updated)
    }

    /// Customer cancellation. Only allowed before the order ships;
    /// stock is restored in the same transaction.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        customer: Option<Uuid>,
        reason: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let order = self.require_order(&*self.db, order_id, customer).await?;

        if !order.status.is_cancellable_by_customer() {
            return Err(ServiceError::OrderStateInvalid(format!(
                "Order in status {} can no longer be cancelled",
                order.status.as_str()
            )));
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;

        self.restock_items(&txn, order_id).await?;

        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled);
        active.cancelled_at = Set(Some(now));
        active.updated_at = Set(now);
        let updated = active.update(&txn).await?;

        self.record_history(&txn, order_id, OrderStatus::Cancelled, reason.clone(), customer)
            .await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCancelled(order_id))
            .await;
        self.notifier
            .order_status_changed(&updated, reason.as_deref())
            .await;

        info!(order_id = %order_id, "Order cancelled");
        Ok(updated)
    }

    /// Customer return request. Only delivered orders qualify, and only
    /// within the configured window after delivery.
    #[instrument(skip(self))]
    pub async fn request_return(
        &self,
        order_id: Uuid,
        customer_id: Uuid,
        reason: String,
    ) -> Result<OrderModel, ServiceError> {
        let order = self
            .require_order(&*self.db, order_id, Some(customer_id))
            .await?;

        if order.status != OrderStatus::Delivered {
            return Err(ServiceError::OrderStateInvalid(
                "Only delivered orders can be returned".to_string(),
            ));
        }

        let delivered_at = order.delivered_at.ok_or_else(|| {
            ServiceError::OrderStateInvalid("Order has no delivery date".to_string())
        })?;
        let now = Utc::now();
        if now > delivered_at + Duration::days(self.return_window_days) {
            return Err(ServiceError::OrderStateInvalid(format!(
                "Return window of {} days has passed",
                self.return_window_days
            )));
        }

        let txn = self.db.begin().await?;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::ReturnRequested);
        active.return_reason = Set(Some(reason.clone()));
        active.return_requested_at = Set(Some(now));
        active.updated_at = Set(now);
        let updated = active.update(&txn).await?;

        self.record_history(
            &txn,
            order_id,
            OrderStatus::ReturnRequested,
            Some(reason),
            Some(customer_id),
        )
        .await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ReturnRequested(order_id))
            .await;
        self.notifier.order_status_changed(&updated, None).await;

        Ok(updated)
    }

    /// Admin resolution of a pending return request. Approval restocks
    /// the items and moves the order to `Returned`; rejection puts it
    /// back to `Delivered`.
    #[instrument(skip(self))]
    pub async fn resolve_return(
        &self,
        order_id: Uuid,
        approve: bool,
        note: Option<String>,
        updated_by: Option<Uuid>,
    ) -> Result<OrderModel, ServiceError> {
        let order = self.require_order(&*self.db, order_id, None).await?;

        if order.status != OrderStatus::ReturnRequested {
            return Err(ServiceError::OrderStateInvalid(
                "Order has no pending return request".to_string(),
            ));
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let new_status = if approve {
            self.restock_items(&txn, order_id).await?;
            OrderStatus::Returned
        } else {
            OrderStatus::Delivered
        };

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        if !approve {
            active.return_reason = Set(None);
            active.return_requested_at = Set(None);
        }
        active.updated_at = Set(now);
        let updated = active.update(&txn).await?;

        self.record_history(&txn, order_id, new_status, note.clone(), updated_by)
            .await?;
        txn.commit().await?;

        self.notifier
            .order_status_changed(&updated, note.as_deref())
            .await;

        Ok(updated)
    }

    async fn require_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        customer: Option<Uuid>,
    ) -> Result<OrderModel, ServiceError> {
        let mut query = Order::find_by_id(order_id);
        if let Some(customer_id) = customer {
            query = query.filter(order::Column::CustomerId.eq(customer_id));
        }
        query
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    async fn restock_items<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(conn)
            .await?;
        for item in items {
            self.catalog
                .increment_variant_stock(conn, item.product_id, item.variant_id, item.quantity)
                .await?;
        }
        Ok(())
    }

    async fn record_history<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        status: OrderStatus,
        note: Option<String>,
        updated_by: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(status.as_str().to_string()),
            note: Set(note),
            updated_by: Set(updated_by),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;
        Ok(())
    }
}

/// Order with its frozen items and status trail.
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
    pub history: Vec<OrderStatusHistoryModel>,
}
