use crate::{
    entities::order::{self, Entity as Order, Model as OrderModel, OrderStatus},
    entities::order_item::{self, Entity as OrderItem, Model as OrderItemModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Order store: durable persistence and query of orders.
///
/// Orders are never deleted; their lifecycle is driven entirely through
/// status transitions validated by [`OrderStatus::can_transition_to`].
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Fetches an order with its item snapshots.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderWithItems, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        Ok(OrderWithItems { order, items })
    }

    /// Fetches an order only if it belongs to the given user.
    #[instrument(skip(self))]
    pub async fn get_order_for_user(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<OrderWithItems, ServiceError> {
        let found = self.get_order(order_id).await?;
        if found.order.user_id != user_id {
            // Another user's order is indistinguishable from a missing one.
            return Err(ServiceError::NotFound(format!(
                "Order {} not found",
                order_id
            )));
        }
        Ok(found)
    }

    /// Lists orders newest-first with offset pagination, optionally filtered
    /// by owner and status.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        filter: OrderListFilter,
        page: u64,
        limit: u64,
    ) -> Result<OrderPage, ServiceError> {
        let page = page.max(1);
        let limit = limit.max(1);

        let mut query = Order::find().order_by_desc(order::Column::CreatedAt);
        if let Some(user_id) = filter.user_id {
            query = query.filter(order::Column::UserId.eq(user_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }

        let paginator = query.paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        Ok(OrderPage::new(orders, total, page, limit))
    }

    /// Moves an order to a new status, enforcing the transition table.
    /// A tracking number may ride along (set when shipping).
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        tracking_number: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order_model = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = order_model.status;
        if !old_status.can_transition_to(new_status) {
            warn!(%order_id, %old_status, %new_status, "rejected status transition");
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot transition order from {} to {}",
                old_status, new_status
            )));
        }

        let mut active: order::ActiveModel = order_model.into();
        active.status = Set(new_status);
        active.updated_at = Set(Some(Utc::now()));
        if let Some(tracking) = tracking_number {
            active.tracking_number = Set(Some(tracking));
        }

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(%order_id, %old_status, %new_status, "order status updated");

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.to_string(),
                new_status: new_status.to_string(),
            })
            .await;
        if new_status == OrderStatus::Cancelled {
            self.event_sender
                .send_or_log(Event::OrderCancelled(order_id))
                .await;
        }

        Ok(updated)
    }

    /// Cancels an order (any pre-delivered state), recording the reason.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let updated = self
            .update_status(order_id, OrderStatus::Cancelled, None)
            .await?;

        if let Some(reason) = reason {
            let notes = match &updated.notes {
                Some(existing) => format!("{}\nCancelled: {}", existing, reason),
                None => format!("Cancelled: {}", reason),
            };
            let mut active: order::ActiveModel = updated.into();
            active.notes = Set(Some(notes));
            return Ok(active.update(&*self.db).await?);
        }

        Ok(updated)
    }
}

/// Filters for order listings.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrderListFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
}

/// An order with its frozen line snapshots.
#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

/// One page of an order listing.
#[derive(Debug, Serialize)]
pub struct OrderPage {
    pub orders: Vec<OrderModel>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl OrderPage {
    pub fn new(orders: Vec<OrderModel>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + limit - 1) / limit
        };
        Self {
            orders,
            total,
            page,
            limit,
            total_pages,
            has_next_page: page < total_pages,
            has_prev_page: page > 1 && total_pages > 0,
        }
    }
}
