use crate::{
    config::AppConfig,
    entities::cart_item::{self, Entity as CartItem},
    entities::order::{self, Address, ContactInfo, Entity as Order, OrderStatus, PaymentStatus},
    entities::order_item::{self, Entity as OrderItem},
    entities::product::Entity as Product,
    errors::ServiceError,
    events::{Event, EventSender},
    pricing::CartTotals,
    services::carts::{CartOwner, CartService},
    services::catalog::CatalogService,
    services::payments::PaymentProcessor,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Checkout orchestrator: converts a cart into an order exactly once.
///
/// The mutation sequence (order insertion, stock reservation, cart clear)
/// runs inside a single database transaction. A failure at any point, such
/// as a conditional stock decrement matching zero rows or an exhausted
/// order-number retry, rolls the whole unit back; the caller never observes
/// a half-created order.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
    cart_service: Arc<CartService>,
    payment: Arc<dyn PaymentProcessor>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        cart_service: Arc<CartService>,
        payment: Arc<dyn PaymentProcessor>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
            cart_service,
            payment,
        }
    }

    /// Places an order from the user's cart.
    ///
    /// Sequence: merge any guest cart into the user's cart, re-validate every
    /// line against the live catalog, snapshot the lines, recompute totals
    /// server-side, persist the order, reserve stock, and clear the cart, all
    /// in one transaction. Payment is captured after commit and the outcome
    /// is applied back onto the order.
    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn place_order(
        &self,
        input: PlaceOrderInput,
    ) -> Result<PlacedOrder, ServiceError> {
        let txn = self.db.begin().await?;

        // Cart resolution: fold the guest cart in first when present.
        if let Some(guest_id) = &input.guest_id {
            CartService::merge_on(&txn, guest_id, input.user_id, &self.config).await?;
        }

        let owner = CartOwner::User(input.user_id);
        let cart = CartService::find_by_owner(&txn, &owner)
            .await?
            .ok_or_else(|| ServiceError::InvalidOperation("Cart is empty".to_string()))?;

        let cart_items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(&txn)
            .await?;
        if cart_items.is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }

        // Re-validation against the live catalog: cart lines can be stale
        // relative to concurrent purchases. First violation aborts with no
        // partial reservation.
        let mut snapshots = Vec::with_capacity(cart_items.len());
        for item in &cart_items {
            let product = Product::find_by_id(item.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} no longer exists", item.product_id))
                })?;

            if !product.is_active() {
                return Err(ServiceError::InvalidOperation(format!(
                    "Product {} is not available for purchase",
                    product.name
                )));
            }

            if item.quantity > product.stock {
                return Err(ServiceError::InsufficientStock(format!(
                    "Insufficient stock for product {}",
                    product.name
                )));
            }

            let resolved = product
                .resolve_variant(item.variant_key.as_deref())
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Variant {} no longer available for product {}",
                        item.variant_key.as_deref().unwrap_or("<none>"),
                        product.name
                    ))
                })?;

            // The snapshot freezes name/sku from the live product and the
            // unit price captured on the cart line.
            snapshots.push(LineSnapshot {
                product_id: product.id,
                variant_key: item.variant_key.clone(),
                name: product.name.clone(),
                sku: resolved.sku,
                quantity: item.quantity,
                unit_price: item.unit_price,
            });
        }

        // Authoritative totals, never trusted from the client.
        let totals = CartTotals::compute(
            cart_items.iter().map(|item| (item.unit_price, item.quantity)),
            &self.config.pricing(),
        );

        let order_id = Uuid::new_v4();
        let order_number = Self::generate_unique_order_number(&txn).await?;
        let now = Utc::now();

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            user_id: Set(input.user_id),
            status: Set(OrderStatus::Pending),
            currency: Set(cart.currency.clone()),
            subtotal: Set(totals.subtotal),
            shipping_total: Set(totals.shipping_total),
            tax_total: Set(totals.tax_total),
            discount_total: Set(totals.discount_total),
            grand_total: Set(totals.total),
            payment_provider: Set(self.payment.provider().to_string()),
            payment_status: Set(PaymentStatus::Pending),
            payment_intent_id: Set(None),
            payment_charge_id: Set(None),
            payment_transaction_id: Set(None),
            payment_amount: Set(totals.total),
            shipping_method: Set(input.shipping_method.clone()),
            shipping_address: Set(serde_json::to_value(&input.shipping_address)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?),
            billing_address: Set(input
                .billing_address
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| ServiceError::InternalError(e.to_string()))?),
            contact_info: Set(serde_json::to_value(&input.contact_info)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?),
            notes: Set(input.notes.clone()),
            tracking_number: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        let order_model = order_model.insert(&txn).await?;

        let mut item_models = Vec::with_capacity(snapshots.len());
        for snapshot in &snapshots {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(snapshot.product_id),
                variant_key: Set(snapshot.variant_key.clone()),
                name: Set(snapshot.name.clone()),
                sku: Set(snapshot.sku.clone()),
                quantity: Set(snapshot.quantity),
                unit_price: Set(snapshot.unit_price),
                total_price: Set(snapshot.unit_price * Decimal::from(snapshot.quantity)),
                created_at: Set(now),
            };
            item_models.push(item.insert(&txn).await?);
        }

        // Stock reservation: the conditional decrement is the write-time
        // re-check that makes concurrent overselling impossible.
        for snapshot in &snapshots {
            CatalogService::decrement_stock(
                &txn,
                snapshot.product_id,
                snapshot.quantity,
                &snapshot.name,
            )
            .await?;
        }

        CartService::clear_on(&txn, cart.id).await?;
        self.cart_service.recalculate_totals(&txn, cart.id).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id,
                order_number: order_number.clone(),
                grand_total: totals.total,
            })
            .await;
        for snapshot in &snapshots {
            self.event_sender
                .send_or_log(Event::StockReserved {
                    product_id: snapshot.product_id,
                    quantity: snapshot.quantity,
                })
                .await;
        }

        info!(%order_id, %order_number, "order created");

        let order_model = self
            .capture_payment(order_model, &input.payment_method)
            .await?;

        Ok(PlacedOrder {
            order: order_model,
            items: item_models,
        })
    }

    /// Captures payment for a freshly created order and applies the outcome.
    async fn capture_payment(
        &self,
        order_model: order::Model,
        payment_method: &str,
    ) -> Result<order::Model, ServiceError> {
        let order_id = order_model.id;
        let amount = order_model.grand_total;

        let outcome = self
            .payment
            .process_payment(order_id, amount, payment_method)
            .await;

        let mut active: order::ActiveModel = order_model.into();
        active.updated_at = Set(Some(Utc::now()));

        match outcome {
            Ok(outcome) if outcome.success => {
                active.status = Set(OrderStatus::Processing);
                active.payment_status = Set(PaymentStatus::Paid);
                active.payment_transaction_id = Set(outcome.transaction_id.clone());
                let updated = active.update(&*self.db).await?;

                self.event_sender
                    .send_or_log(Event::PaymentCaptured {
                        order_id,
                        transaction_id: outcome.transaction_id.unwrap_or_default(),
                    })
                    .await;
                self.event_sender
                    .send_or_log(Event::OrderStatusChanged {
                        order_id,
                        old_status: OrderStatus::Pending.to_string(),
                        new_status: OrderStatus::Processing.to_string(),
                    })
                    .await;
                Ok(updated)
            }
            Ok(outcome) => {
                warn!(%order_id, message = %outcome.message, "payment declined");
                active.payment_status = Set(PaymentStatus::Failed);
                let updated = active.update(&*self.db).await?;
                self.event_sender
                    .send_or_log(Event::PaymentFailed {
                        order_id,
                        reason: outcome.message,
                    })
                    .await;
                Ok(updated)
            }
            Err(err) => {
                warn!(%order_id, error = %err, "payment processing errored");
                active.payment_status = Set(PaymentStatus::Failed);
                let updated = active.update(&*self.db).await?;
                self.event_sender
                    .send_or_log(Event::PaymentFailed {
                        order_id,
                        reason: err.to_string(),
                    })
                    .await;
                Ok(updated)
            }
        }
    }

    /// Refunds a delivered order: restores stock for every line, moves the
    /// order to refunded, and asks the gateway for the refund, all within
    /// one transaction, so a gateway failure leaves nothing changed.
    #[instrument(skip(self, reason))]
    pub async fn refund_order(
        &self,
        order_id: Uuid,
        amount: Option<Decimal>,
        reason: &str,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let order_model = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order_model.status != OrderStatus::Delivered {
            return Err(ServiceError::InvalidOperation(format!(
                "Only delivered orders can be refunded (order is {})",
                order_model.status
            )));
        }

        let amount = amount.unwrap_or(order_model.grand_total);
        if amount <= Decimal::ZERO || amount > order_model.grand_total {
            return Err(ServiceError::ValidationError(format!(
                "Refund amount must be between 0 and {}",
                order_model.grand_total
            )));
        }

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;

        // Gateway first: if the refund call fails, the transaction is
        // dropped and neither the status change nor the restock commits.
        self.payment.create_refund(order_id, amount).await?;

        for item in &items {
            CatalogService::increment_stock(&txn, item.product_id, item.quantity).await?;
        }

        let old_status = order_model.status;
        let notes = match &order_model.notes {
            Some(existing) => format!("{}\nRefunded: {}", existing, reason),
            None => format!("Refunded: {}", reason),
        };

        let mut active: order::ActiveModel = order_model.into();
        active.status = Set(OrderStatus::Refunded);
        active.payment_status = Set(PaymentStatus::Refunded);
        active.notes = Set(Some(notes));
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderRefunded { order_id, amount })
            .await;
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.to_string(),
                new_status: OrderStatus::Refunded.to_string(),
            })
            .await;
        for item in &items {
            self.event_sender
                .send_or_log(Event::StockRestored {
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .await;
        }

        info!(%order_id, %amount, "order refunded");
        Ok(updated)
    }

    /// Generates an order number, regenerating the random suffix on
    /// collision. The date-stamped format keeps numbers human-readable; the
    /// retry loop closes the collision window it leaves open.
    async fn generate_unique_order_number<C: ConnectionTrait>(
        conn: &C,
    ) -> Result<String, ServiceError> {
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let candidate = Self::generate_order_number(Utc::now());
            let taken = Order::find()
                .filter(order::Column::OrderNumber.eq(candidate.clone()))
                .one(conn)
                .await?
                .is_some();
            if !taken {
                return Ok(candidate);
            }
        }

        Err(ServiceError::Conflict(
            "Could not allocate a unique order number".to_string(),
        ))
    }

    fn generate_order_number(now: DateTime<Utc>) -> String {
        let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
        format!("ORD{}{:04}", now.format("%y%m%d"), suffix)
    }
}

/// A cart line frozen for order creation.
#[derive(Debug, Clone)]
struct LineSnapshot {
    product_id: Uuid,
    variant_key: Option<String>,
    name: String,
    sku: String,
    quantity: i32,
    unit_price: Decimal,
}

/// Input for placing an order
#[derive(Debug, Deserialize)]
pub struct PlaceOrderInput {
    pub user_id: Uuid,
    pub guest_id: Option<String>,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub contact_info: ContactInfo,
    pub shipping_method: String,
    pub payment_method: String,
    pub notes: Option<String>,
}

/// A created order with its item snapshots.
#[derive(Debug, serde::Serialize)]
pub struct PlacedOrder {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn order_number_format() {
        let at = Utc.with_ymd_and_hms(2025, 7, 14, 12, 0, 0).unwrap();
        let number = CheckoutService::generate_order_number(at);

        assert_eq!(number.len(), 13);
        assert!(number.starts_with("ORD250714"));
        assert!(number[9..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn order_number_suffix_varies() {
        let at = Utc.with_ymd_and_hms(2025, 7, 14, 12, 0, 0).unwrap();
        let numbers: std::collections::HashSet<String> = (0..100)
            .map(|_| CheckoutService::generate_order_number(at))
            .collect();
        // 100 draws from 10,000 suffixes collapsing to one value would mean
        // the RNG is broken.
        assert!(numbers.len() > 1);
    }
}
