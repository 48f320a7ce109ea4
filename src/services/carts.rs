use crate::{
    config::AppConfig,
    entities::cart::{self, Entity as Cart, Model as CartModel},
    entities::cart_item::{self, Entity as CartItem},
    entities::product::Entity as Product,
    errors::ServiceError,
    events::{Event, EventSender},
    pricing::CartTotals,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// The single owner of a cart: a registered user or an anonymous guest
/// session, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    User(Uuid),
    Guest(String),
}

impl std::fmt::Display for CartOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{}", id),
            Self::Guest(id) => write!(f, "guest:{}", id),
        }
    }
}

/// Shopping cart service.
///
/// Owns the mutable pre-purchase selection and its derived totals. Every
/// mutation runs in a transaction that ends by rewriting the cart's totals
/// from its items, so persisted totals always satisfy
/// `total = subtotal − discount + tax + shipping`.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Returns the owner's cart, creating an empty one on first access.
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, owner: &CartOwner) -> Result<CartModel, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = Self::get_or_create_on(&txn, owner, &self.config).await?;
        txn.commit().await?;
        Ok(cart)
    }

    /// Returns the owner's cart with its items, creating it if needed.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, owner: &CartOwner) -> Result<CartWithItems, ServiceError> {
        let cart = self.get_or_create(owner).await?;
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(&*self.db)
            .await?;
        Ok(CartWithItems { cart, items })
    }

    /// Adds an item to the owner's cart, or sums quantities when the same
    /// `(product, variant)` line already exists.
    ///
    /// The product is looked up in the live catalog: it must exist, be
    /// active, and carry enough stock for the resulting line quantity. The
    /// unit price is captured from the catalog at add time.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        input: AddItemInput,
    ) -> Result<CartWithItems, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let cart = Self::get_or_create_on(&txn, owner, &self.config).await?;

        let product = Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        if !product.is_active() {
            return Err(ServiceError::InvalidOperation(format!(
                "Product {} is not available for purchase",
                product.name
            )));
        }

        let resolved = product
            .resolve_variant(input.variant_key.as_deref())
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Variant {} not found for product {}",
                    input.variant_key.as_deref().unwrap_or("<none>"),
                    product.name
                ))
            })?;

        // If the line already exists, the stock check covers the summed quantity.
        let existing_item = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .filter(variant_key_condition(input.variant_key.as_deref()))
            .one(&txn)
            .await?;

        let requested_total = existing_item
            .as_ref()
            .map(|item| item.quantity)
            .unwrap_or(0)
            + input.quantity;

        if requested_total > product.stock {
            return Err(ServiceError::InsufficientStock(format!(
                "Insufficient stock for product {}",
                product.name
            )));
        }

        if let Some(item) = existing_item {
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(requested_total);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        } else {
            let now = Utc::now();
            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(input.product_id),
                variant_key: Set(resolved.variant_key.clone()),
                quantity: Set(input.quantity),
                unit_price: Set(resolved.unit_price),
                added_at: Set(now),
                updated_at: Set(now),
            };
            item.insert(&txn).await?;
        }

        let (cart, items) = self.recalculate_totals(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id: input.product_id,
                quantity: input.quantity,
            })
            .await;

        info!(
            "Added item to cart {}: product {} x{}",
            cart.id, input.product_id, input.quantity
        );
        Ok(CartWithItems { cart, items })
    }

    /// Updates a line's quantity, re-validated against live stock.
    /// A quantity of zero removes the line.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        owner: &CartOwner,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartWithItems, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Quantity cannot be negative".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let cart = Self::find_by_owner(&txn, owner)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart for {} not found", owner)))?;

        let item = CartItem::find_by_id(item_id)
            .one(&txn)
            .await?
            .filter(|item| item.cart_id == cart.id)
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        if quantity == 0 {
            CartItem::delete_by_id(item_id).exec(&txn).await?;
        } else {
            let product = Product::find_by_id(item.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", item.product_id))
                })?;

            if quantity > product.stock {
                return Err(ServiceError::InsufficientStock(format!(
                    "Insufficient stock for product {}",
                    product.name
                )));
            }

            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(quantity);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        }

        let (cart, items) = self.recalculate_totals(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                cart_id: cart.id,
                item_id,
            })
            .await;

        Ok(CartWithItems { cart, items })
    }

    /// Removes a line from the owner's cart.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        owner: &CartOwner,
        item_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = Self::find_by_owner(&txn, owner)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart for {} not found", owner)))?;

        let item = CartItem::find_by_id(item_id)
            .one(&txn)
            .await?
            .filter(|item| item.cart_id == cart.id)
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        CartItem::delete_by_id(item.id).exec(&txn).await?;

        let (cart, items) = self.recalculate_totals(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: cart.id,
                item_id,
            })
            .await;

        Ok(CartWithItems { cart, items })
    }

    /// Empties the owner's cart and resets its totals.
    #[instrument(skip(self))]
    pub async fn clear(&self, owner: &CartOwner) -> Result<CartModel, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = Self::find_by_owner(&txn, owner)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart for {} not found", owner)))?;

        Self::clear_on(&txn, cart.id).await?;
        let (cart, _) = self.recalculate_totals(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender.send_or_log(Event::CartCleared(cart.id)).await;

        info!("Cleared cart: {}", cart.id);
        Ok(cart)
    }

    /// Merges the guest cart into the user's cart and deletes the guest
    /// cart. Lines with the same `(product, variant)` sum their quantities;
    /// other guest lines are appended. Idempotent: once the guest cart is
    /// gone a retry is a no-op.
    #[instrument(skip(self))]
    pub async fn merge_guest_cart(
        &self,
        guest_id: &str,
        user_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;
        let merged = Self::merge_on(&txn, guest_id, user_id, &self.config).await?;
        let (cart, items) = self.recalculate_totals(&txn, merged.user_cart_id).await?;
        txn.commit().await?;

        if let Some(guest_cart_id) = merged.guest_cart_id {
            self.event_sender
                .send_or_log(Event::CartMerged {
                    guest_cart_id,
                    user_cart_id: cart.id,
                })
                .await;
        }

        Ok(CartWithItems { cart, items })
    }

    /// Merge step shared with the checkout orchestrator, which runs it
    /// inside its own transaction.
    pub(crate) async fn merge_on<C: ConnectionTrait>(
        conn: &C,
        guest_id: &str,
        user_id: Uuid,
        config: &AppConfig,
    ) -> Result<MergeOutcome, ServiceError> {
        let user_cart =
            Self::get_or_create_on(conn, &CartOwner::User(user_id), config).await?;

        let Some(guest_cart) = Self::find_by_owner(conn, &CartOwner::Guest(guest_id.to_string()))
            .await?
        else {
            // Guest cart already merged (or never existed): nothing to do.
            return Ok(MergeOutcome {
                user_cart_id: user_cart.id,
                guest_cart_id: None,
            });
        };

        let guest_items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(guest_cart.id))
            .all(conn)
            .await?;
        let user_items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(user_cart.id))
            .all(conn)
            .await?;

        for guest_item in guest_items {
            let existing = user_items
                .iter()
                .find(|item| item.matches(guest_item.product_id, guest_item.variant_key.as_deref()));

            match existing {
                Some(user_item) => {
                    let summed = user_item.quantity + guest_item.quantity;
                    let mut active: cart_item::ActiveModel = user_item.clone().into();
                    active.quantity = Set(summed);
                    active.updated_at = Set(Utc::now());
                    active.update(conn).await?;
                }
                None => {
                    let now = Utc::now();
                    let item = cart_item::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        cart_id: Set(user_cart.id),
                        product_id: Set(guest_item.product_id),
                        variant_key: Set(guest_item.variant_key.clone()),
                        quantity: Set(guest_item.quantity),
                        unit_price: Set(guest_item.unit_price),
                        added_at: Set(now),
                        updated_at: Set(now),
                    };
                    item.insert(conn).await?;
                }
            }
        }

        // The guest cart is consumed by the merge.
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(guest_cart.id))
            .exec(conn)
            .await?;
        Cart::delete_by_id(guest_cart.id).exec(conn).await?;

        Ok(MergeOutcome {
            user_cart_id: user_cart.id,
            guest_cart_id: Some(guest_cart.id),
        })
    }

    /// Deletes all items from a cart. The caller recomputes totals.
    pub(crate) async fn clear_on<C: ConnectionTrait>(
        conn: &C,
        cart_id: Uuid,
    ) -> Result<(), ServiceError> {
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(conn)
            .await?;
        Ok(())
    }

    pub(crate) async fn find_by_owner<C: ConnectionTrait>(
        conn: &C,
        owner: &CartOwner,
    ) -> Result<Option<CartModel>, ServiceError> {
        let query = match owner {
            CartOwner::User(user_id) => Cart::find().filter(cart::Column::UserId.eq(*user_id)),
            CartOwner::Guest(guest_id) => {
                Cart::find().filter(cart::Column::GuestId.eq(guest_id.clone()))
            }
        };
        Ok(query.one(conn).await?)
    }

    pub(crate) async fn get_or_create_on<C: ConnectionTrait>(
        conn: &C,
        owner: &CartOwner,
        config: &AppConfig,
    ) -> Result<CartModel, ServiceError> {
        if let Some(cart) = Self::find_by_owner(conn, owner).await? {
            return Ok(cart);
        }

        let now = Utc::now();
        let empty = CartTotals::empty(&config.pricing());
        let (user_id, guest_id) = match owner {
            CartOwner::User(id) => (Some(*id), None),
            CartOwner::Guest(id) => (None, Some(id.clone())),
        };

        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            guest_id: Set(guest_id),
            currency: Set(config.default_currency.clone()),
            subtotal: Set(empty.subtotal),
            discount_total: Set(empty.discount_total),
            tax_total: Set(empty.tax_total),
            shipping_total: Set(empty.shipping_total),
            total: Set(empty.total),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let cart = cart.insert(conn).await?;
        info!("Created cart {} for {}", cart.id, owner);
        Ok(cart)
    }

    /// Rewrites a cart's totals from its current items.
    pub(crate) async fn recalculate_totals<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<(CartModel, Vec<cart_item::Model>), ServiceError> {
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .all(conn)
            .await?;

        let totals = CartTotals::compute(
            items.iter().map(|item| (item.unit_price, item.quantity)),
            &self.config.pricing(),
        );

        let mut cart: cart::ActiveModel = Cart::find_by_id(cart_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?
            .into();

        cart.subtotal = Set(totals.subtotal);
        cart.discount_total = Set(totals.discount_total);
        cart.tax_total = Set(totals.tax_total);
        cart.shipping_total = Set(totals.shipping_total);
        cart.total = Set(totals.total);
        cart.updated_at = Set(Utc::now());

        Ok((cart.update(conn).await?, items))
    }
}

fn variant_key_condition(variant_key: Option<&str>) -> sea_orm::Condition {
    match variant_key {
        Some(key) => sea_orm::Condition::all().add(cart_item::Column::VariantKey.eq(key)),
        None => sea_orm::Condition::all().add(cart_item::Column::VariantKey.is_null()),
    }
}

/// Result of a guest-cart merge.
#[derive(Debug, Clone, Copy)]
pub struct MergeOutcome {
    pub user_cart_id: Uuid,
    /// `None` when the guest cart no longer existed (idempotent retry).
    pub guest_cart_id: Option<Uuid>,
}

/// Input for adding an item to a cart
#[derive(Debug, Deserialize)]
pub struct AddItemInput {
    pub product_id: Uuid,
    pub variant_key: Option<String>,
    pub quantity: i32,
}

/// Cart with items
#[derive(Debug, Serialize)]
pub struct CartWithItems {
    pub cart: CartModel,
    pub items: Vec<cart_item::Model>,
}
