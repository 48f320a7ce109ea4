mod common;

use assert_matches::assert_matches;
use common::{sample_address, sample_contact, DecliningPaymentProcessor, RefundFailingProcessor, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
use std::sync::Arc;
use storefront_api::{
    entities::order::{OrderStatus, PaymentStatus},
    entities::product,
    entities::{Cart, CartItem, Order, OrderItem},
    errors::ServiceError,
    services::carts::{AddItemInput, CartOwner},
    services::checkout::PlaceOrderInput,
};
use uuid::Uuid;

fn place_order_input(user_id: Uuid) -> PlaceOrderInput {
    PlaceOrderInput {
        user_id,
        guest_id: None,
        shipping_address: sample_address(),
        billing_address: None,
        contact_info: sample_contact(),
        shipping_method: "standard".to_string(),
        payment_method: "card".to_string(),
        notes: None,
    }
}

async fn fill_cart(app: &TestApp, user_id: Uuid, product_id: Uuid, quantity: i32) {
    app.state
        .services
        .cart
        .add_item(
            &CartOwner::User(user_id),
            AddItemInput {
                product_id,
                variant_key: None,
                quantity,
            },
        )
        .await
        .expect("fill cart");
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn place_order_reserves_stock_and_clears_cart() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", dec!(20.00), 10).await;
    let user_id = Uuid::new_v4();
    fill_cart(&app, user_id, lamp.id, 3).await;

    let placed = app
        .state
        .services
        .checkout
        .place_order(place_order_input(user_id))
        .await
        .unwrap();

    // Totals are recomputed server-side: 3 x 20 = 60, free shipping, 10% tax
    assert_eq!(placed.order.subtotal, dec!(60.00));
    assert_eq!(placed.order.shipping_total, dec!(0.00));
    assert_eq!(placed.order.tax_total, dec!(6.00));
    assert_eq!(placed.order.grand_total, dec!(66.00));
    assert_eq!(placed.items.len(), 1);
    assert_eq!(placed.items[0].quantity, 3);

    // Demo gateway approves: order moves to processing/paid
    assert_eq!(placed.order.status, OrderStatus::Processing);
    assert_eq!(placed.order.payment_status, PaymentStatus::Paid);
    assert!(placed.order.payment_transaction_id.is_some());

    // Stock reserved 10 -> 7
    let product = product::Entity::find_by_id(lamp.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 7);

    // Cart is empty with recomputed (empty) totals
    let cart = app
        .state
        .services
        .cart
        .get_cart(&CartOwner::User(user_id))
        .await
        .unwrap();
    assert!(cart.items.is_empty());
    assert_eq!(cart.cart.subtotal, dec!(0));

    // Order number has the dated, human-readable shape
    assert!(placed.order.order_number.starts_with("ORD"));
    assert_eq!(placed.order.order_number.len(), 13);
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn stale_cart_fails_revalidation_without_side_effects() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", dec!(20.00), 10).await;
    let user_id = Uuid::new_v4();
    fill_cart(&app, user_id, lamp.id, 2).await;

    // Stock drops to 1 after the item entered the cart (a concurrent sale).
    app.state
        .services
        .catalog
        .set_stock(lamp.id, 1)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .checkout
        .place_order(place_order_input(user_id))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(msg) => {
        assert!(msg.contains("Desk Lamp"));
    });

    // Nothing moved: stock untouched, no order rows, cart still populated.
    let product = product::Entity::find_by_id(lamp.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 1);

    let order_count = Order::find().count(&*app.state.db).await.unwrap();
    assert_eq!(order_count, 0);
    let item_count = OrderItem::find().count(&*app.state.db).await.unwrap();
    assert_eq!(item_count, 0);

    let cart = app
        .state
        .services
        .cart
        .get_cart(&CartOwner::User(user_id))
        .await
        .unwrap();
    assert_eq!(cart.items.len(), 1);
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn oversubscribed_stock_admits_only_what_fits() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", dec!(20.00), 3).await;
    let user_a = Uuid::new_v4();
    let user_b = Uuid::new_v4();

    // Both carts want 2, but only 3 are in stock.
    fill_cart(&app, user_a, lamp.id, 2).await;
    fill_cart(&app, user_b, lamp.id, 2).await;

    let first = app
        .state
        .services
        .checkout
        .place_order(place_order_input(user_a))
        .await;
    assert!(first.is_ok());

    let second = app
        .state
        .services
        .checkout
        .place_order(place_order_input(user_b))
        .await;
    assert_matches!(second.unwrap_err(), ServiceError::InsufficientStock(_));

    // Exactly one reservation fit; stock never went negative.
    let product = product::Entity::find_by_id(lamp.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 1);
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn empty_cart_cannot_check_out() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();

    let err = app
        .state
        .services
        .checkout
        .place_order(place_order_input(user_id))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(msg) => {
        assert!(msg.contains("empty"));
    });
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn guest_cart_merges_into_checkout() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", dec!(20.00), 10).await;
    let mug = app.seed_product("Coffee Mug", dec!(8.50), 10).await;
    let user_id = Uuid::new_v4();

    // User has a lamp; the guest session holds a mug.
    fill_cart(&app, user_id, lamp.id, 1).await;
    app.state
        .services
        .cart
        .add_item(
            &CartOwner::Guest("guest-77".to_string()),
            AddItemInput {
                product_id: mug.id,
                variant_key: None,
                quantity: 2,
            },
        )
        .await
        .unwrap();

    let mut input = place_order_input(user_id);
    input.guest_id = Some("guest-77".to_string());

    let placed = app.state.services.checkout.place_order(input).await.unwrap();

    assert_eq!(placed.items.len(), 2);
    // 20 + 2 x 8.50 = 37, below the threshold: flat shipping
    assert_eq!(placed.order.subtotal, dec!(37.00));
    assert_eq!(placed.order.shipping_total, dec!(5.99));

    // Guest cart consumed by the merge
    let guest_cart = Cart::find()
        .all(&*app.state.db)
        .await
        .unwrap()
        .into_iter()
        .find(|cart| cart.guest_id.as_deref() == Some("guest-77"));
    assert!(guest_cart.is_none());
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn snapshots_survive_catalog_edits() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", dec!(20.00), 10).await;
    let user_id = Uuid::new_v4();
    fill_cart(&app, user_id, lamp.id, 1).await;

    let placed = app
        .state
        .services
        .checkout
        .place_order(place_order_input(user_id))
        .await
        .unwrap();
    let snapshot = placed.items[0].clone();

    // Rename, reprice and archive the product after purchase.
    let mut active: product::ActiveModel = product::Entity::find_by_id(lamp.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap()
        .into();
    active.name = Set("Discontinued Lamp".to_string());
    active.price = Set(dec!(99.00));
    active.status = Set(product::ProductStatus::Archived);
    active.update(&*app.state.db).await.unwrap();

    let reloaded = OrderItem::find_by_id(snapshot.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.name, "Desk Lamp");
    assert_eq!(reloaded.unit_price, dec!(20.00));
    assert_eq!(reloaded.sku, snapshot.sku);
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn declined_payment_leaves_order_pending() {
    let app = TestApp::with_payment(Arc::new(DecliningPaymentProcessor)).await;
    let lamp = app.seed_product("Desk Lamp", dec!(20.00), 10).await;
    let user_id = Uuid::new_v4();
    fill_cart(&app, user_id, lamp.id, 1).await;

    let placed = app
        .state
        .services
        .checkout
        .place_order(place_order_input(user_id))
        .await
        .unwrap();

    assert_eq!(placed.order.status, OrderStatus::Pending);
    assert_eq!(placed.order.payment_status, PaymentStatus::Failed);
    assert!(placed.order.payment_transaction_id.is_none());

    // The order (and its reservation) still exists for retry or cancellation.
    let product = product::Entity::find_by_id(lamp.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 9);
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn refund_restores_stock_for_every_line() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", dec!(20.00), 10).await;
    let mug = app.seed_product("Coffee Mug", dec!(8.50), 10).await;
    let user_id = Uuid::new_v4();
    fill_cart(&app, user_id, lamp.id, 2).await;
    fill_cart(&app, user_id, mug.id, 1).await;

    let placed = app
        .state
        .services
        .checkout
        .place_order(place_order_input(user_id))
        .await
        .unwrap();

    // Walk the order to delivered.
    let orders = &app.state.services.orders;
    orders
        .update_status(placed.order.id, OrderStatus::Shipped, Some("TRK-1".into()))
        .await
        .unwrap();
    orders
        .update_status(placed.order.id, OrderStatus::Delivered, None)
        .await
        .unwrap();

    let refunded = app
        .state
        .services
        .checkout
        .refund_order(placed.order.id, None, "damaged in transit")
        .await
        .unwrap();

    assert_eq!(refunded.status, OrderStatus::Refunded);
    assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
    assert!(refunded.notes.as_deref().unwrap().contains("damaged in transit"));

    // Both products restocked by their ordered quantities.
    let lamp_row = product::Entity::find_by_id(lamp.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lamp_row.stock, 10);
    let mug_row = product::Entity::find_by_id(mug.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mug_row.stock, 10);
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn refund_requires_delivered_status() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", dec!(20.00), 10).await;
    let user_id = Uuid::new_v4();
    fill_cart(&app, user_id, lamp.id, 1).await;

    let placed = app
        .state
        .services
        .checkout
        .place_order(place_order_input(user_id))
        .await
        .unwrap();
    assert_eq!(placed.order.status, OrderStatus::Processing);

    let err = app
        .state
        .services
        .checkout
        .refund_order(placed.order.id, None, "buyer remorse")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    // No stock or status movement.
    let product = product::Entity::find_by_id(lamp.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 9);
    let order = Order::find_by_id(placed.order.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn failed_gateway_refund_rolls_everything_back() {
    let app = TestApp::with_payment(Arc::new(RefundFailingProcessor)).await;
    let lamp = app.seed_product("Desk Lamp", dec!(20.00), 10).await;
    let user_id = Uuid::new_v4();
    fill_cart(&app, user_id, lamp.id, 2).await;

    let placed = app
        .state
        .services
        .checkout
        .place_order(place_order_input(user_id))
        .await
        .unwrap();
    let orders = &app.state.services.orders;
    orders
        .update_status(placed.order.id, OrderStatus::Shipped, None)
        .await
        .unwrap();
    orders
        .update_status(placed.order.id, OrderStatus::Delivered, None)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .checkout
        .refund_order(placed.order.id, None, "gateway will fail")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ExternalServiceError(_));

    // The status change and the restock were not committed.
    let order = Order::find_by_id(placed.order.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);
    assert_eq!(order.payment_status, PaymentStatus::Paid);

    let product = product::Entity::find_by_id(lamp.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 8);
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn refund_amount_must_fit_the_order() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", dec!(20.00), 10).await;
    let user_id = Uuid::new_v4();
    fill_cart(&app, user_id, lamp.id, 1).await;

    let placed = app
        .state
        .services
        .checkout
        .place_order(place_order_input(user_id))
        .await
        .unwrap();
    let orders = &app.state.services.orders;
    orders
        .update_status(placed.order.id, OrderStatus::Shipped, None)
        .await
        .unwrap();
    orders
        .update_status(placed.order.id, OrderStatus::Delivered, None)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .checkout
        .refund_order(placed.order.id, Some(dec!(1000.00)), "too much")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn checkout_leaves_no_dangling_cart_items() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", dec!(20.00), 10).await;
    let user_id = Uuid::new_v4();
    fill_cart(&app, user_id, lamp.id, 1).await;

    app.state
        .services
        .checkout
        .place_order(place_order_input(user_id))
        .await
        .unwrap();

    let dangling = CartItem::find().count(&*app.state.db).await.unwrap();
    assert_eq!(dangling, 0);
}
