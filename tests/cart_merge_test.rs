mod common;

use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use storefront_api::{
    entities::Cart,
    services::carts::{AddItemInput, CartOwner},
};
use uuid::Uuid;

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn merge_sums_matching_lines_and_appends_the_rest() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", dec!(20.00), 20).await;
    let mug = app.seed_product("Coffee Mug", dec!(8.50), 20).await;

    let user_id = Uuid::new_v4();
    let user_owner = CartOwner::User(user_id);
    let guest_owner = CartOwner::Guest("guest-session-9".to_string());
    let cart_service = &app.state.services.cart;

    // User already has 1 lamp; guest has 2 lamps and a mug.
    cart_service
        .add_item(
            &user_owner,
            AddItemInput {
                product_id: lamp.id,
                variant_key: None,
                quantity: 1,
            },
        )
        .await
        .unwrap();
    cart_service
        .add_item(
            &guest_owner,
            AddItemInput {
                product_id: lamp.id,
                variant_key: None,
                quantity: 2,
            },
        )
        .await
        .unwrap();
    let guest_cart = cart_service
        .add_item(
            &guest_owner,
            AddItemInput {
                product_id: mug.id,
                variant_key: None,
                quantity: 1,
            },
        )
        .await
        .unwrap();

    let merged = cart_service
        .merge_guest_cart("guest-session-9", user_id)
        .await
        .unwrap();

    assert_eq!(merged.items.len(), 2);
    let lamp_line = merged
        .items
        .iter()
        .find(|item| item.product_id == lamp.id)
        .unwrap();
    assert_eq!(lamp_line.quantity, 3);
    let mug_line = merged
        .items
        .iter()
        .find(|item| item.product_id == mug.id)
        .unwrap();
    assert_eq!(mug_line.quantity, 1);
    // Totals recomputed over the merged lines: 3x20 + 8.50 = 68.50, free shipping
    assert_eq!(merged.cart.subtotal, dec!(68.50));
    assert_eq!(
        merged.cart.total,
        merged.cart.subtotal - merged.cart.discount_total
            + merged.cart.tax_total
            + merged.cart.shipping_total
    );

    // The guest cart is gone.
    let guest_row = Cart::find_by_id(guest_cart.cart.id)
        .one(&*app.state.db)
        .await
        .unwrap();
    assert!(guest_row.is_none());
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn merge_is_idempotent_once_guest_cart_is_gone() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", dec!(20.00), 20).await;

    let user_id = Uuid::new_v4();
    let guest_owner = CartOwner::Guest("guest-session-10".to_string());
    let cart_service = &app.state.services.cart;

    cart_service
        .add_item(
            &guest_owner,
            AddItemInput {
                product_id: lamp.id,
                variant_key: None,
                quantity: 2,
            },
        )
        .await
        .unwrap();

    let first = cart_service
        .merge_guest_cart("guest-session-10", user_id)
        .await
        .unwrap();
    assert_eq!(first.items.len(), 1);
    assert_eq!(first.items[0].quantity, 2);

    // Retry after the guest cart was consumed: a no-op, no duplicated lines.
    let second = cart_service
        .merge_guest_cart("guest-session-10", user_id)
        .await
        .unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].quantity, 2);
    assert_eq!(second.cart.subtotal, first.cart.subtotal);
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn merge_with_no_guest_cart_creates_empty_user_cart() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();

    let merged = app
        .state
        .services
        .cart
        .merge_guest_cart("never-existed", user_id)
        .await
        .unwrap();

    assert!(merged.items.is_empty());
    assert_eq!(merged.cart.user_id, Some(user_id));
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn merged_lines_keep_their_variant_identity() {
    let app = TestApp::new().await;
    let variants = vec![storefront_api::entities::product::VariantGroup {
        name: "Size".to_string(),
        options: vec![
            storefront_api::entities::product::VariantOption {
                name: "Small".to_string(),
                price_adjustment: rust_decimal::Decimal::ZERO,
                sku_suffix: None,
            },
            storefront_api::entities::product::VariantOption {
                name: "Large".to_string(),
                price_adjustment: dec!(4.50),
                sku_suffix: None,
            },
        ],
    }];
    let tote = app
        .seed_product_with(
            "Canvas Tote",
            dec!(25.00),
            20,
            storefront_api::entities::product::ProductStatus::Active,
            Some(variants),
        )
        .await;

    let user_id = Uuid::new_v4();
    let user_owner = CartOwner::User(user_id);
    let guest_owner = CartOwner::Guest("guest-session-11".to_string());
    let cart_service = &app.state.services.cart;

    // Same product, different variants: these must NOT merge into one line.
    cart_service
        .add_item(
            &user_owner,
            AddItemInput {
                product_id: tote.id,
                variant_key: Some("Size:Small".to_string()),
                quantity: 1,
            },
        )
        .await
        .unwrap();
    cart_service
        .add_item(
            &guest_owner,
            AddItemInput {
                product_id: tote.id,
                variant_key: Some("Size:Large".to_string()),
                quantity: 1,
            },
        )
        .await
        .unwrap();

    let merged = cart_service
        .merge_guest_cart("guest-session-11", user_id)
        .await
        .unwrap();

    assert_eq!(merged.items.len(), 2);
    let keys: Vec<_> = merged
        .items
        .iter()
        .map(|item| item.variant_key.clone())
        .collect();
    assert!(keys.contains(&Some("Size:Small".to_string())));
    assert!(keys.contains(&Some("Size:Large".to_string())));
}
