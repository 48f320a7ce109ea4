pub mod carts;
pub mod common;
pub mod extract;
pub mod health;
pub mod orders;
pub mod products;

use crate::AppState;
use axum::Router;
use std::sync::Arc;

/// Composes the full `/api` surface.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/cart", carts::cart_routes())
        .nest("/orders", orders::order_routes())
        .nest("/products", products::product_routes())
}
