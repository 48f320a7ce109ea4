pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod orders;
pub mod payments;

use crate::{config::AppConfig, db::DbPool, events::EventSender};
use std::sync::Arc;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<catalog::CatalogService>,
    pub cart: Arc<carts::CartService>,
    pub checkout: Arc<checkout::CheckoutService>,
    pub orders: Arc<orders::OrderService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        payment_processor: Arc<dyn payments::PaymentProcessor>,
    ) -> Self {
        let catalog = Arc::new(catalog::CatalogService::new(db_pool.clone()));
        let cart = Arc::new(carts::CartService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.clone(),
        ));
        let orders = Arc::new(orders::OrderService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let checkout = Arc::new(checkout::CheckoutService::new(
            db_pool,
            event_sender,
            config,
            cart.clone(),
            payment_processor,
        ));

        Self {
            catalog,
            cart,
            checkout,
            orders,
        }
    }
}
