// Shared across several test binaries; not every binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use storefront_api::{
    config::AppConfig,
    db,
    entities::order::{self, Address, ContactInfo, OrderStatus, PaymentStatus},
    entities::product::{Model as ProductModel, ProductStatus, VariantGroup},
    errors::ServiceError,
    events,
    services::catalog::CreateProductInput,
    services::payments::{DemoPaymentProcessor, PaymentOutcome, PaymentProcessor},
    AppState,
};
use uuid::Uuid;

/// Helper harness for spinning up an application state backed by a
/// throwaway SQLite database.
pub struct TestApp {
    pub state: Arc<AppState>,
    db_path: std::path::PathBuf,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_payment(Arc::new(DemoPaymentProcessor)).await
    }

    /// Construct a test application with a specific payment processor.
    pub async fn with_payment(payment: Arc<dyn PaymentProcessor>) -> Self {
        let db_path =
            std::env::temp_dir().join(format!("storefront_test_{}.db", Uuid::new_v4().simple()));

        let mut cfg = AppConfig::default();
        cfg.database_url = format!("sqlite://{}?mode=rwc", db_path.display());
        cfg.environment = "test".to_string();
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = events::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = Arc::new(AppState::new(
            Arc::new(pool),
            Arc::new(cfg),
            event_sender,
            payment,
        ));

        Self {
            state,
            db_path,
            _event_task: event_task,
        }
    }

    /// Seed an active catalog product.
    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> ProductModel {
        self.seed_product_with(name, price, stock, ProductStatus::Active, None)
            .await
    }

    /// Seed a catalog product with full control over status and variants.
    pub async fn seed_product_with(
        &self,
        name: &str,
        price: Decimal,
        stock: i32,
        status: ProductStatus,
        variants: Option<Vec<VariantGroup>>,
    ) -> ProductModel {
        let suffix = Uuid::new_v4().simple().to_string();
        self.state
            .services
            .catalog
            .create_product(CreateProductInput {
                name: name.to_string(),
                sku: format!("SKU-{}", suffix),
                slug: format!("{}-{}", name.to_lowercase().replace(' ', "-"), suffix),
                description: Some("Seeded for integration tests".to_string()),
                price,
                currency: Some("USD".to_string()),
                stock,
                status: Some(status),
                variants,
            })
            .await
            .expect("seed product for tests")
    }

    /// Insert an order directly, bypassing checkout, for store-level tests.
    pub async fn seed_order(&self, user_id: Uuid, status: OrderStatus) -> order::Model {
        let now = Utc::now();
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(format!(
                "ORD{}",
                &Uuid::new_v4().simple().to_string()[..10]
            )),
            user_id: Set(user_id),
            status: Set(status),
            currency: Set("USD".to_string()),
            subtotal: Set(Decimal::new(4000, 2)),
            shipping_total: Set(Decimal::new(599, 2)),
            tax_total: Set(Decimal::new(400, 2)),
            discount_total: Set(Decimal::ZERO),
            grand_total: Set(Decimal::new(4999, 2)),
            payment_provider: Set("demo".to_string()),
            payment_status: Set(PaymentStatus::Paid),
            payment_intent_id: Set(None),
            payment_charge_id: Set(None),
            payment_transaction_id: Set(Some("demo_txn".to_string())),
            payment_amount: Set(Decimal::new(4999, 2)),
            shipping_method: Set("standard".to_string()),
            shipping_address: Set(serde_json::to_value(sample_address()).unwrap()),
            billing_address: Set(None),
            contact_info: Set(serde_json::to_value(sample_contact()).unwrap()),
            notes: Set(None),
            tracking_number: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };
        order
            .insert(&*self.state.db)
            .await
            .expect("seed order for tests")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
        let _ = std::fs::remove_file(&self.db_path);
        for suffix in ["-wal", "-shm"] {
            let mut sidecar = self.db_path.clone().into_os_string();
            sidecar.push(suffix);
            let _ = std::fs::remove_file(sidecar);
        }
    }
}

pub fn sample_address() -> Address {
    Address {
        first_name: "Jordan".to_string(),
        last_name: "Reyes".to_string(),
        line1: "42 Harbor Street".to_string(),
        line2: None,
        city: "Portland".to_string(),
        region: "OR".to_string(),
        postal_code: "97201".to_string(),
        country_code: "US".to_string(),
        phone: None,
    }
}

pub fn sample_contact() -> ContactInfo {
    ContactInfo {
        email: "jordan@example.com".to_string(),
        phone: Some("+1-555-0100".to_string()),
    }
}

/// A gateway that declines every capture, for payment-failure paths.
#[derive(Debug, Default)]
pub struct DecliningPaymentProcessor;

#[async_trait]
impl PaymentProcessor for DecliningPaymentProcessor {
    fn provider(&self) -> &str {
        "demo"
    }

    async fn process_payment(
        &self,
        _order_id: Uuid,
        _amount: Decimal,
        _method: &str,
    ) -> Result<PaymentOutcome, ServiceError> {
        Ok(PaymentOutcome {
            success: false,
            transaction_id: None,
            message: "card declined".to_string(),
        })
    }

    async fn create_refund(&self, _order_id: Uuid, _amount: Decimal) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// A gateway whose refund call always errors, for refund-atomicity tests.
#[derive(Debug, Default)]
pub struct RefundFailingProcessor;

#[async_trait]
impl PaymentProcessor for RefundFailingProcessor {
    fn provider(&self) -> &str {
        "demo"
    }

    async fn process_payment(
        &self,
        _order_id: Uuid,
        _amount: Decimal,
        _method: &str,
    ) -> Result<PaymentOutcome, ServiceError> {
        Ok(PaymentOutcome {
            success: true,
            transaction_id: Some("txn_ok".to_string()),
            message: "Payment captured".to_string(),
        })
    }

    async fn create_refund(&self, _order_id: Uuid, _amount: Decimal) -> Result<(), ServiceError> {
        Err(ServiceError::ExternalServiceError(
            "gateway timeout".to_string(),
        ))
    }
}
