use crate::{
    entities::product::{self, Entity as Product, Model as ProductModel, ProductStatus, VariantGroup},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Catalog reader consumed by the cart and checkout services.
///
/// Reads are plain lookups; the only writes are the stock mutations, which
/// are expressed as conditional updates at the storage layer so concurrent
/// checkouts can never drive stock negative.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Fetches a product by id.
    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Lists products, optionally filtered by status, newest first.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        status: Option<ProductStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<ProductModel>, u64), ServiceError> {
        let mut query = Product::find().order_by_desc(product::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(product::Column::Status.eq(status));
        }

        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((data, total))
    }

    /// Creates a catalog product (admin surface).
    #[instrument(skip(self, input))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        let existing = Product::find()
            .filter(
                Condition::any()
                    .add(product::Column::Sku.eq(input.sku.clone()))
                    .add(product::Column::Slug.eq(input.slug.clone())),
            )
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "A product with SKU {} or slug {} already exists",
                input.sku, input.slug
            )));
        }

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            sku: Set(input.sku),
            slug: Set(input.slug),
            description: Set(input.description.unwrap_or_default()),
            price: Set(input.price),
            currency: Set(input.currency.unwrap_or_else(|| "USD".to_string())),
            stock: Set(input.stock),
            status: Set(input.status.unwrap_or(ProductStatus::Active)),
            variants: Set(serde_json::to_value(input.variants.unwrap_or_default())
                .unwrap_or_else(|_| serde_json::json!([]))),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&*self.db).await?;
        info!("Created product {} ({})", created.id, created.sku);
        Ok(created)
    }

    /// Overwrites a product's stock level (admin surface).
    #[instrument(skip(self))]
    pub async fn set_stock(
        &self,
        product_id: Uuid,
        stock: i32,
    ) -> Result<ProductModel, ServiceError> {
        if stock < 0 {
            return Err(ServiceError::ValidationError(
                "Stock cannot be negative".to_string(),
            ));
        }

        let product = self.get_product(product_id).await?;
        let mut active: product::ActiveModel = product.into();
        active.stock = Set(stock);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    /// Reserves stock: `UPDATE products SET stock = stock - qty WHERE id = ?
    /// AND stock >= qty`. Zero rows touched means another checkout got there
    /// first; the caller's transaction aborts with `InsufficientStock`.
    pub async fn decrement_stock<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        quantity: i32,
        product_name: &str,
    ) -> Result<(), ServiceError> {
        let result = Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::Stock.gte(quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "Insufficient stock for product {}",
                product_name
            )));
        }
        Ok(())
    }

    /// Restores stock after a refund: the inverse of [`Self::decrement_stock`].
    pub async fn increment_stock<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).add(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .exec(conn)
            .await?;
        Ok(())
    }
}

/// Input for creating a product
#[derive(Debug, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    pub sku: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: Option<String>,
    pub stock: i32,
    pub status: Option<ProductStatus>,
    pub variants: Option<Vec<VariantGroup>>,
}
