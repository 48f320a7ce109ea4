use crate::handlers::common::{
    created_response, map_service_error, success_response, validate_input, PaginatedResponse,
};
use crate::handlers::extract::AdminUser;
use crate::{
    entities::product::{ProductStatus, VariantGroup},
    errors::ApiError,
    services::catalog::CreateProductInput,
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, patch},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for catalog endpoints
pub fn product_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", get(get_product))
        .route("/:id/stock", patch(set_stock))
}

/// List catalog products
async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProductListQuery>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let status = match query.status.as_deref() {
        None => None,
        Some("draft") => Some(ProductStatus::Draft),
        Some("active") => Some(ProductStatus::Active),
        Some("archived") => Some(ProductStatus::Archived),
        Some(other) => {
            return Err(ApiError::ValidationError(format!(
                "Unknown product status: {}",
                other
            )))
        }
    };

    let page = query.page.unwrap_or(1).max(1);
    let limit = state.config.clamp_page_size(query.limit);

    let (products, total) = state
        .services
        .catalog
        .list_products(status, page, limit)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(PaginatedResponse::new(
        products, total, page, limit,
    )))
}

/// Fetch a product by id
async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let product = state
        .services
        .catalog
        .get_product(product_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(product))
}

/// Create a catalog product (admin)
async fn create_product(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(payload): Json<CreateProductRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let input = CreateProductInput {
        name: payload.name,
        sku: payload.sku,
        slug: payload.slug,
        description: payload.description,
        price: payload.price,
        currency: payload.currency,
        stock: payload.stock,
        status: payload.status,
        variants: payload.variants,
    };

    let product = state
        .services
        .catalog
        .create_product(input)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(product))
}

/// Overwrite a product's stock level (admin)
async fn set_stock(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<SetStockRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let product = state
        .services
        .catalog
        .set_stock(product_id, payload.stock)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(product))
}

// Request DTOs

#[derive(Debug, Deserialize)]
pub struct ProductListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "sku is required"))]
    pub sku: String,
    #[validate(length(min = 1, message = "slug is required"))]
    pub slug: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: Option<String>,
    #[validate(range(min = 0))]
    pub stock: i32,
    pub status: Option<ProductStatus>,
    pub variants: Option<Vec<VariantGroup>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetStockRequest {
    #[validate(range(min = 0))]
    pub stock: i32,
}
