use crate::handlers::common::{
    map_service_error, no_content_response, success_response, validate_input,
};
use crate::handlers::extract::{AuthenticatedUser, OwnerRef};
use crate::{errors::ApiError, services::carts::AddItemInput, AppState};
use axum::{
    extract::{Json, Path, State},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for cart endpoints
pub fn cart_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_item))
        .route("/items/:item_id", put(update_item).delete(remove_item))
        .route("/merge", post(merge_cart))
}

/// Get the caller's cart, creating it on first access
async fn get_cart(
    State(state): State<Arc<AppState>>,
    OwnerRef(owner): OwnerRef,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .get_cart(&owner)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Add an item to the caller's cart
async fn add_item(
    State(state): State<Arc<AppState>>,
    OwnerRef(owner): OwnerRef,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let input = AddItemInput {
        product_id: payload.product_id,
        variant_key: payload.variant_key,
        quantity: payload.quantity,
    };

    let cart = state
        .services
        .cart
        .add_item(&owner, input)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Update a cart line's quantity (zero removes the line)
async fn update_item(
    State(state): State<Arc<AppState>>,
    OwnerRef(owner): OwnerRef,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let cart = state
        .services
        .cart
        .update_item_quantity(&owner, item_id, payload.quantity)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Remove a line from the caller's cart
async fn remove_item(
    State(state): State<Arc<AppState>>,
    OwnerRef(owner): OwnerRef,
    Path(item_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    state
        .services
        .cart
        .remove_item(&owner, item_id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

/// Empty the caller's cart
async fn clear_cart(
    State(state): State<Arc<AppState>>,
    OwnerRef(owner): OwnerRef,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .clear(&owner)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Merge a guest cart into the authenticated user's cart
async fn merge_cart(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(payload): Json<MergeCartRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let cart = state
        .services
        .cart
        .merge_guest_cart(&payload.guest_id, user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

// Request DTOs

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub variant_key: Option<String>,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuantityRequest {
    #[validate(range(min = 0))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MergeCartRequest {
    #[validate(length(min = 1, message = "guest_id is required"))]
    pub guest_id: String,
}
