use crate::handlers::common::{
    created_response, map_service_error, success_response, validate_input,
};
use crate::handlers::extract::{AdminUser, AuthenticatedUser};
use crate::{
    entities::order::{Address, ContactInfo, OrderStatus},
    errors::{ApiError, ServiceError},
    services::checkout::PlaceOrderInput,
    services::orders::OrderListFilter,
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, patch, post},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for order endpoints
pub fn order_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_order).get(list_all_orders))
        .route("/my-orders", get(my_orders))
        .route("/:id", get(get_order))
        .route("/:id/refund", post(refund_order))
        .route("/:id/status", patch(update_order_status))
}

/// Place an order from the caller's cart
async fn create_order(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let input = PlaceOrderInput {
        user_id,
        guest_id: payload.guest_id,
        shipping_address: payload.shipping_address,
        billing_address: payload.billing_address,
        contact_info: payload.contact_info,
        shipping_method: payload.shipping_method,
        payment_method: payload.payment_method,
        notes: payload.notes,
    };

    let placed = state
        .services
        .checkout
        .place_order(input)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(placed))
}

/// List the caller's orders
async fn my_orders(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Query(query): Query<OrderListQuery>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let filter = OrderListFilter {
        user_id: Some(user_id),
        status: parse_status_filter(query.status.as_deref())?,
    };
    let limit = state.config.clamp_page_size(query.limit);

    let page = state
        .services
        .orders
        .list_orders(filter, query.page.unwrap_or(1), limit)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(page))
}

/// List all orders (admin)
async fn list_all_orders(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(query): Query<AdminOrderListQuery>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let filter = OrderListFilter {
        user_id: query.user_id,
        status: parse_status_filter(query.status.as_deref())?,
    };
    let limit = state.config.clamp_page_size(query.limit);

    let page = state
        .services
        .orders
        .list_orders(filter, query.page.unwrap_or(1), limit)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(page))
}

/// Fetch one of the caller's orders
async fn get_order(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .get_order_for_user(order_id, user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

/// Refund a delivered order (admin)
async fn refund_order(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<RefundOrderRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let order = state
        .services
        .checkout
        .refund_order(order_id, payload.amount, &payload.reason)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

/// Move an order to a new status (admin)
async fn update_order_status(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let status = OrderStatus::parse(&payload.status).ok_or_else(|| {
        ApiError::ServiceError(ServiceError::InvalidStatus(format!(
            "Unknown order status: {}",
            payload.status
        )))
    })?;

    let order = state
        .services
        .orders
        .update_status(order_id, status, payload.tracking_number)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

fn parse_status_filter(raw: Option<&str>) -> Result<Option<OrderStatus>, ApiError> {
    match raw {
        None => Ok(None),
        Some(value) => OrderStatus::parse(value).map(Some).ok_or_else(|| {
            ApiError::ValidationError(format!("Unknown order status: {}", value))
        }),
    }
}

// Request DTOs

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate]
    pub shipping_address: Address,
    #[validate]
    pub billing_address: Option<Address>,
    #[validate]
    pub contact_info: ContactInfo,
    #[validate(length(min = 1, message = "shipping_method is required"))]
    pub shipping_method: String,
    #[validate(length(min = 1, message = "payment_method is required"))]
    pub payment_method: String,
    pub notes: Option<String>,
    pub guest_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminOrderListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<String>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefundOrderRequest {
    pub amount: Option<Decimal>,
    #[validate(length(min = 1, message = "A refund reason is required"))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateOrderStatusRequest {
    #[validate(length(min = 1, message = "status is required"))]
    pub status: String,
    pub tracking_number: Option<String>,
}
