//! Request extractors for caller identity.
//!
//! Session mechanics are handled upstream of this service; callers identify
//! themselves with `x-user-id` (authenticated) or `x-guest-id` (anonymous)
//! headers, and admin calls carry `x-user-role: admin`.

use crate::{
    errors::{ApiError, ServiceError},
    services::carts::CartOwner,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const GUEST_ID_HEADER: &str = "x-guest-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// The cart owner for the current request: a user when `x-user-id` is
/// present, otherwise a guest session. Requests carrying neither are
/// rejected before any state is touched.
#[derive(Debug, Clone)]
pub struct OwnerRef(pub CartOwner);

#[async_trait]
impl<S> FromRequestParts<S> for OwnerRef
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(raw) = header_str(parts, USER_ID_HEADER) {
            let user_id = Uuid::parse_str(raw).map_err(|_| {
                ApiError::ValidationError(format!("{} must be a UUID", USER_ID_HEADER))
            })?;
            return Ok(OwnerRef(CartOwner::User(user_id)));
        }

        if let Some(guest_id) = header_str(parts, GUEST_ID_HEADER) {
            return Ok(OwnerRef(CartOwner::Guest(guest_id.to_string())));
        }

        Err(ApiError::ValidationError(
            "A user or guest identifier is required".to_string(),
        ))
    }
}

/// An authenticated user id, required for order endpoints.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = header_str(parts, USER_ID_HEADER).ok_or(ApiError::Unauthorized)?;
        let user_id = Uuid::parse_str(raw).map_err(|_| ApiError::Unauthorized)?;
        Ok(AuthenticatedUser(user_id))
    }
}

/// An administrator, required for back-office endpoints.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(user_id) =
            AuthenticatedUser::from_request_parts(parts, state).await?;

        match header_str(parts, USER_ROLE_HEADER) {
            Some(role) if role.eq_ignore_ascii_case("admin") => Ok(AdminUser(user_id)),
            _ => Err(ApiError::ServiceError(ServiceError::Forbidden(
                "Administrator role required".to_string(),
            ))),
        }
    }
}
