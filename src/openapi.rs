use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
# Storefront Commerce API

Cart management, checkout orchestration, and order lifecycle for an
e-commerce store.

## Identity

Session handling lives upstream; requests identify their caller with the
`x-user-id` header (authenticated) or `x-guest-id` (anonymous session).
Admin endpoints additionally require `x-user-role: admin`.

## Error Handling

Errors are structured JSON with a stable machine-checkable `code` plus a
human-readable `message`:

```json
{
  "error": "Bad Request",
  "code": "insufficient_stock",
  "message": "Insufficient stock for product Canvas Tote",
  "request_id": "req-abc123",
  "timestamp": "2025-07-01T10:30:00Z"
}
```

## Pagination

List endpoints accept `page` and `limit` query parameters and return
`total`, `total_pages`, `has_next_page`, and `has_prev_page`.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080/api", description = "Local development")
    ),
    tags(
        (name = "Cart", description = "Cart management endpoints"),
        (name = "Orders", description = "Checkout and order lifecycle endpoints"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Health", description = "Health check endpoints")
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::entities::order::Address,
            crate::entities::order::ContactInfo,
        )
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
