use axum::{response::Json, routing::get, Router};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::handlers::orders;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Order Lifecycle API",
        description = r#"
Tracks storefront orders from placement to delivery.

Statuses move one step at a time along
PLACED → PROCESSED → SHIPPED → REACHED HUB → OUT FOR DELIVERY → DELIVERED,
and any non-terminal order can be CANCELED. DELIVERED and CANCELED are final.

## Authentication

Every order endpoint except the status table needs an HS256 JWT:

```
Authorization: Bearer <your-jwt-token>
```

The `role` claim is one of `admin`, `agent` or `customer`.

## Errors

Failed requests return an `ErrorResponse`. Illegal transitions and stale
writes are `409 Conflict`; changes the caller's role does not allow are
`403 Forbidden`.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "orders", description = "Order placement, lookup and status changes")
    ),
    paths(
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        orders::get_order_status,
        orders::get_next_statuses,
        orders::list_customer_orders,
        orders::list_assigned_orders,
        orders::list_statuses,
        orders::update_order_status,
        orders::assign_agent,
        orders::cancel_order,
    ),
    components(
        schemas(
            crate::models::NewOrder,
            crate::models::NewOrderItem,
            crate::models::OrderStatus,
            orders::OrderResponse,
            orders::OrderItemResponse,
            orders::OrderListResponse,
            orders::OrderStatusResponse,
            orders::StatusEntry,
            orders::StatusListResponse,
            orders::UpdateOrderStatusRequest,
            orders::AssignAgentRequest,
            crate::errors::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}

/// Serves the generated document at `/api-docs/openapi.json`
pub fn openapi_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/api-docs/openapi.json", get(openapi_json))
}
