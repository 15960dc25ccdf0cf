use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    models::{NewOrder, Order, OrderItem, OrderStatus},
    ApiResponse, AppState,
};

/// One row of the status table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusEntry {
    #[schema(example = 4)]
    pub id: u8,
    #[schema(example = "REACHED HUB")]
    pub status: String,
}

impl From<OrderStatus> for StatusEntry {
    fn from(status: OrderStatus) -> Self {
        Self {
            id: status.id(),
            status: status.label().to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusListResponse {
    pub statuses: Vec<StatusEntry>,
}

impl From<Vec<OrderStatus>> for StatusListResponse {
    fn from(statuses: Vec<OrderStatus>) -> Self {
        Self {
            statuses: statuses.into_iter().map(StatusEntry::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            line_total: item.line_total(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub items: Vec<OrderItemResponse>,
    pub total_amount: Decimal,
    pub address: String,
    pub phone: String,
    pub status: OrderStatus,
    /// Numeric status id (1-7)
    pub status_id: u8,
    pub status_label: String,
    pub assigned_agent_id: Option<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            customer_id: order.customer_id,
            items: order.items.iter().map(OrderItemResponse::from).collect(),
            total_amount: order.total_amount,
            address: order.address,
            phone: order.phone,
            status: order.status,
            status_id: order.status.id(),
            status_label: order.status.label().to_string(),
            assigned_agent_id: order.assigned_agent_id,
            version: order.version,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: usize,
}

impl From<Vec<Order>> for OrderListResponse {
    fn from(orders: Vec<Order>) -> Self {
        let total = orders.len();
        Self {
            orders: orders.into_iter().map(OrderResponse::from).collect(),
            total,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderStatusResponse {
    pub order_id: Uuid,
    pub status: StatusEntry,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub order_id: Uuid,
    /// Target status id (1-7)
    #[schema(example = 2)]
    pub status_id: u8,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AssignAgentRequest {
    pub order_id: Uuid,
    pub agent_id: Uuid,
}

fn status_from_id(status_id: u8) -> Result<OrderStatus, ServiceError> {
    OrderStatus::from_id(status_id)
        .ok_or_else(|| ServiceError::BadRequest(format!("Unknown status id: {status_id}")))
}

/// Order routes, mounted under `/api/v1`
pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/statuses", get(list_statuses))
        .route("/orders/assigned", get(list_assigned_orders))
        .route("/orders/update-status", put(update_order_status))
        .route("/orders/assign-agent", post(assign_agent))
        .route("/orders/customer/{customer_id}", get(list_customer_orders))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/status", get(get_order_status))
        .route("/orders/{id}/next-statuses", get(get_next_statuses))
        .route("/orders/{id}/cancel", post(cancel_order))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Place order",
    description = "Place a new order for the authenticated customer. The order starts as PLACED with no delivery agent.",
    request_body = NewOrder,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<OrderResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid order data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Only customers can place orders", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<NewOrder>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .orders
        .place_order(&auth_user.requester(), payload)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(OrderResponse::from(order))),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    description = "All orders, newest first. Admin only.",
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<OrderListResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<OrderListResponse>>, ServiceError> {
    let orders = state.orders.list_orders(&auth_user.requester()).await?;
    Ok(Json(ApiResponse::success(orders.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.orders.get_order(&auth_user.requester(), id).await?;
    Ok(Json(ApiResponse::success(order.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/status",
    summary = "Get order status",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Current status", body = ApiResponse<OrderStatusResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<OrderStatusResponse>>, ServiceError> {
    let order = state.orders.get_order(&auth_user.requester(), id).await?;
    Ok(Json(ApiResponse::success(OrderStatusResponse {
        order_id: order.id,
        status: order.status.into(),
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/next-statuses",
    summary = "Selectable next statuses",
    description = "Statuses the caller may move this order to right now. Empty for terminal orders.",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Next statuses", body = ApiResponse<StatusListResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_next_statuses(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<StatusListResponse>>, ServiceError> {
    let statuses = state
        .orders
        .next_statuses(&auth_user.requester(), id)
        .await?;
    Ok(Json(ApiResponse::success(statuses.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/customer/{customer_id}",
    summary = "Customer order history",
    params(("customer_id" = Uuid, Path, description = "Customer ID")),
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<OrderListResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_customer_orders(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<OrderListResponse>>, ServiceError> {
    let orders = state
        .orders
        .orders_for_customer(&auth_user.requester(), customer_id)
        .await?;
    Ok(Json(ApiResponse::success(orders.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/assigned",
    summary = "Delivery agent work list",
    responses(
        (status = 200, description = "Orders assigned to the caller", body = ApiResponse<OrderListResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Caller is not a delivery agent", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_assigned_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<OrderListResponse>>, ServiceError> {
    let orders = state.orders.orders_for_agent(&auth_user.requester()).await?;
    Ok(Json(ApiResponse::success(orders.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/statuses",
    summary = "Status table",
    description = "All seven order statuses with their numeric ids",
    responses(
        (status = 200, description = "Status table", body = ApiResponse<StatusListResponse>),
    ),
    tag = "orders"
)]
pub async fn list_statuses() -> Json<ApiResponse<StatusListResponse>> {
    Json(ApiResponse::success(OrderStatus::all().into()))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/update-status",
    summary = "Update order status",
    description = "Move an order to another status. The lifecycle table is checked before the caller's role.",
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Unknown status id", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Caller may not make this change", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Invalid transition or concurrent modification", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let requested = status_from_id(payload.status_id)?;
    let order = state
        .orders
        .update_status(&auth_user.requester(), payload.order_id, requested)
        .await?;
    Ok(Json(ApiResponse::success(order.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/assign-agent",
    summary = "Assign delivery agent",
    description = "Assign or reassign the delivery agent of a non-terminal order. Admin only.",
    request_body = AssignAgentRequest,
    responses(
        (status = 200, description = "Agent assigned", body = ApiResponse<OrderResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is terminal or was modified concurrently", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn assign_agent(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<AssignAgentRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state
        .orders
        .assign_agent(&auth_user.requester(), payload.order_id, payload.agent_id)
        .await?;
    Ok(Json(ApiResponse::success(order.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    summary = "Cancel order",
    description = "Customer cancellation. Allowed while the order is PLACED, PROCESSED or SHIPPED.",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order canceled", body = ApiResponse<OrderResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Caller may not cancel this order", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is already terminal", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state
        .orders
        .cancel_order(&auth_user.requester(), id)
        .await?;
    Ok(Json(ApiResponse::success(order.into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn status_table_has_seven_rows_in_order() {
        let table = StatusListResponse::from(OrderStatus::all());
        let ids: Vec<u8> = table.statuses.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(table.statuses[4].status, "OUT FOR DELIVERY");
    }

    #[test]
    fn unknown_status_id_is_a_bad_request() {
        assert_eq!(status_from_id(6).unwrap(), OrderStatus::Delivered);
        assert_matches!(status_from_id(0), Err(ServiceError::BadRequest(_)));
        assert_matches!(status_from_id(8), Err(ServiceError::BadRequest(_)));
    }
}
