use crate::auth::AuthenticatedUser;
use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;
use crate::handlers::common::PaginationParams;
use crate::services::orders::{
    OrderListResponse, OrderResponse, OrderView, PlaceOrderRequest, PlaceOrderResponse,
};
use crate::{AppState, ApiResponse};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Creates the router for order endpoints
pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/{id}", get(get_order))
        .route("/{id}/status", patch(update_order_status))
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

/// Place an order from the checkout payload
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = PlaceOrderRequest,
    responses(
        (status = 200, description = "Order placed", body = ApiResponse<PlaceOrderResponse>),
        (status = 400, description = "Validation failed", body = crate::errors::ErrorResponse),
        (status = 500, description = "Persistence failed after compensation", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<Json<ApiResponse<PlaceOrderResponse>>, ServiceError> {
    let response = state
        .services
        .order
        .place_order(user.actor(), request)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Joined order view; `detail` is null while a checkout is still settling
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order detail", body = ApiResponse<OrderView>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<OrderView>>, ServiceError> {
    let view = state.services.order.get_order(user.actor(), id).await?;
    Ok(Json(ApiResponse::success(view)))
}

/// List orders (admins see all, customers their own)
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "Order list", body = ApiResponse<OrderListResponse>)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<OrderListResponse>>, ServiceError> {
    let list = state
        .services
        .order
        .list_orders(user.actor(), pagination.page, pagination.per_page)
        .await?;
    Ok(Json(ApiResponse::success(list)))
}

/// Admin-only status transition following the forward-only graph
#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Illegal transition", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not an administrator", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let updated = state
        .services
        .order_status
        .update_status(user.actor(), id, request.status)
        .await?;

    Ok(Json(ApiResponse::success(OrderResponse {
        id: updated.id,
        order_number: updated.order_number,
        user_id: updated.user_id,
        status: updated.status,
        order_date: updated.order_date,
        delivery_date: updated.delivery_date,
        total_amount: updated.total_amount,
        total_weight: updated.total_weight,
        is_paid: updated.is_paid,
        created_at: updated.created_at,
        updated_at: updated.updated_at,
        version: updated.version,
    })))
}
