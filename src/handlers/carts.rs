use crate::auth::AuthenticatedUser;
use crate::errors::ServiceError;
use crate::services::carts::CartState;
use crate::{AppState, ApiResponse};
use axum::{
    extract::{Json, State},
    routing::{delete, get, put},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Creates the router for cart endpoints. The cart is addressed implicitly
/// through the authenticated user; there is no cart id.
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).put(set_cart_item).delete(clear_cart))
        .route("/item", delete(remove_cart_item))
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SetCartItemRequest {
    pub product_id: Uuid,
    pub size: String,
    /// Absolute quantity; zero removes the line.
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct RemoveCartItemRequest {
    pub product_id: Uuid,
    pub size: String,
}

/// Read the caller's cart
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses((status = 200, description = "Cart document", body = ApiResponse<serde_json::Value>)),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<CartState>>, ServiceError> {
    let cart = state.services.cart.get_cart(user.user_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Set the absolute quantity of a product+size line
#[utoipa::path(
    put,
    path = "/api/v1/cart",
    request_body = SetCartItemRequest,
    responses((status = 200, description = "Updated cart document", body = ApiResponse<serde_json::Value>)),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn set_cart_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<SetCartItemRequest>,
) -> Result<Json<ApiResponse<CartState>>, ServiceError> {
    let cart = state
        .services
        .cart
        .set_item(user.user_id, payload.product_id, payload.size, payload.quantity)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Remove one product+size line (same as setting quantity zero)
#[utoipa::path(
    delete,
    path = "/api/v1/cart/item",
    request_body = RemoveCartItemRequest,
    responses((status = 200, description = "Updated cart document", body = ApiResponse<serde_json::Value>)),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<RemoveCartItemRequest>,
) -> Result<Json<ApiResponse<CartState>>, ServiceError> {
    let cart = state
        .services
        .cart
        .set_item(user.user_id, payload.product_id, payload.size, 0)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Clear the caller's cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    responses((status = 200, description = "Cart cleared", body = ApiResponse<serde_json::Value>)),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<serde_json::Value>>, ServiceError> {
    state.services.cart.clear_cart(user.user_id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "Cart cleared"
    }))))
}
