use crate::auth::{auth_middleware, AuthService, AuthenticatedUser};
use crate::errors::ServiceError;
use crate::services::payments::{InitiatePaymentResponse, ReconcileResponse};
use crate::{ApiResponse, AppState};
use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Creates the router for payment endpoints. The webhook ack sits outside
/// the bearer layer: the gateway signs it, it is never a write path.
pub fn payments_routes(auth_service: Arc<AuthService>) -> Router<AppState> {
    Router::new()
        .route("/initiate", post(initiate_payment))
        .route("/check-status", post(check_status))
        .layer(axum::middleware::from_fn_with_state(
            auth_service,
            auth_middleware,
        ))
        .route(
            "/webhook",
            post(crate::handlers::payment_webhooks::payment_webhook),
        )
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct InitiatePaymentRequest {
    pub order_detail_id: Uuid,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CheckStatusRequest {
    pub invoice_id: Uuid,
    pub order_id: Uuid,
    /// The invoice creation timestamp echoed back from the initiate call;
    /// rebuilds the deterministic gateway reference.
    pub initiated_at: DateTime<Utc>,
}

/// Register a gateway transaction and return the client token
#[utoipa::path(
    post,
    path = "/api/v1/payments/initiate",
    request_body = InitiatePaymentRequest,
    responses(
        (status = 200, description = "Gateway token", body = ApiResponse<InitiatePaymentResponse>),
        (status = 404, description = "Record chain broken", body = crate::errors::ErrorResponse),
        (status = 503, description = "Gateway unavailable", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn initiate_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<InitiatePaymentRequest>,
) -> Result<Json<ApiResponse<InitiatePaymentResponse>>, ServiceError> {
    let response = state
        .services
        .payments
        .initiate_payment(user.actor(), request.order_detail_id)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Pull the authoritative gateway status and reconcile invoice + order
#[utoipa::path(
    post,
    path = "/api/v1/payments/check-status",
    request_body = CheckStatusRequest,
    responses(
        (status = 200, description = "Reconciled status", body = ApiResponse<ReconcileResponse>),
        (status = 404, description = "Gateway has no such transaction", body = crate::errors::ErrorResponse),
        (status = 503, description = "Gateway unavailable, retry later", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn check_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CheckStatusRequest>,
) -> Result<Json<ApiResponse<ReconcileResponse>>, ServiceError> {
    let response = state
        .services
        .payments
        .check_status(
            user.actor(),
            request.invoice_id,
            request.order_id,
            request.initiated_at,
        )
        .await?;
    Ok(Json(ApiResponse::success(response)))
}
