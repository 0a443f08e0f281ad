use crate::auth::AuthenticatedUser;
use crate::errors::ServiceError;
use crate::services::invoicing::{EmailDispatch, InvoiceView};
use crate::{ApiResponse, AppState};
use axum::{
    extract::{Json, Path, State},
    routing::{get, post},
    Router,
};
use uuid::Uuid;

/// Creates the router for invoice projection endpoints. The email route is
/// addressed by order id, the view route by invoice id.
pub fn invoices_routes() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(get_invoice))
        .route("/{id}/email", post(email_invoice))
}

/// Render the human-readable invoice view
#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice view", body = ApiResponse<InvoiceView>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Invoices"
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<InvoiceView>>, ServiceError> {
    let view = state.services.invoicing.render(user.actor(), id).await?;
    Ok(Json(ApiResponse::success(view)))
}

/// Render the invoice for an order and email it to the orderer.
/// Dispatch failure is reported in the body, not as an HTTP error.
#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/email",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Dispatch outcome", body = ApiResponse<EmailDispatch>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Invoices"
)]
pub async fn email_invoice(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<EmailDispatch>>, ServiceError> {
    let dispatch = state
        .services
        .invoicing
        .send_by_email(user.actor(), order_id)
        .await?;
    Ok(Json(ApiResponse::success(dispatch)))
}
