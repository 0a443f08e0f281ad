use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
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

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront Back Office API

Cart management, order placement, payment settlement, and invoicing.

## Authentication

All business endpoints require a bearer token:

```
Authorization: Bearer <your-jwt-token>
```

## Payment settlement

Settlement is pull-based: after the customer completes the gateway redirect
flow, the client calls `POST /payments/check-status` and the server queries
the gateway for the authoritative transaction state. The webhook endpoint
only acknowledges notifications; it never changes local state.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Orders", description = "Order placement and status management"),
        (name = "Cart", description = "Per-user shopping cart"),
        (name = "Payments", description = "Gateway initiation and reconciliation"),
        (name = "Invoices", description = "Invoice projection and email")
    ),
    paths(
        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::get_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::update_order_status,

        // Cart
        crate::handlers::carts::get_cart,
        crate::handlers::carts::set_cart_item,
        crate::handlers::carts::remove_cart_item,
        crate::handlers::carts::clear_cart,

        // Payments
        crate::handlers::payments::initiate_payment,
        crate::handlers::payments::check_status,
        crate::handlers::payment_webhooks::payment_webhook,

        // Invoices
        crate::handlers::invoices::get_invoice,
        crate::handlers::invoices::email_invoice,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::errors::ErrorResponse,

            // Order types
            crate::services::orders::PlaceOrderRequest,
            crate::services::orders::AddressInput,
            crate::services::orders::CheckoutItem,
            crate::services::orders::PlaceOrderResponse,
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderDetailView,
            crate::services::orders::InvoiceSummary,
            crate::services::orders::OrderView,
            crate::services::orders::OrderListResponse,
            crate::handlers::orders::UpdateOrderStatusRequest,
            crate::entities::order::OrderStatus,
            crate::entities::invoice::PaymentStatus,
            crate::entities::order_detail::LineItem,

            // Cart types
            crate::handlers::carts::SetCartItemRequest,
            crate::handlers::carts::RemoveCartItemRequest,

            // Payment types
            crate::handlers::payments::InitiatePaymentRequest,
            crate::handlers::payments::CheckStatusRequest,
            crate::services::payments::InitiatePaymentResponse,
            crate::services::payments::ReconcileResponse,

            // Invoice types
            crate::services::invoicing::InvoiceView,
            crate::services::invoicing::InvoiceLineView,
            crate::services::invoicing::EmailDispatch,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDocV1::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_generates() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Storefront API"));
        assert!(json.contains("/api/v1/orders"));
        assert!(json.contains("bearer_auth"));
    }
}
