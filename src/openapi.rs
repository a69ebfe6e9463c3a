use axum::{response::Json, routing::get, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
# Storefront order fulfillment API

Checkout reserves stock, creates the order and starts a card charge in one unit of work.
The payment processor reports the charge outcome asynchronously through the signed webhook,
which marks the order paid or cancels it and returns its stock.

## Error Handling

Failures share one body shape:

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient stock: Insufficient stock for size M and color Red.",
  "request_id": "6f1c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

## Pagination

`GET /api/v1/orders` accepts `page` (default 1), `limit` (default 20, max 100),
`status` and `search`.
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Orders", description = "Checkout and order management"),
        (name = "Payments", description = "Gateway webhook and charge cancellation"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order,
        crate::handlers::payment_webhooks::payment_webhook,
        crate::handlers::payment_webhooks::cancel_charge,
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::ListQuery,
            crate::services::checkout::CreateOrderRequest,
            crate::services::checkout::CheckoutItem,
            crate::services::checkout::CheckoutResponse,
            crate::services::orders::OrderDetails,
            crate::services::orders::UpdateOrderRequest,
            crate::services::reconciliation::CancelChargeRequest,
            crate::services::reconciliation::CancelChargeResponse,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentStatus,
            crate::entities::order::ShippingAddress,
            crate::handlers::health::HealthResponse,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document at `/api-docs/openapi.json`
pub fn openapi_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDocV1::openapi()) }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_core_paths() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("/api/v1/orders"));
        assert!(json.contains("/api/v1/payments/webhook"));
        assert!(json.contains("/api/v1/payments/cancel"));
        assert!(json.contains("CheckoutResponse"));
    }
}
