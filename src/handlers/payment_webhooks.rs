use axum::{extract::State, http::HeaderMap, response::Json};
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::error;

use crate::{
    errors::ServiceError,
    payments::SIGNATURE_HEADER,
    services::reconciliation::{CancelChargeRequest, CancelChargeResponse},
    ApiResponse, AppState,
};

// POST /api/v1/payments/webhook
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body(content = String, description = "Raw signed event body", content_type = "application/json"),
    params(("Stripe-Signature" = String, Header, description = "t=<timestamp>,v1=<hex hmac>")),
    responses(
        (status = 200, description = "Event received"),
        (status = 400, description = "Invalid signature or payload", body = crate::errors::ErrorResponse),
        (status = 500, description = "Processing failed; the gateway should retry", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match state.reconciliation.handle_event(&body, signature).await {
        Ok(_) => Ok(Json(json!({ "received": true }))),
        Err(e @ (ServiceError::InvalidSignature(_) | ServiceError::ValidationError(_))) => Err(e),
        Err(e) => {
            error!(error = %e, transient = e.is_transient(), "Gateway event processing failed");
            Err(ServiceError::InternalError(
                "webhook processing failed".to_string(),
            ))
        }
    }
}

// POST /api/v1/payments/cancel
#[utoipa::path(
    post,
    path = "/api/v1/payments/cancel",
    request_body = CancelChargeRequest,
    responses(
        (status = 200, description = "Charge cancelled and stock returned", body = ApiResponse<CancelChargeResponse>),
        (status = 400, description = "Order or charge can no longer be cancelled", body = crate::errors::ErrorResponse),
        (status = 404, description = "No order for this charge", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn cancel_charge(
    State(state): State<AppState>,
    Json(request): Json<CancelChargeRequest>,
) -> Result<Json<ApiResponse<CancelChargeResponse>>, ServiceError> {
    let cancelled = state.reconciliation.cancel_charge(request).await?;
    Ok(Json(ApiResponse::success(cancelled)))
}
