use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

use crate::{
    entities::order,
    errors::ServiceError,
    services::{
        checkout::{CheckoutResponse, CreateOrderRequest},
        orders::{parse_order_status, OrderDetails, OrderListFilter, UpdateOrderRequest},
    },
    ApiResponse, AppState, ListQuery, PaginatedResponse,
};

/// Place an order: reserve stock, create the order and start the card charge
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Create order",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created; complete payment with the client secret", body = ApiResponse<CheckoutResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown product, variant, size or customer", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway failure", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResponse>>), ServiceError> {
    let placed = state.checkout.place_order(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(placed))))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20, max: 100)"),
        ("search" = Option<String>, Query, description = "Matches order number or customer email"),
        ("status" = Option<String>, Query, description = "Processing, Completed or Cancelled"),
    ),
    responses(
        (status = 200, description = "Orders, newest first", body = ApiResponse<PaginatedResponse<order::Model>>),
        (status = 400, description = "Invalid query parameters", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<order::Model>>>, ServiceError> {
    let status = query
        .status
        .as_deref()
        .map(parse_order_status)
        .transpose()?;
    let limit = query.limit.clamp(1, 100);
    let page = query.page.max(1);

    let (items, total) = state
        .orders
        .list_orders(OrderListFilter {
            page,
            limit,
            status,
            search: query.search,
        })
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit,
        total_pages: total.div_ceil(limit),
    })))
}

/// Fetch one order by UUID or order number
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = String, Path, description = "Order UUID or order number, e.g. ORD-2024-00012")),
    responses(
        (status = 200, description = "Order with line items", body = ApiResponse<OrderDetails>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<OrderDetails>>, ServiceError> {
    let details = state.orders.get_order(&id).await?;
    Ok(Json(ApiResponse::success(details)))
}

/// Administrative update: status, payment status, delivery flag, transaction id
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}",
    params(("id" = String, Path, description = "Order UUID or order number")),
    request_body = UpdateOrderRequest,
    responses(
        (status = 200, description = "Updated order", body = ApiResponse<OrderDetails>),
        (status = 400, description = "Empty update or order already completed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateOrderRequest>,
) -> Result<Json<ApiResponse<OrderDetails>>, ServiceError> {
    let details = state.orders.update_order(&id, request).await?;
    Ok(Json(ApiResponse::success(details)))
}
