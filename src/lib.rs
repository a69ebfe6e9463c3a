//! Storefront order fulfillment and payment reconciliation.
//!
//! Checkout reserves stock, records the order and starts a card charge inside one database
//! transaction; signed gateway events later mark the order paid or cancel it and return stock.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod payments;
pub mod retry;
pub mod services;
pub mod tracing;
pub mod webhooks;

use axum::{
    routing::{get, post},
    Router,
};
use chrono::Utc;
use redis::aio::ConnectionManager;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use notifications::EmailSender;
use payments::PaymentGateway;
use services::{
    checkout::CheckoutOrchestrator, customers::CustomerResolver, inventory::InventoryLedger,
    orders::OrderService, reconciliation::PaymentReconciliationHandler,
};
use webhooks::WebhookEventLedger;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub checkout: CheckoutOrchestrator,
    pub reconciliation: PaymentReconciliationHandler,
    pub orders: OrderService,
    pub redis: Option<ConnectionManager>,
}

impl AppState {
    /// Wires every service onto shared handles. `redis` enables the webhook event ledger.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        gateway: Arc<dyn PaymentGateway>,
        email_sender: Arc<dyn EmailSender>,
        redis: Option<ConnectionManager>,
    ) -> Self {
        let ledger = InventoryLedger::new();
        let checkout = CheckoutOrchestrator::new(
            db.clone(),
            ledger,
            CustomerResolver::new(email_sender),
            gateway.clone(),
            config.currency.clone(),
        );
        let reconciliation = PaymentReconciliationHandler::new(
            db.clone(),
            ledger,
            gateway,
            config.payment_webhook_secret.clone(),
            config.webhook_tolerance(),
        )
        .with_event_ledger(redis.clone().map(WebhookEventLedger::new));
        let orders = OrderService::new(db.clone(), ledger);

        Self {
            db,
            config,
            checkout,
            reconciliation,
            orders,
            redis,
        }
    }
}

// Common query parameters for list endpoints
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub search: Option<String>,
    /// Order status filter
    pub status: Option<String>,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

// Common response wrappers
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Versioned API: checkout, order administration and payment callbacks
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/orders",
            post(handlers::orders::create_order).get(handlers::orders::list_orders),
        )
        .route(
            "/orders/:id",
            get(handlers::orders::get_order).put(handlers::orders::update_order),
        )
        .route(
            "/payments/webhook",
            post(handlers::payment_webhooks::payment_webhook),
        )
        .route(
            "/payments/cancel",
            post(handlers::payment_webhooks::cancel_charge),
        )
}

/// Full application router without the outer middleware stack
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "storefront-api up" }))
        .merge(handlers::health::health_routes())
        .merge(openapi::openapi_routes())
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
}
