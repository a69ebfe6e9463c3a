use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::Serialize;
use std::time::Instant;
use utoipa::ToSchema;

use crate::AppState;

/// Component health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
    Degraded,
}

/// Individual component health details
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthDetails {
    pub database: ComponentHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub version: String,
    pub timestamp: String,
    pub details: HealthDetails,
    pub response_time_ms: u64,
}

fn component<E: std::fmt::Display>(result: Result<(), E>, started: Instant) -> ComponentHealth {
    let latency_ms = Some(started.elapsed().as_millis() as u64);
    match result {
        Ok(()) => ComponentHealth {
            status: ComponentStatus::Up,
            message: "Connection successful".to_string(),
            latency_ms,
        },
        Err(e) => ComponentHealth {
            status: ComponentStatus::Down,
            message: format!("Connection failed: {e}"),
            latency_ms,
        },
    }
}

/// Pings the database and, when configured, Redis.
/// The database is critical; a Redis outage only degrades the service.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up or degraded", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = Instant::now();

    let db_start = Instant::now();
    let database = component(crate::db::check_connection(&state.db).await, db_start);

    let redis = match &state.redis {
        Some(conn) => {
            let redis_start = Instant::now();
            Some(component(crate::webhooks::ping(conn).await, redis_start))
        }
        None => None,
    };

    let db_up = database.status == ComponentStatus::Up;
    let redis_up = redis
        .as_ref()
        .map_or(true, |r| r.status == ComponentStatus::Up);

    let status = match (db_up, redis_up) {
        (true, true) => ComponentStatus::Up,
        (true, false) => ComponentStatus::Degraded,
        (false, _) => ComponentStatus::Down,
    };
    let code = if status == ComponentStatus::Down {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            details: HealthDetails { database, redis },
            response_time_ms: start.elapsed().as_millis() as u64,
        }),
    )
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
