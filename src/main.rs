use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use http::HeaderValue;
use tokio::signal;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use tracing::{error, info, warn};

use storefront_api as api;
use api::notifications::{EmailSender, HttpEmailSender, LogEmailSender};
use api::payments::{PaymentGateway, StripeGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    let retry_policy = cfg.connect_retry_policy();

    // Init DB
    let db_config = api::db::DbConfig::from(&cfg);
    let db_pool = api::db::connect_with_retry(&db_config, &retry_policy)
        .await
        .context("database unreachable")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Redis is optional; without it webhook redeliveries are deduplicated by order state alone
    let redis = match cfg.redis_url.as_deref().filter(|url| !url.trim().is_empty()) {
        Some(url) => match api::webhooks::connect_redis(url, &retry_policy).await {
            Ok(conn) => {
                info!("Redis connected; webhook event ledger enabled");
                Some(conn)
            }
            Err(e) => {
                warn!(error = %e, "Redis unavailable; continuing without webhook event ledger");
                None
            }
        },
        None => None,
    };

    let gateway: Arc<dyn PaymentGateway> =
        Arc::new(StripeGateway::from_config(&cfg).context("payment gateway client")?);
    let email_sender: Arc<dyn EmailSender> =
        match HttpEmailSender::from_config(&cfg).context("email client")? {
            Some(sender) => Arc::new(sender),
            None => {
                warn!("APP__EMAIL_API_URL not set; guest credentials will not be emailed");
                Arc::new(LogEmailSender)
            }
        };

    let app_state = api::AppState::new(db_arc.clone(), cfg.clone(), gateway, email_sender, redis);

    // Build CORS layer from config
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        CorsLayer::permissive()
    } else {
        anyhow::bail!(
            "Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true"
        );
    };

    let app = api::app_router(app_state)
        .layer(api::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(cfg.request_timeout_secs)))
        .layer(cors_layer)
        // Outermost so every span and error body carries the request id
        .layer(axum::middleware::from_fn(api::tracing::request_id_middleware));

    let host: std::net::IpAddr = cfg
        .host
        .parse()
        .with_context(|| format!("invalid host address {}", cfg.host))?;
    let addr = SocketAddr::new(host, cfg.port);
    info!(environment = %cfg.environment, "storefront-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped; releasing connections");
    api::db::close_pool((*db_arc).clone()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
