//! Redis-backed memory of gateway events that were already applied.
//!
//! The order status check inside the reconciliation transaction is what keeps redelivered events
//! harmless; this ledger only lets a redelivery skip the database round trip.

use redis::aio::ConnectionManager;
use redis::RedisError;
use std::time::Duration;
use tracing::{debug, warn};

use crate::retry::RetryPolicy;

const KEY_PREFIX: &str = "storefront:webhook:event:";
const DEFAULT_TTL: Duration = Duration::from_secs(24 * 3600);

#[derive(Clone)]
pub struct WebhookEventLedger {
    conn: ConnectionManager,
    ttl: Duration,
}

impl WebhookEventLedger {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            ttl: DEFAULT_TTL,
        }
    }

    fn key(event_id: &str) -> String {
        format!("{KEY_PREFIX}{event_id}")
    }

    /// Whether `event_id` was marked processed within the TTL. Redis failures read as "not seen".
    pub async fn already_processed(&self, event_id: &str) -> bool {
        let mut conn = self.conn.clone();
        match redis::cmd("EXISTS")
            .arg(Self::key(event_id))
            .query_async::<_, bool>(&mut conn)
            .await
        {
            Ok(seen) => seen,
            Err(e) => {
                warn!(event_id, error = %e, "Webhook ledger lookup failed");
                false
            }
        }
    }

    pub async fn mark_processed(&self, event_id: &str) {
        let mut conn = self.conn.clone();
        let result = redis::cmd("SET")
            .arg(Self::key(event_id))
            .arg(1)
            .arg("EX")
            .arg(self.ttl.as_secs())
            .query_async::<_, ()>(&mut conn)
            .await;
        match result {
            Ok(()) => debug!(event_id, "Webhook event recorded"),
            Err(e) => warn!(event_id, error = %e, "Failed to record webhook event"),
        }
    }
}

/// Opens a managed Redis connection, retrying with `policy` while the server comes up
pub async fn connect_redis(
    url: &str,
    policy: &RetryPolicy,
) -> Result<ConnectionManager, RedisError> {
    let client = redis::Client::open(url)?;
    policy
        .run("redis.connect", || ConnectionManager::new(client.clone()))
        .await
}

/// Round-trips a PING over `conn`
pub async fn ping(conn: &ConnectionManager) -> Result<(), RedisError> {
    let mut conn = conn.clone();
    redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
    Ok(())
}
