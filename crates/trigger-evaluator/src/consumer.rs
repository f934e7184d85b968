//! Request consumer for reading evaluation requests from a Redis list
//!
//! Producers `LPUSH` JSON-encoded [`EvaluationRequest`]s; the worker pops them
//! with `BRPOP`, so requests are handled in arrival order.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use shared::models::EvaluationRequest;

use crate::error::StoreResult;

/// Request consumer trait for testability
#[async_trait]
pub trait RequestConsumer: Send + Sync {
    /// Block and wait for the next request
    ///
    /// # Arguments
    ///
    /// * `timeout_secs` - Maximum time to block waiting for a request
    ///
    /// # Returns
    ///
    /// `Some(request)` if one was received, `None` on timeout or when the
    /// popped payload was not a valid request
    async fn consume(&self, timeout_secs: u64) -> StoreResult<Option<EvaluationRequest>>;

    /// Number of requests waiting in the queue
    async fn queue_len(&self) -> StoreResult<u64>;
}

/// Redis-backed request consumer
#[derive(Clone)]
pub struct RedisRequestConsumer {
    conn: MultiplexedConnection,
    queue_name: String,
}

impl RedisRequestConsumer {
    /// Create a new Redis request consumer
    ///
    /// # Arguments
    ///
    /// * `conn` - Multiplexed Redis connection
    /// * `queue_name` - List to pop from (e.g. `fuzzy_trigger:requests`)
    pub fn new(conn: MultiplexedConnection, queue_name: impl Into<String>) -> Self {
        Self {
            conn,
            queue_name: queue_name.into(),
        }
    }
}

/// Decode a popped payload, logging and discarding invalid ones
pub fn decode_request(payload: &str) -> Option<EvaluationRequest> {
    match serde_json::from_str::<EvaluationRequest>(payload) {
        Ok(request) => Some(request),
        Err(e) => {
            tracing::warn!(
                error = %e,
                bytes = payload.len(),
                "Discarding invalid evaluation request"
            );
            None
        }
    }
}

#[async_trait]
impl RequestConsumer for RedisRequestConsumer {
    async fn consume(&self, timeout_secs: u64) -> StoreResult<Option<EvaluationRequest>> {
        let mut conn = self.conn.clone();

        // BRPOP returns (queue_name, value), or nil on timeout
        let result: Option<(String, String)> =
            conn.brpop(&self.queue_name, timeout_secs as f64).await?;

        let Some((_, payload)) = result else {
            return Ok(None);
        };

        let request = decode_request(&payload);
        if let Some(request) = &request {
            tracing::debug!(
                device = %request.device,
                trigger_name = %request.trigger_name,
                "Consumed evaluation request"
            );
        }

        Ok(request)
    }

    async fn queue_len(&self) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.llen(&self.queue_name).await?;
        Ok(len)
    }
}
