//! Redis client utilities
//!
//! The evaluator uses Redis for two things: the blob store holding event logs,
//! debounce records and audit trails, and the list that inbound evaluation
//! requests are popped from.

use crate::error::{Error, Result};
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::Client;

/// Create a reconnecting Redis connection manager from a URL
pub async fn create_client(url: &str) -> Result<ConnectionManager> {
    let client = open(url)?;

    ConnectionManager::new(client)
        .await
        .map_err(|e| Error::internal(format!("Failed to connect to Redis: {}", e)))
}

/// Create a multiplexed connection, used for blocking pops
///
/// Blocking commands hold the connection until they return, so the consumer
/// gets its own connection instead of sharing the store's manager.
pub async fn create_multiplexed(url: &str) -> Result<MultiplexedConnection> {
    let client = open(url)?;

    client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| Error::internal(format!("Failed to connect to Redis: {}", e)))
}

fn open(url: &str) -> Result<Client> {
    Client::open(url).map_err(|e| Error::config(format!("Invalid Redis URL: {}", e)))
}
