//! PostgreSQL reported-state store
//!
//! Keeps one row per device in `device_shadows`, with the reported attributes
//! in a JSONB column. Updates are an atomic UPSERT that merges the new
//! attributes into the existing object (`||`), so concurrent writers touching
//! different attributes do not clobber each other.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;
use tracing::debug;

use super::StateStore;
use crate::error::{StoreError, StoreResult};

/// Manages device reported state persistence
pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    /// Create a new state store
    ///
    /// # Arguments
    ///
    /// * `pool` - PostgreSQL connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `device_shadows` table if it does not exist
    ///
    /// # Errors
    ///
    /// Returns error if the DDL statement fails
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS device_shadows (
                device TEXT PRIMARY KEY,
                reported JSONB NOT NULL DEFAULT '{}'::jsonb,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("device_shadows table ready");
        Ok(())
    }
}

#[async_trait]
impl StateStore for PostgresStateStore {
    /// Merge attributes into the device's reported state (atomic UPSERT)
    ///
    /// # Errors
    ///
    /// Returns error if database query fails
    async fn update_reported(
        &self,
        device: &str,
        attributes: Map<String, Value>,
    ) -> StoreResult<()> {
        debug!(device = device, attributes = attributes.len(), "Updating reported state");

        sqlx::query(
            r#"
            INSERT INTO device_shadows (device, reported, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (device)
            DO UPDATE SET
                reported = device_shadows.reported || EXCLUDED.reported,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(device)
        .bind(Value::Object(attributes))
        .execute(&self.pool)
        .await?;

        debug!(device = device, "Reported state updated");
        Ok(())
    }

    /// Load the device's reported state
    ///
    /// # Returns
    ///
    /// - `Some(attributes)` if the device has a shadow row
    /// - `None` if nothing was ever reported
    async fn get_reported(&self, device: &str) -> StoreResult<Option<Map<String, Value>>> {
        let row: Option<Value> =
            sqlx::query_scalar("SELECT reported FROM device_shadows WHERE device = $1")
                .bind(device)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(other) => Err(StoreError::backend(format!(
                "reported state for {} is not an object: {}",
                device, other
            ))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Helper to setup test database for async tests
    async fn setup_test_store() -> PostgresStateStore {
        let database_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set for integration tests");

        let pool = PgPool::connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        let store = PostgresStateStore::new(pool);
        store.ensure_schema().await.expect("Failed to create schema");

        sqlx::query("DELETE FROM device_shadows WHERE device LIKE 'test_%'")
            .execute(&store.pool)
            .await
            .expect("Failed to clean up test data");

        store
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL (integration test)
    async fn test_get_reported_nonexistent() {
        let store = setup_test_store().await;
        assert!(store.get_reported("test_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL (integration test)
    async fn test_update_reported_merges() {
        let store = setup_test_store().await;

        let mut first = Map::new();
        first.insert("distance".to_string(), json!(3));
        store.update_reported("test_merge", first).await.unwrap();

        let mut second = Map::new();
        second.insert("lot_is_occupied".to_string(), json!(0.8));
        store.update_reported("test_merge", second).await.unwrap();

        let reported = store.get_reported("test_merge").await.unwrap().unwrap();
        assert_eq!(reported["distance"], json!(3));
        assert_eq!(reported["lot_is_occupied"], json!(0.8));
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL (integration test)
    async fn test_update_reported_overwrites_same_attribute() {
        let store = setup_test_store().await;

        for certainty in [0.8, 1.0] {
            let mut attrs = Map::new();
            attrs.insert("lot_is_occupied".to_string(), json!(certainty));
            store.update_reported("test_overwrite", attrs).await.unwrap();
        }

        let reported = store.get_reported("test_overwrite").await.unwrap().unwrap();
        assert_eq!(reported["lot_is_occupied"], json!(1.0));
    }
}
