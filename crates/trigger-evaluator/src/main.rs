//! Fuzzy trigger evaluator worker
//!
//! Pops evaluation requests from Redis and runs each through the trigger
//! processor until Ctrl-C.

use anyhow::{Context, Result};
use shared::{db, Config, StateStoreBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use trigger_evaluator::notifier::{ChannelRouter, LogNotifier, Notifier, WebhookNotifier};
use trigger_evaluator::store::{
    BlobStateStore, BlobStore, PostgresStateStore, RedisBlobStore, StateStore,
};
use trigger_evaluator::{RedisRequestConsumer, TriggerProcessor, Worker};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    shared::init_tracing();

    tracing::info!("Starting Trigger Evaluator...");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Redis holds the blob documents and the request queue
    let redis_url = config.redis.connection_url();
    let redis_manager = shared::redis::create_client(&redis_url)
        .await
        .context("Failed to connect to Redis")?;
    let redis_conn = shared::redis::create_multiplexed(&redis_url)
        .await
        .context("Failed to open Redis queue connection")?;

    tracing::info!("Connected to Redis");

    let blobs: Arc<dyn BlobStore> = Arc::new(RedisBlobStore::new(
        redis_manager,
        config.worker.key_prefix.clone(),
    ));

    let state = build_state_store(&config, blobs.clone()).await?;
    let notifier = build_notifier(&config)?;

    let processor = Arc::new(TriggerProcessor::new(
        blobs,
        state,
        notifier,
        &config.evaluator,
    ));

    let consumer = RedisRequestConsumer::new(redis_conn, config.worker.queue_name.clone());
    let worker = Worker::new(consumer, processor, config.worker.poll_timeout_secs);

    tracing::info!(
        queue = %config.worker.queue_name,
        state_store = %config.state_store,
        "Trigger Evaluator ready"
    );

    let ctx = CancellationToken::new();
    let worker_handle = tokio::spawn({
        let ctx = ctx.clone();
        async move { worker.run(ctx).await }
    });

    signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutdown signal received, stopping Trigger Evaluator...");
    ctx.cancel();

    let stats = worker_handle.await.context("Worker task panicked")?;
    tracing::info!(
        evaluated = stats.evaluated,
        failed = stats.failed,
        rejected = stats.rejected,
        "Trigger Evaluator stopped"
    );

    Ok(())
}

async fn build_state_store(
    config: &Config,
    blobs: Arc<dyn BlobStore>,
) -> Result<Arc<dyn StateStore>> {
    match config.state_store {
        StateStoreBackend::Postgres => {
            let db_config = config
                .database
                .as_ref()
                .context("Database configuration missing for postgres state store")?;

            let db_pool = db::create_pool(db_config)
                .await
                .context("Failed to create database pool")?;

            db::check_health(&db_pool)
                .await
                .context("Database health check failed")?;

            let store = PostgresStateStore::new(db_pool);
            store
                .ensure_schema()
                .await
                .context("Failed to prepare device_shadows table")?;

            Ok(Arc::new(store))
        }
        StateStoreBackend::Redis => Ok(Arc::new(BlobStateStore::new(blobs))),
        StateStoreBackend::Aws => aws_state_store(config).await,
    }
}

#[cfg(feature = "aws-shadow")]
async fn aws_state_store(config: &Config) -> Result<Arc<dyn StateStore>> {
    let store = trigger_evaluator::store::AwsShadowStore::connect(
        config.worker.iot_endpoint.as_deref(),
    )
    .await;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "aws-shadow"))]
async fn aws_state_store(_config: &Config) -> Result<Arc<dyn StateStore>> {
    anyhow::bail!("STATE_STORE_BACKEND=aws requires building with --features aws-shadow")
}

fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    let router = ChannelRouter::from_config(&config.notifier);

    match &config.notifier.webhook_url {
        Some(url) => {
            let notifier = WebhookNotifier::new(
                url.clone(),
                router,
                Duration::from_secs(config.notifier.timeout_secs),
            )
            .context("Failed to build webhook client")?;
            tracing::info!("Chat notifications go to webhook");
            Ok(Arc::new(notifier))
        }
        None => {
            tracing::info!("CHAT_WEBHOOK_URL not set, chat notifications are logged only");
            Ok(Arc::new(LogNotifier::new(router)))
        }
    }
}
