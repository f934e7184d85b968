//! Worker loop
//!
//! Pops requests one at a time and evaluates each to completion before
//! taking the next. Evaluation errors are logged and the loop moves on; a
//! failing queue backs off for a second.
//!
//! Delivery is at most once. `BRPOP` removes a request before it is
//! evaluated, and cancelling the loop drops an in-flight pop, so a request
//! popped at shutdown or lost to a store failure is not redelivered.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::consumer::RequestConsumer;
use crate::processor::TriggerProcessor;

/// Get hostname for worker instance tracking
fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Counters for one worker run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub evaluated: u64,
    /// Requests that could not be evaluated because of a store failure
    pub failed: u64,
    /// Requests refused for an invalid reading or rule
    pub rejected: u64,
}

pub struct Worker<C: RequestConsumer> {
    consumer: C,
    processor: Arc<TriggerProcessor>,
    poll_timeout_secs: u64,
}

impl<C: RequestConsumer> Worker<C> {
    pub fn new(consumer: C, processor: Arc<TriggerProcessor>, poll_timeout_secs: u64) -> Self {
        Self {
            consumer,
            processor,
            poll_timeout_secs,
        }
    }

    /// Run until `ctx` is cancelled
    pub async fn run(&self, ctx: CancellationToken) -> WorkerStats {
        let instance = get_hostname();
        let mut stats = WorkerStats::default();

        match self.consumer.queue_len().await {
            Ok(backlog) => info!(instance = %instance, backlog = backlog, "Starting request loop"),
            Err(e) => {
                warn!(instance = %instance, error = %e, "Starting request loop, queue length unknown")
            }
        }

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("Received shutdown signal, stopping worker");
                    break;
                }
                received = self.consumer.consume(self.poll_timeout_secs) => {
                    match received {
                        Ok(Some(request)) => match self.processor.evaluate(&request).await {
                            Ok(_) => stats.evaluated += 1,
                            Err(e) if e.is_rejection() => {
                                stats.rejected += 1;
                                warn!(
                                    instance = %instance,
                                    device = %request.device,
                                    reason = e.label(),
                                    error = %e,
                                    "Request rejected"
                                );
                            }
                            Err(e) => {
                                stats.failed += 1;
                                error!(
                                    instance = %instance,
                                    device = %request.device,
                                    error = %e,
                                    "Request failed"
                                );
                            }
                        },
                        Ok(None) => {}
                        Err(e) => {
                            error!(error = %e, "Failed to read from request queue");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }

        info!(
            instance = %instance,
            evaluated = stats.evaluated,
            failed = stats.failed,
            rejected = stats.rejected,
            "Worker stopped gracefully"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::tests::{sample_request, MockRequestConsumer};
    use crate::error::StoreError;
    use crate::notifier::{ChannelRouter, LogNotifier};
    use crate::store::{InMemoryBlobStore, InMemoryStateStore};
    use shared::{EvaluatorConfig, NotifierConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn processor() -> Arc<TriggerProcessor> {
        Arc::new(TriggerProcessor::new(
            Arc::new(InMemoryBlobStore::new()),
            Arc::new(InMemoryStateStore::new()),
            Arc::new(LogNotifier::new(ChannelRouter::from_config(&NotifierConfig::default()))),
            &EvaluatorConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_run_processes_until_cancelled() {
        let ctx = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut consumer = MockRequestConsumer::new();
        consumer.expect_queue_len().times(1).returning(|| Ok(3));
        {
            let ctx = ctx.clone();
            let calls = calls.clone();
            consumer.expect_consume().returning(move |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                match n {
                    0 | 1 => Ok(Some(sample_request())),
                    2 => {
                        let mut bad = sample_request();
                        bad.trigger_certainty = None;
                        Ok(Some(bad))
                    }
                    _ => {
                        ctx.cancel();
                        Ok(None)
                    }
                }
            });
        }

        let worker = Worker::new(consumer, processor(), 1);
        let stats = tokio::time::timeout(Duration::from_secs(5), worker.run(ctx))
            .await
            .unwrap();

        assert_eq!(
            stats,
            WorkerStats {
                evaluated: 2,
                failed: 0,
                rejected: 1
            }
        );
    }

    #[tokio::test]
    async fn test_queue_errors_do_not_stop_loop() {
        let ctx = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut consumer = MockRequestConsumer::new();
        consumer
            .expect_queue_len()
            .returning(|| Err(StoreError::backend("connection refused")));
        {
            let ctx = ctx.clone();
            let calls = calls.clone();
            consumer.expect_consume().returning(move |_| {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(StoreError::backend("connection refused")),
                    1 => Ok(Some(sample_request())),
                    _ => {
                        ctx.cancel();
                        Ok(None)
                    }
                }
            });
        }

        let worker = Worker::new(consumer, processor(), 1);
        let stats = tokio::time::timeout(Duration::from_secs(5), worker.run(ctx))
            .await
            .unwrap();

        assert_eq!(stats.evaluated, 1);
        assert_eq!(stats.rejected, 0);
    }
}
