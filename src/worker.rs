//! Dispatcher and bounded worker pool.
//!
//! A single dispatcher polls the metadata store for due transactions and
//! hands them to at most `worker_concurrency` concurrent processing tasks.
//! The claim protocol makes double-dispatch harmless, so the dispatcher can
//! afford to be simple; any external at-least-once queue can feed
//! [`Processor::process`](crate::processor::Processor::process) directly
//! with the same safety.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};

use crate::config::RetryPolicy;
use crate::persistence::MetadataStore;
use crate::processor::Processor;

/// Delay before retry attempt `retry_count + 1`: capped exponential backoff
/// with ±25 % jitter.
pub fn backoff_delay(retry_count: u32, policy: &RetryPolicy) -> Duration {
    let exponent = retry_count.min(16);
    let raw = policy.base.as_secs_f64() * 2f64.powi(exponent as i32);
    let capped = raw.min(policy.cap.as_secs_f64());
    let jitter = rand::thread_rng().gen_range(0.75..=1.25);
    Duration::from_secs_f64((capped * jitter).min(policy.cap.as_secs_f64()))
}

pub struct WorkerPool {
    processor: Arc<Processor>,
    store: Arc<dyn MetadataStore>,
    concurrency: usize,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(
        processor: Arc<Processor>,
        store: Arc<dyn MetadataStore>,
        concurrency: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            processor,
            store,
            concurrency: concurrency.max(1),
            poll_interval,
        }
    }

    /// Run until the shutdown signal flips to `true`, then drain in-flight
    /// work before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        info!(concurrency = self.concurrency, "worker pool started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let batch = match self
                .store
                .due_transactions((self.concurrency * 2) as i64)
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "dispatcher poll failed");
                    Vec::new()
                }
            };

            if batch.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }

            for id in batch {
                let permit = match permits.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                let processor = self.processor.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = processor.process(id).await {
                        error!(%id, error = %e, "processing aborted on store failure");
                    }
                });
            }
        }

        // Drain: wait until every in-flight task has returned its permit.
        let _ = permits.acquire_many(self.concurrency as u32).await;
        info!("worker pool drained");
    }
}
