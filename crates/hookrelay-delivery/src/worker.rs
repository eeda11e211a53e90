//! Delivery engine: worker pool over the bounded queue plus the retry
//! sweep.
//!
//! Workers drain the queue and run one attempt per id. A sweeper task
//! re-enqueues deliveries whose retry time has come and evicts idle
//! rate-limiter buckets. Shutdown flows through a cancellation token; a
//! drop guard force-cancels if the engine is dropped without a graceful
//! shutdown.

use std::{sync::Arc, time::Duration};

use hookrelay_core::{events::EventHandler, Clock, Result, Store};
use tokio::{sync::mpsc, sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    client::{ClientConfig, DeliveryClient},
    dispatcher::EventDispatcher,
    executor::{DeliveryExecutor, ExecutorConfig},
    queue::{self, QueueHandle},
    rate_limit::RateLimiter,
    scheduler::{CircuitBreakerConfig, RetryScheduler},
};

use hookrelay_core::models::{DeliveryId, Subscription};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    /// How often the sweeper looks for due retries.
    pub sweep_interval: Duration,
    /// Upper bound on due retries re-enqueued per sweep.
    pub sweep_batch: usize,
    /// Age after which a `pending` delivery with no live queue entry is
    /// re-enqueued by the sweep. Covers restarts and lost submissions.
    pub recover_after: Duration,
    /// How long a deleted subscription may drain before its remaining open
    /// deliveries are force-exhausted and the row is removed.
    pub delete_drain_window: Duration,
    pub shutdown_timeout: Duration,
    pub executor: ExecutorConfig,
    pub client: ClientConfig,
    pub breaker: CircuitBreakerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            sweep_interval: Duration::from_secs(1),
            sweep_batch: 100,
            recover_after: Duration::from_secs(30),
            delete_drain_window: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(30),
            executor: ExecutorConfig::default(),
            client: ClientConfig::default(),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

pub struct DeliveryEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventHandler>,
    queue: QueueHandle,
    receiver: Option<mpsc::Receiver<DeliveryId>>,
    executor: Arc<DeliveryExecutor>,
    limiter: Arc<RateLimiter>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    config: EngineConfig,
}

impl DeliveryEngine {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventHandler>,
        config: EngineConfig,
    ) -> Result<Self> {
        let (queue, receiver) = queue::bounded(config.queue_capacity);
        let limiter = Arc::new(RateLimiter::new(clock.clone()));
        let client = DeliveryClient::new(config.client.clone())?;
        let scheduler = RetryScheduler::new(
            store.clone(),
            clock.clone(),
            queue.clone(),
            events.clone(),
            config.breaker,
        );
        let executor = Arc::new(DeliveryExecutor::new(
            store.clone(),
            client,
            limiter.clone(),
            scheduler,
            clock.clone(),
            events.clone(),
            config.executor.clone(),
        ));

        Ok(Self {
            store,
            clock,
            events,
            queue,
            receiver: Some(receiver),
            executor,
            limiter,
            cancel: CancellationToken::new(),
            handles: Vec::new(),
            config,
        })
    }

    /// Submission handle for dispatchers and the management surface.
    pub fn queue(&self) -> QueueHandle {
        self.queue.clone()
    }

    /// Dispatcher bound to this engine's queue.
    pub fn dispatcher(&self) -> EventDispatcher {
        EventDispatcher::new(self.store.clone(), self.queue.clone(), self.clock.clone())
    }

    /// Scheduler bound to this engine's queue, for manual retry.
    pub fn scheduler(&self) -> RetryScheduler {
        RetryScheduler::new(
            self.store.clone(),
            self.clock.clone(),
            self.queue.clone(),
            self.events.clone(),
            self.config.breaker,
        )
    }

    /// Direct access to the executor, used by the synchronous test-delivery
    /// path and by tests that drive attempts by hand.
    pub fn executor(&self) -> Arc<DeliveryExecutor> {
        self.executor.clone()
    }

    /// Spawns the worker pool and the retry sweeper.
    pub fn start(&mut self) {
        let Some(receiver) = self.receiver.take() else {
            warn!("engine already started");
            return;
        };

        let receiver = Arc::new(Mutex::new(receiver));
        for worker_id in 0..self.config.workers.max(1) {
            let receiver = receiver.clone();
            let executor = self.executor.clone();
            let cancel = self.cancel.clone();

            self.handles.push(tokio::spawn(async move {
                debug!(worker_id, "delivery worker started");
                loop {
                    let next = {
                        let mut rx = receiver.lock().await;
                        tokio::select! {
                            () = cancel.cancelled() => None,
                            id = rx.recv() => id,
                        }
                    };
                    let Some(id) = next else { break };

                    if let Err(err) = executor.execute(id).await {
                        error!(worker_id, delivery_id = %id, %err, "attempt errored");
                    }
                }
                debug!(worker_id, "delivery worker stopped");
            }));
        }

        let store = self.store.clone();
        let clock = self.clock.clone();
        let queue = self.queue.clone();
        let limiter = self.limiter.clone();
        let cancel = self.cancel.clone();
        let interval = self.config.sweep_interval;
        let batch = self.config.sweep_batch;
        let recover_after = chrono::Duration::from_std(self.config.recover_after)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let claim_timeout = chrono::Duration::from_std(self.config.client.timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(10));
        let drain_window = chrono::Duration::from_std(self.config.delete_drain_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));

        self.handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = clock.sleep(interval) => {},
                }

                let now = clock.now_utc();
                match store.due_retries(now, batch).await {
                    Ok(due) => {
                        for id in due {
                            // A full queue just means the next sweep picks
                            // the delivery up again.
                            if !queue.try_submit(id) {
                                break;
                            }
                        }
                    },
                    Err(err) => warn!(%err, "retry sweep failed"),
                }

                // Deliveries whose queue entry is gone: pending rows from
                // before a restart (or a lost submission), and attempts a
                // dead worker never released.
                let pending_cutoff = now - recover_after;
                match store
                    .recover_stranded(pending_cutoff, pending_cutoff - claim_timeout, batch)
                    .await
                {
                    Ok(stranded) => {
                        if !stranded.is_empty() {
                            warn!(count = stranded.len(), "re-enqueueing stranded deliveries");
                        }
                        for id in stranded {
                            if !queue.try_submit(id) {
                                break;
                            }
                        }
                    },
                    Err(err) => warn!(%err, "stranded-delivery recovery failed"),
                }

                match store.deleted_subscriptions(batch).await {
                    Ok(doomed) => {
                        for sub in doomed {
                            let drain_expired = now - sub.updated_at >= drain_window;
                            if let Err(err) = reap_deleted(store.as_ref(), &sub, drain_expired).await
                            {
                                warn!(
                                    subscription_id = %sub.id,
                                    %err,
                                    "deleted-subscription reap failed"
                                );
                            }
                        }
                    },
                    Err(err) => warn!(%err, "deleted-subscription scan failed"),
                }

                limiter.evict_idle().await;
            }
            debug!("retry sweeper stopped");
        }));

        info!(workers = self.config.workers, "delivery engine started");
    }

    /// Stops accepting work and waits for in-flight attempts to finish,
    /// up to the shutdown timeout.
    pub async fn shutdown(mut self) {
        info!("delivery engine shutting down");
        self.cancel.cancel();

        let handles = std::mem::take(&mut self.handles);
        let join_all = async {
            for handle in handles {
                if let Err(err) = handle.await {
                    if !err.is_cancelled() {
                        error!(%err, "worker task panicked");
                    }
                }
            }
        };

        if tokio::time::timeout(self.config.shutdown_timeout, join_all)
            .await
            .is_err()
        {
            warn!("shutdown timeout reached with workers still running");
        }
    }
}

/// One reap step for a logically deleted subscription: once the drain
/// window is spent any open deliveries are force-exhausted, and the row is
/// removed as soon as nothing non-terminal references it.
async fn reap_deleted(
    store: &dyn Store,
    subscription: &Subscription,
    drain_expired: bool,
) -> Result<()> {
    if drain_expired {
        let forced = store
            .exhaust_open_deliveries(subscription.id, "subscription deleted, drain window elapsed")
            .await?;
        if forced > 0 {
            warn!(
                subscription_id = %subscription.id,
                forced,
                "drain window elapsed, force-exhausted open deliveries"
            );
        }
    }

    if store.open_delivery_count(subscription.id).await? == 0 {
        store.remove_subscription(subscription.id).await?;
        info!(subscription_id = %subscription.id, "deleted subscription drained, row removed");
    }
    Ok(())
}

impl Drop for DeliveryEngine {
    fn drop(&mut self) {
        if !self.handles.is_empty() && !self.cancel.is_cancelled() {
            warn!("delivery engine dropped without shutdown, cancelling workers");
            self.cancel.cancel();
        }
    }
}
