//! The audit event consumer.
//!
//! One receive loop per process. Deliveries are handled strictly one at a
//! time (prefetch 1): a delivery is settled before the next one is read.
//! Horizontal scale comes from running more worker processes against the
//! same queue.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use audit_bus_broker::{ConnectionManager, Delivery, DeliveryStream, QueueTopology};
use futures::StreamExt;
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Result, WorkerError};
use crate::handler::{Disposition, MessageHandler};
use crate::retry::{ReconnectPolicy, RetryDecision};
use crate::state::ConsumerState;

/// Default consumer tag.
pub const DEFAULT_CONSUMER_TAG: &str = "audit-bus-worker";

/// Worker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Retry policy for connecting and re-subscribing.
    pub reconnect: ReconnectPolicy,

    /// Tag identifying this consumer to the broker.
    pub consumer_tag: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            consumer_tag: DEFAULT_CONSUMER_TAG.to_string(),
        }
    }
}

impl WorkerConfig {
    /// Sets the retry policy.
    #[must_use]
    pub const fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Sets the consumer tag.
    #[must_use]
    pub fn with_consumer_tag(mut self, tag: impl Into<String>) -> Self {
        self.consumer_tag = tag.into();
        self
    }
}

/// Settlement counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Deliveries acknowledged.
    pub acked: u64,

    /// Deliveries rejected without requeue.
    pub rejected: u64,

    /// Deliveries returned to the queue.
    pub requeued: u64,
}

impl ConsumerStats {
    /// Total deliveries settled.
    pub const fn settled(&self) -> u64 {
        self.acked + self.rejected + self.requeued
    }

    fn record(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Ack => self.acked += 1,
            Disposition::Reject => self.rejected += 1,
            Disposition::Requeue => self.requeued += 1,
        }
    }
}

enum StreamEnd {
    Shutdown,
    Closed,
}

/// Consumes audit messages and hands them to a [`MessageHandler`].
#[derive(Debug)]
pub struct EventConsumer {
    manager: Arc<ConnectionManager>,
    handler: Arc<dyn MessageHandler>,
    topology: QueueTopology,
    config: WorkerConfig,
    state: Mutex<ConsumerState>,
    stats: Mutex<ConsumerStats>,
}

impl EventConsumer {
    /// Creates a consumer for the queue configured on `manager`.
    pub fn new(
        manager: Arc<ConnectionManager>,
        handler: Arc<dyn MessageHandler>,
        config: WorkerConfig,
    ) -> Self {
        let topology = manager.config().topology.clone();
        Self {
            manager,
            handler,
            topology,
            config,
            state: Mutex::new(ConsumerState::Disconnected),
            stats: Mutex::new(ConsumerStats::default()),
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ConsumerState {
        *self.state.lock()
    }

    /// Returns the settlement counters.
    pub fn stats(&self) -> ConsumerStats {
        *self.stats.lock()
    }

    /// Runs until `shutdown` completes or connecting fails for good.
    ///
    /// A consumer that returned an error is left in
    /// [`ConsumerState::Failed`] and must not be run again.
    ///
    /// On shutdown the in-flight message, if any, is handled and settled
    /// before the loop stops; then the connection is closed and `Ok(())` is
    /// returned. If the delivery stream ends for any other reason the
    /// consumer reconnects and re-subscribes under the same retry policy.
    ///
    /// # Errors
    ///
    /// [`WorkerError::ConnectRetriesExhausted`] when every allowed attempt
    /// fails, [`WorkerError::Broker`] when the broker rejects the
    /// subscription permanently (e.g. a conflicting queue declaration).
    #[instrument(skip_all, fields(service = %self.manager.config().service_name, queue = %self.topology.name))]
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            let stream = tokio::select! {
                biased;
                () = shutdown.as_mut() => {
                    self.stop().await;
                    return Ok(());
                }
                subscribed = self.connect_with_retry() => subscribed?,
            };

            match self.consume(stream, &mut shutdown).await {
                StreamEnd::Shutdown => {
                    self.stop().await;
                    return Ok(());
                }
                StreamEnd::Closed => {
                    warn!("Delivery stream closed by broker; reconnecting");
                }
            }
        }
    }

    async fn connect_with_retry(&self) -> Result<DeliveryStream> {
        let mut retry = self.config.reconnect.start();
        loop {
            self.transition(ConsumerState::Connecting);
            let err = match self.subscribe().await {
                Ok(stream) => {
                    self.transition(ConsumerState::Subscribed);
                    info!(consumer_tag = %self.config.consumer_tag, "Waiting for audit messages");
                    return Ok(stream);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                error!(error = %err, "Subscription rejected by broker");
                self.transition(ConsumerState::Failed);
                return Err(WorkerError::Broker(err));
            }

            match retry.on_failure() {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        attempt = retry.failures(),
                        max_attempts = retry.max_attempts(),
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Broker connection failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp { attempts } => {
                    error!(attempts, error = %err, "Broker connection failed; giving up");
                    self.transition(ConsumerState::Failed);
                    return Err(WorkerError::ConnectRetriesExhausted {
                        attempts,
                        last_error: err,
                    });
                }
            }
        }
    }

    async fn subscribe(&self) -> audit_bus_broker::Result<DeliveryStream> {
        self.manager.ensure_connected().await?;
        let queue = self.manager.queue_handle(&self.topology).await?;
        self.manager.subscribe(&queue, &self.config.consumer_tag).await
    }

    async fn consume<F>(&self, mut stream: DeliveryStream, shutdown: &mut Pin<&mut F>) -> StreamEnd
    where
        F: Future<Output = ()> + Send,
    {
        loop {
            let next = tokio::select! {
                biased;
                () = shutdown.as_mut() => return StreamEnd::Shutdown,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(delivery)) => self.process(delivery).await,
                Some(Err(e)) => {
                    warn!(error = %e, "Delivery stream failed");
                    return StreamEnd::Closed;
                }
                None => return StreamEnd::Closed,
            }
        }
    }

    async fn process(&self, delivery: Delivery) {
        let tag = delivery.delivery_tag;
        let result = self.handler.handle(&delivery.body).await;
        let disposition = Disposition::of(&result);

        match &result {
            Ok(()) => debug!(delivery_tag = tag, "Audit message processed"),
            Err(e) if disposition == Disposition::Requeue => {
                warn!(delivery_tag = tag, redelivered = delivery.redelivered, error = %e, "Audit message requeued");
            }
            Err(e) => warn!(delivery_tag = tag, error = %e, "Audit message rejected"),
        }

        let settled = match disposition {
            Disposition::Ack => self.manager.ack(tag).await,
            Disposition::Reject => self.manager.nack(tag, false).await,
            Disposition::Requeue => self.manager.nack(tag, true).await,
        };

        match settled {
            Ok(()) => self.stats.lock().record(disposition),
            Err(e) => {
                warn!(delivery_tag = tag, error = %e, "Failed to settle delivery; the broker will redeliver it");
            }
        }
    }

    async fn stop(&self) {
        self.transition(ConsumerState::ShuttingDown);
        info!("Shutting down consumer");
        self.manager.disconnect().await;
        self.transition(ConsumerState::Disconnected);

        let stats = self.stats();
        info!(
            acked = stats.acked,
            rejected = stats.rejected,
            requeued = stats.requeued,
            "Consumer stopped"
        );
    }

    fn transition(&self, next: ConsumerState) {
        let mut state = self.state.lock();
        if *state != next {
            debug_assert!(
                state.can_transition_to(next),
                "illegal consumer state change {} -> {next}",
                *state
            );
            debug!(from = %*state, to = %next, "Consumer state change");
            *state = next;
        }
    }
}
