//! Push wake paths. All best-effort: a lost signal only delays a resume
//! until the next sweep.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::scheduler::ExecutionScheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeSignal {
    pub execution_id: Uuid,
    pub wake_at: DateTime<Utc>,
}

#[async_trait]
pub trait WakeNotifier: Send + Sync {
    async fn schedule(&self, signal: WakeSignal) -> anyhow::Result<()>;
}

/// Sweep-only deployments.
pub struct NoopNotifier;

#[async_trait]
impl WakeNotifier for NoopNotifier {
    async fn schedule(&self, _signal: WakeSignal) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Single-node push path: signals go to a local worker that sleeps until
/// each wake time.
pub struct TimerNotifier {
    tx: mpsc::UnboundedSender<WakeSignal>,
}

impl TimerNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WakeSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl WakeNotifier for TimerNotifier {
    async fn schedule(&self, signal: WakeSignal) -> anyhow::Result<()> {
        self.tx
            .send(signal)
            .map_err(|_| anyhow::anyhow!("timer worker is gone"))
    }
}

/// Publishes wake signals on a NATS subject; any node's consumer may pick
/// them up.
pub struct NatsNotifier {
    client: async_nats::Client,
    subject: String,
}

impl NatsNotifier {
    pub fn new(client: async_nats::Client, subject: impl Into<String>) -> Self {
        Self {
            client,
            subject: subject.into(),
        }
    }
}

#[async_trait]
impl WakeNotifier for NatsNotifier {
    async fn schedule(&self, signal: WakeSignal) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(&signal)?;
        self.client
            .publish(self.subject.clone(), payload.into())
            .await?;
        debug!(execution_id = %signal.execution_id, "Wake signal published");
        Ok(())
    }
}

/// Drains a [`TimerNotifier`] channel, one sleeping task per signal.
pub fn spawn_timer_worker(
    scheduler: Arc<ExecutionScheduler>,
    mut rx: mpsc::UnboundedReceiver<WakeSignal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Timer wake worker started");
        while let Some(signal) = rx.recv().await {
            tokio::spawn(wake_when_due(scheduler.clone(), signal));
        }
        warn!("Timer wake channel closed");
    })
}

/// Consumes wake signals from NATS. A queue group spreads signals across
/// nodes; the claim keeps a duplicate delivery harmless.
pub fn spawn_nats_consumer(
    scheduler: Arc<ExecutionScheduler>,
    client: async_nats::Client,
    subject: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(subject = %subject, "Subscribing to scheduler wake subject");

        let mut subscriber = match client
            .queue_subscribe(subject.clone(), "scheduler-wake".to_string())
            .await
        {
            Ok(sub) => sub,
            Err(e) => {
                error!(error = %e, "Failed to subscribe to NATS");
                return;
            }
        };

        while let Some(msg) = subscriber.next().await {
            let signal: WakeSignal = match serde_json::from_slice(&msg.payload) {
                Ok(signal) => signal,
                Err(e) => {
                    warn!(error = %e, "Failed to deserialize wake signal");
                    metrics::counter!("scheduler.wake.deserialize_errors").increment(1);
                    continue;
                }
            };
            tokio::spawn(wake_when_due(scheduler.clone(), signal));
        }

        warn!(subject = %subject, "NATS wake subscription ended");
    })
}

async fn wake_when_due(scheduler: Arc<ExecutionScheduler>, signal: WakeSignal) {
    let wait = (signal.wake_at - scheduler.clock().now())
        .to_std()
        .unwrap_or_default();
    if !wait.is_zero() {
        tokio::time::sleep(wait).await;
    }
    match scheduler.resume(signal.execution_id).await {
        Ok(outcome) => debug!(
            execution_id = %signal.execution_id,
            outcome = outcome.label(),
            "Push wake handled"
        ),
        Err(e) => error!(execution_id = %signal.execution_id, error = %e, "Push wake failed"),
    }
}
