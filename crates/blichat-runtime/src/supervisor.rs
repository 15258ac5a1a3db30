//! Relay Supervisor
//!
//! Owns the lifecycle of the relay tasks:
//! - subscribing to both endpoints and spawning the ingress tasks
//! - the background eviction and health tasks
//! - ordered shutdown: stop input, drain the gate, then stop everything else

use blichat_core::{CorrelationStats, MessagingEndpoint, RelayResult, StreamEndpoint};
use std::sync::Arc;
use tokio::{sync::watch, task::JoinHandle, time::Duration};
use tracing::{debug, error, info, warn};

use crate::engine::RelayEngine;
use crate::gate::GateStatistics;
use crate::tasks::{
    EvictionTask, HealthTask, IngressSummary, OperatorIngressTask, StreamIngressTask, TaskId,
};

/// What the relay did over its lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    pub forward: IngressSummary,
    pub reverse: IngressSummary,
    pub gate: GateStatistics,
    pub correlation: CorrelationStats,
    /// Whether every queued live-room send finished within the grace period
    pub drained: bool,
}

// ----------------------------------------------------------------------------
// Supervisor
// ----------------------------------------------------------------------------

pub struct RelaySupervisor {
    engine: Arc<RelayEngine>,
    shutdown_tx: watch::Sender<bool>,
    stream_handle: Option<JoinHandle<IngressSummary>>,
    operator_handle: Option<JoinHandle<IngressSummary>>,
    background: Vec<(TaskId, JoinHandle<()>)>,
}

impl RelaySupervisor {
    /// Subscribe to both endpoints and start every task
    pub async fn start(
        engine: Arc<RelayEngine>,
        stream: Arc<dyn StreamEndpoint>,
        messaging: Arc<dyn MessagingEndpoint>,
    ) -> RelayResult<Self> {
        let config = engine.config().clone();
        info!(
            "Starting relay between room {} and chat {}",
            config.room_id, config.chat_id
        );

        let events = stream.subscribe(config.room_id).await?;
        let inbound = messaging.subscribe_inbound().await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let stream_task = StreamIngressTask::new(engine.clone(), events, shutdown_rx.clone());
        let stream_handle = tokio::spawn(stream_task.run());

        let operator_task = OperatorIngressTask::new(engine.clone(), inbound, shutdown_rx.clone());
        let operator_handle = tokio::spawn(operator_task.run());

        let mut background = Vec::new();
        let eviction = EvictionTask::new(
            engine.clone(),
            config.correlation.eviction_interval(),
            shutdown_rx.clone(),
        );
        background.push((TaskId::Eviction, tokio::spawn(eviction.run())));

        if let Some(every) = config.health_log_interval() {
            let health = HealthTask::new(engine.clone(), every, shutdown_rx);
            background.push((TaskId::Health, tokio::spawn(health.run())));
        }

        info!("Relay started with {} background tasks", background.len());
        Ok(Self {
            engine,
            shutdown_tx,
            stream_handle: Some(stream_handle),
            operator_handle: Some(operator_handle),
            background,
        })
    }

    pub fn engine(&self) -> &Arc<RelayEngine> {
        &self.engine
    }

    /// Whether either ingress task is still taking input
    pub fn is_running(&self) -> bool {
        let alive = |handle: &Option<JoinHandle<IngressSummary>>| {
            handle.as_ref().is_some_and(|h| !h.is_finished())
        };
        alive(&self.stream_handle) || alive(&self.operator_handle)
    }

    /// Run until both feeds have ended, then shut down
    pub async fn wait(&mut self) -> RelaySummary {
        let forward = join_ingress(TaskId::StreamIngress, self.stream_handle.take()).await;
        let reverse = join_ingress(TaskId::OperatorIngress, self.operator_handle.take()).await;
        info!("Both feeds ended, stopping relay");

        let drained = self
            .engine
            .gate()
            .shutdown(self.engine.config().shutdown_grace())
            .await;
        let mut summary = self.finish(drained).await;
        summary.forward = forward;
        summary.reverse = reverse;
        summary
    }

    /// Stop taking input, drain queued live-room sends, stop all tasks
    pub async fn shutdown(&mut self) -> RelaySummary {
        let grace = self.engine.config().shutdown_grace();
        info!("Relay shutdown requested (grace {:?})", grace);
        self.shutdown_tx.send_replace(true);

        // A forward in progress is bounded by the messaging send timeout
        let forward = join_ingress_within(
            TaskId::StreamIngress,
            self.stream_handle.take(),
            grace + self.engine.config().messaging_send_timeout(),
        )
        .await;

        let drained = self.engine.gate().shutdown(grace).await;

        // Pending delivery reports resolve once the gate has stopped
        let reverse = join_ingress_within(
            TaskId::OperatorIngress,
            self.operator_handle.take(),
            self.engine.config().messaging_send_timeout(),
        )
        .await;

        let mut summary = self.finish(drained).await;
        summary.forward = forward;
        summary.reverse = reverse;
        summary
    }

    async fn finish(&mut self, drained: bool) -> RelaySummary {
        self.shutdown_tx.send_replace(true);

        for (task_id, handle) in self.background.drain(..) {
            match tokio::time::timeout(Duration::from_secs(1), handle).await {
                Ok(Ok(())) => debug!("Task {} stopped", task_id.name()),
                Ok(Err(e)) => error!("Task {} failed: {}", task_id.name(), e),
                Err(_) => warn!("Task {} did not stop in time", task_id.name()),
            }
        }

        let summary = RelaySummary {
            gate: self.engine.gate().stats(),
            correlation: self.engine.store().stats(),
            drained,
            ..RelaySummary::default()
        };
        info!(
            "Relay stopped: {} sent to live room, {} failed, {} correlations held",
            summary.gate.sent, summary.gate.failed, summary.correlation.entries
        );
        summary
    }
}

impl Drop for RelaySupervisor {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
        for handle in [self.stream_handle.take(), self.operator_handle.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
        for (_, handle) in self.background.drain(..) {
            handle.abort();
        }
    }
}

async fn join_ingress(
    task_id: TaskId,
    handle: Option<JoinHandle<IngressSummary>>,
) -> IngressSummary {
    let Some(handle) = handle else {
        return IngressSummary::default();
    };
    match handle.await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Task {} failed: {}", task_id.name(), e);
            IngressSummary::default()
        }
    }
}

async fn join_ingress_within(
    task_id: TaskId,
    handle: Option<JoinHandle<IngressSummary>>,
    within: Duration,
) -> IngressSummary {
    let Some(mut handle) = handle else {
        return IngressSummary::default();
    };
    match tokio::time::timeout(within, &mut handle).await {
        Ok(Ok(summary)) => summary,
        Ok(Err(e)) => {
            error!("Task {} failed: {}", task_id.name(), e);
            IngressSummary::default()
        }
        Err(_) => {
            warn!("Task {} did not stop within {:?}, aborting", task_id.name(), within);
            handle.abort();
            IngressSummary::default()
        }
    }
}
