//! Per-container decision engine (C5): thresholds, cooldown, one-shot latch.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::runtime::ContainerId;
use super::metrics::Metrics;

/// Decouples the Autoscaler's decision from the Scaler's transport, so
/// each is independently testable (§9).
#[async_trait]
pub trait ScaleAction: Send + Sync {
    async fn scale(&self, id: &ContainerId) -> Result<ScaleOutcome, ScaleActionError>;
}

/// A non-error result of invoking the Scaler. Only `Scaled` advances the
/// Autoscaler's `(scaled, last_scaled)` latch; the skip variants are
/// logged and otherwise transparent to the Autoscaler's loop (§7: a
/// `NoPublicPort` or a disappeared container is a skip, not a failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleOutcome {
    Scaled,
    AlreadyCopy,
    NoPublicPort,
    NotFound,
}

#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct ScaleActionError(pub String);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleDecision {
    pub triggered: bool,
    pub mem_over: bool,
    pub cpu_over: bool,
    pub at: SystemTime,
}

/// Evaluates the spec's two threshold conditions against one `Metrics`
/// sample. Integer arithmetic for memory, as specified. `at` is the
/// wall-clock time of the sample that produced this decision.
pub fn evaluate(m: &Metrics) -> ScaleDecision {
    let mem_over = m.mem_used >= (m.mem_avail.saturating_mul(75)) / 100;
    let cpu_over = m.cpu_perc >= m.cpu_max_perc * 0.75;
    ScaleDecision {
        triggered: mem_over || cpu_over,
        mem_over,
        cpu_over,
        at: SystemTime::now(),
    }
}

pub struct AutoscalerConfig {
    pub cooldown: Duration,
    pub poll_idle: Duration,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(300),
            poll_idle: Duration::from_secs(60),
        }
    }
}

/// Per-container decision task. Owns `(scaled, last_scaled)` exclusively;
/// no shared mutex (§9).
pub struct Autoscaler {
    container_id: ContainerId,
    config: AutoscalerConfig,
    scaled: bool,
    last_scaled: Instant,
}

impl Autoscaler {
    pub fn new(container_id: ContainerId, config: AutoscalerConfig) -> Self {
        let last_scaled = Instant::now() - config.cooldown;
        Self {
            container_id,
            config,
            scaled: false,
            last_scaled,
        }
    }

    /// Consumes metrics from the Sampler until the channel closes, the
    /// context is cancelled, or the Scaler returns a fatal error.
    pub async fn run(
        mut self,
        mut metrics_rx: mpsc::Receiver<Metrics>,
        scaler: Arc<dyn ScaleAction>,
        ctx: CancellationToken,
    ) -> Result<(), ScaleActionError> {
        loop {
            let metrics = tokio::select! {
                _ = ctx.cancelled() => {
                    debug!("autoscaler for {} cancelled", self.container_id);
                    return Ok(());
                }
                m = metrics_rx.recv() => match m {
                    Some(m) => m,
                    None => {
                        debug!("metrics channel closed for {}", self.container_id);
                        return Ok(());
                    }
                },
            };

            let decision = evaluate(&metrics);
            debug!(
                container_id = %self.container_id,
                mem_used = metrics.mem_used,
                mem_avail = metrics.mem_avail,
                cpu_perc = metrics.cpu_perc,
                cpu_max_perc = metrics.cpu_max_perc,
                mem_over = decision.mem_over,
                cpu_over = decision.cpu_over,
                "evaluated scale decision"
            );

            if !decision.triggered {
                tokio::select! {
                    _ = ctx.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(self.config.poll_idle) => {}
                }
                continue;
            }

            if !self.scaled && self.last_scaled.elapsed() >= self.config.cooldown {
                info!(container_id = %self.container_id, "scale threshold crossed, invoking scaler");
                match scaler.scale(&self.container_id).await {
                    Ok(ScaleOutcome::Scaled) => {
                        self.scaled = true;
                        self.last_scaled = Instant::now();
                    }
                    Ok(ScaleOutcome::AlreadyCopy) => {
                        // Recursion guard: this container is itself a clone.
                        // Latch permanently so we never probe it again.
                        self.scaled = true;
                    }
                    Ok(ScaleOutcome::NoPublicPort) | Ok(ScaleOutcome::NotFound) => {
                        debug!(container_id = %self.container_id, "scale skipped, will retry on next trigger");
                    }
                    Err(e) => {
                        warn!(container_id = %self.container_id, error = %e, "scaler failed, aborting autoscaler");
                        return Err(e);
                    }
                }
            }
            // else: still in cooldown or already scaled — loop immediately
            // and re-evaluate on the next sample.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(mem_used: u64, mem_avail: u64, cpu_perc: f64, cpu_max_perc: f64) -> Metrics {
        Metrics {
            container_id: ContainerId::from("c1"),
            mem_used,
            mem_avail,
            cpu_perc,
            cpu_max_perc,
        }
    }

    #[test]
    fn scale_on_memory_scenario() {
        let d = evaluate(&metrics(800, 1000, 0.0, 400.0));
        assert!(d.mem_over);
        assert!(!d.cpu_over);
        assert!(d.triggered);
    }

    #[test]
    fn sub_threshold_quiescence_scenario() {
        let d = evaluate(&metrics(500, 1000, 100.0, 400.0));
        assert!(!d.mem_over);
        assert!(!d.cpu_over);
        assert!(!d.triggered);
    }

    #[test]
    fn cpu_over_threshold() {
        let d = evaluate(&metrics(0, 1000, 350.0, 400.0));
        assert!(d.cpu_over);
        assert!(d.triggered);
    }

    struct CountingScaler {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ScaleAction for CountingScaler {
        async fn scale(&self, _id: &ContainerId) -> Result<ScaleOutcome, ScaleActionError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(ScaleOutcome::Scaled)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn single_scale_latch_across_many_triggering_samples() {
        let (tx, rx) = mpsc::channel(16);
        let scaler = Arc::new(CountingScaler {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let ctx = CancellationToken::new();

        let autoscaler = Autoscaler::new(
            ContainerId::from("c1"),
            AutoscalerConfig {
                cooldown: Duration::from_secs(300),
                poll_idle: Duration::from_secs(60),
            },
        );

        let handle = tokio::spawn(autoscaler.run(rx, scaler.clone(), ctx.clone()));

        for _ in 0..5 {
            tx.send(metrics(900, 1000, 0.0, 400.0)).await.unwrap();
        }
        drop(tx);

        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;

        assert_eq!(scaler.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_terminates_cleanly_without_scaling() {
        let (tx, rx) = mpsc::channel(4);
        let scaler = Arc::new(CountingScaler {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let ctx = CancellationToken::new();

        let autoscaler = Autoscaler::new(ContainerId::from("c1"), AutoscalerConfig::default());
        let handle = tokio::spawn(autoscaler.run(rx, scaler.clone(), ctx.clone()));

        ctx.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;

        assert!(result.is_ok());
        assert_eq!(scaler.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        drop(tx);
    }
}
