//! Monitor Supervisor (C3): owns per-container Sampler/Autoscaler tasks
//! and enforces the `MAX_MONITORS` ceiling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::runtime::{ContainerId, RuntimeClient};
use super::autoscaler::{Autoscaler, AutoscalerConfig, ScaleAction};
use super::sampler;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("at capacity ({0} active monitors)")]
    AtCapacity(usize),
}

struct Monitor {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the set of active Samplers. `attach`/`shutdown` are the only
/// public surface; the active-monitor map is private to this struct
/// (§5's shared-resource policy).
pub struct Supervisor {
    runtime: Arc<dyn RuntimeClient>,
    scaler: Arc<dyn ScaleAction>,
    autoscaler_config: AutoscalerConfig,
    max_monitors: usize,
    active: DashMap<ContainerId, Monitor>,
    count: AtomicUsize,
    root_token: CancellationToken,
}

impl Supervisor {
    pub fn new(
        runtime: Arc<dyn RuntimeClient>,
        scaler: Arc<dyn ScaleAction>,
        autoscaler_config: AutoscalerConfig,
        max_monitors: usize,
        root_token: CancellationToken,
    ) -> Self {
        Self {
            runtime,
            scaler,
            autoscaler_config,
            max_monitors,
            active: DashMap::new(),
            count: AtomicUsize::new(0),
            root_token,
        }
    }

    /// Idempotent: a second `attach` for an id already monitored is a
    /// no-op. Rejects with `AtCapacity` when the active count is already
    /// at `max_monitors`.
    pub fn attach(self: &Arc<Self>, id: ContainerId) -> Result<(), SupervisorError> {
        if self.active.contains_key(&id) {
            return Ok(());
        }

        loop {
            let current = self.count.load(Ordering::SeqCst);
            if current >= self.max_monitors {
                return Err(SupervisorError::AtCapacity(current));
            }
            if self
                .count
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
        }

        // Re-check under the map entry in case of a concurrent attach race.
        if self.active.contains_key(&id) {
            self.count.fetch_sub(1, Ordering::SeqCst);
            return Ok(());
        }

        let token = self.root_token.child_token();
        let handle = self.spawn_monitor(id.clone(), token.clone());

        self.active.insert(id.clone(), Monitor { token, handle });
        info!(container_id = %id, active = self.count.load(Ordering::SeqCst), "attached monitor");
        Ok(())
    }

    fn spawn_monitor(self: &Arc<Self>, id: ContainerId, token: CancellationToken) -> JoinHandle<()> {
        let runtime = self.runtime.clone();
        let scaler = self.scaler.clone();
        let autoscaler_config = AutoscalerConfig {
            cooldown: self.autoscaler_config.cooldown,
            poll_idle: self.autoscaler_config.poll_idle,
        };
        let this = self.clone();
        let monitor_id = id.clone();

        tokio::spawn(async move {
            let (tx, rx) = mpsc::channel(64);
            let autoscaler = Autoscaler::new(monitor_id.clone(), autoscaler_config);

            let sampler_token = token.clone();
            let sampler_runtime = runtime.clone();
            let sampler_id = monitor_id.clone();
            let sampler_handle = tokio::spawn(async move {
                if let Err(e) = sampler::run(sampler_id.clone(), sampler_runtime.as_ref(), tx, sampler_token).await {
                    warn!(container_id = %sampler_id, error = %e, "sampler exited with a fatal error");
                }
            });

            if let Err(e) = autoscaler.run(rx, scaler, token).await {
                warn!(container_id = %monitor_id, error = %e, "autoscaler exited with a fatal error");
            }

            sampler_handle.abort();
            this.active.remove(&monitor_id);
            this.count.fetch_sub(1, Ordering::SeqCst);
        })
    }

    /// Cancels all children and waits for them to drain.
    pub async fn shutdown(&self) {
        let ids: Vec<ContainerId> = self.active.iter().map(|e| e.key().clone()).collect();
        let mut handles = Vec::with_capacity(ids.len());

        for id in ids {
            if let Some((_, monitor)) = self.active.remove(&id) {
                monitor.token.cancel();
                handles.push(monitor.handle);
            }
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    pub fn active_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ContainerSpec, RuntimeError, RuntimeResult, RuntimeEvent};
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};

    struct NeverSendingRuntime;

    #[async_trait]
    impl RuntimeClient for NeverSendingRuntime {
        async fn subscribe_events(&self) -> RuntimeResult<BoxStream<'static, RuntimeResult<RuntimeEvent>>> {
            Ok(Box::pin(stream::pending()))
        }
        async fn stream_stats(&self, _id: &ContainerId) -> RuntimeResult<BoxStream<'static, RuntimeResult<crate::runtime::StatsSample>>> {
            Ok(Box::pin(stream::pending()))
        }
        async fn inspect(&self, _id: &ContainerId) -> RuntimeResult<ContainerSpec> {
            Err(RuntimeError::NotFound("n/a".into()))
        }
        async fn create(&self, _spec: &ContainerSpec, _name: &str) -> RuntimeResult<ContainerId> {
            Err(RuntimeError::NotFound("n/a".into()))
        }
        async fn start(&self, _id: &ContainerId) -> RuntimeResult<()> {
            Ok(())
        }
        async fn remove(&self, _id: &ContainerId) -> RuntimeResult<()> {
            Ok(())
        }
    }

    struct NoopScaler;

    #[async_trait]
    impl ScaleAction for NoopScaler {
        async fn scale(
            &self,
            _id: &ContainerId,
        ) -> Result<super::super::autoscaler::ScaleOutcome, super::super::autoscaler::ScaleActionError> {
            Ok(super::super::autoscaler::ScaleOutcome::Scaled)
        }
    }

    fn new_supervisor(max: usize) -> Arc<Supervisor> {
        Arc::new(Supervisor::new(
            Arc::new(NeverSendingRuntime),
            Arc::new(NoopScaler),
            AutoscalerConfig::default(),
            max,
            CancellationToken::new(),
        ))
    }

    #[tokio::test]
    async fn attach_is_idempotent() {
        let sup = new_supervisor(10);
        sup.attach(ContainerId::from("c1")).unwrap();
        sup.attach(ContainerId::from("c1")).unwrap();
        assert_eq!(sup.active_count(), 1);
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn attach_rejects_at_capacity() {
        let sup = new_supervisor(1);
        sup.attach(ContainerId::from("c1")).unwrap();
        let err = sup.attach(ContainerId::from("c2")).unwrap_err();
        assert!(matches!(err, SupervisorError::AtCapacity(1)));
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_drains_all_monitors() {
        let sup = new_supervisor(10);
        sup.attach(ContainerId::from("c1")).unwrap();
        sup.attach(ContainerId::from("c2")).unwrap();
        sup.shutdown().await;
        assert_eq!(sup.active_count(), 0);
    }
}
