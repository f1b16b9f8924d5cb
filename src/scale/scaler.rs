//! Scaler (C6): the clone procedure described in spec §4.6. Decoupled
//! from the Autoscaler's decision loop and from the LB's transport (§9).

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::lb::{emit_best_effort, LbClient, LbRequest};
use crate::monitor::{ScaleAction, ScaleActionError, ScaleOutcome};
use crate::runtime::{ContainerId, ContainerSpec, PortMap, RuntimeClient, RuntimeError};

#[derive(Error, Debug)]
pub enum ScaleError {
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("{0}")]
    Other(String),
}

/// Performs the clone-and-rebind procedure and hands the result to the
/// LB control plane. One instance is shared across every container's
/// Autoscaler (it holds no per-container state).
pub struct Scaler {
    runtime: Arc<dyn RuntimeClient>,
    lb_client: Arc<LbClient>,
}

impl Scaler {
    pub fn new(runtime: Arc<dyn RuntimeClient>, lb_client: Arc<LbClient>) -> Self {
        Self { runtime, lb_client }
    }

    pub async fn perform_scaling(&self, id: &ContainerId) -> Result<ScaleOutcome, ScaleError> {
        let spec = match self.runtime.inspect(id).await {
            Ok(spec) => spec,
            Err(RuntimeError::NotFound(_)) => return Ok(ScaleOutcome::NotFound),
            Err(e) => return Err(ScaleError::Runtime(e)),
        };

        let original_name = strip_leading_slash(&spec.name);
        if original_name.ends_with("-copy") {
            info!(container_id = %id, name = %original_name, "already a copy, skipping");
            return Ok(ScaleOutcome::AlreadyCopy);
        }

        let Some(original_port) = first_non_empty_host_port(&spec.network_ports) else {
            warn!(container_id = %id, name = %original_name, "no public port bound, skipping scale");
            return Ok(ScaleOutcome::NoPublicPort);
        };

        let rebound_port_bindings = rebind_ports(&spec.port_bindings);

        match self.runtime.remove(id).await {
            Ok(()) => {}
            Err(RuntimeError::NotFound(_)) => return Ok(ScaleOutcome::NotFound),
            Err(e) => return Err(ScaleError::Runtime(e)),
        }

        let mut rebound_spec = spec;
        rebound_spec.port_bindings = rebound_port_bindings;

        let clone_a_name = original_name.clone();
        let clone_b_name = format!("{}-copy", original_name);

        let clone_a = self.create_and_start(&rebound_spec, &clone_a_name).await?;
        let clone_b = self.create_and_start(&rebound_spec, &clone_b_name).await?;

        let upstream_a = self.assigned_host_port(&clone_a).await?;
        let upstream_b = self.assigned_host_port(&clone_b).await?;

        info!(
            container_id = %id,
            original_port,
            clone_a = %clone_a,
            clone_b = %clone_b,
            "scaled container into two clones"
        );

        let request = LbRequest {
            loadbalancer_port: original_port,
            upstream_ports: vec![upstream_a, upstream_b],
        };
        emit_best_effort(&self.lb_client, &request).await;

        Ok(ScaleOutcome::Scaled)
    }

    async fn create_and_start(
        &self,
        spec: &ContainerSpec,
        name: &str,
    ) -> Result<ContainerId, ScaleError> {
        let id = self.runtime.create(spec, name).await?;
        self.runtime.start(&id).await?;
        Ok(id)
    }

    async fn assigned_host_port(&self, id: &ContainerId) -> Result<String, ScaleError> {
        let spec = self.runtime.inspect(id).await?;
        first_non_empty_host_port(&spec.network_ports)
            .ok_or_else(|| ScaleError::Other(format!("clone {} has no assigned host port", id)))
    }
}

#[async_trait]
impl ScaleAction for Scaler {
    async fn scale(&self, id: &ContainerId) -> Result<ScaleOutcome, ScaleActionError> {
        self.perform_scaling(id)
            .await
            .map_err(|e| ScaleActionError(e.to_string()))
    }
}

fn strip_leading_slash(name: &str) -> String {
    name.strip_prefix('/').unwrap_or(name).to_string()
}

/// Clears every binding's `host_port`, retaining container-side port, IP,
/// and protocol, so the runtime assigns fresh ephemeral ports on create.
fn rebind_ports(port_bindings: &PortMap) -> PortMap {
    port_bindings
        .iter()
        .map(|(port, bindings)| {
            let rebound = bindings
                .iter()
                .map(|b| crate::runtime::PortBinding {
                    host_ip: b.host_ip.clone(),
                    host_port: String::new(),
                })
                .collect();
            (port.clone(), rebound)
        })
        .collect()
}

/// First non-empty `host_port` across every container-port's bindings.
/// Iteration order follows the underlying map; the spec itself inherits
/// this non-determinism from the source's unordered port map.
fn first_non_empty_host_port(ports: &PortMap) -> Option<String> {
    ports
        .values()
        .flatten()
        .find(|b| !b.host_port.is_empty())
        .map(|b| b.host_port.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::PortBinding;
    use std::collections::HashMap;

    #[test]
    fn strips_leading_slash() {
        assert_eq!(strip_leading_slash("/web"), "web");
        assert_eq!(strip_leading_slash("web"), "web");
    }

    #[test]
    fn copy_suffix_is_detected() {
        assert!(strip_leading_slash("/web-copy").ends_with("-copy"));
        assert!(!strip_leading_slash("/web").ends_with("-copy"));
    }

    #[test]
    fn rebind_clears_host_port_retains_ip() {
        let mut ports = HashMap::new();
        ports.insert(
            "80/tcp".to_string(),
            vec![PortBinding {
                host_ip: "0.0.0.0".to_string(),
                host_port: "32768".to_string(),
            }],
        );

        let rebound = rebind_ports(&ports);
        let binding = &rebound["80/tcp"][0];
        assert_eq!(binding.host_port, "");
        assert_eq!(binding.host_ip, "0.0.0.0");
    }

    #[test]
    fn first_non_empty_host_port_skips_empty_bindings() {
        let mut ports = HashMap::new();
        ports.insert(
            "80/tcp".to_string(),
            vec![PortBinding {
                host_ip: "0.0.0.0".to_string(),
                host_port: "".to_string(),
            }],
        );
        ports.insert(
            "443/tcp".to_string(),
            vec![PortBinding {
                host_ip: "0.0.0.0".to_string(),
                host_port: "32769".to_string(),
            }],
        );

        assert_eq!(first_non_empty_host_port(&ports), Some("32769".to_string()));
    }

    #[test]
    fn first_non_empty_host_port_is_none_when_all_empty() {
        let mut ports = HashMap::new();
        ports.insert(
            "80/tcp".to_string(),
            vec![PortBinding {
                host_ip: "0.0.0.0".to_string(),
                host_port: "".to_string(),
            }],
        );
        assert_eq!(first_non_empty_host_port(&ports), None);
    }
}
