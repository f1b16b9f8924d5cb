//! `bollard`-backed implementation of [`RuntimeClient`] (C1).

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions, StatsOptions,
};
use bollard::models::{EndpointSettings, HostConfig, NetworkingConfig, PortBinding as BollardPortBinding};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, warn};

use super::traits::{RuntimeClient, RuntimeError, RuntimeResult};
use super::types::{ContainerId, ContainerSpec, PortBinding, PortMap, RuntimeEvent, StatsSample};

pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connect using the conventional environment variables
    /// (`DOCKER_HOST`, `DOCKER_CERT_PATH`, ...), auto-negotiating the API
    /// version against the daemon.
    pub fn connect() -> RuntimeResult<Self> {
        let client = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    fn classify(err: bollard::errors::Error) -> RuntimeError {
        match &err {
            bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
                RuntimeError::NotFound(err.to_string())
            }
            bollard::errors::Error::DockerResponseServerError { status_code: 409, .. } => {
                RuntimeError::Conflict(err.to_string())
            }
            _ => RuntimeError::Transport(err.to_string()),
        }
    }
}

fn to_domain_port_map(src: Option<HashMap<String, Option<Vec<BollardPortBinding>>>>) -> PortMap {
    let mut out: PortMap = HashMap::new();
    for (port, bindings) in src.unwrap_or_default() {
        let list = bindings
            .unwrap_or_default()
            .into_iter()
            .map(|b| PortBinding {
                host_ip: b.host_ip.unwrap_or_default(),
                host_port: b.host_port.unwrap_or_default(),
            })
            .collect();
        out.insert(port, list);
    }
    out
}

fn to_bollard_port_map(src: &PortMap) -> HashMap<String, Option<Vec<BollardPortBinding>>> {
    src.iter()
        .map(|(port, bindings)| {
            let list = bindings
                .iter()
                .map(|b| BollardPortBinding {
                    host_ip: Some(b.host_ip.clone()),
                    host_port: Some(b.host_port.clone()),
                })
                .collect();
            (port.clone(), Some(list))
        })
        .collect()
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn subscribe_events(&self) -> RuntimeResult<BoxStream<'static, RuntimeResult<RuntimeEvent>>> {
        let options = EventsOptions::<String> {
            filters: HashMap::new(),
            ..Default::default()
        };

        let stream = self.client.events(Some(options)).map(|item| match item {
            Ok(msg) => Ok(RuntimeEvent {
                kind: msg
                    .typ
                    .map(|t| format!("{:?}", t).to_lowercase())
                    .unwrap_or_default(),
                action: msg.action.unwrap_or_default(),
                actor_id: msg.actor.and_then(|a| a.id).unwrap_or_default(),
            }),
            Err(e) => Err(DockerRuntime::classify(e)),
        });

        Ok(Box::pin(stream))
    }

    async fn stream_stats(
        &self,
        id: &ContainerId,
    ) -> RuntimeResult<BoxStream<'static, RuntimeResult<StatsSample>>> {
        let options = StatsOptions {
            stream: true,
            one_shot: false,
        };

        let stream = self
            .client
            .stats(id.as_str(), Some(options))
            .map(|item| match item {
                Ok(s) => Ok(StatsSample {
                    mem_used: s.memory_stats.usage.unwrap_or(0),
                    mem_avail: s.memory_stats.limit.unwrap_or(0),
                    cpu_total_usage: s.cpu_stats.cpu_usage.total_usage,
                    cpu_system_usage: s.cpu_stats.system_cpu_usage.unwrap_or(0),
                    online_cpus: s.cpu_stats.online_cpus.unwrap_or(1),
                }),
                Err(e) => {
                    let msg = e.to_string();
                    let stopped = matches!(
                        &e,
                        bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }
                            | bollard::errors::Error::DockerResponseServerError { status_code: 409, .. }
                    ) || msg.contains("is not running")
                        || msg.contains("No such container");

                    if stopped {
                        debug!("container {} stopped sending stats", id);
                    } else {
                        warn!("stats decode error for {}: {}", id, msg);
                    }
                    Err(RuntimeError::Decode(msg))
                }
            });

        Ok(Box::pin(stream))
    }

    async fn inspect(&self, id: &ContainerId) -> RuntimeResult<ContainerSpec> {
        let info = self
            .client
            .inspect_container(id.as_str(), None)
            .await
            .map_err(DockerRuntime::classify)?;

        let name = info.name.unwrap_or_default();
        let config = serde_json::to_value(info.config.unwrap_or_default())
            .map_err(|e| RuntimeError::Decode(e.to_string()))?;
        let host_config = info.host_config.clone().unwrap_or_default();
        let host_config_value = serde_json::to_value(&host_config)
            .map_err(|e| RuntimeError::Decode(e.to_string()))?;
        let port_bindings = to_domain_port_map(host_config.port_bindings);

        let network_settings = info.network_settings.unwrap_or_default();
        let network_ports = to_domain_port_map(network_settings.ports.map(|p| {
            p.into_iter()
                .map(|(k, v)| (k, v))
                .collect::<HashMap<_, _>>()
        }));
        let networks = serde_json::to_value(network_settings.networks.unwrap_or_default())
            .map_err(|e| RuntimeError::Decode(e.to_string()))?;

        Ok(ContainerSpec {
            name,
            config,
            host_config: host_config_value,
            port_bindings,
            network_ports,
            networks,
        })
    }

    async fn create(&self, spec: &ContainerSpec, name: &str) -> RuntimeResult<ContainerId> {
        let mut config: Config<String> = serde_json::from_value(spec.config.clone())
            .map_err(|e| RuntimeError::Decode(e.to_string()))?;

        let mut host_config: HostConfig = serde_json::from_value(spec.host_config.clone())
            .map_err(|e| RuntimeError::Decode(e.to_string()))?;
        host_config.port_bindings = Some(to_bollard_port_map(&spec.port_bindings));
        config.host_config = Some(host_config);

        let endpoints_config: HashMap<String, EndpointSettings> =
            serde_json::from_value(spec.networks.clone()).unwrap_or_default();
        config.networking_config = Some(NetworkingConfig { endpoints_config });

        let options = CreateContainerOptions {
            name,
            platform: None,
        };

        let created = self
            .client
            .create_container(Some(options), config)
            .await
            .map_err(DockerRuntime::classify)?;

        Ok(ContainerId(created.id))
    }

    async fn start(&self, id: &ContainerId) -> RuntimeResult<()> {
        self.client
            .start_container(id.as_str(), None::<StartContainerOptions<String>>)
            .await
            .map_err(DockerRuntime::classify)?;
        Ok(())
    }

    async fn remove(&self, id: &ContainerId) -> RuntimeResult<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: false,
            ..Default::default()
        };

        match self.client.remove_container(id.as_str(), Some(options)).await {
            Ok(_) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
                debug!("container {} already gone, nothing to remove", id);
                Ok(())
            }
            Err(e) => Err(DockerRuntime::classify(e)),
        }
    }
}
