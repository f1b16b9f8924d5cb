//! Domain types shared by every runtime adapter implementation.

use std::collections::HashMap;
use std::fmt;

/// Opaque runtime-assigned container identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(pub String);

impl ContainerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ContainerId {
    fn from(s: String) -> Self {
        ContainerId(s)
    }
}

impl From<&str> for ContainerId {
    fn from(s: &str) -> Self {
        ContainerId(s.to_string())
    }
}

/// `(host_ip, host_port)` — `host_port` empty means "runtime assigns".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: String,
}

/// Per container-port list of host bindings, keyed `"<port>/<proto>"` the
/// way the Docker API itself keys `PortBindings`/`NetworkSettings.Ports`.
pub type PortMap = HashMap<String, Vec<PortBinding>>;

/// Opaque structured inspect record. The Scaler mutates `port_bindings`
/// in place (clearing host ports) and passes the whole thing back into
/// `RuntimeClient::create`; every other field is carried through untouched.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub config: serde_json::Value,
    pub host_config: serde_json::Value,
    pub port_bindings: PortMap,
    pub network_ports: PortMap,
    pub networks: serde_json::Value,
}

/// One sample of raw runtime statistics, the Sampler's input.
#[derive(Debug, Clone, Default)]
pub struct StatsSample {
    pub mem_used: u64,
    pub mem_avail: u64,
    pub cpu_total_usage: u64,
    pub cpu_system_usage: u64,
    pub online_cpus: u64,
}

/// A runtime event of interest to the Event Listener.
#[derive(Debug, Clone)]
pub struct RuntimeEvent {
    pub kind: String,
    pub action: String,
    pub actor_id: String,
}

impl RuntimeEvent {
    pub fn is_container_create(&self) -> bool {
        self.kind == "container" && self.action == "create"
    }
}
