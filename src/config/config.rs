//! Configuration structures and loading

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Daemon configuration. Loaded once at startup from a TOML file
/// (default `golypus.toml`); every field has a default so an empty or
/// partial file is a valid configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    /// Hard ceiling on concurrently active Samplers (§4.3).
    #[serde(default = "default_max_monitors")]
    pub max_monitors: usize,

    /// Delay between a container `create` event and Sampler attach (§3).
    #[serde(default = "default_warmup_secs")]
    pub warmup_secs: u64,

    /// Minimum elapsed time between two scaling actions for one container.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Sleep duration when a sample does not cross a threshold.
    #[serde(default = "default_poll_idle_secs")]
    pub poll_idle_secs: u64,

    /// Bind address for the LB control plane's WebSocket endpoint.
    #[serde(default = "default_lb_bind")]
    pub lb_bind: String,

    /// Path the LB control plane mounts its single WebSocket route on.
    #[serde(default = "default_lb_path")]
    pub lb_path: String,

    /// PID file path, used only when `daemonize` is true.
    #[serde(default = "default_pid_file")]
    pub pid_file: String,

    /// Log file path, used only when `daemonize` is true.
    #[serde(default = "default_log_file")]
    pub log_file: String,

    /// Double-fork into the background. Off by default so tests and
    /// interactive runs stay attached to the foreground terminal.
    #[serde(default)]
    pub daemonize: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            max_monitors: default_max_monitors(),
            warmup_secs: default_warmup_secs(),
            cooldown_secs: default_cooldown_secs(),
            poll_idle_secs: default_poll_idle_secs(),
            lb_bind: default_lb_bind(),
            lb_path: default_lb_path(),
            pid_file: default_pid_file(),
            log_file: default_log_file(),
            daemonize: false,
        }
    }
}

impl Configuration {
    /// Loads configuration from a TOML file. A missing file is not an
    /// error at the call site in `cmd::root`; callers that want that
    /// behaviour check existence themselves before calling this.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path))?;
        let config: Configuration =
            toml::from_str(&content).with_context(|| "failed to parse configuration")?;
        Ok(config)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn poll_idle(&self) -> Duration {
        Duration::from_secs(self.poll_idle_secs)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.warmup_secs)
    }

    /// The WebSocket URL the Scaler dials to reach this process's own LB
    /// control plane, derived from `lb_bind`'s port and `lb_path`.
    pub fn lb_client_url(&self) -> String {
        let port = self
            .lb_bind
            .rsplit(':')
            .next()
            .unwrap_or("4444");
        format!("ws://localhost:{}{}", port, self.lb_path)
    }
}

fn default_max_monitors() -> usize {
    10
}

fn default_warmup_secs() -> u64 {
    30
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_poll_idle_secs() -> u64 {
    60
}

fn default_lb_bind() -> String {
    "0.0.0.0:4444".to_string()
}

fn default_lb_path() -> String {
    "/loadbalancer/create".to_string()
}

fn default_pid_file() -> String {
    "golypus.pid".to_string()
}

fn default_log_file() -> String {
    "golypus.log".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_compile_time_constants() {
        let config = Configuration::default();
        assert_eq!(config.max_monitors, 10);
        assert_eq!(config.warmup_secs, 30);
        assert_eq!(config.cooldown_secs, 300);
        assert_eq!(config.poll_idle_secs, 60);
        assert_eq!(config.lb_bind, "0.0.0.0:4444");
        assert_eq!(config.lb_path, "/loadbalancer/create");
        assert!(!config.daemonize);
    }

    #[test]
    fn empty_toml_document_parses_to_defaults() {
        let config: Configuration = toml::from_str("").unwrap();
        assert_eq!(config.max_monitors, 10);
        assert_eq!(config.lb_bind, "0.0.0.0:4444");
    }

    #[test]
    fn partial_override_keeps_remaining_defaults() {
        let config: Configuration = toml::from_str("max_monitors = 25\ndaemonize = true\n").unwrap();
        assert_eq!(config.max_monitors, 25);
        assert!(config.daemonize);
        assert_eq!(config.cooldown_secs, 300);
    }

    #[test]
    fn lb_client_url_derives_from_bind_port() {
        let mut config = Configuration::default();
        config.lb_bind = "0.0.0.0:9999".to_string();
        assert_eq!(config.lb_client_url(), "ws://localhost:9999/loadbalancer/create");
    }
}
