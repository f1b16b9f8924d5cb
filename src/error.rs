//! Top-level error type for the daemon root (§7's error table, as seen
//! by `cmd::root::run`).

use thiserror::Error;

use crate::lb::ControlPlaneError;
use crate::monitor::listener::ListenerError;
use crate::runtime::RuntimeError;
use crate::scale::ScaleError;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("scale error: {0}")]
    Scale(#[from] ScaleError),

    #[error("event listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("lb control plane error: {0}")]
    ControlPlane(#[from] ControlPlaneError),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("daemon task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
