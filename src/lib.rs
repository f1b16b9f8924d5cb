//! golypus - Docker container autoscaling daemon library.
//!
//! Event ingestion (C1-C3), per-container sampling and decision-making
//! (C4-C5), the scale-out clone procedure (C6), and the load-balancer
//! control plane + reverse proxy (C7-C8).

pub mod cmd;
pub mod config;
pub mod error;
pub mod lb;
pub mod monitor;
pub mod runtime;
pub mod scale;

pub use config::Configuration;
pub use error::{DaemonError, Result};
