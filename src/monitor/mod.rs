//! Event ingestion and per-container monitor lifecycle (C2-C5).

pub mod autoscaler;
pub mod listener;
pub mod metrics;
pub mod sampler;
pub mod supervisor;

pub use autoscaler::{Autoscaler, AutoscalerConfig, ScaleAction, ScaleActionError, ScaleDecision, ScaleOutcome};
pub use metrics::Metrics;
pub use supervisor::{Supervisor, SupervisorError};
