//! Load balancer control plane and reverse proxy (C7-C8).

pub mod client;
pub mod control_plane;
pub mod proxy;
pub mod types;

pub use client::{emit_best_effort, LbClient, LbClientError};
pub use control_plane::{run as run_control_plane, ControlPlaneError};
pub use proxy::{Proxy, ProxyError};
pub use types::LbRequest;
