//! The small domain interface the rest of the core depends on (C1).

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use super::types::{ContainerId, ContainerSpec, RuntimeEvent, StatsSample};

#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Retry-candidate: socket/transport failure talking to the runtime.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Name already taken by another container.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller's context was cancelled; not a failure.
    #[error("cancelled")]
    Cancelled,

    #[error("no public port found for container {0}")]
    NoPublicPort(String),

    #[error("decode error: {0}")]
    Decode(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Translates runtime-specific calls into the domain interface the
/// monitor/scale pipeline consumes. One production implementation
/// (`DockerRuntime`) backs this; tests use an in-memory fake.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Open-ended event subscription. The stream item is `Err` for
    /// transport failures; the caller treats those as fatal.
    async fn subscribe_events(&self) -> RuntimeResult<BoxStream<'static, RuntimeResult<RuntimeEvent>>>;

    /// Server-push stats stream, one decoded sample per server frame.
    async fn stream_stats(
        &self,
        id: &ContainerId,
    ) -> RuntimeResult<BoxStream<'static, RuntimeResult<StatsSample>>>;

    async fn inspect(&self, id: &ContainerId) -> RuntimeResult<ContainerSpec>;

    async fn create(&self, spec: &ContainerSpec, name: &str) -> RuntimeResult<ContainerId>;

    async fn start(&self, id: &ContainerId) -> RuntimeResult<()>;

    async fn remove(&self, id: &ContainerId) -> RuntimeResult<()>;
}
