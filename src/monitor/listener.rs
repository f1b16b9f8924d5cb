//! Event Listener (C2): subscribes to the runtime event stream and hands
//! new container ids to the Supervisor after a warm-up delay.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::StreamExt;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::runtime::{ContainerId, RuntimeClient, RuntimeError};
use super::supervisor::{Supervisor, SupervisorError};

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Opens the event subscription and, for every `container`/`create`
/// event, schedules a cancellable 30 s warm-up before handing the id to
/// the Supervisor. Returns fatally on a transport error; returns `Ok`
/// cleanly on cancellation.
pub async fn run(
    runtime: Arc<dyn RuntimeClient>,
    supervisor: Arc<Supervisor>,
    warmup: Duration,
    ctx: CancellationToken,
) -> Result<(), ListenerError> {
    let mut events = runtime.subscribe_events().await?;
    let mut warmups: JoinSet<ContainerId> = JoinSet::new();

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                info!("event listener cancelled, shutting down");
                warmups.shutdown().await;
                return Ok(());
            }

            event = events.next() => {
                match event {
                    None => {
                        info!("event stream closed");
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        error!("fatal transport error from event stream: {}", e);
                        return Err(ListenerError::Runtime(e));
                    }
                    Some(Ok(ev)) => {
                        if ev.is_container_create() {
                            let id = ContainerId::from(ev.actor_id.as_str());
                            info!(container_id = %id, "container created");
                            let warmup_ctx = ctx.clone();
                            let warmup_id = id.clone();
                            warmups.spawn(async move {
                                tokio::select! {
                                    _ = warmup_ctx.cancelled() => {}
                                    _ = tokio::time::sleep(warmup) => {}
                                }
                                warmup_id
                            });
                        }
                    }
                }
            }

            Some(done) = warmups.join_next(), if !warmups.is_empty() => {
                if let Ok(id) = done {
                    if ctx.is_cancelled() {
                        continue;
                    }
                    match supervisor.attach(id.clone()) {
                        Ok(()) => debug!(container_id = %id, "handed off to supervisor"),
                        Err(SupervisorError::AtCapacity(n)) => {
                            warn!(container_id = %id, active = n, "supervisor at capacity, dropping create-event");
                        }
                    }
                }
            }
        }
    }
}
