//! Per-container stats-to-metrics loop (C4).

use futures::stream::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::runtime::{ContainerId, RuntimeClient, RuntimeError, StatsSample};
use super::metrics::to_metrics;

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Reads the stats stream for one container and publishes one `Metrics`
/// per decoded sample until the stream ends, decode fails, or `ctx` is
/// cancelled. A malformed/dropped sample is fatal for this Sampler.
pub async fn run(
    container_id: ContainerId,
    runtime: &dyn RuntimeClient,
    metrics_tx: mpsc::Sender<super::metrics::Metrics>,
    ctx: CancellationToken,
) -> Result<(), SamplerError> {
    let mut stream = runtime.stream_stats(&container_id).await?;
    let mut prev: Option<StatsSample> = None;

    loop {
        let next = tokio::select! {
            _ = ctx.cancelled() => {
                debug!("sampler for {} cancelled", container_id);
                return Ok(());
            }
            item = stream.next() => item,
        };

        let sample = match next {
            None => {
                debug!("stats stream closed for {}", container_id);
                return Ok(());
            }
            Some(Err(e)) => {
                warn!("sampler for {} hit a fatal decode error: {}", container_id, e);
                return Err(SamplerError::Runtime(e));
            }
            Some(Ok(s)) => s,
        };

        let metrics = to_metrics(container_id.clone(), prev.as_ref(), &sample);
        prev = Some(sample);

        if metrics_tx.send(metrics).await.is_err() {
            debug!("autoscaler for {} gone, stopping sampler", container_id);
            return Ok(());
        }
    }
}
