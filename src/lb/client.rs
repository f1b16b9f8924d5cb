//! WebSocket client the Scaler uses to hand an `LbRequest` to the LB
//! control plane (§6's `ws://localhost:4444/loadbalancer/create`).

use futures_util::SinkExt;
use thiserror::Error;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::types::LbRequest;

#[derive(Error, Debug)]
pub enum LbClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A thin client over the LB control plane's single endpoint. One frame,
/// one connection: the scaler dials, sends the request, and closes.
pub struct LbClient {
    url: String,
}

impl LbClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub async fn emit(&self, request: &LbRequest) -> Result<(), LbClientError> {
        let (mut ws, _response) = connect_async(&self.url).await?;
        let payload = serde_json::to_string(request)?;

        ws.send(Message::Text(payload)).await?;
        ws.close(None).await?;

        debug!(
            loadbalancer_port = %request.loadbalancer_port,
            upstreams = ?request.upstream_ports,
            "emitted lb request"
        );
        Ok(())
    }
}

/// Logs and swallows a client error rather than propagating it, since an
/// LB-creation failure does not roll back the clone procedure that
/// already succeeded (§4.6: the sequence is non-atomic by design).
pub async fn emit_best_effort(client: &LbClient, request: &LbRequest) {
    if let Err(e) = client.emit(request).await {
        warn!(loadbalancer_port = %request.loadbalancer_port, error = %e, "failed to emit lb request");
    }
}
