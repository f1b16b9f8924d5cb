//! LB Control Plane (C7): one WebSocket endpoint, `/loadbalancer/create`.
//!
//! Generalized from the teacher's `router/websocket/handler.rs`
//! split/select loop: here each connection runs a Reader task (decode
//! frames into `LbRequest`s) handing off to a Spawner task (stand up a
//! `Proxy` per request) over an internal queue, rather than one task
//! doing both.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::proxy::Proxy;
use super::types::LbRequest;

#[derive(Error, Debug)]
pub enum ControlPlaneError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
struct ControlPlaneState {
    ctx: CancellationToken,
}

/// Binds `bind_addr` and serves the control plane until `ctx` is
/// cancelled. `path` is mounted as the sole route.
pub async fn run(
    bind_addr: &str,
    path: &str,
    ctx: CancellationToken,
) -> Result<(), ControlPlaneError> {
    let state = ControlPlaneState { ctx: ctx.clone() };
    let app = Router::new()
        .route(path, get(ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = TcpListener::bind(bind_addr).await?;
    info!(bind = %bind_addr, path = %path, "lb control plane listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { ctx.cancelled().await })
        .await?;

    Ok(())
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<ControlPlaneState>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state.ctx))
}

/// Runs the Reader/Spawner pair for one connection. Returns once the
/// socket closes, a decode error occurs, or `ctx` is cancelled — at
/// which point every `Proxy` spawned from this connection is torn down.
async fn handle_connection(socket: WebSocket, ctx: CancellationToken) {
    let conn_token = ctx.child_token();
    let (tx, rx) = mpsc::channel::<LbRequest>(16);

    let spawner_token = conn_token.clone();
    let spawner = tokio::spawn(spawn_proxies(rx, spawner_token));
    let reader_result = read_requests(socket, tx, conn_token.clone()).await;

    if let Err(e) = reader_result {
        warn!(error = %e, "lb control plane connection closed with error");
    }

    conn_token.cancel();
    let _ = spawner.await;
}

#[derive(Error, Debug)]
enum ReaderError {
    #[error("invalid lb request frame: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    Transport(#[from] axum::Error),
}

/// Reader: decodes text frames as `LbRequest` and forwards to the
/// Spawner. A decode error or transport error terminates the connection.
async fn read_requests(
    mut socket: WebSocket,
    tx: mpsc::Sender<LbRequest>,
    ctx: CancellationToken,
) -> Result<(), ReaderError> {
    loop {
        tokio::select! {
            _ = ctx.cancelled() => return Ok(()),
            frame = socket.next() => {
                let Some(frame) = frame else { return Ok(()) };
                match frame? {
                    Message::Text(text) => {
                        let request: LbRequest = serde_json::from_str(&text)?;
                        debug!(loadbalancer_port = %request.loadbalancer_port, "lb request decoded");
                        if tx.send(request).await.is_err() {
                            return Ok(());
                        }
                    }
                    Message::Close(_) => return Ok(()),
                    _ => {}
                }
            }
        }
    }
}

/// Spawner: drains the queue and stands up one `Proxy` task per request.
/// All proxies it started are cancelled and drained when `ctx` fires.
async fn spawn_proxies(mut rx: mpsc::Receiver<LbRequest>, ctx: CancellationToken) {
    let mut proxies: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            _ = ctx.cancelled() => break,
            request = rx.recv() => {
                let Some(request) = request else { break };
                let proxy = Proxy::new(request.loadbalancer_port.clone(), request.upstream_ports.clone());
                let proxy_ctx = ctx.child_token();
                proxies.spawn(async move {
                    if let Err(e) = proxy.serve(proxy_ctx).await {
                        warn!(error = %e, "reverse proxy exited with an error");
                    }
                });
            }
        }
    }

    ctx.cancel();
    while proxies.join_next().await.is_some() {}
}
