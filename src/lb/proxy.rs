//! Reverse Proxy (C8): a plain HTTP listener that round-robins requests
//! across a fixed upstream set.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("proxy has no upstreams")]
    NoUpstreams,
}

/// A fixed upstream set fronted by one round-robin cursor. The upstream
/// list is immutable after construction; only the cursor is shared.
pub struct Proxy {
    listen_port: String,
    upstreams: Vec<String>,
    cursor: AtomicU32,
    client: reqwest::Client,
}

impl Proxy {
    pub fn new(listen_port: impl Into<String>, upstreams: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            listen_port: listen_port.into(),
            upstreams,
            cursor: AtomicU32::new(0),
            client: reqwest::Client::new(),
        })
    }

    /// Starvation-free round-robin: each CAS failure re-reads a
    /// monotonically changing value. Returns the pre-increment upstream.
    fn next_upstream(&self) -> &str {
        let len = self.upstreams.len() as u32;
        loop {
            let current = self.cursor.load(Ordering::SeqCst);
            let next = (current + 1) % len;
            if self
                .cursor
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return &self.upstreams[current as usize];
            }
        }
    }

    /// Binds `listen_port` and proxies every request until `ctx` is
    /// cancelled or the listener errors.
    pub async fn serve(self: Arc<Self>, ctx: CancellationToken) -> Result<(), ProxyError> {
        if self.upstreams.is_empty() {
            return Err(ProxyError::NoUpstreams);
        }

        let addr = format!("0.0.0.0:{}", self.listen_port);
        let listener = TcpListener::bind(&addr).await?;
        info!(listen = %addr, upstreams = ?self.upstreams, "reverse proxy listening");

        let app = Router::new()
            .fallback(proxy_handler)
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone());

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { ctx.cancelled().await })
            .await?;

        Ok(())
    }
}

async fn proxy_handler(State(proxy): State<Arc<Proxy>>, req: Request<Body>) -> Response {
    let upstream = proxy.next_upstream().to_string();

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("http://localhost:{}{}", upstream, path_and_query);
    let url = match reqwest::Url::parse(&url) {
        Ok(u) => u,
        Err(e) => {
            warn!(upstream = %upstream, error = %e, "failed to parse upstream url");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let method = req.method().clone();
    let headers = req.headers().clone();
    let body = match axum::body::to_bytes(req.into_body(), usize::MAX).await {
        Ok(b) => b,
        Err(_) => return StatusCode::BAD_GATEWAY.into_response(),
    };

    let upstream_req = proxy
        .client
        .request(method, url)
        .headers(headers)
        .body(body);

    match upstream_req.send().await {
        Ok(resp) => {
            let status = resp.status();
            let headers = resp.headers().clone();
            let body = resp.bytes().await.unwrap_or_default();

            let mut builder = Response::builder().status(status);
            for (name, value) in headers.iter() {
                builder = builder.header(name, value);
            }
            builder.body(Body::from(body)).unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
        }
        Err(e) => {
            warn!(upstream = %upstream, error = %e, "upstream request failed");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_with_two_upstreams_is_periodic() {
        let proxy = Proxy::new("0", vec!["9001".to_string(), "9002".to_string()]);
        let picks: Vec<&str> = (0..6).map(|_| proxy.next_upstream()).collect();
        assert_eq!(picks, vec!["9001", "9002", "9001", "9002", "9001", "9002"]);
    }

    #[test]
    fn round_robin_distribution_is_balanced_over_n_requests() {
        let proxy = Proxy::new("0", vec!["a".into(), "b".into(), "c".into()]);
        let mut counts = std::collections::HashMap::new();
        for _ in 0..10 {
            *counts.entry(proxy.next_upstream().to_string()).or_insert(0) += 1;
        }
        // 10 requests over 3 upstreams: floor(10/3)=3, ceil=4.
        for count in counts.values() {
            assert!(*count == 3 || *count == 4);
        }
    }
}
