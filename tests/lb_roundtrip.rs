//! Integration-shaped test for testable scenario 7: sending one
//! `LBRequest` frame over the control-plane WebSocket causes a listener
//! to exist and proxy `GET /` to one of the named upstreams. This is the
//! one test in the suite that binds real sockets end-to-end, so it lives
//! outside the per-module `#[cfg(test)]` blocks.

use std::time::Duration;

use axum::routing::get;
use axum::Router;
use futures_util::SinkExt;
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use golypus::lb;

async fn spawn_upstream(port: u16, body: &'static str) {
    let app = Router::new().route("/", get(move || async move { body }));
    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
}

#[tokio::test]
async fn lb_creation_round_trip_proxies_get_requests() {
    spawn_upstream(19101, "upstream-a").await;
    spawn_upstream(19102, "upstream-b").await;

    let ctx = CancellationToken::new();
    let control_plane_ctx = ctx.clone();
    tokio::spawn(async move {
        lb::run_control_plane("127.0.0.1:19180", "/loadbalancer/create", control_plane_ctx)
            .await
            .unwrap();
    });

    // Give the control plane's listener a moment to bind.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (mut ws, _) = connect_async("ws://127.0.0.1:19180/loadbalancer/create")
        .await
        .expect("failed to connect to lb control plane");
    let frame = r#"{"loadBalancerPort":"19190","ports":["19101","19102"]}"#;
    ws.send(Message::Text(frame.to_string())).await.unwrap();
    ws.close(None).await.unwrap();

    // Give the spawner time to stand up the reverse proxy.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = reqwest::Client::new();
    let mut seen = std::collections::HashSet::new();
    for _ in 0..4 {
        let resp = client
            .get("http://127.0.0.1:19190/")
            .send()
            .await
            .expect("proxy did not respond");
        assert!(resp.status().is_success());
        let body = resp.text().await.unwrap();
        assert!(body == "upstream-a" || body == "upstream-b");
        seen.insert(body);
    }
    assert_eq!(seen.len(), 2, "round-robin should have hit both upstreams");

    ctx.cancel();
}
