mod signal_tests;

use meshcall_relay::{SignalingService, serve};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::Level;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Starts a relay on an ephemeral port and returns its WebSocket URL.
pub async fn start_relay() -> (String, SignalingService) {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("bind relay listener");
    let addr = listener.local_addr().expect("relay address");
    let service = SignalingService::new();

    tokio::spawn({
        let service = service.clone();
        async move {
            let _ = serve(listener, service).await;
        }
    });

    (format!("ws://{}/ws", addr), service)
}
