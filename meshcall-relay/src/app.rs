use crate::signaling::{SignalingService, ws_handler};
use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tracing::info;

pub fn router(service: SignalingService) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(service)
}

/// Serves the relay on an already bound listener until the process exits.
pub async fn serve(listener: TcpListener, service: SignalingService) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Relay listening on ws://{}/ws", addr);
    }
    axum::serve(listener, router(service)).await
}
