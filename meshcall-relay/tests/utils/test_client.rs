use anyhow::{Context, Result, bail};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use meshcall_core::{ClientFrame, PeerId, RelayFrame, RoomCode};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// Timeout for a single expected relay frame (ms).
pub const FRAME_TIMEOUT_MS: u64 = 2000;

/// Window in which no frame is expected to arrive (ms).
pub const QUIET_WINDOW_MS: u64 = 200;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bare WebSocket client speaking the relay frame protocol.
pub struct TestClient {
    pub peer_id: PeerId,
    sink: SplitSink<Socket, Message>,
    stream: SplitStream<Socket>,
}

impl TestClient {
    pub async fn connect(url: &str) -> Result<Self> {
        let (socket, _) = connect_async(url).await.context("connect to relay")?;
        let (sink, stream) = socket.split();
        let mut client = Self {
            peer_id: PeerId::from("unassigned"),
            sink,
            stream,
        };

        match client.recv().await? {
            RelayFrame::Welcome { peer_id } => client.peer_id = peer_id,
            other => bail!("Expected Welcome, got {:?}", other),
        }
        Ok(client)
    }

    pub async fn send(&mut self, frame: ClientFrame) -> Result<()> {
        let json = serde_json::to_string(&frame)?;
        self.sink.send(Message::Text(json.into())).await?;
        Ok(())
    }

    pub async fn join(&mut self, room: &str) -> Result<()> {
        self.send(ClientFrame::Join {
            room: RoomCode::from(room),
        })
        .await
    }

    pub async fn recv(&mut self) -> Result<RelayFrame> {
        let timeout = Duration::from_millis(FRAME_TIMEOUT_MS);
        loop {
            let msg = tokio::time::timeout(timeout, self.stream.next())
                .await
                .context("Timeout waiting for relay frame")?
                .context("Relay closed the socket")??;
            match msg {
                Message::Text(text) => return Ok(serde_json::from_str(&text)?),
                Message::Close(_) => bail!("Relay closed the socket"),
                _ => continue,
            }
        }
    }

    /// Returns true when nothing arrives within the quiet window.
    pub async fn is_quiet(&mut self) -> bool {
        tokio::time::timeout(
            Duration::from_millis(QUIET_WINDOW_MS),
            self.stream.next(),
        )
        .await
        .is_err()
    }

    pub async fn close(mut self) -> Result<()> {
        self.sink.send(Message::Close(None)).await?;
        Ok(())
    }
}
