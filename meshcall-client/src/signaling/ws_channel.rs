use crate::signaling::signaling_channel::{RosterEvent, RosterStream, SignalingChannel};
use crate::signaling::signaling_output::SignalingOutput;
use crate::{MeshConfig, MeshError};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use meshcall_core::{ClientFrame, PeerId, RelayFrame, RoomCode, SignalMessage};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Outbound = Arc<Mutex<Option<mpsc::UnboundedSender<ClientFrame>>>>;

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

struct ChannelTasks {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Signaling channel over a WebSocket to the relay.
pub struct WsSignalingChannel {
    url: String,
    connect_timeout: Duration,
    event_buffer: usize,
    outbound: Outbound,
    tasks: Mutex<Option<ChannelTasks>>,
}

impl WsSignalingChannel {
    pub fn new(url: impl Into<String>, connect_timeout: Duration, event_buffer: usize) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
            event_buffer: event_buffer.max(1),
            outbound: Arc::new(Mutex::new(None)),
            tasks: Mutex::new(None),
        }
    }

    pub fn from_config(config: &MeshConfig) -> Self {
        Self::new(
            config.relay_url.clone(),
            config.connect_timeout(),
            config.event_buffer,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    async fn open_socket(&self) -> Result<WsStream, MeshError> {
        let connecting = connect_async(self.url.as_str());
        match tokio::time::timeout(self.connect_timeout, connecting).await {
            Ok(Ok((socket, _))) => Ok(socket),
            Ok(Err(e)) => Err(MeshError::Relay(format!(
                "failed to connect to {}: {}",
                self.url, e
            ))),
            Err(_) => Err(MeshError::Relay(format!(
                "timed out connecting to {}",
                self.url
            ))),
        }
    }
}

#[async_trait]
impl SignalingChannel for WsSignalingChannel {
    async fn connect(&self, room: &RoomCode) -> Result<RosterStream, MeshError> {
        if self.is_connected() {
            warn!("Signaling channel still connected; disconnecting before a new join");
            self.disconnect().await;
        }

        let socket = self.open_socket().await?;
        let (mut sink, mut stream) = socket.split();

        let local_peer = tokio::time::timeout(self.connect_timeout, await_welcome(&mut stream))
            .await
            .map_err(|_| MeshError::Relay("relay did not send a welcome".to_owned()))??;

        send_frame(&mut sink, &ClientFrame::Join { room: room.clone() })
            .await
            .map_err(|_| MeshError::ChannelDisconnected)?;

        let (events_tx, events_rx) = mpsc::channel(self.event_buffer);
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_loop(sink, out_rx));
        let reader = tokio::spawn(read_loop(stream, events_tx));

        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(out_tx);
        *self.tasks.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(ChannelTasks { reader, writer });

        info!("Joined room {} on {} as {}", room, self.url, local_peer);
        Ok(RosterStream {
            local_peer,
            events: events_rx,
        })
    }

    fn sender(&self) -> Arc<dyn SignalingOutput> {
        Arc::new(WsOutput {
            outbound: self.outbound.clone(),
        })
    }

    async fn disconnect(&self) {
        let outbound = self
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = outbound {
            let _ = tx.send(ClientFrame::Leave);
        }

        let tasks = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(ChannelTasks { reader, mut writer }) = tasks else {
            return;
        };

        reader.abort();
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
            .await
            .is_err()
        {
            writer.abort();
        }
        info!("Signaling channel to {} disconnected", self.url);
    }
}

struct WsOutput {
    outbound: Outbound,
}

impl WsOutput {
    fn push(&self, frame: ClientFrame) -> Result<(), MeshError> {
        let guard = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx.send(frame).map_err(|_| MeshError::ChannelDisconnected),
            None => Err(MeshError::ChannelDisconnected),
        }
    }
}

#[async_trait]
impl SignalingOutput for WsOutput {
    async fn send(&self, to: &PeerId, message: SignalMessage) -> Result<(), MeshError> {
        debug!("Sending {} to {}", message.kind(), to);
        self.push(ClientFrame::Signal {
            to: to.clone(),
            signal: message,
        })
    }

    async fn send_chat(&self, sender: &str, text: &str) -> Result<(), MeshError> {
        self.push(ClientFrame::Chat {
            sender: sender.to_owned(),
            text: text.to_owned(),
        })
    }
}

async fn await_welcome(stream: &mut SplitStream<WsStream>) -> Result<PeerId, MeshError> {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<RelayFrame>(&text) {
                Ok(RelayFrame::Welcome { peer_id }) => return Ok(peer_id),
                Ok(other) => debug!("Ignoring frame before welcome: {:?}", other),
                Err(e) => warn!("Invalid relay frame: {:?}", e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => return Err(MeshError::Relay(e.to_string())),
        }
    }
    Err(MeshError::ChannelDisconnected)
}

async fn send_frame(
    sink: &mut SplitSink<WsStream, Message>,
    frame: &ClientFrame,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(frame)?;
    sink.send(Message::Text(json.into())).await?;
    Ok(())
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<ClientFrame>,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = send_frame(&mut sink, &frame).await {
            warn!("Failed to write to relay: {:?}", e);
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(mut stream: SplitStream<WsStream>, events: mpsc::Sender<RosterEvent>) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let frame = match serde_json::from_str::<RelayFrame>(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Invalid relay frame: {:?}", e);
                        continue;
                    }
                };
                let Some(event) = RosterEvent::from_frame(frame) else {
                    continue;
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Relay connection error: {:?}", e);
                break;
            }
        }
    }
    info!("Relay event stream ended");
}
