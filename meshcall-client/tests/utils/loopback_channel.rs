use crate::utils::mock_view::{EventLog, ViewEvent};
use async_trait::async_trait;
use axum::extract::ws::Message;
use meshcall_client::{MeshError, RosterEvent, RosterStream, SignalingChannel, SignalingOutput};
use meshcall_core::{ClientFrame, PeerId, RelayFrame, RoomCode, SignalMessage};
use meshcall_relay::SignalingService;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type CurrentPeer = Arc<Mutex<Option<PeerId>>>;

/// Signaling channel wired straight into an in-process relay service,
/// without sockets.
pub struct LoopbackChannel {
    service: SignalingService,
    current: CurrentPeer,
    forward: Mutex<Option<JoinHandle<()>>>,
    connects: AtomicUsize,
    log: Option<EventLog>,
}

impl LoopbackChannel {
    pub fn new(service: SignalingService) -> Self {
        Self {
            service,
            current: Arc::new(Mutex::new(None)),
            forward: Mutex::new(None),
            connects: AtomicUsize::new(0),
            log: None,
        }
    }

    /// Records `ChannelDisconnected` into `log` on every disconnect.
    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn local_peer(&self) -> Option<PeerId> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Drops the connection on the relay side, as a network failure would.
    pub fn drop_connection(&self) {
        let peer = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(peer) = peer {
            self.service.remove_peer(&peer);
        }
    }
}

#[async_trait]
impl SignalingChannel for LoopbackChannel {
    async fn connect(&self, room: &RoomCode) -> Result<RosterStream, MeshError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let local_peer = self.service.add_peer(tx);
        self.service.handle_frame(
            &local_peer,
            ClientFrame::Join { room: room.clone() },
        );

        let (events_tx, events_rx) = mpsc::channel(256);
        let forward = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let Message::Text(text) = msg else {
                    continue;
                };
                let Ok(frame) = serde_json::from_str::<RelayFrame>(text.as_str()) else {
                    continue;
                };
                let Some(event) = RosterEvent::from_frame(frame) else {
                    continue;
                };
                if events_tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(local_peer.clone());
        *self.forward.lock().unwrap_or_else(PoisonError::into_inner) = Some(forward);
        self.connects.fetch_add(1, Ordering::SeqCst);

        Ok(RosterStream {
            local_peer,
            events: events_rx,
        })
    }

    fn sender(&self) -> Arc<dyn SignalingOutput> {
        Arc::new(LoopbackOutput {
            service: self.service.clone(),
            current: self.current.clone(),
        })
    }

    async fn disconnect(&self) {
        self.drop_connection();
        let forward = self
            .forward
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(forward) = forward {
            forward.abort();
        }
        if let Some(log) = &self.log {
            log.push(ViewEvent::ChannelDisconnected);
        }
    }
}

struct LoopbackOutput {
    service: SignalingService,
    current: CurrentPeer,
}

impl LoopbackOutput {
    fn push(&self, frame: ClientFrame) -> Result<(), MeshError> {
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let peer = current.ok_or(MeshError::ChannelDisconnected)?;
        self.service.handle_frame(&peer, frame);
        Ok(())
    }
}

#[async_trait]
impl SignalingOutput for LoopbackOutput {
    async fn send(&self, to: &PeerId, message: SignalMessage) -> Result<(), MeshError> {
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
