use crate::room::RoomRegistry;
use axum::extract::ws::Message;
use dashmap::DashMap;
use meshcall_core::{ChatMessage, ClientFrame, PeerId, RelayFrame, RoomCode, SignalMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

struct PeerSlot {
    tx: mpsc::UnboundedSender<Message>,
    room: Option<RoomCode>,
}

#[derive(Default)]
struct SignalingInner {
    peers: DashMap<PeerId, PeerSlot>,
    rooms: RoomRegistry,
}

/// Shared relay state: one outbound queue per connected peer plus the room
/// rosters. Cheap to clone; every WebSocket task holds one.
#[derive(Clone, Default)]
pub struct SignalingService {
    inner: Arc<SignalingInner>,
}

impl SignalingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly accepted connection and greets it with the id the
    /// relay assigned to it.
    pub fn add_peer(&self, tx: mpsc::UnboundedSender<Message>) -> PeerId {
        let peer_id = PeerId::new();
        self.inner
            .peers
            .insert(peer_id.clone(), PeerSlot { tx, room: None });
        self.send_frame(
            &peer_id,
            &RelayFrame::Welcome {
                peer_id: peer_id.clone(),
            },
        );
        peer_id
    }

    pub fn remove_peer(&self, peer_id: &PeerId) {
        self.leave_room(peer_id);
        self.inner.peers.remove(peer_id);
    }

    pub fn handle_frame(&self, peer_id: &PeerId, frame: ClientFrame) {
        match frame {
            ClientFrame::Join { room } => self.join_room(peer_id, room),
            ClientFrame::Signal { to, signal } => self.forward(peer_id, &to, signal),
            ClientFrame::Chat { sender, text } => self.chat(peer_id, sender, text),
            ClientFrame::Leave => self.leave_room(peer_id),
        }
    }

    pub fn room_of(&self, peer_id: &PeerId) -> Option<RoomCode> {
        self.inner
            .peers
            .get(peer_id)
            .and_then(|slot| slot.room.clone())
    }

    pub fn room_members(&self, room: &RoomCode) -> Vec<PeerId> {
        self.inner.rooms.members(room)
    }

    pub fn peer_count(&self) -> usize {
        self.inner.peers.len()
    }

    fn join_room(&self, peer_id: &PeerId, room: RoomCode) {
        if room.is_empty() {
            warn!("Peer {} asked to join an empty room code", peer_id);
            return;
        }
        if self.room_of(peer_id).as_ref() == Some(&room) {
            debug!("Peer {} is already in room {}", peer_id, room);
            return;
        }

        self.leave_room(peer_id);

        match self.inner.peers.get_mut(peer_id) {
            Some(mut slot) => slot.room = Some(room.clone()),
            None => {
                warn!("Join from unregistered peer {}", peer_id);
                return;
            }
        }

        info!("Peer {} joined room {}", peer_id, room);
        self.inner.rooms.join(&room, peer_id, |roster| {
            let frame = RelayFrame::PeerJoined {
                peer_id: peer_id.clone(),
                roster: roster.to_vec(),
            };
            // The newcomer first: its own announcement must precede anything
            // else it hears about this room.
            self.send_frame(peer_id, &frame);
            for member in roster.iter().filter(|member| *member != peer_id) {
                self.send_frame(member, &frame);
            }
        });
    }

    fn leave_room(&self, peer_id: &PeerId) {
        let room = match self.inner.peers.get_mut(peer_id) {
            Some(mut slot) => slot.room.take(),
            None => None,
        };
        let Some(room) = room else {
            return;
        };

        self.inner.rooms.leave(&room, peer_id, |remaining| {
            let frame = RelayFrame::PeerLeft {
                peer_id: peer_id.clone(),
            };
            for member in remaining {
                self.send_frame(member, &frame);
            }
        });
        info!("Peer {} left room {}", peer_id, room);
    }

    fn forward(&self, from: &PeerId, to: &PeerId, signal: SignalMessage) {
        let Some(room) = self.room_of(from) else {
            warn!("Dropping {} from {}: not in a room", signal.kind(), from);
            return;
        };
        if !self.inner.rooms.contains(&room, to) {
            debug!(
                "Dropping {} from {} to {}: target not in room {}",
                signal.kind(),
                from,
                to,
                room
            );
            return;
        }

        self.send_frame(
            to,
            &RelayFrame::Signal {
                from: from.clone(),
                signal,
            },
        );
    }

    fn chat(&self, from: &PeerId, sender: String, text: String) {
        let Some(room) = self.room_of(from) else {
            warn!("Dropping chat from {}: not in a room", from);
            return;
        };

        let frame = RelayFrame::Chat(ChatMessage {
            sender,
            text,
            origin_id: from.clone(),
        });
        for member in self.inner.rooms.members(&room) {
            self.send_frame(&member, &frame);
        }
    }

    /// Serializes and queues a frame for one peer.
    pub fn send_frame(&self, peer_id: &PeerId, frame: &RelayFrame) {
        if let Some(peer) = self.inner.peers.get(peer_id) {
            match serde_json::to_string(frame) {
                Ok(json) => {
                    if let Err(e) = peer.tx.send(Message::Text(json.into())) {
                        error!("Failed to send WS message to {}: {:?}", peer_id, e);
                    }
                }
                Err(e) => error!("Failed to serialize relay frame: {}", e),
            }
        } else {
            warn!("Attempted to send frame to disconnected peer {}", peer_id);
        }
    }
}
