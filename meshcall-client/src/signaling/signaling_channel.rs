use crate::MeshError;
use crate::signaling::signaling_output::SignalingOutput;
use async_trait::async_trait;
use meshcall_core::{ChatMessage, PeerId, RelayFrame, RoomCode, SignalMessage};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Ordered room events delivered by a signaling channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterEvent {
    /// `roster` is the room membership right after the join. The first one a
    /// client receives announces the client itself.
    PeerJoined { peer_id: PeerId, roster: Vec<PeerId> },
    PeerLeft(PeerId),
    MessageReceived { from: PeerId, message: SignalMessage },
    ChatReceived(ChatMessage),
}

impl RosterEvent {
    /// Maps a relay frame to a room event. `Welcome` is connection-level and
    /// has no room counterpart.
    pub fn from_frame(frame: RelayFrame) -> Option<Self> {
        match frame {
            RelayFrame::Welcome { .. } => None,
            RelayFrame::PeerJoined { peer_id, roster } => {
                Some(RosterEvent::PeerJoined { peer_id, roster })
            }
            RelayFrame::PeerLeft { peer_id } => Some(RosterEvent::PeerLeft(peer_id)),
            RelayFrame::Signal { from, signal } => Some(RosterEvent::MessageReceived {
                from,
                message: signal,
            }),
            RelayFrame::Chat(message) => Some(RosterEvent::ChatReceived(message)),
        }
    }
}

/// A live room membership: the id the relay assigned plus its event stream.
/// The stream ends when the relay connection drops.
pub struct RosterStream {
    pub local_peer: PeerId,
    pub events: mpsc::Receiver<RosterEvent>,
}

/// Room-scoped connection to a relay. At most one membership is active at a
/// time; `disconnect` must precede a fresh `connect`.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    async fn connect(&self, room: &RoomCode) -> Result<RosterStream, MeshError>;

    fn sender(&self) -> Arc<dyn SignalingOutput>;

    /// Idempotent. Closes the transport and stops events.
    async fn disconnect(&self);
}
