use crate::model::chat::ChatMessage;
use crate::model::peer::PeerId;
use crate::model::room::RoomCode;
use crate::model::signaling::SignalMessage;
use serde::{Deserialize, Serialize};

/// Frames a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d")]
pub enum ClientFrame {
    Join { room: RoomCode },
    Signal { to: PeerId, signal: SignalMessage },
    Chat { sender: String, text: String },
    Leave,
}

/// Frames the relay sends to a client.
///
/// `Welcome` is always the first frame on a connection. `PeerJoined` goes to
/// every member of the room, the newcomer included, and carries the ordered
/// membership after the join. For the newcomer that event is its own
/// announcement and lists everyone who was already there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d")]
pub enum RelayFrame {
    Welcome { peer_id: PeerId },
    PeerJoined { peer_id: PeerId, roster: Vec<PeerId> },
    PeerLeft { peer_id: PeerId },
    Signal { from: PeerId, signal: SignalMessage },
    Chat(ChatMessage),
}
