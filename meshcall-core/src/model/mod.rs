mod chat;
mod frame;
mod media;
mod peer;
mod room;
mod signaling;

pub use chat::ChatMessage;
pub use frame::{ClientFrame, RelayFrame};
pub use media::{CaptureKind, TrackKind};
pub use peer::PeerId;
pub use room::RoomCode;
pub use signaling::{IceCandidate, IceServerConfig, SessionDescription, SignalMessage};
