use meshcall_core::PeerId;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MeshError {
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("signaling channel disconnected")]
    ChannelDisconnected,

    #[error("negotiation with {peer} failed: {reason}")]
    NegotiationFailed { peer: PeerId, reason: String },

    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    #[error("relay error: {0}")]
    Relay(String),

    #[error("session is already in a room")]
    AlreadyInRoom,

    #[error("session is not in a room")]
    NotInRoom,

    #[error("interrupted by leave")]
    Interrupted,

    #[error("session closed")]
    SessionClosed,
}

impl MeshError {
    /// Capture errors degrade to the placeholder instead of failing the call.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            MeshError::DeviceUnavailable(_) | MeshError::PermissionDenied(_)
        )
    }
}
