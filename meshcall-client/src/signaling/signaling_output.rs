use crate::MeshError;
use async_trait::async_trait;
use meshcall_core::{PeerId, SignalMessage};

/// Outbound half of a signaling channel, handed to the connection registry
/// so it can address offers, answers and candidates to single peers.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    /// Best-effort, ordered per destination. Never retried internally.
    async fn send(&self, to: &PeerId, message: SignalMessage) -> Result<(), MeshError>;

    /// Broadcasts a chat line to the whole room.
    async fn send_chat(&self, sender: &str, text: &str) -> Result<(), MeshError>;
}
