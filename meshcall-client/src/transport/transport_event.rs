use crate::transport::peer_transport::RemoteTrack;
use meshcall_core::{IceCandidate, PeerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Callbacks of one peer connection, tagged with the link they came from so
/// events of a replaced connection can be told apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    CandidateGenerated {
        peer_id: PeerId,
        link_id: u64,
        candidate: IceCandidate,
    },
    StateChanged {
        peer_id: PeerId,
        link_id: u64,
        state: TransportState,
    },
    RemoteTrack {
        peer_id: PeerId,
        link_id: u64,
        track: RemoteTrack,
    },
}

impl TransportEvent {
    pub fn origin(&self) -> (&PeerId, u64) {
        match self {
            TransportEvent::CandidateGenerated {
                peer_id, link_id, ..
            }
            | TransportEvent::StateChanged {
                peer_id, link_id, ..
            }
            | TransportEvent::RemoteTrack {
                peer_id, link_id, ..
            } => (peer_id, *link_id),
        }
    }
}
