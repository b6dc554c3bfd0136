use crate::media::{MediaState, TrackDescriptor};
use crate::registry::PeerSummary;
use meshcall_core::{PeerId, RoomCode};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Joining,
    Active,
    Leaving,
}

impl SessionState {
    pub fn in_room(self) -> bool {
        matches!(self, SessionState::Joining | SessionState::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Joining => "joining",
            SessionState::Active => "active",
            SessionState::Leaving => "leaving",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Incremented on every join and rejoin.
    pub epoch: u64,
    pub room: Option<RoomCode>,
    pub local_peer: Option<PeerId>,
    pub peers: Vec<PeerSummary>,
    pub media: MediaState,
    pub screen_share: bool,
    pub placeholder: bool,
    pub tracks: Vec<TrackDescriptor>,
}

impl SessionSnapshot {
    pub fn peer(&self, peer_id: &PeerId) -> Option<&PeerSummary> {
        self.peers.iter().find(|summary| summary.peer_id == *peer_id)
    }
}
