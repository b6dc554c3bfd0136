use crate::media::LocalTrack;
use crate::transport::transport_event::TransportEvent;
use anyhow::Result;
use async_trait::async_trait;
use meshcall_core::{IceCandidate, IceServerConfig, PeerId, SessionDescription, TrackKind};
use tokio::sync::mpsc;

/// A track received from a remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
}

/// Everything received from one remote peer so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub peer_id: PeerId,
    pub tracks: Vec<RemoteTrack>,
}

/// One direct media connection to a remote peer.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Creates an offer, sets it as the local description and returns its SDP.
    async fn create_offer(&self) -> Result<String>;

    /// Creates an answer, sets it as the local description and returns its SDP.
    async fn create_answer(&self) -> Result<String>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Adds a sender for the track's kind.
    async fn add_track(&self, track: &LocalTrack) -> Result<()>;

    /// Swaps the track of an existing sender without renegotiating.
    async fn replace_track(&self, kind: TrackKind, track: &LocalTrack) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Creates a connection to `peer_id`. Its callbacks go to `events`,
    /// tagged with `link_id`.
    async fn create(
        &self,
        peer_id: &PeerId,
        link_id: u64,
        ice_servers: Vec<IceServerConfig>,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn PeerTransport>>;
}
