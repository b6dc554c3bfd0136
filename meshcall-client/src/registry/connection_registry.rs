use crate::MeshError;
use crate::media::LocalTrack;
use crate::registry::peer_link::{LinkAction, LinkInput, LinkRole, LinkState, PeerLink, SenderUpdate};
use crate::session::RoomView;
use crate::signaling::SignalingOutput;
use crate::transport::{
    IceServerProvider, PeerTransport, RemoteStream, TransportEvent, TransportFactory,
    TransportState, resolve_ice_servers,
};
use anyhow::anyhow;
use meshcall_core::{IceServerConfig, PeerId, SignalMessage, TrackKind};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

struct PeerEntry {
    link: PeerLink,
    transport: Box<dyn PeerTransport>,
}

/// Public view of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSummary {
    pub peer_id: PeerId,
    pub link_id: u64,
    pub role: LinkRole,
    pub state: LinkState,
    pub senders: Vec<TrackKind>,
}

/// Owns exactly one connection per remote peer and drives its negotiation.
///
/// Negotiation failures are contained: the failing connection is torn down
/// and the others keep going. Only losing the signaling channel is reported
/// back to the caller.
pub struct PeerConnectionRegistry {
    local_peer: Option<PeerId>,
    signaling: Option<Arc<dyn SignalingOutput>>,
    peers: HashMap<PeerId, PeerEntry>,
    roles: HashMap<PeerId, LinkRole>,
    remote_streams: HashMap<PeerId, RemoteStream>,
    next_link_id: u64,
    factory: Arc<dyn TransportFactory>,
    ice_provider: Arc<dyn IceServerProvider>,
    fallback_ice: Vec<IceServerConfig>,
    view: Arc<dyn RoomView>,
    transport_tx: mpsc::Sender<TransportEvent>,
    negotiation_timeout: Duration,
}

impl PeerConnectionRegistry {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        ice_provider: Arc<dyn IceServerProvider>,
        fallback_ice: Vec<IceServerConfig>,
        view: Arc<dyn RoomView>,
        transport_tx: mpsc::Sender<TransportEvent>,
        negotiation_timeout: Duration,
    ) -> Self {
        Self {
            local_peer: None,
            signaling: None,
            peers: HashMap::new(),
            roles: HashMap::new(),
            remote_streams: HashMap::new(),
            next_link_id: 0,
            factory,
            ice_provider,
            fallback_ice,
            view,
            transport_tx,
            negotiation_timeout,
        }
    }

    /// Starts a membership: our relay-assigned id and where to send signals.
    pub fn bind(&mut self, local_peer: PeerId, signaling: Arc<dyn SignalingOutput>) {
        self.local_peer = Some(local_peer);
        self.signaling = Some(signaling);
    }

    pub fn unbind(&mut self) {
        self.local_peer = None;
        self.signaling = None;
        self.roles.clear();
    }

    pub fn local_peer(&self) -> Option<&PeerId> {
        self.local_peer.as_ref()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub fn link_state(&self, peer_id: &PeerId) -> Option<LinkState> {
        self.peers.get(peer_id).map(|entry| entry.link.state())
    }

    pub fn remote_stream(&self, peer_id: &PeerId) -> Option<&RemoteStream> {
        self.remote_streams.get(peer_id)
    }

    pub fn summaries(&self) -> Vec<PeerSummary> {
        let mut summaries: Vec<PeerSummary> = self
            .peers
            .values()
            .map(|entry| PeerSummary {
                peer_id: entry.link.peer_id().clone(),
                link_id: entry.link.link_id(),
                role: entry.link.role(),
                state: entry.link.state(),
                senders: entry.link.senders(),
            })
            .collect();
        summaries.sort_by(|a, b| a.peer_id.as_str().cmp(b.peer_id.as_str()));
        summaries
    }

    /// Handles a join. Returns true when the join announced ourselves.
    ///
    /// On our own join we offer to everyone already in `roster`. On someone
    /// else's join we prepare a connection and wait for their offer, and
    /// recreate any connection to a roster member lost to a failure.
    pub async fn on_peer_joined(
        &mut self,
        peer_id: &PeerId,
        roster: &[PeerId],
        tracks: &[LocalTrack],
    ) -> Result<bool, MeshError> {
        let Some(local) = self.local_peer.clone() else {
            warn!("Join of {} before the registry was bound", peer_id);
            return Ok(false);
        };

        if *peer_id == local {
            let existing: Vec<PeerId> = roster.iter().filter(|m| **m != local).cloned().collect();
            info!("Joined room with {} peer(s) already there", existing.len());
            for member in existing {
                self.roles.insert(member.clone(), LinkRole::Initiator);
                self.open_link(&member, LinkRole::Initiator, tracks).await?;
            }
            return Ok(true);
        }

        info!("Peer {} joined", peer_id);
        self.roles.insert(peer_id.clone(), LinkRole::Responder);
        self.open_link(peer_id, LinkRole::Responder, tracks).await?;

        for member in roster {
            if *member == local || member == peer_id || self.peers.contains_key(member) {
                continue;
            }
            let Some(role) = self.roles.get(member).copied() else {
                continue;
            };
            info!("Recreating lost connection to {} as {:?}", member, role);
            self.open_link(member, role, tracks).await?;
        }
        Ok(false)
    }

    /// Closes the connection to a departed peer. Unknown ids are ignored.
    pub async fn on_peer_left(&mut self, peer_id: &PeerId) -> bool {
        self.roles.remove(peer_id);
        let Some(entry) = self.peers.get(peer_id) else {
            debug!("Peer {} left without a connection", peer_id);
            return false;
        };

        info!("Peer {} left", peer_id);
        // The entry stays in the map until closed, so `close_all` still sees it
        // if this call is cut short.
        self.close_transport(peer_id, entry.transport.as_ref()).await;
        self.peers.remove(peer_id);
        self.remote_streams.remove(peer_id);
        self.view.remote_stream_removed(peer_id);
        true
    }

    /// Routes a signal to the link it belongs to. Signals from peers we hold
    /// no connection to are dropped with `MeshError::UnknownPeer`.
    pub async fn on_signal(&mut self, from: &PeerId, message: SignalMessage) -> Result<(), MeshError> {
        if !self.peers.contains_key(from) {
            return Err(MeshError::UnknownPeer(from.clone()));
        }

        debug!("Received {} from {}", message.kind(), from);
        let input = match message {
            SignalMessage::Offer { sdp } => LinkInput::RemoteOffer(sdp),
            SignalMessage::Answer { sdp } => LinkInput::RemoteAnswer(sdp),
            SignalMessage::IceCandidate(candidate) => LinkInput::RemoteCandidate(candidate),
            SignalMessage::Renegotiate => LinkInput::RenegotiationRequested,
        };
        self.drive(from, input).await
    }

    pub async fn on_transport_event(&mut self, event: TransportEvent) -> Result<(), MeshError> {
        let (peer_id, link_id) = {
            let (peer_id, link_id) = event.origin();
            (peer_id.clone(), link_id)
        };
        let current = self.peers.get(&peer_id).map(|entry| entry.link.link_id());
        if current != Some(link_id) {
            debug!("Ignoring event from stale link {} of {}", link_id, peer_id);
            return Ok(());
        }

        match event {
            TransportEvent::CandidateGenerated { candidate, .. } => {
                self.signal(&peer_id, SignalMessage::IceCandidate(candidate))
                    .await
            }

            TransportEvent::StateChanged { state, .. } => match state {
                TransportState::Connected => {
                    info!("Connected to {}", peer_id);
                    self.drive(&peer_id, LinkInput::TransportUp).await
                }
                TransportState::Disconnected => {
                    warn!("Connection to {} interrupted", peer_id);
                    self.drive(&peer_id, LinkInput::TransportInterrupted).await
                }
                TransportState::Failed => {
                    error!("Connection to {} failed", peer_id);
                    self.drive(&peer_id, LinkInput::TransportFailed).await
                }
                TransportState::Connecting | TransportState::Closed => Ok(()),
            },

            TransportEvent::RemoteTrack { track, .. } => {
                let stream = self
                    .remote_streams
                    .entry(peer_id.clone())
                    .or_insert_with(|| RemoteStream {
                        peer_id: peer_id.clone(),
                        tracks: Vec::new(),
                    });
                stream.tracks.retain(|existing| existing.id != track.id);
                stream.tracks.push(track);
                self.view.remote_stream_added(stream);
                Ok(())
            }
        }
    }

    /// Brings every connection up to date with `tracks`: existing senders get
    /// their track swapped, new kinds are added and renegotiated.
    pub async fn push_local_tracks(&mut self, tracks: &[LocalTrack]) -> Result<(), MeshError> {
        let peers: Vec<PeerId> = self.peers.keys().cloned().collect();

        for peer_id in peers {
            let mut needs_offer = false;
            let mut failure = None;

            if let Some(entry) = self.peers.get_mut(&peer_id) {
                for track in tracks {
                    let result = match entry.link.attach(track.kind()) {
                        SenderUpdate::Replace => {
                            bounded(
                                self.negotiation_timeout,
                                entry.transport.replace_track(track.kind(), track),
                            )
                            .await
                        }
                        SenderUpdate::Add => {
                            needs_offer |= entry.link.is_started();
                            bounded(self.negotiation_timeout, entry.transport.add_track(track)).await
                        }
                    };
                    if let Err(e) = result {
                        failure = Some(e);
                        break;
                    }
                }
            }

            if let Some(e) = failure {
                error!("Failed to update tracks for {}: {:#}", peer_id, e);
                self.fail_link(&peer_id).await;
            } else if needs_offer {
                self.drive(&peer_id, LinkInput::StartOffer).await?;
            }
        }
        Ok(())
    }

    /// Closes every connection. The roster roles survive until `unbind`.
    pub async fn close_all(&mut self) {
        let peers: Vec<PeerId> = self.peers.keys().cloned().collect();
        if !peers.is_empty() {
            info!("Closing {} connection(s)", peers.len());
        }
        for peer_id in peers {
            if let Some(entry) = self.peers.get(&peer_id) {
                self.close_transport(&peer_id, entry.transport.as_ref()).await;
            }
            self.peers.remove(&peer_id);
            self.remote_streams.remove(&peer_id);
            self.view.remote_stream_removed(&peer_id);
        }
    }

    async fn open_link(
        &mut self,
        peer_id: &PeerId,
        role: LinkRole,
        tracks: &[LocalTrack],
    ) -> Result<(), MeshError> {
        if self.peers.contains_key(peer_id) {
            info!("Replacing existing connection to {}", peer_id);
            self.fail_link(peer_id).await;
        }

        let ice_servers = resolve_ice_servers(self.ice_provider.as_ref(), &self.fallback_ice).await;
        self.next_link_id += 1;
        let link_id = self.next_link_id;

        let created = bounded(
            self.negotiation_timeout,
            self.factory
                .create(peer_id, link_id, ice_servers, self.transport_tx.clone()),
        )
        .await;
        let transport = match created {
            Ok(transport) => transport,
            Err(e) => {
                error!("Failed to create connection to {}: {:#}", peer_id, e);
                return Ok(());
            }
        };

        let mut link = PeerLink::new(peer_id.clone(), link_id, role);
        for track in tracks {
            link.attach(track.kind());
            if let Err(e) = bounded(self.negotiation_timeout, transport.add_track(track)).await {
                error!("Failed to attach {} to {}: {:#}", track.kind(), peer_id, e);
                let _ = transport.close().await;
                return Ok(());
            }
        }

        debug!("Opened link {} to {} as {:?}", link_id, peer_id, role);
        self.peers
            .insert(peer_id.clone(), PeerEntry { link, transport });

        if role == LinkRole::Initiator {
            self.drive(peer_id, LinkInput::StartOffer).await?;
        }
        Ok(())
    }

    /// Feeds one input to a link and performs the resulting actions.
    async fn drive(&mut self, peer_id: &PeerId, input: LinkInput) -> Result<(), MeshError> {
        let actions = match self.peers.get_mut(peer_id) {
            Some(entry) => entry.link.step(input),
            None => return Ok(()),
        };

        for action in actions {
            if action == LinkAction::Teardown {
                self.fail_link(peer_id).await;
                return Ok(());
            }

            match self.perform(peer_id, action).await {
                Ok(()) => {}
                Err(MeshError::NegotiationFailed { peer, reason }) => {
                    error!("Negotiation with {} failed: {}", peer, reason);
                    self.fail_link(&peer).await;
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn perform(&self, peer_id: &PeerId, action: LinkAction) -> Result<(), MeshError> {
        let Some(entry) = self.peers.get(peer_id) else {
            return Ok(());
        };
        let transport = entry.transport.as_ref();
        let failed = |what: &str, e: anyhow::Error| MeshError::NegotiationFailed {
            peer: peer_id.clone(),
            reason: format!("{what}: {e:#}"),
        };

        let step = async {
            match action {
                LinkAction::CreateAndSendOffer => {
                    let sdp = transport
                        .create_offer()
                        .await
                        .map_err(|e| failed("create offer", e))?;
                    self.signal(peer_id, SignalMessage::Offer { sdp }).await
                }
                LinkAction::RequestOffer => self.signal(peer_id, SignalMessage::Renegotiate).await,
                LinkAction::ApplyRemote(description) => transport
                    .set_remote_description(description)
                    .await
                    .map_err(|e| failed("set remote description", e)),
                LinkAction::CreateAndSendAnswer => {
                    let sdp = transport
                        .create_answer()
                        .await
                        .map_err(|e| failed("create answer", e))?;
                    self.signal(peer_id, SignalMessage::Answer { sdp }).await
                }
                LinkAction::ApplyCandidate(candidate) => transport
                    .add_ice_candidate(candidate)
                    .await
                    .map_err(|e| failed("add ICE candidate", e)),
                LinkAction::Teardown => Ok(()),
            }
        };

        match tokio::time::timeout(self.negotiation_timeout, step).await {
            Ok(result) => result,
            Err(_) => Err(MeshError::NegotiationFailed {
                peer: peer_id.clone(),
                reason: format!("timed out after {}ms", self.negotiation_timeout.as_millis()),
            }),
        }
    }

    async fn signal(&self, to: &PeerId, message: SignalMessage) -> Result<(), MeshError> {
        let Some(signaling) = &self.signaling else {
            return Err(MeshError::ChannelDisconnected);
        };
        debug!("Sending {} to {}", message.kind(), to);
        signaling.send(to, message).await
    }

    /// Tears one connection down. Its role is kept so the next roster event
    /// can recreate it.
    async fn fail_link(&mut self, peer_id: &PeerId) {
        let Some(entry) = self.peers.get(peer_id) else {
            return;
        };
        self.close_transport(peer_id, entry.transport.as_ref()).await;
        self.peers.remove(peer_id);
        if self.remote_streams.remove(peer_id).is_some() {
            self.view.remote_stream_removed(peer_id);
        }
    }

    async fn close_transport(&self, peer_id: &PeerId, transport: &dyn PeerTransport) {
        if let Err(e) = bounded(self.negotiation_timeout, transport.close()).await {
            warn!("Failed to close connection to {}: {:#}", peer_id, e);
        }
    }
}

async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or_else(|_| Err(anyhow!("timed out after {}ms", limit.as_millis())))
}
