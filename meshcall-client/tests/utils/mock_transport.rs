use anyhow::{Result, bail};
use async_trait::async_trait;
use meshcall_client::{
    LocalTrack, PeerTransport, RemoteTrack, TransportEvent, TransportFactory, TransportState,
};
use meshcall_core::{IceCandidate, IceServerConfig, PeerId, SessionDescription, TrackKind};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// One call made on a mock transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Created { ice_servers: Vec<IceServerConfig> },
    CreateOffer,
    CreateAnswer,
    SetRemote(SessionDescription),
    AddCandidate(IceCandidate),
    AddTrack { kind: TrackKind, track_id: String },
    ReplaceTrack { kind: TrackKind, track_id: String },
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRecord {
    pub peer_id: PeerId,
    pub link_id: u64,
    pub call: TransportCall,
}

/// Operations that can be made to fail for a given peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailOn {
    Create,
    Offer,
    Answer,
    RemoteDescription,
    /// `close()` never completes.
    Close,
}

#[derive(Default)]
struct FactoryState {
    log: Vec<TransportRecord>,
    failures: HashSet<(PeerId, FailOn)>,
}

/// Transport factory whose connections only record what is asked of them.
///
/// The transports behave like a well-mannered peer connection: they report
/// one local candidate per description, a remote video track on the first
/// remote description and `Connected` once an answer is in place.
#[derive(Clone, Default)]
pub struct MockTransportFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, peer_id: &PeerId, on: FailOn) {
        self.lock().failures.insert((peer_id.clone(), on));
    }

    pub fn heal(&self, peer_id: &PeerId) {
        self.lock().failures.retain(|(peer, _)| peer != peer_id);
    }

    pub fn records(&self) -> Vec<TransportRecord> {
        self.lock().log.clone()
    }

    pub fn calls_for(&self, peer_id: &PeerId) -> Vec<TransportCall> {
        self.lock()
            .log
            .iter()
            .filter(|record| record.peer_id == *peer_id)
            .map(|record| record.call.clone())
            .collect()
    }

    pub fn calls_on_link(&self, peer_id: &PeerId, link_id: u64) -> Vec<TransportCall> {
        self.lock()
            .log
            .iter()
            .filter(|record| record.peer_id == *peer_id && record.link_id == link_id)
            .map(|record| record.call.clone())
            .collect()
    }

    pub fn count(&self, peer_id: &PeerId, matches: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls_for(peer_id).iter().filter(|call| matches(call)).count()
    }

    pub fn offers_to(&self, peer_id: &PeerId) -> usize {
        self.count(peer_id, |call| *call == TransportCall::CreateOffer)
    }

    pub fn links_to(&self, peer_id: &PeerId) -> Vec<u64> {
        self.lock()
            .log
            .iter()
            .filter(|record| {
                record.peer_id == *peer_id && matches!(record.call, TransportCall::Created { .. })
            })
            .map(|record| record.link_id)
            .collect()
    }

    /// Connections created and not closed yet.
    pub fn open_links(&self) -> usize {
        let state = self.lock();
        let created = state
            .log
            .iter()
            .filter(|record| matches!(record.call, TransportCall::Created { .. }))
            .count();
        let closed = state
            .log
            .iter()
            .filter(|record| record.call == TransportCall::Close)
            .count();
        created - closed
    }

    fn record(&self, peer_id: &PeerId, link_id: u64, call: TransportCall) {
        self.lock().log.push(TransportRecord {
            peer_id: peer_id.clone(),
            link_id,
            call,
        });
    }

    fn fails(&self, peer_id: &PeerId, on: FailOn) -> bool {
        self.lock().failures.contains(&(peer_id.clone(), on))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FactoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn create(
        &self,
        peer_id: &PeerId,
        link_id: u64,
        ice_servers: Vec<IceServerConfig>,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn PeerTransport>> {
        if self.fails(peer_id, FailOn::Create) {
            bail!("injected create failure");
        }
        self.record(peer_id, link_id, TransportCall::Created { ice_servers });

        Ok(Box::new(MockTransport {
            peer_id: peer_id.clone(),
            link_id,
            factory: self.clone(),
            events,
            remote_seen: AtomicBool::new(false),
        }))
    }
}

struct MockTransport {
    peer_id: PeerId,
    link_id: u64,
    factory: MockTransportFactory,
    events: mpsc::Sender<TransportEvent>,
    remote_seen: AtomicBool,
}

impl MockTransport {
    fn record(&self, call: TransportCall) {
        self.factory.record(&self.peer_id, self.link_id, call);
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events.try_send(event);
    }

    fn emit_candidate(&self) {
        let candidate = IceCandidate::new(format!(
            "candidate:{} 1 udp 2130706431 127.0.0.1 {} typ host",
            self.link_id,
            50_000 + self.link_id
        ));
        self.emit(TransportEvent::CandidateGenerated {
            peer_id: self.peer_id.clone(),
            link_id: self.link_id,
            candidate,
        });
    }

    fn emit_state(&self, state: TransportState) {
        self.emit(TransportEvent::StateChanged {
            peer_id: self.peer_id.clone(),
            link_id: self.link_id,
            state,
        });
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn create_offer(&self) -> Result<String> {
        if self.factory.fails(&self.peer_id, FailOn::Offer) {
            bail!("injected offer failure");
        }
        self.record(TransportCall::CreateOffer);
        self.emit_candidate();
        Ok(format!("mock-offer {} link {}", self.peer_id, self.link_id))
    }

    async fn create_answer(&self) -> Result<String> {
        if self.factory.fails(&self.peer_id, FailOn::Answer) {
            bail!("injected answer failure");
        }
        self.record(TransportCall::CreateAnswer);
        self.emit_candidate();
        self.emit_state(TransportState::Connected);
        Ok(format!("mock-answer {} link {}", self.peer_id, self.link_id))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        if self.factory.fails(&self.peer_id, FailOn::RemoteDescription) {
            bail!("injected remote description failure");
        }
        let is_answer = matches!(description, SessionDescription::Answer(_));
        self.record(TransportCall::SetRemote(description));

        if !self.remote_seen.swap(true, Ordering::SeqCst) {
            self.emit(TransportEvent::RemoteTrack {
                peer_id: self.peer_id.clone(),
                link_id: self.link_id,
                track: RemoteTrack {
                    id: format!("{}-video", self.peer_id),
                    stream_id: self.peer_id.to_string(),
                    kind: TrackKind::Video,
                },
            });
        }
        if is_answer {
            self.emit_state(TransportState::Connected);
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.record(TransportCall::AddCandidate(candidate));
        Ok(())
    }

    async fn add_track(&self, track: &LocalTrack) -> Result<()> {
        self.record(TransportCall::AddTrack {
            kind: track.kind(),
            track_id: track.id().to_owned(),
        });
        Ok(())
    }

    async fn replace_track(&self, kind: TrackKind, track: &LocalTrack) -> Result<()> {
        self.record(TransportCall::ReplaceTrack {
            kind,
            track_id: track.id().to_owned(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.factory.fails(&self.peer_id, FailOn::Close) {
            std::future::pending::<()>().await;
        }
        self.record(TransportCall::Close);
        Ok(())
    }
}
