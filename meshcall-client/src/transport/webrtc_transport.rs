use crate::media::LocalTrack;
use crate::transport::peer_transport::{PeerTransport, RemoteTrack, TransportFactory};
use crate::transport::transport_config::TransportConfig;
use crate::transport::transport_event::{TransportEvent, TransportState};
use anyhow::{Context, Result};
use async_trait::async_trait;
use meshcall_core::{IceCandidate, IceServerConfig, PeerId, SessionDescription, TrackKind};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;

/// A webrtc-rs peer connection to one remote participant.
pub struct WebRtcTransport {
    pub peer_id: PeerId,
    pub link_id: u64,
    pub peer_connection: Arc<RTCPeerConnection>,
    senders: Mutex<HashMap<TrackKind, Arc<RTCRtpSender>>>,
}

impl WebRtcTransport {
    /// Builds the connection and wires its callbacks into `event_tx`.
    pub async fn new(
        peer_id: PeerId,
        link_id: u64,
        config: TransportConfig,
        event_tx: mpsc::Sender<TransportEvent>,
    ) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let peer_connection = Arc::new(
            api.new_peer_connection(config.rtc_configuration())
                .await
                .context("Failed to create peer connection")?,
        );

        let state_tx = event_tx.clone();
        let uid_state = peer_id.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                let uid = uid_state.clone();

                Box::pin(async move {
                    info!("Peer connection state for {} (link {}): {:?}", uid, link_id, s);
                    let state = match s {
                        RTCPeerConnectionState::Connected => TransportState::Connected,
                        RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
                        RTCPeerConnectionState::Failed => TransportState::Failed,
                        RTCPeerConnectionState::Closed => TransportState::Closed,
                        _ => TransportState::Connecting,
                    };
                    let _ = tx
                        .send(TransportEvent::StateChanged {
                            peer_id: uid,
                            link_id,
                            state,
                        })
                        .await;
                })
            },
        ));

        let ice_tx = event_tx.clone();
        let uid_ice = peer_id.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            let uid = uid_ice.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let _ = tx
                    .send(TransportEvent::CandidateGenerated {
                        peer_id: uid,
                        link_id,
                        candidate: IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_m_line_index: init.sdp_mline_index,
                        },
                    })
                    .await;
            })
        }));

        let track_tx = event_tx.clone();
        let uid_track = peer_id.clone();
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let tx = track_tx.clone();
            let uid = uid_track.clone();

            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    _ => return,
                };
                debug!("Remote {} track {} from {}", kind, track.id(), uid);

                let remote = RemoteTrack {
                    id: track.id(),
                    stream_id: track.stream_id(),
                    kind,
                };
                // Rendering is out of scope; drain packets so buffers never fill.
                tokio::spawn(async move { while track.read_rtp().await.is_ok() {} });

                let _ = tx
                    .send(TransportEvent::RemoteTrack {
                        peer_id: uid,
                        link_id,
                        track: remote,
                    })
                    .await;
            })
        }));

        Ok(Self {
            peer_id,
            link_id,
            peer_connection,
            senders: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn create_offer(&self) -> Result<String> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(offer.sdp)
    }

    async fn create_answer(&self) -> Result<String> {
        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(answer.sdp)
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let desc = match description {
            SessionDescription::Offer(sdp) => RTCSessionDescription::offer(sdp)?,
            SessionDescription::Answer(sdp) => RTCSessionDescription::answer(sdp)?,
        };
        self.peer_connection.set_remote_description(desc).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            ..Default::default()
        };
        self.peer_connection.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn add_track(&self, track: &LocalTrack) -> Result<()> {
        let sender = self
            .peer_connection
            .add_track(track.rtc_track())
            .await
            .with_context(|| format!("Failed to add {} track", track.kind()))?;

        // RTCP has to be read for interceptors like NACK to work.
        let rtcp_sender = sender.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while rtcp_sender.read(&mut buf).await.is_ok() {}
        });

        self.senders.lock().await.insert(track.kind(), sender);
        Ok(())
    }

    async fn replace_track(&self, kind: TrackKind, track: &LocalTrack) -> Result<()> {
        let sender = self
            .senders
            .lock()
            .await
            .get(&kind)
            .cloned()
            .with_context(|| format!("No {} sender to replace", kind))?;
        sender.replace_track(Some(track.rtc_track())).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

/// Creates [`WebRtcTransport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebRtcTransportFactory;

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        peer_id: &PeerId,
        link_id: u64,
        ice_servers: Vec<IceServerConfig>,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn PeerTransport>> {
        let transport = WebRtcTransport::new(
            peer_id.clone(),
            link_id,
            TransportConfig::new(ice_servers),
            events,
        )
        .await?;
        Ok(Box::new(transport))
    }
}
