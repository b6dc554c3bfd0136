use crate::media::{CaptureBackend, LocalStream, MediaSource, TrackEnded};
use crate::registry::PeerConnectionRegistry;
use crate::session::collaborators::{AttendanceRecorder, RoomView};
use crate::session::session_command::{Interrupt, SessionCommand};
use crate::session::session_state::{SessionSnapshot, SessionState};
use crate::signaling::{RosterEvent, SignalingChannel, SignalingOutput};
use crate::transport::{IceServerProvider, TransportEvent, TransportFactory};
use crate::{MeshConfig, MeshError};
use meshcall_core::{CaptureKind, PeerId, RoomCode, TrackKind};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// A capture started on a background task, tagged with what it was for.
struct CaptureDone {
    epoch: u64,
    ticket: u64,
    kind: CaptureKind,
    result: Result<LocalStream, MeshError>,
}

enum Input {
    Command(SessionCommand),
    Roster(Option<RosterEvent>),
    Transport(TransportEvent),
    TrackEnded(TrackEnded),
    Capture(CaptureDone),
}

/// Everything a session needs from the outside.
pub struct SessionParts {
    pub channel: Arc<dyn SignalingChannel>,
    pub capture: Arc<dyn CaptureBackend>,
    pub transport_factory: Arc<dyn TransportFactory>,
    pub ice_provider: Arc<dyn IceServerProvider>,
    pub view: Arc<dyn RoomView>,
    pub recorder: Arc<dyn AttendanceRecorder>,
}

/// The actor that owns one participant's room session.
///
/// Commands, roster events, transport callbacks, track-ended notices and
/// capture completions are all handled on this task, one at a time. A leave
/// or shutdown arrives on a separate watch channel and cancels whatever
/// handler is running.
pub struct MeshSession {
    config: MeshConfig,
    channel: Arc<dyn SignalingChannel>,
    media: MediaSource,
    registry: PeerConnectionRegistry,
    view: Arc<dyn RoomView>,
    recorder: Arc<dyn AttendanceRecorder>,

    command_rx: mpsc::Receiver<SessionCommand>,
    interrupts: watch::Receiver<Interrupt>,
    state_tx: watch::Sender<SessionState>,
    transport_rx: mpsc::Receiver<TransportEvent>,
    ended_rx: mpsc::UnboundedReceiver<TrackEnded>,
    capture_tx: mpsc::UnboundedSender<CaptureDone>,
    capture_rx: mpsc::UnboundedReceiver<CaptureDone>,
    events: Option<mpsc::Receiver<RosterEvent>>,
    signaling: Option<Arc<dyn SignalingOutput>>,

    state: SessionState,
    epoch: u64,
    capture_ticket: u64,
    room: Option<RoomCode>,
    username: String,
    local_peer: Option<PeerId>,
    screen_share: bool,
    rejoin_attempts: u32,
}

impl MeshSession {
    pub fn new(
        config: MeshConfig,
        parts: SessionParts,
        command_rx: mpsc::Receiver<SessionCommand>,
        interrupts: watch::Receiver<Interrupt>,
        state_tx: watch::Sender<SessionState>,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::channel(config.event_buffer.max(1));
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();

        let mut media = MediaSource::new(parts.capture, config.capture_timeout());
        media.on_track_ended(ended_tx);

        let registry = PeerConnectionRegistry::new(
            parts.transport_factory,
            parts.ice_provider,
            config.transport.fallback_ice_servers.clone(),
            parts.view.clone(),
            transport_tx,
            config.negotiation_timeout(),
        );

        Self {
            config,
            channel: parts.channel,
            media,
            registry,
            view: parts.view,
            recorder: parts.recorder,
            command_rx,
            interrupts,
            state_tx,
            transport_rx,
            ended_rx,
            capture_tx,
            capture_rx,
            events: None,
            signaling: None,
            state: SessionState::Idle,
            epoch: 0,
            capture_ticket: 0,
            room: None,
            username: String::new(),
            local_peer: None,
            screen_share: false,
            rejoin_attempts: 0,
        }
    }

    pub async fn run(mut self) {
        info!("Session event loop started");

        loop {
            let input = tokio::select! {
                biased;

                changed = self.interrupts.changed() => {
                    let interrupt = match changed {
                        Ok(()) => *self.interrupts.borrow_and_update(),
                        Err(_) => Interrupt { seq: 0, shutdown: true },
                    };
                    self.leave().await;
                    if interrupt.shutdown {
                        info!("Shutdown requested");
                        break;
                    }
                    continue;
                }

                cmd = self.command_rx.recv() => match cmd {
                    Some(c) => Input::Command(c),
                    None => {
                        info!("All session handles dropped");
                        break;
                    }
                },

                evt = next_roster_event(&mut self.events) => Input::Roster(evt),

                Some(evt) = self.transport_rx.recv() => Input::Transport(evt),

                Some(ended) = self.ended_rx.recv() => Input::TrackEnded(ended),

                Some(done) = self.capture_rx.recv() => Input::Capture(done),
            };

            let mut preempt = self.interrupts.clone();
            tokio::select! {
                biased;

                _ = preempt.changed() => debug!("Handler preempted"),
                _ = self.handle(input) => {}
            }
        }

        self.leave().await;
        info!("Session event loop finished");
    }

    async fn handle(&mut self, input: Input) {
        match input {
            Input::Command(cmd) => self.handle_command(cmd).await,
            Input::Roster(evt) => self.handle_roster_event(evt).await,
            Input::Transport(evt) => {
                if let Err(e) = self.registry.on_transport_event(evt).await {
                    warn!("Failed to relay transport event: {}", e);
                }
            }
            Input::TrackEnded(ended) => self.handle_track_ended(ended).await,
            Input::Capture(done) => self.handle_capture(done).await,
        }
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Join {
                room,
                username,
                reply,
            } => {
                let result = self.join(room, username).await;
                let _ = reply.send(result);
            }

            SessionCommand::ToggleVideo { reply } => {
                let enabled = self.toggle_video();
                let _ = reply.send(enabled);
            }

            SessionCommand::ToggleAudio { reply } => {
                let enabled = !self.media.intent(TrackKind::Audio);
                self.media.set_enabled(TrackKind::Audio, enabled);
                info!("Audio {}", if enabled { "on" } else { "off" });
                self.view.local_stream_ready(&self.media.descriptors());
                let _ = reply.send(enabled);
            }

            SessionCommand::ToggleScreenShare { reply } => {
                let result = self.toggle_screen_share().await;
                let _ = reply.send(result);
            }

            SessionCommand::SendChat { text, reply } => {
                let result = match &self.signaling {
                    Some(signaling) => signaling.send_chat(&self.username, &text).await,
                    None => Err(MeshError::NotInRoom),
                };
                let _ = reply.send(result);
            }

            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn join(&mut self, room: RoomCode, username: String) -> Result<(), MeshError> {
        if self.state != SessionState::Idle {
            return Err(MeshError::AlreadyInRoom);
        }
        if room.is_empty() {
            return Err(MeshError::Relay("room code is empty".to_owned()));
        }

        self.epoch += 1;
        info!("Joining room {} as {:?} (epoch {})", room, username, self.epoch);
        self.room = Some(room.clone());
        self.username = username;
        self.set_state(SessionState::Joining);
        self.recorder.record_join(&room);

        self.media.use_placeholder();
        self.view.local_stream_ready(&self.media.descriptors());
        self.request_capture(CaptureKind::Camera);

        if let Err(e) = self.connect().await {
            warn!("Failed to join room {}: {}", room, e);
            self.leave().await;
            return Err(e);
        }
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), MeshError> {
        let room = self.room.clone().ok_or(MeshError::NotInRoom)?;
        let roster = tokio::time::timeout(self.config.connect_timeout(), self.channel.connect(&room))
            .await
            .map_err(|_| MeshError::Relay(format!("timed out joining room {room}")))??;

        let signaling = self.channel.sender();
        self.registry.bind(roster.local_peer.clone(), signaling.clone());
        self.local_peer = Some(roster.local_peer);
        self.signaling = Some(signaling);
        self.events = Some(roster.events);
        Ok(())
    }

    async fn handle_roster_event(&mut self, event: Option<RosterEvent>) {
        let Some(event) = event else {
            self.handle_channel_lost().await;
            return;
        };

        match event {
            RosterEvent::PeerJoined { peer_id, roster } => {
                let tracks = self.media.tracks();
                match self.registry.on_peer_joined(&peer_id, &roster, &tracks).await {
                    Ok(true) => {
                        self.rejoin_attempts = 0;
                        if self.state == SessionState::Joining {
                            self.set_state(SessionState::Active);
                        }
                    }
                    Ok(false) => {}
                    Err(e) => warn!("Failed to handle join of {}: {}", peer_id, e),
                }
            }

            RosterEvent::PeerLeft(peer_id) => {
                self.registry.on_peer_left(&peer_id).await;
            }

            RosterEvent::MessageReceived { from, message } => {
                match self.registry.on_signal(&from, message).await {
                    Ok(()) => {}
                    Err(MeshError::UnknownPeer(peer)) => {
                        debug!("Dropped signal from unknown peer {}", peer)
                    }
                    Err(e) => warn!("Failed to handle signal from {}: {}", from, e),
                }
            }

            RosterEvent::ChatReceived(message) => {
                debug!("Chat from {}", message.sender);
                self.view.chat_received(&message);
            }
        }
    }

    /// The relay connection dropped. Rejoins per policy or leaves.
    async fn handle_channel_lost(&mut self) {
        self.events = None;
        if !self.state.in_room() {
            return;
        }

        warn!("Relay connection lost");
        self.registry.close_all().await;
        self.registry.unbind();
        self.signaling = None;
        self.local_peer = None;
        self.channel.disconnect().await;

        while self.config.rejoin.allows(self.rejoin_attempts) {
            self.rejoin_attempts += 1;
            tokio::time::sleep(self.config.rejoin.backoff()).await;

            self.epoch += 1;
            self.set_state(SessionState::Joining);
            info!(
                "Rejoin attempt {}/{} (epoch {})",
                self.rejoin_attempts, self.config.rejoin.max_attempts, self.epoch
            );

            match self.connect().await {
                Ok(()) => {
                    if self.media.is_placeholder() && !self.screen_share {
                        self.request_capture(CaptureKind::Camera);
                    }
                    return;
                }
                Err(e) => warn!("Rejoin attempt {} failed: {}", self.rejoin_attempts, e),
            }
        }

        info!("Not rejoining; leaving room");
        self.leave().await;
    }

    fn request_capture(&mut self, kind: CaptureKind) {
        self.capture_ticket += 1;
        let epoch = self.epoch;
        let ticket = self.capture_ticket;
        let capture = self.media.begin_acquire(kind);
        let tx = self.capture_tx.clone();

        debug!("Requesting {} capture (ticket {})", kind, ticket);
        tokio::spawn(async move {
            let result = capture.await;
            let _ = tx.send(CaptureDone {
                epoch,
                ticket,
                kind,
                result,
            });
        });
    }

    async fn handle_capture(&mut self, done: CaptureDone) {
        let current =
            done.epoch == self.epoch && done.ticket == self.capture_ticket && self.state.in_room();

        match done.result {
            Ok(stream) if !current => {
                debug!("Discarding stale {} capture (epoch {})", done.kind, done.epoch);
                stream.stop();
            }
            Ok(stream) if self.screen_share && done.kind == CaptureKind::Camera => {
                debug!("Discarding camera capture during screen share");
                stream.stop();
            }
            Ok(stream) => {
                self.media.install(stream);
                self.publish_local_tracks().await;
            }
            Err(e) if !current => debug!("Stale {} capture failed: {}", done.kind, e),
            Err(e) => warn!("{} capture failed, keeping placeholder: {}", done.kind, e),
        }
    }

    async fn handle_track_ended(&mut self, ended: TrackEnded) {
        if ended.generation != self.media.generation() {
            debug!("Ignoring end of {} track from an old stream", ended.kind);
            return;
        }

        warn!("Local {} track ({:?}) ended unexpectedly", ended.kind, ended.source);
        self.media.use_placeholder();
        self.publish_local_tracks().await;

        if self.screen_share {
            info!("Screen share ended");
            self.screen_share = false;
        }
        if self.state.in_room() {
            self.request_capture(CaptureKind::Camera);
        }
    }

    fn toggle_video(&mut self) -> bool {
        let enabled = !self.media.intent(TrackKind::Video);
        self.media.set_enabled(TrackKind::Video, enabled);
        info!("Video {}", if enabled { "on" } else { "off" });

        if enabled && self.state.in_room() && !self.media.is_live(TrackKind::Video) {
            self.screen_share = false;
            self.request_capture(CaptureKind::Camera);
        }
        self.view.local_stream_ready(&self.media.descriptors());
        enabled
    }

    async fn toggle_screen_share(&mut self) -> Result<bool, MeshError> {
        if !self.state.in_room() {
            return Err(MeshError::NotInRoom);
        }

        if self.screen_share {
            info!("Stopping screen share");
            self.screen_share = false;
            self.media.use_placeholder();
            self.media.set_enabled(TrackKind::Video, true);
            self.publish_local_tracks().await;
            self.request_capture(CaptureKind::Camera);
            return Ok(false);
        }

        if !self.media.supports(CaptureKind::Screen) {
            return Err(MeshError::DeviceUnavailable(
                "screen capture is not supported".to_owned(),
            ));
        }

        // Any camera capture still in flight must not land on top of the screen.
        self.capture_ticket += 1;
        match self.media.begin_acquire(CaptureKind::Screen).await {
            Ok(stream) => {
                info!("Screen share started");
                self.screen_share = true;
                self.media.install(stream);
                self.publish_local_tracks().await;
                Ok(true)
            }
            Err(e) => {
                warn!("Screen capture failed: {}", e);
                if self.media.is_placeholder() {
                    self.request_capture(CaptureKind::Camera);
                }
                Err(e)
            }
        }
    }

    async fn publish_local_tracks(&mut self) {
        let tracks = self.media.tracks();
        if let Err(e) = self.registry.push_local_tracks(&tracks).await {
            warn!("Failed to push local tracks: {}", e);
        }
        self.view.local_stream_ready(&self.media.descriptors());
    }

    /// Tears the membership down. Every step runs regardless of the others.
    async fn leave(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }

        info!("Leaving room");
        self.set_state(SessionState::Leaving);
        self.capture_ticket += 1;

        self.media.stop_all();
        if let Some(room) = &self.room {
            self.recorder.record_leave(room);
        }
        self.registry.close_all().await;
        self.registry.unbind();

        self.events = None;
        self.signaling = None;
        self.channel.disconnect().await;

        self.room = None;
        self.local_peer = None;
        self.screen_share = false;
        self.rejoin_attempts = 0;
        self.set_state(SessionState::Idle);
        info!("Left room");
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            epoch: self.epoch,
            room: self.room.clone(),
            local_peer: self.local_peer.clone(),
            peers: self.registry.summaries(),
            media: self.media.media_state(),
            screen_share: self.screen_share,
            placeholder: self.media.is_placeholder(),
            tracks: self.media.descriptors(),
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        debug!("Session state {} -> {}", self.state, state);
        self.state = state;
        self.state_tx.send_replace(state);
        self.view.session_state_changed(state);
    }
}

async fn next_roster_event(events: &mut Option<mpsc::Receiver<RosterEvent>>) -> Option<RosterEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
