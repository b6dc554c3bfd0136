use crate::media::{CaptureBackend, SyntheticCapture};
use crate::session::collaborators::{AttendanceRecorder, NullRecorder, NullView, RoomView};
use crate::session::session::{MeshSession, SessionParts};
use crate::session::session_command::{Interrupt, SessionCommand};
use crate::session::session_state::{SessionSnapshot, SessionState};
use crate::signaling::{SignalingChannel, WsSignalingChannel};
use crate::transport::{IceServerProvider, StaticIceServers, TransportFactory, WebRtcTransportFactory};
use crate::{MeshConfig, MeshError};
use meshcall_core::RoomCode;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

const COMMAND_BUFFER: usize = 32;

/// Cloneable front door to a [`MeshSession`]. Dropping every clone tears the
/// session down.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    interrupts: Arc<watch::Sender<Interrupt>>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub async fn join(
        &self,
        room: impl Into<RoomCode>,
        username: impl Into<String>,
    ) -> Result<(), MeshError> {
        let room = room.into();
        let username = username.into();
        self.request(|reply| SessionCommand::Join {
            room,
            username,
            reply,
        })
        .await?
    }

    /// Returns the new outgoing-video intent.
    pub async fn toggle_video(&self) -> Result<bool, MeshError> {
        self.request(|reply| SessionCommand::ToggleVideo { reply })
            .await
    }

    /// Returns the new outgoing-audio intent.
    pub async fn toggle_audio(&self) -> Result<bool, MeshError> {
        self.request(|reply| SessionCommand::ToggleAudio { reply })
            .await
    }

    /// Returns whether screen share is active afterwards.
    pub async fn toggle_screen_share(&self) -> Result<bool, MeshError> {
        self.request(|reply| SessionCommand::ToggleScreenShare { reply })
            .await?
    }

    pub async fn send_chat(&self, text: impl Into<String>) -> Result<(), MeshError> {
        let text = text.into();
        self.request(|reply| SessionCommand::SendChat { text, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, MeshError> {
        self.request(|reply| SessionCommand::Snapshot { reply })
            .await
    }

    /// Leaves the current room, cancelling whatever the session is doing, and
    /// waits until it is idle again.
    pub async fn leave(&self) -> Result<(), MeshError> {
        self.interrupts.send_modify(|interrupt| interrupt.seq += 1);
        self.wait_idle().await
    }

    /// Leaves and stops the session task.
    pub async fn shutdown(&self) -> Result<(), MeshError> {
        self.interrupts.send_modify(|interrupt| {
            interrupt.seq += 1;
            interrupt.shutdown = true;
        });
        self.wait_idle().await
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    async fn wait_idle(&self) -> Result<(), MeshError> {
        let mut state = self.state.clone();
        if state.wait_for(|s| *s == SessionState::Idle).await.is_ok() {
            return Ok(());
        }
        match *state.borrow() {
            SessionState::Idle => Ok(()),
            _ => Err(MeshError::SessionClosed),
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, MeshError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| MeshError::SessionClosed)?;

        rx.await.map_err(|_| {
            if self.commands.is_closed() {
                MeshError::SessionClosed
            } else {
                MeshError::Interrupted
            }
        })
    }
}

/// Assembles a [`MeshSession`]. Anything not supplied falls back to the
/// WebSocket relay channel, synthetic capture, webrtc-rs transports and the
/// configured fallback ICE servers.
pub struct SessionBuilder {
    config: MeshConfig,
    channel: Option<Arc<dyn SignalingChannel>>,
    capture: Option<Arc<dyn CaptureBackend>>,
    transport_factory: Option<Arc<dyn TransportFactory>>,
    ice_provider: Option<Arc<dyn IceServerProvider>>,
    view: Arc<dyn RoomView>,
    recorder: Arc<dyn AttendanceRecorder>,
}

impl SessionBuilder {
    pub fn new(config: MeshConfig) -> Self {
        Self {
            config,
            channel: None,
            capture: None,
            transport_factory: None,
            ice_provider: None,
            view: Arc::new(NullView),
            recorder: Arc::new(NullRecorder),
        }
    }

    pub fn with_channel(mut self, channel: Arc<dyn SignalingChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_capture(mut self, capture: Arc<dyn CaptureBackend>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    pub fn with_ice_provider(mut self, provider: Arc<dyn IceServerProvider>) -> Self {
        self.ice_provider = Some(provider);
        self
    }

    pub fn with_view(mut self, view: Arc<dyn RoomView>) -> Self {
        self.view = view;
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn AttendanceRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Builds the actor without starting it.
    pub fn build(self) -> (SessionHandle, MeshSession) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (interrupt_tx, interrupt_rx) = watch::channel(Interrupt::default());
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        let parts = SessionParts {
            channel: self
                .channel
                .unwrap_or_else(|| Arc::new(WsSignalingChannel::from_config(&self.config))),
            capture: self
                .capture
                .unwrap_or_else(|| Arc::new(SyntheticCapture::new())),
            transport_factory: self
                .transport_factory
                .unwrap_or_else(|| Arc::new(WebRtcTransportFactory)),
            ice_provider: self.ice_provider.unwrap_or_else(|| {
                Arc::new(StaticIceServers(
                    self.config.transport.fallback_ice_servers.clone(),
                ))
            }),
            view: self.view,
            recorder: self.recorder,
        };

        let session = MeshSession::new(self.config, parts, command_rx, interrupt_rx, state_tx);
        let handle = SessionHandle {
            commands: command_tx,
            interrupts: Arc::new(interrupt_tx),
            state: state_rx,
        };
        (handle, session)
    }

    pub fn spawn(self) -> (SessionHandle, JoinHandle<()>) {
        let (handle, session) = self.build();
        let task = tokio::spawn(session.run());
        (handle, task)
    }
}
