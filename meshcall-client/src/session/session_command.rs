use crate::MeshError;
use crate::session::session_state::SessionSnapshot;
use meshcall_core::RoomCode;
use tokio::sync::oneshot;

/// Commands queued to the session actor. Each carries its reply channel.
#[derive(Debug)]
pub enum SessionCommand {
    Join {
        room: RoomCode,
        username: String,
        reply: oneshot::Sender<Result<(), MeshError>>,
    },

    /// Replies with the new outgoing-video intent.
    ToggleVideo { reply: oneshot::Sender<bool> },

    /// Replies with the new outgoing-audio intent.
    ToggleAudio { reply: oneshot::Sender<bool> },

    /// Replies with whether screen share is now active.
    ToggleScreenShare {
        reply: oneshot::Sender<Result<bool, MeshError>>,
    },

    SendChat {
        text: String,
        reply: oneshot::Sender<Result<(), MeshError>>,
    },

    Snapshot { reply: oneshot::Sender<SessionSnapshot> },
}

/// Out-of-band request that preempts whatever the actor is doing.
/// Every new request bumps `seq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interrupt {
    pub seq: u64,
    /// Leave and stop the actor.
    pub shutdown: bool,
}
