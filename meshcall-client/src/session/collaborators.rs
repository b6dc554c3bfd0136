use crate::media::TrackDescriptor;
use crate::session::session_state::SessionState;
use crate::transport::RemoteStream;
use meshcall_core::{ChatMessage, PeerId, RoomCode};

/// Render layer. Calls are made from the session task and must not block.
pub trait RoomView: Send + Sync {
    fn local_stream_ready(&self, tracks: &[TrackDescriptor]);

    /// Called each time a track arrives; `stream` holds everything received
    /// from that peer so far.
    fn remote_stream_added(&self, stream: &RemoteStream);

    fn remote_stream_removed(&self, peer_id: &PeerId);

    fn chat_received(&self, message: &ChatMessage);

    fn session_state_changed(&self, _state: SessionState) {}
}

/// Meeting attendance bookkeeping. Fire-and-forget.
pub trait AttendanceRecorder: Send + Sync {
    fn record_join(&self, room: &RoomCode);
    fn record_leave(&self, room: &RoomCode);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullView;

impl RoomView for NullView {
    fn local_stream_ready(&self, _tracks: &[TrackDescriptor]) {}
    fn remote_stream_added(&self, _stream: &RemoteStream) {}
    fn remote_stream_removed(&self, _peer_id: &PeerId) {}
    fn chat_received(&self, _message: &ChatMessage) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullRecorder;

impl AttendanceRecorder for NullRecorder {
    fn record_join(&self, _room: &RoomCode) {}
    fn record_leave(&self, _room: &RoomCode) {}
}
