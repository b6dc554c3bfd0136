use crate::media::local_track::{LocalTrack, TrackDescriptor};
use meshcall_core::TrackKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamOrigin {
    Camera,
    Screen,
    Placeholder,
}

/// A captured stream: at most one track per kind.
#[derive(Debug, Clone)]
pub struct LocalStream {
    id: String,
    origin: StreamOrigin,
    audio: Option<LocalTrack>,
    video: Option<LocalTrack>,
}

impl LocalStream {
    pub fn new(origin: StreamOrigin) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            origin,
            audio: None,
            video: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn origin(&self) -> StreamOrigin {
        self.origin
    }

    /// Sets the track of the given track's kind, returning the one it replaced.
    pub fn set_track(&mut self, track: LocalTrack) -> Option<LocalTrack> {
        let slot = match track.kind() {
            TrackKind::Audio => &mut self.audio,
            TrackKind::Video => &mut self.video,
        };
        slot.replace(track)
    }

    pub fn with_track(mut self, track: LocalTrack) -> Self {
        self.set_track(track);
        self
    }

    pub fn track(&self, kind: TrackKind) -> Option<&LocalTrack> {
        match kind {
            TrackKind::Audio => self.audio.as_ref(),
            TrackKind::Video => self.video.as_ref(),
        }
    }

    pub fn tracks(&self) -> Vec<LocalTrack> {
        TrackKind::ALL
            .iter()
            .filter_map(|kind| self.track(*kind).cloned())
            .collect()
    }

    pub fn descriptors(&self) -> Vec<TrackDescriptor> {
        self.tracks().iter().map(LocalTrack::descriptor).collect()
    }

    pub fn stop(&self) {
        for track in self.tracks() {
            track.stop();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.tracks().iter().all(|track| !track.is_live())
    }
}
