use crate::MeshError;
use crate::media::capture_backend::CaptureBackend;
use crate::media::local_stream::{LocalStream, StreamOrigin};
use crate::media::local_track::{LocalTrack, TrackDescriptor, TrackSource, TrackState};
use crate::media::placeholder::{placeholder_stream, silent_audio_track};
use futures::FutureExt;
use futures::future::BoxFuture;
use meshcall_core::{CaptureKind, TrackKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A track of the installed stream stopped on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEnded {
    /// Generation of the stream the track belonged to.
    pub generation: u64,
    pub kind: TrackKind,
    pub source: TrackSource,
}

/// User intent and hardware liveness of one device kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceState {
    pub enabled: bool,
    pub live: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaState {
    pub audio: DeviceState,
    pub video: DeviceState,
}

impl MediaState {
    pub fn device(&self, kind: TrackKind) -> DeviceState {
        match kind {
            TrackKind::Audio => self.audio,
            TrackKind::Video => self.video,
        }
    }
}

/// Owns the local capture stream and the outgoing-enabled intent per kind.
///
/// Every installed stream gets a new generation; track-ended notifications
/// carry it so the owner can drop the ones about streams already replaced.
pub struct MediaSource {
    backend: Arc<dyn CaptureBackend>,
    capture_timeout: Duration,
    current: Option<LocalStream>,
    generation: u64,
    audio_enabled: bool,
    video_enabled: bool,
    ended_tx: Option<mpsc::UnboundedSender<TrackEnded>>,
}

impl MediaSource {
    pub fn new(backend: Arc<dyn CaptureBackend>, capture_timeout: Duration) -> Self {
        Self {
            backend,
            capture_timeout,
            current: None,
            generation: 0,
            audio_enabled: true,
            video_enabled: true,
            ended_tx: None,
        }
    }

    /// Routes track-ended notifications of every later install to `tx`.
    pub fn on_track_ended(&mut self, tx: mpsc::UnboundedSender<TrackEnded>) {
        self.ended_tx = Some(tx);
    }

    pub fn supports(&self, kind: CaptureKind) -> bool {
        self.backend.supports(kind)
    }

    /// Starts a capture without touching the installed stream. The returned
    /// future owns everything it needs, so it can run on another task.
    pub fn begin_acquire(&self, kind: CaptureKind) -> BoxFuture<'static, Result<LocalStream, MeshError>> {
        let backend = self.backend.clone();
        let timeout = self.capture_timeout;

        async move {
            match tokio::time::timeout(timeout, backend.open(kind)).await {
                Ok(result) => result,
                Err(_) => Err(MeshError::DeviceUnavailable(format!(
                    "{kind} capture timed out after {}ms",
                    timeout.as_millis()
                ))),
            }
        }
        .boxed()
    }

    /// Captures `kind` and installs it in place of the current stream.
    pub async fn acquire(&mut self, kind: CaptureKind) -> Result<u64, MeshError> {
        let stream = self.begin_acquire(kind).await?;
        Ok(self.install(stream))
    }

    /// Replaces the current stream, stopping the old one first. Returns the
    /// new generation.
    pub fn install(&mut self, mut stream: LocalStream) -> u64 {
        if let Some(old) = self.current.take() {
            old.stop();
        }

        if stream.origin() == StreamOrigin::Screen && stream.track(TrackKind::Audio).is_none() {
            let silence = silent_audio_track(stream.id());
            stream.set_track(silence);
        }

        for track in stream.tracks() {
            if !track.is_placeholder() {
                track.set_enabled(self.intent(track.kind()));
            }
        }

        self.generation += 1;
        if let Some(tx) = &self.ended_tx {
            for track in stream.tracks() {
                watch_track(track, self.generation, tx.clone());
            }
        }

        info!(
            "Installed {:?} stream {} (generation {})",
            stream.origin(),
            stream.id(),
            self.generation
        );
        self.current = Some(stream);
        self.generation
    }

    pub fn use_placeholder(&mut self) -> u64 {
        self.install(placeholder_stream())
    }

    /// Records the outgoing intent for `kind` and applies it to the current
    /// track of that kind. Placeholder tracks stay disabled.
    pub fn set_enabled(&mut self, kind: TrackKind, enabled: bool) {
        match kind {
            TrackKind::Audio => self.audio_enabled = enabled,
            TrackKind::Video => self.video_enabled = enabled,
        }

        match self.track(kind) {
            Some(track) if !track.is_placeholder() => track.set_enabled(enabled),
            Some(_) => debug!("{} intent recorded; placeholder stays disabled", kind),
            None => {}
        }
    }

    pub fn intent(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Audio => self.audio_enabled,
            TrackKind::Video => self.video_enabled,
        }
    }

    /// True when a real device track of `kind` is producing data.
    pub fn is_live(&self, kind: TrackKind) -> bool {
        self.track(kind)
            .is_some_and(|track| track.is_live() && !track.is_placeholder())
    }

    pub fn media_state(&self) -> MediaState {
        let device = |kind| DeviceState {
            enabled: self.intent(kind),
            live: self.is_live(kind),
        };
        MediaState {
            audio: device(TrackKind::Audio),
            video: device(TrackKind::Video),
        }
    }

    pub fn track(&self, kind: TrackKind) -> Option<&LocalTrack> {
        self.current.as_ref().and_then(|stream| stream.track(kind))
    }

    pub fn tracks(&self) -> Vec<LocalTrack> {
        self.current
            .as_ref()
            .map(LocalStream::tracks)
            .unwrap_or_default()
    }

    pub fn descriptors(&self) -> Vec<TrackDescriptor> {
        self.current
            .as_ref()
            .map(LocalStream::descriptors)
            .unwrap_or_default()
    }

    pub fn current(&self) -> Option<&LocalStream> {
        self.current.as_ref()
    }

    pub fn origin(&self) -> Option<StreamOrigin> {
        self.current.as_ref().map(LocalStream::origin)
    }

    pub fn is_placeholder(&self) -> bool {
        self.origin() == Some(StreamOrigin::Placeholder)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stops every local track and forgets the stream.
    pub fn stop_all(&mut self) {
        if let Some(stream) = self.current.take() {
            stream.stop();
            self.generation += 1;
            info!("Stopped local stream {}", stream.id());
        }
    }
}

fn watch_track(track: LocalTrack, generation: u64, tx: mpsc::UnboundedSender<TrackEnded>) {
    tokio::spawn(async move {
        if track.finished().await == TrackState::Ended {
            debug!("Track {} ended (generation {})", track.id(), generation);
            let _ = tx.send(TrackEnded {
                generation,
                kind: track.kind(),
                source: track.source(),
            });
        }
    });
}
