use anyhow::{Context, Result};
use bytes::Bytes;
use meshcall_core::TrackKind;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// One Opus frame of digital silence.
pub const OPUS_SILENCE_FRAME: [u8; 3] = [0xF8, 0xFF, 0xFE];

/// A complete 1x1 VP8 keyframe.
pub const VP8_PLACEHOLDER_KEYFRAME: [u8; 22] = [
    0x30, 0x01, 0x00, 0x9d, 0x01, 0x2a, 0x01, 0x00, 0x01, 0x00, 0x0e, 0xc0, 0xfe, 0x25, 0xa4,
    0x00, 0x03, 0x70, 0x00, 0x00, 0x00, 0x00,
];

/// Where a local track's samples come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackSource {
    Camera,
    Microphone,
    Screen,
    ScreenAudio,
    Placeholder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Live,
    /// The device stopped producing data on its own.
    Ended,
    /// Stopped on purpose by its owner.
    Stopped,
}

/// Plain description of a local track, for views and snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    pub id: String,
    pub kind: TrackKind,
    pub source: TrackSource,
    pub enabled: bool,
    pub live: bool,
}

struct LocalTrackInner {
    id: String,
    kind: TrackKind,
    source: TrackSource,
    enabled: AtomicBool,
    state: watch::Sender<TrackState>,
    rtc: Arc<TrackLocalStaticSample>,
}

/// A local media track that can be bound to any number of peer connections.
///
/// Clones share the same underlying track, so flipping `enabled` on one clone
/// is seen by every connection sending it.
#[derive(Clone)]
pub struct LocalTrack {
    inner: Arc<LocalTrackInner>,
}

impl LocalTrack {
    pub fn new(kind: TrackKind, source: TrackSource, stream_id: &str) -> Self {
        let id = format!("{}-{}", kind, uuid::Uuid::new_v4());
        let rtc = TrackLocalStaticSample::new(codec_for(kind), id.clone(), stream_id.to_owned());

        Self {
            inner: Arc::new(LocalTrackInner {
                id,
                kind,
                source,
                enabled: AtomicBool::new(true),
                state: watch::Sender::new(TrackState::Live),
                rtc: Arc::new(rtc),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn source(&self) -> TrackSource {
        self.inner.source
    }

    pub fn is_placeholder(&self) -> bool {
        self.inner.source == TrackSource::Placeholder
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
    }

    pub fn state(&self) -> TrackState {
        *self.inner.state.borrow()
    }

    pub fn is_live(&self) -> bool {
        self.state() == TrackState::Live
    }

    /// Stops the track on purpose. Watchers see `Stopped`, not `Ended`.
    pub fn stop(&self) {
        self.finish(TrackState::Stopped);
    }

    /// Marks the track as ended by its device.
    pub fn end(&self) {
        self.finish(TrackState::Ended);
    }

    fn finish(&self, state: TrackState) {
        self.inner.state.send_if_modified(|current| {
            if *current == TrackState::Live {
                *current = state;
                true
            } else {
                false
            }
        });
    }

    /// Resolves once the track leaves `Live`, with the state it left for.
    pub async fn finished(&self) -> TrackState {
        let mut rx = self.inner.state.subscribe();
        match rx.wait_for(|state| *state != TrackState::Live).await {
            Ok(state) => *state,
            Err(_) => TrackState::Stopped,
        }
    }

    pub fn rtc_track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        self.inner.rtc.clone()
    }

    /// Writes one media sample. A disabled audio track sends silence and a
    /// disabled video track sends nothing.
    pub async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<()> {
        let data = if self.is_enabled() {
            data
        } else {
            match self.kind() {
                TrackKind::Audio => Bytes::from_static(&OPUS_SILENCE_FRAME),
                TrackKind::Video => return Ok(()),
            }
        };
        self.write_raw_sample(data, duration).await
    }

    /// Writes one sample whatever the enabled flag says. Samples written
    /// before the track is bound to a connection are dropped.
    pub async fn write_raw_sample(&self, data: Bytes, duration: Duration) -> Result<()> {
        if !self.is_live() {
            return Ok(());
        }

        self.inner
            .rtc
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await
            .with_context(|| format!("Failed to write sample to track {}", self.id()))?;
        Ok(())
    }

    pub fn descriptor(&self) -> TrackDescriptor {
        TrackDescriptor {
            id: self.inner.id.clone(),
            kind: self.inner.kind,
            source: self.inner.source,
            enabled: self.is_enabled(),
            live: self.is_live(),
        }
    }

    pub fn same_track(&self, other: &LocalTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("source", &self.inner.source)
            .field("enabled", &self.is_enabled())
            .field("state", &self.state())
            .finish()
    }
}

fn codec_for(kind: TrackKind) -> RTCRtpCodecCapability {
    match kind {
        TrackKind::Video => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90_000,
            ..Default::default()
        },
        TrackKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48_000,
            channels: 2,
            ..Default::default()
        },
    }
}
