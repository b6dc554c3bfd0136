use crate::MeshError;
use crate::media::capture_backend::CaptureBackend;
use crate::media::local_stream::{LocalStream, StreamOrigin};
use crate::media::local_track::{LocalTrack, OPUS_SILENCE_FRAME, TrackSource};
use crate::media::placeholder::{SILENCE_FRAME_DURATION, spawn_sample_pump};
use async_trait::async_trait;
use bytes::Bytes;
use meshcall_core::{CaptureKind, TrackKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

const VIDEO_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Keyframe-sized stand-in for a VP8 frame.
static SYNTHETIC_VP8_FRAME: [u8; 10] = [0x10, 0x02, 0x00, 0x9d, 0x01, 0x2a, 0x02, 0x00, 0x02, 0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAvailability {
    Available,
    Missing,
    Denied,
}

#[derive(Default)]
struct Device {
    availability: Option<DeviceAvailability>,
    opened: usize,
    issued: Vec<LocalStream>,
}

struct SyntheticInner {
    camera: Mutex<Device>,
    screen: Mutex<Device>,
    screen_supported: AtomicBool,
    screen_audio: AtomicBool,
    pump_media: AtomicBool,
    open_delay: Mutex<Option<Duration>>,
}

/// Capture backend that makes real tracks without touching hardware.
///
/// Devices can be made missing or denied, opens can be slowed down and any
/// issued track can be ended as if its device went away.
#[derive(Clone)]
pub struct SyntheticCapture {
    inner: Arc<SyntheticInner>,
}

impl Default for SyntheticCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticCapture {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SyntheticInner {
                camera: Mutex::new(Device::default()),
                screen: Mutex::new(Device::default()),
                screen_supported: AtomicBool::new(true),
                screen_audio: AtomicBool::new(false),
                pump_media: AtomicBool::new(false),
                open_delay: Mutex::new(None),
            }),
        }
    }

    /// Feeds issued tracks with synthetic frames and silence.
    pub fn with_media_pump(self, enabled: bool) -> Self {
        self.inner.pump_media.store(enabled, Ordering::Release);
        self
    }

    pub fn with_screen_audio(self, enabled: bool) -> Self {
        self.inner.screen_audio.store(enabled, Ordering::Release);
        self
    }

    pub fn set_screen_supported(&self, supported: bool) {
        self.inner.screen_supported.store(supported, Ordering::Release);
    }

    pub fn set_availability(&self, kind: CaptureKind, availability: DeviceAvailability) {
        if let Ok(mut device) = self.device(kind).lock() {
            device.availability = Some(availability);
        }
    }

    pub fn set_open_delay(&self, delay: Option<Duration>) {
        if let Ok(mut slot) = self.inner.open_delay.lock() {
            *slot = delay;
        }
    }

    /// Number of open attempts for `kind`, failed ones included.
    pub fn open_count(&self, kind: CaptureKind) -> usize {
        self.device(kind).lock().map(|d| d.opened).unwrap_or(0)
    }

    /// Every stream handed out for `kind`, oldest first.
    pub fn issued(&self, kind: CaptureKind) -> Vec<LocalStream> {
        self.device(kind)
            .lock()
            .map(|d| d.issued.clone())
            .unwrap_or_default()
    }

    pub fn latest(&self, kind: CaptureKind) -> Option<LocalStream> {
        self.issued(kind).pop()
    }

    /// Ends the live `track` kind of the most recent stream of `capture`.
    /// Returns false when there is no such live track.
    pub fn end_track(&self, capture: CaptureKind, track: TrackKind) -> bool {
        match self.latest(capture).as_ref().and_then(|s| s.track(track)) {
            Some(local) if local.is_live() => {
                local.end();
                true
            }
            _ => false,
        }
    }

    fn device(&self, kind: CaptureKind) -> &Mutex<Device> {
        match kind {
            CaptureKind::Camera => &self.inner.camera,
            CaptureKind::Screen => &self.inner.screen,
        }
    }

    fn build_stream(&self, kind: CaptureKind) -> LocalStream {
        let (origin, video_source, audio_source) = match kind {
            CaptureKind::Camera => (
                StreamOrigin::Camera,
                TrackSource::Camera,
                Some(TrackSource::Microphone),
            ),
            CaptureKind::Screen => (
                StreamOrigin::Screen,
                TrackSource::Screen,
                self.inner
                    .screen_audio
                    .load(Ordering::Acquire)
                    .then_some(TrackSource::ScreenAudio),
            ),
        };

        let mut stream = LocalStream::new(origin);
        let video = LocalTrack::new(TrackKind::Video, video_source, stream.id());
        stream.set_track(video);
        if let Some(source) = audio_source {
            let audio = LocalTrack::new(TrackKind::Audio, source, stream.id());
            stream.set_track(audio);
        }

        if self.inner.pump_media.load(Ordering::Acquire) {
            for track in stream.tracks() {
                let (payload, every) = match track.kind() {
                    TrackKind::Video => (
                        Bytes::from_static(&SYNTHETIC_VP8_FRAME),
                        VIDEO_FRAME_INTERVAL,
                    ),
                    TrackKind::Audio => (
                        Bytes::from_static(&OPUS_SILENCE_FRAME),
                        SILENCE_FRAME_DURATION,
                    ),
                };
                spawn_sample_pump(track, payload, every);
            }
        }
        stream
    }
}

#[async_trait]
impl CaptureBackend for SyntheticCapture {
    async fn open(&self, kind: CaptureKind) -> Result<LocalStream, MeshError> {
        let delay = self.inner.open_delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let availability = {
            let mut device = self
                .device(kind)
                .lock()
                .map_err(|_| MeshError::DeviceUnavailable(format!("{kind} state poisoned")))?;
            device.opened += 1;
            device.availability.unwrap_or(DeviceAvailability::Available)
        };

        match availability {
            DeviceAvailability::Missing => {
                return Err(MeshError::DeviceUnavailable(format!("no {kind} device")));
            }
            DeviceAvailability::Denied => {
                return Err(MeshError::PermissionDenied(format!("{kind} access denied")));
            }
            DeviceAvailability::Available => {}
        }

        let stream = self.build_stream(kind);
        debug!("Synthetic {} stream {} opened", kind, stream.id());
        if let Ok(mut device) = self.device(kind).lock() {
            device.issued.push(stream.clone());
        }
        Ok(stream)
    }

    fn supports(&self, kind: CaptureKind) -> bool {
        match kind {
            CaptureKind::Camera => true,
            CaptureKind::Screen => self.inner.screen_supported.load(Ordering::Acquire),
        }
    }
}
