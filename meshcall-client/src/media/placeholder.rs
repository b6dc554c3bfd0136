use crate::media::local_stream::{LocalStream, StreamOrigin};
use crate::media::local_track::{
    LocalTrack, OPUS_SILENCE_FRAME, TrackSource, VP8_PLACEHOLDER_KEYFRAME,
};
use bytes::Bytes;
use meshcall_core::TrackKind;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

pub const SILENCE_FRAME_DURATION: Duration = Duration::from_millis(20);

/// How often the placeholder video repeats its keyframe, so connections bound
/// later still get a frame to decode.
pub const PLACEHOLDER_FRAME_INTERVAL: Duration = Duration::from_secs(1);

/// Black, disabled video plus silent, disabled audio. Installed whenever no
/// real capture is available, so no connection is ever left without tracks.
pub fn placeholder_stream() -> LocalStream {
    let stream = LocalStream::new(StreamOrigin::Placeholder);

    let video = placeholder_video_track(stream.id());
    let audio = silent_audio_track(stream.id());
    stream.with_track(video).with_track(audio)
}

/// A disabled video track that still sends a keyframe, starting on creation.
pub fn placeholder_video_track(stream_id: &str) -> LocalTrack {
    let track = LocalTrack::new(TrackKind::Video, TrackSource::Placeholder, stream_id);
    track.set_enabled(false);
    spawn_pump(
        track.clone(),
        Bytes::from_static(&VP8_PLACEHOLDER_KEYFRAME),
        PLACEHOLDER_FRAME_INTERVAL,
        true,
    );
    track
}

/// A disabled audio track fed with Opus silence until it is stopped.
pub fn silent_audio_track(stream_id: &str) -> LocalTrack {
    let track = LocalTrack::new(TrackKind::Audio, TrackSource::Placeholder, stream_id);
    track.set_enabled(false);
    spawn_sample_pump(
        track.clone(),
        Bytes::from_static(&OPUS_SILENCE_FRAME),
        SILENCE_FRAME_DURATION,
    );
    track
}

/// Writes `payload` to `track` every `every` until the track stops or ends.
pub fn spawn_sample_pump(track: LocalTrack, payload: Bytes, every: Duration) -> JoinHandle<()> {
    spawn_pump(track, payload, every, false)
}

fn spawn_pump(track: LocalTrack, payload: Bytes, every: Duration, raw: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        let finished = track.finished();
        tokio::pin!(finished);

        loop {
            tokio::select! {
                _ = &mut finished => break,
                _ = ticker.tick() => {
                    let written = if raw {
                        track.write_raw_sample(payload.clone(), every).await
                    } else {
                        track.write_sample(payload.clone(), every).await
                    };
                    if let Err(e) = written {
                        debug!("Sample pump for {} skipped a frame: {:?}", track.id(), e);
                    }
                }
            }
        }
    })
}
