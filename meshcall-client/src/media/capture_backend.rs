use crate::MeshError;
use crate::media::local_stream::LocalStream;
use async_trait::async_trait;
use meshcall_core::CaptureKind;

/// Source of local capture streams (camera and microphone, or the screen).
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Opens a fresh stream. Fails with `DeviceUnavailable` or
    /// `PermissionDenied`.
    async fn open(&self, kind: CaptureKind) -> Result<LocalStream, MeshError>;

    /// Whether this backend can capture `kind` at all.
    fn supports(&self, _kind: CaptureKind) -> bool {
        true
    }
}
