mod mesh_tests;
mod session_tests;

use meshcall_client::{MeshConfig, SessionBuilder, SessionHandle, SyntheticCapture};
use meshcall_core::PeerId;
use meshcall_relay::SignalingService;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Level;

use crate::utils::{LoopbackChannel, MockTransportFactory, RecordingView, test_config};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A session wired to an in-process relay, recording everything it does.
pub struct TestPeer {
    pub handle: SessionHandle,
    pub task: JoinHandle<()>,
    pub factory: MockTransportFactory,
    pub view: RecordingView,
    pub capture: SyntheticCapture,
    pub channel: Arc<LoopbackChannel>,
}

impl TestPeer {
    /// Relay-assigned id of the current membership.
    pub fn peer_id(&self) -> PeerId {
        self.channel
            .local_peer()
            .expect("peer is not connected to the relay")
    }
}

pub fn spawn_peer(service: &SignalingService) -> TestPeer {
    spawn_peer_with(service, test_config(), SyntheticCapture::new())
}

pub fn spawn_peer_with(
    service: &SignalingService,
    config: MeshConfig,
    capture: SyntheticCapture,
) -> TestPeer {
    let factory = MockTransportFactory::new();
    let view = RecordingView::new();
    let channel = Arc::new(LoopbackChannel::new(service.clone()).with_log(view.log.clone()));

    let (handle, task) = SessionBuilder::new(config)
        .with_channel(channel.clone())
        .with_capture(Arc::new(capture.clone()))
        .with_transport_factory(Arc::new(factory.clone()))
        .with_view(Arc::new(view.clone()))
        .with_recorder(Arc::new(view.clone()))
        .spawn();

    TestPeer {
        handle,
        task,
        factory,
        view,
        capture,
        channel,
    }
}
