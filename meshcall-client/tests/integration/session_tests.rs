use meshcall_client::{MeshError, RejoinPolicy, SessionState, SyntheticCapture};
use meshcall_core::{CaptureKind, RoomCode, TrackKind};
use meshcall_relay::SignalingService;
use std::time::{Duration, Instant};

use crate::integration::{init_tracing, spawn_peer, spawn_peer_with};
use crate::utils::{ViewEvent, test_config, wait_for_snapshot, wait_until};

#[tokio::test]
async fn test_leave_tears_down_in_order() {
    init_tracing();
    let service = SignalingService::new();
    let p1 = spawn_peer(&service);
    let p2 = spawn_peer(&service);
    p1.handle.join("order", "alice").await.unwrap();
    p2.handle.join("order", "bob").await.unwrap();
    wait_for_snapshot(&p1.handle, "camera and peer", |s| {
        !s.placeholder && s.peers.len() == 1
    })
    .await
    .unwrap();
    let p2_id = p2.peer_id();
    let camera = p1.capture.latest(CaptureKind::Camera).unwrap();

    p1.handle.leave().await.unwrap();

    assert_eq!(p1.handle.state(), SessionState::Idle);
    assert!(camera.is_stopped());

    let log = &p1.view.log;
    let recorded = log
        .position(|e| *e == ViewEvent::RecordLeave(RoomCode::from("order")))
        .unwrap();
    let removed = log
        .position(|e| *e == ViewEvent::RemoteStreamRemoved(p2_id.clone()))
        .unwrap();
    let disconnected = log
        .position(|e| *e == ViewEvent::ChannelDisconnected)
        .unwrap();
    let idle = log
        .position(|e| *e == ViewEvent::State(SessionState::Idle))
        .unwrap();
    assert!(recorded < removed);
    assert!(removed < disconnected);
    assert!(disconnected < idle);
    assert_eq!(p1.factory.open_links(), 0);

    wait_for_snapshot(&p2.handle, "p2 alone", |s| s.peers.is_empty())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_join_twice_is_rejected_and_leave_is_idempotent() {
    init_tracing();
    let service = SignalingService::new();
    let p1 = spawn_peer(&service);

    p1.handle.leave().await.unwrap();
    p1.handle.join("twice", "alice").await.unwrap();
    assert_eq!(
        p1.handle.join("twice", "alice").await,
        Err(MeshError::AlreadyInRoom)
    );

    p1.handle.leave().await.unwrap();
    p1.handle.leave().await.unwrap();
    assert_eq!(
        p1.view
            .log
            .count(|e| matches!(e, ViewEvent::RecordLeave(_))),
        1
    );
    assert_eq!(p1.handle.send_chat("nobody").await, Err(MeshError::NotInRoom));
}

#[tokio::test]
async fn test_capture_from_abandoned_join_is_stopped() {
    init_tracing();
    let service = SignalingService::new();
    let capture = SyntheticCapture::new();
    capture.set_open_delay(Some(Duration::from_millis(200)));
    let p1 = spawn_peer_with(&service, test_config(), capture.clone());

    p1.handle.join("epochs", "alice").await.unwrap();
    p1.handle.leave().await.unwrap();
    p1.handle.join("epochs", "alice").await.unwrap();

    let snapshot = wait_for_snapshot(&p1.handle, "second capture installed", |s| {
        !s.placeholder && capture.issued(CaptureKind::Camera).len() == 2
    })
    .await
    .unwrap();
    assert_eq!(snapshot.epoch, 2);

    let issued = capture.issued(CaptureKind::Camera);
    let installed_video = snapshot
        .tracks
        .iter()
        .find(|t| t.kind == TrackKind::Video)
        .map(|t| t.id.clone())
        .unwrap();
    let (live, stale): (Vec<_>, Vec<_>) = issued.iter().partition(|stream| {
        stream
            .track(TrackKind::Video)
            .is_some_and(|t| t.id() == installed_video)
    });
    assert_eq!(live.len(), 1);
    assert_eq!(stale.len(), 1);
    wait_until("stale capture stopped", || stale[0].is_stopped())
        .await
        .unwrap();
    assert!(!live[0].is_stopped());
}

#[tokio::test]
async fn test_rejoins_after_relay_drop() {
    init_tracing();
    let service = SignalingService::new();
    let mut config = test_config();
    config.rejoin = RejoinPolicy {
        enabled: true,
        max_attempts: 3,
        backoff_ms: 20,
    };
    let p1 = spawn_peer_with(&service, config, SyntheticCapture::new());
    let p2 = spawn_peer(&service);

    p1.handle.join("flaky", "alice").await.unwrap();
    p2.handle.join("flaky", "bob").await.unwrap();
    let before = wait_for_snapshot(&p1.handle, "connected", |s| s.peers.len() == 1)
        .await
        .unwrap();

    p1.channel.drop_connection();

    let after = wait_for_snapshot(&p1.handle, "rejoined", |s| {
        s.state == SessionState::Active && s.epoch == before.epoch + 1 && s.peers.len() == 1
    })
    .await
    .unwrap();
    assert_ne!(after.local_peer, before.local_peer);
    assert_eq!(p1.channel.connects(), 2);
    assert_eq!(
        p1.view
            .log
            .count(|e| matches!(e, ViewEvent::RecordJoin(_))),
        1
    );

    wait_for_snapshot(&p2.handle, "p2 sees the new p1 only", |s| {
        s.peers.len() == 1 && Some(&s.peers[0].peer_id) == after.local_peer.as_ref()
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_relay_drop_without_rejoin_leaves() {
    init_tracing();
    let service = SignalingService::new();
    let p1 = spawn_peer(&service);

    p1.handle.join("gone", "alice").await.unwrap();
    wait_for_snapshot(&p1.handle, "active", |s| s.state == SessionState::Active)
        .await
        .unwrap();

    p1.channel.drop_connection();

    let mut state = p1.handle.state_changes();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == SessionState::Idle),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(
        p1.view
            .log
            .count(|e| matches!(e, ViewEvent::RecordLeave(_))),
        1
    );
}

#[tokio::test]
async fn test_leave_preempts_slow_screen_capture() {
    init_tracing();
    let service = SignalingService::new();
    let capture = SyntheticCapture::new();
    let p1 = spawn_peer_with(&service, test_config(), capture.clone());
    p1.handle.join("slow", "alice").await.unwrap();
    wait_for_snapshot(&p1.handle, "camera", |s| !s.placeholder)
        .await
        .unwrap();

    capture.set_open_delay(Some(Duration::from_secs(30)));
    let sharing = tokio::spawn({
        let handle = p1.handle.clone();
        async move { handle.toggle_screen_share().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!sharing.is_finished());

    let started = Instant::now();
    p1.handle.leave().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(sharing.await.unwrap(), Err(MeshError::Interrupted));
    assert_eq!(p1.handle.state(), SessionState::Idle);
    assert!(!p1.handle.snapshot().await.unwrap().screen_share);
}

#[tokio::test]
async fn test_dropping_every_handle_stops_the_session() {
    init_tracing();
    let service = SignalingService::new();
    let p1 = spawn_peer(&service);
    p1.handle.join("bye", "alice").await.unwrap();

    let task = p1.task;
    drop(p1.handle);

    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(service.room_members(&RoomCode::from("bye")).is_empty());
}
