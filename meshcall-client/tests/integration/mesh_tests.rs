use meshcall_client::{LinkRole, LinkState, SessionState};
use meshcall_relay::SignalingService;

use crate::integration::{init_tracing, spawn_peer};
use crate::utils::{TransportCall, wait_for_snapshot, wait_until};

#[tokio::test]
async fn test_two_peers_meet_in_room_abc123() {
    init_tracing();
    let service = SignalingService::new();
    let p1 = spawn_peer(&service);
    let p2 = spawn_peer(&service);

    p1.handle.join("abc123", "alice").await.unwrap();
    wait_for_snapshot(&p1.handle, "p1 active", |s| s.state == SessionState::Active)
        .await
        .unwrap();
    let p1_id = p1.peer_id();

    p2.handle.join("abc123", "bob").await.unwrap();
    let p2_id = p2.peer_id();

    let s1 = wait_for_snapshot(&p1.handle, "p1 connected to p2", |s| {
        s.peers.len() == 1 && s.peers[0].state == LinkState::Connected
    })
    .await
    .unwrap();
    assert_eq!(s1.peers[0].peer_id, p2_id);
    assert_eq!(s1.peers[0].role, LinkRole::Responder);

    let s2 = wait_for_snapshot(&p2.handle, "p2 connected to p1", |s| {
        s.peers.len() == 1 && s.peers[0].state == LinkState::Connected
    })
    .await
    .unwrap();
    assert_eq!(s2.peers[0].peer_id, p1_id);
    assert_eq!(s2.peers[0].role, LinkRole::Initiator);

    assert_eq!(p2.factory.offers_to(&p1_id), 1, "newcomer sends the offer");
    assert_eq!(p1.factory.offers_to(&p2_id), 0);
    assert_eq!(p1.factory.count(&p2_id, |c| *c == TransportCall::CreateAnswer), 1);

    p2.handle.leave().await.unwrap();

    wait_for_snapshot(&p1.handle, "p1 alone", |s| s.peers.is_empty())
        .await
        .unwrap();
    assert_eq!(p1.view.removals_of(&p2_id), 1);
    assert_eq!(p1.factory.open_links(), 0);
    assert_eq!(p2.factory.open_links(), 0);
    assert_eq!(p1.handle.state(), SessionState::Active);
}

#[tokio::test]
async fn test_simultaneous_joins_offer_once_per_pair() {
    init_tracing();
    let service = SignalingService::new();
    let peers = [spawn_peer(&service), spawn_peer(&service), spawn_peer(&service)];

    let (a, b, c) = tokio::join!(
        peers[0].handle.join("room", "a"),
        peers[1].handle.join("room", "b"),
        peers[2].handle.join("room", "c"),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    for peer in &peers {
        wait_for_snapshot(&peer.handle, "full mesh", |s| {
            s.peers.len() == 2 && s.peers.iter().all(|p| p.state == LinkState::Connected)
        })
        .await
        .unwrap();
    }

    let ids: Vec<_> = peers.iter().map(|p| p.peer_id()).collect();
    for i in 0..peers.len() {
        for j in (i + 1)..peers.len() {
            let offers = peers[i].factory.offers_to(&ids[j]) + peers[j].factory.offers_to(&ids[i]);
            assert_eq!(offers, 1, "exactly one offer between {} and {}", ids[i], ids[j]);
        }
    }
}

#[tokio::test]
async fn test_chat_reaches_whole_room() {
    init_tracing();
    let service = SignalingService::new();
    let p1 = spawn_peer(&service);
    let p2 = spawn_peer(&service);

    p1.handle.join("chatroom", "alice").await.unwrap();
    p2.handle.join("chatroom", "bob").await.unwrap();
    wait_for_snapshot(&p2.handle, "p2 active", |s| s.state == SessionState::Active)
        .await
        .unwrap();

    p2.handle.send_chat("hello").await.unwrap();

    wait_until("chat delivered", || {
        p1.view.chats().len() == 1 && p2.view.chats().len() == 1
    })
    .await
    .unwrap();
    let message = &p1.view.chats()[0];
    assert_eq!(message.sender, "bob");
    assert_eq!(message.text, "hello");
    assert_eq!(message.origin_id, p2.peer_id());
}
