use meshcall_core::{ClientFrame, IceCandidate, RelayFrame, SignalMessage};

use crate::integration::{init_tracing, start_relay};
use crate::utils::TestClient;

#[tokio::test]
async fn test_signals_reach_only_the_addressee_in_order() {
    init_tracing();
    let (url, _service) = start_relay().await;

    let mut alice = TestClient::connect(&url).await.expect("alice connects");
    let mut bob = TestClient::connect(&url).await.expect("bob connects");
    let mut carol = TestClient::connect(&url).await.expect("carol connects");
    alice.join("abc123").await.expect("alice joins");
    alice.recv().await.expect("alice self join");
    bob.join("abc123").await.expect("bob joins");
    bob.recv().await.expect("bob self join");
    carol.join("abc123").await.expect("carol joins");
    carol.recv().await.expect("carol self join");
    // Bob and carol arriving, as seen by the members already there.
    alice.recv().await.expect("alice sees bob");
    alice.recv().await.expect("alice sees carol");
    bob.recv().await.expect("bob sees carol");

    let offer = SignalMessage::Offer {
        sdp: "v=0 offer".to_string(),
    };
    let candidate = SignalMessage::IceCandidate(IceCandidate {
        candidate: "candidate:1 1 udp 1 10.0.0.1 5000 typ host".to_string(),
        sdp_mid: Some("0".to_string()),
        sdp_m_line_index: Some(0),
    });
    alice
        .send(ClientFrame::Signal {
            to: bob.peer_id.clone(),
            signal: offer.clone(),
        })
        .await
        .expect("send offer");
    alice
        .send(ClientFrame::Signal {
            to: bob.peer_id.clone(),
            signal: candidate.clone(),
        })
        .await
        .expect("send candidate");

    assert_eq!(
        bob.recv().await.expect("bob gets offer"),
        RelayFrame::Signal {
            from: alice.peer_id.clone(),
            signal: offer,
        }
    );
    assert_eq!(
        bob.recv().await.expect("bob gets candidate"),
        RelayFrame::Signal {
            from: alice.peer_id.clone(),
            signal: candidate,
        }
    );
    assert!(carol.is_quiet().await, "carol must not see bob's signals");
}
