use parley_client::SignalingError;
use parley_core::{Command, Message, PeerId};

use crate::integration::{create_test_client, init_tracing};

#[tokio::test]
async fn test_self_addressed_operations_send_nothing() {
    init_tracing();

    let h = create_test_client("A");
    let me = PeerId::from("A");

    assert_eq!(
        h.client.create_session(&me, vec![]).await.unwrap_err(),
        SignalingError::SelfAddressed(me.clone())
    );
    assert_eq!(
        h.client.create_peer_connection(&me).await.unwrap_err(),
        SignalingError::SelfAddressed(me.clone())
    );
    assert_eq!(
        h.client
            .send(Message::request(me.clone(), Command::SessionAccept))
            .await
            .unwrap_err(),
        SignalingError::SelfAddressed(me.clone())
    );
    assert_eq!(
        h.client
            .request(&me, Command::SessionTimeout)
            .await
            .unwrap_err(),
        SignalingError::SelfAddressed(me.clone())
    );

    assert_eq!(h.server.sent_count().await, 0);
    assert_eq!(h.engine.created(), 0);
    assert!(h.client.session(&me).is_none());
    assert_eq!(h.client.pending_requests(), 0);
}

#[tokio::test]
async fn test_events_from_self_are_dropped() {
    init_tracing();

    let h = create_test_client("A");

    h.server.push_event(
        "A",
        Command::Offer {
            sdp: "loopback".to_owned(),
        },
    );
    h.server
        .push_session_event("A", "s1", Command::SessionStart { media: vec![] });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(h.engine.created(), 0);
    assert!(h.client.session(&PeerId::from("A")).is_none());
    assert_eq!(h.server.sent_count().await, 0);
}
