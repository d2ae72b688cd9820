use std::time::Duration;

use parley_client::{ClientConfig, SignalingClient, SignalingError};
use parley_core::{Command, IceServerConfig, Message, PeerId};

use crate::integration::{create_test_client, init_tracing};
use crate::utils::{MockEngine, MockServer, eventually};

fn turn_server() -> IceServerConfig {
    IceServerConfig {
        urls: vec!["turn:turn.example.org:3478".to_owned()],
        username: Some("user".to_owned()),
        credential: Some("secret".to_owned()),
    }
}

#[tokio::test]
async fn test_start_waits_for_welcome() {
    init_tracing();

    let (channel, inbound, server) = MockServer::new();
    let engine = MockEngine::new();

    server.push_text("garbage before welcome");
    server.push_event(
        "X",
        Command::Offer {
            sdp: "too early".to_owned(),
        },
    );
    server.push(&Message::event(
        None,
        Command::Welcome {
            peer_id: PeerId::from("A"),
            ice_servers: vec![turn_server()],
        },
    ));

    let (client, _events) = SignalingClient::start(
        channel,
        inbound,
        engine.clone(),
        ClientConfig::default(),
    )
    .await
    .expect("start failed");

    assert_eq!(client.local_id(), &PeerId::from("A"));
    assert_eq!(client.config().ice_servers, vec![turn_server()]);
    assert!(client.is_running());

    client
        .create_peer_connection(&PeerId::from("B"))
        .await
        .unwrap();
    assert_eq!(
        engine.peer("B").unwrap().ice_servers(),
        ["turn:turn.example.org:3478".to_owned()]
    );
    assert_eq!(engine.created(), 1);
}

#[tokio::test]
async fn test_start_fails_when_channel_closes_first() {
    init_tracing();

    let (channel, inbound, mut server) = MockServer::new();
    server.disconnect();

    let result = SignalingClient::start(
        channel,
        inbound,
        MockEngine::new(),
        ClientConfig::default(),
    )
    .await;
    assert_eq!(result.err(), Some(SignalingError::ChannelNotOpen));
}

#[tokio::test]
async fn test_later_welcome_refreshes_ice_servers() {
    init_tracing();

    let h = create_test_client("A");

    h.server.push(&Message::event(
        None,
        Command::Welcome {
            peer_id: PeerId::from("A"),
            ice_servers: vec![turn_server()],
        },
    ));

    let client = h.client.clone();
    assert!(eventually(move || client.config().ice_servers == vec![turn_server()]).await);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.client.local_id(), &PeerId::from("A"));
}
