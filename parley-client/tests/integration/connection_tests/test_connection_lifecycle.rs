use std::time::Duration;

use parley_client::{
    ClientConfig, ClientEvent, DataChannelHandle, EngineEvent, IceConnectionState, SignalingError,
};
use parley_core::{CANDIDATES_COMPLETE, Command, CommandKind, Message, PeerId};
use std::sync::Arc;

use crate::integration::{create_test_client, create_test_client_with, init_tracing};
use crate::utils::{EngineCall, drain_events, wait_for_event};

#[tokio::test]
async fn test_second_create_for_same_peer_fails() {
    init_tracing();

    let h = create_test_client("A");
    let peer = PeerId::from("B");

    h.client.create_peer_connection(&peer).await.unwrap();
    assert_eq!(
        h.client.create_peer_connection(&peer).await.unwrap_err(),
        SignalingError::AlreadyConnected(peer.clone())
    );
    assert_eq!(h.engine.created(), 1);
    assert_eq!(h.client.registry().len(), 1);
}

#[tokio::test]
async fn test_concurrent_creates_yield_one_connection() {
    init_tracing();

    let h = create_test_client("A");

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let client = h.client.clone();
            tokio::spawn(async move { client.create_peer_connection(&PeerId::from("B")).await })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(e) => assert_eq!(e, SignalingError::AlreadyConnected(PeerId::from("B"))),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(h.engine.created(), 1);
}

#[tokio::test]
async fn test_initiator_opens_configured_channels() {
    init_tracing();

    let config = ClientConfig::default().with_data_channels(["state", "chat"]);
    let mut h = create_test_client_with("A", config);

    let pc = h
        .client
        .create_peer_connection(&PeerId::from("B"))
        .await
        .unwrap();
    assert_eq!(pc.data_channel_labels(), vec!["chat", "state"]);
    assert!(pc.data_channel("chat").is_some());
    assert!(pc.data_channel("missing").is_none());

    let offer = h.server.expect_sent(CommandKind::Offer).await;
    assert_eq!(offer.uri(), Some(&PeerId::from("B")));
}

#[tokio::test]
async fn test_terminal_ice_state_closes_and_unhooks() {
    init_tracing();

    let mut h = create_test_client("A");
    let peer = PeerId::from("B");

    let pc = h.client.create_peer_connection(&peer).await.unwrap();
    let engine = h.engine.peer("B").unwrap();

    assert!(engine.emit(EngineEvent::IceConnectionState(IceConnectionState::Failed)));

    let state = wait_for_event(&mut h.events, |e| matches!(e, ClientEvent::IceState { .. })).await;
    assert!(matches!(
        state,
        ClientEvent::IceState {
            state: IceConnectionState::Failed,
            ..
        }
    ));

    let closed = wait_for_event(&mut h.events, |e| matches!(e, ClientEvent::ConnectionClosed { .. })).await;
    match closed {
        ClientEvent::ConnectionClosed {
            peer_id,
            connection_id,
        } => {
            assert_eq!(peer_id, peer);
            assert_eq!(connection_id, pc.connection_id());
        }
        _ => unreachable!(),
    }

    // Callbacks were unhooked before the close was reported.
    assert!(engine.is_detached());
    assert!(engine.is_closed());
    assert!(pc.is_closed());
    assert!(!engine.emit(EngineEvent::IceCandidate("late".to_owned())));
    assert!(h.client.peer_connection(&peer).is_none());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(drain_events(&mut h.events).is_empty());

    // The peer can be connected again afterwards.
    let again = h.client.create_peer_connection(&peer).await.unwrap();
    assert_ne!(again.connection_id(), pc.connection_id());
}

#[tokio::test]
async fn test_close_is_idempotent() {
    init_tracing();

    let mut h = create_test_client("A");

    let pc = h
        .client
        .create_peer_connection(&PeerId::from("B"))
        .await
        .unwrap();
    pc.close().await;
    pc.close().await;

    let engine = h.engine.peer("B").unwrap();
    assert_eq!(
        engine
            .calls()
            .iter()
            .filter(|c| **c == EngineCall::Close)
            .count(),
        1
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    let closed = drain_events(&mut h.events)
        .into_iter()
        .filter(|e| matches!(e, ClientEvent::ConnectionClosed { .. }))
        .count();
    assert_eq!(closed, 1);
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    init_tracing();

    let h = create_test_client("A");
    let peer = PeerId::from("B");

    h.client.create_peer_connection(&peer).await.unwrap();
    assert!(h.client.registry().remove(&peer).is_some());
    assert!(h.client.registry().remove(&peer).is_none());
    assert!(h.client.registry().get(&peer).is_none());
}

#[tokio::test]
async fn test_engine_create_failure_releases_peer() {
    init_tracing();

    let h = create_test_client("A");
    let peer = PeerId::from("B");

    h.engine.fail_next_create();
    assert_eq!(
        h.client.create_peer_connection(&peer).await.unwrap_err(),
        SignalingError::EngineFailure("engine unavailable".to_owned())
    );
    assert!(h.client.create_peer_connection(&peer).await.is_ok());
}

#[tokio::test]
async fn test_local_candidates_are_sent_to_peer() {
    init_tracing();

    let mut h = create_test_client("A");

    h.client
        .create_peer_connection(&PeerId::from("B"))
        .await
        .unwrap();
    let engine = h.engine.peer("B").unwrap();

    engine.emit(EngineEvent::IceCandidate("local-1".to_owned()));
    engine.emit(EngineEvent::IceCandidate(CANDIDATES_COMPLETE.to_owned()));

    let mut candidates = Vec::new();
    while candidates.len() < 2 {
        match h.server.expect_sent(CommandKind::Candidate).await {
            Message::Request {
                uri,
                transaction_id,
                command: Command::Candidate { candidate },
                ..
            } => {
                assert_eq!(uri, PeerId::from("B"));
                assert!(transaction_id.is_none());
                candidates.push(candidate);
            }
            other => panic!("unexpected candidate shape: {:?}", other),
        }
    }
    assert_eq!(candidates, vec!["local-1", CANDIDATES_COMPLETE]);
    assert_eq!(h.client.pending_requests(), 1);
}

#[tokio::test]
async fn test_remote_channels_and_tracks_are_forwarded() {
    init_tracing();

    let mut h = create_test_client("A");
    let peer = PeerId::from("B");

    h.server.push_event(
        "B",
        Command::Offer {
            sdp: "remote-offer".to_owned(),
        },
    );
    let pc = match wait_for_event(&mut h.events, |e| matches!(e, ClientEvent::IncomingConnection(_))).await {
        ClientEvent::IncomingConnection(pc) => pc,
        _ => unreachable!(),
    };
    let engine = h.engine.peer("B").unwrap();

    engine.emit(EngineEvent::DataChannel(DataChannelHandle::new(
        "remote",
        Arc::new("remote".to_owned()),
    )));

    match wait_for_event(&mut h.events, |e| matches!(e, ClientEvent::DataChannel { .. })).await {
        ClientEvent::DataChannel { peer_id, channel } => {
            assert_eq!(peer_id, peer);
            assert_eq!(channel.label(), "remote");
            assert_eq!(
                channel.downcast::<String>().as_deref().map(String::as_str),
                Some("remote")
            );
        }
        _ => unreachable!(),
    }
    assert!(pc.data_channel("remote").is_some());
}
