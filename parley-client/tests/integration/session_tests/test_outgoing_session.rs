use parley_client::{ClientEvent, Role, SessionEvent, SessionState, SettleReason, SignalingError};
use parley_core::{Command, CommandKind, Message, PeerId};
use serde_json::json;
use std::time::Duration;

use crate::integration::{create_test_client, init_tracing};
use crate::utils::{next_event, wait_for_event};

#[tokio::test]
async fn test_accepted_session_creates_initiator_connection() {
    init_tracing();

    let mut h = create_test_client("A");
    let peer = PeerId::from("B");

    let client = h.client.clone();
    let proposal = tokio::spawn(async move {
        client
            .create_session(&PeerId::from("B"), vec!["opus".to_owned()])
            .await
    });

    let request = h.server.expect_sent(CommandKind::SessionStart).await;
    assert_eq!(request.uri(), Some(&peer));
    h.server.reply_success(&request);

    let session = proposal
        .await
        .expect("proposal task panicked")
        .expect("proposal failed");
    assert_eq!(session.state(), SessionState::Proposed);
    assert_eq!(session.media(), ["opus".to_owned()]);
    assert!(h.client.session(&peer).is_some());

    h.server.push_event("B", Command::SessionAccept);
    assert_eq!(session.settled().await, SettleReason::Accepted);
    assert_eq!(session.state(), SessionState::Accepted);
    assert!(h.client.session(&peer).is_none());

    let pc = h
        .client
        .peer_connection(&peer)
        .expect("accept should create a connection");
    assert_eq!(pc.role(), Role::Initiator);
    assert_eq!(pc.data_channel_labels(), vec!["data".to_owned()]);

    let accepted = wait_for_event(&mut h.events, |e| {
        matches!(
            e,
            ClientEvent::Session {
                event: SessionEvent::Accepted(_),
                ..
            }
        )
    })
    .await;
    let ClientEvent::Session {
        event: SessionEvent::Accepted(accepted_pc),
        ..
    } = accepted
    else {
        unreachable!();
    };
    assert_eq!(accepted_pc.connection_id(), pc.connection_id());

    match next_event(&mut h.events).await {
        Some(ClientEvent::Session {
            event: SessionEvent::Settled(reason),
            ..
        }) => assert_eq!(reason, SettleReason::Accepted),
        other => panic!("expected Settled after Accepted, got {:?}", other),
    }

    // Opening the data channel triggers negotiation toward the peer.
    let offer = h.server.expect_sent(CommandKind::Offer).await;
    match offer {
        Message::Request {
            uri,
            command: Command::Offer { sdp },
            transaction_id,
            ..
        } => {
            assert_eq!(uri, peer);
            assert_eq!(sdp, "offer-for-B");
            assert!(transaction_id.is_some());
        }
        other => panic!("unexpected offer shape: {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_settles_canceled() {
    init_tracing();

    let mut h = create_test_client("A");

    let client = h.client.clone();
    let proposal = tokio::spawn(async move { client.create_session(&PeerId::from("B"), vec![]).await });
    let request = h.server.expect_sent(CommandKind::SessionStart).await;
    h.server.reply_success(&request);
    let session = proposal.await.unwrap().unwrap();

    let canceling = session.clone();
    let cancel = tokio::spawn(async move { canceling.cancel(Some("changed my mind".to_owned())).await });

    let request = h.server.expect_sent(CommandKind::SessionCancel).await;
    match &request {
        Message::Request {
            session_id,
            command: Command::SessionCancel { reason },
            ..
        } => {
            assert_eq!(session_id.as_deref(), Some(session.session_id()));
            assert_eq!(reason.as_deref(), Some("changed my mind"));
        }
        other => panic!("unexpected cancel shape: {:?}", other),
    }
    h.server.reply_success(&request);

    cancel.await.unwrap().expect("cancel failed");
    assert_eq!(session.state(), SessionState::Canceled);
    assert_eq!(
        session.settled().await,
        SettleReason::Canceled(Some("changed my mind".to_owned()))
    );

    wait_for_event(&mut h.events, |e| {
        matches!(
            e,
            ClientEvent::Session {
                event: SessionEvent::Canceled(Some(_)),
                ..
            }
        )
    })
    .await;
    assert!(h.engine.peer("B").is_none());
}

#[tokio::test]
async fn test_remote_reject_settles_rejected() {
    init_tracing();

    let mut h = create_test_client("A");

    let client = h.client.clone();
    let proposal = tokio::spawn(async move { client.create_session(&PeerId::from("B"), vec![]).await });
    let request = h.server.expect_sent(CommandKind::SessionStart).await;
    h.server.reply_success(&request);
    let session = proposal.await.unwrap().unwrap();

    h.server.push_event(
        "B",
        Command::SessionReject {
            reason: Some("busy".to_owned()),
        },
    );

    assert_eq!(
        session.settled().await,
        SettleReason::Rejected(Some("busy".to_owned()))
    );
    assert!(h.client.peer_connection(&PeerId::from("B")).is_none());

    wait_for_event(&mut h.events, |e| {
        matches!(
            e,
            ClientEvent::Session {
                event: SessionEvent::Settled(SettleReason::Rejected(_)),
                ..
            }
        )
    })
    .await;
}

#[tokio::test]
async fn test_failed_proposal_errors_session_and_frees_slot() {
    init_tracing();

    let mut h = create_test_client("A");
    let peer = PeerId::from("B");

    let client = h.client.clone();
    let proposal = tokio::spawn(async move { client.create_session(&PeerId::from("B"), vec![]).await });
    let request = h.server.expect_sent(CommandKind::SessionStart).await;
    h.server.reply_failed(&request, "peer offline");

    let err = proposal.await.unwrap().unwrap_err();
    assert_eq!(err, SignalingError::RemoteRejected("peer offline".to_owned()));
    assert!(h.client.session(&peer).is_none());

    wait_for_event(&mut h.events, |e| {
        matches!(
            e,
            ClientEvent::Session {
                event: SessionEvent::Errored(_),
                ..
            }
        )
    })
    .await;

    // A settled proposal no longer blocks a new one.
    let client = h.client.clone();
    let retry = tokio::spawn(async move { client.create_session(&PeerId::from("B"), vec![]).await });
    let request = h.server.expect_sent(CommandKind::SessionStart).await;
    h.server.reply_success(&request);
    assert!(retry.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_timeout_for_other_session_is_ignored() {
    init_tracing();

    let h = create_test_client("A");

    let client = h.client.clone();
    let proposal = tokio::spawn(async move { client.create_session(&PeerId::from("B"), vec![]).await });
    let mut server = h.server;
    let request = server.expect_sent(CommandKind::SessionStart).await;
    server.reply_success(&request);
    let session = proposal.await.unwrap().unwrap();

    server.push_session_event("B", "some-older-session", Command::SessionTimeout);
    server.push_session_event("B", session.session_id(), Command::SessionTimeout);

    assert_eq!(session.settled().await, SettleReason::TimedOut);
    assert_eq!(session.state(), SessionState::TimedOut);
}

#[tokio::test]
async fn test_responses_keyed_by_session_id_resolve_requests() {
    init_tracing();

    let mut h = create_test_client("A");

    let client = h.client.clone();
    let proposal = tokio::spawn(async move { client.create_session(&PeerId::from("B"), vec![]).await });
    let request = h.server.expect_sent(CommandKind::SessionStart).await;
    let Message::Request {
        session_id: Some(session_id),
        ..
    } = &request
    else {
        panic!("proposal carries no session id: {:?}", request);
    };

    h.server.push_json(json!({
        "cmd": "session-start",
        "result": "success",
        "session_id": session_id,
    }));
    let session = tokio::time::timeout(Duration::from_secs(1), proposal)
        .await
        .expect("proposal never resolved")
        .unwrap()
        .unwrap();
    assert_eq!(session.session_id(), session_id.as_str());
    assert_eq!(h.client.pending_requests(), 0);

    let canceling = session.clone();
    let cancel = tokio::spawn(async move { canceling.cancel(None).await });
    h.server.expect_sent(CommandKind::SessionCancel).await;
    h.server.push_json(json!({
        "cmd": "session-cancel",
        "result": "success",
        "session_id": session_id,
    }));
    tokio::time::timeout(Duration::from_secs(1), cancel)
        .await
        .expect("cancel never resolved")
        .unwrap()
        .expect("cancel failed");

    assert_eq!(session.state(), SessionState::Canceled);
    assert_eq!(h.client.pending_requests(), 0);
}
