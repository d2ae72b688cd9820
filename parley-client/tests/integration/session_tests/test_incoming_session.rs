use parley_client::{
    ClientEvent, IncomingSession, Role, SessionEvent, SessionState, SettleReason, SignalingError,
};
use parley_core::{Command, CommandKind, Message, PeerId};

use crate::integration::{TestHarness, create_test_client, init_tracing};
use crate::utils::wait_for_event;

async fn propose(h: &mut TestHarness, from: &str, session_id: &str) -> IncomingSession {
    h.server.push_session_event(
        from,
        session_id,
        Command::SessionStart {
            media: vec!["opus".to_owned(), "vp8".to_owned()],
        },
    );
    match wait_for_event(&mut h.events, |e| matches!(e, ClientEvent::IncomingSession(_))).await {
        ClientEvent::IncomingSession(session) => session,
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_accept_returns_responder_connection() {
    init_tracing();

    let mut h = create_test_client("A");
    let session = propose(&mut h, "B", "s1").await;
    assert_eq!(session.peer_id(), &PeerId::from("B"));
    assert_eq!(session.session_id(), "s1");
    assert_eq!(session.media(), ["opus".to_owned(), "vp8".to_owned()]);
    assert_eq!(session.state(), SessionState::Proposed);

    let accepting = session.clone();
    let accept = tokio::spawn(async move { accepting.accept().await });

    let request = h.server.expect_sent(CommandKind::SessionAccept).await;
    match &request {
        Message::Request {
            uri, session_id, ..
        } => {
            assert_eq!(uri, &PeerId::from("B"));
            assert_eq!(session_id.as_deref(), Some("s1"));
        }
        other => panic!("unexpected accept shape: {:?}", other),
    }
    h.server.reply_success(&request);

    let pc = accept.await.unwrap().expect("accept failed");
    assert_eq!(pc.role(), Role::Responder);
    assert!(pc.data_channel_labels().is_empty());
    assert_eq!(session.state(), SessionState::Accepted);
    assert_eq!(
        h.client
            .peer_connection(&PeerId::from("B"))
            .map(|p| p.connection_id()),
        Some(pc.connection_id())
    );

    wait_for_event(&mut h.events, |e| {
        matches!(
            e,
            ClientEvent::Session {
                event: SessionEvent::Settled(SettleReason::Accepted),
                ..
            }
        )
    })
    .await;
}

#[tokio::test]
async fn test_accept_adopts_connection_created_by_early_offer() {
    init_tracing();

    let mut h = create_test_client("A");
    let session = propose(&mut h, "B", "s1").await;

    h.server.push_event(
        "B",
        Command::Offer {
            sdp: "early-offer".to_owned(),
        },
    );
    let early = match wait_for_event(&mut h.events, |e| matches!(e, ClientEvent::IncomingConnection(_))).await {
        ClientEvent::IncomingConnection(pc) => pc,
        _ => unreachable!(),
    };

    let accepting = session.clone();
    let accept = tokio::spawn(async move { accepting.accept().await });
    let request = h.server.expect_sent(CommandKind::SessionAccept).await;
    h.server.reply_success(&request);

    let pc = accept.await.unwrap().expect("accept failed");
    assert_eq!(pc.connection_id(), early.connection_id());
    assert_eq!(h.engine.created(), 1);
}

#[tokio::test]
async fn test_failed_reject_errors_session() {
    init_tracing();

    let mut h = create_test_client("A");
    let session = propose(&mut h, "B", "s1").await;

    let rejecting = session.clone();
    let reject = tokio::spawn(async move { rejecting.reject(Some("not now".to_owned())).await });
    let request = h.server.expect_sent(CommandKind::SessionReject).await;
    h.server.reply_failed(&request, "session expired");

    assert_eq!(
        reject.await.unwrap().unwrap_err(),
        SignalingError::RemoteRejected("session expired".to_owned())
    );
    assert_eq!(session.state(), SessionState::Errored);
    assert!(h.client.session(&PeerId::from("B")).is_none());
}

#[tokio::test]
async fn test_reject_settles_rejected() {
    init_tracing();

    let mut h = create_test_client("A");
    let session = propose(&mut h, "B", "s1").await;

    let rejecting = session.clone();
    let reject = tokio::spawn(async move { rejecting.reject(None).await });
    let request = h.server.expect_sent(CommandKind::SessionReject).await;
    h.server.reply_success(&request);

    reject.await.unwrap().expect("reject failed");
    assert_eq!(session.settled().await, SettleReason::Rejected(None));
    assert!(h.engine.peer("B").is_none());
}

#[tokio::test]
async fn test_remote_cancel_settles_canceled() {
    init_tracing();

    let mut h = create_test_client("A");
    let session = propose(&mut h, "B", "s1").await;

    h.server.push_session_event(
        "B",
        "s1",
        Command::SessionCancel {
            reason: Some("hung up".to_owned()),
        },
    );

    assert_eq!(
        session.settled().await,
        SettleReason::Canceled(Some("hung up".to_owned()))
    );
    assert_eq!(
        session.accept().await.unwrap_err(),
        SignalingError::AlreadySettled
    );
}

#[tokio::test]
async fn test_unnamed_proposal_takes_the_server_session_id() {
    init_tracing();

    let mut h = create_test_client("A");
    h.server.push_event("B", Command::SessionStart { media: vec![] });
    let session = match wait_for_event(&mut h.events, |e| matches!(e, ClientEvent::IncomingSession(_))).await {
        ClientEvent::IncomingSession(session) => session,
        _ => unreachable!(),
    };
    assert_ne!(session.session_id(), "server-s1");

    h.server.push_session_event("B", "server-s1", Command::SessionCancel { reason: None });

    assert_eq!(session.settled().await, SettleReason::Canceled(None));
    assert_eq!(session.session_id(), "server-s1");
}

#[tokio::test]
async fn test_named_proposal_ignores_other_session_ids() {
    init_tracing();

    let mut h = create_test_client("A");
    let session = propose(&mut h, "B", "s1").await;

    h.server.push_session_event("B", "s0", Command::SessionCancel { reason: None });
    h.server.push_session_event("B", "s1", Command::SessionTimeout);

    assert_eq!(session.settled().await, SettleReason::TimedOut);
    assert_eq!(session.session_id(), "s1");
}
