use parley_client::SignalingError;
use parley_core::{Command, CommandKind, Message, Outcome, PeerId, TransactionId};
use serde_json::json;

use crate::integration::{create_test_client, init_tracing};
use crate::utils::eventually;

fn offer(sdp: &str) -> Command {
    Command::Offer {
        sdp: sdp.to_owned(),
    }
}

#[tokio::test]
async fn test_responses_resolve_only_their_own_request() {
    init_tracing();

    let mut h = create_test_client("A");

    let client = h.client.clone();
    let first = tokio::spawn(async move { client.request(&PeerId::from("B"), offer("one")).await });
    let first_sent = h.server.expect_sent(CommandKind::Offer).await;

    let client = h.client.clone();
    let second = tokio::spawn(async move { client.request(&PeerId::from("C"), offer("two")).await });
    let second_sent = h.server.expect_sent(CommandKind::Offer).await;

    let first_id = first_sent.transaction_id().cloned().unwrap();
    let second_id = second_sent.transaction_id().cloned().unwrap();
    assert_ne!(first_id, second_id);
    assert_eq!(h.client.pending_requests(), 2);

    // An unknown id resolves nothing.
    h.server.push(&Message::success(
        CommandKind::Offer,
        TransactionId::from("nobody"),
    ));

    h.server.push(&Message::Response {
        kind: CommandKind::Offer,
        transaction_id: second_id,
        session_id: None,
        outcome: Outcome::Success(Some(json!({ "n": 2 }))),
    });
    assert_eq!(second.await.unwrap().unwrap(), Some(json!({ "n": 2 })));
    assert!(!first.is_finished());

    h.server.push(&Message::Response {
        kind: CommandKind::Offer,
        transaction_id: first_id,
        session_id: None,
        outcome: Outcome::Success(Some(json!({ "n": 1 }))),
    });
    assert_eq!(first.await.unwrap().unwrap(), Some(json!({ "n": 1 })));

    let client = h.client.clone();
    assert!(eventually(move || client.pending_requests() == 0).await);
}

#[tokio::test]
async fn test_send_keeps_caller_transaction_id() {
    init_tracing();

    let mut h = create_test_client("A");
    let message = Message::request(PeerId::from("B"), offer("sdp"))
        .with_transaction_id(TransactionId::from("fixed-id"));

    let client = h.client.clone();
    let pending = message.clone();
    let send = tokio::spawn(async move { client.send(pending).await });

    let sent = h.server.expect_sent(CommandKind::Offer).await;
    assert_eq!(sent.transaction_id(), Some(&TransactionId::from("fixed-id")));

    // The id is taken until its response arrives.
    assert_eq!(
        h.client.send(message).await.unwrap_err(),
        SignalingError::DuplicateCorrelation(TransactionId::from("fixed-id"))
    );

    h.server.reply_success(&sent);
    let response = send.await.unwrap().unwrap();
    assert_eq!(
        response.transaction_id(),
        Some(&TransactionId::from("fixed-id"))
    );
}

#[tokio::test]
async fn test_failed_response_becomes_remote_rejected() {
    init_tracing();

    let mut h = create_test_client("A");

    let client = h.client.clone();
    let request = tokio::spawn(async move { client.request(&PeerId::from("B"), offer("sdp")).await });
    let sent = h.server.expect_sent(CommandKind::Offer).await;
    h.server.reply_failed(&sent, "unknown peer");

    assert_eq!(
        request.await.unwrap().unwrap_err(),
        SignalingError::RemoteRejected("unknown peer".to_owned())
    );
}

#[tokio::test]
async fn test_response_correlates_by_session_id_fallback() {
    init_tracing();

    let mut h = create_test_client("A");
    let message = Message::request(PeerId::from("B"), offer("sdp"))
        .with_transaction_id(TransactionId::from("s-42"));

    let client = h.client.clone();
    let send = tokio::spawn(async move { client.send(message).await });
    h.server.expect_sent(CommandKind::Offer).await;

    h.server.push_json(json!({
        "cmd": "offer",
        "result": "success",
        "session_id": "s-42",
    }));
    assert!(send.await.unwrap().is_ok());
}
