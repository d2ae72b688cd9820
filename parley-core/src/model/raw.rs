use crate::model::error::MessageError;
use crate::model::message::{Message, Outcome};
use crate::model::peer::PeerId;
use crate::model::signaling::{Command, CommandKind, ResultKind};
use crate::model::transaction::TransactionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The loosely typed wire shape, exactly as it appears on the socket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

impl TryFrom<RawMessage> for Message {
    type Error = MessageError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        let cmd = raw.cmd.as_deref().ok_or(MessageError::MissingField("cmd"))?;
        let kind = CommandKind::parse(cmd)?;
        let result = raw.result.as_deref().map(ResultKind::parse).transpose()?;

        match result {
            None => {
                let uri = raw.uri.clone().ok_or(MessageError::MissingField("uri"))?;
                let command = Command::from_body(kind, raw.body.as_ref(), raw.uri.as_deref())?;
                Ok(Message::Request {
                    transaction_id: raw.transaction_id.map(TransactionId),
                    session_id: raw.session_id,
                    uri: PeerId(uri),
                    command,
                })
            }
            Some(ResultKind::Event) => {
                let command = Command::from_body(kind, raw.body.as_ref(), raw.uri.as_deref())?;
                Ok(Message::Event {
                    uri: raw.uri.map(PeerId),
                    session_id: raw.session_id,
                    command,
                })
            }
            Some(result @ (ResultKind::Success | ResultKind::Failed)) => {
                let transaction_id = raw
                    .transaction_id
                    .or_else(|| raw.session_id.clone())
                    .map(TransactionId)
                    .ok_or(MessageError::MissingField("transaction_id"))?;
                let payload = raw.response.or(raw.body);
                let outcome = if result == ResultKind::Success {
                    Outcome::Success(payload)
                } else {
                    Outcome::Failed(error_text(payload.as_ref()))
                };
                Ok(Message::Response {
                    kind,
                    transaction_id,
                    session_id: raw.session_id,
                    outcome,
                })
            }
        }
    }
}

fn error_text(payload: Option<&Value>) -> String {
    match payload {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(map)) => ["message", "error", "reason"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_owned)
            .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
        _ => "request failed".to_owned(),
    }
}

impl From<&Message> for RawMessage {
    fn from(message: &Message) -> Self {
        match message {
            Message::Request {
                transaction_id,
                session_id,
                uri,
                command,
            } => RawMessage {
                cmd: Some(command.kind().as_str().to_owned()),
                transaction_id: transaction_id.as_ref().map(|id| id.0.clone()),
                session_id: session_id.clone(),
                uri: Some(uri.0.clone()),
                body: command.to_body(),
                ..Default::default()
            },
            Message::Response {
                kind,
                transaction_id,
                session_id,
                outcome,
            } => {
                let (result, response) = match outcome {
                    Outcome::Success(payload) => (ResultKind::Success, payload.clone()),
                    Outcome::Failed(error) => (ResultKind::Failed, Some(Value::String(error.clone()))),
                };
                RawMessage {
                    cmd: Some(kind.as_str().to_owned()),
                    result: Some(result.as_str().to_owned()),
                    transaction_id: Some(transaction_id.0.clone()),
                    session_id: session_id.clone(),
                    response,
                    ..Default::default()
                }
            }
            Message::Event {
                uri,
                session_id,
                command,
            } => RawMessage {
                cmd: Some(command.kind().as_str().to_owned()),
                result: Some(ResultKind::Event.as_str().to_owned()),
                session_id: session_id.clone(),
                uri: uri.as_ref().map(|p| p.0.clone()),
                body: command.to_body(),
                ..Default::default()
            },
        }
    }
}
