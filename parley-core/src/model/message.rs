use crate::model::error::MessageError;
use crate::model::peer::PeerId;
use crate::model::raw::RawMessage;
use crate::model::signaling::{Command, CommandKind};
use crate::model::transaction::TransactionId;
use serde_json::Value;

/// How the server settled a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(Option<Value>),
    Failed(String),
}

/// A parsed signaling message.
///
/// Requests travel client to server and carry no `result`. Responses settle a
/// request by correlation id. Events are unsolicited notifications relayed
/// from another peer or raised by the server itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Request {
        transaction_id: Option<TransactionId>,
        session_id: Option<String>,
        uri: PeerId,
        command: Command,
    },
    Response {
        kind: CommandKind,
        transaction_id: TransactionId,
        session_id: Option<String>,
        outcome: Outcome,
    },
    Event {
        uri: Option<PeerId>,
        session_id: Option<String>,
        command: Command,
    },
}

impl Message {
    pub fn request(uri: PeerId, command: Command) -> Self {
        Self::Request {
            transaction_id: None,
            session_id: None,
            uri,
            command,
        }
    }

    pub fn event(uri: Option<PeerId>, command: Command) -> Self {
        Self::Event {
            uri,
            session_id: None,
            command,
        }
    }

    pub fn success(kind: CommandKind, transaction_id: TransactionId) -> Self {
        Self::Response {
            kind,
            transaction_id,
            session_id: None,
            outcome: Outcome::Success(None),
        }
    }

    pub fn failure(
        kind: CommandKind,
        transaction_id: TransactionId,
        error: impl Into<String>,
    ) -> Self {
        Self::Response {
            kind,
            transaction_id,
            session_id: None,
            outcome: Outcome::Failed(error.into()),
        }
    }

    pub fn with_transaction_id(mut self, id: TransactionId) -> Self {
        match &mut self {
            Self::Request { transaction_id, .. } => *transaction_id = Some(id),
            Self::Response { transaction_id, .. } => *transaction_id = id,
            Self::Event { .. } => {}
        }
        self
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        match &mut self {
            Self::Request { session_id, .. }
            | Self::Response { session_id, .. }
            | Self::Event { session_id, .. } => *session_id = Some(id.into()),
        }
        self
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Request { command, .. } | Self::Event { command, .. } => command.kind(),
            Self::Response { kind, .. } => *kind,
        }
    }

    /// The peer this message is addressed to (requests) or relayed from (events).
    pub fn uri(&self) -> Option<&PeerId> {
        match self {
            Self::Request { uri, .. } => Some(uri),
            Self::Event { uri, .. } => uri.as_ref(),
            Self::Response { .. } => None,
        }
    }

    pub fn transaction_id(&self) -> Option<&TransactionId> {
        match self {
            Self::Request { transaction_id, .. } => transaction_id.as_ref(),
            Self::Response { transaction_id, .. } => Some(transaction_id),
            Self::Event { .. } => None,
        }
    }

    pub fn parse(text: &str) -> Result<Self, MessageError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| MessageError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        if !value.is_object() {
            return Err(MessageError::NotAnObject);
        }
        let raw: RawMessage =
            serde_json::from_value(value).map_err(|e| MessageError::InvalidJson(e.to_string()))?;
        Self::try_from(raw)
    }

    pub fn to_json(&self) -> String {
        let raw = RawMessage::from(self);
        // RawMessage holds only strings and JSON values; serialization cannot fail.
        serde_json::to_string(&raw).unwrap_or_default()
    }
}
