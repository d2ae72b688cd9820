use parley_core::{MessageError, PeerId, TransactionId};
use thiserror::Error;

pub type Result<T, E = SignalingError> = std::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalingError {
    #[error("peer {0} is the local client")]
    SelfAddressed(PeerId),

    #[error("a connection to {0} already exists")]
    AlreadyConnected(PeerId),

    #[error("a session with {0} is already active")]
    SessionAlreadyActive(PeerId),

    #[error("session already settled")]
    AlreadySettled,

    #[error("signaling channel is not open")]
    ChannelNotOpen,

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("transaction {0} is already pending")]
    DuplicateCorrelation(TransactionId),

    #[error("rejected by remote: {0}")]
    RemoteRejected(String),

    #[error("engine failure: {0}")]
    EngineFailure(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<MessageError> for SignalingError {
    fn from(e: MessageError) -> Self {
        Self::MalformedMessage(e.to_string())
    }
}

impl From<ChannelError> for SignalingError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::Closed => Self::ChannelNotOpen,
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<EngineError> for SignalingError {
    fn from(e: EngineError) -> Self {
        Self::EngineFailure(e.0)
    }
}

/// Failures of the duplex message channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,

    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("failed to send: {0}")]
    Send(String),
}

/// Failure reported by the RTC engine for a single operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }
}

impl From<webrtc::Error> for EngineError {
    fn from(e: webrtc::Error) -> Self {
        Self(e.to_string())
    }
}
