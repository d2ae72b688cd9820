use thiserror::Error;

/// Reasons an inbound frame could not be turned into a [`crate::Message`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    #[error("unknown result `{0}`")]
    UnknownResult(String),

    #[error("invalid body for `{cmd}`: {reason}")]
    InvalidBody { cmd: &'static str, reason: String },
}
