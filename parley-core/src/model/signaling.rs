use crate::model::error::MessageError;
use crate::model::peer::PeerId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Candidate literal marking the end of a peer's candidate gathering.
pub const CANDIDATES_COMPLETE: &str = "completed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// The `result` discriminant carried by every non-request message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Success,
    Event,
    Failed,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Event => "event",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, MessageError> {
        match s {
            "success" => Ok(Self::Success),
            "event" => Ok(Self::Event),
            "failed" => Ok(Self::Failed),
            other => Err(MessageError::UnknownResult(other.to_owned())),
        }
    }
}

/// The `cmd` discriminant, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Welcome,
    SessionStart,
    SessionAccept,
    SessionReject,
    SessionCancel,
    SessionTimeout,
    Offer,
    Answer,
    Candidate,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::SessionStart => "session-start",
            Self::SessionAccept => "session-accept",
            Self::SessionReject => "session-reject",
            Self::SessionCancel => "session-cancel",
            Self::SessionTimeout => "session-timeout",
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
        }
    }

    pub fn parse(s: &str) -> Result<Self, MessageError> {
        Ok(match s {
            "welcome" => Self::Welcome,
            "session-start" => Self::SessionStart,
            "session-accept" => Self::SessionAccept,
            "session-reject" => Self::SessionReject,
            "session-cancel" => Self::SessionCancel,
            "session-timeout" => Self::SessionTimeout,
            "offer" => Self::Offer,
            "answer" => Self::Answer,
            "candidate" => Self::Candidate,
            other => return Err(MessageError::UnknownCommand(other.to_owned())),
        })
    }
}

/// A command together with its typed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Welcome {
        peer_id: PeerId,
        ice_servers: Vec<IceServerConfig>,
    },
    SessionStart {
        media: Vec<String>,
    },
    SessionAccept,
    SessionReject {
        reason: Option<String>,
    },
    SessionCancel {
        reason: Option<String>,
    },
    SessionTimeout,
    Offer {
        sdp: String,
    },
    Answer {
        sdp: String,
    },
    Candidate {
        candidate: String,
    },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Welcome { .. } => CommandKind::Welcome,
            Self::SessionStart { .. } => CommandKind::SessionStart,
            Self::SessionAccept => CommandKind::SessionAccept,
            Self::SessionReject { .. } => CommandKind::SessionReject,
            Self::SessionCancel { .. } => CommandKind::SessionCancel,
            Self::SessionTimeout => CommandKind::SessionTimeout,
            Self::Offer { .. } => CommandKind::Offer,
            Self::Answer { .. } => CommandKind::Answer,
            Self::Candidate { .. } => CommandKind::Candidate,
        }
    }

    /// Serializes the payload into the wire `body`, `None` when the command has none.
    pub(crate) fn to_body(&self) -> Option<Value> {
        match self {
            Self::Welcome {
                peer_id,
                ice_servers,
            } => Some(json!({ "peer_id": peer_id, "ice_servers": ice_servers })),
            Self::SessionStart { media } if media.is_empty() => None,
            Self::SessionStart { media } => Some(json!({ "media": media })),
            Self::SessionAccept | Self::SessionTimeout => None,
            Self::SessionReject { reason } | Self::SessionCancel { reason } => {
                reason.as_ref().map(|r| json!({ "reason": r }))
            }
            Self::Offer { sdp } | Self::Answer { sdp } => Some(json!({ "sdp": sdp })),
            Self::Candidate { candidate } => Some(json!({ "candidate": candidate })),
        }
    }

    /// Builds the typed command from its discriminant and wire `body`.
    ///
    /// `uri` is consulted only for `welcome`, where servers may put the
    /// assigned id in the address field instead of the body.
    pub(crate) fn from_body(
        kind: CommandKind,
        body: Option<&Value>,
        uri: Option<&str>,
    ) -> Result<Self, MessageError> {
        let cmd = kind.as_str();
        let object = match body {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(Value::String(_)) => None,
            Some(_) => {
                return Err(MessageError::InvalidBody {
                    cmd,
                    reason: "expected an object or a string".to_owned(),
                });
            }
        };

        Ok(match kind {
            CommandKind::Welcome => {
                let peer_id = optional_str(object, "peer_id", cmd)?
                    .or_else(|| uri.map(str::to_owned))
                    .ok_or(MessageError::MissingField("peer_id"))?;
                let ice_servers = match object.and_then(|m| m.get("ice_servers")) {
                    None | Some(Value::Null) => Vec::new(),
                    Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                        MessageError::InvalidBody {
                            cmd,
                            reason: e.to_string(),
                        }
                    })?,
                };
                Self::Welcome {
                    peer_id: PeerId(peer_id),
                    ice_servers,
                }
            }
            CommandKind::SessionStart => {
                let media = match object.and_then(|m| m.get("media")) {
                    None | Some(Value::Null) => Vec::new(),
                    Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                        MessageError::InvalidBody {
                            cmd,
                            reason: e.to_string(),
                        }
                    })?,
                };
                Self::SessionStart { media }
            }
            CommandKind::SessionAccept => Self::SessionAccept,
            CommandKind::SessionReject => Self::SessionReject {
                reason: reason_of(body, object, cmd)?,
            },
            CommandKind::SessionCancel => Self::SessionCancel {
                reason: reason_of(body, object, cmd)?,
            },
            CommandKind::SessionTimeout => Self::SessionTimeout,
            CommandKind::Offer => Self::Offer {
                sdp: required_text(body, object, "sdp", cmd)?,
            },
            CommandKind::Answer => Self::Answer {
                sdp: required_text(body, object, "sdp", cmd)?,
            },
            CommandKind::Candidate => Self::Candidate {
                candidate: required_text(body, object, "candidate", cmd)?,
            },
        })
    }
}

fn optional_str(
    object: Option<&Map<String, Value>>,
    field: &'static str,
    cmd: &'static str,
) -> Result<Option<String>, MessageError> {
    match object.and_then(|m| m.get(field)) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(MessageError::InvalidBody {
            cmd,
            reason: format!("`{field}` must be a string"),
        }),
    }
}

fn reason_of(
    body: Option<&Value>,
    object: Option<&Map<String, Value>>,
    cmd: &'static str,
) -> Result<Option<String>, MessageError> {
    if let Some(Value::String(s)) = body {
        return Ok(Some(s.clone()));
    }
    optional_str(object, "reason", cmd)
}

/// Payloads that are a single text value may arrive bare or wrapped in an object.
fn required_text(
    body: Option<&Value>,
    object: Option<&Map<String, Value>>,
    field: &'static str,
    cmd: &'static str,
) -> Result<String, MessageError> {
    if let Some(Value::String(s)) = body {
        return Ok(s.clone());
    }
    optional_str(object, field, cmd)?.ok_or(MessageError::MissingField(field))
}
