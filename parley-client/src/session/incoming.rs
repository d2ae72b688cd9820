use crate::connection::{PeerConnection, Role};
use crate::error::{Result, SignalingError};
use crate::session::session_core::{SessionCore, SessionDirection, SessionState, SettleReason, Settlement};
use parley_core::{Command, PeerId};
use std::fmt;
use std::sync::Arc;

/// A session another peer proposed to this client.
#[derive(Clone)]
pub struct IncomingSession {
    core: Arc<SessionCore>,
}

impl IncomingSession {
    pub(crate) fn new(core: Arc<SessionCore>) -> Self {
        debug_assert_eq!(core.direction(), SessionDirection::Incoming);
        Self { core }
    }

    pub(crate) fn core(&self) -> &SessionCore {
        &self.core
    }

    pub fn peer_id(&self) -> &PeerId {
        self.core.peer_id()
    }

    pub fn session_id(&self) -> &str {
        self.core.session_id()
    }

    /// Codec/media identifiers the proposer advertised.
    pub fn media(&self) -> &[String] {
        self.core.media()
    }

    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    pub fn is_settled(&self) -> bool {
        self.core.is_settled()
    }

    pub async fn settled(&self) -> SettleReason {
        self.core.settled().await
    }

    /// Accepts the proposal and returns the connection that will answer the
    /// proposer's offer.
    pub async fn accept(&self) -> Result<PeerConnection> {
        self.core.begin_local()?;

        if let Err(e) = self.core.call(Command::SessionAccept).await {
            self.core.settle_local(Settlement::Errored(e.to_string()));
            return Err(e);
        }

        // The proposer's offer may already have created the connection.
        match self
            .core
            .registry()
            .get_or_create(self.peer_id(), Role::Responder)
            .await
        {
            Ok((pc, created)) => {
                if self.core.settle_local(Settlement::Accepted(pc.clone())) {
                    return Ok(pc);
                }
                if created {
                    pc.close().await;
                }
                Err(SignalingError::AlreadySettled)
            }
            Err(e) => {
                self.core.settle_local(Settlement::Errored(e.to_string()));
                Err(e)
            }
        }
    }

    pub async fn reject(&self, reason: Option<String>) -> Result<()> {
        self.core.begin_local()?;

        let command = Command::SessionReject {
            reason: reason.clone(),
        };
        match self.core.call(command).await {
            Ok(_) => {
                if self.core.settle_local(Settlement::Rejected(reason)) {
                    Ok(())
                } else {
                    Err(SignalingError::AlreadySettled)
                }
            }
            Err(e) => {
                self.core.settle_local(Settlement::Errored(e.to_string()));
                Err(e)
            }
        }
    }

    pub(crate) fn handle_cancel(&self, reason: Option<String>) {
        self.core.settle_remote(Settlement::Canceled(reason));
    }

    pub(crate) fn handle_timeout(&self) {
        self.core.settle_remote(Settlement::TimedOut);
    }
}

impl fmt::Debug for IncomingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingSession")
            .field("peer_id", self.peer_id())
            .field("session_id", &self.session_id())
            .field("state", &self.state())
            .finish()
    }
}
