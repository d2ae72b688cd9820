use crate::connection::Role;
use crate::error::{Result, SignalingError};
use crate::session::session_core::{SessionCore, SessionDirection, SessionState, SettleReason, Settlement};
use parley_core::{Command, PeerId};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A session this client proposed.
///
/// The local side may only cancel; accept, reject and timeout arrive from
/// the server.
#[derive(Clone)]
pub struct OutgoingSession {
    core: Arc<SessionCore>,
}

impl OutgoingSession {
    pub(crate) fn new(core: Arc<SessionCore>) -> Self {
        debug_assert_eq!(core.direction(), SessionDirection::Outgoing);
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

    pub fn media(&self) -> &[String] {
        self.core.media()
    }

    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    pub fn is_settled(&self) -> bool {
        self.core.is_settled()
    }

    /// Resolves once the session reaches a terminal state.
    pub async fn settled(&self) -> SettleReason {
        self.core.settled().await
    }

    /// Withdraws the proposal.
    pub async fn cancel(&self, reason: Option<String>) -> Result<()> {
        self.core.begin_local()?;

        let command = Command::SessionCancel {
            reason: reason.clone(),
        };
        match self.core.call(command).await {
            Ok(_) => {
                if self.core.settle_local(Settlement::Canceled(reason)) {
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

    /// The peer accepted: build the connection and hand it over with the settlement.
    pub(crate) async fn handle_accept(&self) {
        if self.core.is_settled() {
            debug!("Ignoring accept for settled session {}", self.session_id());
            return;
        }

        match self.core.registry().create(self.peer_id(), Role::Initiator).await {
            Ok(pc) => {
                if !self.core.settle_remote(Settlement::Accepted(pc.clone())) {
                    pc.close().await;
                }
            }
            Err(e) => {
                warn!("Cannot connect to {} after accept: {}", self.peer_id(), e);
                self.core.settle_remote(Settlement::Errored(e.to_string()));
            }
        }
    }

    pub(crate) fn handle_reject(&self, reason: Option<String>) {
        self.core.settle_remote(Settlement::Rejected(reason));
    }

    pub(crate) fn handle_timeout(&self) {
        self.core.settle_remote(Settlement::TimedOut);
    }
}

impl fmt::Debug for OutgoingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutgoingSession")
            .field("peer_id", self.peer_id())
            .field("session_id", &self.session_id())
            .field("state", &self.state())
            .finish()
    }
}
