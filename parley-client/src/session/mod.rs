mod incoming;
mod outgoing;
mod session_core;

pub use incoming::IncomingSession;
pub use outgoing::OutgoingSession;
pub use session_core::{SessionDirection, SessionState, SettleReason};

pub(crate) use session_core::{SessionContext, SessionCore};

use session_core::Settlement;

use dashmap::DashMap;
use parley_core::PeerId;
use std::sync::Arc;

/// Active (unsettled) sessions, at most one per peer in either direction.
pub(crate) type SessionTable = Arc<DashMap<PeerId, Session>>;

#[derive(Debug, Clone)]
pub enum Session {
    Incoming(IncomingSession),
    Outgoing(OutgoingSession),
}

impl Session {
    fn core(&self) -> &SessionCore {
        match self {
            Self::Incoming(s) => s.core(),
            Self::Outgoing(s) => s.core(),
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        self.core().peer_id()
    }

    pub fn session_id(&self) -> &str {
        self.core().session_id()
    }

    pub fn direction(&self) -> SessionDirection {
        self.core().direction()
    }

    pub fn state(&self) -> SessionState {
        self.core().state()
    }

    pub fn is_settled(&self) -> bool {
        self.core().is_settled()
    }

    pub async fn settled(&self) -> SettleReason {
        self.core().settled().await
    }

    pub(crate) fn handle_timeout(&self) {
        match self {
            Self::Incoming(s) => s.handle_timeout(),
            Self::Outgoing(s) => s.handle_timeout(),
        }
    }

    pub(crate) fn adopt_session_id(&self, id: &str) -> bool {
        self.core().adopt_session_id(id)
    }

    /// Ends a session that can no longer progress, e.g. after the channel closed.
    pub(crate) fn abort(&self, reason: impl Into<String>) -> bool {
        self.core().settle_remote(Settlement::Errored(reason.into()))
    }
}
