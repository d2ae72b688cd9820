use crate::connection::{PeerConnection, PeerConnectionRegistry};
use crate::error::{Result, SignalingError};
use crate::event::{ClientEvent, ClientEventSender, SessionEvent};
use crate::session::SessionTable;
use crate::signaler::Signaler;
use parley_core::{Command, PeerId};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionDirection {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Proposed,
    Accepted,
    Rejected,
    Canceled,
    TimedOut,
    Errored,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleReason {
    Accepted,
    Rejected(Option<String>),
    Canceled(Option<String>),
    TimedOut,
    Errored(String),
}

impl From<&SettleReason> for SessionState {
    fn from(reason: &SettleReason) -> Self {
        match reason {
            SettleReason::Accepted => Self::Accepted,
            SettleReason::Rejected(_) => Self::Rejected,
            SettleReason::Canceled(_) => Self::Canceled,
            SettleReason::TimedOut => Self::TimedOut,
            SettleReason::Errored(_) => Self::Errored,
        }
    }
}

/// A terminal transition together with its payload.
pub(crate) enum Settlement {
    Accepted(PeerConnection),
    Rejected(Option<String>),
    Canceled(Option<String>),
    TimedOut,
    Errored(String),
}

impl Settlement {
    fn reason(&self) -> SettleReason {
        match self {
            Self::Accepted(_) => SettleReason::Accepted,
            Self::Rejected(r) => SettleReason::Rejected(r.clone()),
            Self::Canceled(r) => SettleReason::Canceled(r.clone()),
            Self::TimedOut => SettleReason::TimedOut,
            Self::Errored(e) => SettleReason::Errored(e.clone()),
        }
    }

    fn into_event(self) -> SessionEvent {
        match self {
            Self::Accepted(pc) => SessionEvent::Accepted(pc),
            Self::Rejected(r) => SessionEvent::Rejected(r),
            Self::Canceled(r) => SessionEvent::Canceled(r),
            Self::TimedOut => SessionEvent::TimedOut,
            Self::Errored(e) => SessionEvent::Errored(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Proposed,
    /// A local accept/reject/cancel is waiting for the server.
    Pending,
    Settled(SettleReason),
}

/// What every session needs from the client.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub signaler: Arc<Signaler>,
    pub registry: PeerConnectionRegistry,
    pub sessions: SessionTable,
    pub events: ClientEventSender,
}

/// State machine shared by both session directions.
pub(crate) struct SessionCore {
    peer_id: PeerId,
    /// Set once the server has named the session.
    session_id: OnceLock<String>,
    /// Used until then.
    provisional_id: String,
    direction: SessionDirection,
    media: Vec<String>,
    phase: Mutex<Phase>,
    settled: watch::Sender<Option<SettleReason>>,
    ctx: SessionContext,
}

impl SessionCore {
    pub(crate) fn new(
        peer_id: PeerId,
        session_id: Option<String>,
        direction: SessionDirection,
        media: Vec<String>,
        ctx: SessionContext,
    ) -> Arc<Self> {
        let (settled, _) = watch::channel(None);
        let (session_id, provisional_id) = match session_id {
            Some(id) => (OnceLock::from(id), String::new()),
            None => (OnceLock::new(), Uuid::new_v4().to_string()),
        };
        Arc::new(Self {
            peer_id,
            session_id,
            provisional_id,
            direction,
            media,
            phase: Mutex::new(Phase::Proposed),
            settled,
            ctx,
        })
    }

    pub(crate) fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub(crate) fn session_id(&self) -> &str {
        self.session_id
            .get()
            .map(String::as_str)
            .unwrap_or(&self.provisional_id)
    }

    /// Takes `id` as the session's id if the server never named it before.
    pub(crate) fn adopt_session_id(&self, id: &str) -> bool {
        self.session_id.set(id.to_owned()).is_ok()
    }

    pub(crate) fn direction(&self) -> SessionDirection {
        self.direction
    }

    pub(crate) fn media(&self) -> &[String] {
        &self.media
    }

    pub(crate) fn registry(&self) -> &PeerConnectionRegistry {
        &self.ctx.registry
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn state(&self) -> SessionState {
        match &*self.phase() {
            Phase::Proposed | Phase::Pending => SessionState::Proposed,
            Phase::Settled(reason) => reason.into(),
        }
    }

    pub(crate) fn is_settled(&self) -> bool {
        matches!(*self.phase(), Phase::Settled(_))
    }

    pub(crate) async fn settled(&self) -> SettleReason {
        let mut rx = self.settled.subscribe();
        let reason = rx.wait_for(Option::is_some).await.ok().and_then(|r| r.clone());
        reason.unwrap_or_else(|| SettleReason::Errored("session dropped".to_owned()))
    }

    /// Claims the session for a local accept/reject/cancel.
    pub(crate) fn begin_local(&self) -> Result<()> {
        let mut phase = self.phase();
        match *phase {
            Phase::Proposed => {
                *phase = Phase::Pending;
                Ok(())
            }
            Phase::Pending | Phase::Settled(_) => Err(SignalingError::AlreadySettled),
        }
    }

    pub(crate) async fn call(&self, command: Command) -> Result<Option<Value>> {
        self.ctx
            .signaler
            .call(&self.peer_id, command, Some(self.session_id()))
            .await
    }

    /// Completes a local operation claimed with [`Self::begin_local`].
    pub(crate) fn settle_local(&self, settlement: Settlement) -> bool {
        self.settle(settlement, |phase| *phase == Phase::Pending)
    }

    /// Applies a server-driven transition; ignored once settled.
    pub(crate) fn settle_remote(&self, settlement: Settlement) -> bool {
        self.settle(settlement, |phase| !matches!(phase, Phase::Settled(_)))
    }

    fn settle(&self, settlement: Settlement, allowed: impl Fn(&Phase) -> bool) -> bool {
        let reason = settlement.reason();
        {
            let mut phase = self.phase();
            if !allowed(&*phase) {
                return false;
            }
            *phase = Phase::Settled(reason.clone());
        }

        self.ctx
            .sessions
            .remove_if(&self.peer_id, |_, s| s.session_id() == self.session_id());
        if reason != SettleReason::Accepted {
            self.ctx.registry.discard_early_candidates(&self.peer_id);
        }
        self.settled.send_replace(Some(reason.clone()));

        info!(
            "{:?} session {} with {} settled: {:?}",
            self.direction,
            self.session_id(),
            self.peer_id,
            reason
        );
        self.emit(settlement.into_event());
        self.emit(SessionEvent::Settled(reason));
        true
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.ctx.events.send(ClientEvent::Session {
            peer_id: self.peer_id.clone(),
            session_id: self.session_id().to_owned(),
            event,
        });
    }
}
