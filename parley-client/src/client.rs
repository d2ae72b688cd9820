use crate::channel::{ChannelEvent, InboundStream, MessageChannel};
use crate::config::ClientConfig;
use crate::connection::{PeerConnection, PeerConnectionRegistry, Role};
use crate::dispatcher::SignalingDispatcher;
use crate::engine::RtcEngine;
use crate::error::{Result, SignalingError};
use crate::event::ClientEventReceiver;
use crate::session::{OutgoingSession, Session, SessionContext, SessionCore, SessionDirection};
use crate::signaler::{Signaler, response_payload};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parley_core::{Command, Message, PeerId};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Entry point for the embedding application.
///
/// Owns the session table, the peer connection registry and the pending
/// request table, and runs the dispatcher task that feeds them.
pub struct SignalingClient {
    ctx: SessionContext,
    config: Arc<RwLock<ClientConfig>>,
    shutdown: Arc<Notify>,
    dispatcher: JoinHandle<()>,
}

impl SignalingClient {
    /// Waits for the server's `welcome` on `inbound`, then starts the client
    /// under the peer ID it assigned.
    pub async fn start(
        channel: Arc<dyn MessageChannel>,
        mut inbound: InboundStream,
        engine: Arc<dyn RtcEngine>,
        mut config: ClientConfig,
    ) -> Result<(Self, ClientEventReceiver)> {
        let local_id = loop {
            let text = match inbound.recv().await {
                Some(ChannelEvent::Text(text)) => text,
                Some(ChannelEvent::Error(e)) => return Err(SignalingError::Transport(e)),
                None => return Err(SignalingError::ChannelNotOpen),
            };

            match Message::parse(&text) {
                Ok(Message::Event {
                    command: Command::Welcome { peer_id, ice_servers },
                    ..
                }) => {
                    if !ice_servers.is_empty() {
                        config.ice_servers = ice_servers;
                    }
                    break peer_id;
                }
                Ok(other) => debug!("Ignoring {} before welcome", other.kind().as_str()),
                Err(e) => warn!("Dropping malformed message before welcome: {}", e),
            }
        };

        info!("Signaling server assigned us {}", local_id);
        Ok(Self::with_local_id(local_id, channel, inbound, engine, config))
    }

    /// Starts the client for a peer ID that is already known.
    pub fn with_local_id(
        local_id: PeerId,
        channel: Arc<dyn MessageChannel>,
        inbound: InboundStream,
        engine: Arc<dyn RtcEngine>,
        config: ClientConfig,
    ) -> (Self, ClientEventReceiver) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let config = Arc::new(RwLock::new(config));
        let shutdown = Arc::new(Notify::new());

        let signaler = Arc::new(Signaler::new(local_id.clone(), channel));
        let registry = PeerConnectionRegistry::new(
            local_id,
            engine,
            engine_tx,
            events.clone(),
            config.clone(),
        );
        let ctx = SessionContext {
            signaler,
            registry,
            sessions: Arc::new(DashMap::new()),
            events,
        };

        let dispatcher = SignalingDispatcher::new(
            ctx.clone(),
            config.clone(),
            inbound,
            engine_rx,
            shutdown.clone(),
        );
        let dispatcher = tokio::spawn(dispatcher.run());

        let client = Self {
            ctx,
            config,
            shutdown,
            dispatcher,
        };
        (client, events_rx)
    }

    pub fn local_id(&self) -> &PeerId {
        self.ctx.signaler.local_id()
    }

    /// Current configuration, including ICE servers announced by the server.
    pub fn config(&self) -> ClientConfig {
        match self.config.read() {
            Ok(config) => config.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn registry(&self) -> &PeerConnectionRegistry {
        &self.ctx.registry
    }

    pub fn is_closed(&self) -> bool {
        self.ctx.signaler.is_closed()
    }

    /// Requests still waiting for their response.
    pub fn pending_requests(&self) -> usize {
        self.ctx.signaler.correlation().len()
    }

    /// Sends `command` to `uri` and waits for the response payload.
    pub async fn request(&self, uri: &PeerId, command: Command) -> Result<Option<Value>> {
        self.ctx.signaler.call(uri, command, None).await
    }

    /// Sends a prepared request and waits for its response.
    ///
    /// A transaction id already set on `message` is used for correlation.
    pub async fn send(&self, message: Message) -> Result<Message> {
        let response = self.ctx.signaler.transmit(message).await?.await?;
        response_payload(response.clone())?;
        Ok(response)
    }

    /// Proposes a session to `peer_id`.
    ///
    /// The session is returned once the server acknowledged the proposal; it
    /// settles later through server events or [`OutgoingSession::cancel`].
    pub async fn create_session(&self, peer_id: &PeerId, media: Vec<String>) -> Result<OutgoingSession> {
        if peer_id == self.local_id() {
            return Err(SignalingError::SelfAddressed(peer_id.clone()));
        }
        if self.is_closed() {
            return Err(SignalingError::ChannelNotOpen);
        }

        let core = SessionCore::new(
            peer_id.clone(),
            Some(Uuid::new_v4().to_string()),
            SessionDirection::Outgoing,
            media.clone(),
            self.ctx.clone(),
        );
        let session = OutgoingSession::new(core);

        // Claimed before sending so an accept racing the response finds it.
        match self.ctx.sessions.entry(peer_id.clone()) {
            Entry::Occupied(_) => return Err(SignalingError::SessionAlreadyActive(peer_id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(Session::Outgoing(session.clone()));
            }
        }

        match session.core().call(Command::SessionStart { media }).await {
            Ok(_) => {
                info!("Session {} proposed to {}", session.session_id(), peer_id);
                Ok(session)
            }
            Err(e) => {
                warn!("Session proposal to {} failed: {}", peer_id, e);
                Session::Outgoing(session).abort(e.to_string());
                Err(e)
            }
        }
    }

    /// The active session with `peer_id`, if any.
    pub fn session(&self, peer_id: &PeerId) -> Option<Session> {
        self.ctx.sessions.get(peer_id).map(|s| s.value().clone())
    }

    /// Opens a connection to `peer_id` outside of any session.
    pub async fn create_peer_connection(&self, peer_id: &PeerId) -> Result<PeerConnection> {
        self.ctx.registry.create(peer_id, Role::Initiator).await
    }

    pub fn peer_connection(&self, peer_id: &PeerId) -> Option<PeerConnection> {
        self.ctx.registry.get(peer_id)
    }

    /// Closes the channel and every connection, and stops the dispatcher.
    pub async fn shutdown(&self) {
        let failed = self.ctx.signaler.mark_closed();
        if failed > 0 {
            debug!("{} pending requests failed by shutdown", failed);
        }
        self.ctx.signaler.channel().close().await;
        self.ctx.registry.close_all().await;

        let sessions: Vec<Session> = self.ctx.sessions.iter().map(|s| s.value().clone()).collect();
        for session in sessions {
            session.abort("client shut down");
        }

        self.shutdown.notify_one();
        info!("Client {} shut down", self.local_id());
    }

    pub fn is_running(&self) -> bool {
        !self.dispatcher.is_finished()
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}
