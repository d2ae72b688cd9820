use crate::channel::{ChannelEvent, InboundStream};
use crate::config::ClientConfig;
use crate::connection::{PeerConnection, Role, handshake};
use crate::engine::{EngineEnvelope, EngineEvent};
use crate::error::{Result, SignalingError};
use crate::event::ClientEvent;
use crate::session::{IncomingSession, Session, SessionContext, SessionCore, SessionDirection};
use dashmap::mapref::entry::Entry;
use parley_core::{Command, IceServerConfig, Message, PeerId};
use std::sync::{Arc, RwLock};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info, warn};

/// The single reaction loop of the client.
///
/// Inbound server messages and engine callbacks are handled one at a time on
/// this task, so a peer's session and connection only ever see one reaction
/// at a time and in channel order.
pub(crate) struct SignalingDispatcher {
    ctx: SessionContext,
    config: Arc<RwLock<ClientConfig>>,
    inbound: InboundStream,
    engine_rx: mpsc::UnboundedReceiver<EngineEnvelope>,
    shutdown: Arc<Notify>,
}

impl SignalingDispatcher {
    pub(crate) fn new(
        ctx: SessionContext,
        config: Arc<RwLock<ClientConfig>>,
        inbound: InboundStream,
        engine_rx: mpsc::UnboundedReceiver<EngineEnvelope>,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            ctx,
            config,
            inbound,
            engine_rx,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("Dispatcher for {} started", self.ctx.signaler.local_id());
        let mut inbound_open = true;

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("Dispatcher shutting down");
                    break;
                }

                event = self.inbound.recv(), if inbound_open => {
                    match event {
                        Some(ChannelEvent::Text(text)) => self.handle_text(&text).await,
                        Some(ChannelEvent::Error(e)) => {
                            warn!("Signaling channel error: {}", e);
                            self.emit(ClientEvent::Error(SignalingError::Transport(e)));
                        }
                        None => {
                            inbound_open = false;
                            self.handle_disconnect();
                        }
                    }
                }

                envelope = self.engine_rx.recv() => {
                    match envelope {
                        Some(e) => self.handle_engine_event(e).await,
                        None => {
                            warn!("Engine event channel closed unexpectedly");
                            break;
                        }
                    }
                }
            }
        }

        info!("Dispatcher finished");
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.ctx.events.send(event);
    }

    fn handle_disconnect(&self) {
        let failed = self.ctx.signaler.mark_closed();
        info!("Signaling channel closed, {} pending requests failed", failed);

        let sessions: Vec<Session> = self.ctx.sessions.iter().map(|s| s.value().clone()).collect();
        for session in sessions {
            session.abort("signaling channel closed");
        }
        self.emit(ClientEvent::Disconnected);
    }

    async fn handle_text(&self, text: &str) {
        let message = match Message::parse(text) {
            Ok(m) => m,
            Err(e) => {
                warn!("Dropping malformed message: {}", e);
                self.emit(ClientEvent::Error(e.into()));
                return;
            }
        };

        match message {
            Message::Response { .. } => self.handle_response(message),
            Message::Event {
                uri,
                session_id,
                command,
            } => self.handle_event(uri, session_id, command).await,
            Message::Request { .. } => {
                warn!("Server sent a request: {}", message.kind().as_str());
                self.emit(ClientEvent::Error(SignalingError::MalformedMessage(format!(
                    "unexpected request `{}` from server",
                    message.kind().as_str()
                ))));
            }
        }
    }

    fn handle_response(&self, message: Message) {
        let Some(id) = message.transaction_id().cloned() else {
            return;
        };
        let kind = message.kind();
        if !self.ctx.signaler.correlation().resolve(&id, message) {
            debug!("Unmatched {} response {}", kind.as_str(), id);
        }
    }

    async fn handle_event(&self, uri: Option<PeerId>, session_id: Option<String>, command: Command) {
        if let Command::Welcome { peer_id, ice_servers } = command {
            self.handle_welcome(peer_id, ice_servers);
            return;
        }

        let Some(peer_id) = uri else {
            warn!("{} event without a peer", command.kind().as_str());
            self.emit(ClientEvent::Error(SignalingError::MalformedMessage(format!(
                "`{}` event is missing `uri`",
                command.kind().as_str()
            ))));
            return;
        };
        if peer_id == *self.ctx.signaler.local_id() {
            warn!("Dropping {} event addressed from ourselves", command.kind().as_str());
            return;
        }

        debug!("{} from {}", command.kind().as_str(), peer_id);
        match command {
            Command::SessionStart { media } => self.handle_session_start(peer_id, session_id, media),
            Command::SessionAccept => {
                if let Some(Session::Outgoing(s)) = self.session_for(&peer_id, session_id.as_deref()) {
                    s.handle_accept().await;
                }
            }
            Command::SessionReject { reason } => {
                if let Some(Session::Outgoing(s)) = self.session_for(&peer_id, session_id.as_deref()) {
                    s.handle_reject(reason);
                }
            }
            Command::SessionCancel { reason } => {
                if let Some(Session::Incoming(s)) = self.session_for(&peer_id, session_id.as_deref()) {
                    s.handle_cancel(reason);
                }
            }
            Command::SessionTimeout => {
                if let Some(s) = self.session_for(&peer_id, session_id.as_deref()) {
                    s.handle_timeout();
                }
            }
            Command::Offer { sdp } => self.handle_offer(peer_id, sdp).await,
            Command::Answer { sdp } => {
                let Some(pc) = self.ctx.registry.get(&peer_id) else {
                    warn!("Answer from {} without a connection", peer_id);
                    return;
                };
                let result = handshake::on_remote_answer(&pc, sdp).await;
                self.report(&pc, "apply answer", result);
            }
            Command::Candidate { candidate } => match self.ctx.registry.get(&peer_id) {
                Some(pc) => {
                    let result = handshake::on_remote_candidate(&pc, &candidate).await;
                    self.report(&pc, "add candidate", result);
                }
                None => {
                    let expected = self.ctx.sessions.contains_key(&peer_id)
                        || self.ctx.registry.is_connecting(&peer_id);
                    if !expected {
                        debug!("Dropping candidate from {} with no session or connection", peer_id);
                    } else if self.ctx.registry.buffer_early_candidate(&peer_id, &candidate) {
                        debug!("Holding candidate from {} until its connection exists", peer_id);
                    }
                }
            },
            Command::Welcome { .. } => {}
        }
    }

    fn handle_welcome(&self, peer_id: PeerId, ice_servers: Vec<IceServerConfig>) {
        if peer_id != *self.ctx.signaler.local_id() {
            warn!(
                "Server re-announced us as {}, keeping {}",
                peer_id,
                self.ctx.signaler.local_id()
            );
        }
        if ice_servers.is_empty() {
            return;
        }
        let mut config = match self.config.write() {
            Ok(config) => config,
            Err(poisoned) => poisoned.into_inner(),
        };
        info!("Using {} ICE servers from the server", ice_servers.len());
        config.ice_servers = ice_servers;
    }

    /// The peer's active session, unless the event names a different one.
    ///
    /// A session proposed without an id takes the first id the server uses.
    fn session_for(&self, peer_id: &PeerId, session_id: Option<&str>) -> Option<Session> {
        let session = self.ctx.sessions.get(peer_id).map(|s| s.value().clone());
        let Some(session) = session else {
            debug!("No active session with {}", peer_id);
            return None;
        };
        match session_id {
            Some(id) if id != session.session_id() => {
                if session.adopt_session_id(id) {
                    debug!("Session with {} is now known as {}", peer_id, id);
                    return Some(session);
                }
                debug!("Ignoring event for stale session {} with {}", id, peer_id);
                None
            }
            _ => Some(session),
        }
    }

    fn handle_session_start(&self, peer_id: PeerId, session_id: Option<String>, media: Vec<String>) {
        let incoming = match self.ctx.sessions.entry(peer_id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let core = SessionCore::new(
                    peer_id.clone(),
                    session_id,
                    SessionDirection::Incoming,
                    media,
                    self.ctx.clone(),
                );
                let session = IncomingSession::new(core);
                slot.insert(Session::Incoming(session.clone()));
                Some(session)
            }
        };

        match incoming {
            Some(session) => {
                info!("Session proposed by {}", peer_id);
                self.emit(ClientEvent::IncomingSession(session));
            }
            None => {
                warn!("{} proposed a session while one is active", peer_id);
                self.emit(ClientEvent::Error(SignalingError::SessionAlreadyActive(peer_id)));
            }
        }
    }

    async fn handle_offer(&self, peer_id: PeerId, sdp: String) {
        let pc = match self.ctx.registry.get_or_create(&peer_id, Role::Responder).await {
            Ok((pc, created)) => {
                if created {
                    self.emit(ClientEvent::IncomingConnection(pc.clone()));
                }
                pc
            }
            Err(e) => {
                warn!("Cannot answer offer from {}: {}", peer_id, e);
                self.emit(ClientEvent::Error(e));
                return;
            }
        };

        let result = handshake::on_remote_offer(&self.ctx.signaler, &pc, sdp).await;
        self.report(&pc, "answer offer", result);
    }

    async fn handle_engine_event(&self, envelope: EngineEnvelope) {
        let EngineEnvelope {
            peer_id,
            connection_id,
            event,
        } = envelope;

        let pc = match self.ctx.registry.get(&peer_id) {
            Some(pc) if pc.connection_id() == connection_id && !pc.is_closed() => pc,
            _ => {
                debug!("Dropping engine event for stale connection {} to {}", connection_id, peer_id);
                return;
            }
        };

        match event {
            EngineEvent::NegotiationNeeded => {
                let result = handshake::on_negotiation_needed(&self.ctx.signaler, &pc).await;
                self.report(&pc, "send offer", result);
            }
            EngineEvent::IceCandidate(candidate) => {
                let result = handshake::on_local_candidate(&self.ctx.signaler, &pc, candidate).await;
                self.report(&pc, "send candidate", result);
            }
            EngineEvent::IceConnectionState(state) => {
                info!("ICE state for {}: {:?}", peer_id, state);
                self.emit(ClientEvent::IceState {
                    peer_id: peer_id.clone(),
                    state,
                });
                if state.is_terminal() {
                    pc.close().await;
                }
            }
            EngineEvent::Track(track) => {
                info!("Track {} ({}) from {}", track.id(), track.kind(), peer_id);
                self.emit(ClientEvent::Track { peer_id, track });
            }
            EngineEvent::DataChannel(channel) => {
                info!("DataChannel '{}' from {}", channel.label(), peer_id);
                pc.add_data_channel(channel.clone());
                self.emit(ClientEvent::DataChannel { peer_id, channel });
            }
        }
    }

    fn report(&self, pc: &PeerConnection, step: &str, result: Result<()>) {
        if let Err(e) = result {
            warn!("Failed to {} for {}: {}", step, pc.peer_id(), e);
            self.emit(ClientEvent::Error(e));
        }
    }
}
