use crate::config::ClientConfig;
use crate::connection::candidate_buffer::{CandidateBuffer, is_end_of_candidates};
use crate::connection::handshake;
use crate::connection::peer_connection::{PeerConnection, Role};
use crate::engine::{ConnectionId, EngineEnvelope, EngineHooks, RtcEngine};
use crate::error::{Result, SignalingError};
use crate::event::ClientEventSender;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parley_core::PeerId;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub(crate) struct RegistryShared {
    local_id: PeerId,
    connections: DashMap<PeerId, PeerConnection>,
    /// Peers whose connection is being built; blocks a concurrent second create.
    reserved: DashMap<PeerId, ()>,
    /// Candidates that arrived before any connection to the peer existed.
    early: DashMap<PeerId, CandidateBuffer>,
    engine: Arc<dyn RtcEngine>,
    engine_tx: mpsc::UnboundedSender<EngineEnvelope>,
    events: ClientEventSender,
    config: Arc<RwLock<ClientConfig>>,
}

impl RegistryShared {
    /// Drops `pc` from the map unless a newer connection already replaced it.
    ///
    /// Candidates held for the peer go with it; they belong to the old handshake.
    pub(crate) fn forget(&self, pc: &PeerConnection) {
        let id = pc.connection_id();
        let removed = self
            .connections
            .remove_if(pc.peer_id(), |_, current| current.connection_id() == id);
        if removed.is_some() && !self.reserved.contains_key(pc.peer_id()) {
            self.early.remove(pc.peer_id());
        }
    }
}

/// Owns every peer connection, at most one per peer.
#[derive(Clone)]
pub struct PeerConnectionRegistry {
    shared: Arc<RegistryShared>,
}

struct Reservation<'a> {
    reserved: &'a DashMap<PeerId, ()>,
    peer_id: PeerId,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.reserved.remove(&self.peer_id);
    }
}

impl PeerConnectionRegistry {
    pub(crate) fn new(
        local_id: PeerId,
        engine: Arc<dyn RtcEngine>,
        engine_tx: mpsc::UnboundedSender<EngineEnvelope>,
        events: ClientEventSender,
        config: Arc<RwLock<ClientConfig>>,
    ) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                local_id,
                connections: DashMap::new(),
                reserved: DashMap::new(),
                early: DashMap::new(),
                engine,
                engine_tx,
                events,
                config,
            }),
        }
    }

    /// Builds the engine connection for `peer_id` and registers it.
    ///
    /// An initiator opens the configured data channels, which makes the
    /// engine ask for negotiation.
    pub async fn create(&self, peer_id: &PeerId, role: Role) -> Result<PeerConnection> {
        let shared = &self.shared;
        if *peer_id == shared.local_id {
            return Err(SignalingError::SelfAddressed(peer_id.clone()));
        }

        let _reservation = match shared.reserved.entry(peer_id.clone()) {
            Entry::Occupied(_) => return Err(SignalingError::AlreadyConnected(peer_id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(());
                Reservation {
                    reserved: &shared.reserved,
                    peer_id: peer_id.clone(),
                }
            }
        };
        // Checked after reserving: a finished create has inserted before releasing its reservation.
        if shared.connections.contains_key(peer_id) {
            return Err(SignalingError::AlreadyConnected(peer_id.clone()));
        }

        let config = match shared.config.read() {
            Ok(config) => config.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let connection_id = ConnectionId::new();
        let hooks = EngineHooks::new(peer_id.clone(), connection_id, shared.engine_tx.clone());
        let engine = shared.engine.create_peer(peer_id, &config, hooks).await?;

        let early = shared
            .early
            .remove(peer_id)
            .map(|(_, buffer)| buffer)
            .unwrap_or_default();
        if !early.is_empty() {
            debug!("Adopting {} early candidates for {}", early.len(), peer_id);
        }

        let pc = PeerConnection::new(
            peer_id.clone(),
            connection_id,
            role,
            engine,
            early,
            Arc::downgrade(&self.shared),
            shared.events.clone(),
        );

        // Registered before any channel opens so the engine's negotiation
        // request finds the connection.
        shared.connections.insert(peer_id.clone(), pc.clone());

        // Candidates that arrived while the engine connection was being built.
        if let Some((_, late)) = shared.early.remove(peer_id) {
            for candidate in late.as_slice() {
                if let Err(e) = handshake::on_remote_candidate(&pc, candidate).await {
                    warn!("Failed to add candidate from {}: {}", peer_id, e);
                }
            }
        }

        if role == Role::Initiator {
            for label in &config.data_channels {
                match pc.engine().create_data_channel(label).await {
                    Ok(channel) => pc.add_data_channel(channel),
                    Err(e) => {
                        warn!("Failed to open DataChannel '{}' to {}: {}", label, peer_id, e);
                        pc.close().await;
                        return Err(e.into());
                    }
                }
            }
        }

        info!("Peer connection to {} created as {:?}", peer_id, role);
        Ok(pc)
    }

    /// Returns the existing connection to `peer_id`, or creates one with `role`.
    ///
    /// Waits out a concurrent create for the same peer instead of failing.
    pub async fn get_or_create(&self, peer_id: &PeerId, role: Role) -> Result<(PeerConnection, bool)> {
        loop {
            if let Some(pc) = self.get(peer_id) {
                return Ok((pc, false));
            }
            match self.create(peer_id, role).await {
                Ok(pc) => return Ok((pc, true)),
                Err(SignalingError::AlreadyConnected(_)) => tokio::task::yield_now().await,
                Err(e) => return Err(e),
            }
        }
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<PeerConnection> {
        self.shared.connections.get(peer_id).map(|pc| pc.clone())
    }

    /// Unregisters the connection to `peer_id`. Removing an absent peer is a no-op.
    pub fn remove(&self, peer_id: &PeerId) -> Option<PeerConnection> {
        self.shared.early.remove(peer_id);
        self.shared.connections.remove(peer_id).map(|(_, pc)| pc)
    }

    /// Whether a connection to `peer_id` is being built right now.
    pub fn is_connecting(&self, peer_id: &PeerId) -> bool {
        self.shared.reserved.contains_key(peer_id)
    }

    /// Drops candidates held for a peer that will not get a connection.
    pub(crate) fn discard_early_candidates(&self, peer_id: &PeerId) {
        if let Some((_, buffer)) = self.shared.early.remove(peer_id) {
            debug!("Discarding {} early candidates for {}", buffer.len(), peer_id);
        }
    }

    /// Peers holding early candidates.
    pub fn early_candidate_peers(&self) -> usize {
        self.shared.early.len()
    }

    /// Holds a remote candidate for a peer that has no connection yet.
    pub fn buffer_early_candidate(&self, peer_id: &PeerId, candidate: &str) -> bool {
        if is_end_of_candidates(candidate) {
            return false;
        }
        self.shared
            .early
            .entry(peer_id.clone())
            .or_default()
            .push(candidate)
    }

    pub fn early_candidates(&self, peer_id: &PeerId) -> Vec<String> {
        self.shared
            .early
            .get(peer_id)
            .map(|b| b.as_slice().to_vec())
            .unwrap_or_default()
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.shared
            .connections
            .iter()
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.shared.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.connections.is_empty()
    }

    pub async fn close_all(&self) {
        let all: Vec<PeerConnection> = self
            .shared
            .connections
            .iter()
            .map(|e| e.value().clone())
            .collect();
        for pc in all {
            pc.close().await;
        }
        self.shared.early.clear();
    }
}
