use crate::connection::candidate_buffer::CandidateBuffer;
use crate::connection::registry::RegistryShared;
use crate::engine::{ConnectionId, DataChannelHandle, RtcPeer};
use crate::event::{ClientEvent, ClientEventSender};
use dashmap::DashMap;
use parley_core::PeerId;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

/// Which side of the handshake a connection plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Opens data channels and sends the offer.
    Initiator,
    /// Waits for the remote offer and answers it.
    Responder,
}

#[derive(Debug, Default)]
pub(crate) struct HandshakeState {
    pub remote_applied: bool,
    pub buffer: CandidateBuffer,
}

struct PeerConnectionInner {
    peer_id: PeerId,
    connection_id: ConnectionId,
    role: Role,
    engine: Arc<dyn RtcPeer>,
    data_channels: DashMap<String, DataChannelHandle>,
    handshake: Mutex<HandshakeState>,
    closed: AtomicBool,
    registry: Weak<RegistryShared>,
    events: ClientEventSender,
}

/// An established negotiation track toward one peer.
///
/// Cheap to clone; every clone refers to the same connection.
#[derive(Clone)]
pub struct PeerConnection {
    inner: Arc<PeerConnectionInner>,
}

impl PeerConnection {
    pub(crate) fn new(
        peer_id: PeerId,
        connection_id: ConnectionId,
        role: Role,
        engine: Arc<dyn RtcPeer>,
        early_candidates: CandidateBuffer,
        registry: Weak<RegistryShared>,
        events: ClientEventSender,
    ) -> Self {
        Self {
            inner: Arc::new(PeerConnectionInner {
                peer_id,
                connection_id,
                role,
                engine,
                data_channels: DashMap::new(),
                handshake: Mutex::new(HandshakeState {
                    remote_applied: false,
                    buffer: early_candidates,
                }),
                closed: AtomicBool::new(false),
                registry,
                events,
            }),
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.inner.peer_id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.inner.connection_id
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn data_channel(&self, label: &str) -> Option<DataChannelHandle> {
        self.inner.data_channels.get(label).map(|dc| dc.clone())
    }

    pub fn data_channel_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .inner
            .data_channels
            .iter()
            .map(|e| e.key().clone())
            .collect();
        labels.sort();
        labels
    }

    pub async fn is_remote_description_applied(&self) -> bool {
        self.inner.handshake.lock().await.remote_applied
    }

    /// Remote candidates still waiting for the remote description.
    pub async fn buffered_candidates(&self) -> Vec<String> {
        self.inner.handshake.lock().await.buffer.as_slice().to_vec()
    }

    pub(crate) fn engine(&self) -> &Arc<dyn RtcPeer> {
        &self.inner.engine
    }

    pub(crate) async fn handshake(&self) -> MutexGuard<'_, HandshakeState> {
        self.inner.handshake.lock().await
    }

    pub(crate) fn add_data_channel(&self, channel: DataChannelHandle) {
        self.inner
            .data_channels
            .insert(channel.label().to_owned(), channel);
    }

    /// Tears the connection down. Only the first call has any effect.
    ///
    /// Engine callbacks are unhooked before `ConnectionClosed` is emitted, so
    /// nothing for this connection fires once the close is observed.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.engine.detach();

        if let Some(registry) = self.inner.registry.upgrade() {
            registry.forget(self);
        }

        if let Err(e) = self.inner.engine.close().await {
            warn!("Engine close failed for {}: {}", self.peer_id(), e);
        }

        info!("Peer connection to {} closed", self.peer_id());
        let _ = self.inner.events.send(ClientEvent::ConnectionClosed {
            peer_id: self.peer_id().clone(),
            connection_id: self.connection_id(),
        });
    }
}

impl fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnection")
            .field("peer_id", &self.inner.peer_id)
            .field("connection_id", &self.inner.connection_id)
            .field("role", &self.inner.role)
            .field("closed", &self.is_closed())
            .finish()
    }
}
