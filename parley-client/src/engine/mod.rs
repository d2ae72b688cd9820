mod webrtc_engine;

pub use webrtc_engine::WebRtcEngine;

use crate::config::ClientConfig;
use crate::error::EngineError;
use async_trait::async_trait;
use parley_core::PeerId;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    /// States after which the connection is torn down.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

/// Identifies one engine connection, so events from a replaced connection
/// to the same peer can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Engine-owned data channel, passed through uninterpreted.
#[derive(Clone)]
pub struct DataChannelHandle {
    label: String,
    inner: Arc<dyn Any + Send + Sync>,
}

impl DataChannelHandle {
    pub fn new(label: impl Into<String>, inner: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            label: label.into(),
            inner,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Recovers the engine's concrete channel type, e.g. `RTCDataChannel`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }
}

impl fmt::Debug for DataChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataChannelHandle")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Engine-owned remote media track, passed through uninterpreted.
#[derive(Clone)]
pub struct TrackHandle {
    id: String,
    kind: String,
    stream_ids: Vec<String>,
    inner: Arc<dyn Any + Send + Sync>,
}

impl TrackHandle {
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        stream_ids: Vec<String>,
        inner: Arc<dyn Any + Send + Sync>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            stream_ids,
            inner,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn stream_ids(&self) -> &[String] {
        &self.stream_ids
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }
}

impl fmt::Debug for TrackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("stream_ids", &self.stream_ids)
            .finish_non_exhaustive()
    }
}

/// Callbacks the engine raises for one connection.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    NegotiationNeeded,
    /// A locally gathered candidate, or [`parley_core::CANDIDATES_COMPLETE`]
    /// once gathering has finished.
    IceCandidate(String),
    IceConnectionState(IceConnectionState),
    Track(TrackHandle),
    DataChannel(DataChannelHandle),
}

#[derive(Debug, Clone)]
pub struct EngineEnvelope {
    pub peer_id: PeerId,
    pub connection_id: ConnectionId,
    pub event: EngineEvent,
}

/// Sink the engine feeds its callbacks into; events land on the dispatcher queue.
#[derive(Clone)]
pub struct EngineHooks {
    peer_id: PeerId,
    connection_id: ConnectionId,
    tx: mpsc::UnboundedSender<EngineEnvelope>,
}

impl EngineHooks {
    pub(crate) fn new(
        peer_id: PeerId,
        connection_id: ConnectionId,
        tx: mpsc::UnboundedSender<EngineEnvelope>,
    ) -> Self {
        Self {
            peer_id,
            connection_id,
            tx,
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Returns `false` once the client has shut down.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx
            .send(EngineEnvelope {
                peer_id: self.peer_id.clone(),
                connection_id: self.connection_id,
                event,
            })
            .is_ok()
    }
}

/// Factory for engine connections.
#[async_trait]
pub trait RtcEngine: Send + Sync {
    async fn create_peer(
        &self,
        peer_id: &PeerId,
        config: &ClientConfig,
        hooks: EngineHooks,
    ) -> Result<Arc<dyn RtcPeer>, EngineError>;
}

/// One engine connection. Every call may suspend and may fail; a failure
/// aborts only the handshake step that made it.
#[async_trait]
pub trait RtcPeer: Send + Sync {
    async fn create_offer(&self) -> Result<String, EngineError>;

    async fn create_answer(&self) -> Result<String, EngineError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError>;

    async fn add_ice_candidate(&self, candidate: &str) -> Result<(), EngineError>;

    async fn create_data_channel(&self, label: &str) -> Result<DataChannelHandle, EngineError>;

    /// Unhooks every callback registered through [`EngineHooks`].
    fn detach(&self);

    async fn close(&self) -> Result<(), EngineError>;
}
