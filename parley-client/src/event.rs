use crate::connection::PeerConnection;
use crate::engine::{ConnectionId, DataChannelHandle, IceConnectionState, TrackHandle};
use crate::error::SignalingError;
use crate::session::{IncomingSession, SettleReason};
use parley_core::PeerId;
use tokio::sync::mpsc;

pub type ClientEventSender = mpsc::UnboundedSender<ClientEvent>;
pub type ClientEventReceiver = mpsc::UnboundedReceiver<ClientEvent>;

/// Terminal notifications of one session. A settled session emits exactly
/// one terminal variant followed by exactly one `Settled`.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Accepted(PeerConnection),
    Rejected(Option<String>),
    Canceled(Option<String>),
    TimedOut,
    Errored(String),
    Settled(SettleReason),
}

/// Everything the client reports to the embedding application.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A peer proposed a session; accept or reject it.
    IncomingSession(IncomingSession),

    /// A connection was created because a peer sent an offer.
    IncomingConnection(PeerConnection),

    Session {
        peer_id: PeerId,
        session_id: String,
        event: SessionEvent,
    },

    DataChannel {
        peer_id: PeerId,
        channel: DataChannelHandle,
    },

    Track {
        peer_id: PeerId,
        track: TrackHandle,
    },

    IceState {
        peer_id: PeerId,
        state: IceConnectionState,
    },

    ConnectionClosed {
        peer_id: PeerId,
        connection_id: ConnectionId,
    },

    /// Malformed inbound traffic, transport errors and failed handshake steps.
    Error(SignalingError),

    /// The signaling channel closed; pending requests were failed.
    Disconnected,
}
