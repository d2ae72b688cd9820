//! Signaling client: session negotiation with remote peers through a
//! signaling server, and the offer/answer/candidate handshake that sets up
//! an RTC connection once a session is accepted.

pub mod channel;
mod client;
pub mod config;
pub mod connection;
pub mod correlation;
mod dispatcher;
pub mod engine;
pub mod error;
pub mod event;
pub mod session;
mod signaler;

pub use channel::{ChannelEvent, InboundStream, MessageChannel, WsChannel};
pub use client::SignalingClient;
pub use config::ClientConfig;
pub use connection::{CandidateBuffer, PeerConnection, PeerConnectionRegistry, Role};
pub use correlation::{CorrelationTable, PendingRequest};
pub use engine::{
    ConnectionId, DataChannelHandle, EngineEvent, EngineHooks, IceConnectionState, RtcEngine,
    RtcPeer, SdpKind, SessionDescription, TrackHandle, WebRtcEngine,
};
pub use error::{ChannelError, EngineError, Result, SignalingError};
pub use event::{ClientEvent, ClientEventReceiver, SessionEvent};
pub use session::{
    IncomingSession, OutgoingSession, Session, SessionDirection, SessionState, SettleReason,
};
