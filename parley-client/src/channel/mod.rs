mod ws_channel;

pub use ws_channel::WsChannel;

use crate::error::ChannelError;
use async_trait::async_trait;
use parley_core::Message;
use tokio::sync::mpsc;

/// What the inbound half of a channel yields. The stream ends when the channel closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Text(String),
    Error(String),
}

pub type InboundStream = mpsc::UnboundedReceiver<ChannelEvent>;

/// Outbound half of the duplex transport to the signaling server.
///
/// Implementations never retry; a failed send is reported once and the
/// caller decides what the failure means for its pending operation.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn send(&self, message: &Message) -> Result<(), ChannelError>;

    fn is_open(&self) -> bool;

    /// Closes the channel; the inbound stream ends afterwards.
    async fn close(&self);
}
