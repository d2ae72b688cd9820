use crate::channel::MessageChannel;
use crate::correlation::{CorrelationTable, PendingRequest};
use crate::error::{Result, SignalingError};
use parley_core::{Command, CommandKind, Message, Outcome, PeerId, TransactionId};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Outbound side of the client: addressing checks, correlation and transmission.
pub(crate) struct Signaler {
    local_id: PeerId,
    channel: Arc<dyn MessageChannel>,
    correlation: CorrelationTable,
    closed: AtomicBool,
}

impl Signaler {
    pub(crate) fn new(local_id: PeerId, channel: Arc<dyn MessageChannel>) -> Self {
        Self {
            local_id,
            channel,
            correlation: CorrelationTable::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub(crate) fn correlation(&self) -> &CorrelationTable {
        &self.correlation
    }

    pub(crate) fn channel(&self) -> &Arc<dyn MessageChannel> {
        &self.channel
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || !self.channel.is_open()
    }

    /// Marks the channel gone and fails every pending request.
    pub(crate) fn mark_closed(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        self.correlation.fail_all(SignalingError::ChannelNotOpen)
    }

    fn check_target(&self, uri: &PeerId) -> Result<()> {
        if *uri == self.local_id {
            return Err(SignalingError::SelfAddressed(uri.clone()));
        }
        Ok(())
    }

    /// Registers `message` for correlation, then transmits it.
    ///
    /// A caller-supplied transaction id is kept; otherwise a fresh one is assigned.
    /// Requests within a session can also be answered by session id.
    pub(crate) async fn transmit(&self, message: Message) -> Result<PendingRequest> {
        let Message::Request {
            uri,
            transaction_id,
            session_id,
            ..
        } = &message
        else {
            return Err(SignalingError::MalformedMessage(
                "only requests can be sent".to_owned(),
            ));
        };
        self.check_target(uri)?;
        if self.is_closed() {
            return Err(SignalingError::ChannelNotOpen);
        }

        let alias = session_id.clone().map(TransactionId::from);
        let pending = self
            .correlation
            .register_aliased(transaction_id.clone(), alias)?;
        let message = message.with_transaction_id(pending.id().clone());

        // The close path may have run between the check above and registration.
        if self.is_closed() {
            self.correlation.cancel(pending.id());
            return Err(SignalingError::ChannelNotOpen);
        }

        if let Err(e) = self.channel.send(&message).await {
            warn!("Failed to send {} to {:?}: {}", message.kind().as_str(), message.uri(), e);
            self.correlation.cancel(pending.id());
            return Err(e.into());
        }

        debug!("Sent {} ({})", message.kind().as_str(), pending.id());
        Ok(pending)
    }

    pub(crate) async fn begin(
        &self,
        uri: &PeerId,
        command: Command,
        session_id: Option<&str>,
    ) -> Result<PendingRequest> {
        let mut message = Message::request(uri.clone(), command);
        if let Some(session_id) = session_id {
            message = message.with_session_id(session_id);
        }
        self.transmit(message).await
    }

    /// Sends a request and waits for its response payload.
    pub(crate) async fn call(
        &self,
        uri: &PeerId,
        command: Command,
        session_id: Option<&str>,
    ) -> Result<Option<Value>> {
        let pending = self.begin(uri, command, session_id).await?;
        response_payload(pending.await?)
    }

    /// Sends without expecting a response.
    pub(crate) async fn notify(&self, uri: &PeerId, command: Command) -> Result<()> {
        self.check_target(uri)?;
        if self.is_closed() {
            return Err(SignalingError::ChannelNotOpen);
        }
        self.channel
            .send(&Message::request(uri.clone(), command))
            .await
            .map_err(Into::into)
    }

    /// Logs the acknowledgement of a request nobody waits on.
    pub(crate) fn watch_ack(peer_id: PeerId, kind: CommandKind, pending: PendingRequest) {
        tokio::spawn(async move {
            match pending.await.and_then(response_payload) {
                Ok(_) => debug!("{} to {} acknowledged", kind.as_str(), peer_id),
                Err(e) => warn!("{} to {} not acknowledged: {}", kind.as_str(), peer_id, e),
            }
        });
    }
}

/// Unwraps a response: `success` yields its payload, `failed` becomes `RemoteRejected`.
pub(crate) fn response_payload(message: Message) -> Result<Option<Value>> {
    match message {
        Message::Response {
            outcome: Outcome::Success(payload),
            ..
        } => Ok(payload),
        Message::Response {
            outcome: Outcome::Failed(error),
            ..
        } => Err(SignalingError::RemoteRejected(error)),
        other => Err(SignalingError::MalformedMessage(format!(
            "expected a response to resolve a request, got `{}`",
            other.kind().as_str()
        ))),
    }
}
