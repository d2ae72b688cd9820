use crate::error::{Result, SignalingError};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parley_core::{Message, TransactionId};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::debug;

type Waiter = oneshot::Sender<Result<Message>>;

struct Slot {
    waiter: Waiter,
    alias: Option<TransactionId>,
}

/// Pending requests keyed by correlation id, each resolved at most once.
///
/// A request sent within a session is also reachable through its session id,
/// for servers that answer with `session_id` alone. Several requests sharing
/// a session id are resolved oldest first.
#[derive(Default)]
pub struct CorrelationTable {
    pending: DashMap<TransactionId, Slot>,
    aliases: DashMap<TransactionId, VecDeque<TransactionId>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter under `id`, or under a fresh id when none is given.
    ///
    /// Must happen before the request is transmitted so a fast response
    /// always finds its waiter.
    pub fn register(&self, id: Option<TransactionId>) -> Result<PendingRequest> {
        self.register_aliased(id, None)
    }

    /// Like [`Self::register`], additionally indexing the waiter under `alias`.
    pub fn register_aliased(
        &self,
        id: Option<TransactionId>,
        alias: Option<TransactionId>,
    ) -> Result<PendingRequest> {
        let id = id.unwrap_or_default();
        let rx = match self.pending.entry(id.clone()) {
            Entry::Occupied(_) => return Err(SignalingError::DuplicateCorrelation(id)),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(Slot {
                    waiter: tx,
                    alias: alias.clone(),
                });
                rx
            }
        };
        if let Some(alias) = alias {
            self.aliases.entry(alias).or_default().push_back(id.clone());
        }
        debug!("Registered pending request {}", id);
        Ok(PendingRequest { id, rx })
    }

    /// Removes the waiter reachable through `id`, by its own id first and
    /// then by alias.
    fn take(&self, id: &TransactionId) -> Option<Waiter> {
        if let Some((_, slot)) = self.pending.remove(id) {
            if let Some(alias) = &slot.alias {
                self.unalias(alias, id);
            }
            return Some(slot.waiter);
        }

        loop {
            let primary = {
                let mut queue = self.aliases.get_mut(id)?;
                queue.pop_front()
            };
            self.aliases.remove_if(id, |_, queue| queue.is_empty());
            let primary = primary?;
            if let Some((_, slot)) = self.pending.remove(&primary) {
                return Some(slot.waiter);
            }
        }
    }

    fn unalias(&self, alias: &TransactionId, id: &TransactionId) {
        if let Some(mut queue) = self.aliases.get_mut(alias) {
            queue.retain(|queued| queued != id);
        }
        self.aliases.remove_if(alias, |_, queue| queue.is_empty());
    }

    /// Hands `message` to the waiter registered under `id`.
    ///
    /// Returns `false` when nobody is waiting; such responses are not errors
    /// here and are left for the caller to log or drop.
    pub fn resolve(&self, id: &TransactionId, message: Message) -> bool {
        let Some(waiter) = self.take(id) else {
            debug!("No pending request for {}", id);
            return false;
        };
        let _ = waiter.send(Ok(message));
        true
    }

    /// Fails a single pending request.
    pub fn fail(&self, id: &TransactionId, error: SignalingError) -> bool {
        let Some(waiter) = self.take(id) else {
            return false;
        };
        let _ = waiter.send(Err(error));
        true
    }

    /// Drops the waiter for `id` without notifying it.
    pub fn cancel(&self, id: &TransactionId) -> bool {
        self.take(id).is_some()
    }

    /// Fails every pending request, returning how many were waiting.
    pub fn fail_all(&self, error: SignalingError) -> usize {
        let ids: Vec<TransactionId> = self.pending.iter().map(|e| e.key().clone()).collect();
        let failed = ids
            .iter()
            .filter(|id| self.fail(id, error.clone()))
            .count();
        self.aliases.clear();
        failed
    }

    pub fn contains(&self, id: &TransactionId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Single-fire slot for the response to one request.
///
/// Await it directly; race it against `tokio::time::timeout` to bound the wait.
#[derive(Debug)]
pub struct PendingRequest {
    id: TransactionId,
    rx: oneshot::Receiver<Result<Message>>,
}

impl PendingRequest {
    pub fn id(&self) -> &TransactionId {
        &self.id
    }
}

impl Future for PendingRequest {
    type Output = Result<Message>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(SignalingError::ChannelNotOpen)))
    }
}
