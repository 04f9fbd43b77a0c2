//! The request correlator: "send this, then wait for the reply that
//! matches".
//!
//! A caller registers a pending request (expected kinds + predicate) and
//! gets back a [`PendingReply`] to wait on. The correlator listens on the bus
//! catch-all list; for each inbound message it walks the pending requests
//! of that kind in registration order and hands the message to the first
//! one whose predicate returns `true`. A message therefore satisfies at
//! most one request.
//!
//! # Lifecycle of a pending request
//!
//! ```text
//! register() ──→ [pending] ──match──→ removed ──→ resolver(Ok(msg))
//!                    │
//!                    ├──deadline──→ removed ──→ Err(Timeout)
//!                    ├──cancel_all()──→ removed ──→ Err(Disconnected)
//!                    └──PendingReply dropped──→ removed
//! ```
//!
//! Removal always happens before the resolver runs, so a request can
//! never be resolved twice.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use archlink_protocol::{ClientMessage, MessageKind, ServerMessage};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::{
    CorrelationError, DispatchBus, Outbound, RandomTokens, SubscriptionId,
    TokenGenerator,
};

type Resolver = oneshot::Sender<Result<ServerMessage, CorrelationError>>;
type Predicate = Box<dyn Fn(&ServerMessage) -> bool + Send + Sync>;

/// Identifies one pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

struct PendingRequest {
    kinds: Vec<MessageKind>,
    predicate: Predicate,
    resolver: Resolver,
}

/// The active set, indexed by kind in registration order.
#[derive(Default)]
struct PendingTable {
    requests: HashMap<RequestId, PendingRequest>,
    by_kind: HashMap<MessageKind, Vec<RequestId>>,
}

impl PendingTable {
    fn insert(&mut self, id: RequestId, request: PendingRequest) {
        for kind in &request.kinds {
            self.by_kind.entry(*kind).or_default().push(id);
        }
        self.requests.insert(id, request);
    }

    fn remove(&mut self, id: RequestId) -> Option<PendingRequest> {
        let request = self.requests.remove(&id)?;
        for kind in &request.kinds {
            if let Some(ids) = self.by_kind.get_mut(kind) {
                ids.retain(|pending| *pending != id);
                if ids.is_empty() {
                    self.by_kind.remove(kind);
                }
            }
        }
        Some(request)
    }

    /// Finds and removes the first request of `message`'s kind whose
    /// predicate accepts it. A panicking predicate counts as "no match".
    fn take_match(&mut self, message: &ServerMessage) -> Option<(RequestId, PendingRequest)> {
        let candidates = self.by_kind.get(&message.kind())?;
        let id = candidates.iter().copied().find(|id| {
            self.requests.get(id).is_some_and(|request| {
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    (request.predicate)(message)
                }))
                .unwrap_or_else(|_| {
                    tracing::warn!(%id, "predicate panicked; treating as no match");
                    false
                })
            })
        })?;
        self.remove(id).map(|request| (id, request))
    }
}

/// Matches inbound messages to awaiting callers.
pub struct Correlator {
    pending: Arc<Mutex<PendingTable>>,
    next_id: AtomicU64,
    tokens: Arc<dyn TokenGenerator>,
    subscription: SubscriptionId,
}

impl Correlator {
    /// Creates a correlator listening on `bus`, with random tokens.
    pub fn new(bus: &DispatchBus) -> Self {
        Self::with_tokens(bus, Arc::new(RandomTokens))
    }

    /// Creates a correlator listening on `bus` with an injected token
    /// generator.
    pub fn with_tokens(bus: &DispatchBus, tokens: Arc<dyn TokenGenerator>) -> Self {
        let pending = Arc::new(Mutex::new(PendingTable::default()));

        let table = Arc::clone(&pending);
        let subscription = bus.subscribe_any(move |message| {
            // Lock only for the lookup; resolve after releasing it.
            let matched = table.lock().take_match(message);
            if let Some((id, request)) = matched {
                tracing::debug!(%id, kind = %message.kind(), "correlated reply");
                // The waiter may have gone away; nothing to do then.
                let _ = request.resolver.send(Ok(message.clone()));
            }
        });

        Self {
            pending,
            next_id: AtomicU64::new(1),
            tokens,
            subscription,
        }
    }

    /// The bus subscription that feeds this correlator.
    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    /// A fresh correlation token from the injected generator.
    pub fn next_token(&self) -> String {
        self.tokens.next_token()
    }

    /// Number of requests currently awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().requests.len()
    }

    /// Registers a pending request without sending anything.
    ///
    /// The returned reply resolves with the first message of one of
    /// `kinds` that satisfies `predicate`, or fails after `timeout`.
    pub fn register<P>(
        &self,
        kinds: &[MessageKind],
        timeout: Duration,
        predicate: P,
    ) -> PendingReply
    where
        P: Fn(&ServerMessage) -> bool + Send + Sync + 'static,
    {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (resolver, receiver) = oneshot::channel();

        self.pending.lock().insert(
            id,
            PendingRequest {
                kinds: kinds.to_vec(),
                predicate: Box::new(predicate),
                resolver,
            },
        );
        tracing::debug!(%id, ?kinds, ?timeout, "registered pending request");

        PendingReply {
            id,
            receiver,
            deadline: Instant::now() + timeout,
            timeout,
            pending: Arc::clone(&self.pending),
        }
    }

    /// Sends `batch` and awaits the first matching reply.
    ///
    /// The request is registered before the batch is handed to the
    /// connection, so a reply can never slip past between send and
    /// registration. If the send fails, the request is withdrawn and the
    /// send error is returned.
    ///
    /// # Errors
    /// - [`CorrelationError::Send`]: the batch was not sent
    /// - [`CorrelationError::Timeout`]: no match before the deadline
    /// - [`CorrelationError::Disconnected`]: cancelled by disconnect
    pub async fn send_and_wait<P>(
        &self,
        outbound: &dyn Outbound,
        batch: Vec<ClientMessage>,
        kinds: &[MessageKind],
        timeout: Duration,
        predicate: P,
    ) -> Result<ServerMessage, CorrelationError>
    where
        P: Fn(&ServerMessage) -> bool + Send + Sync + 'static,
    {
        let reply = self.register(kinds, timeout, predicate);
        // On error `reply` is dropped here, which withdraws it.
        outbound.send(batch)?;
        reply.wait().await
    }

    /// Rejects every pending request with [`CorrelationError::Disconnected`].
    ///
    /// Returns how many requests were rejected.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut table = self.pending.lock();
            table.by_kind.clear();
            table.requests.drain().collect()
        };
        let count = drained.len();
        for (id, request) in drained {
            tracing::debug!(%id, "rejecting pending request on disconnect");
            let _ = request.resolver.send(Err(CorrelationError::Disconnected));
        }
        count
    }
}

impl fmt::Debug for Correlator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correlator")
            .field("pending", &self.pending_count())
            .field("subscription", &self.subscription)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PendingReply
// ---------------------------------------------------------------------------

/// Future side of a registered request.
///
/// Dropping it before completion withdraws the request.
#[must_use = "a pending reply does nothing unless waited on"]
pub struct PendingReply {
    id: RequestId,
    receiver: oneshot::Receiver<Result<ServerMessage, CorrelationError>>,
    deadline: Instant,
    timeout: Duration,
    pending: Arc<Mutex<PendingTable>>,
}

impl PendingReply {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Waits for the matching message.
    ///
    /// # Errors
    /// - [`CorrelationError::Timeout`]: nothing matched before the deadline
    /// - [`CorrelationError::Disconnected`]: rejected by
    ///   [`Correlator::cancel_all`]
    pub async fn wait(mut self) -> Result<ServerMessage, CorrelationError> {
        match tokio::time::timeout_at(self.deadline, &mut self.receiver).await {
            Ok(Ok(outcome)) => outcome,
            // Resolver dropped without answering.
            Ok(Err(_)) => Err(CorrelationError::Disconnected),
            Err(_elapsed) => {
                let withdrawn = self.pending.lock().remove(self.id);
                if withdrawn.is_some() {
                    tracing::debug!(id = %self.id, timeout = ?self.timeout, "pending request timed out");
                    return Err(CorrelationError::Timeout(self.timeout));
                }
                // Matched at the deadline; the reply is already in the channel.
                self.receiver
                    .try_recv()
                    .unwrap_or(Err(CorrelationError::Timeout(self.timeout)))
            }
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        // Bind first so the request is dropped after the lock is released.
        let withdrawn = self.pending.lock().remove(self.id);
        if withdrawn.is_some() {
            tracing::debug!(id = %self.id, "pending request withdrawn");
        }
    }
}
