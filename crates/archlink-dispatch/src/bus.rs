//! The dispatch bus: routes decoded messages to subscribers.
//!
//! ```text
//! frame ──decode──→ [m1, m2, m3]
//!                     │
//!                     ├─ m1 → typed(m1.kind) listeners → catch-all listeners
//!                     ├─ m2 → typed(m2.kind) listeners → catch-all listeners
//!                     └─ m3 → …
//! ```
//!
//! Every message is fully dispatched (typed first, then catch-all) before
//! the next one starts. The request correlator sits on the catch-all list,
//! so by the time an awaited reply resolves, every typed subscriber
//! (including the session cache) has already seen it.
//!
//! The bus also carries the "messages sent" event: the connection emits
//! each batch it successfully queued, so caches can follow self-issued
//! changes without rebuilding requests.

use std::collections::HashMap;

use archlink_protocol::{ClientMessage, MessageKind, ServerMessage};

use crate::{Listeners, SubscriptionId};

/// Typed + catch-all subscriber lists for inbound messages, plus the
/// outbound "messages sent" list.
#[derive(Debug)]
pub struct DispatchBus {
    typed: HashMap<MessageKind, Listeners<ServerMessage>>,
    any: Listeners<ServerMessage>,
    sent: Listeners<[ClientMessage]>,
}

impl DispatchBus {
    pub fn new() -> Self {
        Self {
            typed: MessageKind::ALL
                .into_iter()
                .map(|kind| (kind, Listeners::new()))
                .collect(),
            any: Listeners::new(),
            sent: Listeners::new(),
        }
    }

    /// Subscribes to one message kind.
    pub fn subscribe<F>(&self, kind: MessageKind, listener: F) -> SubscriptionId
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.typed_list(kind).add(listener)
    }

    /// Subscribes to every inbound message. Catch-all listeners run after
    /// the typed listeners of the same message.
    pub fn subscribe_any<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.any.add(listener)
    }

    /// Subscribes to the "messages sent" event.
    pub fn subscribe_sent<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&[ClientMessage]) + Send + Sync + 'static,
    {
        self.sent.add(listener)
    }

    /// Removes a subscription from whichever list holds it.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.typed.values().any(|list| list.remove(id))
            || self.any.remove(id)
            || self.sent.remove(id)
    }

    /// Dispatches one message: typed listeners, then catch-all listeners.
    pub fn publish(&self, message: &ServerMessage) {
        let kind = message.kind();
        tracing::trace!(%kind, "dispatching");
        self.typed_list(kind).emit(message);
        self.any.emit(message);
    }

    /// Dispatches a decoded frame in array order.
    pub fn publish_all(&self, messages: &[ServerMessage]) {
        for message in messages {
            self.publish(message);
        }
    }

    /// Emits the "messages sent" event for a batch that was queued.
    pub fn emit_sent(&self, batch: &[ClientMessage]) {
        self.sent.emit(batch);
    }

    /// Drops every subscription on every list.
    pub fn clear(&self) {
        for list in self.typed.values() {
            list.clear();
        }
        self.any.clear();
        self.sent.clear();
    }

    fn typed_list(&self, kind: MessageKind) -> &Listeners<ServerMessage> {
        // Populated from `MessageKind::ALL` in `new`.
        &self.typed[&kind]
    }
}

impl Default for DispatchBus {
    fn default() -> Self {
        Self::new()
    }
}
