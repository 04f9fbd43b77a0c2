//! Ordered subscriber lists with per-listener failure isolation.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Handle returned by every `subscribe*` call; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// An ordered list of callbacks for values of type `T`.
///
/// `T` may be unsized, so `Listeners<[ClientMessage]>` works for batches.
///
/// [`emit`](Self::emit) snapshots the list and releases the lock before
/// calling anything, so a listener may subscribe or unsubscribe (on this
/// or any other list) while it runs. Changes take effect from the next
/// emit.
pub struct Listeners<T: ?Sized> {
    entries: Mutex<Vec<(SubscriptionId, Arc<dyn Fn(&T) + Send + Sync>)>>,
}

impl<T: ?Sized> Listeners<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Appends a listener; it runs after every listener added before it.
    pub fn add<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId::next();
        self.entries.lock().push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if it isn't in this list.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    /// Drops every listener.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Calls every listener with `value`, in subscription order.
    ///
    /// A panicking listener is logged and skipped; the remaining listeners
    /// still run.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<_> = self
            .entries
            .lock()
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(value))).is_err() {
                tracing::warn!(%id, "listener panicked; continuing with the rest");
            }
        }
    }
}

impl<T: ?Sized> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.len())
            .finish()
    }
}
