//! Remote data storage for Archlink.
//!
//! The server hosts a key-value store whose values are mutated by ordered
//! operation lists rather than plain writes. This crate provides:
//!
//! - **Transactions** ([`DataStorage::prepare`] → [`Transaction`]): build
//!   an ordered operation list and commit it, optionally awaiting the
//!   server's `SetReply` matched by correlation token.
//! - **Reads** ([`DataStorage::fetch`]): served from the local cache of
//!   monitored keys where possible; only the rest goes to the server.
//! - **Watches** ([`DataStorage::notify`]): monitor keys and get a
//!   callback on every change.
//!
//! Everything here is session-scoped. [`DataStorage::reset`] (called by
//! the connection manager on disconnect) drops the cache, the monitored
//! set and every watcher: the server forgets `SetNotify` subscriptions
//! with the connection.

mod error;
mod transaction;

pub use error::StorageError;
pub use transaction::Transaction;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use archlink_dispatch::{
    CorrelationError, Correlator, DispatchBus, Listeners, Outbound,
    SubscriptionId,
};
use archlink_protocol::{
    ClientMessage, MessageKind, ServerMessage, SetReply, is_read_only_key,
};
use parking_lot::Mutex;
use serde_json::Value;

/// A change to a watched key.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    pub key: String,
    pub value: Value,
    /// Value before the change; `None` when the key was new or unknown.
    pub previous: Option<Value>,
}

/// Result of [`DataStorage::notify`].
#[derive(Debug, Clone, PartialEq)]
pub struct Watch {
    /// Pass to [`DataStorage::unwatch`] to stop the callback.
    pub subscription: SubscriptionId,
    /// Current values of the watched keys.
    pub values: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct StorageState {
    /// Last known value of each monitored key.
    cache: HashMap<String, Value>,
    /// Keys the server was asked to push changes for.
    monitored: HashSet<String>,
}

/// The data storage engine.
pub struct DataStorage {
    outbound: Arc<dyn Outbound>,
    correlator: Arc<Correlator>,
    reply_timeout: Duration,
    state: Mutex<StorageState>,
    watchers: Listeners<ValueChange>,
}

impl DataStorage {
    pub fn new(
        outbound: Arc<dyn Outbound>,
        correlator: Arc<Correlator>,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            outbound,
            correlator,
            reply_timeout,
            state: Mutex::new(StorageState::default()),
            watchers: Listeners::new(),
        }
    }

    /// Subscribes the engine to `SetReply` so monitored values stay
    /// current and watchers fire.
    pub fn attach(self: &Arc<Self>, bus: &DispatchBus) -> SubscriptionId {
        let storage = Arc::clone(self);
        bus.subscribe(MessageKind::SetReply, move |message| {
            if let ServerMessage::SetReply(reply) = message {
                storage.apply_set_reply(reply);
            }
        })
    }

    /// Starts a transaction against `key`, starting from `default` when
    /// the key doesn't exist yet.
    ///
    /// # Errors
    /// [`StorageError::ReadOnlyKey`] for `_read_` keys. Nothing is sent.
    pub fn prepare(
        &self,
        key: impl Into<String>,
        default: impl Into<Value>,
    ) -> Result<Transaction<'_>, StorageError> {
        let key = key.into();
        if is_read_only_key(&key) {
            return Err(StorageError::ReadOnlyKey(key));
        }
        Ok(Transaction::new(self, key, default.into()))
    }

    /// Reads keys.
    ///
    /// Cached keys are answered locally; the rest are requested with one
    /// `Get`. With `monitor`, keys not monitored yet are subscribed with
    /// `SetNotify` in the same batch (ahead of the `Get`) and the fetched
    /// values are cached.
    ///
    /// Keys the server doesn't have come back as `null`.
    ///
    /// # Errors
    /// [`StorageError::Correlation`] if the request can't be sent or
    /// isn't answered in time.
    pub async fn fetch<I, K>(
        &self,
        keys: I,
        monitor: bool,
    ) -> Result<BTreeMap<String, Value>, StorageError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut requested: Vec<String> = Vec::new();
        for key in keys {
            let key = key.into();
            if !requested.contains(&key) {
                requested.push(key);
            }
        }

        let (mut values, remaining, newly_monitored) = {
            let mut state = self.state.lock();
            let mut values = BTreeMap::new();
            let mut remaining = Vec::new();
            for key in &requested {
                match state.cache.get(key) {
                    Some(value) => {
                        values.insert(key.clone(), value.clone());
                    }
                    None => remaining.push(key.clone()),
                }
            }
            let newly_monitored: Vec<String> = if monitor {
                requested
                    .iter()
                    .filter(|key| state.monitored.insert((*key).clone()))
                    .cloned()
                    .collect()
            } else {
                Vec::new()
            };
            (values, remaining, newly_monitored)
        };

        tracing::debug!(
            cached = values.len(),
            remote = remaining.len(),
            monitor,
            "fetching data storage keys"
        );

        let result = self
            .request(&remaining, &newly_monitored)
            .await;

        let retrieved = match result {
            Ok(retrieved) => retrieved,
            Err(e) => {
                let mut state = self.state.lock();
                for key in &newly_monitored {
                    state.monitored.remove(key);
                }
                return Err(e);
            }
        };

        // A SetReply dispatched while the Get was in flight is newer than
        // the retrieved value and stays in the cache.
        let mut state = self.state.lock();
        for key in remaining {
            let mut value = retrieved.get(&key).cloned().unwrap_or(Value::Null);
            if state.monitored.contains(&key) {
                value = state.cache.entry(key.clone()).or_insert(value).clone();
            }
            values.insert(key, value);
        }
        Ok(values)
    }

    /// Sends `SetNotify` for `notify` and `Get` for `get`, as one batch.
    async fn request(
        &self,
        get: &[String],
        notify: &[String],
    ) -> Result<BTreeMap<String, Value>, StorageError> {
        let mut batch = Vec::with_capacity(2);
        if !notify.is_empty() {
            batch.push(ClientMessage::SetNotify {
                keys: notify.to_vec(),
            });
        }

        if get.is_empty() {
            if !batch.is_empty() {
                self.outbound.send(batch).map_err(CorrelationError::from)?;
            }
            return Ok(BTreeMap::new());
        }

        let token = self.correlator.next_token();
        batch.push(ClientMessage::Get {
            keys: get.to_vec(),
            correlation_token: token.clone(),
        });

        let reply = self
            .correlator
            .send_and_wait(
                &*self.outbound,
                batch,
                &[MessageKind::Retrieved],
                self.reply_timeout,
                move |msg| {
                    matches!(
                        msg,
                        ServerMessage::Retrieved { correlation_token: Some(t), .. }
                            if *t == token
                    )
                },
            )
            .await?;

        match reply {
            ServerMessage::Retrieved { keys, .. } => Ok(keys),
            other => Err(StorageError::UnexpectedReply(other.kind())),
        }
    }

    /// Monitors `keys` and calls `callback` on every future change of any
    /// of them.
    ///
    /// The callback is registered before the fetch goes out, so no change
    /// between the two is missed.
    ///
    /// # Errors
    /// As [`fetch`](Self::fetch); the callback is removed again on error.
    pub async fn notify<I, K, F>(
        &self,
        keys: I,
        callback: F,
    ) -> Result<Watch, StorageError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
        F: Fn(&ValueChange) + Send + Sync + 'static,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let watched: HashSet<String> = keys.iter().cloned().collect();

        let subscription = self.watchers.add(move |change| {
            if watched.contains(&change.key) {
                callback(change);
            }
        });

        match self.fetch(keys, true).await {
            Ok(values) => Ok(Watch {
                subscription,
                values,
            }),
            Err(e) => {
                self.watchers.remove(subscription);
                Err(e)
            }
        }
    }

    /// Stops a watch callback. The keys stay monitored for the session.
    pub fn unwatch(&self, subscription: SubscriptionId) -> bool {
        self.watchers.remove(subscription)
    }

    /// Last known value of a monitored key.
    pub fn cached(&self, key: &str) -> Option<Value> {
        self.state.lock().cache.get(key).cloned()
    }

    pub fn is_monitored(&self, key: &str) -> bool {
        self.state.lock().monitored.contains(key)
    }

    /// Drops the cache, the monitored set and every watcher.
    pub fn reset(&self) {
        *self.state.lock() = StorageState::default();
        self.watchers.clear();
    }

    fn apply_set_reply(&self, reply: &SetReply) {
        let cached_previous = {
            let mut state = self.state.lock();
            if state.monitored.contains(&reply.key) {
                state.cache.insert(reply.key.clone(), reply.value.clone())
            } else {
                None
            }
        };

        let change = ValueChange {
            key: reply.key.clone(),
            value: reply.value.clone(),
            previous: reply.original_value.clone().or(cached_previous),
        };
        tracing::trace!(key = %change.key, "data storage value changed");
        self.watchers.emit(&change);
    }
}

impl fmt::Debug for DataStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DataStorage")
            .field("cached", &state.cache.len())
            .field("monitored", &state.monitored.len())
            .field("watchers", &self.watchers.len())
            .field("reply_timeout", &self.reply_timeout)
            .finish()
    }
}
