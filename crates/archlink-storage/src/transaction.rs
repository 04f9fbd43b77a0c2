//! The transaction builder.

use archlink_dispatch::CorrelationError;
use archlink_protocol::{
    ClientMessage, MessageKind, ServerMessage, Set, StorageOperation,
    StorageOperator,
};
use serde_json::Value;

use crate::{DataStorage, StorageError};

/// An ordered list of operations against one key, built with chained
/// calls and sent with [`commit`](Self::commit).
///
/// ```rust,no_run
/// # async fn demo(storage: &archlink_storage::DataStorage) -> Result<(), archlink_storage::StorageError> {
/// let value = storage
///     .prepare("counter", 0)?
///     .add(5)
///     .multiply(2)
///     .commit(true)
///     .await?;
/// assert_eq!(value, Some(serde_json::json!(10)));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
#[must_use = "a transaction does nothing until committed"]
pub struct Transaction<'a> {
    storage: &'a DataStorage,
    key: String,
    default: Value,
    operations: Vec<StorageOperation>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(storage: &'a DataStorage, key: String, default: Value) -> Self {
        Self {
            storage,
            key,
            default,
            operations: Vec::new(),
        }
    }

    fn push(mut self, operator: StorageOperator, value: Value) -> Self {
        self.operations.push(StorageOperation { operation: operator, value });
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The steps queued so far, in send order.
    pub fn operations(&self) -> &[StorageOperation] {
        &self.operations
    }

    /// Overwrites the value.
    pub fn replace(self, value: impl Into<Value>) -> Self {
        self.push(StorageOperator::Replace, value.into())
    }

    /// Resets the value to the transaction's default.
    pub fn set_default(self) -> Self {
        self.push(StorageOperator::Default, Value::Null)
    }

    pub fn add(self, value: impl Into<Value>) -> Self {
        self.push(StorageOperator::Add, value.into())
    }

    pub fn multiply(self, value: impl Into<Value>) -> Self {
        self.push(StorageOperator::Multiply, value.into())
    }

    pub fn power(self, value: impl Into<Value>) -> Self {
        self.push(StorageOperator::Power, value.into())
    }

    pub fn modulo(self, value: impl Into<Value>) -> Self {
        self.push(StorageOperator::Modulo, value.into())
    }

    pub fn floor(self) -> Self {
        self.push(StorageOperator::Floor, Value::Null)
    }

    pub fn ceiling(self) -> Self {
        self.push(StorageOperator::Ceiling, Value::Null)
    }

    pub fn max(self, value: impl Into<Value>) -> Self {
        self.push(StorageOperator::Max, value.into())
    }

    pub fn min(self, value: impl Into<Value>) -> Self {
        self.push(StorageOperator::Min, value.into())
    }

    pub fn and(self, value: impl Into<Value>) -> Self {
        self.push(StorageOperator::And, value.into())
    }

    pub fn or(self, value: impl Into<Value>) -> Self {
        self.push(StorageOperator::Or, value.into())
    }

    pub fn xor(self, value: impl Into<Value>) -> Self {
        self.push(StorageOperator::Xor, value.into())
    }

    pub fn shift_left(self, bits: impl Into<Value>) -> Self {
        self.push(StorageOperator::LeftShift, bits.into())
    }

    pub fn shift_right(self, bits: impl Into<Value>) -> Self {
        self.push(StorageOperator::RightShift, bits.into())
    }

    /// Removes the first occurrence of `value` from a list.
    pub fn remove(self, value: impl Into<Value>) -> Self {
        self.push(StorageOperator::Remove, value.into())
    }

    /// Removes an index from a list or a key from a dict.
    pub fn pop(self, index_or_key: impl Into<Value>) -> Self {
        self.push(StorageOperator::Pop, index_or_key.into())
    }

    /// Merges a dict into a dict.
    pub fn update(self, value: impl Into<Value>) -> Self {
        self.push(StorageOperator::Update, value.into())
    }

    /// Sends the transaction with a fresh correlation token.
    ///
    /// With `await_reply == false` this returns `Ok(None)` as soon as the
    /// message is queued. Otherwise it waits for the `SetReply` carrying
    /// the same token and returns the new value.
    ///
    /// # Errors
    /// - [`StorageError::Correlation`]: not connected, timed out, or
    ///   disconnected while waiting
    pub async fn commit(self, await_reply: bool) -> Result<Option<Value>, StorageError> {
        let storage = self.storage;
        let token = storage.correlator.next_token();
        tracing::debug!(
            key = %self.key,
            %token,
            operations = self.operations.len(),
            await_reply,
            "committing transaction"
        );

        let message = ClientMessage::Set(Set {
            key: self.key,
            default: self.default,
            want_reply: await_reply,
            operations: self.operations,
            correlation_token: token.clone(),
        });

        if !await_reply {
            storage
                .outbound
                .send(vec![message])
                .map_err(CorrelationError::from)?;
            return Ok(None);
        }

        let reply = storage
            .correlator
            .send_and_wait(
                &*storage.outbound,
                vec![message],
                &[MessageKind::SetReply],
                storage.reply_timeout,
                move |msg| {
                    matches!(
                        msg,
                        ServerMessage::SetReply(reply)
                            if reply.correlation_token.as_deref() == Some(token.as_str())
                    )
                },
            )
            .await?;

        match reply {
            ServerMessage::SetReply(reply) => Ok(Some(reply.value)),
            other => Err(StorageError::UnexpectedReply(other.kind())),
        }
    }
}
