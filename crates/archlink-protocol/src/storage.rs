//! Data storage operation model.
//!
//! A `Set` message carries an ordered list of [`StorageOperation`]s. The
//! server starts from the stored value (or the message's default when the
//! key is new) and applies each operation in list order, so
//! `[add 5, mul 2]` on a fresh key with default `0` yields `10` while
//! `[mul 2, add 5]` yields `5`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys starting with this prefix are computed by the server and can only
/// be read.
pub const READ_ONLY_PREFIX: &str = "_read_";

/// Returns `true` if `key` names a server-computed, read-only entry.
pub fn is_read_only_key(key: &str) -> bool {
    key.starts_with(READ_ONLY_PREFIX)
}

/// The operator tag of one storage step.
///
/// The wire names are the server's short forms (`mul`, `pow`, `ceil`, …),
/// the Rust names spell them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageOperator {
    /// Overwrite with the operand.
    #[serde(rename = "replace")]
    Replace,
    /// Reset to the message's default value.
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "add")]
    Add,
    #[serde(rename = "mul")]
    Multiply,
    #[serde(rename = "pow")]
    Power,
    #[serde(rename = "mod")]
    Modulo,
    #[serde(rename = "floor")]
    Floor,
    #[serde(rename = "ceil")]
    Ceiling,
    #[serde(rename = "max")]
    Max,
    #[serde(rename = "min")]
    Min,
    #[serde(rename = "and")]
    And,
    #[serde(rename = "or")]
    Or,
    #[serde(rename = "xor")]
    Xor,
    #[serde(rename = "left_shift")]
    LeftShift,
    #[serde(rename = "right_shift")]
    RightShift,
    /// Remove the first occurrence of the operand from a list.
    #[serde(rename = "remove")]
    Remove,
    /// Remove an index from a list or a key from a dict.
    #[serde(rename = "pop")]
    Pop,
    /// Merge a dict into a dict (or extend a list).
    #[serde(rename = "update")]
    Update,
}

/// One ordered step `{operation, value}` of a `Set` message.
///
/// The server indexes `value` unconditionally, so operators without an
/// operand (`floor`, `ceil`, `default`) still send `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageOperation {
    pub operation: StorageOperator,
    #[serde(default)]
    pub value: Value,
}

impl StorageOperation {
    /// Creates a step from an operator and its operand.
    pub fn new(operation: StorageOperator, value: impl Into<Value>) -> Self {
        Self {
            operation,
            value: value.into(),
        }
    }

    /// Creates a step for an operator that takes no operand.
    pub fn unary(operation: StorageOperator) -> Self {
        Self {
            operation,
            value: Value::Null,
        }
    }
}
