//! Correlation token generators.
//!
//! Tokens are embedded in `Get`/`Set` requests and echoed back in the
//! replies. The generator is injected so tests can use predictable
//! tokens while production code uses random ones.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

/// Produces opaque, unique correlation tokens.
pub trait TokenGenerator: Send + Sync + 'static {
    fn next_token(&self) -> String;
}

/// 128 random bits as 32 lowercase hex characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTokens;

impl TokenGenerator for RandomTokens {
    fn next_token(&self) -> String {
        let bytes: [u8; 16] = rand::rng().random();
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// `prefix-1`, `prefix-2`, … Deterministic, for tests and replays.
#[derive(Debug)]
pub struct SequentialTokens {
    prefix: String,
    next: AtomicU64,
}

impl SequentialTokens {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl TokenGenerator for SequentialTokens {
    fn next_token(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_tokens_are_32_hex_chars_and_unique() {
        let a = RandomTokens.next_token();
        let b = RandomTokens.next_token();

        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_sequential_tokens_count_from_one() {
        let tokens = SequentialTokens::new("tx");
        assert_eq!(tokens.next_token(), "tx-1");
        assert_eq!(tokens.next_token(), "tx-2");
    }
}
