//! Key-value backend trait for the record store.
//!
//! Backends are dumb string stores with per-key expiry. Record encoding and
//! the merge policy live in [`TaskStateStore`](super::TaskStateStore); a
//! backend never interprets the values it holds.
//!
//! Every write takes the full lifetime to apply, so the sliding TTL is
//! implemented by writing, never by touching keys on read.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// Key-value storage with per-key expiry.
///
/// Single-key operations must be atomic as observed by every reader: a
/// concurrent `get` sees either the old value or the new one, never a mix.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Fetch a live value. Does not alter the key's remaining lifetime.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store a value unconditionally with the given lifetime.
    async fn insert(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Overwrite a value only if the key is currently live, resetting its
    /// lifetime. Returns `false` (and writes nothing) if the key is absent
    /// or expired.
    async fn replace(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Remove a key. Returns `true` if a live value was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Remaining lifetime of a live key. Read-only.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;
}

/// Build a namespaced key: `<prefix>:<id>`.
pub fn make_key(prefix: &str, id: &str) -> String {
    format!("{prefix}:{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_key_joins_with_colon() {
        assert_eq!(make_key("zynapse.service", "abc"), "zynapse.service:abc");
        assert_eq!(make_key("p", ""), "p:");
    }
}
