//! The `CacheProvider` abstraction: everything the sentinel protocol needs
//! from a storage backend, independent of whether that backend is a single
//! process-local map or a shared Redis instance. See spec §4.3.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::AuthzResult;
use crate::sentinel::{LockOutcome, SentinelKind, SentinelManager};

/// Backend-agnostic cache operations. Every method takes opaque key
/// strings produced by `KeyNameProvider`; the provider never interprets
/// key structure.
///
/// Implementors must give `set_value` and `release_sentinel` atomic
/// read-modify-write semantics with respect to concurrent callers on the
/// same key: the sentinel protocol's correctness depends on no other
/// writer observing an intermediate state.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Fetch one value. `None` if the key is absent or expired.
    async fn get_value(&self, key: &str) -> AuthzResult<Option<String>>;

    /// Fetch several values in one round trip, preserving order and
    /// reporting `None` per-key where absent.
    async fn get_values(&self, keys: &[String]) -> AuthzResult<Vec<Option<String>>>;

    /// Install `sentinel` at `key` if-and-only-if permitted: the current
    /// value at `key` (which may be absent) is read and run through
    /// `sentinel_mgr.can_set_sentinel` for the given `candidate` kind in
    /// the same atomic section that performs the write, and the write only
    /// happens on `Granted`/`GrantedWithConflict`. Returns the decision, so
    /// a `Denied` outcome is guaranteed to mean the key was left
    /// untouched — callers never need to restore a clobbered value for the
    /// key that lost.
    async fn write_sentinel(
        &self,
        key: &str,
        sentinel: &str,
        candidate: SentinelKind,
        sentinel_mgr: &SentinelManager,
        ttl: Duration,
    ) -> AuthzResult<LockOutcome>;

    /// Store `value` at `key` with the given TTL, unconditionally.
    async fn set_value(&self, key: &str, value: &str, ttl: Duration) -> AuthzResult<()>;

    /// Remove `key` outright (used for forced invalidation, not for the
    /// tombstone path, which calls `set_value` with the tombstone marker).
    async fn delete_value(&self, key: &str) -> AuthzResult<()>;

    /// Clear `key` only if it still holds `expected_sentinel`; otherwise a
    /// no-op. Used to release a held lock without clobbering a sentinel
    /// some other writer has since installed.
    async fn release_sentinel(&self, key: &str, expected_sentinel: &str) -> AuthzResult<()>;

    /// Record that `dependent_key` must be invalidated whenever
    /// `on_key`'s entity changes. A no-op (and must report so to the
    /// caller via `Ok(false)`) if `on_key` currently holds a tombstone,
    /// per spec §4.4: a deleted entity's dependency set is frozen.
    async fn add_dependency(&self, on_key: &str, dependent_key: &str) -> AuthzResult<bool>;

    /// Invalidate every key registered as depending on `on_key`, then
    /// clear the dependency set itself.
    async fn clear_dependencies(&self, on_key: &str) -> AuthzResult<()>;

    /// Invalidate every key under `prefix` (spec §4.3, §4.6 scenario T1):
    /// bulk schema-level invalidation scoped to one tenant (and, via a
    /// longer prefix, one organization) rather than the whole backend.
    /// When `flush_tombstones` is `false`, keys currently holding a
    /// tombstone are left in place so an in-flight delete's "frozen
    /// dependency set" guarantee survives the flush; `true` clears them
    /// too.
    async fn flush(&self, prefix: &str, flush_tombstones: bool) -> AuthzResult<()>;
}
