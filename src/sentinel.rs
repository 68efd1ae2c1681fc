//! Sentinel state machine: typed lock tokens, the tombstone marker, and the
//! two decision tables (`can_set_sentinel` for lock acquisition,
//! `can_set_value` for value commit) that the rest of the cache protocol is
//! built on. See spec §4.1.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The tombstone is a constant disjoint from any sentinel prefix and from
/// any legal serialized entity (entities serialize as JSON objects, which
/// always start with `{`). Readers and `add_dependency` must recognize it
/// without deserializing.
pub const TOMBSTONE: &str = "\u{0}tombstone";

const READ_PREFIX: &str = "\u{0}sentinel:read:";
const WRITE_PREFIX: &str = "\u{0}sentinel:write:";
const DELETE_PREFIX: &str = "\u{0}sentinel:delete:";

/// Typed sentinel kind. `Write` covers both Create and Update per spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SentinelKind {
    Read,
    Write,
    Delete,
}

impl SentinelKind {
    fn prefix(self) -> &'static str {
        match self {
            SentinelKind::Read => READ_PREFIX,
            SentinelKind::Write => WRITE_PREFIX,
            SentinelKind::Delete => DELETE_PREFIX,
        }
    }
}

/// Outcome of attempting to acquire a sentinel lock on a key already
/// holding some value (which may itself be a sentinel, a tombstone, or a
/// concrete value).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// The candidate sentinel may be written.
    Granted,
    /// The candidate loses to the current holder; do not write.
    Denied,
    /// Two Writes collide: the candidate may proceed, but the caller must
    /// record this as a potential conflict (spec §4.1, §4.6).
    GrantedWithConflict,
}

/// Outcome of `can_set_value` when a write operation's server reply is
/// about to be committed under a held sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing interrupted us: store the value.
    Set,
    /// Interleaved writers disagree, or our sentinel was upgraded to a
    /// conflict marker: drop the keys, do not store.
    Clear,
    /// A newer Write took the lock after us: upgrade `current` to
    /// `current+ours` so that writer also commits `Clear`.
    Conflict { upgraded_sentinel: String },
    /// Our sentinel is already gone and the key holds something unrelated:
    /// do not store, no upgrade needed.
    ConflictNoUpgrade,
}

/// Generates sentinels and implements the two decision tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct SentinelManager;

impl SentinelManager {
    pub fn new() -> Self {
        Self
    }

    /// Generate a fresh, globally-unique sentinel of the given kind.
    pub fn generate(&self, kind: SentinelKind) -> String {
        format!("{}{}", kind.prefix(), Uuid::new_v4())
    }

    pub fn is_sentinel(value: &str) -> bool {
        Self::kind_of(value).is_some()
    }

    pub fn is_tombstone(value: &str) -> bool {
        value == TOMBSTONE || value.starts_with(&format!("{TOMBSTONE}:"))
    }

    pub fn is_read_sentinel(value: &str) -> bool {
        value.starts_with(READ_PREFIX)
    }

    pub fn is_write_sentinel(value: &str) -> bool {
        value.starts_with(WRITE_PREFIX)
    }

    pub fn is_delete_sentinel(value: &str) -> bool {
        value.starts_with(DELETE_PREFIX)
    }

    fn kind_of(value: &str) -> Option<SentinelKind> {
        if value.starts_with(READ_PREFIX) {
            Some(SentinelKind::Read)
        } else if value.starts_with(WRITE_PREFIX) {
            Some(SentinelKind::Write)
        } else if value.starts_with(DELETE_PREFIX) {
            Some(SentinelKind::Delete)
        } else {
            None
        }
    }

    /// Lock-acquisition precedence (spec §4.1):
    /// Read loses to everything, including another in-flight Read.
    /// Write loses to a held Delete, wins over a held Read.
    /// Write vs Write succeeds but is flagged as a potential conflict.
    /// Delete always takes the lock.
    pub fn can_set_sentinel(&self, current: Option<&str>, candidate: SentinelKind) -> LockOutcome {
        let Some(current) = current else {
            return LockOutcome::Granted;
        };

        let Some(current_kind) = Self::kind_of(current) else {
            // Current holds a concrete value (or tombstone is handled by the
            // caller before reaching here): any candidate may take the lock.
            return LockOutcome::Granted;
        };

        match (current_kind, candidate) {
            (_, SentinelKind::Delete) => LockOutcome::Granted,
            (SentinelKind::Delete, _) => LockOutcome::Denied,
            (SentinelKind::Read, SentinelKind::Read) => LockOutcome::Denied,
            (SentinelKind::Read, SentinelKind::Write) => LockOutcome::Granted,
            (SentinelKind::Write, SentinelKind::Read) => LockOutcome::Denied,
            (SentinelKind::Write, SentinelKind::Write) => LockOutcome::GrantedWithConflict,
        }
    }

    /// Value-commit decision (spec §4.1) evaluated when a write operation's
    /// server reply is about to be stored under `held` (the sentinel we
    /// installed before the call).
    pub fn can_set_value(
        &self,
        current: &str,
        held_sentinel: &str,
        proposed_value_matches_current: bool,
    ) -> CommitOutcome {
        if current == held_sentinel {
            return CommitOutcome::Set;
        }

        if !Self::is_write_sentinel(held_sentinel) {
            return CommitOutcome::ConflictNoUpgrade;
        }

        // A concrete value different from ours, or the conflict-upgrade
        // marker (our sentinel concatenated with another) already present.
        if current.starts_with(held_sentinel) && current != held_sentinel {
            return CommitOutcome::Clear;
        }
        if !Self::is_sentinel(current) && !proposed_value_matches_current {
            return CommitOutcome::Clear;
        }

        if Self::is_write_sentinel(current) && current != held_sentinel {
            return CommitOutcome::Conflict {
                upgraded_sentinel: format!("{current}+{held_sentinel}"),
            };
        }

        CommitOutcome::ConflictNoUpgrade
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mgr() -> SentinelManager {
        SentinelManager::new()
    }

    #[test]
    fn read_loses_to_everything_including_read() {
        let m = mgr();
        let read = m.generate(SentinelKind::Read);
        assert_eq!(
            m.can_set_sentinel(Some(&read), SentinelKind::Read),
            LockOutcome::Denied
        );
        assert_eq!(
            m.can_set_sentinel(Some(&read), SentinelKind::Write),
            LockOutcome::Granted
        );
        assert_eq!(
            m.can_set_sentinel(Some(&read), SentinelKind::Delete),
            LockOutcome::Granted
        );
    }

    #[test]
    fn write_loses_to_delete_wins_over_read() {
        let m = mgr();
        let del = m.generate(SentinelKind::Delete);
        assert_eq!(
            m.can_set_sentinel(Some(&del), SentinelKind::Write),
            LockOutcome::Denied
        );
    }

    #[test]
    fn write_vs_write_grants_with_conflict_flag() {
        let m = mgr();
        let w1 = m.generate(SentinelKind::Write);
        assert_eq!(
            m.can_set_sentinel(Some(&w1), SentinelKind::Write),
            LockOutcome::GrantedWithConflict
        );
    }

    #[test]
    fn delete_always_takes_the_lock() {
        let m = mgr();
        for kind in [SentinelKind::Read, SentinelKind::Write, SentinelKind::Delete] {
            let current = m.generate(kind);
            assert_eq!(
                m.can_set_sentinel(Some(&current), SentinelKind::Delete),
                LockOutcome::Granted
            );
        }
    }

    #[test]
    fn empty_key_always_grants() {
        let m = mgr();
        assert_eq!(
            m.can_set_sentinel(None, SentinelKind::Read),
            LockOutcome::Granted
        );
    }

    #[test]
    fn commit_set_when_key_still_holds_our_sentinel() {
        let m = mgr();
        let held = m.generate(SentinelKind::Write);
        assert_eq!(m.can_set_value(&held, &held, true), CommitOutcome::Set);
    }

    #[test]
    fn commit_clears_on_diverging_concrete_value() {
        let m = mgr();
        let held = m.generate(SentinelKind::Write);
        assert_eq!(
            m.can_set_value("{\"id\":\"other\"}", &held, false),
            CommitOutcome::Clear
        );
    }

    #[test]
    fn commit_conflicts_and_upgrades_on_newer_write() {
        let m = mgr();
        let held = m.generate(SentinelKind::Write);
        let newer = m.generate(SentinelKind::Write);
        match m.can_set_value(&newer, &held, true) {
            CommitOutcome::Conflict { upgraded_sentinel } => {
                assert!(upgraded_sentinel.starts_with(&newer));
                assert!(upgraded_sentinel.ends_with(&held));
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn commit_no_upgrade_when_sentinel_already_gone() {
        let m = mgr();
        let held = m.generate(SentinelKind::Write);
        let read = m.generate(SentinelKind::Read);
        assert_eq!(
            m.can_set_value(&read, &held, false),
            CommitOutcome::ConflictNoUpgrade
        );
    }

    #[test]
    fn no_sentinel_leaks_as_a_kind_of_tombstone() {
        assert!(!SentinelManager::is_tombstone(&mgr().generate(SentinelKind::Read)));
        assert!(SentinelManager::is_tombstone(TOMBSTONE));
    }

    use proptest::prelude::*;

    fn any_kind() -> impl Strategy<Value = SentinelKind> {
        prop_oneof![
            Just(SentinelKind::Read),
            Just(SentinelKind::Write),
            Just(SentinelKind::Delete),
        ]
    }

    proptest! {
        /// Delete always wins the lock, whatever sentinel kind currently
        /// holds the key.
        #[test]
        fn delete_wins_against_any_current_kind(current_kind in any_kind()) {
            let m = mgr();
            let current = m.generate(current_kind);
            prop_assert_eq!(
                m.can_set_sentinel(Some(&current), SentinelKind::Delete),
                LockOutcome::Granted
            );
        }

        /// Read never wins the lock against an existing sentinel of any
        /// kind, Read included.
        #[test]
        fn read_never_displaces_an_existing_sentinel(current_kind in any_kind()) {
            let m = mgr();
            let current = m.generate(current_kind);
            prop_assert_eq!(
                m.can_set_sentinel(Some(&current), SentinelKind::Read),
                LockOutcome::Denied
            );
        }
    }
}
