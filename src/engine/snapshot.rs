//! Immutable engine snapshots
//!
//! A [`ClassifierSnapshot`] bundles everything one classification needs: the
//! authoritative rule store, the derived field indexes and the optional
//! Bloom pre-filter. Snapshots are built by writers under the writer claim
//! and published through an atomic pointer swap; readers hold a reference
//! for the duration of one classification (or one batch) and never observe
//! a partially updated bundle. A superseded snapshot is reclaimed when its
//! last reader reference drops.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::index::{BloomFilter, FieldIndexes};
use crate::rules::{Rule, RuleId, RuleStore};

/// One immutable, fully consistent view of the rule set
#[derive(Debug, Clone)]
pub struct ClassifierSnapshot {
    pub(crate) rules: RuleStore,
    pub(crate) indexes: FieldIndexes,
    pub(crate) bloom: Option<BloomFilter>,
    pub(crate) version: u64,
}

impl ClassifierSnapshot {
    /// Create the initial empty snapshot
    #[must_use]
    pub(crate) fn empty(bloom: Option<BloomFilter>, rule_capacity: usize) -> Self {
        Self {
            rules: RuleStore::with_capacity(rule_capacity),
            indexes: FieldIndexes::new(),
            bloom,
            version: 0,
        }
    }

    /// The snapshot's publication version
    ///
    /// Increments by one for every published write; useful for logging which
    /// generation of the rule set a decision was made against.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Number of registered rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if the rule set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Look up a rule by ID
    ///
    /// The reference is stable for as long as the caller holds the snapshot.
    #[must_use]
    pub fn rule(&self, id: RuleId) -> Option<&Arc<Rule>> {
        self.rules.get(id)
    }

    /// The priority-ordered rule view (higher priority first, ties by
    /// ascending ID)
    #[must_use]
    pub fn rules_by_priority(&self) -> &[Arc<Rule>] {
        self.rules.by_priority()
    }

    /// The derived field indexes
    ///
    /// Exposed for consistency checks; classification goes through the
    /// facade.
    #[must_use]
    pub fn indexes(&self) -> &FieldIndexes {
        &self.indexes
    }

    /// Whether the Bloom pre-filter is carried by this snapshot
    #[must_use]
    pub const fn has_bloom(&self) -> bool {
        self.bloom.is_some()
    }

    /// Summary counters for logging and diagnostics
    #[must_use]
    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            version: self.version,
            rule_count: self.rules.len(),
            enabled_count: self.rules.iter().filter(|r| r.enabled).count(),
            bloom_enabled: self.bloom.is_some(),
        }
    }
}

/// Summary counters of one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    /// Publication version
    pub version: u64,
    /// Total registered rules
    pub rule_count: usize,
    /// Rules participating in classification
    pub enabled_count: usize,
    /// Whether the Bloom pre-filter is active
    pub bloom_enabled: bool,
}
