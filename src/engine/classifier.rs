//! Classifier facade
//!
//! [`Classifier`] is the public surface of the engine: rule management,
//! classification and statistics. Classification is lock-free: a single
//! atomic snapshot load followed by pure reads and a relaxed counter
//! update. Writes serialize on a process-wide writer claim, build the
//! successor snapshot from the current one and publish it with one atomic
//! swap, so readers always observe either the pre- or the post-state of a
//! write, never a mixture.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::{ArcSwap, Guard};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, trace, warn};

use crate::config::ClassifierConfig;
use crate::error::{ClassifierError, RuleError};
use crate::index::BloomFilter;
use crate::rules::{ActionList, PacketHeader, Rule, RuleId};

use super::snapshot::ClassifierSnapshot;

/// Result of one classification
///
/// A miss (`rule_id == None`) is a value, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    /// ID of the matching rule, if any
    pub rule_id: Option<RuleId>,
    /// Action list of the matching rule, if any
    pub actions: Option<ActionList>,
}

impl ClassificationResult {
    /// A miss
    #[must_use]
    pub const fn no_match() -> Self {
        Self {
            rule_id: None,
            actions: None,
        }
    }

    /// A hit on `rule_id` with its actions
    #[must_use]
    pub const fn matched(rule_id: RuleId, actions: ActionList) -> Self {
        Self {
            rule_id: Some(rule_id),
            actions: Some(actions),
        }
    }

    /// Check if a rule matched
    #[must_use]
    pub const fn is_match(&self) -> bool {
        self.rule_id.is_some()
    }
}

/// Proof that the holder owns the writer claim
///
/// Public write operations claim exactly once; internal helpers that mutate
/// or publish take a `&WriterClaim` parameter instead of re-acquiring, which
/// rules out writer re-entry by construction.
pub struct WriterClaim<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// Multi-field packet classification engine
///
/// Shares safely across threads behind an `Arc`. Many threads may classify
/// concurrently while one thread at a time adds, modifies or deletes rules.
///
/// # Examples
///
/// ```
/// use rust_classifier::{
///     ActionList, Classifier, ClassifierConfig, PacketHeader, Rule, RuleFilter,
/// };
///
/// let classifier = Classifier::new(ClassifierConfig::default()).unwrap();
///
/// let filter = RuleFilter::any()
///     .with_src_prefix("192.168.1.0/24".parse().unwrap())
///     .with_protocol(6);
/// classifier
///     .add_rule(Rule::new(1, 100, filter, ActionList::forward(10)))
///     .unwrap();
///
/// let header = PacketHeader::new(0xC0A8_0165, 0x0808_0808, 33333, 80, 6);
/// let result = classifier.classify(&header);
/// assert_eq!(result.rule_id, Some(1));
/// ```
pub struct Classifier {
    /// Currently published snapshot (lock-free reads)
    snapshot: ArcSwap<ClassifierSnapshot>,
    /// Writer claim serializing all mutations
    writer: Mutex<()>,
    config: ClassifierConfig,
}

impl Classifier {
    /// Create an engine from the given configuration
    ///
    /// # Errors
    ///
    /// Returns `ClassifierError::Config` if the configuration fails
    /// validation.
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        config.validate()?;
        let bloom = config
            .enable_bloom_pre_filter
            .then(|| BloomFilter::from_rate(config.bloom_expected_items, config.bloom_fp_rate));
        let initial = ClassifierSnapshot::empty(bloom, config.initial_rule_capacity);
        info!(
            bloom = config.enable_bloom_pre_filter,
            rule_capacity = config.initial_rule_capacity,
            "classifier initialized"
        );
        Ok(Self {
            snapshot: ArcSwap::from_pointee(initial),
            writer: Mutex::new(()),
            config,
        })
    }

    /// Register a new rule
    ///
    /// # Errors
    ///
    /// - `RuleError::DuplicateId` if the ID is already registered
    /// - `RuleError::Conflict` if conflict detection is enabled and an
    ///   existing rule carries an identical `(filter, priority)` pair
    /// - `ClassifierError::Index` if a field index rejects the rule; nothing
    ///   is published in that case
    pub fn add_rule(&self, rule: Rule) -> Result<(), ClassifierError> {
        let claim = self.claim_writer();
        let current = self.snapshot.load_full();

        if current.rules.contains(rule.id) {
            warn!(rule_id = rule.id, "add rejected: duplicate rule ID");
            return Err(RuleError::DuplicateId(rule.id).into());
        }
        if self.config.reject_duplicate_filters {
            if let Some(existing) = current.rules.find_conflict(&rule.filter, rule.priority, None)
            {
                warn!(rule_id = rule.id, existing, "add rejected: conflicting rule");
                return Err(RuleError::Conflict {
                    id: rule.id,
                    existing,
                }
                .into());
            }
        }

        let rule = Arc::new(rule);
        let mut indexes = current.indexes.clone();
        if rule.enabled {
            if let Err(e) = indexes.insert_rule(&rule) {
                warn!(rule_id = rule.id, error = %e, "index update failed; add rolled back");
                return Err(e.into());
            }
        }
        let bloom = Self::bloom_with(&current, rule.as_ref());

        let next = ClassifierSnapshot {
            rules: current.rules.with_inserted(Arc::clone(&rule)),
            indexes,
            bloom,
            version: current.version + 1,
        };
        self.publish(&claim, next);
        info!(rule_id = rule.id, priority = rule.priority, "rule added");
        Ok(())
    }

    /// Remove a rule and all of its index entries
    ///
    /// The freed ID may be reused by a later `add_rule`.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::NotFound` if the ID is not registered.
    pub fn delete_rule(&self, id: RuleId) -> Result<(), ClassifierError> {
        let claim = self.claim_writer();
        let current = self.snapshot.load_full();

        let Some(rule) = current.rules.get(id) else {
            warn!(rule_id = id, "delete rejected: rule not found");
            return Err(RuleError::NotFound(id).into());
        };

        let mut indexes = current.indexes.clone();
        indexes.remove_rule(rule);
        // The Bloom filter cannot remove fingerprints; the stale entry stays
        // as advisory noise until the filter is rebuilt.

        let next = ClassifierSnapshot {
            rules: current.rules.with_removed(id),
            indexes,
            bloom: current.bloom.clone(),
            version: current.version + 1,
        };
        self.publish(&claim, next);
        info!(rule_id = id, "rule deleted");
        Ok(())
    }

    /// Replace a rule's filter, actions, priority and enabled state
    ///
    /// The registered ID stays authoritative: an `id` inside `replacement`
    /// is ignored. Match statistics carry over to the replacement. Readers
    /// observe either the old or the new rule, never the removed
    /// intermediate state.
    ///
    /// # Errors
    ///
    /// - `RuleError::NotFound` if the ID is not registered
    /// - `RuleError::Conflict` if conflict detection is enabled and another
    ///   rule carries an identical `(filter, priority)` pair
    /// - `ClassifierError::Index` if a field index rejects the replacement;
    ///   nothing is published in that case
    pub fn modify_rule(&self, id: RuleId, replacement: Rule) -> Result<(), ClassifierError> {
        let claim = self.claim_writer();
        let current = self.snapshot.load_full();

        let Some(existing) = current.rules.get(id) else {
            warn!(rule_id = id, "modify rejected: rule not found");
            return Err(RuleError::NotFound(id).into());
        };
        if self.config.reject_duplicate_filters {
            if let Some(conflicting) =
                current
                    .rules
                    .find_conflict(&replacement.filter, replacement.priority, Some(id))
            {
                warn!(rule_id = id, conflicting, "modify rejected: conflicting rule");
                return Err(RuleError::Conflict {
                    id,
                    existing: conflicting,
                }
                .into());
            }
        }

        // The outer ID wins; statistics survive the replacement.
        let replacement = Rule::new(id, replacement.priority, replacement.filter, replacement.actions)
            .with_enabled(replacement.enabled);
        replacement.stats().copy_from(existing.stats());
        let replacement = Arc::new(replacement);

        // Remove the old presence, then insert the new one, on a working
        // copy; the swap below makes both visible at once.
        let mut indexes = current.indexes.clone();
        indexes.remove_rule(existing);
        if replacement.enabled {
            if let Err(e) = indexes.insert_rule(&replacement) {
                warn!(rule_id = id, error = %e, "index update failed; modify rolled back");
                return Err(e.into());
            }
        }
        let bloom = Self::bloom_with(&current, replacement.as_ref());

        let next = ClassifierSnapshot {
            rules: current.rules.with_replaced(Arc::clone(&replacement)),
            indexes,
            bloom,
            version: current.version + 1,
        };
        self.publish(&claim, next);
        info!(
            rule_id = id,
            priority = replacement.priority,
            enabled = replacement.enabled,
            "rule modified"
        );
        Ok(())
    }

    /// Classify a packet header against the current rule set
    ///
    /// Lock-free: loads the published snapshot once and reads only that
    /// snapshot. The matched rule's counters are updated through relaxed
    /// atomics.
    #[must_use]
    pub fn classify(&self, header: &PacketHeader) -> ClassificationResult {
        let snapshot = self.snapshot.load();
        Self::classify_with_snapshot(&snapshot, header)
    }

    /// Classify a batch of headers against one consistent snapshot
    ///
    /// The snapshot is loaded once for the whole batch, so every header in
    /// the batch observes the same rule set.
    #[must_use]
    pub fn classify_batch(&self, headers: &[PacketHeader]) -> Vec<ClassificationResult> {
        let snapshot = self.snapshot.load();
        debug!(count = headers.len(), version = snapshot.version(), "classifying batch");
        headers
            .iter()
            .map(|header| Self::classify_with_snapshot(&snapshot, header))
            .collect()
    }

    /// Classify against a specific snapshot
    ///
    /// Useful when the caller pins a snapshot across several operations.
    #[must_use]
    pub fn classify_with_snapshot(
        snapshot: &ClassifierSnapshot,
        header: &PacketHeader,
    ) -> ClassificationResult {
        if let Some(bloom) = &snapshot.bloom {
            // Advisory hint only: the filter stores rule-filter fingerprints,
            // which do not cover the packet digest space, so a negative must
            // not short-circuit the authoritative match.
            if !bloom.possibly_contains(&header.digest()) {
                trace!(%header, "bloom pre-filter: digest not fingerprinted");
            }
        }

        let candidates = snapshot.indexes.candidates(header);
        if candidates.is_empty() {
            trace!(%header, "no candidates from field indexes");
            return ClassificationResult::no_match();
        }

        for rule in snapshot.rules.iter_by_priority() {
            if !candidates.contains(&rule.id) || !rule.enabled {
                continue;
            }
            // Verify protocol and re-check every constrained field; the
            // indexes only narrow the walk.
            if rule.filter.matches(header) {
                rule.stats().record_match(unix_now_secs());
                trace!(%header, rule_id = rule.id, "matched");
                return ClassificationResult::matched(rule.id, rule.actions.clone());
            }
        }

        trace!(%header, "no rule matched");
        ClassificationResult::no_match()
    }

    /// Get the current snapshot (lock-free)
    ///
    /// The returned guard keeps the snapshot alive for its lifetime, which
    /// pins a consistent view across multiple reads.
    #[must_use]
    pub fn snapshot(&self) -> Guard<Arc<ClassifierSnapshot>> {
        self.snapshot.load()
    }

    /// Look up a rule by ID
    #[must_use]
    pub fn get_rule(&self, id: RuleId) -> Option<Arc<Rule>> {
        self.snapshot.load().rules.get(id).cloned()
    }

    /// Match counts for every registered rule
    #[must_use]
    pub fn get_statistics(&self) -> HashMap<RuleId, u64> {
        self.snapshot
            .load()
            .rules
            .iter()
            .map(|rule| (rule.id, rule.match_count()))
            .collect()
    }

    /// Match count for one rule; `0` when the ID is unknown
    #[must_use]
    pub fn get_rule_statistics(&self, id: RuleId) -> u64 {
        self.snapshot
            .load()
            .rules
            .get(id)
            .map_or(0, |rule| rule.match_count())
    }

    /// Reset the counters of every rule
    pub fn reset_statistics(&self) {
        let snapshot = self.snapshot.load();
        for rule in snapshot.rules.iter() {
            rule.stats().reset();
        }
        info!("all rule statistics reset");
    }

    /// Reset the counters of one rule; unknown IDs are ignored
    pub fn reset_rule_statistics(&self, id: RuleId) {
        if let Some(rule) = self.snapshot.load().rules.get(id) {
            rule.stats().reset();
            info!(rule_id = id, "rule statistics reset");
        }
    }

    /// The published snapshot version
    #[must_use]
    pub fn version(&self) -> u64 {
        self.snapshot.load().version()
    }

    /// Number of registered rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    /// Check if no rules are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }

    /// The configuration this engine was built with
    #[must_use]
    pub const fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Acquire the writer claim
    fn claim_writer(&self) -> WriterClaim<'_> {
        WriterClaim {
            _guard: self.writer.lock(),
        }
    }

    /// Publish the successor snapshot
    ///
    /// Requires the writer claim as proof that the caller serialized with
    /// other writers; the swap itself is atomic for readers.
    fn publish(&self, _claim: &WriterClaim<'_>, next: ClassifierSnapshot) {
        debug!(version = next.version, rules = next.rules.len(), "publishing snapshot");
        self.snapshot.store(Arc::new(next));
    }

    /// Derive the successor Bloom filter, fingerprinting `rule` if enabled
    fn bloom_with(current: &ClassifierSnapshot, rule: &Rule) -> Option<BloomFilter> {
        let mut bloom = current.bloom.clone();
        if let Some(filter) = &mut bloom {
            if rule.enabled {
                filter.insert(&rule.filter.digest());
            }
        }
        bloom
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot.load();
        f.debug_struct("Classifier")
            .field("version", &snapshot.version())
            .field("rules", &snapshot.len())
            .field("bloom", &snapshot.has_bloom())
            .finish()
    }
}

/// Seconds since the UNIX epoch
fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{PortRange, RuleFilter};

    fn classifier() -> Classifier {
        Classifier::new(ClassifierConfig::default()).expect("default config is valid")
    }

    fn tcp_header(src_ip: u32, dst_ip: u32, src_port: u16, dst_port: u16) -> PacketHeader {
        PacketHeader::new(src_ip, dst_ip, src_port, dst_port, 6)
    }

    #[test]
    fn test_empty_rule_set_never_matches() {
        let engine = classifier();
        let result = engine.classify(&tcp_header(1, 2, 3, 4));
        assert!(!result.is_match());
        assert_eq!(result, ClassificationResult::no_match());
    }

    #[test]
    fn test_add_and_classify() {
        let engine = classifier();
        let filter = RuleFilter::any()
            .with_src_prefix("192.168.1.0/24".parse().unwrap())
            .with_protocol(6);
        engine
            .add_rule(Rule::new(1, 100, filter, ActionList::forward(10)))
            .unwrap();

        let result = engine.classify(&tcp_header(0xC0A8_0165, 0x0808_0808, 33333, 80));
        assert_eq!(result.rule_id, Some(1));
        assert_eq!(result.actions, Some(ActionList::forward(10)));

        // Non-matching source network
        let result = engine.classify(&tcp_header(0x0A00_0001, 0x0808_0808, 33333, 80));
        assert!(!result.is_match());
    }

    #[test]
    fn test_duplicate_id_rejected_and_state_unchanged() {
        let engine = classifier();
        engine
            .add_rule(Rule::new(1, 10, RuleFilter::any(), ActionList::drop()))
            .unwrap();
        let version = engine.version();

        let err = engine
            .add_rule(Rule::new(1, 20, RuleFilter::any(), ActionList::forward(1)))
            .unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::Rule(RuleError::DuplicateId(1))
        ));

        // Nothing was published
        assert_eq!(engine.version(), version);
        assert_eq!(engine.get_rule(1).unwrap().priority, 10);
    }

    #[test]
    fn test_delete_missing_rule() {
        let engine = classifier();
        let err = engine.delete_rule(42).unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::Rule(RuleError::NotFound(42))
        ));
    }

    #[test]
    fn test_priority_order_decides() {
        let engine = classifier();
        engine
            .add_rule(Rule::new(
                1,
                100,
                RuleFilter::any().with_src_prefix("10.0.0.0/8".parse().unwrap()),
                ActionList::drop(),
            ))
            .unwrap();
        engine
            .add_rule(Rule::new(
                2,
                200,
                RuleFilter::any().with_src_prefix("10.1.0.0/16".parse().unwrap()),
                ActionList::forward(5),
            ))
            .unwrap();

        // Covered by both prefixes: higher priority wins
        let result = engine.classify(&tcp_header(0x0A01_0203, 1, 1000, 80));
        assert_eq!(result.rule_id, Some(2));

        // Only the /8 covers this one
        let result = engine.classify(&tcp_header(0x0A02_0203, 1, 1000, 80));
        assert_eq!(result.rule_id, Some(1));
    }

    #[test]
    fn test_priority_tie_broken_by_id() {
        let engine = classifier();
        engine
            .add_rule(Rule::new(8, 50, RuleFilter::any(), ActionList::forward(8)))
            .unwrap();
        engine
            .add_rule(Rule::new(3, 50, RuleFilter::any(), ActionList::forward(3)))
            .unwrap();

        let result = engine.classify(&tcp_header(1, 2, 3, 4));
        assert_eq!(result.rule_id, Some(3));
    }

    #[test]
    fn test_modify_keeps_outer_id_and_stats() {
        let engine = classifier();
        engine
            .add_rule(Rule::new(5, 10, RuleFilter::any(), ActionList::drop()))
            .unwrap();

        // Accumulate a match
        engine.classify(&tcp_header(1, 2, 3, 4));
        assert_eq!(engine.get_rule_statistics(5), 1);

        // The replacement carries a different inner ID; the outer one wins
        engine
            .modify_rule(
                5,
                Rule::new(99, 20, RuleFilter::any(), ActionList::forward(1)),
            )
            .unwrap();

        assert!(engine.get_rule(99).is_none());
        let rule = engine.get_rule(5).unwrap();
        assert_eq!(rule.priority, 20);
        // Statistics survived the modify
        assert_eq!(rule.match_count(), 1);
    }

    #[test]
    fn test_disabled_rule_never_matches() {
        let engine = classifier();
        engine
            .add_rule(Rule::new(1, 10, RuleFilter::any(), ActionList::forward(1)))
            .unwrap();
        assert!(engine.classify(&tcp_header(1, 2, 3, 4)).is_match());

        engine
            .modify_rule(
                1,
                Rule::new(1, 10, RuleFilter::any(), ActionList::forward(1)).with_enabled(false),
            )
            .unwrap();
        assert!(!engine.classify(&tcp_header(1, 2, 3, 4)).is_match());

        // And it left no index presence behind
        assert!(!engine.snapshot().indexes().contains_id(1));
    }

    #[test]
    fn test_conflict_detection_configurable() {
        let permissive = classifier();
        let filter = RuleFilter::any().with_protocol(6);
        permissive
            .add_rule(Rule::new(1, 10, filter.clone(), ActionList::drop()))
            .unwrap();
        // Baseline policy accepts the exact duplicate pair under a new ID
        permissive
            .add_rule(Rule::new(2, 10, filter.clone(), ActionList::drop()))
            .unwrap();

        let strict = Classifier::new(ClassifierConfig {
            reject_duplicate_filters: true,
            ..ClassifierConfig::default()
        })
        .unwrap();
        strict
            .add_rule(Rule::new(1, 10, filter.clone(), ActionList::drop()))
            .unwrap();
        let err = strict
            .add_rule(Rule::new(2, 10, filter, ActionList::drop()))
            .unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::Rule(RuleError::Conflict { id: 2, existing: 1 })
        ));
    }

    #[test]
    fn test_batch_uses_one_snapshot() {
        let engine = classifier();
        engine
            .add_rule(Rule::new(
                7,
                50,
                RuleFilter::any().with_dst_ports(PortRange::new(80, 443).unwrap()),
                ActionList::log("web"),
            ))
            .unwrap();

        let headers = vec![
            tcp_header(1, 2, 3, 80),
            tcp_header(1, 2, 3, 100),
            tcp_header(1, 2, 3, 500),
        ];
        let results = engine.classify_batch(&headers);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].rule_id, Some(7));
        assert_eq!(results[1].rule_id, Some(7));
        assert!(!results[2].is_match());
    }

    #[test]
    fn test_statistics_lifecycle() {
        let engine = classifier();
        engine
            .add_rule(Rule::new(1, 10, RuleFilter::any(), ActionList::drop()))
            .unwrap();
        engine
            .add_rule(Rule::new(
                2,
                5,
                RuleFilter::any().with_protocol(17),
                ActionList::drop(),
            ))
            .unwrap();

        engine.classify(&tcp_header(1, 2, 3, 4));
        engine.classify(&tcp_header(1, 2, 3, 4));

        let stats = engine.get_statistics();
        assert_eq!(stats.get(&1), Some(&2));
        assert_eq!(stats.get(&2), Some(&0));
        assert_eq!(engine.get_rule_statistics(1), 2);
        // Unknown IDs read as zero
        assert_eq!(engine.get_rule_statistics(99), 0);

        engine.reset_rule_statistics(1);
        assert_eq!(engine.get_rule_statistics(1), 0);

        engine.classify(&tcp_header(1, 2, 3, 4));
        engine.reset_statistics();
        assert!(engine.get_statistics().values().all(|&count| count == 0));
    }

    #[test]
    fn test_version_increments_per_publish() {
        let engine = classifier();
        assert_eq!(engine.version(), 0);
        engine
            .add_rule(Rule::new(1, 10, RuleFilter::any(), ActionList::drop()))
            .unwrap();
        assert_eq!(engine.version(), 1);
        engine
            .modify_rule(1, Rule::new(1, 20, RuleFilter::any(), ActionList::drop()))
            .unwrap();
        assert_eq!(engine.version(), 2);
        engine.delete_rule(1).unwrap();
        assert_eq!(engine.version(), 3);
    }

    #[test]
    fn test_pinned_snapshot_is_immutable() {
        let engine = classifier();
        engine
            .add_rule(Rule::new(1, 10, RuleFilter::any(), ActionList::forward(1)))
            .unwrap();

        let pinned = engine.snapshot();
        engine.delete_rule(1).unwrap();

        // The pinned snapshot still matches; a fresh load does not
        let header = tcp_header(1, 2, 3, 4);
        assert!(Classifier::classify_with_snapshot(&pinned, &header).is_match());
        assert!(!engine.classify(&header).is_match());
    }

    #[test]
    fn test_bloom_disabled_engine_still_classifies() {
        let engine = Classifier::new(ClassifierConfig {
            enable_bloom_pre_filter: false,
            ..ClassifierConfig::default()
        })
        .unwrap();
        assert!(!engine.snapshot().has_bloom());

        engine
            .add_rule(Rule::new(1, 10, RuleFilter::any(), ActionList::forward(1)))
            .unwrap();
        assert!(engine.classify(&tcp_header(1, 2, 3, 4)).is_match());
    }

    #[test]
    fn test_bloom_fingerprints_enabled_rules() {
        let engine = classifier();
        let filter = RuleFilter::any().with_protocol(6);
        engine
            .add_rule(Rule::new(1, 10, filter.clone(), ActionList::drop()))
            .unwrap();

        let snapshot = engine.snapshot();
        let bloom = snapshot.bloom.as_ref().unwrap();
        assert!(bloom.possibly_contains(&filter.digest()));
    }
}
