//! Authoritative rule registry
//!
//! [`RuleStore`] holds the ID-keyed rule map together with the materialized
//! priority view. A store value is immutable once built: writers derive the
//! successor store with the `with_*` copy constructors while holding the
//! writer claim, and readers see whole stores through the published
//! snapshot. Rules are held as `Arc` so their statistics counters survive
//! republication.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use super::types::{Rule, RuleFilter, RuleId};

/// Immutable rule registry with a priority-ordered view
///
/// The priority view orders rules by `(-priority, id)`: higher priority
/// first, ties broken by ascending ID.
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    by_id: HashMap<RuleId, Arc<Rule>>,
    by_priority: Vec<Arc<Rule>>,
}

impl RuleStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with pre-sized capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            by_id: HashMap::with_capacity(capacity),
            by_priority: Vec::with_capacity(capacity),
        }
    }

    /// Number of registered rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Check if the store holds no rules
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Check if a rule with this ID is registered
    #[must_use]
    pub fn contains(&self, id: RuleId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Look up a rule by ID
    #[must_use]
    pub fn get(&self, id: RuleId) -> Option<&Arc<Rule>> {
        self.by_id.get(&id)
    }

    /// Iterate rules in priority order (higher priority first, ties by
    /// ascending ID)
    pub fn iter_by_priority(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.by_priority.iter()
    }

    /// The priority-ordered view as a slice
    #[must_use]
    pub fn by_priority(&self) -> &[Arc<Rule>] {
        &self.by_priority
    }

    /// Iterate rules in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.by_id.values()
    }

    /// Find a registered rule with an identical `(filter, priority)` pair
    ///
    /// `exclude` skips one ID (the rule being modified). Drives the
    /// configurable conflict-detection policy; the permissive baseline never
    /// calls this.
    #[must_use]
    pub fn find_conflict(
        &self,
        filter: &RuleFilter,
        priority: i32,
        exclude: Option<RuleId>,
    ) -> Option<RuleId> {
        self.by_priority
            .iter()
            .find(|rule| {
                Some(rule.id) != exclude && rule.priority == priority && rule.filter == *filter
            })
            .map(|rule| rule.id)
    }

    /// Derive the store with `rule` inserted
    ///
    /// The caller guarantees the ID is fresh (checked at the facade under
    /// the writer claim).
    #[must_use]
    pub(crate) fn with_inserted(&self, rule: Arc<Rule>) -> Self {
        let mut by_id = self.by_id.clone();
        by_id.insert(rule.id, rule);
        Self::from_map(by_id)
    }

    /// Derive the store with the rule for `id` removed
    #[must_use]
    pub(crate) fn with_removed(&self, id: RuleId) -> Self {
        let mut by_id = self.by_id.clone();
        by_id.remove(&id);
        Self::from_map(by_id)
    }

    /// Derive the store with the rule for `rule.id` replaced
    #[must_use]
    pub(crate) fn with_replaced(&self, rule: Arc<Rule>) -> Self {
        let mut by_id = self.by_id.clone();
        by_id.insert(rule.id, rule);
        Self::from_map(by_id)
    }

    fn from_map(by_id: HashMap<RuleId, Arc<Rule>>) -> Self {
        let mut by_priority: Vec<Arc<Rule>> = by_id.values().cloned().collect();
        by_priority.sort_unstable_by_key(|rule| (Reverse(rule.priority), rule.id));
        Self { by_id, by_priority }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::types::ActionList;

    fn rule(id: RuleId, priority: i32) -> Arc<Rule> {
        Arc::new(Rule::new(
            id,
            priority,
            RuleFilter::any(),
            ActionList::drop(),
        ))
    }

    #[test]
    fn test_priority_view_ordering() {
        let store = RuleStore::new()
            .with_inserted(rule(3, 100))
            .with_inserted(rule(1, 200))
            .with_inserted(rule(2, 100))
            .with_inserted(rule(4, 300));

        let order: Vec<RuleId> = store.iter_by_priority().map(|r| r.id).collect();
        // Priority descending, ties broken by ascending ID
        assert_eq!(order, vec![4, 1, 2, 3]);
    }

    #[test]
    fn test_insert_remove_roundtrip() {
        let base = RuleStore::new();
        let with_rule = base.with_inserted(rule(7, 10));
        assert_eq!(with_rule.len(), 1);
        assert!(with_rule.contains(7));

        let back = with_rule.with_removed(7);
        assert!(back.is_empty());
        assert!(!back.contains(7));

        // Derivation leaves the source store untouched
        assert!(with_rule.contains(7));
        assert!(base.is_empty());
    }

    #[test]
    fn test_replace_rebuilds_priority_view() {
        let store = RuleStore::new()
            .with_inserted(rule(1, 10))
            .with_inserted(rule(2, 20));

        let order: Vec<RuleId> = store.iter_by_priority().map(|r| r.id).collect();
        assert_eq!(order, vec![2, 1]);

        let bumped = store.with_replaced(rule(1, 30));
        let order: Vec<RuleId> = bumped.iter_by_priority().map(|r| r.id).collect();
        assert_eq!(order, vec![1, 2]);
        assert_eq!(bumped.get(1).unwrap().priority, 30);
    }

    #[test]
    fn test_stats_shared_across_derivations() {
        let shared = rule(1, 10);
        let store = RuleStore::new().with_inserted(Arc::clone(&shared));
        let derived = store.with_inserted(rule(2, 20));

        shared.stats().record_match(42);
        // Both stores see the same counter through the shared Arc
        assert_eq!(store.get(1).unwrap().match_count(), 1);
        assert_eq!(derived.get(1).unwrap().match_count(), 1);
    }

    #[test]
    fn test_find_conflict() {
        let filter = RuleFilter::any().with_protocol(6);
        let a = Arc::new(Rule::new(1, 50, filter.clone(), ActionList::drop()));
        let store = RuleStore::new().with_inserted(a);

        // Identical filter and priority conflicts
        assert_eq!(store.find_conflict(&filter, 50, None), Some(1));
        // Different priority does not
        assert_eq!(store.find_conflict(&filter, 60, None), None);
        // Different filter does not
        assert_eq!(
            store.find_conflict(&RuleFilter::any().with_protocol(17), 50, None),
            None
        );
        // The excluded rule never conflicts with itself
        assert_eq!(store.find_conflict(&filter, 50, Some(1)), None);
    }
}
