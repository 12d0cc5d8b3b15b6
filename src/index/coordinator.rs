//! Field-index coordinator
//!
//! [`FieldIndexes`] bundles the per-field matching structures: the
//! source/destination prefix tries, the source/destination port interval
//! trees, and one wildcard ID set per field for rules that leave the field
//! unconstrained. It keeps all of them in lockstep with the rule set: every
//! rule mutation goes through [`FieldIndexes::insert_rule`] /
//! [`FieldIndexes::remove_rule`] on a private working copy, which the writer
//! publishes as part of the next snapshot. A failed update abandons the
//! working copy, so readers never observe a partial state.
//!
//! Disabled rules have no index presence at all, wildcard sets included.

use std::collections::{BTreeSet, HashSet};

use crate::error::IndexError;
use crate::rules::{PacketHeader, Rule, RuleId};

use super::interval::IntervalTree;
use super::trie::PrefixTrie;

/// The derived field indexes of one published snapshot
#[derive(Debug, Clone, Default)]
pub struct FieldIndexes {
    src_ip: PrefixTrie,
    dst_ip: PrefixTrie,
    src_port: IntervalTree,
    dst_port: IntervalTree,
    /// Enabled rules without a source-IP constraint
    src_ip_any: BTreeSet<RuleId>,
    /// Enabled rules without a destination-IP constraint
    dst_ip_any: BTreeSet<RuleId>,
    /// Enabled rules without a source-port constraint
    src_port_any: BTreeSet<RuleId>,
    /// Enabled rules without a destination-port constraint
    dst_port_any: BTreeSet<RuleId>,
}

impl FieldIndexes {
    /// Create an empty index bundle
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index an enabled rule in every field structure
    ///
    /// Constrained fields go into their trie or interval tree; unconstrained
    /// fields record the rule in the field's wildcard set. Disabled rules
    /// must not be passed here.
    ///
    /// # Errors
    ///
    /// Propagates the first failed index mutation. The bundle may be left
    /// partially updated; callers treat it as poisoned and discard it (the
    /// write path works on a clone, so the published state is unaffected).
    pub fn insert_rule(&mut self, rule: &Rule) -> Result<(), IndexError> {
        debug_assert!(rule.enabled, "disabled rules are never indexed");
        match &rule.filter.src_prefix {
            Some(prefix) => self.src_ip.insert(prefix.bits(), prefix.prefix_len(), rule.id)?,
            None => {
                self.src_ip_any.insert(rule.id);
            }
        }
        match &rule.filter.dst_prefix {
            Some(prefix) => self.dst_ip.insert(prefix.bits(), prefix.prefix_len(), rule.id)?,
            None => {
                self.dst_ip_any.insert(rule.id);
            }
        }
        match &rule.filter.src_ports {
            Some(range) => self.src_port.insert(range.start, range.end, rule.id)?,
            None => {
                self.src_port_any.insert(rule.id);
            }
        }
        match &rule.filter.dst_ports {
            Some(range) => self.dst_port.insert(range.start, range.end, rule.id)?,
            None => {
                self.dst_port_any.insert(rule.id);
            }
        }
        Ok(())
    }

    /// Remove every trace of a rule from the field structures
    ///
    /// Safe to call for rules that were never indexed (e.g. disabled ones);
    /// the removals are no-ops then.
    pub fn remove_rule(&mut self, rule: &Rule) {
        match &rule.filter.src_prefix {
            Some(prefix) => {
                self.src_ip.remove(prefix.bits(), prefix.prefix_len(), rule.id);
            }
            None => {
                self.src_ip_any.remove(&rule.id);
            }
        }
        match &rule.filter.dst_prefix {
            Some(prefix) => {
                self.dst_ip.remove(prefix.bits(), prefix.prefix_len(), rule.id);
            }
            None => {
                self.dst_ip_any.remove(&rule.id);
            }
        }
        match &rule.filter.src_ports {
            Some(range) => {
                self.src_port.remove(range.start, range.end, rule.id);
            }
            None => {
                self.src_port_any.remove(&rule.id);
            }
        }
        match &rule.filter.dst_ports {
            Some(range) => {
                self.dst_port.remove(range.start, range.end, rule.id);
            }
            None => {
                self.dst_port_any.remove(&rule.id);
            }
        }
    }

    /// The rule IDs compatible with every indexed field of the header
    ///
    /// Each field contributes its probe result unioned with its wildcard
    /// set; the four field sets are then intersected. Protocol and any finer
    /// predicates are not indexed and are verified during the priority walk.
    #[must_use]
    pub fn candidates(&self, header: &PacketHeader) -> HashSet<RuleId> {
        let mut fields = [
            field_set(self.src_ip.covering_ids(header.src_ip), &self.src_ip_any),
            field_set(self.dst_ip.covering_ids(header.dst_ip), &self.dst_ip_any),
            field_set(self.src_port.query_point(header.src_port), &self.src_port_any),
            field_set(self.dst_port.query_point(header.dst_port), &self.dst_port_any),
        ];
        // Intersect starting from the smallest set
        fields.sort_unstable_by_key(HashSet::len);
        let [first, rest @ ..] = fields;
        let mut acc = first;
        for other in &rest {
            if acc.is_empty() {
                break;
            }
            acc.retain(|id| other.contains(id));
        }
        acc
    }

    /// Check whether the rule ID appears anywhere in the bundle
    ///
    /// Consistency hook for tests and assertions: after a delete, this must
    /// be `false` for the removed ID.
    #[must_use]
    pub fn contains_id(&self, id: RuleId) -> bool {
        self.src_ip_any.contains(&id)
            || self.dst_ip_any.contains(&id)
            || self.src_port_any.contains(&id)
            || self.dst_port_any.contains(&id)
            || self.src_ip.entries().iter().any(|(_, _, rid)| *rid == id)
            || self.dst_ip.entries().iter().any(|(_, _, rid)| *rid == id)
            || self.src_port.entries().iter().any(|(_, _, rid)| *rid == id)
            || self.dst_port.entries().iter().any(|(_, _, rid)| *rid == id)
    }

    /// The source-IP trie (test hook)
    #[must_use]
    pub fn src_ip_trie(&self) -> &PrefixTrie {
        &self.src_ip
    }

    /// The destination-IP trie (test hook)
    #[must_use]
    pub fn dst_ip_trie(&self) -> &PrefixTrie {
        &self.dst_ip
    }

    /// The source-port interval tree (test hook)
    #[must_use]
    pub fn src_port_tree(&self) -> &IntervalTree {
        &self.src_port
    }

    /// The destination-port interval tree (test hook)
    #[must_use]
    pub fn dst_port_tree(&self) -> &IntervalTree {
        &self.dst_port
    }
}

/// Union a field probe result with the field's wildcard set
fn field_set<I: IntoIterator<Item = RuleId>>(probe: I, wildcard: &BTreeSet<RuleId>) -> HashSet<RuleId> {
    let mut set: HashSet<RuleId> = probe.into_iter().collect();
    set.extend(wildcard.iter().copied());
    set
}
