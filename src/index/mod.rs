//! Field indexes for candidate narrowing
//!
//! This module provides the matching structures derived from the rule set:
//! - [`PrefixTrie`]: binary path-compressed trie for IPv4 longest-prefix
//!   matching
//! - [`IntervalTree`]: augmented AVL tree for port-range overlap queries
//! - [`BloomFilter`]: advisory pre-filter over rule-filter fingerprints
//! - [`FieldIndexes`]: the coordinator keeping all of them in lockstep with
//!   the rule store
//!
//! Index probes only narrow the candidate set; the authoritative match is
//! always the rule filter's own predicate, verified during the priority
//! walk.

pub mod bloom;
pub mod coordinator;
pub mod interval;
pub mod trie;

pub use bloom::BloomFilter;
pub use coordinator::FieldIndexes;
pub use interval::IntervalTree;
pub use trie::PrefixTrie;
