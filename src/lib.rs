//! rust-classifier: Multi-field packet classification engine
//!
//! This crate selects the highest-priority matching rule for a packet
//! header from a dynamic rule set. Many threads classify concurrently and
//! lock-free while administrators add, modify or delete rules at runtime.
//!
//! # Features
//!
//! - **Lock-Free Classification**: one atomic snapshot load per lookup, no
//!   reader ever blocks on writer activity
//! - **Field Indexes**: longest-prefix IPv4 tries, augmented interval trees
//!   for port ranges and an advisory Bloom pre-filter narrow the priority
//!   walk
//! - **Hot Rule Updates**: writers build a successor snapshot and publish
//!   it with a single atomic swap; superseded snapshots are reclaimed once
//!   their last reader drops
//! - **Per-Rule Statistics**: relaxed atomic match counters that survive
//!   republication
//!
//! # Architecture
//!
//! ```text
//! classify(header) ─→ snapshot ─→ Bloom hint (advisory)
//!                        │
//!                        ├─→ src/dst prefix tries ──┐
//!                        ├─→ src/dst port trees  ───┼─→ candidate ∩
//!                        │                          │
//!                        └─→ priority walk over survivors ─→ first match
//!
//! add/modify/delete ─→ writer claim ─→ successor snapshot ─→ atomic swap
//! ```
//!
//! # Quick Start
//!
//! ```
//! use rust_classifier::{
//!     ActionList, Classifier, ClassifierConfig, PacketHeader, Rule, RuleFilter,
//! };
//!
//! let classifier = Classifier::new(ClassifierConfig::default())?;
//!
//! // Forward TCP traffic from 192.168.1.0/24
//! let filter = RuleFilter::any()
//!     .with_src_prefix("192.168.1.0/24".parse()?)
//!     .with_protocol(6);
//! classifier.add_rule(Rule::new(1, 100, filter, ActionList::forward(10)))?;
//!
//! let header = PacketHeader::new(0xC0A8_0165, 0x0808_0808, 33333, 80, 6);
//! let result = classifier.classify(&header);
//! assert_eq!(result.rule_id, Some(1));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Modules
//!
//! - [`config`]: engine configuration
//! - [`engine`]: classifier facade and snapshot protocol
//! - [`error`]: error types
//! - [`index`]: prefix tries, interval trees, Bloom pre-filter
//! - [`rules`]: rule types and the authoritative store

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod rules;

// Re-export commonly used types at the crate root
pub use config::ClassifierConfig;
pub use engine::{
    ClassificationResult, Classifier, ClassifierSnapshot, SnapshotStats, WriterClaim,
};
pub use error::{ClassifierError, ConfigError, IndexError, Result, RuleError};
pub use index::{BloomFilter, FieldIndexes, IntervalTree, PrefixTrie};
pub use rules::{
    Action, ActionList, Ipv4Prefix, PacketHeader, PortRange, Rule, RuleFilter, RuleId, RuleStats,
    RuleStore,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_crate_root_surface() {
        // The facade is reachable through the re-exports alone
        let engine = Classifier::new(ClassifierConfig::default()).unwrap();
        let result = engine.classify(&PacketHeader::new(1, 2, 3, 4, 6));
        assert!(!result.is_match());
    }
}
