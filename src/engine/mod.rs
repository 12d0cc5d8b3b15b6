//! Classification engine surface
//!
//! The [`Classifier`] facade ties the rule store, the field indexes and the
//! Bloom pre-filter together behind a publish-on-write snapshot protocol:
//!
//! ```text
//! classify()  -> ArcSwap::load() -> ClassifierSnapshot
//!                      |            (lock-free read)
//!
//! add/modify/ -> writer claim -> build successor -> ArcSwap::store()
//! delete                         snapshot           (atomic publish)
//! ```
//!
//! Readers pin one snapshot per classification; writers serialize on the
//! claim and publish complete bundles, so a reader observes either the pre-
//! or post-state of any write, never a mixture.

pub mod classifier;
pub mod snapshot;

pub use classifier::{ClassificationResult, Classifier, WriterClaim};
pub use snapshot::{ClassifierSnapshot, SnapshotStats};
