//! Engine configuration
//!
//! Construction-time settings for the classifier. The structure derives
//! serde so deployments can load it from JSON alongside their other
//! service configuration; every field has a default and [`ClassifierConfig::validate`]
//! is called by `Classifier::new` before anything is built.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Construction-time configuration of a [`crate::Classifier`]
///
/// # Examples
///
/// ```
/// use rust_classifier::ClassifierConfig;
///
/// let config = ClassifierConfig::default();
/// assert!(config.enable_bloom_pre_filter);
/// assert!(config.validate().is_ok());
///
/// let config: ClassifierConfig = serde_json::from_str(
///     r#"{"enable_bloom_pre_filter": false, "initial_rule_capacity": 4096}"#,
/// )
/// .unwrap();
/// assert!(!config.enable_bloom_pre_filter);
/// assert_eq!(config.initial_rule_capacity, 4096);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Carry a Bloom pre-filter over rule-filter fingerprints
    ///
    /// The pre-filter is advisory: a negative never short-circuits the
    /// authoritative match.
    #[serde(default = "default_true")]
    pub enable_bloom_pre_filter: bool,

    /// Expected number of rule fingerprints the Bloom filter is sized for
    #[serde(default = "default_bloom_items")]
    pub bloom_expected_items: u64,

    /// Target false-positive rate of the Bloom filter (exclusive 0..1)
    #[serde(default = "default_bloom_fp_rate")]
    pub bloom_fp_rate: f64,

    /// Reject rules whose `(filter, priority)` pair exactly duplicates a
    /// registered rule
    ///
    /// The baseline policy is permissive (no conflict detection).
    #[serde(default)]
    pub reject_duplicate_filters: bool,

    /// Capacity hint for the rule map and priority view
    #[serde(default = "default_rule_capacity")]
    pub initial_rule_capacity: usize,

    /// Preferred NUMA node for engine memory, `-1` for unspecified
    ///
    /// Advisory; recorded for deployments that pin worker threads, not
    /// acted on by the engine itself.
    #[serde(default = "default_numa_node")]
    pub numa_node: i32,
}

impl ClassifierConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` when the Bloom settings are
    /// inconsistent or out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enable_bloom_pre_filter {
            if self.bloom_expected_items == 0 {
                return Err(ConfigError::validation(
                    "bloom_expected_items must be positive when the Bloom pre-filter is enabled",
                ));
            }
            if !(self.bloom_fp_rate > 0.0 && self.bloom_fp_rate < 1.0) {
                return Err(ConfigError::validation(format!(
                    "bloom_fp_rate must be in (0, 1), got {}",
                    self.bloom_fp_rate
                )));
            }
        }
        if self.numa_node < -1 {
            return Err(ConfigError::validation(format!(
                "numa_node must be -1 (unspecified) or a node index, got {}",
                self.numa_node
            )));
        }
        Ok(())
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enable_bloom_pre_filter: true,
            bloom_expected_items: default_bloom_items(),
            bloom_fp_rate: default_bloom_fp_rate(),
            reject_duplicate_filters: false,
            initial_rule_capacity: default_rule_capacity(),
            numa_node: default_numa_node(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_bloom_items() -> u64 {
    10_000
}

const fn default_bloom_fp_rate() -> f64 {
    0.01
}

const fn default_rule_capacity() -> usize {
    1024
}

const fn default_numa_node() -> i32 {
    -1
}
