//! Error types for rust-classifier
//!
//! This module defines the error hierarchy for the classification engine.
//! Errors are categorized by subsystem; write-path errors always leave the
//! published rule set in its pre-call state.

use thiserror::Error;

use crate::rules::RuleId;

/// Top-level error type for the classification engine
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Rule validation and rule-store errors
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    /// Field-index update errors
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// Engine configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClassifierError {
    /// Check if this error is recoverable (the operation can be retried
    /// after the caller corrects its input)
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Rule(e) => e.is_recoverable(),
            Self::Index(e) => e.is_recoverable(),
            Self::Config(_) => false,
        }
    }
}

/// Rule validation and rule-store errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    /// A rule with this ID is already registered
    #[error("Rule ID {0} already exists")]
    DuplicateId(RuleId),

    /// No rule with this ID is registered
    #[error("Rule ID {0} not found")]
    NotFound(RuleId),

    /// Invalid port range (start > end)
    #[error("Invalid port range: {start}-{end} (start must be <= end)")]
    InvalidPortRange {
        /// Start of the range
        start: u16,
        /// End of the range
        end: u16,
    },

    /// IPv4 prefix length out of range (must be 0..=32)
    #[error("Invalid prefix length: /{0} (must be 0..=32)")]
    InvalidPrefixLen(u8),

    /// Malformed IPv4 prefix string
    #[error("Invalid IPv4 prefix: {0}")]
    InvalidIpv4Prefix(String),

    /// The rule's (filter, priority) pair duplicates an existing rule
    ///
    /// Only produced when conflict detection is enabled in the engine
    /// configuration; the baseline policy is permissive.
    #[error("Rule {id} conflicts with existing rule {existing} (identical filter and priority)")]
    Conflict {
        /// ID of the rejected rule
        id: RuleId,
        /// ID of the already-registered conflicting rule
        existing: RuleId,
    },
}

impl RuleError {
    /// Rule errors indicate bad caller input; the operation can be retried
    /// with corrected input, but never succeeds as-is.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        false
    }

    /// Create an invalid-prefix error from a malformed prefix string
    pub fn invalid_prefix(s: impl Into<String>) -> Self {
        Self::InvalidIpv4Prefix(s.into())
    }
}

/// Field-index update errors
///
/// An index error during a write aborts the write before publication, so the
/// reader-visible state is unchanged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    /// Prefix trie insertion with a length beyond 32 bits
    #[error("Prefix length /{0} exceeds 32 bits")]
    PrefixLenOutOfRange(u8),

    /// Interval tree insertion with low > high
    #[error("Inverted interval: [{low}, {high}]")]
    InvertedRange {
        /// Low end of the rejected interval
        low: u16,
        /// High end of the rejected interval
        high: u16,
    },
}

impl IndexError {
    /// Index errors stem from invalid field values in a rule; not retryable
    /// without fixing the rule.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        false
    }
}

/// Engine configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Validation error (invalid values, inconsistent settings)
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl ConfigError {
    /// Config errors are not recoverable without user intervention
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        false
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }
}

/// Type alias for Result with `ClassifierError`
pub type Result<T> = std::result::Result<T, ClassifierError>;
