//! Rule domain: types and the authoritative store
//!
//! This module provides:
//! - Rule and filter types ([`Rule`], [`RuleFilter`], [`PortRange`],
//!   [`Ipv4Prefix`], [`Action`], [`ActionList`])
//! - The packet header view ([`PacketHeader`])
//! - The authoritative registry with its priority view ([`RuleStore`])
//!
//! # Example
//!
//! ```
//! use rust_classifier::rules::{ActionList, PortRange, Rule, RuleFilter};
//!
//! let filter = RuleFilter::any()
//!     .with_dst_ports(PortRange::new(80, 443).unwrap())
//!     .with_protocol(6);
//! let rule = Rule::new(7, 50, filter, ActionList::log("web"));
//! assert!(rule.enabled);
//! assert_eq!(rule.priority, 50);
//! ```

pub mod store;
pub mod types;

pub use store::RuleStore;
pub use types::{
    Action, ActionList, Ipv4Prefix, PacketHeader, PortRange, Rule, RuleFilter, RuleId, RuleStats,
};
