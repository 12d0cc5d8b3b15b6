//! Core types for the classification engine
//!
//! This module defines the fundamental types shared by the rule store, the
//! field indexes and the classifier facade:
//! - [`PortRange`]: an inclusive port interval for range-based matching
//! - [`Ipv4Prefix`]: an IPv4 address prefix for longest-prefix matching
//! - [`RuleFilter`]: the per-field match conditions of a rule
//! - [`Action`] / [`ActionList`]: what to do with a matching packet
//! - [`Rule`]: a classification rule with priority, filter, actions and
//!   per-rule statistics
//! - [`PacketHeader`]: the header fields a classification inspects

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::RuleError;

/// Unique, non-negative rule identifier
pub type RuleId = u32;

/// An inclusive range of ports for range-based matching
///
/// Supports both single ports and ranges (e.g., "80" or "80-443").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRange {
    /// Start of the range (inclusive)
    pub start: u16,
    /// End of the range (inclusive)
    pub end: u16,
}

impl PortRange {
    /// Create a new port range
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidPortRange` if start > end.
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_classifier::rules::PortRange;
    ///
    /// let range = PortRange::new(80, 443).unwrap();
    /// assert!(range.contains(80));
    /// assert!(range.contains(443));
    /// assert!(!range.contains(8080));
    /// ```
    pub fn new(start: u16, end: u16) -> Result<Self, RuleError> {
        if start > end {
            return Err(RuleError::InvalidPortRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Create a range covering a single port
    #[must_use]
    pub const fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    /// The full 0..=65535 range
    #[must_use]
    pub const fn any() -> Self {
        Self {
            start: 0,
            end: u16::MAX,
        }
    }

    /// Check if a port is within this range
    #[must_use]
    pub const fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    /// Check if this range represents a single port
    #[must_use]
    pub const fn is_single(&self) -> bool {
        self.start == self.end
    }

    /// Parse a port range from a string
    ///
    /// Accepts a single port ("80") or a range ("80-443").
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidPortRange` for inverted ranges or
    /// malformed input.
    pub fn parse(s: &str) -> Result<Self, RuleError> {
        let s = s.trim();
        if let Some((start_str, end_str)) = s.split_once('-') {
            let start = start_str
                .trim()
                .parse::<u16>()
                .map_err(|_| RuleError::InvalidPortRange { start: 0, end: 0 })?;
            let end = end_str
                .trim()
                .parse::<u16>()
                .map_err(|_| RuleError::InvalidPortRange { start: 0, end: 0 })?;
            Self::new(start, end)
        } else {
            let port = s
                .parse::<u16>()
                .map_err(|_| RuleError::InvalidPortRange { start: 0, end: 0 })?;
            Ok(Self::single(port))
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl Serialize for PortRange {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PortRange {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// An IPv4 address prefix (address plus length 0..=32)
///
/// The address is normalized on construction: host bits below the prefix
/// length are cleared. A `/0` prefix covers every address; `/32` covers
/// exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Prefix {
    addr: Ipv4Addr,
    len: u8,
}

impl Ipv4Prefix {
    /// Create a new prefix, normalizing host bits to zero
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidPrefixLen` if `len > 32`.
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_classifier::rules::Ipv4Prefix;
    /// use std::net::Ipv4Addr;
    ///
    /// let prefix = Ipv4Prefix::new(Ipv4Addr::new(192, 168, 1, 77), 24).unwrap();
    /// assert_eq!(prefix.addr(), Ipv4Addr::new(192, 168, 1, 0));
    /// assert!(prefix.covers(Ipv4Addr::new(192, 168, 1, 200)));
    /// assert!(!prefix.covers(Ipv4Addr::new(192, 168, 2, 1)));
    /// ```
    pub fn new(addr: Ipv4Addr, len: u8) -> Result<Self, RuleError> {
        if len > 32 {
            return Err(RuleError::InvalidPrefixLen(len));
        }
        Ok(Self {
            addr: Ipv4Addr::from(mask_bits(u32::from(addr), len)),
            len,
        })
    }

    /// The network address of this prefix (host bits zeroed)
    #[must_use]
    pub const fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    /// The prefix length in bits
    #[must_use]
    pub const fn prefix_len(&self) -> u8 {
        self.len
    }

    /// The network address as a raw big-endian `u32`
    #[must_use]
    pub fn bits(&self) -> u32 {
        u32::from(self.addr)
    }

    /// Check whether this prefix covers the given address
    #[must_use]
    pub fn covers(&self, addr: Ipv4Addr) -> bool {
        mask_bits(u32::from(addr), self.len) == self.bits()
    }

    /// Check whether this prefix covers the given raw address
    #[must_use]
    pub fn covers_bits(&self, addr: u32) -> bool {
        mask_bits(addr, self.len) == self.bits()
    }
}

/// Clear the host bits of `addr` below prefix length `len`
const fn mask_bits(addr: u32, len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        addr & (u32::MAX << (32 - len))
    }
}

impl FromStr for Ipv4Prefix {
    type Err = RuleError;

    /// Parse an `"a.b.c.d/len"` prefix string
    ///
    /// A bare address (no `/len`) is accepted as a `/32` host prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.contains('/') {
            let net = s
                .parse::<ipnet::Ipv4Net>()
                .map_err(|_| RuleError::invalid_prefix(s))?;
            Self::new(net.addr(), net.prefix_len())
        } else {
            let addr = s
                .parse::<Ipv4Addr>()
                .map_err(|_| RuleError::invalid_prefix(s))?;
            Self::new(addr, 32)
        }
    }
}

impl fmt::Display for Ipv4Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

impl Serialize for Ipv4Prefix {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Ipv4Prefix {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Per-field match conditions of a rule
///
/// Every `None` field is a wildcard and matches any value. The raw-value
/// constructors honor the legacy sentinels (`(0, 0)` port pair and protocol
/// `0` mean "any").
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleFilter {
    /// Source IPv4 prefix constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_prefix: Option<Ipv4Prefix>,

    /// Destination IPv4 prefix constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_prefix: Option<Ipv4Prefix>,

    /// Source port range constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_ports: Option<PortRange>,

    /// Destination port range constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_ports: Option<PortRange>,

    /// Exact protocol constraint (e.g. 6 = TCP, 17 = UDP)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<u8>,
}

impl RuleFilter {
    /// Create a filter that matches every packet
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Set the source prefix constraint
    #[must_use]
    pub const fn with_src_prefix(mut self, prefix: Ipv4Prefix) -> Self {
        self.src_prefix = Some(prefix);
        self
    }

    /// Set the destination prefix constraint
    #[must_use]
    pub const fn with_dst_prefix(mut self, prefix: Ipv4Prefix) -> Self {
        self.dst_prefix = Some(prefix);
        self
    }

    /// Set the source port range constraint
    #[must_use]
    pub const fn with_src_ports(mut self, range: PortRange) -> Self {
        self.src_ports = Some(range);
        self
    }

    /// Set the destination port range constraint
    #[must_use]
    pub const fn with_dst_ports(mut self, range: PortRange) -> Self {
        self.dst_ports = Some(range);
        self
    }

    /// Set the protocol constraint
    ///
    /// Protocol `0` is the legacy wildcard sentinel and clears the
    /// constraint.
    #[must_use]
    pub fn with_protocol(mut self, protocol: u8) -> Self {
        self.protocol = if protocol == 0 { None } else { Some(protocol) };
        self
    }

    /// Build a filter from raw field values
    ///
    /// Honors the legacy encodings: a `(0, 0)` port pair means "any port"
    /// and protocol `0` means "any protocol".
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidPortRange` if a set port pair has
    /// low > high.
    pub fn from_raw(
        src_prefix: Option<Ipv4Prefix>,
        dst_prefix: Option<Ipv4Prefix>,
        src_ports: (u16, u16),
        dst_ports: (u16, u16),
        protocol: u8,
    ) -> Result<Self, RuleError> {
        let parse_ports = |(lo, hi): (u16, u16)| -> Result<Option<PortRange>, RuleError> {
            if lo == 0 && hi == 0 {
                Ok(None)
            } else {
                PortRange::new(lo, hi).map(Some)
            }
        };
        Ok(Self {
            src_prefix,
            dst_prefix,
            src_ports: parse_ports(src_ports)?,
            dst_ports: parse_ports(dst_ports)?,
            protocol: if protocol == 0 { None } else { Some(protocol) },
        })
    }

    /// Check whether every field is a wildcard
    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        self.src_prefix.is_none()
            && self.dst_prefix.is_none()
            && self.src_ports.is_none()
            && self.dst_ports.is_none()
            && self.protocol.is_none()
    }

    /// The full authoritative match predicate
    ///
    /// Checks every constrained field against the header. The field indexes
    /// only narrow the candidate set; this predicate is the final word on
    /// whether a rule matches a packet.
    #[must_use]
    pub fn matches(&self, header: &PacketHeader) -> bool {
        if let Some(proto) = self.protocol {
            if proto != header.protocol {
                return false;
            }
        }
        if let Some(range) = &self.src_ports {
            if !range.contains(header.src_port) {
                return false;
            }
        }
        if let Some(range) = &self.dst_ports {
            if !range.contains(header.dst_port) {
                return false;
            }
        }
        if let Some(prefix) = &self.src_prefix {
            if !prefix.covers_bits(header.src_ip) {
                return false;
            }
        }
        if let Some(prefix) = &self.dst_prefix {
            if !prefix.covers_bits(header.dst_ip) {
                return false;
            }
        }
        true
    }

    /// Canonical byte encoding of this filter, used as the Bloom pre-filter
    /// fingerprint
    ///
    /// Each field contributes a presence tag followed by its value bytes, so
    /// distinct filters produce distinct encodings.
    #[must_use]
    pub fn digest(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(18);
        match &self.src_prefix {
            Some(p) => {
                out.push(1);
                out.extend_from_slice(&p.bits().to_be_bytes());
                out.push(p.prefix_len());
            }
            None => out.push(0),
        }
        match &self.dst_prefix {
            Some(p) => {
                out.push(1);
                out.extend_from_slice(&p.bits().to_be_bytes());
                out.push(p.prefix_len());
            }
            None => out.push(0),
        }
        match &self.src_ports {
            Some(r) => {
                out.push(1);
                out.extend_from_slice(&r.start.to_be_bytes());
                out.extend_from_slice(&r.end.to_be_bytes());
            }
            None => out.push(0),
        }
        match &self.dst_ports {
            Some(r) => {
                out.push(1);
                out.extend_from_slice(&r.start.to_be_bytes());
                out.extend_from_slice(&r.end.to_be_bytes());
            }
            None => out.push(0),
        }
        match self.protocol {
            Some(p) => {
                out.push(1);
                out.push(p);
            }
            None => out.push(0),
        }
        out
    }
}

impl fmt::Display for RuleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map_or_else(|| "any".to_string(), T::to_string)
        }
        write!(
            f,
            "src={} dst={} sport={} dport={} proto={}",
            opt(&self.src_prefix),
            opt(&self.dst_prefix),
            opt(&self.src_ports),
            opt(&self.dst_ports),
            opt(&self.protocol),
        )
    }
}

/// A single packet-handling action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Forward to the given next hop
    Forward {
        /// Next-hop identifier
        next_hop: u32,
    },
    /// Drop the packet
    Drop,
    /// Log the packet under the given identifier
    Log {
        /// Log stream identifier
        identifier: String,
    },
    /// Mirror the packet to the given destination
    Mirror {
        /// Mirror destination identifier
        dest: u32,
    },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward { next_hop } => write!(f, "forward(next_hop={next_hop})"),
            Self::Drop => write!(f, "drop"),
            Self::Log { identifier } => write!(f, "log({identifier})"),
            Self::Mirror { dest } => write!(f, "mirror(dest={dest})"),
        }
    }
}

/// The action list attached to a rule: a primary action plus an optional
/// secondary one (e.g. forward and mirror)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionList {
    /// The primary action
    pub primary: Action,

    /// Optional secondary action applied alongside the primary one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<Action>,
}

impl ActionList {
    /// Create an action list with only a primary action
    #[must_use]
    pub const fn new(primary: Action) -> Self {
        Self {
            primary,
            secondary: None,
        }
    }

    /// Shorthand for a forward action
    #[must_use]
    pub const fn forward(next_hop: u32) -> Self {
        Self::new(Action::Forward { next_hop })
    }

    /// Shorthand for a drop action
    #[must_use]
    pub const fn drop() -> Self {
        Self::new(Action::Drop)
    }

    /// Shorthand for a log action
    #[must_use]
    pub fn log(identifier: impl Into<String>) -> Self {
        Self::new(Action::Log {
            identifier: identifier.into(),
        })
    }

    /// Shorthand for a mirror action
    #[must_use]
    pub const fn mirror(dest: u32) -> Self {
        Self::new(Action::Mirror { dest })
    }

    /// Attach a secondary action
    #[must_use]
    pub fn with_secondary(mut self, action: Action) -> Self {
        self.secondary = Some(action);
        self
    }
}

impl Default for ActionList {
    fn default() -> Self {
        Self::new(Action::Drop)
    }
}

impl fmt::Display for ActionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        if let Some(secondary) = &self.secondary {
            write!(f, "+{secondary}")?;
        }
        Ok(())
    }
}

/// Per-rule match statistics
///
/// Counters are relaxed atomics so the classification hot path can update
/// them without touching the writer claim. A reader observing a counter sees
/// some value in its monotone history.
#[derive(Debug, Default)]
pub struct RuleStats {
    match_count: AtomicU64,
    last_match_secs: AtomicU64,
}

impl RuleStats {
    /// Record a match at the given UNIX timestamp (seconds)
    pub fn record_match(&self, timestamp_secs: u64) {
        self.match_count.fetch_add(1, Ordering::Relaxed);
        self.last_match_secs.store(timestamp_secs, Ordering::Relaxed);
    }

    /// Number of matches since the last reset
    #[must_use]
    pub fn match_count(&self) -> u64 {
        self.match_count.load(Ordering::Relaxed)
    }

    /// UNIX timestamp (seconds) of the most recent match, 0 if none
    #[must_use]
    pub fn last_match_secs(&self) -> u64 {
        self.last_match_secs.load(Ordering::Relaxed)
    }

    /// Reset both counters to zero
    pub fn reset(&self) {
        self.match_count.store(0, Ordering::Relaxed);
        self.last_match_secs.store(0, Ordering::Relaxed);
    }

    /// Copy the current counter values from another stats block
    ///
    /// Used by rule modification to carry statistics over to the replacement
    /// rule.
    pub fn copy_from(&self, other: &Self) {
        self.match_count
            .store(other.match_count(), Ordering::Relaxed);
        self.last_match_secs
            .store(other.last_match_secs(), Ordering::Relaxed);
    }
}

impl Clone for RuleStats {
    fn clone(&self) -> Self {
        Self {
            match_count: AtomicU64::new(self.match_count()),
            last_match_secs: AtomicU64::new(self.last_match_secs()),
        }
    }
}

/// A classification rule
///
/// Rules are matched against packet headers in priority order (higher
/// priority wins, ties broken by ascending ID). Statistics live in atomics
/// shared across snapshot republications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Unique identifier for this rule
    pub id: RuleId,

    /// Priority (higher values win)
    #[serde(default)]
    pub priority: i32,

    /// Whether this rule participates in classification
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-field match conditions
    #[serde(default)]
    pub filter: RuleFilter,

    /// Actions for matching packets
    #[serde(default)]
    pub actions: ActionList,

    /// Match statistics (not serialized)
    #[serde(skip)]
    stats: RuleStats,
}

impl Rule {
    /// Create a new enabled rule
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_classifier::rules::{ActionList, Rule, RuleFilter};
    ///
    /// let rule = Rule::new(1, 100, RuleFilter::any(), ActionList::forward(10));
    /// assert_eq!(rule.id, 1);
    /// assert!(rule.enabled);
    /// assert_eq!(rule.match_count(), 0);
    /// ```
    #[must_use]
    pub fn new(id: RuleId, priority: i32, filter: RuleFilter, actions: ActionList) -> Self {
        Self {
            id,
            priority,
            enabled: true,
            filter,
            actions,
            stats: RuleStats::default(),
        }
    }

    /// Set the priority for this rule
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the enabled state for this rule
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Access the statistics block
    #[must_use]
    pub fn stats(&self) -> &RuleStats {
        &self.stats
    }

    /// Number of matches since the last reset
    #[must_use]
    pub fn match_count(&self) -> u64 {
        self.stats.match_count()
    }

    /// UNIX timestamp (seconds) of the most recent match, 0 if none
    #[must_use]
    pub fn last_match_secs(&self) -> u64 {
        self.stats.last_match_secs()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rule {} prio={} enabled={} [{}] -> {}",
            self.id, self.priority, self.enabled, self.filter, self.actions
        )
    }
}

/// The packet header fields inspected by a classification
///
/// Addresses are raw big-endian `u32` values; VLAN and ToS fields do not
/// participate in the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PacketHeader {
    /// Source IPv4 address
    pub src_ip: u32,
    /// Destination IPv4 address
    pub dst_ip: u32,
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
    /// IP protocol number (6 = TCP, 17 = UDP)
    pub protocol: u8,
}

impl PacketHeader {
    /// Create a packet header from raw field values
    #[must_use]
    pub const fn new(src_ip: u32, dst_ip: u32, src_port: u16, dst_port: u16, protocol: u8) -> Self {
        Self {
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            protocol,
        }
    }

    /// Canonical byte encoding of this header, used for the Bloom pre-filter
    /// probe
    #[must_use]
    pub fn digest(&self) -> [u8; 13] {
        let mut out = [0u8; 13];
        out[0..4].copy_from_slice(&self.src_ip.to_be_bytes());
        out[4..8].copy_from_slice(&self.dst_ip.to_be_bytes());
        out[8..10].copy_from_slice(&self.src_port.to_be_bytes());
        out[10..12].copy_from_slice(&self.dst_port.to_be_bytes());
        out[12] = self.protocol;
        out
    }
}

impl fmt::Display for PacketHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} proto {}",
            Ipv4Addr::from(self.src_ip),
            self.src_port,
            Ipv4Addr::from(self.dst_ip),
            self.dst_port,
            self.protocol
        )
    }
}

// Default value helper for serde
const fn default_true() -> bool {
    true
}
