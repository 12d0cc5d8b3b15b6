//! Augmented AVL interval tree for port-range matching
//!
//! Maps a port value to all stored ranges containing it, and a query range
//! to all overlapping stored ranges. Nodes are ordered by `(low, high,
//! rule_id)` and augmented with `max_high`, the maximum `high` in the
//! subtree, which bounds the descent during stabbing queries.

use crate::error::IndexError;
use crate::rules::RuleId;

type Link = Option<Box<IntervalNode>>;

#[derive(Debug, Clone)]
struct IntervalNode {
    low: u16,
    high: u16,
    rule_id: RuleId,
    /// Maximum `high` in the subtree rooted here
    max_high: u16,
    height: u8,
    left: Link,
    right: Link,
}

impl IntervalNode {
    fn new(low: u16, high: u16, rule_id: RuleId) -> Box<Self> {
        Box::new(Self {
            low,
            high,
            rule_id,
            max_high: high,
            height: 1,
            left: None,
            right: None,
        })
    }

    const fn key(&self) -> (u16, u16, RuleId) {
        (self.low, self.high, self.rule_id)
    }
}

/// Self-balancing interval tree keyed by `(low, high, rule_id)`
///
/// # Examples
///
/// ```
/// use rust_classifier::index::IntervalTree;
///
/// let mut tree = IntervalTree::new();
/// tree.insert(80, 443, 1).unwrap();
/// tree.insert(1000, 2000, 2).unwrap();
///
/// assert_eq!(tree.query_point(100), vec![1]);
/// assert_eq!(tree.query_point(1500), vec![2]);
/// assert!(tree.query_point(500).is_empty());
///
/// // [400, 1200] overlaps both stored ranges
/// let mut hits = tree.query_range(400, 1200).unwrap();
/// hits.sort_unstable();
/// assert_eq!(hits, vec![1, 2]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct IntervalTree {
    root: Link,
    entries: usize,
}

impl IntervalTree {
    /// Create an empty tree
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored intervals
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
    }

    /// Check if no intervals are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Insert the interval `[low, high]` for `rule_id`
    ///
    /// Inserting an identical `(low, high, rule_id)` triple is idempotent.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::InvertedRange` if `low > high`.
    pub fn insert(&mut self, low: u16, high: u16, rule_id: RuleId) -> Result<(), IndexError> {
        if low > high {
            return Err(IndexError::InvertedRange { low, high });
        }
        if Self::insert_at(&mut self.root, low, high, rule_id) {
            self.entries += 1;
        }
        Ok(())
    }

    /// Remove the exact `(low, high, rule_id)` interval
    ///
    /// Returns `true` if the interval was present.
    pub fn remove(&mut self, low: u16, high: u16, rule_id: RuleId) -> bool {
        let removed = Self::remove_at(&mut self.root, (low, high, rule_id));
        if removed {
            self.entries -= 1;
        }
        removed
    }

    /// Check whether the exact `(low, high, rule_id)` interval is stored
    #[must_use]
    pub fn contains(&self, low: u16, high: u16, rule_id: RuleId) -> bool {
        let key = (low, high, rule_id);
        let mut link = &self.root;
        while let Some(node) = link {
            match key.cmp(&node.key()) {
                std::cmp::Ordering::Less => link = &node.left,
                std::cmp::Ordering::Greater => link = &node.right,
                std::cmp::Ordering::Equal => return true,
            }
        }
        false
    }

    /// All rule IDs whose interval contains the point `p`
    #[must_use]
    pub fn query_point(&self, p: u16) -> Vec<RuleId> {
        let mut out = Vec::new();
        Self::query_point_at(&self.root, p, &mut out);
        out
    }

    /// All rule IDs whose interval overlaps `[q_low, q_high]`
    ///
    /// # Errors
    ///
    /// Returns `IndexError::InvertedRange` if `q_low > q_high`.
    pub fn query_range(&self, q_low: u16, q_high: u16) -> Result<Vec<RuleId>, IndexError> {
        if q_low > q_high {
            return Err(IndexError::InvertedRange {
                low: q_low,
                high: q_high,
            });
        }
        let mut out = Vec::new();
        Self::query_range_at(&self.root, q_low, q_high, &mut out);
        Ok(out)
    }

    /// Every stored `(low, high, rule_id)` entry, in key order
    ///
    /// Intended for consistency checks and tests.
    #[must_use]
    pub fn entries(&self) -> Vec<(u16, u16, RuleId)> {
        let mut out = Vec::with_capacity(self.entries);
        Self::collect_entries(&self.root, &mut out);
        out
    }

    fn insert_at(link: &mut Link, low: u16, high: u16, rule_id: RuleId) -> bool {
        let Some(node) = link else {
            *link = Some(IntervalNode::new(low, high, rule_id));
            return true;
        };
        let inserted = match (low, high, rule_id).cmp(&node.key()) {
            std::cmp::Ordering::Less => Self::insert_at(&mut node.left, low, high, rule_id),
            std::cmp::Ordering::Greater => Self::insert_at(&mut node.right, low, high, rule_id),
            std::cmp::Ordering::Equal => false,
        };
        if inserted {
            Self::rebalance(link);
        }
        inserted
    }

    fn remove_at(link: &mut Link, key: (u16, u16, RuleId)) -> bool {
        let Some(node) = link else {
            return false;
        };
        let removed = match key.cmp(&node.key()) {
            std::cmp::Ordering::Less => Self::remove_at(&mut node.left, key),
            std::cmp::Ordering::Greater => Self::remove_at(&mut node.right, key),
            std::cmp::Ordering::Equal => {
                let mut node = link.take().expect("node matched above");
                match (node.left.take(), node.right.take()) {
                    (None, None) => {}
                    (Some(l), None) => *link = Some(l),
                    (None, Some(r)) => *link = Some(r),
                    (Some(l), Some(r)) => {
                        // Two children: replace with the in-order successor
                        // and delete it from the right subtree.
                        let mut right = Some(r);
                        let succ = Self::min_key(right.as_deref().expect("right subtree"));
                        Self::remove_at(&mut right, succ);
                        let mut replacement = IntervalNode::new(succ.0, succ.1, succ.2);
                        replacement.left = Some(l);
                        replacement.right = right;
                        *link = Some(replacement);
                    }
                }
                true
            }
        };
        if removed && link.is_some() {
            Self::rebalance(link);
        }
        removed
    }

    fn min_key(node: &IntervalNode) -> (u16, u16, RuleId) {
        let mut current = node;
        while let Some(left) = &current.left {
            current = left;
        }
        current.key()
    }

    fn query_point_at(link: &Link, p: u16, out: &mut Vec<RuleId>) {
        let Some(node) = link else { return };
        // Left subtree can only contain an interval covering p if its
        // max_high reaches p.
        if let Some(left) = &node.left {
            if left.max_high >= p {
                Self::query_point_at(&node.left, p, out);
            }
        }
        if node.low <= p && p <= node.high {
            out.push(node.rule_id);
        }
        // Intervals to the right start at or after node.low; they can only
        // cover p when p is at or past that boundary.
        if p >= node.low {
            Self::query_point_at(&node.right, p, out);
        }
    }

    fn query_range_at(link: &Link, q_low: u16, q_high: u16, out: &mut Vec<RuleId>) {
        let Some(node) = link else { return };
        if let Some(left) = &node.left {
            if left.max_high >= q_low {
                Self::query_range_at(&node.left, q_low, q_high, out);
            }
        }
        if q_low <= node.high && q_high >= node.low {
            out.push(node.rule_id);
        }
        if q_high >= node.low {
            Self::query_range_at(&node.right, q_low, q_high, out);
        }
    }

    fn collect_entries(link: &Link, out: &mut Vec<(u16, u16, RuleId)>) {
        let Some(node) = link else { return };
        Self::collect_entries(&node.left, out);
        out.push(node.key());
        Self::collect_entries(&node.right, out);
    }

    fn height(link: &Link) -> u8 {
        link.as_ref().map_or(0, |n| n.height)
    }

    fn balance_factor(node: &IntervalNode) -> i16 {
        i16::from(Self::height(&node.left)) - i16::from(Self::height(&node.right))
    }

    /// Recompute `height` and `max_high` from the children
    fn update(node: &mut IntervalNode) {
        node.height = 1 + Self::height(&node.left).max(Self::height(&node.right));
        let mut max_high = node.high;
        if let Some(left) = &node.left {
            max_high = max_high.max(left.max_high);
        }
        if let Some(right) = &node.right {
            max_high = max_high.max(right.max_high);
        }
        node.max_high = max_high;
    }

    fn rebalance(link: &mut Link) {
        let Some(node) = link else { return };
        Self::update(node);
        let balance = Self::balance_factor(node);
        if balance > 1 {
            let left = node.left.as_deref().expect("left-heavy node has left child");
            if Self::balance_factor(left) < 0 {
                Self::rotate_left(&mut node.left);
            }
            Self::rotate_right(link);
        } else if balance < -1 {
            let right = node
                .right
                .as_deref()
                .expect("right-heavy node has right child");
            if Self::balance_factor(right) > 0 {
                Self::rotate_right(&mut node.right);
            }
            Self::rotate_left(link);
        }
    }

    fn rotate_right(link: &mut Link) {
        let mut y = link.take().expect("rotation root");
        let mut x = y.left.take().expect("rotate_right requires a left child");
        y.left = x.right.take();
        // The demoted node must be recomputed before the promoted one reads
        // its height and max_high.
        Self::update(&mut y);
        x.right = Some(y);
        Self::update(&mut x);
        *link = Some(x);
    }

    fn rotate_left(link: &mut Link) {
        let mut x = link.take().expect("rotation root");
        let mut y = x.right.take().expect("rotate_left requires a right child");
        x.right = y.left.take();
        Self::update(&mut x);
        y.left = Some(x);
        Self::update(&mut y);
        *link = Some(y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with(entries: &[(u16, u16, RuleId)]) -> IntervalTree {
        let mut tree = IntervalTree::new();
        for (low, high, id) in entries {
            tree.insert(*low, *high, *id).unwrap();
        }
        tree
    }

    /// Reference check against a linear scan
    fn assert_point_query(tree: &IntervalTree, entries: &[(u16, u16, RuleId)], p: u16) {
        let mut got = tree.query_point(p);
        got.sort_unstable();
        let mut want: Vec<RuleId> = entries
            .iter()
            .filter(|(low, high, _)| *low <= p && p <= *high)
            .map(|(_, _, id)| *id)
            .collect();
        want.sort_unstable();
        assert_eq!(got, want, "point query {p}");
    }

    #[test]
    fn test_insert_and_point_query() {
        let entries = [(80, 443, 1), (1000, 2000, 2), (0, 65535, 3), (443, 443, 4)];
        let tree = tree_with(&entries);
        assert_eq!(tree.len(), 4);

        for p in [0, 79, 80, 100, 443, 444, 1000, 1500, 2000, 2001, 65535] {
            assert_point_query(&tree, &entries, p);
        }
    }

    #[test]
    fn test_full_range_matches_every_port() {
        let tree = tree_with(&[(0, 65535, 1)]);
        assert_eq!(tree.query_point(0), vec![1]);
        assert_eq!(tree.query_point(32768), vec![1]);
        assert_eq!(tree.query_point(65535), vec![1]);
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut tree = IntervalTree::new();
        assert_eq!(
            tree.insert(443, 80, 1),
            Err(IndexError::InvertedRange { low: 443, high: 80 })
        );
        assert!(tree.query_range(443, 80).is_err());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_duplicate_insert_is_idempotent() {
        let mut tree = IntervalTree::new();
        tree.insert(80, 443, 1).unwrap();
        tree.insert(80, 443, 1).unwrap();
        assert_eq!(tree.len(), 1);

        // Same range under a different rule is a distinct entry
        tree.insert(80, 443, 2).unwrap();
        assert_eq!(tree.len(), 2);
        let mut hits = tree.query_point(100);
        hits.sort_unstable();
        assert_eq!(hits, vec![1, 2]);
    }

    #[test]
    fn test_range_query_overlap() {
        let entries = [(10, 20, 1), (15, 30, 2), (40, 50, 3)];
        let tree = tree_with(&entries);

        let mut hits = tree.query_range(18, 42).unwrap();
        hits.sort_unstable();
        assert_eq!(hits, vec![1, 2, 3]);

        let hits = tree.query_range(31, 39).unwrap();
        assert!(hits.is_empty());

        // Touching boundaries count as overlap
        let hits = tree.query_range(20, 20).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_remove_requires_exact_match() {
        let mut tree = tree_with(&[(80, 443, 1), (80, 443, 2)]);

        // Range matches but rule id does not
        assert!(!tree.remove(80, 443, 3));
        assert_eq!(tree.len(), 2);

        assert!(tree.remove(80, 443, 1));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.query_point(100), vec![2]);

        // Already gone
        assert!(!tree.remove(80, 443, 1));
    }

    #[test]
    fn test_remove_two_child_node() {
        // Build a shape where the removed node has two children
        let entries = [
            (50, 60, 1),
            (20, 30, 2),
            (80, 90, 3),
            (10, 15, 4),
            (40, 45, 5),
            (70, 75, 6),
            (95, 99, 7),
        ];
        let mut tree = tree_with(&entries);

        assert!(tree.remove(50, 60, 1));
        assert_eq!(tree.len(), 6);

        let remaining: Vec<_> = entries[1..].to_vec();
        for p in [10, 12, 22, 41, 55, 72, 85, 97, 0, 100] {
            assert_point_query(&tree, &remaining, p);
        }
    }

    #[test]
    fn test_sequential_inserts_stay_balanced() {
        // Ascending inserts would degenerate an unbalanced BST; the AVL
        // rotations must keep queries correct (and the height bounded).
        let entries: Vec<(u16, u16, RuleId)> =
            (0..256u16).map(|i| (i * 10, i * 10 + 5, u32::from(i))).collect();
        let tree = tree_with(&entries);
        assert_eq!(tree.len(), 256);

        for p in [0, 5, 6, 1234, 1235, 2550, 2555] {
            assert_point_query(&tree, &entries, p);
        }

        // AVL height bound: 1.44 * log2(n + 2) ~= 12 for n = 256
        fn depth(link: &Link) -> u8 {
            link.as_ref()
                .map_or(0, |n| 1 + depth(&n.left).max(depth(&n.right)))
        }
        assert!(depth(&tree.root) <= 12, "tree is not balanced");
    }

    #[test]
    fn test_max_high_consistent_after_churn() {
        fn check_max_high(link: &Link) -> Option<u16> {
            let node = link.as_ref()?;
            let mut expected = node.high;
            if let Some(l) = check_max_high(&node.left) {
                expected = expected.max(l);
            }
            if let Some(r) = check_max_high(&node.right) {
                expected = expected.max(r);
            }
            assert_eq!(node.max_high, expected, "stale max_high");
            Some(expected)
        }

        let mut tree = IntervalTree::new();
        let mut live: Vec<(u16, u16, RuleId)> = Vec::new();
        // Deterministic churn: interleave inserts and removals
        for i in 0..200u16 {
            let low = (i * 37) % 60000;
            let high = low + (i % 100);
            tree.insert(low, high, u32::from(i)).unwrap();
            live.push((low, high, u32::from(i)));
            if i % 3 == 0 {
                let victim = live.remove(usize::from(i) % live.len());
                assert!(tree.remove(victim.0, victim.1, victim.2));
            }
            check_max_high(&tree.root);
        }
        assert_eq!(tree.len(), live.len());
        for p in [0, 100, 5000, 30000, 59999] {
            assert_point_query(&tree, &live, p);
        }
    }

    #[test]
    fn test_entries_in_key_order() {
        let tree = tree_with(&[(30, 40, 2), (10, 20, 1), (30, 35, 3), (30, 40, 1)]);
        assert_eq!(
            tree.entries(),
            vec![(10, 20, 1), (30, 35, 3), (30, 40, 1), (30, 40, 2)]
        );
    }

    #[test]
    fn test_clone_independence() {
        let mut tree = tree_with(&[(80, 443, 1)]);
        let snapshot = tree.clone();
        tree.remove(80, 443, 1);
        tree.insert(1, 2, 9).unwrap();

        assert!(snapshot.contains(80, 443, 1));
        assert!(!snapshot.contains(1, 2, 9));
    }
}
