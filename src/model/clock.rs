use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;

/// A sparse mapping from node id to a monotonically non-decreasing counter.
///
/// Missing entries are treated as zero (spec §3, "Vector-clock semantics").
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VectorClock {
    counters: HashMap<String, u64>,
}

/// The relationship between two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrdering {
    /// `self` strictly dominates `other`.
    Dominates,
    /// `other` strictly dominates `self`.
    Dominated,
    /// Identical on every node.
    Equal,
    /// Neither dominates — a conflict candidate.
    Concurrent,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node_id: &str) -> u64 {
        self.counters.get(node_id).copied().unwrap_or(0)
    }

    /// Advances the counter for `node_id` by one and returns the new value.
    pub fn increment(&mut self, node_id: &str) -> u64 {
        let entry = self.counters.entry(node_id.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counters.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Compares `self` against `other` per spec §3's strict-dominance rule:
    /// every node id present in either clock satisfies self[N] >= other[N],
    /// and at least one node satisfies self[N] > other[N].
    pub fn compare(&self, other: &VectorClock) -> ClockOrdering {
        let mut self_ahead = false;
        let mut other_ahead = false;

        for node in self.node_ids(other) {
            match self.get(&node).cmp(&other.get(&node)) {
                CmpOrdering::Greater => self_ahead = true,
                CmpOrdering::Less => other_ahead = true,
                CmpOrdering::Equal => {}
            }
        }

        match (self_ahead, other_ahead) {
            (false, false) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Dominates,
            (false, true) => ClockOrdering::Dominated,
            (true, true) => ClockOrdering::Concurrent,
        }
    }

    pub fn strictly_dominates(&self, other: &VectorClock) -> bool {
        matches!(self.compare(other), ClockOrdering::Dominates)
    }

    /// Merges `other` into `self` component-wise (max per node), allocating
    /// only for node ids not already tracked.
    pub fn merge(&mut self, other: &VectorClock) {
        for (node, value) in other.counters.iter() {
            let entry = self.counters.entry(node.clone()).or_insert(0);
            if *value > *entry {
                *entry = *value;
            }
        }
    }

    fn node_ids(&self, other: &VectorClock) -> std::collections::HashSet<String> {
        self.counters
            .keys()
            .chain(other.counters.keys())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_clocks_are_equal() {
        let a = VectorClock::new();
        let b = VectorClock::new();
        assert_eq!(a.compare(&b), ClockOrdering::Equal);
    }

    #[test]
    fn missing_entries_are_zero() {
        let mut a = VectorClock::new();
        a.increment("n1");
        let b = VectorClock::new();
        assert_eq!(a.compare(&b), ClockOrdering::Dominates);
        assert!(a.strictly_dominates(&b));
    }

    #[test]
    fn concurrent_when_neither_dominates() {
        let mut a = VectorClock::new();
        a.increment("n1");
        let mut b = VectorClock::new();
        b.increment("n2");
        assert_eq!(a.compare(&b), ClockOrdering::Concurrent);
        assert!(!a.strictly_dominates(&b));
        assert!(!b.strictly_dominates(&a));
    }

    #[test]
    fn merge_is_componentwise_max() {
        let mut a = VectorClock::new();
        a.increment("n1");
        a.increment("n1");
        let mut b = VectorClock::new();
        b.increment("n1");
        b.increment("n2");

        a.merge(&b);
        assert_eq!(a.get("n1"), 2);
        assert_eq!(a.get("n2"), 1);
    }

    #[test]
    fn s6_scenario_conflict_then_merge_equals_union() {
        // Writes to obj-6 by N1 and N2 concurrently.
        let mut n1 = VectorClock::new();
        n1.increment("N1");
        let mut n2 = VectorClock::new();
        n2.increment("N2");

        assert_eq!(n1.compare(&n2), ClockOrdering::Concurrent);

        let mut merged = n1.clone();
        merged.merge(&n2);
        assert_eq!(merged.get("N1"), 1);
        assert_eq!(merged.get("N2"), 1);
    }
}
