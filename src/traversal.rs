//! Upstream traversal.
//!
//! Collects the connected upstream closure of an outlet and orders it so
//! that every contributor precedes the node it drains into.
//!
//! ## Algorithm
//!
//! 1. Deduplicate edges and build node -> direct upstream contributors
//! 2. Breadth-first walk from the outlet over that map to collect the closure
//! 3. Kahn's algorithm over the closure: a node is emitted once all of its
//!    contributors have been emitted (headwaters first, outlet last)
//! 4. Nodes left unemitted mean the data contains a cycle
//!
//! Siblings that become ready together are emitted in ascending `NodeId`
//! order. Any topological order is equally valid; callers must not rely on
//! the sibling order.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, VecDeque};

use crate::canonical::canonical_hash_hex;
use crate::network::Subnetwork;
use crate::types::NodeId;

/// Error type for traversal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraversalError {
    /// The upstream closure contains a cycle.
    #[error("cycle detected upstream of {outlet}: {unresolved} node(s) never became ready")]
    CycleDetected {
        /// Outlet of the traversal.
        outlet: NodeId,
        /// Number of nodes caught in or behind the cycle.
        unresolved: usize,
    },
}

/// Ordered upstream closure of an outlet.
///
/// Invariants: no duplicates; every contributor of a node in the result is
/// also in the result and appears before it; the outlet is last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalResult {
    outlet: NodeId,
    ids: Vec<NodeId>,
}

impl TraversalResult {
    /// The outlet the traversal started from.
    pub fn outlet(&self) -> &NodeId {
        &self.outlet
    }

    /// Ids in flow order (upstream first).
    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }

    /// Ids as a set, for membership tests.
    pub fn id_set(&self) -> BTreeSet<NodeId> {
        self.ids.iter().cloned().collect()
    }

    /// Number of ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True if there are no ids.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Drop a trailing junction marker before the ids are used as a filter.
    ///
    /// A lone junction marker is kept so a single-feature query stays
    /// non-empty.
    pub fn trim_junction(mut self, convention: &JunctionConvention) -> Self {
        if self.ids.len() > 1 && self.ids.last().is_some_and(|id| convention.is_junction(id)) {
            let trimmed = self.ids.pop();
            tracing::debug!(junction = ?trimmed, "trimmed trailing junction marker");
        }
        self
    }

    /// Deterministic fingerprint of the outlet and ordered ids (xxh64 hex).
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(&(&self.outlet, &self.ids))
    }
}

/// Naming convention that identifies junction-only marker nodes.
#[derive(Debug, Clone)]
pub struct JunctionConvention {
    pattern: Regex,
}

impl JunctionConvention {
    /// Default pattern: terminal nexus ids (`tnx-...`).
    pub const DEFAULT_PATTERN: &'static str = "^tnx-";

    /// Build a convention from a regular expression.
    pub fn new(pattern: &str) -> Result<Self, regex_lite::Error> {
        Ok(Self { pattern: Regex::new(pattern)? })
    }

    /// True if `id` names a junction marker.
    pub fn is_junction(&self, id: &NodeId) -> bool {
        self.pattern.is_match(id.as_str())
    }

    /// The pattern text.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

impl Default for JunctionConvention {
    fn default() -> Self {
        Self { pattern: Regex::new(Self::DEFAULT_PATTERN).expect("default junction pattern is valid") }
    }
}

/// Compute the ordered upstream closure of `outlet` within `network`.
///
/// An outlet that no edge references yields a single-element result.
pub fn traverse(network: &Subnetwork, outlet: &NodeId) -> Result<TraversalResult, TraversalError> {
    let upstream = network.upstream_map();

    // Closure: everything reachable by following `toid` backward.
    let mut closure: BTreeSet<&NodeId> = BTreeSet::new();
    let mut queue: VecDeque<&NodeId> = VecDeque::new();
    closure.insert(outlet);
    queue.push_back(outlet);

    while let Some(node) = queue.pop_front() {
        if let Some(contributors) = upstream.get(node) {
            for &c in contributors {
                if closure.insert(c) {
                    queue.push_back(c);
                }
            }
        }
    }

    // Pending contributor counts and the downstream neighbour of each node,
    // both restricted to the closure.
    let mut pending: BTreeMap<&NodeId, usize> = BTreeMap::new();
    let mut downstream: BTreeMap<&NodeId, Vec<&NodeId>> = BTreeMap::new();
    for &node in &closure {
        let contributors = upstream.get(node);
        pending.insert(node, contributors.map_or(0, |c| c.len()));
        for &c in contributors.into_iter().flatten() {
            downstream.entry(c).or_default().push(node);
        }
    }

    let mut ready: BinaryHeap<Reverse<&NodeId>> = pending
        .iter()
        .filter(|&(_, &n)| n == 0)
        .map(|(&node, _)| Reverse(node))
        .collect();

    let mut ids = Vec::with_capacity(closure.len());
    while let Some(Reverse(node)) = ready.pop() {
        ids.push(node.clone());
        for &next in downstream.get(node).into_iter().flatten() {
            if let Some(n) = pending.get_mut(next) {
                *n -= 1;
                if *n == 0 {
                    ready.push(Reverse(next));
                }
            }
        }
    }

    if ids.len() != closure.len() {
        return Err(TraversalError::CycleDetected {
            outlet: outlet.clone(),
            unresolved: closure.len() - ids.len(),
        });
    }

    tracing::debug!(outlet = %outlet, nodes = ids.len(), "upstream traversal complete");

    Ok(TraversalResult { outlet: outlet.clone(), ids })
}
