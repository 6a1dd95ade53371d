//! Order-maintenance structure for process priorities.
//!
//! Priorities form a total order that supports `insert_after` in amortized
//! logarithmic time and comparison in constant time. The structure is a
//! circular doubly-linked list of nodes around a distinguished base node;
//! each node carries a numeric label inside a fixed span. A node's position
//! is its label's circular distance from the base label.
//!
//! Insertion uses tag-range relabeling: walk forward from the insertion
//! point counting steps `j` until the `j`-th successor sits more than `j²`
//! label units away (a full circle counts as the whole span), then spread
//! the skipped nodes evenly across that range. The new node takes the
//! midpoint of the now-guaranteed gap. The span admits roughly
//! `sqrt(span)` live nodes before insertion fails.
//!
//! Smaller circular distance orders first; the scheduler treats "earlier in
//! the order" as "higher priority".

use crate::error::{Error, ErrorKind, Result};
use crate::util::{Arena, ArenaIndex};
use core::fmt;

/// Label span for the default arena. Supports on the order of `2^23` live
/// priorities.
const LABEL_SPAN: u64 = 1 << 46;

/// A handle to one position in the priority order.
///
/// Handles are only meaningful for the [`PriorityList`] that created them,
/// and only while the node is live.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Priority(pub(crate) ArenaIndex);

impl fmt::Debug for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Priority({}:{})", self.0.index(), self.0.generation())
    }
}

#[derive(Debug)]
struct Node {
    label: u64,
    prev: ArenaIndex,
    next: ArenaIndex,
    base: ArenaIndex,
}

/// The order-maintenance list.
#[derive(Debug)]
pub struct PriorityList {
    nodes: Arena<Node>,
    span: u64,
}

impl Default for PriorityList {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityList {
    /// Creates an empty list with the default label span.
    #[must_use]
    pub fn new() -> Self {
        Self::with_span(LABEL_SPAN)
    }

    /// Creates a list with a custom label span.
    ///
    /// Shrinking the span makes label exhaustion reachable in tests.
    #[doc(hidden)]
    #[must_use]
    pub fn with_span(span: u64) -> Self {
        assert!((4..=1 << 62).contains(&span), "label span out of range");
        Self {
            nodes: Arena::new(),
            span,
        }
    }

    /// Returns the number of live priorities (bases excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        let bases = self
            .nodes
            .iter()
            .filter(|(idx, node)| node.base == *idx)
            .count();
        self.nodes.len() - bases
    }

    /// Returns true if no usable priority is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `p` names a live priority.
    #[must_use]
    pub fn contains(&self, p: Priority) -> bool {
        self.nodes.contains(p.0)
    }

    /// Starts a new total order and returns its first usable priority.
    ///
    /// The base node itself stays internal; every priority derived from the
    /// returned handle shares its base and is comparable with it.
    pub fn new_base(&mut self) -> Result<Priority> {
        let base = self.nodes.insert(Node {
            label: 0,
            prev: ArenaIndex::new(0, 0),
            next: ArenaIndex::new(0, 0),
            base: ArenaIndex::new(0, 0),
        });
        {
            let node = self.nodes.get_mut(base).expect("base node just inserted");
            node.prev = base;
            node.next = base;
            node.base = base;
        }
        self.insert_into_gap(base)
    }

    /// Inserts a new priority immediately after `p` in the order.
    ///
    /// The returned priority `q` satisfies `p < q`, and `q < r` for every
    /// pre-existing `r` with `p < r`. Fails with
    /// [`ErrorKind::InvalidPriority`] on a stale handle and
    /// [`ErrorKind::PriorityExhausted`] when the label span cannot admit
    /// another node.
    pub fn insert_after(&mut self, p: Priority) -> Result<Priority> {
        if !self.nodes.contains(p.0) {
            return Err(Error::new(ErrorKind::InvalidPriority)
                .with_context(format!("insert_after on dead priority {p:?}")));
        }
        self.insert_into_gap(p.0)
    }

    /// Removes `p` from the order. Returns false on a stale handle.
    pub fn remove(&mut self, p: Priority) -> bool {
        let Some(node) = self.nodes.get(p.0) else {
            return false;
        };
        debug_assert!(node.base != p.0, "base nodes are never handed out");
        let (prev, next) = (node.prev, node.next);
        self.nodes.remove(p.0);
        self.nodes.get_mut(prev).expect("linked node").next = next;
        self.nodes.get_mut(next).expect("linked node").prev = prev;
        true
    }

    /// Compares two priorities: true if `a` orders strictly before `b`
    /// (i.e. `a` is the higher priority).
    ///
    /// Fails with [`ErrorKind::InvalidPriority`] on stale handles and
    /// [`ErrorKind::PriorityMisuse`] when the priorities belong to
    /// different bases.
    pub fn lt(&self, a: Priority, b: Priority) -> Result<bool> {
        let (na, nb) = match (self.nodes.get(a.0), self.nodes.get(b.0)) {
            (Some(na), Some(nb)) => (na, nb),
            _ => {
                return Err(Error::new(ErrorKind::InvalidPriority)
                    .with_context("comparison against a dead priority"))
            }
        };
        if na.base != nb.base {
            return Err(Error::new(ErrorKind::PriorityMisuse)
                .with_context("priorities from distinct bases are not comparable"));
        }
        let base_label = self.nodes.get(na.base).expect("live base").label;
        Ok(self.distance(na.label, base_label) < self.distance(nb.label, base_label))
    }

    /// Infallible comparison for scheduler-internal use.
    ///
    /// Both handles must be live and share a base; the scheduler only ever
    /// compares priorities it allocated itself.
    pub(crate) fn precedes(&self, a: Priority, b: Priority) -> bool {
        self.lt(a, b)
            .expect("scheduler priorities are live and share a base")
    }

    /// Circular distance from `from` up to `label`. Labels are always kept
    /// below the span, so the unwrapped branch never overflows.
    fn distance(&self, label: u64, from: u64) -> u64 {
        if label >= from {
            label - from
        } else {
            self.span - (from - label)
        }
    }

    fn offset(&self, from: u64, by: u64) -> u64 {
        let sum = from + by;
        if sum >= self.span {
            sum - self.span
        } else {
            sum
        }
    }

    /// Core insertion: relabel if the gap after `anchor` is closed, then
    /// place a new node at the midpoint of the gap.
    fn insert_into_gap(&mut self, anchor: ArenaIndex) -> Result<Priority> {
        let (anchor_label, base) = {
            let node = self.nodes.get(anchor).expect("anchor checked live");
            (node.label, node.base)
        };

        // Walk successors until the j-th sits more than j^2 away. Reaching
        // the anchor again means a full circle, which weighs the whole span.
        let mut j: u64 = 1;
        let mut cur = self.nodes.get(anchor).expect("anchor").next;
        let range = loop {
            let w = if cur == anchor {
                self.span
            } else {
                self.distance(self.nodes.get(cur).expect("ring node").label, anchor_label)
            };
            if u128::from(w) > u128::from(j) * u128::from(j) {
                break w;
            }
            j += 1;
            if u128::from(j) * u128::from(j) >= u128::from(self.span) {
                return Err(Error::new(ErrorKind::PriorityExhausted)
                    .with_context("priority label span is full"));
            }
            debug_assert!(cur != anchor, "full circle weighs the whole span");
            cur = self.nodes.get(cur).expect("ring node").next;
        };

        if j > 1 {
            // Spread the j-1 skipped nodes evenly across the found range.
            let mut walk = self.nodes.get(anchor).expect("anchor").next;
            for k in 1..j {
                let spread = (u128::from(range) * u128::from(k) / u128::from(j)) as u64;
                let label = self.offset(anchor_label, spread);
                let node = self.nodes.get_mut(walk).expect("ring node");
                node.label = label;
                walk = node.next;
            }
        }

        let next = self.nodes.get(anchor).expect("anchor").next;
        let gap = if next == anchor {
            self.span
        } else {
            self.distance(self.nodes.get(next).expect("ring node").label, anchor_label)
        };
        debug_assert!(gap >= 2, "relabeling must leave a splittable gap");
        let label = self.offset(anchor_label, gap / 2);

        let fresh = self.nodes.insert(Node {
            label,
            prev: anchor,
            next,
            base,
        });
        self.nodes.get_mut(anchor).expect("anchor").next = fresh;
        self.nodes.get_mut(next).expect("ring node").prev = fresh;
        Ok(Priority(fresh))
    }
}
