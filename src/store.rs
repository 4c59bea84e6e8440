//! The node store: a content-addressed, reference-counted arena of
//! nonterminal BDD nodes, plus the three operator caches that sit on top of
//! it. This is the one piece of cross-operation shared state in the whole
//! crate (SPEC_FULL §5) — an `IpSet`/`IpMap` borrows it on every mutating
//! call rather than owning a reference to it.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use fxhash::FxBuildHasher;

use crate::node::{Node, NodeId, Variable};

/// Number of nodes per arena chunk. Chunks are allocated whole so that a
/// node's `(chunk, offset)` address never moves once assigned.
const CHUNK_SIZE: usize = 1 << 12;

/// Source of the per-instance ids `NodeStore::new` hands out, so that two
/// stores are never confused even if their arenas happen to be in the same
/// state (SPEC_FULL §4.4's `is_equal` debug assertion relies on this).
static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Debug)]
enum NodeSlot {
    Occupied {
        variable: Variable,
        low: NodeId,
        high: NodeId,
        refcount: u32,
    },
    /// A freed slot. This is a distinct variant, not a reinterpretation of
    /// the `refcount` field of `Occupied` — see DESIGN.md.
    Free { next: Option<u32> },
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum StoreState {
    Empty,
    Populated,
    Closing,
}

pub struct NodeStore {
    id: u64,
    chunks: Vec<Vec<NodeSlot>>,
    free_head: Option<u32>,
    allocated: u32,
    content_index: HashMap<(Variable, NodeId, NodeId), NodeId, FxBuildHasher>,
    and_cache: HashMap<(NodeId, NodeId), NodeId, FxBuildHasher>,
    or_cache: HashMap<(NodeId, NodeId), NodeId, FxBuildHasher>,
    ite_cache: HashMap<(NodeId, NodeId, NodeId), NodeId, FxBuildHasher>,
    state: StoreState,
}

impl Default for NodeStore {
    fn default() -> Self {
        NodeStore::new()
    }
}

impl NodeStore {
    pub fn new() -> NodeStore {
        NodeStore {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            chunks: Vec::new(),
            free_head: None,
            allocated: 0,
            content_index: HashMap::default(),
            and_cache: HashMap::default(),
            or_cache: HashMap::default(),
            ite_cache: HashMap::default(),
            state: StoreState::Empty,
        }
    }

    /// Identifies this store uniquely among every `NodeStore` in the
    /// process, so `IpSet`/`IpMap` can debug-assert that two roots being
    /// compared actually came from the same store (SPEC_FULL §4.4).
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub fn terminal(&self, value: i32) -> NodeId {
        NodeId::terminal(value)
    }

    /// Interns `(variable, low, high)`, reducing and deduplicating as
    /// required. Takes ownership of the caller's references on `low` and
    /// `high`; returns one owned reference on the result.
    pub fn nonterminal(&mut self, variable: Variable, low: NodeId, high: NodeId) -> NodeId {
        if low == high {
            self.decref(high);
            return low;
        }

        if let Some(&existing) = self.content_index.get(&(variable, low, high)) {
            self.incref(existing);
            self.decref(low);
            self.decref(high);
            return existing;
        }

        let index = self.allocate_slot(variable, low, high);
        let id = NodeId::from_arena_index(index);
        self.content_index.insert((variable, low, high), id);
        if self.state == StoreState::Empty {
            self.state = StoreState::Populated;
        }
        id
    }

    fn allocate_slot(&mut self, variable: Variable, low: NodeId, high: NodeId) -> u32 {
        let slot = NodeSlot::Occupied {
            variable,
            low,
            high,
            refcount: 1,
        };
        if let Some(free) = self.free_head {
            let (chunk, offset) = Self::address(free);
            let next = match &self.chunks[chunk][offset] {
                NodeSlot::Free { next } => *next,
                NodeSlot::Occupied { .. } => unreachable!("free list points at occupied slot"),
            };
            self.free_head = next;
            self.chunks[chunk][offset] = slot;
            free
        } else {
            let (chunk, offset) = Self::address(self.allocated);
            if chunk == self.chunks.len() {
                log::trace!("growing node store arena to {} chunks", chunk + 1);
                self.chunks.push(Vec::with_capacity(CHUNK_SIZE));
            }
            debug_assert_eq!(offset, self.chunks[chunk].len());
            self.chunks[chunk].push(slot);
            let index = self.allocated;
            self.allocated += 1;
            index
        }
    }

    fn address(index: u32) -> (usize, usize) {
        let shift = CHUNK_SIZE.trailing_zeros();
        ((index >> shift) as usize, (index & (CHUNK_SIZE as u32 - 1)) as usize)
    }

    fn slot(&self, id: NodeId) -> &NodeSlot {
        let (chunk, offset) = Self::address(id.arena_index());
        &self.chunks[chunk][offset]
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut NodeSlot {
        let (chunk, offset) = Self::address(id.arena_index());
        &mut self.chunks[chunk][offset]
    }

    /// The node's variable, or `None` for a terminal (which has, by
    /// convention, an infinite variable).
    pub fn variable_of(&self, id: NodeId) -> Option<Variable> {
        if id.is_terminal() {
            return None;
        }
        match self.slot(id) {
            NodeSlot::Occupied { variable, .. } => Some(*variable),
            NodeSlot::Free { .. } => unreachable!("dangling node id"),
        }
    }

    /// The node's `(low, high)` children. Panics for a terminal id.
    pub fn children(&self, id: NodeId) -> Node {
        match self.slot(id) {
            NodeSlot::Occupied { low, high, .. } => Node::new(*low, *high),
            NodeSlot::Free { .. } => unreachable!("dangling node id"),
        }
    }

    pub fn incref(&mut self, id: NodeId) {
        if id.is_terminal() {
            return;
        }
        match self.slot_mut(id) {
            NodeSlot::Occupied { refcount, .. } => *refcount += 1,
            NodeSlot::Free { .. } => unreachable!("incref of a freed node"),
        }
    }

    pub fn decref(&mut self, id: NodeId) {
        if id.is_terminal() {
            return;
        }
        let (variable, low, high, refcount) = match self.slot_mut(id) {
            NodeSlot::Occupied {
                variable,
                low,
                high,
                refcount,
            } => {
                *refcount -= 1;
                (*variable, *low, *high, *refcount)
            }
            NodeSlot::Free { .. } => unreachable!("double decref"),
        };
        if refcount > 0 {
            return;
        }
        self.content_index.remove(&(variable, low, high));
        let index = id.arena_index();
        let (chunk, offset) = Self::address(index);
        self.chunks[chunk][offset] = NodeSlot::Free { next: self.free_head };
        self.free_head = Some(index);
        self.decref(low);
        self.decref(high);
    }

    /// Number of nonterminals reachable from `root`, including `root`
    /// itself if it is one.
    pub fn reachable_node_count(&self, root: NodeId) -> usize {
        let mut seen: HashSet<NodeId, FxBuildHasher> = HashSet::default();
        let mut stack = vec![root];
        let mut count = 0;
        while let Some(id) = stack.pop() {
            if id.is_terminal() || !seen.insert(id) {
                continue;
            }
            count += 1;
            let Node { low, high } = self.children(id);
            stack.push(low);
            stack.push(high);
        }
        count
    }

    /// DFS from `root` in child-before-parent (reverse postorder) order.
    /// Used by the serializer; exposed here since it needs the arena's
    /// internal `children`/`variable_of` accessors.
    pub(crate) fn reverse_postorder(&self, root: NodeId) -> Vec<NodeId> {
        if root.is_terminal() {
            return Vec::new();
        }
        let mut order = Vec::new();
        let mut seen: HashSet<NodeId, FxBuildHasher> = HashSet::default();
        // Explicit post-order DFS: (node, children already pushed?) frames.
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if id.is_terminal() {
                continue;
            }
            if expanded {
                if seen.insert(id) {
                    order.push(id);
                }
                continue;
            }
            if seen.contains(&id) {
                continue;
            }
            stack.push((id, true));
            let Node { low, high } = self.children(id);
            stack.push((high, false));
            stack.push((low, false));
        }
        order
    }

    pub(crate) fn and_cache_get(&self, key: (NodeId, NodeId)) -> Option<NodeId> {
        self.and_cache.get(&key).copied()
    }

    pub(crate) fn and_cache_insert(&mut self, key: (NodeId, NodeId), value: NodeId) {
        self.incref(key.0);
        self.incref(key.1);
        self.incref(value);
        self.and_cache.insert(key, value);
    }

    pub(crate) fn or_cache_get(&self, key: (NodeId, NodeId)) -> Option<NodeId> {
        self.or_cache.get(&key).copied()
    }

    pub(crate) fn or_cache_insert(&mut self, key: (NodeId, NodeId), value: NodeId) {
        self.incref(key.0);
        self.incref(key.1);
        self.incref(value);
        self.or_cache.insert(key, value);
    }

    pub(crate) fn ite_cache_get(&self, key: (NodeId, NodeId, NodeId)) -> Option<NodeId> {
        self.ite_cache.get(&key).copied()
    }

    pub(crate) fn ite_cache_insert(&mut self, key: (NodeId, NodeId, NodeId), value: NodeId) {
        self.incref(key.0);
        self.incref(key.1);
        self.incref(key.2);
        self.incref(value);
        self.ite_cache.insert(key, value);
    }

    /// Releases every counted reference the operator caches hold and empties
    /// them. Called before the store is torn down (§4.6's CLOSING
    /// transition) and safe to call at any other time as a manual GC of
    /// cache memory.
    pub fn flush_caches(&mut self) {
        log::debug!(
            "flushing operator caches ({} and, {} or, {} ite entries)",
            self.and_cache.len(),
            self.or_cache.len(),
            self.ite_cache.len()
        );
        // Drain each cache into a local `Vec` first: `decref` needs `&mut
        // self`, which would conflict with a live `self.*_cache.iter()`
        // borrow of the same struct.
        let and_entries: Vec<_> = self.and_cache.drain().collect();
        for ((a, b), c) in and_entries {
            self.decref(a);
            self.decref(b);
            self.decref(c);
        }
        let or_entries: Vec<_> = self.or_cache.drain().collect();
        for ((a, b), c) in or_entries {
            self.decref(a);
            self.decref(b);
            self.decref(c);
        }
        let ite_entries: Vec<_> = self.ite_cache.drain().collect();
        for ((a, b, c), d) in ite_entries {
            self.decref(a);
            self.decref(b);
            self.decref(c);
            self.decref(d);
        }
    }

    /// Flushes the operator caches and marks the store as shutting down.
    /// Further use of the store after `close()` is a programmer error (the
    /// store remains memory-safe, but its canonicalization guarantees only
    /// hold for a `Populated` or `Empty` store).
    pub fn close(&mut self) {
        self.flush_caches();
        self.state = StoreState::Closing;
    }

    pub(crate) fn state(&self) -> StoreState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.allocated as usize
            - self.count_free()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn count_free(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.free_head;
        while let Some(index) = cursor {
            count += 1;
            let (chunk, offset) = Self::address(index);
            cursor = match &self.chunks[chunk][offset] {
                NodeSlot::Free { next } => *next,
                NodeSlot::Occupied { .. } => unreachable!(),
            };
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(v: u32) -> Variable {
        Variable(v)
    }

    #[test]
    fn reduced_node_skips_equal_children() {
        let mut store = NodeStore::new();
        let id = store.nonterminal(var(3), NodeId::zero(), NodeId::zero());
        assert_eq!(NodeId::zero(), id);
    }

    #[test]
    fn unique_nodes_are_shared() {
        let mut store = NodeStore::new();
        let a = store.nonterminal(var(1), NodeId::zero(), NodeId::one());
        store.incref(a); // pretend a second owner exists before the second call
        let b = store.nonterminal(var(1), NodeId::zero(), NodeId::one());
        assert_eq!(a, b);
        assert_eq!(1, store.reachable_node_count(a));
    }

    #[test]
    fn decref_to_zero_frees_and_recurses() {
        let mut store = NodeStore::new();
        let inner = store.nonterminal(var(2), NodeId::zero(), NodeId::one());
        store.incref(inner);
        let outer = store.nonterminal(var(1), inner, NodeId::one());
        assert_eq!(2, store.reachable_node_count(outer));
        store.decref(outer);
        assert_eq!(1, store.reachable_node_count(inner));
        store.decref(inner); // release the test's own leftover reference
        assert!(store.is_empty());
    }

    #[test]
    fn arena_grows_across_chunk_boundary() {
        let mut store = NodeStore::new();
        let count = CHUNK_SIZE as u32 + 10;
        // Built innermost-variable-first so each new (outer) node's variable
        // is strictly smaller than its high child's, preserving orderedness.
        let mut prev = NodeId::one();
        for i in (1..=count).rev() {
            prev = store.nonterminal(var(i), NodeId::zero(), prev);
        }
        assert_eq!(count as usize, store.reachable_node_count(prev));
    }

    #[test]
    fn close_flushes_all_three_operator_caches_and_frees_their_references() {
        let mut store = NodeStore::new();
        let a = store.nonterminal(var(3), NodeId::zero(), NodeId::one());
        let b = store.nonterminal(var(4), NodeId::zero(), NodeId::one());
        let c = store.nonterminal(var(5), NodeId::zero(), NodeId::one());

        // Each insert takes its own counted reference on every operand and
        // on the result, on top of the one the test holds via `a`/`b`/`c`.
        store.and_cache_insert((a, NodeId::one()), a);
        store.or_cache_insert((b, NodeId::zero()), b);
        store.ite_cache_insert((c, NodeId::one(), NodeId::zero()), c);

        store.close();
        assert_eq!(StoreState::Closing, store.state());
        assert_eq!(None, store.and_cache_get((a, NodeId::one())));
        assert_eq!(None, store.or_cache_get((b, NodeId::zero())));
        assert_eq!(None, store.ite_cache_get((c, NodeId::one(), NodeId::zero())));

        // The caches' references are gone; only the test's own references
        // on `a`/`b`/`c` remain, so releasing those should empty the store.
        store.decref(a);
        store.decref(b);
        store.decref(c);
        assert!(store.is_empty());
    }

    #[test]
    fn reverse_postorder_orders_children_before_parents() {
        let mut store = NodeStore::new();
        let inner = store.nonterminal(var(2), NodeId::zero(), NodeId::one());
        store.incref(inner);
        let outer = store.nonterminal(var(1), inner, NodeId::one());
        let order = store.reverse_postorder(outer);
        assert_eq!(vec![inner, outer], order);
    }
}
