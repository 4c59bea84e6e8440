//! Tagged node identifiers and the raw `(variable, low, high)` triple they
//! point at.
//!
//! `NodeId` packs two pieces of information into a single `i32`: whether the
//! id names a terminal (a concrete integer value) or a nonterminal (an index
//! into a `NodeStore` arena). The tag is the sign bit — non-negative values
//! are terminals, negative values are nonterminals, with arena index `k`
//! stored as `-(k as i32) - 1` so that index `0` still has a distinct
//! representation from the zero terminal.
//!
//! Node ids are never exposed outside this crate's BDD engine; callers only
//! ever see `IpSet`/`IpMap` and addresses.

use std::convert::TryFrom;

/// A variable index. Variable `0` is reserved for the IP-family selector;
/// variables `1..=32` (IPv4) or `1..=128` (IPv6) are address bits.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Variable(pub u32);

impl Variable {
    pub const FAMILY: Variable = Variable(0);

    pub fn offset(self, by: u32) -> Variable {
        Variable(self.0 + by)
    }
}

/// A tagged reference to either a terminal value or a nonterminal node in
/// some `NodeStore`'s arena. Copy, comparable in O(1), and carries no
/// destructor — the store alone decides when the node it names is freed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(i32);

impl NodeId {
    pub fn terminal(value: i32) -> NodeId {
        debug_assert!(value >= 0, "terminal values must be non-negative");
        NodeId(value)
    }

    pub fn zero() -> NodeId {
        NodeId(0)
    }

    pub fn one() -> NodeId {
        NodeId(1)
    }

    pub fn bool_terminal(value: bool) -> NodeId {
        if value {
            NodeId::one()
        } else {
            NodeId::zero()
        }
    }

    pub(crate) fn from_arena_index(index: u32) -> NodeId {
        let idx = i32::try_from(index).expect("arena index exceeds i32 range");
        NodeId(-idx - 1)
    }

    pub fn is_terminal(self) -> bool {
        self.0 >= 0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_one(self) -> bool {
        self.0 == 1
    }

    /// The terminal's value, or `None` if this id names a nonterminal.
    pub fn as_terminal(self) -> Option<i32> {
        if self.0 >= 0 {
            Some(self.0)
        } else {
            None
        }
    }

    pub(crate) fn arena_index(self) -> u32 {
        debug_assert!(!self.is_terminal());
        u32::try_from(-self.0 - 1).expect("corrupt nonterminal node id")
    }

    /// The raw signed representation, used only by the serializer, which
    /// defines its own (unrelated) disk encoding in the same shape.
    pub(crate) fn raw(self) -> i32 {
        self.0
    }

    pub(crate) fn from_raw(raw: i32) -> NodeId {
        NodeId(raw)
    }
}

/// The `(variable, low, high)` payload of a stored nonterminal. The owning
/// `variable` is not part of this triple in `NodeStore`'s content index key,
/// but callers outside the store still need it packaged together when
/// reading nodes back out, hence this type also appears bundled with its
/// variable in `NodeStore::expand`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Node {
    pub low: NodeId,
    pub high: NodeId,
}

impl Node {
    pub fn new(low: NodeId, high: NodeId) -> Node {
        Node { low, high }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_roundtrip() {
        let t = NodeId::terminal(42);
        assert!(t.is_terminal());
        assert_eq!(Some(42), t.as_terminal());
    }

    #[test]
    fn arena_index_roundtrip() {
        for idx in [0u32, 1, 2, 4096, 1_000_000] {
            let id = NodeId::from_arena_index(idx);
            assert!(!id.is_terminal());
            assert_eq!(idx, id.arena_index());
        }
    }

    #[test]
    fn zero_one_are_distinct_from_nonterminal_index_zero() {
        let zero = NodeId::zero();
        let nonterminal_zero = NodeId::from_arena_index(0);
        assert_ne!(zero, nonterminal_zero);
        assert!(zero.is_terminal());
        assert!(!nonterminal_zero.is_terminal());
    }
}
