//! BDD path iteration and CIDR-network summarization (SPEC_FULL §4.3, §6).

use std::collections::VecDeque;
use std::net::IpAddr;

use crate::address::{self, IPV4_BITS, IPV6_BITS};
use crate::assignment::{Assignment, ExpandedAssignmentIter, Tribool};
use crate::node::{NodeId, Variable};
use crate::store::NodeStore;

/// Walks every distinct root-to-terminal path of a BDD, depth-first with
/// the low branch first. Each yielded assignment has `Either` exactly at
/// the variables the path never tested (skipped by reduction).
pub struct PathIter<'a> {
    store: &'a NodeStore,
    stack: Vec<(Variable, NodeId)>,
    pending: Option<NodeId>,
    assignment: Assignment,
    exhausted: bool,
}

impl<'a> PathIter<'a> {
    pub fn new(store: &'a NodeStore, root: NodeId) -> PathIter<'a> {
        PathIter {
            store,
            stack: Vec::new(),
            pending: Some(root),
            assignment: Assignment::new(),
            exhausted: false,
        }
    }

    fn descend_to_terminal(&mut self, mut current: NodeId) -> i32 {
        loop {
            match self.store.variable_of(current) {
                None => return current.as_terminal().expect("non-nonterminal is a terminal"),
                Some(var) => {
                    let node = self.store.children(current);
                    self.assignment.set(var, Tribool::False);
                    self.stack.push((var, node.high));
                    current = node.low;
                }
            }
        }
    }
}

impl<'a> Iterator for PathIter<'a> {
    type Item = (Assignment, i32);

    fn next(&mut self) -> Option<(Assignment, i32)> {
        if self.exhausted {
            return None;
        }
        let current = match self.pending.take() {
            Some(root) => root,
            None => match self.stack.pop() {
                Some((var, high)) => {
                    self.assignment.cut(var);
                    self.assignment.set(var, Tribool::True);
                    high
                }
                None => {
                    self.exhausted = true;
                    return None;
                }
            },
        };
        let value = self.descend_to_terminal(current);
        Some((self.assignment.clone(), value))
    }
}

/// One summarized record: an address plus the CIDR prefix length
/// significant to it (32/128 for a single address, smaller for a network).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct NetworkRecord {
    pub address: IpAddr,
    pub prefix: u8,
}

/// Summarizes the paths reaching `desired_value` as a disjoint cover of
/// CIDR networks. A path whose family variable is `Either` covers both
/// families and is emitted as two records, IPv4 first then IPv6 (SPEC_FULL
/// §6).
pub struct NetworkIter<'a> {
    paths: PathIter<'a>,
    desired_value: i32,
    pending_ipv6: Option<NetworkRecord>,
}

impl<'a> NetworkIter<'a> {
    pub fn new(store: &'a NodeStore, root: NodeId, desired_value: i32) -> NetworkIter<'a> {
        NetworkIter {
            paths: PathIter::new(store, root),
            desired_value,
            pending_ipv6: None,
        }
    }
}

impl<'a> Iterator for NetworkIter<'a> {
    type Item = NetworkRecord;

    fn next(&mut self) -> Option<NetworkRecord> {
        if let Some(record) = self.pending_ipv6.take() {
            return Some(record);
        }

        loop {
            let (assignment, value) = self.paths.next()?;
            if value != self.desired_value {
                continue;
            }
            return Some(match assignment.get(Variable::FAMILY) {
                Tribool::True => to_record(&assignment, true),
                Tribool::False => to_record(&assignment, false),
                Tribool::Either => {
                    self.pending_ipv6 = Some(to_record(&assignment, false));
                    to_record(&assignment, true)
                }
            });
        }
    }
}

fn to_record(assignment: &Assignment, is_ipv4: bool) -> NetworkRecord {
    let (address, prefix) = address::decode_network(assignment, is_ipv4);
    debug_assert!(u32::from(prefix) <= if is_ipv4 { IPV4_BITS } else { IPV6_BITS });
    NetworkRecord { address, prefix }
}

/// Fully expands every path reaching `desired_value` into concrete
/// addresses (no CIDR summarization) — the form `iterate` exposes, as
/// opposed to `iterate_networks`'s summarized `NetworkIter`.
pub struct AddressIter<'a> {
    paths: PathIter<'a>,
    desired_value: i32,
    pending: VecDeque<(Assignment, bool)>,
    current: Option<(ExpandedAssignmentIter, bool)>,
}

impl<'a> AddressIter<'a> {
    pub fn new(store: &'a NodeStore, root: NodeId, desired_value: i32) -> AddressIter<'a> {
        AddressIter {
            paths: PathIter::new(store, root),
            desired_value,
            pending: VecDeque::new(),
            current: None,
        }
    }
}

impl<'a> Iterator for AddressIter<'a> {
    type Item = NetworkRecord;

    fn next(&mut self) -> Option<NetworkRecord> {
        loop {
            if let Some((expansion, is_ipv4)) = &mut self.current {
                if let Some(concrete) = expansion.next() {
                    return Some(to_record(&concrete, *is_ipv4));
                }
                self.current = None;
            }

            if let Some((mut assignment, is_ipv4)) = self.pending.pop_front() {
                assignment.set(Variable::FAMILY, Tribool::from_bool(is_ipv4));
                let bits = if is_ipv4 { IPV4_BITS } else { IPV6_BITS };
                self.current = Some((ExpandedAssignmentIter::new(assignment, bits + 1), is_ipv4));
                continue;
            }

            let (assignment, value) = self.paths.next()?;
            if value != self.desired_value {
                continue;
            }
            match assignment.get(Variable::FAMILY) {
                Tribool::True => self.pending.push_back((assignment, true)),
                Tribool::False => self.pending.push_back((assignment, false)),
                Tribool::Either => {
                    self.pending.push_back((assignment.clone(), true));
                    self.pending.push_back((assignment, false));
                }
            }
        }
    }
}
