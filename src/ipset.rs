//! The `IpSet` facade (SPEC_FULL §4.4, §6): a set of IPv4/IPv6 addresses
//! backed by a single BDD root.

use std::cell::Cell;
use std::net::IpAddr;

use crate::address;
use crate::error::Result;
use crate::iter::{AddressIter, NetworkIter, NetworkRecord};
use crate::node::{Node, NodeId};
use crate::ops;
use crate::store::NodeStore;

/// A set of IP addresses. Holds exactly one counted reference on its root;
/// mutating methods borrow the backing `NodeStore` rather than owning it,
/// since one store commonly backs many sets (SPEC_FULL §5).
pub struct IpSet {
    root: NodeId,
    /// The store this set's root was last built against, remembered so
    /// `is_equal` can debug-assert that two sets being compared actually
    /// share a store (SPEC_FULL §4.4) instead of comparing coincidentally
    /// colliding `NodeId`s from unrelated arenas. A `Cell` because even
    /// read-only methods like `contains` need to record the binding.
    store_id: Cell<Option<u64>>,
}

impl Default for IpSet {
    fn default() -> Self {
        IpSet::new()
    }
}

impl IpSet {
    pub fn new() -> IpSet {
        IpSet {
            root: NodeId::zero(),
            store_id: Cell::new(None),
        }
    }

    /// Records which store this set is used with, or debug-asserts that a
    /// previously recorded store matches. Called at the top of every
    /// method that takes a `NodeStore` reference.
    fn bind(&self, store: &NodeStore) {
        match self.store_id.get() {
            Some(id) => debug_assert_eq!(id, store.id(), "IpSet used with a node store other than the one that built its root"),
            None => self.store_id.set(Some(store.id())),
        }
    }

    /// Releases this set's reference on its root. There is no `Drop` impl:
    /// dropping needs the external store, which `Drop::drop` cannot accept
    /// as a parameter (SPEC_FULL §6).
    pub fn free(self, store: &mut NodeStore) {
        store.decref(self.root);
    }

    /// Adds a single address. Returns `true` if the set already contained
    /// it (no change).
    pub fn add(&mut self, store: &mut NodeStore, addr: IpAddr) -> bool {
        self.bind(store);
        let path = address::encode_address(addr);
        self.override_with(store, &path, NodeId::one())
    }

    /// Adds every address whose first `prefix` bits match `addr`. Returns
    /// `true` if nothing changed.
    pub fn add_network(&mut self, store: &mut NodeStore, addr: IpAddr, prefix: u8, lenient: bool) -> Result<bool> {
        self.bind(store);
        let path = address::encode_network(addr, prefix, lenient)?;
        Ok(self.override_with(store, &path, NodeId::one()))
    }

    /// Removes a single address. Returns `true` if it was already absent.
    pub fn remove(&mut self, store: &mut NodeStore, addr: IpAddr) -> bool {
        self.bind(store);
        let path = address::encode_address(addr);
        self.override_with(store, &path, NodeId::zero())
    }

    /// Removes every address whose first `prefix` bits match `addr`.
    pub fn remove_network(&mut self, store: &mut NodeStore, addr: IpAddr, prefix: u8, lenient: bool) -> Result<bool> {
        self.bind(store);
        let path = address::encode_network(addr, prefix, lenient)?;
        Ok(self.override_with(store, &path, NodeId::zero()))
    }

    fn override_with(&mut self, store: &mut NodeStore, path: &[(crate::node::Variable, bool)], value: NodeId) -> bool {
        let new_root = ops::override_path(store, self.root, path, value);
        let unchanged = new_root == self.root;
        store.decref(self.root);
        self.root = new_root;
        unchanged
    }

    pub fn contains(&self, store: &NodeStore, addr: IpAddr) -> bool {
        self.bind(store);
        evaluate(store, self.root, &address::encode_address(addr)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_zero()
    }

    /// Structural (id) equality under a shared store. Comparing sets from
    /// two different stores is a programmer error, not a recoverable one
    /// (SPEC_FULL §4.4): if both sets have been bound to a store and those
    /// stores differ, this debug-asserts rather than returning a
    /// coincidental `true`/`false` on colliding `NodeId`s.
    pub fn is_equal(&self, other: &IpSet) -> bool {
        if let (Some(a), Some(b)) = (self.store_id.get(), other.store_id.get()) {
            debug_assert_eq!(a, b, "comparing IpSets built against different node stores");
        }
        self.root == other.root
    }

    pub fn memory_size(&self, store: &NodeStore) -> usize {
        self.bind(store);
        store.reachable_node_count(self.root) * std::mem::size_of::<Node>()
    }

    /// Every individual address in the set (no CIDR summarization), or
    /// every address *not* in it if `desired_value` is `false`.
    pub fn iterate<'a>(&self, store: &'a NodeStore, desired_value: bool) -> impl Iterator<Item = IpAddr> + 'a {
        self.bind(store);
        AddressIter::new(store, self.root, desired_value as i32).map(|record| record.address)
    }

    /// A disjoint CIDR cover of the same addresses `iterate` would expand.
    pub fn iterate_networks<'a>(
        &self,
        store: &'a NodeStore,
        desired_value: bool,
    ) -> impl Iterator<Item = NetworkRecord> + 'a {
        self.bind(store);
        NetworkIter::new(store, self.root, desired_value as i32)
    }

    pub fn save<W: std::io::Write>(&self, store: &NodeStore, writer: &mut W) -> Result<()> {
        self.bind(store);
        crate::serialize::save(writer, store, self.root)
    }

    pub fn load<R: std::io::Read>(store: &mut NodeStore, reader: &mut R) -> Result<IpSet> {
        let root = crate::serialize::load(reader, store)?;
        Ok(IpSet {
            root,
            store_id: Cell::new(Some(store.id())),
        })
    }
}

/// Tight evaluation loop (SPEC_FULL §4.6): no allocation, no recursion.
/// `path` must be a full-length, variable-0-anchored assignment (as
/// produced by `address::encode_address`), so a variable's bit sits at
/// `path[variable]` directly.
pub(crate) fn evaluate(store: &NodeStore, root: NodeId, path: &[(crate::node::Variable, bool)]) -> i32 {
    let mut current = root;
    while let Some(variable) = store.variable_of(current) {
        let (_, bit) = path[variable.0 as usize];
        let node = store.children(current);
        current = if bit { node.high } else { node.low };
    }
    current.as_terminal().expect("loop exits only at a terminal")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        Ipv4Addr::new(a, b, c, d).into()
    }

    #[test]
    fn empty_set_contains_nothing_and_serializes_to_24_bytes() {
        let store = NodeStore::new();
        let set = IpSet::new();
        assert!(!set.contains(&store, addr(1, 2, 3, 4)));
        assert!(set.is_empty());

        let mut buf = Vec::new();
        set.save(&store, &mut buf).unwrap();
        assert_eq!(24, buf.len());
    }

    #[test]
    fn add_then_contains() {
        let mut store = NodeStore::new();
        let mut set = IpSet::new();
        set.add(&mut store, addr(1, 2, 3, 4));
        assert!(set.contains(&store, addr(1, 2, 3, 4)));
        assert!(!set.contains(&store, addr(1, 2, 3, 5)));
        set.free(&mut store);
    }

    #[test]
    fn add_then_remove_restores_empty_root() {
        let mut store = NodeStore::new();
        let mut set = IpSet::new();
        set.add(&mut store, addr(1, 2, 3, 4));
        set.remove(&mut store, addr(1, 2, 3, 4));
        assert!(set.is_empty());
        set.free(&mut store);
    }

    #[test]
    fn add_twice_reports_unchanged() {
        let mut store = NodeStore::new();
        let mut set = IpSet::new();
        assert!(!set.add(&mut store, addr(1, 2, 3, 4)));
        assert!(set.add(&mut store, addr(1, 2, 3, 4)));
        set.free(&mut store);
    }

    #[test]
    fn add_network_covers_every_matching_address() {
        let mut store = NodeStore::new();
        let mut set = IpSet::new();
        set.add_network(&mut store, addr(10, 0, 0, 0), 8, false).unwrap();
        assert!(set.contains(&store, addr(10, 255, 255, 255)));
        assert!(!set.contains(&store, addr(11, 0, 0, 0)));

        let records: Vec<_> = set.iterate_networks(&store, true).collect();
        assert_eq!(1, records.len());
        assert_eq!(addr(10, 0, 0, 0), records[0].address);
        assert_eq!(8, records[0].prefix);
        set.free(&mut store);
    }

    #[test]
    fn remove_network_carves_a_hole_out_of_a_larger_network() {
        let mut store = NodeStore::new();
        let mut set = IpSet::new();
        set.add_network(&mut store, addr(10, 0, 0, 0), 8, false).unwrap();
        set.remove_network(&mut store, addr(10, 0, 0, 0), 16, false).unwrap();
        assert!(!set.contains(&store, addr(10, 0, 0, 1)));
        assert!(set.contains(&store, addr(10, 1, 0, 0)));
        set.free(&mut store);
    }

    #[test]
    fn save_load_round_trip_preserves_the_root() {
        let mut store = NodeStore::new();
        let mut set = IpSet::new();
        set.add_network(&mut store, addr(10, 0, 0, 0), 8, false).unwrap();

        let mut buf = Vec::new();
        set.save(&store, &mut buf).unwrap();

        let mut store2 = NodeStore::new();
        let loaded = IpSet::load(&mut store2, &mut buf.as_slice()).unwrap();
        assert!(loaded.contains(&store2, addr(10, 255, 255, 255)));
        assert!(!loaded.contains(&store2, addr(11, 0, 0, 0)));
    }

    #[test]
    fn strict_cidr_validation_rejects_nonzero_host_bits() {
        let mut store = NodeStore::new();
        let mut set = IpSet::new();
        assert!(set.add_network(&mut store, addr(10, 0, 0, 1), 8, false).is_err());
        assert!(set.add_network(&mut store, addr(10, 0, 0, 1), 8, true).is_ok());
    }

    /// Randomized check of the `add`/`remove`/`contains` laws (SPEC_FULL
    /// §8): insert a batch of random addresses, verify every one is
    /// contained, then remove them one by one and verify the set empties
    /// out exactly, ending back at the canonical empty root.
    #[test]
    fn random_batch_of_addresses_round_trips_through_add_and_remove() {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let addresses: Vec<IpAddr> = (0..200).map(|_| Ipv4Addr::from(rng.gen::<u32>()).into()).collect();

        let mut store = NodeStore::new();
        let mut set = IpSet::new();
        for &a in &addresses {
            set.add(&mut store, a);
        }
        for &a in &addresses {
            assert!(set.contains(&store, a));
        }

        let mut buf = Vec::new();
        set.save(&store, &mut buf).unwrap();
        let mut store2 = NodeStore::new();
        let loaded = IpSet::load(&mut store2, &mut buf.as_slice()).unwrap();
        for &a in &addresses {
            assert!(loaded.contains(&store2, a));
        }

        for &a in &addresses {
            set.remove(&mut store, a);
        }
        assert!(set.is_empty());
        set.free(&mut store);
    }

    /// `add_network` followed by `remove_network` of the same network
    /// always restores the original (empty) root, regardless of which
    /// random `/prefix` was used.
    #[test]
    fn random_networks_add_then_remove_restores_empty_root() {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let mut store = NodeStore::new();
        for _ in 0..50 {
            let prefix = rng.gen_range(0, 33);
            let host_mask: u32 = if prefix == 32 { 0 } else { u32::MAX >> prefix };
            let base = rng.gen::<u32>() & !host_mask;
            let network: IpAddr = Ipv4Addr::from(base).into();

            let mut set = IpSet::new();
            set.add_network(&mut store, network, prefix, false).unwrap();
            set.remove_network(&mut store, network, prefix, false).unwrap();
            assert!(set.is_empty());
            set.free(&mut store);
        }
    }

    #[test]
    fn is_equal_accepts_sets_sharing_a_store() {
        let mut store = NodeStore::new();
        let mut a = IpSet::new();
        let mut b = IpSet::new();
        a.add(&mut store, addr(10, 0, 0, 1));
        b.add(&mut store, addr(10, 0, 0, 1));
        assert!(a.is_equal(&b));
        a.free(&mut store);
        b.free(&mut store);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "different node stores")]
    fn is_equal_debug_asserts_on_sets_from_different_stores() {
        let mut store_a = NodeStore::new();
        let mut store_b = NodeStore::new();
        let mut a = IpSet::new();
        let mut b = IpSet::new();
        a.add(&mut store_a, addr(10, 0, 0, 1));
        b.add(&mut store_b, addr(10, 0, 0, 1));
        let _ = a.is_equal(&b);
    }
}
