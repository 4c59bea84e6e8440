//! The `IpMap` facade (SPEC_FULL §4.4): an integer-valued function of IP
//! addresses, backed by a single BDD root plus its configured default
//! value. Supports `set`/`get` only — no element-wise removal, since
//! "remove" has no well-defined meaning for an integer-valued function
//! (Open Question ii).

use std::cell::Cell;
use std::net::IpAddr;

use crate::address;
use crate::error::Result;
use crate::ipset::evaluate;
use crate::iter::{AddressIter, NetworkIter, NetworkRecord};
use crate::node::{Node, NodeId};
use crate::ops;
use crate::store::NodeStore;

pub struct IpMap {
    root: NodeId,
    default_value: i32,
    /// The store this map's root was last built against, remembered so
    /// `is_equal` can debug-assert that two maps being compared actually
    /// share a store (SPEC_FULL §4.4), mirroring `IpSet::store_id`.
    store_id: Cell<Option<u64>>,
}

impl IpMap {
    pub fn new(store: &mut NodeStore, default_value: i32) -> IpMap {
        let root = store.terminal(default_value);
        IpMap {
            root,
            default_value,
            store_id: Cell::new(Some(store.id())),
        }
    }

    /// Records which store this map is used with, or debug-asserts that a
    /// previously recorded store matches. Called at the top of every
    /// method that takes a `NodeStore` reference.
    fn bind(&self, store: &NodeStore) {
        match self.store_id.get() {
            Some(id) => debug_assert_eq!(id, store.id(), "IpMap used with a node store other than the one that built its root"),
            None => self.store_id.set(Some(store.id())),
        }
    }

    pub fn free(self, store: &mut NodeStore) {
        store.decref(self.root);
    }

    pub fn default_value(&self) -> i32 {
        self.default_value
    }

    /// Overwrites the value for every address matching `addr`. Returns
    /// `true` if nothing changed.
    pub fn set(&mut self, store: &mut NodeStore, addr: IpAddr, value: i32) -> bool {
        self.bind(store);
        let path = address::encode_address(addr);
        self.override_with(store, &path, value)
    }

    /// Overwrites the value for every address whose first `prefix` bits
    /// match `addr`.
    pub fn set_network(&mut self, store: &mut NodeStore, addr: IpAddr, prefix: u8, value: i32, lenient: bool) -> Result<bool> {
        self.bind(store);
        let path = address::encode_network(addr, prefix, lenient)?;
        Ok(self.override_with(store, &path, value))
    }

    fn override_with(&mut self, store: &mut NodeStore, path: &[(crate::node::Variable, bool)], value: i32) -> bool {
        let value_id = store.terminal(value);
        let new_root = ops::override_path(store, self.root, path, value_id);
        let unchanged = new_root == self.root;
        store.decref(self.root);
        self.root = new_root;
        unchanged
    }

    pub fn get(&self, store: &NodeStore, addr: IpAddr) -> i32 {
        self.bind(store);
        evaluate(store, self.root, &address::encode_address(addr))
    }

    pub fn is_empty(&self) -> bool {
        self.root.as_terminal() == Some(self.default_value)
    }

    /// Structural equality under a shared store (SPEC_FULL §4.4): if both
    /// maps have been bound to a store and those stores differ, this
    /// debug-asserts rather than returning a coincidental result on
    /// colliding `NodeId`s.
    pub fn is_equal(&self, other: &IpMap) -> bool {
        if let (Some(a), Some(b)) = (self.store_id.get(), other.store_id.get()) {
            debug_assert_eq!(a, b, "comparing IpMaps built against different node stores");
        }
        self.root == other.root && self.default_value == other.default_value
    }

    pub fn memory_size(&self, store: &NodeStore) -> usize {
        self.bind(store);
        store.reachable_node_count(self.root) * std::mem::size_of::<Node>()
    }

    pub fn iterate<'a>(&self, store: &'a NodeStore, desired_value: i32) -> impl Iterator<Item = IpAddr> + 'a {
        self.bind(store);
        AddressIter::new(store, self.root, desired_value).map(|record| record.address)
    }

    pub fn iterate_networks<'a>(&self, store: &'a NodeStore, desired_value: i32) -> impl Iterator<Item = NetworkRecord> + 'a {
        self.bind(store);
        NetworkIter::new(store, self.root, desired_value)
    }

    pub fn save<W: std::io::Write>(&self, store: &NodeStore, writer: &mut W) -> Result<()> {
        self.bind(store);
        crate::serialize::save(writer, store, self.root)
    }

    /// Loads a map previously saved with `save`. The default value is not
    /// itself serialized, since it is only used for `is_empty`; the caller
    /// must supply the same one the map was built with.
    pub fn load<R: std::io::Read>(store: &mut NodeStore, reader: &mut R, default_value: i32) -> Result<IpMap> {
        let root = crate::serialize::load(reader, store)?;
        Ok(IpMap {
            root,
            default_value,
            store_id: Cell::new(Some(store.id())),
        })
    }
}
