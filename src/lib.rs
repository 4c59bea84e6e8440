//! ROBDD-backed sets and integer maps keyed by IPv4/IPv6 addresses and CIDR
//! networks.
//!
//! The engine is a canonical, reference-counted node store (`store`) plus
//! three memoized operators (`ops`) shared by every `IpSet`/`IpMap` rooted
//! in it. See `SPEC_FULL.md` in the repository root for the full design.

mod address;
mod assignment;
mod iter;
mod node;
mod ops;
mod serialize;
mod store;

pub mod ipmap;
pub mod ipset;

pub mod error;

#[cfg(feature = "cli")]
pub mod cli;

pub use address::{IPV4_BITS, IPV6_BITS};
pub use assignment::{Assignment, ExpandedAssignmentIter, Tribool};
pub use error::{Error, Result};
pub use ipmap::IpMap;
pub use ipset::IpSet;
pub use iter::{AddressIter, NetworkIter, NetworkRecord, PathIter};
pub use node::Variable;
pub use store::NodeStore;
