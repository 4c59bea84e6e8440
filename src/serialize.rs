//! The versioned binary format (SPEC_FULL §4.5): big-endian throughout,
//! node ids reassigned by reverse-postorder reachability so that every
//! reference points strictly backwards in the stream.

use std::collections::HashMap;
use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::node::{NodeId, Variable};
use crate::store::NodeStore;

const MAGIC: &[u8; 6] = b"IP set";
const VERSION: u16 = 1;
const HEADER_LEN: u64 = 6 + 2 + 8 + 4;
const RECORD_LEN: u64 = 1 + 4 + 4;
const TRAILER_LEN: u64 = 4;

pub fn save<W: Write>(writer: &mut W, store: &NodeStore, root: NodeId) -> Result<()> {
    let order = store.reverse_postorder(root);
    assert!(
        order.len() <= i32::MAX as usize,
        "serialized BDD exceeds the on-disk signed 32-bit node id range"
    );

    let mut disk_id = HashMap::with_capacity(order.len());
    for (i, &id) in order.iter().enumerate() {
        disk_id.insert(id, -(i as i32) - 1);
    }
    let resolve = |id: NodeId, disk_id: &HashMap<NodeId, i32>| -> i32 {
        id.as_terminal().unwrap_or_else(|| disk_id[&id])
    };

    let n = order.len() as u32;
    let total_len = HEADER_LEN + u64::from(n) * RECORD_LEN + TRAILER_LEN;

    writer.write_all(MAGIC)?;
    writer.write_u16::<BigEndian>(VERSION)?;
    writer.write_u64::<BigEndian>(total_len)?;
    writer.write_u32::<BigEndian>(n)?;

    for &id in &order {
        let variable = store.variable_of(id).expect("reverse_postorder only lists nonterminals");
        debug_assert!(variable.0 <= u32::from(u8::MAX));
        let node = store.children(id);
        writer.write_u8(variable.0 as u8)?;
        writer.write_i32::<BigEndian>(resolve(node.low, &disk_id))?;
        writer.write_i32::<BigEndian>(resolve(node.high, &disk_id))?;
    }

    writer.write_i32::<BigEndian>(resolve(root, &disk_id))?;
    Ok(())
}

pub fn load<R: Read>(reader: &mut R, store: &mut NodeStore) -> Result<NodeId> {
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::Parse("bad magic".to_string()));
    }

    let version = reader.read_u16::<BigEndian>()?;
    if version != VERSION {
        return Err(Error::Parse(format!("unsupported version {}", version)));
    }

    let total_len = reader.read_u64::<BigEndian>()?;
    let n = reader.read_u32::<BigEndian>()?;
    let expected_len = HEADER_LEN + u64::from(n) * RECORD_LEN + TRAILER_LEN;
    if expected_len != total_len {
        log::debug!("serialized length mismatch: header says {}, computed {}", total_len, expected_len);
        return Err(Error::Parse("length field does not match node count".to_string()));
    }

    let mut mapping: Vec<NodeId> = Vec::with_capacity(n as usize);
    for index in 0..n as usize {
        let variable = reader.read_u8()?;
        let low_raw = reader.read_i32::<BigEndian>()?;
        let high_raw = reader.read_i32::<BigEndian>()?;
        let low = resolve(store, &mapping, low_raw, index)?;
        let high = resolve(store, &mapping, high_raw, index)?;
        let id = store.nonterminal(Variable(u32::from(variable)), low, high);
        mapping.push(id);
    }

    let root_raw = reader.read_i32::<BigEndian>()?;
    let root = resolve(store, &mapping, root_raw, n as usize)?;

    let mut probe = [0u8; 1];
    match reader.read(&mut probe) {
        Ok(0) => {}
        Ok(_) => return Err(Error::Parse("trailing bytes after the final node id".to_string())),
        Err(e) => return Err(Error::Io(e)),
    }

    Ok(root)
}

/// Maps a disk-encoded id to an in-memory one. `at` is the index of the
/// record currently being read (or `n` for the trailing root id); a
/// reference must name a strictly earlier record.
fn resolve(store: &mut NodeStore, mapping: &[NodeId], raw: i32, at: usize) -> Result<NodeId> {
    if raw >= 0 {
        return Ok(store.terminal(raw));
    }
    let index = (-raw - 1) as usize;
    if index >= at {
        return Err(Error::Parse("child reference out of range".to_string()));
    }
    let id = mapping[index];
    store.incref(id);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::override_path;

    #[test]
    fn empty_set_serializes_to_24_bytes() {
        let store = NodeStore::new();
        let mut buf = Vec::new();
        save(&mut buf, &store, NodeId::zero()).unwrap();
        assert_eq!(24, buf.len());

        let mut store = NodeStore::new();
        let root = load(&mut buf.as_slice(), &mut store).unwrap();
        assert_eq!(NodeId::zero(), root);
    }

    #[test]
    fn round_trips_a_nonterminal_bdd() {
        let mut store = NodeStore::new();
        let path = vec![(Variable(0), true), (Variable(1), false), (Variable(2), true)];
        let root = override_path(&mut store, NodeId::zero(), &path, NodeId::one());

        let mut buf = Vec::new();
        save(&mut buf, &store, root).unwrap();

        let mut loaded_store = NodeStore::new();
        let loaded_root = load(&mut buf.as_slice(), &mut loaded_store).unwrap();
        assert_eq!(
            loaded_store.reachable_node_count(loaded_root),
            store.reachable_node_count(root)
        );
    }

    #[test]
    fn rejects_bad_magic() {
        let mut store = NodeStore::new();
        let bytes = vec![0u8; 24];
        assert!(load(&mut bytes.as_slice(), &mut store).is_err());
    }

    #[test]
    fn rejects_trailing_bytes() {
        let store = NodeStore::new();
        let mut buf = Vec::new();
        save(&mut buf, &store, NodeId::zero()).unwrap();
        buf.push(0);

        let mut store = NodeStore::new();
        assert!(load(&mut buf.as_slice(), &mut store).is_err());
    }

    #[test]
    fn rejects_out_of_range_child_reference() {
        let mut buf = Vec::new();
        // Hand-build a single-record stream whose low child points forward.
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&VERSION.to_be_bytes());
        let total_len = HEADER_LEN + RECORD_LEN + TRAILER_LEN;
        buf.extend_from_slice(&total_len.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.push(0); // variable
        buf.extend_from_slice(&(-2i32).to_be_bytes()); // low: out of range
        buf.extend_from_slice(&0i32.to_be_bytes()); // high
        buf.extend_from_slice(&(-1i32).to_be_bytes()); // trailing root

        let mut store2 = NodeStore::new();
        assert!(load(&mut buf.as_slice(), &mut store2).is_err());
    }
}
