//! Translation between `IpAddr`/CIDR networks and BDD variable assignments
//! (SPEC_FULL §3, §4.4).
//!
//! Variable 0 selects the family (`true` = IPv4, `false` = IPv6); variables
//! `1..=32` or `1..=128` are the address bits in big-endian order.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::assignment::{Assignment, Tribool};
use crate::error::{Error, Result};
use crate::node::Variable;

pub const IPV4_BITS: u32 = 32;
pub const IPV6_BITS: u32 = 128;

pub fn family_bit(addr: &IpAddr) -> bool {
    matches!(addr, IpAddr::V4(_))
}

pub fn max_prefix(addr: &IpAddr) -> u32 {
    match addr {
        IpAddr::V4(_) => IPV4_BITS,
        IpAddr::V6(_) => IPV6_BITS,
    }
}

fn address_bits(addr: &IpAddr) -> Vec<bool> {
    let octets: Vec<u8> = match addr {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    };
    octets
        .iter()
        .flat_map(|byte| (0..8).rev().map(move |shift| (byte >> shift) & 1 == 1))
        .collect()
}

/// Full-length variable path for a single address: the family bit followed
/// by every address bit.
pub fn encode_address(addr: IpAddr) -> Vec<(Variable, bool)> {
    let mut path = Vec::with_capacity(1 + max_prefix(&addr) as usize);
    path.push((Variable::FAMILY, family_bit(&addr)));
    for (i, bit) in address_bits(&addr).into_iter().enumerate() {
        path.push((Variable(1 + i as u32), bit));
    }
    path
}

/// Family bit followed by the first `prefix` address bits. In strict mode
/// (`lenient = false`), rejects a network whose bits past the prefix are
/// non-zero (SPEC_FULL §4.4's CIDR validation).
pub fn encode_network(addr: IpAddr, prefix: u8, lenient: bool) -> Result<Vec<(Variable, bool)>> {
    let max = max_prefix(&addr);
    if u32::from(prefix) > max {
        return Err(Error::InvalidNetwork);
    }
    let bits = address_bits(&addr);
    if !lenient && bits[prefix as usize..].iter().any(|&bit| bit) {
        return Err(Error::InvalidNetwork);
    }

    let mut path = Vec::with_capacity(1 + prefix as usize);
    path.push((Variable::FAMILY, family_bit(&addr)));
    for (i, &bit) in bits.iter().take(prefix as usize).enumerate() {
        path.push((Variable(1 + i as u32), bit));
    }
    Ok(path)
}

/// Reconstructs a network `(address, cidr_prefix)` from a path-iterator
/// assignment, for a chosen family. Address bits still `Either` past the
/// first such cell are taken as 0 (the summarized network's base address);
/// by construction (see `iter.rs`) no concrete bit ever follows an `Either`
/// one, so the first `Either` position is exactly the CIDR prefix length.
pub fn decode_network(assignment: &Assignment, is_ipv4: bool) -> (IpAddr, u8) {
    let max = if is_ipv4 { IPV4_BITS } else { IPV6_BITS };
    let byte_len = if is_ipv4 { 4 } else { 16 };
    let mut bytes = vec![0u8; byte_len];
    let mut prefix = max;

    for i in 0..max {
        match assignment.get(Variable(1 + i)) {
            Tribool::Either => {
                prefix = i;
                break;
            }
            Tribool::True => set_bit(&mut bytes, i),
            Tribool::False => {}
        }
    }

    let addr = if is_ipv4 {
        IpAddr::V4(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
    } else {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&bytes);
        IpAddr::V6(Ipv6Addr::from(octets))
    };
    (addr, prefix as u8)
}

fn set_bit(bytes: &mut [u8], index: u32) {
    let byte_index = (index / 8) as usize;
    let bit_index = 7 - (index % 8);
    bytes[byte_index] |= 1 << bit_index;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn encode_address_sets_family_and_every_bit() {
        let addr: IpAddr = Ipv4Addr::new(1, 2, 3, 4).into();
        let path = encode_address(addr);
        assert_eq!(1 + 32, path.len());
        assert_eq!((Variable::FAMILY, true), path[0]);
    }

    #[test]
    fn encode_network_rejects_nonzero_host_bits_by_default() {
        let addr: IpAddr = Ipv4Addr::new(10, 0, 0, 1).into();
        assert!(encode_network(addr, 8, false).is_err());
        assert!(encode_network(addr, 8, true).is_ok());
    }

    #[test]
    fn encode_network_prefix_zero_has_only_family_bit() {
        let addr: IpAddr = Ipv4Addr::new(0, 0, 0, 0).into();
        let path = encode_network(addr, 0, false).unwrap();
        assert_eq!(1, path.len());
    }

    #[test]
    fn decode_network_roundtrips_a_concrete_prefix() {
        let addr: IpAddr = Ipv4Addr::new(10, 0, 0, 0).into();
        let path = encode_network(addr, 8, false).unwrap();
        let mut assignment = Assignment::new();
        for (var, bit) in path.into_iter().skip(1) {
            assignment.set(var, Tribool::from_bool(bit));
        }
        let (decoded_addr, decoded_prefix) = decode_network(&assignment, true);
        assert_eq!(addr, decoded_addr);
        assert_eq!(8, decoded_prefix);
    }
}
