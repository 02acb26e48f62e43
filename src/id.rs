//! Identifiers on the circular 160-bit address space.
//!
//! A [NodeId] locates a node or a key on a finite ring R(P) where P = 2^160.
//! Ring arithmetic wraps modulo P; plain `Ord` on a NodeId is numeric order.
//! Digits are extracted least-significant first in base `2^b`, which is the
//! row numbering convention shared by the routing table and the protocols.
use std::cmp::Ordering;
use std::ops::Add;
use std::ops::Neg;
use std::ops::Sub;
use std::str::FromStr;

use num_bigint::BigUint;
use serde::Deserialize;
use serde::Serialize;

use crate::consts::ID_BITS;
use crate::error::Error;
use crate::error::Result;

const ID_BYTES: usize = ID_BITS / 8;

/// A fixed-width identifier on the ring. Immutable once created.
#[derive(Copy, Clone, Eq, Ord, PartialEq, PartialOrd, Hash, Serialize, Deserialize)]
pub struct NodeId([u8; ID_BYTES]);

/// Result of [NodeId::distance]: the shorter way around the ring between two
/// ids, comparable but deliberately not an arithmetic value.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct Distance(NodeId);

impl NodeId {
    /// Build from raw big-endian bytes.
    pub fn from_bytes(bytes: [u8; ID_BYTES]) -> Self {
        Self(bytes)
    }

    /// Raw big-endian bytes.
    pub fn as_bytes(&self) -> &[u8; ID_BYTES] {
        &self.0
    }

    /// Number of digits an id has in base `2^base_bits`.
    pub fn num_digits(base_bits: u8) -> usize {
        ID_BITS / base_bits as usize
    }

    /// Extract the digit at `index` in base `2^base_bits`.
    /// Index 0 is the least significant digit.
    pub fn digit(&self, index: usize, base_bits: u8) -> u8 {
        let mut value = 0u8;
        for k in 0..base_bits as usize {
            let bit = index * base_bits as usize + k;
            if bit >= ID_BITS {
                break;
            }
            let byte = self.0[ID_BYTES - 1 - bit / 8];
            if (byte >> (bit % 8)) & 1 == 1 {
                value |= 1 << k;
            }
        }
        value
    }

    /// Index of the most significant digit at which `self` and `other`
    /// disagree, or `None` if the ids are equal. This is the routing table
    /// row a handle for `other` belongs to.
    pub fn index_of_msdd(&self, other: NodeId, base_bits: u8) -> Option<usize> {
        (0..Self::num_digits(base_bits))
            .rev()
            .find(|&i| self.digit(i, base_bits) != other.digit(i, base_bits))
    }

    /// Ring distance to `other`: the shorter of the clockwise and
    /// counter-clockwise ways around.
    pub fn distance(&self, other: NodeId) -> Distance {
        let cw = other - *self;
        let ccw = *self - other;
        Distance(if cw <= ccw { cw } else { ccw })
    }

    /// Test `self` strictly between `a` and `b` walking clockwise from `base`.
    pub fn in_range(&self, base: Self, a: Self, b: Self) -> bool {
        *self - base > a - base && b - base > *self - base
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "0x")?;
        for b in self.0.iter() {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl From<NodeId> for BigUint {
    fn from(id: NodeId) -> BigUint {
        BigUint::from_bytes_be(&id.0)
    }
}

impl From<BigUint> for NodeId {
    fn from(n: BigUint) -> Self {
        let wrapped = n % (BigUint::from(2u16).pow(ID_BITS as u32));
        let mut tail = wrapped.to_bytes_be();
        let mut bytes = vec![0u8; ID_BYTES - tail.len()];
        bytes.append(&mut tail);
        let mut fixed = [0u8; ID_BYTES];
        fixed.copy_from_slice(&bytes);
        Self(fixed)
    }
}

impl From<u32> for NodeId {
    fn from(n: u32) -> Self {
        Self::from(BigUint::from(n))
    }
}

impl From<u64> for NodeId {
    fn from(n: u64) -> Self {
        Self::from(BigUint::from(n))
    }
}

impl FromStr for NodeId {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.len() != ID_BYTES * 2 {
            return Err(Error::BadIdLength(ID_BYTES * 2));
        }
        let mut bytes = [0u8; ID_BYTES];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex = std::str::from_utf8(chunk).map_err(|_| Error::BadHexId)?;
            bytes[i] = u8::from_str_radix(hex, 16).map_err(|_| Error::BadHexId)?;
        }
        Ok(Self(bytes))
    }
}

impl Neg for NodeId {
    type Output = Self;
    fn neg(self) -> Self {
        (BigUint::from(2u16).pow(ID_BITS as u32) - BigUint::from(self)).into()
    }
}

impl Add for NodeId {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        ((BigUint::from(self) + BigUint::from(rhs)) % (BigUint::from(2u16).pow(ID_BITS as u32)))
            .into()
    }
}

impl Sub for NodeId {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}

/// Sort a list of ids by clockwise distance from a base id.
pub trait SortRing {
    fn sort_from(&mut self, base: NodeId);
}

impl SortRing for Vec<NodeId> {
    fn sort_from(&mut self, base: NodeId) {
        self.sort_by(|a, b| {
            let (da, db) = (*a - base, *b - base);
            da.partial_cmp(&db).unwrap_or(Ordering::Equal)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_neg() {
        let zero = NodeId::from(0u32);
        let a = NodeId::from_str("0x11E807fcc88dD319270493fB2e822e388Fe36ab0").unwrap();
        assert_eq!(-a + a, zero);
        assert_eq!(-(-a), a);
    }

    #[test]
    fn test_wraparound() {
        assert_eq!(
            NodeId::from(0u32),
            NodeId::from(BigUint::from(2u16).pow(160))
        );
        let a = NodeId::from(1u32);
        let b = -NodeId::from(1u32); // 2^160 - 1
        assert_eq!(a + b, NodeId::from(0u32));
    }

    #[test]
    fn test_digit_extraction() {
        // 0x...a5: digit 0 (low nibble) is 5, digit 1 is 0xa.
        let id = NodeId::from(0xa5u32);
        assert_eq!(id.digit(0, 4), 0x5);
        assert_eq!(id.digit(1, 4), 0xa);
        assert_eq!(id.digit(2, 4), 0x0);

        // base 2^2: 0xa5 = 0b10100101 -> digits 01, 01, 10, 10 from the low end
        assert_eq!(id.digit(0, 2), 0b01);
        assert_eq!(id.digit(1, 2), 0b01);
        assert_eq!(id.digit(2, 2), 0b10);
        assert_eq!(id.digit(3, 2), 0b10);

        assert_eq!(id.digit(0, 8), 0xa5);
    }

    #[test]
    fn test_index_of_msdd() {
        let a = NodeId::from(0x1200u32);
        let b = NodeId::from(0x1300u32);
        // differ at the third nibble from the low end
        assert_eq!(a.index_of_msdd(b, 4), Some(2));
        assert_eq!(a.index_of_msdd(a, 4), None);

        let c = NodeId::from(0x1201u32);
        assert_eq!(a.index_of_msdd(c, 4), Some(0));
    }

    #[test]
    fn test_distance_both_ways() {
        let a = NodeId::from(10u32);
        let b = NodeId::from(250u32);
        assert_eq!(a.distance(b), b.distance(a));
        // straight-line distance 240 is shorter than the way around
        assert_eq!(a.distance(b), Distance(NodeId::from(240u32)));

        // near the wrap point the short way crosses zero
        let hi = -NodeId::from(5u32); // 2^160 - 5
        let lo = NodeId::from(5u32);
        assert_eq!(hi.distance(lo), Distance(NodeId::from(10u32)));
        assert!(hi.distance(lo) < hi.distance(NodeId::from(100u32)));
    }

    #[test]
    fn test_sort_from() {
        let a = NodeId::from(10u32);
        let b = NodeId::from(20u32);
        let c = NodeId::from(30u32);
        let mut v = vec![c, a, b];
        v.sort_from(b);
        assert_eq!(v, vec![b, c, a]);
    }
}
