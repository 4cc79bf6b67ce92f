//! Shared types and ring arithmetic for rondo.
//!
//! This crate defines the 160-bit identifier space every other rondo
//! crate works in: the [`NodeId`] identifier, the two interval
//! predicates ([`between`], [`between_right_inc`]) that are the only
//! way ring order is ever interpreted, the [`finger_offset`]
//! computation for routing-table targets, and the small value types
//! ([`Peer`], [`KeyValue`]) shared between the node and the wire.

use std::cmp::Ordering;
use std::fmt;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Width of the identifier space in bits (SHA-1 output width).
///
/// The ring is the integers modulo `2^M`, arranged in a circle with
/// clockwise = increasing.
pub const M: usize = 160;

/// Width of an identifier in bytes.
pub const ID_BYTES: usize = M / 8;

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// A 160-bit ring identifier.
///
/// Canonically the big-endian SHA-1 digest of a node's listen address
/// (or of a key, for placement). The derived `Ord` is lexicographic
/// over the 20 bytes, which coincides with unsigned integer order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId([u8; ID_BYTES]);

impl NodeId {
    /// Derive an identifier by hashing arbitrary data with SHA-1.
    pub fn hash(data: &[u8]) -> Self {
        let digest = Sha1::digest(data);
        Self(digest.into())
    }

    /// Return the raw 20-byte big-endian representation.
    pub fn as_bytes(&self) -> &[u8; ID_BYTES] {
        &self.0
    }

    /// First 8 hex characters, for log lines.
    pub fn short(&self) -> String {
        let mut s = String::with_capacity(8);
        for byte in &self.0[..4] {
            s.push_str(&format!("{byte:02x}"));
        }
        s
    }
}

impl From<[u8; ID_BYTES]> for NodeId {
    fn from(bytes: [u8; ID_BYTES]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for NodeId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self)
    }
}

// ---------------------------------------------------------------------------
// Interval predicates
// ---------------------------------------------------------------------------

/// Whether `a` lies strictly inside the clockwise arc from `l` to `r`.
///
/// The degenerate case `l == r` denotes the whole ring, so every
/// identifier qualifies. When the arc wraps past zero (`l > r`), `a`
/// qualifies on either side of the wrap point.
pub fn between(a: NodeId, l: NodeId, r: NodeId) -> bool {
    match l.cmp(&r) {
        Ordering::Less => l < a && a < r,
        Ordering::Greater => a > l || a < r,
        Ordering::Equal => true,
    }
}

/// [`between`], with the right bound included in the arc.
pub fn between_right_inc(a: NodeId, l: NodeId, r: NodeId) -> bool {
    a == r || between(a, l, r)
}

// ---------------------------------------------------------------------------
// Finger offsets
// ---------------------------------------------------------------------------

/// The ring position `(id + 2^i) mod 2^M`.
///
/// The successor of this position is what the `i`-th finger-table
/// entry points at. `finger_offset(id, M)` wraps all the way around
/// and equals `id`.
pub fn finger_offset(id: NodeId, i: usize) -> NodeId {
    let sum = BigUint::from_bytes_be(id.as_bytes()) + (BigUint::from(1u8) << i);
    let wrapped = sum % (BigUint::from(1u8) << M);

    let digits = wrapped.to_bytes_be();
    let mut bytes = [0u8; ID_BYTES];
    bytes[ID_BYTES - digits.len()..].copy_from_slice(&digits);
    NodeId(bytes)
}

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// A routing-table entry: another node, held by identifier and
/// address string.
///
/// Peers are never held by connection or owning reference. The address
/// is the identity; connections are dialed on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// The peer's ring identifier (`NodeId::hash` of its address).
    pub id: NodeId,
    /// The peer's listen address, conventionally `host:port`.
    pub addr: String,
}

impl Peer {
    /// Build a peer from an address, deriving the identifier.
    pub fn from_addr(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        Self {
            id: NodeId::hash(addr.as_bytes()),
            addr,
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id.short(), self.addr)
    }
}

/// A client-facing key/value pair, as accepted by `Save`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    /// The lookup key. Placement is by `NodeId::hash` of this string.
    pub key: String,
    /// Opaque value bytes.
    pub value: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    use super::*;

    fn id(bytes: &[u8]) -> NodeId {
        NodeId::hash(bytes)
    }

    /// Build an id directly from a small integer, big-endian.
    fn raw(n: u128) -> NodeId {
        let mut bytes = [0u8; ID_BYTES];
        bytes[ID_BYTES - 16..].copy_from_slice(&n.to_be_bytes());
        NodeId::from(bytes)
    }

    #[test]
    fn hash_is_deterministic_and_20_bytes() {
        let a = NodeId::hash(b"127.0.0.1:9988");
        let b = NodeId::hash(b"127.0.0.1:9988");
        assert_eq!(a, b);
        assert_eq!(a.as_bytes().len(), 20);
        assert_ne!(a, NodeId::hash(b"127.0.0.1:9989"));
    }

    #[test]
    fn hash_matches_known_sha1_vector() {
        let h = NodeId::hash(b"hello");
        assert_eq!(h.to_string(), "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
    }

    #[test]
    fn between_ordinary_arc() {
        assert!(between(raw(5), raw(1), raw(10)));
        assert!(!between(raw(1), raw(1), raw(10)));
        assert!(!between(raw(10), raw(1), raw(10)));
        assert!(!between(raw(0), raw(1), raw(10)));
        assert!(!between(raw(11), raw(1), raw(10)));
    }

    #[test]
    fn between_wrapping_arc() {
        // Arc from 10 clockwise to 1 passes through the origin.
        assert!(between(raw(11), raw(10), raw(1)));
        assert!(between(raw(0), raw(10), raw(1)));
        assert!(!between(raw(5), raw(10), raw(1)));
        assert!(!between(raw(10), raw(10), raw(1)));
        assert!(!between(raw(1), raw(10), raw(1)));
    }

    #[test]
    fn between_degenerate_arc_is_whole_ring() {
        assert!(between(raw(0), raw(7), raw(7)));
        assert!(between(raw(7), raw(7), raw(7)));
        assert!(between(raw(u128::MAX), raw(7), raw(7)));
    }

    #[test]
    fn between_right_inc_includes_right_bound() {
        assert!(between_right_inc(raw(10), raw(1), raw(10)));
        assert!(between_right_inc(raw(1), raw(10), raw(1)));
        assert!(!between_right_inc(raw(1), raw(1), raw(10)));
    }

    /// Model implementation: rotate the ring so `l` sits at the
    /// origin, then test `0 < (a - l) < (r - l)` in plain integers.
    fn between_model(a: NodeId, l: NodeId, r: NodeId) -> bool {
        if l == r {
            return true;
        }
        let modulus = BigUint::from(1u8) << M;
        let a = BigUint::from_bytes_be(a.as_bytes());
        let l = BigUint::from_bytes_be(l.as_bytes());
        let r = BigUint::from_bytes_be(r.as_bytes());
        let rel_a = (&modulus + &a - &l) % &modulus;
        let rel_r = (&modulus + &r - &l) % &modulus;
        BigUint::from(0u8) < rel_a && rel_a < rel_r
    }

    #[test]
    fn between_agrees_with_rotation_model_on_random_triples() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..20_000 {
            let mut pick = || {
                // Mix full-width ids with tiny ones so the
                // equal-bound and near-origin branches get exercised.
                if rng.gen_ratio(1, 8) {
                    raw(rng.gen_range(0..4))
                } else {
                    let mut bytes = [0u8; ID_BYTES];
                    rng.fill(&mut bytes);
                    NodeId::from(bytes)
                }
            };
            let (a, l, r) = (pick(), pick(), pick());
            assert_eq!(
                between(a, l, r),
                between_model(a, l, r),
                "between({a}, {l}, {r})"
            );
            assert_eq!(
                between_right_inc(a, l, r),
                a == r || between_model(a, l, r),
                "between_right_inc({a}, {l}, {r})"
            );
        }
    }

    #[test]
    fn finger_offset_small_steps() {
        let base = raw(100);
        assert_eq!(finger_offset(base, 0), raw(101));
        assert_eq!(finger_offset(base, 1), raw(102));
        assert_eq!(finger_offset(base, 4), raw(116));
    }

    #[test]
    fn finger_offset_wraps_at_ring_size() {
        // 2^M mod 2^M = 0: a full trip around the ring.
        let ids = [id(b"a"), id(b"b"), raw(0), raw(u128::MAX)];
        for n in ids {
            assert_eq!(finger_offset(n, M), n);
        }
    }

    #[test]
    fn finger_offset_wraps_past_zero() {
        // id = 2^160 - 1, offset 2^0 wraps to 0.
        let top = NodeId::from([0xff; ID_BYTES]);
        assert_eq!(finger_offset(top, 0), raw(0));
    }

    #[test]
    fn peer_from_addr_derives_id() {
        let p = Peer::from_addr("10.0.0.1:9988");
        assert_eq!(p.id, NodeId::hash(b"10.0.0.1:9988"));
        assert_eq!(p.addr, "10.0.0.1:9988");
    }
}
