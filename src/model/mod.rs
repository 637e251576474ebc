//! Commitment models.
//!
//! A commitment model turns values into *terminal commitments* and node
//! records into *vector commitments*. The trie core treats both as opaque
//! bytes; everything cryptographic is behind the [`CommitmentModel`]
//! contract, so hash-based and polynomial vector-commitment schemes plug in
//! interchangeably.

mod blake2b;
mod proof;

pub use blake2b::{Blake2bModel, HashSize};
pub use proof::{MerkleProof, MerkleProofElement, ProvedStatus};

use std::fmt;

use crate::data::codec::ByteReader;
use crate::data::PathArity;
use crate::error::TrieError;
use crate::trie::NodeData;

/// A node's own commitment: an opaque byte string with equality and
/// bit-exact serialization. Also the key under which the node record is
/// stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct VectorCommitment {
    bytes: Vec<u8>,
}

impl VectorCommitment {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for VectorCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.bytes))
    }
}

/// Commitment to a value stored at a node. Short values are embedded in the
/// commitment itself; long values are committed by digest and persisted
/// separately in the value partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TerminalCommitment {
    bytes: Vec<u8>,
    stored_externally: bool,
}

// Serialized form: one byte carrying the external-storage flag (bit 7) and
// the payload length (bits 0..6), then the payload.
const TERMINAL_EXTERNAL_FLAG: u8 = 0x80;
const TERMINAL_LEN_MASK: u8 = 0x7f;

impl TerminalCommitment {
    pub fn new(bytes: Vec<u8>, stored_externally: bool) -> Self {
        debug_assert!(bytes.len() <= TERMINAL_LEN_MASK as usize);
        Self {
            bytes,
            stored_externally,
        }
    }

    /// The commitment payload: the embedded value, or the value digest when
    /// stored externally.
    pub fn payload(&self) -> &[u8] {
        &self.bytes
    }

    /// True when the committed value lives in the value partition.
    pub fn is_stored_externally(&self) -> bool {
        self.stored_externally
    }

    /// Self-delimiting serialized form, also the value-partition key for
    /// externally stored values.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.bytes.len());
        self.write_to(&mut out);
        out
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        let mut flags_len = self.bytes.len() as u8;
        if self.stored_externally {
            flags_len |= TERMINAL_EXTERNAL_FLAG;
        }
        out.push(flags_len);
        out.extend_from_slice(&self.bytes);
    }

    pub(crate) fn read_from(r: &mut ByteReader<'_>) -> Result<Self, TrieError> {
        let flags_len = r.take_u8()?;
        let len = (flags_len & TERMINAL_LEN_MASK) as usize;
        if len == 0 {
            return Err(TrieError::Corrupted(
                "terminal commitment with empty payload".to_string(),
            ));
        }
        Ok(Self {
            bytes: r.take(len)?.to_vec(),
            stored_externally: flags_len & TERMINAL_EXTERNAL_FLAG != 0,
        })
    }
}

impl fmt::Display for TerminalCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.bytes))
    }
}

/// Capability set of a commitment scheme. Dispatched dynamically so tries
/// over different models share one core.
pub trait CommitmentModel: Send + Sync {
    /// Short tag naming the scheme and its parameters.
    fn short_name(&self) -> String;

    /// The path arity this model commits over.
    fn path_arity(&self) -> PathArity;

    /// Byte length of a vector commitment.
    fn commitment_size(&self) -> usize;

    /// Commits to raw value bytes, deciding whether the value is embedded
    /// or must be stored externally.
    fn commit_to_data(&self, data: &[u8]) -> TerminalCommitment;

    /// Deterministic commitment to a node record: a function of the path
    /// fragment, the child commitment vector and the terminal.
    fn calc_node_commitment(&self, node: &NodeData) -> VectorCommitment;

    /// Incremental recomputation hook used during commit. Models without a
    /// cheaper incremental form recompute from scratch.
    fn update_node_commitment(&self, node: &NodeData) -> VectorCommitment {
        self.calc_node_commitment(node)
    }

    /// Commitments compare by their serialized bytes.
    fn equal_commitments(&self, a: &VectorCommitment, b: &VectorCommitment) -> bool {
        a == b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_roundtrip() {
        for (bytes, external) in [
            (b"short".to_vec(), false),
            (vec![0xaa; 32], true),
            (vec![1], false),
        ] {
            let t = TerminalCommitment::new(bytes, external);
            let enc = t.to_bytes();
            let mut r = ByteReader::new(&enc);
            let back = TerminalCommitment::read_from(&mut r).unwrap();
            assert!(r.is_empty());
            assert_eq!(back, t);
        }
    }

    #[test]
    fn test_terminal_rejects_empty_payload() {
        let mut r = ByteReader::new(&[0x80]);
        assert!(TerminalCommitment::read_from(&mut r).is_err());
    }

    #[test]
    fn test_commitment_display_is_hex() {
        let c = VectorCommitment::from_bytes(vec![0xde, 0xad]);
        assert_eq!(c.to_string(), "dead");
    }
}
