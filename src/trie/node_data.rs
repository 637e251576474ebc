//! Persistent node records.
//!
//! A node record carries its path fragment, a sparse vector of child
//! commitments and an optional terminal. Once written under its commitment
//! a record never changes; updates produce new records under new
//! commitments.

use std::collections::BTreeMap;

use crate::data::codec::{put_bytes16, ByteReader};
use crate::data::{decode_digits, encode_digits, PathArity};
use crate::error::TrieError;
use crate::model::{TerminalCommitment, VectorCommitment};

const FLAG_HAS_TERMINAL: u8 = 0x01;
const FLAG_HAS_CHILDREN: u8 = 0x02;
const FLAG_HAS_PATH: u8 = 0x04;

/// One persistent trie node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeData {
    /// This node's contribution to its key path, in unpacked digits.
    pub path_fragment: Vec<u8>,
    /// Child commitments by path digit. Sparse; ordered for deterministic
    /// serialization and iteration.
    pub children: BTreeMap<u8, VectorCommitment>,
    /// Commitment to the value stored at this node, if any.
    pub terminal: Option<TerminalCommitment>,
    /// This node's own commitment. Derived, not serialized: it is the key
    /// the record is stored under.
    pub commitment: Option<VectorCommitment>,
}

impl NodeData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes the record. Identical semantic content always yields
    /// identical bytes.
    pub fn to_bytes(&self, arity: PathArity) -> Vec<u8> {
        let mut flags = 0u8;
        if self.terminal.is_some() {
            flags |= FLAG_HAS_TERMINAL;
        }
        if !self.children.is_empty() {
            flags |= FLAG_HAS_CHILDREN;
        }
        if !self.path_fragment.is_empty() {
            flags |= FLAG_HAS_PATH;
        }

        let mut out = vec![flags];
        if flags & FLAG_HAS_PATH != 0 {
            put_bytes16(&mut out, &encode_digits(&self.path_fragment, arity));
        }
        if flags & FLAG_HAS_CHILDREN != 0 {
            let mut bitmap = vec![0u8; arity.bitmap_len()];
            for d in self.children.keys() {
                bitmap[*d as usize / 8] |= 1 << (*d as usize % 8);
            }
            out.extend_from_slice(&bitmap);
            for c in self.children.values() {
                out.push(c.as_bytes().len() as u8);
                out.extend_from_slice(c.as_bytes());
            }
        }
        if let Some(t) = &self.terminal {
            t.write_to(&mut out);
        }
        out
    }

    /// Deserializes a record, requiring every byte to be consumed. The
    /// node's own commitment is not part of the record; the caller sets it
    /// from the store key.
    pub fn from_bytes(bytes: &[u8], arity: PathArity) -> Result<Self, TrieError> {
        let mut r = ByteReader::new(bytes);
        let flags = r.take_u8()?;
        if flags & !(FLAG_HAS_TERMINAL | FLAG_HAS_CHILDREN | FLAG_HAS_PATH) != 0 {
            return Err(TrieError::Corrupted(format!(
                "unknown node record flags {flags:#04x}"
            )));
        }

        let path_fragment = if flags & FLAG_HAS_PATH != 0 {
            let fragment = decode_digits(r.take_bytes16()?, arity)?;
            if fragment.is_empty() {
                return Err(TrieError::Corrupted(
                    "node record with empty explicit path fragment".to_string(),
                ));
            }
            fragment
        } else {
            Vec::new()
        };

        let mut children = BTreeMap::new();
        if flags & FLAG_HAS_CHILDREN != 0 {
            let bitmap = r.take(arity.bitmap_len())?.to_vec();
            for i in 0..arity.bitmap_len() * 8 {
                if bitmap[i / 8] & (1 << (i % 8)) != 0 {
                    if i >= arity.num_children() {
                        return Err(TrieError::Corrupted(format!(
                            "child bit {i} out of range for arity {arity}"
                        )));
                    }
                    let c = r.take_bytes8()?;
                    children.insert(i as u8, VectorCommitment::from_bytes(c.to_vec()));
                }
            }
            if children.is_empty() {
                return Err(TrieError::Corrupted(
                    "node record with empty child bitmap".to_string(),
                ));
            }
        }

        let terminal = if flags & FLAG_HAS_TERMINAL != 0 {
            Some(TerminalCommitment::read_from(&mut r)?)
        } else {
            None
        };

        r.finish()?;
        Ok(Self {
            path_fragment,
            children,
            terminal,
            commitment: None,
        })
    }
}
