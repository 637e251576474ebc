//! Merkle proofs for the hash commitment model.
//!
//! A proof carries the unpacked key and, per node on the walk from the
//! root, the path fragment, all sibling child commitments and the terminal
//! commitment. The commitment on the walked edge is omitted: the verifier
//! recomputes it bottom-up and compares the final result against the root.
//! The last element's child slot records how the walk ended: the terminal
//! slot for a walk that reached its key, the path-extension slot otherwise.
//! A proof therefore attests inclusion or absence.

use std::collections::BTreeMap;

use super::blake2b::{Blake2bModel, HashSize};
use super::{CommitmentModel, VectorCommitment};
use crate::data::codec::{put_bytes16, put_u16_le, ByteReader};
use crate::data::{decode_digits, encode_digits, unpack_key, PathArity};
use crate::error::TrieError;
use crate::trie::TrieReader;

const FLAG_HAS_TERMINAL: u8 = 0x01;
const FLAG_HAS_CHILDREN: u8 = 0x02;

/// Children bitmap width in serialized proof elements, fixed regardless of
/// arity.
const PROOF_BITMAP_LEN: usize = 32;

/// What a validated proof attests for its key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProvedStatus {
    /// The key is committed; carries the serialized terminal commitment.
    Inclusion(Vec<u8>),
    /// The key is not present in the committed state.
    Absence,
}

/// One node on the proof path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleProofElement {
    /// The node's path fragment, unpacked.
    pub path_fragment: Vec<u8>,
    /// Child commitments by digit; the walked edge is omitted on all but
    /// the last element.
    pub children: BTreeMap<u8, Vec<u8>>,
    /// Serialized terminal commitment, if the node carries one.
    pub terminal: Option<Vec<u8>>,
    /// Child slot toward the next element; ending slot on the last
    /// element.
    pub child_index: u16,
}

/// Proof of inclusion or absence of one key under one root commitment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleProof {
    pub arity: PathArity,
    pub hash_size: HashSize,
    /// The proved key, unpacked.
    pub key: Vec<u8>,
    pub path: Vec<MerkleProofElement>,
}

impl Blake2bModel {
    /// Extracts the proof for `key` from a committed trie. The trie must
    /// use this model.
    pub fn proof(&self, key: &[u8], trie: &TrieReader) -> Result<MerkleProof, TrieError> {
        let unpacked = unpack_key(key, trie.path_arity());
        let (path, _ending) = trie.node_path(&unpacked)?;
        let last = path.len() - 1;
        let elements = path
            .into_iter()
            .enumerate()
            .map(|(i, e)| {
                let mut children = BTreeMap::new();
                for (d, c) in &e.node_data.children {
                    if i < last && *d as u16 == e.child_index {
                        // recomputed by the verifier
                        continue;
                    }
                    children.insert(*d, c.as_bytes().to_vec());
                }
                MerkleProofElement {
                    path_fragment: e.node_data.path_fragment,
                    children,
                    terminal: e.node_data.terminal.map(|t| t.to_bytes()),
                    child_index: e.child_index,
                }
            })
            .collect();

        Ok(MerkleProof {
            arity: self.path_arity(),
            hash_size: self.hash_size(),
            key: unpacked,
            path: elements,
        })
    }
}

impl MerkleProof {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.arity.to_byte(), self.hash_size.to_byte()];
        put_bytes16(&mut out, &encode_digits(&self.key, self.arity));
        put_u16_le(&mut out, self.path.len() as u16);
        for e in &self.path {
            e.write_to(&mut out, self.arity);
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TrieError> {
        let mut r = ByteReader::new(bytes);
        let arity = PathArity::from_byte(r.take_u8()?)?;
        let hash_size = HashSize::from_byte(r.take_u8()?)?;
        let key = decode_digits(r.take_bytes16()?, arity)?;
        let len = r.take_u16_le()? as usize;
        let mut path = Vec::with_capacity(len);
        for _ in 0..len {
            path.push(MerkleProofElement::read_from(&mut r, arity, hash_size)?);
        }
        r.finish()?;
        Ok(Self {
            arity,
            hash_size,
            key,
            path,
        })
    }

    /// Checks the proof against `root`: structural consistency of the
    /// path with the key, then bottom-up recomputation of the commitment
    /// chain. Returns what the proof attests.
    pub fn validate(
        &self,
        model: &Blake2bModel,
        root: &VectorCommitment,
    ) -> Result<ProvedStatus, TrieError> {
        if model.path_arity() != self.arity || model.hash_size() != self.hash_size {
            return Err(TrieError::InvalidProof(
                "proof parameters do not match the model".to_string(),
            ));
        }
        let Some(last) = self.path.len().checked_sub(1) else {
            return Err(TrieError::InvalidProof("empty proof path".to_string()));
        };

        // walk the key through the path elements
        let mut pos = 0usize;
        for e in &self.path[..last] {
            if !self.key[pos..].starts_with(&e.path_fragment) {
                return Err(TrieError::InvalidProof(
                    "path fragment deviates from the key".to_string(),
                ));
            }
            pos += e.path_fragment.len();
            let Some(&digit) = self.key.get(pos) else {
                return Err(TrieError::InvalidProof(
                    "key exhausted before the end of the path".to_string(),
                ));
            };
            if e.child_index != digit as u16 {
                return Err(TrieError::InvalidProof(
                    "child index deviates from the key".to_string(),
                ));
            }
            pos += 1;
        }
        let status = self.ending_status(&self.path[last], &self.key[pos..])?;

        // recompute the commitment chain bottom-up
        let mut computed: Option<Vec<u8>> = None;
        for (i, e) in self.path.iter().enumerate().rev() {
            let mut children: BTreeMap<u8, &[u8]> =
                e.children.iter().map(|(d, c)| (*d, c.as_slice())).collect();
            if let Some(below) = &computed {
                if i < last {
                    children.insert(e.child_index as u8, below.as_slice());
                }
            }
            let encoded = encode_digits(&e.path_fragment, self.arity);
            computed = Some(model.commitment_from_parts(
                &encoded,
                &children,
                e.terminal.as_deref(),
            ));
        }
        if computed.as_deref() != Some(root.as_bytes()) {
            return Err(TrieError::InvalidProof(
                "commitment chain does not reach the root".to_string(),
            ));
        }
        Ok(status)
    }

    /// Validates an inclusion proof of `value` at the proof's key.
    pub fn validate_with_value(
        &self,
        model: &Blake2bModel,
        root: &VectorCommitment,
        value: &[u8],
    ) -> Result<(), TrieError> {
        match self.validate(model, root)? {
            ProvedStatus::Absence => Err(TrieError::InvalidProof(
                "proof attests absence, not inclusion".to_string(),
            )),
            ProvedStatus::Inclusion(terminal) => {
                if terminal == model.commit_to_data(value).to_bytes() {
                    Ok(())
                } else {
                    Err(TrieError::InvalidProof(
                        "terminal does not commit to the value".to_string(),
                    ))
                }
            }
        }
    }

    /// Consistency of the last element with the key tail, and the proved
    /// status it implies.
    fn ending_status(
        &self,
        e: &MerkleProofElement,
        tail: &[u8],
    ) -> Result<ProvedStatus, TrieError> {
        if e.child_index == self.arity.terminal_index() {
            if e.path_fragment != tail {
                return Err(TrieError::InvalidProof(
                    "terminal ending does not consume the key".to_string(),
                ));
            }
            return Ok(match &e.terminal {
                Some(t) => ProvedStatus::Inclusion(t.clone()),
                None => ProvedStatus::Absence,
            });
        }
        if e.child_index == self.arity.extension_index() {
            // the key must demonstrably miss: deviate inside the fragment,
            // end strictly within it, or continue through a vacant slot
            let diverges = !tail.starts_with(&e.path_fragment);
            let vacant = tail
                .len()
                .checked_sub(e.path_fragment.len())
                .is_some_and(|extra| {
                    extra > 0 && !e.children.contains_key(&tail[e.path_fragment.len()])
                });
            if diverges || tail.len() < e.path_fragment.len() || vacant {
                return Ok(ProvedStatus::Absence);
            }
            return Err(TrieError::InvalidProof(
                "extension ending reaches the key".to_string(),
            ));
        }
        Err(TrieError::InvalidProof(format!(
            "invalid ending slot {}",
            e.child_index
        )))
    }
}

impl MerkleProofElement {
    fn write_to(&self, out: &mut Vec<u8>, arity: PathArity) {
        put_bytes16(out, &encode_digits(&self.path_fragment, arity));
        put_u16_le(out, self.child_index);

        let mut flags = 0u8;
        if self.terminal.is_some() {
            flags |= FLAG_HAS_TERMINAL;
        }
        if !self.children.is_empty() {
            flags |= FLAG_HAS_CHILDREN;
        }
        out.push(flags);

        if let Some(t) = &self.terminal {
            out.push(t.len() as u8);
            out.extend_from_slice(t);
        }
        if !self.children.is_empty() {
            let mut bitmap = [0u8; PROOF_BITMAP_LEN];
            for d in self.children.keys() {
                bitmap[*d as usize / 8] |= 1 << (*d as usize % 8);
            }
            out.extend_from_slice(&bitmap);
            for c in self.children.values() {
                out.extend_from_slice(c);
            }
        }
    }

    fn read_from(
        r: &mut ByteReader<'_>,
        arity: PathArity,
        hash_size: HashSize,
    ) -> Result<Self, TrieError> {
        let path_fragment = decode_digits(r.take_bytes16()?, arity)?;
        let child_index = r.take_u16_le()?;
        let flags = r.take_u8()?;
        if flags & !(FLAG_HAS_TERMINAL | FLAG_HAS_CHILDREN) != 0 {
            return Err(TrieError::Corrupted(format!(
                "unknown proof element flags {flags:#04x}"
            )));
        }

        let terminal = if flags & FLAG_HAS_TERMINAL != 0 {
            Some(r.take_bytes8()?.to_vec())
        } else {
            None
        };

        let mut children = BTreeMap::new();
        if flags & FLAG_HAS_CHILDREN != 0 {
            let bitmap = r.take(PROOF_BITMAP_LEN)?.to_vec();
            for i in 0..PROOF_BITMAP_LEN * 8 {
                if bitmap[i / 8] & (1 << (i % 8)) != 0 {
                    if i >= arity.num_children() {
                        return Err(TrieError::Corrupted(format!(
                            "child bit {i} out of range for arity {arity}"
                        )));
                    }
                    children.insert(i as u8, r.take(hash_size.byte_len())?.to_vec());
                }
            }
            if children.is_empty() {
                return Err(TrieError::Corrupted(
                    "proof element with empty child bitmap".to_string(),
                ));
            }
        }

        Ok(Self {
            path_fragment,
            children,
            terminal,
            child_index,
        })
    }
}
