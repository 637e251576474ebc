//! Hash-based commitment model over Blake2b.
//!
//! The vector commitment of a node is
//! `H(encode(path_fragment) || H(children || terminal))` where each present
//! child contributes a length-prefixed commitment, each absent child a
//! single zero byte, and the terminal its serialized form (or a zero byte
//! when absent). `H` is Blake2b with a 160- or 256-bit digest.

use std::collections::BTreeMap;

use blake2::digest::consts::{U20, U32};
use blake2::{Blake2b, Digest};

use super::{CommitmentModel, TerminalCommitment, VectorCommitment};
use crate::data::{encode_digits, PathArity};
use crate::error::TrieError;
use crate::trie::NodeData;

type Blake2b160 = Blake2b<U20>;
type Blake2b256 = Blake2b<U32>;

/// Digest width of the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashSize {
    /// 160-bit digests.
    H160,
    /// 256-bit digests.
    H256,
}

impl HashSize {
    /// Digest length in bytes.
    pub fn byte_len(self) -> usize {
        match self {
            HashSize::H160 => 20,
            HashSize::H256 => 32,
        }
    }

    /// One-byte tag used in serialized proofs: the digest length.
    pub fn to_byte(self) -> u8 {
        self.byte_len() as u8
    }

    pub fn from_byte(b: u8) -> Result<Self, TrieError> {
        match b {
            20 => Ok(HashSize::H160),
            32 => Ok(HashSize::H256),
            _ => Err(TrieError::WrongHashSize(b)),
        }
    }
}

/// Blake2b instantiation of the commitment model, parameterized by path
/// arity and digest width.
#[derive(Clone, Copy, Debug)]
pub struct Blake2bModel {
    arity: PathArity,
    hash_size: HashSize,
}

impl Blake2bModel {
    pub fn new(arity: PathArity, hash_size: HashSize) -> Self {
        Self { arity, hash_size }
    }

    pub fn hash_size(&self) -> HashSize {
        self.hash_size
    }

    /// Digest of the concatenation of `chunks`.
    pub(crate) fn hash_chunks(&self, chunks: &[&[u8]]) -> Vec<u8> {
        fn digest_chunks<D: Digest>(chunks: &[&[u8]]) -> Vec<u8> {
            let mut h = D::new();
            for c in chunks {
                h.update(c);
            }
            h.finalize().to_vec()
        }
        match self.hash_size {
            HashSize::H160 => digest_chunks::<Blake2b160>(chunks),
            HashSize::H256 => digest_chunks::<Blake2b256>(chunks),
        }
    }

    /// Node commitment from its hashed parts. Shared between committed
    /// node records and proof verification, which recomputes commitments
    /// from proof elements.
    pub(crate) fn commitment_from_parts(
        &self,
        encoded_fragment: &[u8],
        children: &BTreeMap<u8, &[u8]>,
        terminal: Option<&[u8]>,
    ) -> Vec<u8> {
        let mut vector = Vec::with_capacity(self.arity.num_children() + 64);
        for i in 0..self.arity.num_children() {
            match children.get(&(i as u8)) {
                Some(c) => {
                    vector.push(c.len() as u8);
                    vector.extend_from_slice(c);
                }
                None => vector.push(0),
            }
        }
        match terminal {
            Some(t) => vector.extend_from_slice(t),
            None => vector.push(0),
        }
        let inner = self.hash_chunks(&[&vector]);
        self.hash_chunks(&[encoded_fragment, &inner])
    }
}

impl CommitmentModel for Blake2bModel {
    fn short_name(&self) -> String {
        format!("blake2b_{}_a{}", self.hash_size.byte_len() * 8, self.arity)
    }

    fn path_arity(&self) -> PathArity {
        self.arity
    }

    fn commitment_size(&self) -> usize {
        self.hash_size.byte_len()
    }

    fn commit_to_data(&self, data: &[u8]) -> TerminalCommitment {
        debug_assert!(!data.is_empty(), "empty values denote absence");
        if data.len() <= self.hash_size.byte_len() {
            TerminalCommitment::new(data.to_vec(), false)
        } else {
            TerminalCommitment::new(self.hash_chunks(&[data]), true)
        }
    }

    fn calc_node_commitment(&self, node: &NodeData) -> VectorCommitment {
        let encoded = encode_digits(&node.path_fragment, self.arity);
        let children: BTreeMap<u8, &[u8]> = node
            .children
            .iter()
            .map(|(d, c)| (*d, c.as_bytes()))
            .collect();
        let terminal = node.terminal.as_ref().map(|t| t.to_bytes());
        VectorCommitment::from_bytes(self.commitment_from_parts(
            &encoded,
            &children,
            terminal.as_deref(),
        ))
    }
}
