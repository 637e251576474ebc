//! Ordered iteration over a committed trie.
//!
//! Traversal is in-order over the persistent nodes: a node's own terminal
//! is yielded before its children, children in ascending digit order, so
//! keys come out in path-lexicographic order. The order is a pure function
//! of the stored key set.

use super::node_data::NodeData;
use super::trie::TrieReader;
use crate::data::{pack_key, unpack_key};
use crate::error::TrieError;

impl TrieReader {
    /// Visits every `(packed key, value)` pair in path-lexicographic
    /// order, the identity entry (empty key) first. The callback returns
    /// `false` to stop.
    pub fn iterate(
        &self,
        mut f: impl FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<(), TrieError> {
        let root = self.root_node()?;
        self.iterate_subtree(&root, Vec::new(), &mut f)?;
        Ok(())
    }

    /// Same traversal, keys only.
    pub fn iterate_keys(&self, mut f: impl FnMut(&[u8]) -> bool) -> Result<(), TrieError> {
        self.iterate(|k, _| f(k))
    }

    /// Iterator over the keys starting with `prefix`.
    pub fn iterator(&self, prefix: &[u8]) -> TrieIterator<'_> {
        TrieIterator {
            trie: self,
            prefix: prefix.to_vec(),
        }
    }

    /// True iff some stored key begins with `prefix`.
    pub fn has_with_prefix(&self, prefix: &[u8]) -> Result<bool, TrieError> {
        let mut found = false;
        self.iterator(prefix).iterate_keys(|_| {
            found = true;
            false
        })?;
        Ok(found)
    }

    /// Depth-first in-order walk. `trie_path` is the unpacked prefix up to
    /// (excluding) the node's own fragment. Returns `false` once the
    /// callback stops the walk.
    pub(crate) fn iterate_subtree(
        &self,
        node: &NodeData,
        trie_path: Vec<u8>,
        f: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<bool, TrieError> {
        let mut full_path = trie_path;
        full_path.extend_from_slice(&node.path_fragment);

        if let Some(terminal) = &node.terminal {
            let key = pack_key(&full_path, self.path_arity())?;
            let value = self.node_store().fetch_value(terminal)?.ok_or_else(|| {
                TrieError::Corrupted(format!("missing value for terminal '{terminal}'"))
            })?;
            if !f(&key, &value) {
                return Ok(false);
            }
        }
        for (d, commitment) in &node.children {
            let child = self.node_store().fetch_node_data(commitment)?.ok_or_else(|| {
                TrieError::Corrupted(format!("missing node record for commitment '{commitment}'"))
            })?;
            let mut child_path = full_path.clone();
            child_path.push(*d);
            if !self.iterate_subtree(&child, child_path, f)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Locates the node whose subtree holds every key starting with the
    /// unpacked prefix, together with its trie path.
    fn find_subtree(&self, unpacked: &[u8]) -> Result<Option<(NodeData, Vec<u8>)>, TrieError> {
        let mut node = self.root_node()?;
        let mut trie_path: Vec<u8> = Vec::new();
        let mut tail = unpacked;
        loop {
            let fragment = node.path_fragment.clone();
            if tail.len() <= fragment.len() {
                // the prefix ends at or inside this node's fragment
                if fragment.starts_with(tail) {
                    return Ok(Some((node, trie_path)));
                }
                return Ok(None);
            }
            let Some(rest) = tail.strip_prefix(fragment.as_slice()) else {
                return Ok(None);
            };
            let d = rest[0];
            match node.children.get(&d) {
                None => return Ok(None),
                Some(c) => {
                    let child = self.node_store().fetch_node_data(c)?.ok_or_else(|| {
                        TrieError::Corrupted(format!("missing node record for commitment '{c}'"))
                    })?;
                    trie_path.extend_from_slice(&fragment);
                    trie_path.push(d);
                    tail = &rest[1..];
                    node = child;
                }
            }
        }
    }
}

/// Iterator over the subtree holding one key prefix.
pub struct TrieIterator<'a> {
    trie: &'a TrieReader,
    prefix: Vec<u8>,
}

impl TrieIterator<'_> {
    /// Visits every `(packed key, value)` pair under the prefix, in the
    /// same order as [`TrieReader::iterate`].
    pub fn iterate(&self, mut f: impl FnMut(&[u8], &[u8]) -> bool) -> Result<(), TrieError> {
        let unpacked = unpack_key(&self.prefix, self.trie.path_arity());
        let Some((node, trie_path)) = self.trie.find_subtree(&unpacked)? else {
            return Ok(());
        };
        self.trie.iterate_subtree(&node, trie_path, &mut f)?;
        Ok(())
    }

    /// Same traversal, keys only.
    pub fn iterate_keys(&self, mut f: impl FnMut(&[u8]) -> bool) -> Result<(), TrieError> {
        self.iterate(|k, _| f(k))
    }
}
