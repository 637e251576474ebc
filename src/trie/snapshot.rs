//! Snapshots of one committed trie version.
//!
//! Two flavors: `snapshot_data` streams the live key/value pairs, enough
//! to rebuild an equal-rooted trie from scratch; `snapshot` copies the raw
//! node and value records reachable from the root, so the destination
//! store opens at the same root immediately.

use super::node_data::NodeData;
use super::node_store::{PARTITION_NODES, PARTITION_VALUES};
use super::trie::TrieReader;
use crate::error::TrieError;
use crate::kv::{KvWriter, WriterPartition};

impl TrieReader {
    /// Writes every live `(key, value)` pair, the identity included, to
    /// `sink`. Rebuilding a trie from this data with the same identity and
    /// model yields the same root commitment.
    pub fn snapshot_data(&self, sink: &mut dyn KvWriter) -> Result<(), TrieError> {
        self.iterate(|k, v| {
            sink.set(k, v);
            true
        })
    }

    /// Copies the node and value records reachable from the current root
    /// into `dest`, preserving the partition layout. A trie opened on
    /// `dest` at the same root answers identically to this one.
    pub fn snapshot(&self, dest: &mut dyn KvWriter) -> Result<(), TrieError> {
        let root = self.root_node()?;
        self.snapshot_subtree(&root, dest)
    }

    fn snapshot_subtree(
        &self,
        node: &NodeData,
        dest: &mut dyn KvWriter,
    ) -> Result<(), TrieError> {
        let arity = self.path_arity();
        let commitment = node.commitment.as_ref().ok_or_else(|| {
            TrieError::Corrupted("snapshot of a node without commitment".to_string())
        })?;
        WriterPartition::new(&mut *dest, PARTITION_NODES)
            .set(commitment.as_bytes(), &node.to_bytes(arity));

        if let Some(terminal) = &node.terminal {
            if terminal.is_stored_externally() {
                let value = self.node_store().fetch_value(terminal)?.ok_or_else(|| {
                    TrieError::Corrupted(format!("missing value for terminal '{terminal}'"))
                })?;
                WriterPartition::new(&mut *dest, PARTITION_VALUES)
                    .set(&terminal.to_bytes(), &value);
            }
        }

        for child_commitment in node.children.values() {
            let child = self
                .node_store()
                .fetch_node_data(child_commitment)?
                .ok_or_else(|| {
                    TrieError::Corrupted(format!(
                        "missing node record for commitment '{child_commitment}'"
                    ))
                })?;
            self.snapshot_subtree(&child, dest)?;
        }
        Ok(())
    }
}
