//! In-memory overlay nodes of an update session.
//!
//! A buffered node wraps one persistent record plus the mutations staged on
//! it: rewritten path fragment or terminal, a raw value awaiting external
//! storage, and modified children. Children are owned exclusively by their
//! parent (`None` marks a pending removal of a persisted child), so the
//! overlay is a strict tree and descent never needs parent pointers.
//!
//! Change flags track which parts diverge from the persistent record;
//! commit skips re-hashing subtrees whose flags are clean.

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

use super::node_data::NodeData;
use super::node_store::{NodeStore, PARTITION_NODES, PARTITION_VALUES};
use crate::error::TrieError;
use crate::kv::{KvWriter, WriterPartition};
use crate::model::{CommitmentModel, VectorCommitment};

type FastHashMap<K, V> = HashMap<K, V, FxBuildHasher>;

pub(crate) struct BufferedNode {
    /// The persistent image, mutated in place during the session.
    pub node_data: NodeData,
    /// Raw value bytes to be written to the value partition on commit.
    pub value: Option<Vec<u8>>,
    /// Unpacked key prefix from the root up to (excluding) this node's
    /// path fragment. Key positions never move during splits or merges, so
    /// this stays valid for the whole session.
    pub trie_path: Vec<u8>,
    /// Children touched in this session. `Some` overlays the persistent
    /// child slot, `None` deletes it.
    pub uncommitted_children: FastHashMap<u8, Option<Box<BufferedNode>>>,
    pub path_changed: bool,
    pub terminal_changed: bool,
    pub children_changed: bool,
}

impl BufferedNode {
    /// Wraps a fetched persistent record; all flags clean.
    pub fn from_node_data(node_data: NodeData, trie_path: Vec<u8>) -> Self {
        Self {
            node_data,
            value: None,
            trie_path,
            uncommitted_children: FastHashMap::with_hasher(FxBuildHasher),
            path_changed: false,
            terminal_changed: false,
            children_changed: false,
        }
    }

    /// A fresh leaf carrying `value`, not yet backed by any persistent
    /// record.
    pub fn new_terminal(
        trie_path: Vec<u8>,
        path_fragment: Vec<u8>,
        value: &[u8],
        model: &dyn CommitmentModel,
    ) -> Self {
        let mut node = Self::from_node_data(
            NodeData {
                path_fragment,
                ..NodeData::new()
            },
            trie_path,
        );
        node.set_value(value, model);
        node.path_changed = true;
        node.children_changed = true;
        node
    }

    /// Replaces the terminal with a commitment to `value`, retaining the
    /// raw bytes when the model stores them externally.
    pub fn set_value(&mut self, value: &[u8], model: &dyn CommitmentModel) {
        let terminal = model.commit_to_data(value);
        self.value = terminal.is_stored_externally().then(|| value.to_vec());
        self.node_data.terminal = Some(terminal);
        self.terminal_changed = true;
    }

    pub fn clear_terminal(&mut self) {
        self.node_data.terminal = None;
        self.value = None;
        self.terminal_changed = true;
    }

    pub fn mark_children_changed(&mut self) {
        self.children_changed = true;
    }

    /// Digits of all live child slots: persistent ones overlaid with the
    /// session's additions and removals.
    pub fn live_child_indices(&self) -> Vec<u8> {
        let mut live: Vec<u8> = self
            .node_data
            .children
            .keys()
            .copied()
            .filter(|d| !matches!(self.uncommitted_children.get(d), Some(None)))
            .collect();
        for (d, slot) in &self.uncommitted_children {
            if slot.is_some() && !self.node_data.children.contains_key(d) {
                live.push(*d);
            }
        }
        live.sort_unstable();
        live
    }

    /// A node with no terminal and no live children; only valid
    /// transiently, and as the root of an empty trie before init.
    pub fn is_empty(&self) -> bool {
        self.node_data.terminal.is_none() && self.live_child_indices().is_empty()
    }

    /// The buffered child at `d`, faulting the persistent child into the
    /// overlay on first access. `None` when no live child exists there.
    pub fn child_mut(
        &mut self,
        store: &NodeStore,
        d: u8,
    ) -> Result<Option<&mut BufferedNode>, TrieError> {
        if !self.uncommitted_children.contains_key(&d) {
            let Some(commitment) = self.node_data.children.get(&d) else {
                return Ok(None);
            };
            let node_data = store.fetch_node_data(commitment)?.ok_or_else(|| {
                TrieError::Corrupted(format!("missing node record for commitment '{commitment}'"))
            })?;
            let mut trie_path = self.trie_path.clone();
            trie_path.extend_from_slice(&self.node_data.path_fragment);
            trie_path.push(d);
            self.uncommitted_children
                .insert(d, Some(Box::new(Self::from_node_data(node_data, trie_path))));
        }
        Ok(self
            .uncommitted_children
            .get_mut(&d)
            .and_then(|slot| slot.as_deref_mut()))
    }

    /// Links a new buffered child under `d`.
    pub fn set_child(&mut self, d: u8, child: BufferedNode) {
        self.uncommitted_children.insert(d, Some(Box::new(child)));
        self.children_changed = true;
    }

    /// Unlinks the child at `d`. A tombstone is kept only when a
    /// persistent child slot needs deleting on commit.
    pub fn remove_child(&mut self, d: u8) {
        if self.node_data.children.contains_key(&d) {
            self.uncommitted_children.insert(d, None);
        } else {
            self.uncommitted_children.remove(&d);
        }
        self.children_changed = true;
    }

    /// Unlinks every child; used when deleting the empty prefix.
    pub fn remove_all_children(&mut self) {
        self.uncommitted_children.clear();
        let persistent: Vec<u8> = self.node_data.children.keys().copied().collect();
        for d in persistent {
            self.uncommitted_children.insert(d, None);
        }
        self.children_changed = true;
    }

    /// Splits this node at `at` digits into its path fragment: the node
    /// keeps `fragment[..at]` and everything else moves into a new lower
    /// node linked under `fragment[at]`.
    pub fn split(&mut self, at: usize) {
        debug_assert!(at < self.node_data.path_fragment.len());
        let digit = self.node_data.path_fragment[at];
        let lower_fragment = self.node_data.path_fragment[at + 1..].to_vec();

        let mut lower_path = self.trie_path.clone();
        lower_path.extend_from_slice(&self.node_data.path_fragment[..at + 1]);

        let lower = BufferedNode {
            node_data: NodeData {
                path_fragment: lower_fragment,
                children: std::mem::take(&mut self.node_data.children),
                terminal: self.node_data.terminal.take(),
                commitment: None,
            },
            value: self.value.take(),
            trie_path: lower_path,
            uncommitted_children: std::mem::take(&mut self.uncommitted_children),
            path_changed: true,
            terminal_changed: true,
            children_changed: true,
        };

        self.node_data.path_fragment.truncate(at);
        self.node_data.commitment = None;
        self.uncommitted_children.insert(digit, Some(Box::new(lower)));
        self.path_changed = true;
        self.terminal_changed = true;
        self.children_changed = true;
    }

    /// Collapses this node into its only child when it carries no
    /// terminal: the child's fragment (prefixed with the link digit) is
    /// absorbed, along with its terminal, value and children.
    pub fn merge_if_needed(&mut self, store: &NodeStore) -> Result<(), TrieError> {
        if self.node_data.terminal.is_some() {
            return Ok(());
        }
        let live = self.live_child_indices();
        let [d] = live[..] else { return Ok(()) };

        self.child_mut(store, d)?;
        let Some(Some(child)) = self.uncommitted_children.remove(&d) else {
            return Err(TrieError::Corrupted(format!(
                "single child slot {d} vanished during merge"
            )));
        };
        let child = *child;

        self.node_data.path_fragment.push(d);
        self.node_data
            .path_fragment
            .extend_from_slice(&child.node_data.path_fragment);
        self.node_data.children = child.node_data.children;
        self.node_data.terminal = child.node_data.terminal;
        self.node_data.commitment = None;
        self.value = child.value;
        self.uncommitted_children = child.uncommitted_children;
        self.path_changed = true;
        self.terminal_changed = true;
        self.children_changed = true;
        Ok(())
    }

    /// Post-order commit: resolves every uncommitted child to its new
    /// commitment, recomputes this node's commitment when anything
    /// changed, and persists the record (and external value) through the
    /// two store partitions. Returns the node's commitment and whether it
    /// was recomputed.
    pub fn commit_node(
        &mut self,
        writer: &mut dyn KvWriter,
        model: &dyn CommitmentModel,
    ) -> Result<(VectorCommitment, bool), TrieError> {
        let mut children_changed = self.children_changed;
        let mut uncommitted: Vec<_> = std::mem::take(&mut self.uncommitted_children)
            .into_iter()
            .collect();
        uncommitted.sort_unstable_by_key(|(d, _)| *d);

        for (d, slot) in uncommitted {
            match slot {
                None => {
                    self.node_data.children.remove(&d);
                    children_changed = true;
                }
                Some(mut child) => {
                    let (commitment, changed) = child.commit_node(writer, model)?;
                    children_changed |= changed;
                    self.node_data.children.insert(d, commitment);
                }
            }
        }

        if let Some(commitment) = &self.node_data.commitment {
            if !children_changed && !self.path_changed && !self.terminal_changed {
                return Ok((commitment.clone(), false));
            }
        }

        let commitment = model.update_node_commitment(&self.node_data);
        self.node_data.commitment = Some(commitment.clone());

        let record = self.node_data.to_bytes(model.path_arity());
        WriterPartition::new(&mut *writer, PARTITION_NODES).set(commitment.as_bytes(), &record);
        if let (Some(terminal), Some(value)) = (&self.node_data.terminal, &self.value) {
            if terminal.is_stored_externally() {
                WriterPartition::new(&mut *writer, PARTITION_VALUES)
                    .set(&terminal.to_bytes(), value);
            }
        }

        self.path_changed = false;
        self.terminal_changed = false;
        self.children_changed = false;
        Ok((commitment, true))
    }
}
