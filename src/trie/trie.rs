//! Trie facade: lifecycle, reads, updates, commit.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use super::buffered::BufferedNode;
use super::node_data::NodeData;
use super::node_store::{NodeStore, DEFAULT_CACHE_LIMIT, PARTITION_NODES, PARTITION_VALUES};
use super::update;
use crate::data::{unpack_key, PathArity};
use crate::error::TrieError;
use crate::kv::{
    KvBatchedWriter, KvReader, KvStore, KvWriter, Mutations, StoreWriter, WriterPartition,
};
use crate::model::{CommitmentModel, VectorCommitment};

type SharedReader = Arc<dyn KvReader + Send + Sync>;

/// Writes the initial root node holding `identity` at the empty key and
/// returns its commitment. The identity is fixed for the lifetime of the
/// trie; every other key hangs below the root.
pub fn init_root(
    store: &mut dyn KvWriter,
    model: &dyn CommitmentModel,
    identity: &[u8],
) -> Result<VectorCommitment, TrieError> {
    if identity.is_empty() {
        return Err(TrieError::EmptyIdentity);
    }
    let terminal = model.commit_to_data(identity);
    let root = NodeData {
        terminal: Some(terminal.clone()),
        ..NodeData::new()
    };
    let commitment = model.calc_node_commitment(&root);
    WriterPartition::new(&mut *store, PARTITION_NODES)
        .set(commitment.as_bytes(), &root.to_bytes(model.path_arity()));
    if terminal.is_stored_externally() {
        WriterPartition::new(&mut *store, PARTITION_VALUES).set(&terminal.to_bytes(), identity);
    }
    Ok(commitment)
}

// ============================================================================
// TrieReader
// ============================================================================

/// Direct read access to one committed trie version. Shareable across
/// threads when the backing store reader is.
pub struct TrieReader {
    node_store: NodeStore,
    persistent_root: VectorCommitment,
}

impl std::fmt::Debug for TrieReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrieReader")
            .field("persistent_root", &self.persistent_root)
            .finish_non_exhaustive()
    }
}

/// How a descent along a key ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathEndingCode {
    /// The key addresses a node; its terminal (if any) holds the value.
    Terminal,
    /// The key continues through a vacant child slot.
    Extend,
    /// The key diverges inside a node's path fragment.
    Split,
}

/// One step of a descent, as exposed to proof builders.
#[derive(Clone, Debug)]
pub struct PathElement {
    pub node_data: NodeData,
    /// Child slot taken to reach the next element. On the last element
    /// this is the terminal slot index (terminal ending) or the
    /// path-extension slot index (any other ending).
    pub child_index: u16,
}

impl TrieReader {
    /// Opens a reader at `root` with the default node-cache bound.
    pub fn new(
        model: Arc<dyn CommitmentModel>,
        store: SharedReader,
        root: &VectorCommitment,
    ) -> Result<Self, TrieError> {
        Self::with_cache_limit(model, store, root, DEFAULT_CACHE_LIMIT)
    }

    /// Opens a reader at `root`; `cache_limit` 0 disables node caching.
    pub fn with_cache_limit(
        model: Arc<dyn CommitmentModel>,
        store: SharedReader,
        root: &VectorCommitment,
        cache_limit: usize,
    ) -> Result<Self, TrieError> {
        let node_store = NodeStore::open(store, model, cache_limit);
        if node_store.fetch_node_data(root)?.is_none() {
            return Err(TrieError::RootNotFound(root.to_string()));
        }
        Ok(Self {
            node_store,
            persistent_root: root.clone(),
        })
    }

    /// The root commitment of this version.
    pub fn root(&self) -> &VectorCommitment {
        &self.persistent_root
    }

    pub fn model(&self) -> &dyn CommitmentModel {
        self.node_store.model()
    }

    pub(crate) fn model_handle(&self) -> Arc<dyn CommitmentModel> {
        self.node_store.model_handle()
    }

    pub(crate) fn node_store(&self) -> &NodeStore {
        &self.node_store
    }

    pub fn path_arity(&self) -> PathArity {
        self.model().path_arity()
    }

    pub fn clear_cache(&self) {
        self.node_store.clear_cache();
    }

    pub(crate) fn root_node(&self) -> Result<NodeData, TrieError> {
        self.node_store
            .fetch_node_data(&self.persistent_root)?
            .ok_or_else(|| TrieError::RootNotFound(self.persistent_root.to_string()))
    }

    fn fetch_child(&self, commitment: &VectorCommitment) -> Result<NodeData, TrieError> {
        self.node_store.fetch_node_data(commitment)?.ok_or_else(|| {
            TrieError::Corrupted(format!("missing node record for commitment '{commitment}'"))
        })
    }

    /// The value at `key`, or `None`. Reads see the committed version
    /// only; staged updates become visible after commit.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        let unpacked = unpack_key(key, self.path_arity());
        let mut node = self.root_node()?;
        let mut tail = &unpacked[..];
        loop {
            let Some(rest) = tail.strip_prefix(node.path_fragment.as_slice()) else {
                return Ok(None);
            };
            let Some((&d, rest)) = rest.split_first() else {
                let Some(terminal) = &node.terminal else {
                    return Ok(None);
                };
                return Ok(Some(self.node_store.fetch_value(terminal)?.ok_or_else(
                    || TrieError::Corrupted(format!("missing value for terminal '{terminal}'")),
                )?));
            };
            match node.children.get(&d) {
                None => return Ok(None),
                Some(c) => {
                    node = self.fetch_child(c)?;
                    tail = rest;
                }
            }
        }
    }

    pub fn has(&self, key: &[u8]) -> Result<bool, TrieError> {
        Ok(self.get(key)?.is_some())
    }

    /// Descends along `unpacked_key` collecting `(node, child slot)`
    /// steps; the raw material of proofs.
    pub fn node_path(
        &self,
        unpacked_key: &[u8],
    ) -> Result<(Vec<PathElement>, PathEndingCode), TrieError> {
        let arity = self.path_arity();
        let mut path = Vec::new();
        let mut node = self.root_node()?;
        let mut tail = unpacked_key;
        let ending = loop {
            let Some(rest) = tail.strip_prefix(node.path_fragment.as_slice()) else {
                path.push(PathElement {
                    node_data: node,
                    child_index: arity.extension_index(),
                });
                break PathEndingCode::Split;
            };
            let Some((&d, rest)) = rest.split_first() else {
                path.push(PathElement {
                    node_data: node,
                    child_index: arity.terminal_index(),
                });
                break PathEndingCode::Terminal;
            };
            match node.children.get(&d) {
                None => {
                    path.push(PathElement {
                        node_data: node,
                        child_index: arity.extension_index(),
                    });
                    break PathEndingCode::Extend;
                }
                Some(c) => {
                    let child = self.fetch_child(c)?;
                    path.push(PathElement {
                        node_data: node,
                        child_index: d as u16,
                    });
                    node = child;
                    tail = rest;
                }
            }
        };
        Ok((path, ending))
    }
}

// ============================================================================
// TrieUpdatable
// ============================================================================

/// A trie with buffered mutations on top of a committed root. Owned by one
/// caller; `commit` consumes it, so a committed instance cannot be touched
/// again.
pub struct TrieUpdatable {
    reader: TrieReader,
    root: BufferedNode,
}

impl Deref for TrieUpdatable {
    type Target = TrieReader;

    fn deref(&self) -> &TrieReader {
        &self.reader
    }
}

impl TrieUpdatable {
    pub fn new(
        model: Arc<dyn CommitmentModel>,
        store: SharedReader,
        root: &VectorCommitment,
    ) -> Result<Self, TrieError> {
        let reader = TrieReader::new(model, store, root)?;
        let root_node = reader.root_node()?;
        Ok(Self {
            root: BufferedNode::from_node_data(root_node, Vec::new()),
            reader,
        })
    }

    /// Stages `key = value`; an empty value stages a deletion. Returns
    /// whether the key was present before (in the buffered view). The
    /// empty key holds the identity and cannot be written.
    pub fn update(&mut self, key: &[u8], value: &[u8]) -> Result<bool, TrieError> {
        if key.is_empty() {
            return Err(TrieError::IdentityUpdate);
        }
        let unpacked = unpack_key(key, self.path_arity());
        if value.is_empty() {
            update::delete_node(self.reader.node_store(), &mut self.root, &unpacked)
        } else {
            update::update_node(self.reader.node_store(), &mut self.root, &unpacked, value)
        }
    }

    /// Stages the deletion of `key`; returns whether it was present.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool, TrieError> {
        self.update(key, &[])
    }

    /// Unlinks every key starting with `prefix`. The empty prefix clears
    /// the whole trie except the identity. Returns whether anything was
    /// removed.
    pub fn delete_prefix(&mut self, prefix: &[u8]) -> Result<bool, TrieError> {
        let unpacked = unpack_key(prefix, self.path_arity());
        if unpacked.is_empty() {
            let had_children = !self.root.live_child_indices().is_empty();
            self.root.remove_all_children();
            return Ok(had_children);
        }
        update::delete_prefix_node(self.reader.node_store(), &mut self.root, &unpacked)
    }

    /// Applies a staged batch: SETs first, then DELs.
    pub fn apply_mutations(&mut self, mutations: &Mutations) -> Result<(), TrieError> {
        let mut result = Ok(());
        mutations.iterate(&mut |k, v| {
            result = self.update(k, v.unwrap_or(&[])).map(|_| ());
            result.is_ok()
        });
        result
    }

    /// Commits the buffered tree: post-order recomputation of the dirty
    /// subtrees, persisting new nodes and values through `writer`. Returns
    /// the new root commitment. The new root must not be handed to readers
    /// before the writes are durable.
    pub fn commit(mut self, writer: &mut dyn KvWriter) -> Result<VectorCommitment, TrieError> {
        let model = self.reader.model_handle();
        let (commitment, _) = self.root.commit_node(writer, model.as_ref())?;
        Ok(commitment)
    }

    /// Commits through a batched writer and applies the batch atomically.
    pub fn persist(self, db: &mut dyn KvBatchedWriter) -> Result<VectorCommitment, TrieError> {
        let commitment = {
            let mut batched: &mut dyn KvBatchedWriter = &mut *db;
            self.commit(&mut batched)?
        };
        db.commit()?;
        Ok(commitment)
    }
}

// ============================================================================
// TrieChained
// ============================================================================

/// An updatable trie that keeps hold of its store and reopens itself at
/// the new root after every commit.
pub struct TrieChained<S>
where
    S: KvStore + Send + Sync + 'static,
{
    store: Arc<S>,
    trie: TrieUpdatable,
}

impl<S> Deref for TrieChained<S>
where
    S: KvStore + Send + Sync + 'static,
{
    type Target = TrieUpdatable;

    fn deref(&self) -> &TrieUpdatable {
        &self.trie
    }
}

impl<S> DerefMut for TrieChained<S>
where
    S: KvStore + Send + Sync + 'static,
{
    fn deref_mut(&mut self) -> &mut TrieUpdatable {
        &mut self.trie
    }
}

impl<S> TrieChained<S>
where
    S: KvStore + Send + Sync + 'static,
{
    pub fn new(
        model: Arc<dyn CommitmentModel>,
        store: Arc<S>,
        root: &VectorCommitment,
    ) -> Result<Self, TrieError> {
        let trie = TrieUpdatable::new(model, store.clone(), root)?;
        Ok(Self { store, trie })
    }

    /// The trie's store handle.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Commits to the held store and reopens at the new root.
    pub fn commit_chained(self) -> Result<Self, TrieError> {
        let TrieChained { store, trie } = self;
        let model = trie.model_handle();
        let root = {
            let mut writer = StoreWriter(store.as_ref());
            trie.commit(&mut writer)?
        };
        Self::new(model, store, &root)
    }
}
