//! Cached reader of persistent nodes and values.
//!
//! Nodes and values live in two disjoint single-byte prefix partitions of
//! the backing store. Fetched node records are cached by serialized
//! commitment; the cache is bounded by an entry count and flushed outright
//! when the bound is hit, since a commit can rename arbitrarily many
//! commitments at once.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use rustc_hash::FxBuildHasher;

use super::node_data::NodeData;
use crate::error::TrieError;
use crate::kv::{KvReader, ReaderPartition};
use crate::model::{CommitmentModel, TerminalCommitment, VectorCommitment};

type FastHashMap<K, V> = HashMap<K, V, FxBuildHasher>;

/// Store partition prefix for node records.
pub const PARTITION_NODES: u8 = 0x01;
/// Store partition prefix for externally stored values.
pub const PARTITION_VALUES: u8 = 0x02;

/// Cache entry bound before a full flush.
pub const DEFAULT_CACHE_LIMIT: usize = 10_000;

type SharedReader = Arc<dyn KvReader + Send + Sync>;

/// Read access to the persistent trie, one instance per trie reader.
pub struct NodeStore {
    model: Arc<dyn CommitmentModel>,
    nodes: ReaderPartition<SharedReader>,
    values: ReaderPartition<SharedReader>,
    /// Node records by serialized commitment. `None` when caching is
    /// disabled (limit 0).
    cache: Option<Mutex<FastHashMap<Vec<u8>, NodeData>>>,
    cache_limit: usize,
}

impl NodeStore {
    pub(crate) fn open(
        store: SharedReader,
        model: Arc<dyn CommitmentModel>,
        cache_limit: usize,
    ) -> Self {
        Self {
            model,
            nodes: ReaderPartition::new(store.clone(), PARTITION_NODES),
            values: ReaderPartition::new(store, PARTITION_VALUES),
            cache: (cache_limit > 0).then(|| Mutex::new(FastHashMap::with_hasher(FxBuildHasher))),
            cache_limit,
        }
    }

    pub(crate) fn model(&self) -> &dyn CommitmentModel {
        self.model.as_ref()
    }

    pub(crate) fn model_handle(&self) -> Arc<dyn CommitmentModel> {
        self.model.clone()
    }

    /// Fetches and deserializes the node record stored under `commitment`.
    pub(crate) fn fetch_node_data(
        &self,
        commitment: &VectorCommitment,
    ) -> Result<Option<NodeData>, TrieError> {
        if let Some(cache) = &self.cache {
            if let Some(node) = cache.lock().get(commitment.as_bytes()) {
                return Ok(Some(node.clone()));
            }
        }
        let Some(bytes) = self.nodes.get(commitment.as_bytes())? else {
            return Ok(None);
        };
        let mut node = NodeData::from_bytes(&bytes, self.model.path_arity())?;
        node.commitment = Some(commitment.clone());
        if let Some(cache) = &self.cache {
            let mut cache = cache.lock();
            if cache.len() >= self.cache_limit {
                cache.clear();
            }
            cache.insert(commitment.as_bytes().to_vec(), node.clone());
        }
        Ok(Some(node))
    }

    /// Resolves a terminal commitment to the committed value: the embedded
    /// bytes, or a read from the value partition for externally stored
    /// values.
    pub(crate) fn fetch_value(
        &self,
        terminal: &TerminalCommitment,
    ) -> Result<Option<Vec<u8>>, TrieError> {
        if !terminal.is_stored_externally() {
            return Ok(Some(terminal.payload().to_vec()));
        }
        self.values.get(&terminal.to_bytes())
    }

    pub(crate) fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }
    }
}
