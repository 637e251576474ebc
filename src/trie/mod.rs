//! The committed radix trie.
//!
//! Persistent node records ([`NodeData`]) are immutable and addressed by
//! their commitment; an update session overlays them with buffered nodes,
//! and commit writes the rewritten subtrees back out under fresh
//! commitments. The facade types are:
//!
//! - [`TrieReader`]: shared read access to one committed root
//! - [`TrieUpdatable`]: buffered mutations on top of a committed root;
//!   consumed by `commit`
//! - [`TrieChained`]: an updatable trie that reopens itself at the new
//!   root after every commit

mod buffered;
mod iterate;
mod node_data;
mod node_store;
mod snapshot;
#[allow(clippy::module_inception)]
mod trie;
mod update;

pub use iterate::TrieIterator;
pub use node_data::NodeData;
pub use node_store::{NodeStore, DEFAULT_CACHE_LIMIT, PARTITION_NODES, PARTITION_VALUES};
pub use trie::{init_root, PathElement, PathEndingCode, TrieChained, TrieReader, TrieUpdatable};
