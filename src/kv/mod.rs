//! Key/value store abstraction.
//!
//! The trie core reads and writes through the contracts in this module;
//! concrete database backends live outside the crate as adaptors. The
//! in-memory store here backs the tests and serves as the reference
//! implementation of the contracts.

mod memory;
mod mutations;
mod partition;
mod traits;

pub use memory::{InMemoryBatchedWriter, InMemoryKvStore};
pub use mutations::{MutationError, Mutations};
pub use partition::{ReaderPartition, WriterPartition};
pub use traits::{
    copy_all, has_with_prefix, BatchedUpdatable, KvBatchedWriter, KvIterator, KvReader, KvStore,
    KvWriter, StoreWriter, Traversable,
};
