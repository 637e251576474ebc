//! Contracts for key/value storage backends.

use std::sync::Arc;

use crate::error::TrieError;

/// Read access to a key/value store.
///
/// An empty value is indistinguishable from an absent key: `get` never
/// returns `Some` with an empty payload.
pub trait KvReader {
    /// Retrieves the value stored at `key`, or `None` when absent.
    /// Adaptors over closed backends report [`TrieError::DbUnavailable`].
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError>;

    /// Presence check; kept separate so adaptors can answer it without
    /// copying the value out.
    fn has(&self, key: &[u8]) -> Result<bool, TrieError> {
        Ok(self.get(key)?.is_some())
    }
}

/// Write access to a key/value store. Setting an empty value deletes the
/// key. Writes are buffered or applied at the adaptor's discretion; failures
/// surface on the batched [`KvBatchedWriter::commit`].
pub trait KvWriter {
    fn set(&mut self, key: &[u8], value: &[u8]);
}

/// Iteration over the key/value pairs under a fixed prefix. Order is
/// unspecified; callbacks return `false` to stop early.
pub trait KvIterator {
    fn iterate(&self, f: &mut dyn FnMut(&[u8], &[u8]) -> bool);
    fn iterate_keys(&self, f: &mut dyn FnMut(&[u8]) -> bool);
}

/// A store that can hand out prefix iterators.
pub trait Traversable {
    fn iterator(&self, prefix: &[u8]) -> Box<dyn KvIterator + '_>;
}

/// A writer that buffers its sets and applies them atomically on `commit`.
/// Sets issued after a commit are undefined.
pub trait KvBatchedWriter: KvWriter {
    fn commit(&mut self) -> Result<(), TrieError>;
}

/// A store that can only be updated through atomic batches.
pub trait BatchedUpdatable {
    fn batched_writer(&self) -> Box<dyn KvBatchedWriter + '_>;
}

/// Compound read/write store whose writer half works through a shared
/// reference; implementations synchronize internally. This is the contract
/// chained tries keep across commits.
pub trait KvStore: KvReader {
    fn set(&self, key: &[u8], value: &[u8]);
}

/// Adapts a shared [`KvStore`] reference to the [`KvWriter`] contract.
pub struct StoreWriter<'a, S: ?Sized>(pub &'a S);

impl<S: KvStore + ?Sized> KvWriter for StoreWriter<'_, S> {
    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.0.set(key, value);
    }
}

impl<T: KvReader + ?Sized> KvReader for &T {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        (**self).get(key)
    }

    fn has(&self, key: &[u8]) -> Result<bool, TrieError> {
        (**self).has(key)
    }
}

impl<T: KvReader + ?Sized> KvReader for Arc<T> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        (**self).get(key)
    }

    fn has(&self, key: &[u8]) -> Result<bool, TrieError> {
        (**self).has(key)
    }
}

impl<T: KvWriter + ?Sized> KvWriter for &mut T {
    fn set(&mut self, key: &[u8], value: &[u8]) {
        (**self).set(key, value);
    }
}

/// Flushes everything an iterator yields into a writer.
pub fn copy_all(dst: &mut dyn KvWriter, src: &dyn KvIterator) {
    src.iterate(&mut |k, v| {
        dst.set(k, v);
        true
    });
}

/// True iff the store holds at least one key starting with `prefix`.
pub fn has_with_prefix(store: &dyn Traversable, prefix: &[u8]) -> bool {
    let mut found = false;
    store.iterator(prefix).iterate_keys(&mut |_| {
        found = true;
        false
    });
    found
}
