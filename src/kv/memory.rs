//! In-memory key/value store.
//!
//! Backs the tests and serves as the reference implementation of the store
//! contracts. All operations are thread-safe through an rw-lock; the
//! batched writer stages its sets in a [`Mutations`] buffer and applies
//! them under one write lock.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::mutations::Mutations;
use super::traits::{
    BatchedUpdatable, KvBatchedWriter, KvIterator, KvReader, KvStore, KvWriter, Traversable,
};
use crate::error::TrieError;

/// Thread-safe in-memory store over a sorted map.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    fn set_locked(map: &mut BTreeMap<Vec<u8>, Vec<u8>>, key: &[u8], value: &[u8]) {
        if value.is_empty() {
            map.remove(key);
        } else {
            map.insert(key.to_vec(), value.to_vec());
        }
    }
}

impl KvReader for InMemoryKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        Ok(self.map.read().get(key).cloned())
    }

    fn has(&self, key: &[u8]) -> Result<bool, TrieError> {
        Ok(self.map.read().contains_key(key))
    }
}

impl KvStore for InMemoryKvStore {
    fn set(&self, key: &[u8], value: &[u8]) {
        Self::set_locked(&mut self.map.write(), key, value);
    }
}

impl Traversable for InMemoryKvStore {
    fn iterator(&self, prefix: &[u8]) -> Box<dyn KvIterator + '_> {
        Box::new(InMemoryIterator {
            store: self,
            prefix: prefix.to_vec(),
        })
    }
}

impl BatchedUpdatable for InMemoryKvStore {
    fn batched_writer(&self) -> Box<dyn KvBatchedWriter + '_> {
        Box::new(InMemoryBatchedWriter {
            store: self,
            mutations: Mutations::new(),
        })
    }
}

/// Prefix iterator over the sorted map.
struct InMemoryIterator<'a> {
    store: &'a InMemoryKvStore,
    prefix: Vec<u8>,
}

impl KvIterator for InMemoryIterator<'_> {
    fn iterate(&self, f: &mut dyn FnMut(&[u8], &[u8]) -> bool) {
        let map = self.store.map.read();
        for (k, v) in map.range(self.prefix.clone()..) {
            if !k.starts_with(&self.prefix) {
                break;
            }
            if !f(k, v) {
                return;
            }
        }
    }

    fn iterate_keys(&self, f: &mut dyn FnMut(&[u8]) -> bool) {
        self.iterate(&mut |k, _| f(k));
    }
}

/// Batched writer applying its buffer atomically under one write lock.
pub struct InMemoryBatchedWriter<'a> {
    store: &'a InMemoryKvStore,
    mutations: Mutations,
}

impl KvWriter for InMemoryBatchedWriter<'_> {
    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.mutations.set(key, value);
    }
}

impl KvBatchedWriter for InMemoryBatchedWriter<'_> {
    fn commit(&mut self) -> Result<(), TrieError> {
        let mutations = std::mem::take(&mut self.mutations);
        let mut map = self.store.map.write();
        mutations.iterate(&mut |k, v| {
            InMemoryKvStore::set_locked(&mut map, k, v.unwrap_or(&[]));
            true
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let store = InMemoryKvStore::new();
        store.set(b"a", b"1");
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert!(store.has(b"a").unwrap());

        store.set(b"a", b"");
        assert_eq!(store.get(b"a").unwrap(), None);
        assert!(!store.has(b"a").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_prefix_iteration() {
        let store = InMemoryKvStore::new();
        for k in [b"ab".as_slice(), b"ac", b"b", b"abc"] {
            store.set(k, k);
        }
        let mut seen = Vec::new();
        store.iterator(b"ab").iterate(&mut |k, _| {
            seen.push(k.to_vec());
            true
        });
        assert_eq!(seen, vec![b"ab".to_vec(), b"abc".to_vec()]);
    }

    #[test]
    fn test_batched_writer_applies_on_commit() {
        let store = InMemoryKvStore::new();
        store.set(b"gone", b"x");
        {
            let mut w = store.batched_writer();
            w.set(b"a", b"1");
            w.set(b"gone", b"");
            assert!(store.get(b"a").unwrap().is_none());
            w.commit().unwrap();
        }
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert!(store.get(b"gone").unwrap().is_none());
    }
}
