//! Single-byte prefix partitions of a key/value store.
//!
//! The trie keeps node records and values in two disjoint partitions of the
//! same backing store; a partition prepends its prefix byte to every key
//! before delegating.

use super::traits::{KvReader, KvWriter};
use crate::error::TrieError;

/// Reader over one prefix partition.
#[derive(Debug, Clone)]
pub struct ReaderPartition<R> {
    reader: R,
    prefix: u8,
}

impl<R: KvReader> ReaderPartition<R> {
    pub fn new(reader: R, prefix: u8) -> Self {
        Self { reader, prefix }
    }

    fn prefixed(&self, key: &[u8]) -> Vec<u8> {
        let mut k = Vec::with_capacity(key.len() + 1);
        k.push(self.prefix);
        k.extend_from_slice(key);
        k
    }
}

impl<R: KvReader> KvReader for ReaderPartition<R> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        self.reader.get(&self.prefixed(key))
    }

    fn has(&self, key: &[u8]) -> Result<bool, TrieError> {
        self.reader.has(&self.prefixed(key))
    }
}

/// Writer into one prefix partition.
pub struct WriterPartition<'a> {
    writer: &'a mut dyn KvWriter,
    prefix: u8,
}

impl<'a> WriterPartition<'a> {
    pub fn new(writer: &'a mut dyn KvWriter, prefix: u8) -> Self {
        Self { writer, prefix }
    }
}

impl KvWriter for WriterPartition<'_> {
    fn set(&mut self, key: &[u8], value: &[u8]) {
        let mut k = Vec::with_capacity(key.len() + 1);
        k.push(self.prefix);
        k.extend_from_slice(key);
        self.writer.set(&k, value);
    }
}
