//! Buffer of staged key/value mutations.
//!
//! Higher layers collect a batch of SETs and DELs here and flush it to a
//! store in one go. A key is either pending-set or pending-delete, never
//! both. The optional no-double-booking guard turns repeated bookings of
//! the same key into a fatal condition for callers that require each key
//! to be touched at most once per batch.

use hashbrown::{HashMap, HashSet};
use rustc_hash::FxBuildHasher;
use thiserror::Error;

use super::traits::KvWriter;

type FastHashMap<K, V> = HashMap<K, V, FxBuildHasher>;
type FastHashSet<K> = HashSet<K, FxBuildHasher>;

/// Double-booking conditions reported to the guard callback.
#[derive(Error, Debug)]
pub enum MutationError {
    #[error("repetitive SET mutation. The key '{0}' was already set")]
    RepeatedSet(String),
    #[error("repetitive SET mutation. The key '{0}' was already deleted")]
    SetAfterDelete(String),
    #[error("repetitive DEL mutation. The key '{0}' was already deleted")]
    RepeatedDelete(String),
}

type DoubleBookingGuard = Box<dyn Fn(MutationError) + Send + Sync>;

/// In-memory batch of SET and DEL operations.
#[derive(Default)]
pub struct Mutations {
    sets: FastHashMap<Vec<u8>, Vec<u8>>,
    dels: FastHashSet<Vec<u8>>,
    guard: Option<DoubleBookingGuard>,
}

impl std::fmt::Debug for Mutations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutations")
            .field("sets", &self.sets.len())
            .field("dels", &self.dels.len())
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

impl Mutations {
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer that reports repeated SET/DEL bookings of the same key to
    /// `guard` before applying them. The guard is free to panic and fail
    /// the thread.
    pub fn with_double_booking_guard(guard: impl Fn(MutationError) + Send + Sync + 'static) -> Self {
        Self {
            guard: Some(Box::new(guard)),
            ..Self::default()
        }
    }

    /// Stages a SET, or a DEL when `value` is empty. A SET clears any
    /// pending DEL for the key and vice versa.
    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        if let Some(guard) = &self.guard {
            if !value.is_empty() {
                if self.sets.contains_key(key) {
                    guard(MutationError::RepeatedSet(hex::encode(key)));
                } else if self.dels.contains(key) {
                    guard(MutationError::SetAfterDelete(hex::encode(key)));
                }
            } else if self.dels.contains(key) {
                guard(MutationError::RepeatedDelete(hex::encode(key)));
            }
        }
        if value.is_empty() {
            self.sets.remove(key);
            self.dels.insert(key.to_vec());
        } else {
            self.dels.remove(key);
            self.sets.insert(key.to_vec(), value.to_vec());
        }
    }

    /// Number of pending SETs.
    pub fn len_set(&self) -> usize {
        self.sets.len()
    }

    /// Number of pending DELs.
    pub fn len_del(&self) -> usize {
        self.dels.len()
    }

    /// Enumerates pending SETs, then pending DELs (`None` value). The
    /// callback returns `false` to stop.
    pub fn iterate(&self, f: &mut dyn FnMut(&[u8], Option<&[u8]>) -> bool) {
        for (k, v) in &self.sets {
            if !f(k, Some(v)) {
                return;
            }
        }
        for k in &self.dels {
            if !f(k, None) {
                return;
            }
        }
    }

    /// Applies every staged operation to `sink`; DELs as empty-value sets.
    pub fn write_to(&self, sink: &mut dyn KvWriter) {
        for (k, v) in &self.sets {
            sink.set(k, v);
        }
        for k in &self.dels {
            sink.set(k, &[]);
        }
    }
}
