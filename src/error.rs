//! Crate-wide error type.

use thiserror::Error;

/// Errors surfaced by trie operations.
#[derive(Error, Debug)]
pub enum TrieError {
    /// The requested root commitment is not present in the store.
    #[error("root commitment '{0}' does not exist")]
    RootNotFound(String),

    /// `init_root` was called with an empty identity value.
    #[error("identity of the root cannot be empty")]
    EmptyIdentity,

    /// An update addressed the reserved empty key holding the identity.
    #[error("identity of the state can't be changed")]
    IdentityUpdate,

    /// Deserialization finished with unread bytes left over.
    #[error("serialization error: not all bytes consumed")]
    NotAllBytesConsumed,

    /// Persistent bytes do not form a valid record.
    #[error("corrupted data: {0}")]
    Corrupted(String),

    /// A packed key was requested for a digit string that does not fill
    /// whole bytes for the trie's arity.
    #[error("unpacked key of {len} digits is not byte-aligned for arity {arity}")]
    UnalignedKey { len: usize, arity: u16 },

    /// Serialized byte does not name a supported path arity.
    #[error("unsupported path arity byte: {0}")]
    UnsupportedArity(u8),

    /// Serialized byte does not name a supported hash size.
    #[error("wrong hash size: {0}")]
    WrongHashSize(u8),

    /// A proof failed structural validation or commitment recomputation.
    #[error("invalid proof: {0}")]
    InvalidProof(String),

    /// Distinguished sentinel raised by store adaptors when the backend
    /// is closed or gone.
    #[error("database is closed or unavailable")]
    DbUnavailable,
}
