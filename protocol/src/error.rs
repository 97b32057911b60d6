//! Error types for the ZTB chain engine.
//!
//! Every fallible operation returns a [`ZtbError`]. The variants mirror the
//! failure modes of the chain: configuration, codec, integrity, lineage, and
//! the storage underneath. None of them are transient, so nothing here is
//! retried; every error is a deterministic consequence of the bytes on disk.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the codec, the block format, the stores and the engine.
#[derive(Debug, Error)]
pub enum ZtbError {
    /// A ROM (genesis or rolling) has the wrong size or is otherwise unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A byte value has no matching address in the ROM it is encoded against.
    #[error("encoding error: byte value 0x{byte:02X} does not occur in the ROM")]
    Encoding {
        /// The unrepresentable byte value.
        byte: u8,
    },

    /// Ciphertext could not be turned back into addresses or bytes.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// The decoded block is structurally inconsistent with its own header.
    #[error("corruption: {0}")]
    Corruption(String),

    /// The stored checksum does not match the recomputed one.
    #[error("checksum mismatch: stored {stored}, computed {computed}")]
    Checksum {
        /// Checksum carried in the header.
        stored: u8,
        /// Checksum recomputed over the decoded block.
        computed: u8,
    },

    /// A header field disagrees with the chain's independent naming channel
    /// (previous block id, own block id, branch anchor).
    #[error("link error: {0}")]
    Link(String),

    /// The chain has no blocks.
    #[error("chain not found: {0}")]
    ChainNotFound(String),

    /// The chain already has blocks where an empty chain was required.
    #[error("chain already exists: {0}")]
    ChainExists(String),

    /// No persisted block exists at the requested position.
    #[error("block {index} not found in chain {chain_id}")]
    BlockNotFound {
        /// Chain that was searched.
        chain_id: String,
        /// Index that has no file.
        index: u32,
    },

    /// The store holds a shape the append-only invariant forbids,
    /// e.g. two files for the same index.
    #[error("ambiguous chain state: {0}")]
    AmbiguousState(String),

    /// Chain identifiers become file name components and must be safe there.
    #[error("invalid chain id {0:?}: use only ASCII letters, digits, '-' and '_'")]
    InvalidChainId(String),

    /// Underlying filesystem failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used across the crate.
pub type ZtbResult<T> = Result<T, ZtbError>;

/// Fieldless classification of a [`ZtbError`], used where errors must be
/// recorded rather than propagated (verification reports).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Encoding,
    Decoding,
    Corruption,
    Checksum,
    Link,
    ChainNotFound,
    ChainExists,
    BlockNotFound,
    AmbiguousState,
    InvalidChainId,
    Io,
}

impl ZtbError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Encoding { .. } => ErrorKind::Encoding,
            Self::Decoding(_) => ErrorKind::Decoding,
            Self::Corruption(_) => ErrorKind::Corruption,
            Self::Checksum { .. } => ErrorKind::Checksum,
            Self::Link(_) => ErrorKind::Link,
            Self::ChainNotFound(_) => ErrorKind::ChainNotFound,
            Self::ChainExists(_) => ErrorKind::ChainExists,
            Self::BlockNotFound { .. } => ErrorKind::BlockNotFound,
            Self::AmbiguousState(_) => ErrorKind::AmbiguousState,
            Self::InvalidChainId(_) => ErrorKind::InvalidChainId,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// True for errors that mean the persisted data failed an integrity check,
    /// as opposed to a missing chain or a bad request.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Decoding
                | ErrorKind::Corruption
                | ErrorKind::Checksum
                | ErrorKind::Link
                | ErrorKind::AmbiguousState
        )
    }
}
