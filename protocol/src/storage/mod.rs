//! # Storage Module
//!
//! Where encoded blocks live between operations. The engine never touches
//! the filesystem directly; it talks to a [`BlockStore`], which exposes a
//! chain as an append-only, index-ordered collection of opaque ciphertexts.
//!
//! ## Architecture
//!
//! ```text
//! naming.rs  — <chain>_<index>_<block_id>.ztb, parse and format
//! fs.rs      — FsStore: one flat directory, write-once atomic publish
//! memory.rs  — MemoryStore: same naming, in a locked map (tests, tools)
//! ```
//!
//! ## Design Decisions
//!
//! 1. **Names carry the structure.** There is no manifest. Chain membership,
//!    ordering and block identity are all recovered from file names, and
//!    the header inside each block must agree with them.
//!
//! 2. **Listings keep duplicates.** A healthy chain has exactly one entry
//!    per index. Stores report what is there, duplicates and gaps included,
//!    and leave judging the shape to the engine.
//!
//! 3. **Write once.** A store refuses to overwrite an existing block name.
//!
//! 4. **Writers lock the chain, not the engine.** Several processes may
//!    open the same directory. A store hands out a per-chain writer lock
//!    that holds across all of them, so appends to one chain never compute
//!    the same index.

pub mod fs;
pub mod memory;
pub mod naming;

pub use fs::FsStore;
pub use memory::MemoryStore;
pub use naming::{validate_chain_id, BlockFileName};

use std::collections::BTreeSet;
use std::fmt;

use crate::error::ZtbResult;

/// One persisted block as seen in a store listing.
pub type BlockEntry = BlockFileName;

/// Writer lock on one chain. Released on drop.
pub struct ChainLockGuard {
    chain_id: String,
    /// Lock file held open for the lifetime of the guard, if the store
    /// needs one.
    _lock_file: Option<std::fs::File>,
}

impl ChainLockGuard {
    /// A guard with nothing to release, for stores that cannot be shared
    /// outside the current process.
    pub fn in_process(chain_id: &str) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            _lock_file: None,
        }
    }

    pub(crate) fn with_file(chain_id: &str, file: std::fs::File) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            _lock_file: Some(file),
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }
}

impl fmt::Debug for ChainLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainLockGuard")
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

/// Backend for encoded block files.
///
/// Implementations must be safe to share between threads; the engine holds
/// one behind an `Arc` and calls it from every writer and reader.
pub trait BlockStore: Send + Sync {
    /// Every block of `chain_id`, sorted by index then block id. Duplicate
    /// indices are kept. An unknown chain yields an empty list.
    fn list_chain(&self, chain_id: &str) -> ZtbResult<Vec<BlockEntry>>;

    /// Every block of every chain in one listing, sorted by chain id, then
    /// index, then block id.
    fn list_all(&self) -> ZtbResult<Vec<BlockEntry>>;

    /// Every chain id with at least one block.
    fn chain_ids(&self) -> ZtbResult<BTreeSet<String>> {
        Ok(self.list_all()?.into_iter().map(|e| e.chain_id).collect())
    }

    /// Raw ciphertext of one block. A block that is no longer there is
    /// `BlockNotFound`.
    fn read_block(&self, entry: &BlockEntry) -> ZtbResult<Vec<u8>>;

    /// Persist a new block. Fails if a block with the same name exists.
    fn write_block(&self, entry: &BlockEntry, ciphertext: &[u8]) -> ZtbResult<()>;

    /// Block until this caller is the only writer of `chain_id`.
    ///
    /// Stores reachable from more than one process must override this. The
    /// default only suits stores private to one engine, which already
    /// serializes its own writers.
    fn lock_chain(&self, chain_id: &str) -> ZtbResult<ChainLockGuard> {
        Ok(ChainLockGuard::in_process(chain_id))
    }
}

impl<S: BlockStore + ?Sized> BlockStore for std::sync::Arc<S> {
    fn list_chain(&self, chain_id: &str) -> ZtbResult<Vec<BlockEntry>> {
        (**self).list_chain(chain_id)
    }

    fn list_all(&self) -> ZtbResult<Vec<BlockEntry>> {
        (**self).list_all()
    }

    fn chain_ids(&self) -> ZtbResult<BTreeSet<String>> {
        (**self).chain_ids()
    }

    fn read_block(&self, entry: &BlockEntry) -> ZtbResult<Vec<u8>> {
        (**self).read_block(entry)
    }

    fn write_block(&self, entry: &BlockEntry, ciphertext: &[u8]) -> ZtbResult<()> {
        (**self).write_block(entry, ciphertext)
    }

    fn lock_chain(&self, chain_id: &str) -> ZtbResult<ChainLockGuard> {
        (**self).lock_chain(chain_id)
    }
}

/// Sort a listing the way every store returns it.
pub(crate) fn sort_entries(entries: &mut [BlockEntry]) {
    entries.sort_by(|a, b| {
        a.chain_id
            .cmp(&b.chain_id)
            .then_with(|| a.index.cmp(&b.index))
            .then_with(|| a.block_id.cmp(&b.block_id))
    });
}
