//! # Chain Engine
//!
//! Appends, branches, checkpoints and fetches blocks. The engine owns the
//! genesis ROM and a [`BlockStore`]; everything else is derived from the
//! files on every call. There is no cached chain state to go stale.
//!
//! ## Append Pipeline
//!
//! ```text
//! lock(chain) ─► snapshot ─► index, prev ─► rolling ROM ─► header ‖ pad(payload)
//!                                                               │
//!             unlock ◄─ publish <chain>_<index>_<id>.ztb ◄─ ZOSCII encode
//! ```
//!
//! The lock is taken twice: the engine's in-process table first, then the
//! store's chain lock, which also excludes other processes sharing the
//! directory. Both are held until the block is published.
//!
//! Every step before publish is pure, so a failure anywhere (most likely an
//! encoding error on a ROM missing a byte value) leaves the store untouched.

use std::collections::BTreeSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::block::{assemble_raw_block, BlockHeader, BlockKind, HeaderDraft};
use super::locks::ChainLocks;
use super::snapshot::ChainSnapshot;
use crate::codec::{self, GenesisRom, Rom, RollingRomBuilder};
use crate::config::{CHECKPOINT_PAYLOAD, NULL_BLOCK_ID};
use crate::error::{ZtbError, ZtbResult};
use crate::storage::{validate_chain_id, BlockEntry, BlockFileName, BlockStore};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What an append wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub chain_id: String,
    pub index: u32,
    pub file_name: String,
    pub header: BlockHeader,
    /// Size of the persisted ciphertext (twice the raw block).
    pub ciphertext_len: usize,
}

impl BlockRecord {
    pub fn block_id(&self) -> &str {
        &self.header.block_id
    }
}

/// A decoded, checked block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBlock {
    pub chain_id: String,
    pub index: u32,
    pub file_name: String,
    pub header: BlockHeader,
    /// The original payload, padding stripped.
    pub payload: Vec<u8>,
}

// ---------------------------------------------------------------------------
// ChainEngine
// ---------------------------------------------------------------------------

/// The ZTB chain engine.
///
/// `Send + Sync` whenever the store is; share it behind an `Arc` and call
/// it from as many threads as needed. Writers to the same chain are
/// serialized internally.
pub struct ChainEngine<S: BlockStore> {
    pub(crate) genesis: GenesisRom,
    pub(crate) store: S,
    pub(crate) rolling: RollingRomBuilder,
    locks: ChainLocks,
}

impl<S: BlockStore> ChainEngine<S> {
    pub fn new(genesis: GenesisRom, store: S) -> Self {
        info!(
            genesis = %genesis.fingerprint(),
            "chain engine ready"
        );
        Self {
            genesis,
            store,
            rolling: RollingRomBuilder::new(),
            locks: ChainLocks::new(),
        }
    }

    pub fn genesis(&self) -> &GenesisRom {
        &self.genesis
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Every chain id with at least one block.
    pub fn chain_ids(&self) -> ZtbResult<BTreeSet<String>> {
        self.store.chain_ids()
    }

    /// Number of distinct block indices persisted for `chain_id`.
    pub fn chain_len(&self, chain_id: &str) -> ZtbResult<usize> {
        validate_chain_id(chain_id)?;
        Ok(self.snapshot(chain_id)?.index_count())
    }

    /// The block files of `chain_id` as currently listed.
    pub fn blocks(&self, chain_id: &str) -> ZtbResult<Vec<BlockEntry>> {
        validate_chain_id(chain_id)?;
        self.store.list_chain(chain_id)
    }

    pub(crate) fn snapshot(&self, chain_id: &str) -> ZtbResult<ChainSnapshot<'_, S>> {
        ChainSnapshot::load(&self.store, &self.genesis, chain_id)
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Append `payload` to `chain_id`, creating the chain if it is empty.
    pub fn add_block(&self, chain_id: &str, payload: &[u8]) -> ZtbResult<BlockRecord> {
        validate_chain_id(chain_id)?;
        self.locks.with_lock(chain_id, || -> ZtbResult<BlockRecord> {
            let _writer = self.store.lock_chain(chain_id)?;
            let mut snap = self.snapshot(chain_id)?;
            let index = snap.next_index()?;
            let prev_block_id = match snap.tip()? {
                Some(tip) => tip.block_id.clone(),
                None => NULL_BLOCK_ID.to_string(),
            };
            let rom = snap.rolling_rom(&self.rolling, index)?;

            self.commit(
                chain_id,
                index,
                prev_block_id,
                NULL_BLOCK_ID.to_string(),
                BlockKind::Trunk,
                payload,
                &rom,
            )
        })
    }

    /// Start `branch_id` with one block anchored to the current tip of
    /// `trunk_id`.
    ///
    /// The trunk must have at least one block (`ChainNotFound` otherwise)
    /// and the branch must have none (`ChainExists` otherwise).
    pub fn add_branch(
        &self,
        trunk_id: &str,
        branch_id: &str,
        payload: &[u8],
    ) -> ZtbResult<BlockRecord> {
        validate_chain_id(trunk_id)?;
        validate_chain_id(branch_id)?;

        self.locks.with_lock(branch_id, || -> ZtbResult<BlockRecord> {
            let _writer = self.store.lock_chain(branch_id)?;
            let trunk = self.snapshot(trunk_id)?;
            let anchor = trunk
                .tip()?
                .map(|tip| tip.block_id.clone())
                .ok_or_else(|| ZtbError::ChainNotFound(trunk_id.to_string()))?;

            let mut branch = self.snapshot(branch_id)?;
            if !branch.is_empty() {
                return Err(ZtbError::ChainExists(branch_id.to_string()));
            }
            let rom = branch.rolling_rom(&self.rolling, 0)?;

            let record = self.commit(
                branch_id,
                0,
                NULL_BLOCK_ID.to_string(),
                anchor,
                BlockKind::Branch,
                payload,
                &rom,
            )?;
            info!(
                trunk = trunk_id,
                branch = branch_id,
                anchor = %record.header.trunk_id,
                "branch created"
            );
            Ok(record)
        })
    }

    /// Append an archival boundary to `chain_id`.
    ///
    /// The checkpoint is encoded against the genesis ROM, and blocks after
    /// it never sample anything at or before it, so older blocks can be
    /// moved out of the store without affecting newer ones.
    pub fn add_checkpoint(&self, chain_id: &str) -> ZtbResult<BlockRecord> {
        validate_chain_id(chain_id)?;
        self.locks.with_lock(chain_id, || -> ZtbResult<BlockRecord> {
            let _writer = self.store.lock_chain(chain_id)?;
            let snap = self.snapshot(chain_id)?;
            let prev_block_id = snap
                .tip()?
                .map(|tip| tip.block_id.clone())
                .ok_or_else(|| ZtbError::ChainNotFound(chain_id.to_string()))?;
            let index = snap.next_index()?;

            self.commit(
                chain_id,
                index,
                prev_block_id,
                NULL_BLOCK_ID.to_string(),
                BlockKind::Checkpoint,
                CHECKPOINT_PAYLOAD,
                self.genesis.rom(),
            )
        })
    }

    /// Build, encode and publish one block. Nothing is written unless every
    /// earlier step succeeded.
    #[allow(clippy::too_many_arguments)]
    fn commit(
        &self,
        chain_id: &str,
        index: u32,
        prev_block_id: String,
        trunk_id: String,
        kind: BlockKind,
        payload: &[u8],
        rom: &Rom,
    ) -> ZtbResult<BlockRecord> {
        let draft = HeaderDraft {
            block_id: Uuid::new_v4().to_string(),
            prev_block_id,
            trunk_id,
            timestamp: u64::try_from(Utc::now().timestamp()).unwrap_or(0),
            kind,
        };
        let (header, raw) = assemble_raw_block(draft, payload)?;
        let ciphertext = codec::encode_block(&raw, rom)?;

        let entry = BlockFileName::new(chain_id, index, header.block_id.clone());
        self.store.write_block(&entry, &ciphertext)?;

        info!(
            chain_id,
            index,
            block_id = %header.block_id,
            kind = ?header.kind,
            payload_len = header.payload_len,
            ciphertext_len = ciphertext.len(),
            "block committed"
        );

        Ok(BlockRecord {
            chain_id: chain_id.to_string(),
            index,
            file_name: entry.to_string(),
            header,
            ciphertext_len: ciphertext.len(),
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Decode and check block `index` of `chain_id`.
    ///
    /// Fails with `BlockNotFound` if no file exists for the index,
    /// `AmbiguousState` if several do, and with the codec or integrity error
    /// of the first check that does not hold.
    pub fn fetch(&self, chain_id: &str, index: u32) -> ZtbResult<FetchedBlock> {
        validate_chain_id(chain_id)?;
        let mut snap = self.snapshot(chain_id)?;
        let entry = snap.slot(index)?.clone();
        let (header, payload) = snap.open(&self.rolling, &entry)?;

        Ok(FetchedBlock {
            chain_id: chain_id.to_string(),
            index,
            file_name: entry.to_string(),
            header,
            payload,
        })
    }
}
