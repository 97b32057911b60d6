//! A point-in-time view of one chain.
//!
//! Every engine operation lists a chain exactly once and works from that
//! listing until it finishes, so a concurrent append shows up either fully
//! or not at all. The snapshot also caches ciphertexts and checkpoint
//! detection results: verifying a chain touches each file up to 65 times
//! (once as itself, up to 64 times as rolling-ROM history).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::debug;

use super::block::{open_raw_block, BlockHeader, BlockKind};
use crate::codec::{self, GenesisRom, Rom, RollingRomBuilder};
use crate::config::SAMPLE_SIZE;
use crate::error::{ZtbError, ZtbResult};
use crate::storage::{BlockEntry, BlockStore};

pub(crate) struct ChainSnapshot<'a, S: BlockStore + ?Sized> {
    store: &'a S,
    genesis: &'a GenesisRom,
    chain_id: String,
    slots: BTreeMap<u32, Vec<BlockEntry>>,
    ciphertexts: HashMap<String, Arc<[u8]>>,
    checkpoints: HashMap<String, bool>,
}

impl<'a, S: BlockStore + ?Sized> ChainSnapshot<'a, S> {
    pub fn load(store: &'a S, genesis: &'a GenesisRom, chain_id: &str) -> ZtbResult<Self> {
        let entries = store.list_chain(chain_id)?;
        Ok(Self::from_entries(store, genesis, chain_id, entries))
    }

    /// Build from a listing already taken, e.g. one slice of
    /// [`BlockStore::list_all`].
    pub fn from_entries(
        store: &'a S,
        genesis: &'a GenesisRom,
        chain_id: &str,
        entries: Vec<BlockEntry>,
    ) -> Self {
        let mut slots: BTreeMap<u32, Vec<BlockEntry>> = BTreeMap::new();
        for entry in entries {
            slots.entry(entry.index).or_default().push(entry);
        }
        Self {
            store,
            genesis,
            chain_id: chain_id.to_string(),
            slots,
            ciphertexts: HashMap::new(),
            checkpoints: HashMap::new(),
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of distinct indices present.
    pub fn index_count(&self) -> usize {
        self.slots.len()
    }

    /// Highest index present, if any.
    pub fn max_index(&self) -> Option<u32> {
        self.slots.keys().next_back().copied()
    }

    /// Block ids of every listed file.
    pub fn block_ids(&self) -> BTreeSet<String> {
        self.slots
            .values()
            .flatten()
            .map(|e| e.block_id.clone())
            .collect()
    }

    /// Every file sharing `index`, in listing order.
    pub fn files_at(&self, index: u32) -> &[BlockEntry] {
        self.slots.get(&index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The one file at `index`. Missing is `BlockNotFound`; more than one
    /// is `AmbiguousState`.
    pub fn slot(&self, index: u32) -> ZtbResult<&BlockEntry> {
        match self.files_at(index) {
            [] => Err(ZtbError::BlockNotFound {
                chain_id: self.chain_id.clone(),
                index,
            }),
            [entry] => Ok(entry),
            many => Err(ZtbError::AmbiguousState(format!(
                "chain {} has {} files for index {}",
                self.chain_id,
                many.len(),
                index
            ))),
        }
    }

    /// True when the present indices form one gap-free run with one file
    /// each. The run may start above 0 once old blocks have been archived.
    pub fn is_well_formed(&self) -> bool {
        let Some(&first) = self.slots.keys().next() else {
            return true;
        };
        self.slots
            .iter()
            .enumerate()
            .all(|(i, (&index, files))| index as u64 == first as u64 + i as u64 && files.len() == 1)
    }

    /// Index the next append would receive, or an error if the chain shape
    /// does not allow appending.
    pub fn next_index(&self) -> ZtbResult<u32> {
        if !self.is_well_formed() {
            return Err(ZtbError::AmbiguousState(format!(
                "chain {} is not a contiguous run of single blocks; refusing to append",
                self.chain_id
            )));
        }
        match self.max_index() {
            None => Ok(0),
            Some(max) => max
                .checked_add(1)
                .ok_or_else(|| ZtbError::AmbiguousState(format!("chain {} is full", self.chain_id))),
        }
    }

    /// The last block, if the chain has any.
    pub fn tip(&self) -> ZtbResult<Option<&BlockEntry>> {
        match self.max_index() {
            Some(index) => self.slot(index).map(Some),
            None => Ok(None),
        }
    }

    pub fn ciphertext(&mut self, entry: &BlockEntry) -> ZtbResult<Arc<[u8]>> {
        let key = entry.to_string();
        if let Some(bytes) = self.ciphertexts.get(&key) {
            return Ok(Arc::clone(bytes));
        }
        let bytes: Arc<[u8]> = self.store.read_block(entry)?.into();
        self.ciphertexts.insert(key, Arc::clone(&bytes));
        Ok(bytes)
    }

    /// Try to read `entry` as a checkpoint: decode under the genesis ROM and
    /// accept only a fully valid header of kind checkpoint naming this file.
    pub fn open_as_checkpoint(
        &mut self,
        entry: &BlockEntry,
    ) -> ZtbResult<Option<(BlockHeader, Vec<u8>)>> {
        let key = entry.to_string();
        if self.checkpoints.get(&key) == Some(&false) {
            return Ok(None);
        }

        let ciphertext = self.ciphertext(entry)?;
        let opened = codec::decode_block(&ciphertext, self.genesis.rom())
            .and_then(|raw| open_raw_block(&raw))
            .ok()
            .filter(|(header, _)| {
                header.kind == BlockKind::Checkpoint && header.block_id == entry.block_id
            });

        self.checkpoints.insert(key, opened.is_some());
        Ok(opened)
    }

    pub fn is_checkpoint(&mut self, entry: &BlockEntry) -> ZtbResult<bool> {
        if let Some(&known) = self.checkpoints.get(&entry.to_string()) {
            return Ok(known);
        }
        Ok(self.open_as_checkpoint(entry)?.is_some())
    }

    /// Ciphertext samples of the blocks before `index`, most recent first,
    /// stopping after `cap` samples or at the first checkpoint.
    ///
    /// Every index in the sampled window must hold exactly one file.
    pub fn history_before(&mut self, index: u32, cap: usize) -> ZtbResult<Vec<Arc<[u8]>>> {
        let mut samples = Vec::new();
        let mut position = index;

        while position > 0 && samples.len() < cap {
            position -= 1;
            let entry = self.slot(position)?.clone();
            if self.is_checkpoint(&entry)? {
                debug!(
                    chain_id = %self.chain_id,
                    index,
                    checkpoint = position,
                    "history truncated at checkpoint"
                );
                break;
            }
            let bytes = self.ciphertext(&entry)?;
            let take = bytes.len().min(SAMPLE_SIZE);
            samples.push(Arc::from(&bytes[..take]));
        }
        Ok(samples)
    }

    /// Rolling ROM for the block at `index`.
    pub fn rolling_rom(&mut self, builder: &RollingRomBuilder, index: u32) -> ZtbResult<Rom> {
        let history = self.history_before(index, builder.history_cap())?;
        Ok(builder.build_from(self.genesis.rom(), &history))
    }

    /// Decode and check one block: ROM selection, decode, header parse,
    /// length, layout, checksum, block id against the file name.
    pub fn open(
        &mut self,
        builder: &RollingRomBuilder,
        entry: &BlockEntry,
    ) -> ZtbResult<(BlockHeader, Vec<u8>)> {
        if let Some(opened) = self.open_as_checkpoint(entry)? {
            return Ok(opened);
        }

        let rom = self.rolling_rom(builder, entry.index)?;
        let ciphertext = self.ciphertext(entry)?;
        let raw = codec::decode_block(&ciphertext, &rom)?;
        let (header, payload) = open_raw_block(&raw)?;

        if header.block_id != entry.block_id {
            return Err(ZtbError::Link(format!(
                "header block id {} does not match file name {}",
                header.block_id, entry
            )));
        }
        Ok((header, payload))
    }
}
