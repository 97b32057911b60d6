//! # Verification
//!
//! Walks a trunk and its branches and checks every block without stopping
//! at the first failure. Each block is decoded exactly as
//! [`ChainEngine::fetch`] would, then cross-checked against the file names
//! around it:
//!
//! ```text
//!   <trunk>_0002_C.ztb   header: prev = B   ◄── must equal id in name of index 1
//!   <trunk>_0001_B.ztb   header: prev = A   ◄── must equal id in name of index 0
//!   <trunk>_0000_A.ztb   header: prev = NULL
//! ```
//!
//! The names are an independent channel: swapping, renaming or splicing in
//! a whole file produces a header that disagrees with its neighbours even
//! when the file itself decodes cleanly.
//!
//! Chains are walked newest to oldest, starting at the tip where trust was
//! last established.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::block::{open_raw_block, BlockKind};
use super::engine::ChainEngine;
use super::snapshot::ChainSnapshot;
use crate::codec;
use crate::error::{ErrorKind, ZtbError, ZtbResult};
use crate::storage::{validate_chain_id, BlockEntry, BlockStore};

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Which chains a verification run covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyScope {
    /// The trunk and every branch discovered for it.
    #[default]
    Everything,
    TrunkOnly,
    /// Every discovered branch, but not the trunk itself.
    AllBranches,
    /// One named branch.
    Branch(String),
}

impl VerifyScope {
    fn includes_trunk(&self) -> bool {
        matches!(self, Self::Everything | Self::TrunkOnly)
    }

    fn discovers_branches(&self) -> bool {
        matches!(self, Self::Everything | Self::AllBranches)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainRole {
    Trunk,
    Branch,
}

/// Why a block failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ZtbError> for VerifyFailure {
    fn from(err: &ZtbError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// The outcome for one block position.
///
/// `block_id` and `file_name` are absent when no file exists for the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockVerdict {
    pub index: u32,
    pub block_id: Option<String>,
    pub file_name: Option<String>,
    pub failure: Option<VerifyFailure>,
}

impl BlockVerdict {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Verdicts for one chain, newest block first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub chain_id: String,
    pub role: ChainRole,
    pub blocks: Vec<BlockVerdict>,
}

impl ChainReport {
    pub fn total(&self) -> usize {
        self.blocks.len()
    }

    pub fn passed(&self) -> usize {
        self.blocks.iter().filter(|b| b.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    pub fn is_clean(&self) -> bool {
        self.blocks.iter().all(BlockVerdict::passed)
    }
}

/// Aggregated result of [`ChainEngine::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub trunk_id: String,
    pub scope: VerifyScope,
    pub chains: Vec<ChainReport>,
}

impl VerifyReport {
    pub fn total(&self) -> usize {
        self.chains.iter().map(ChainReport::total).sum()
    }

    pub fn passed(&self) -> usize {
        self.chains.iter().map(ChainReport::passed).sum()
    }

    pub fn failed(&self) -> usize {
        self.chains.iter().map(ChainReport::failed).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.chains.iter().all(ChainReport::is_clean)
    }

    pub fn chain(&self, chain_id: &str) -> Option<&ChainReport> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    /// Every failing block as `(chain_id, verdict)`.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &BlockVerdict)> {
        self.chains.iter().flat_map(|c| {
            c.blocks
                .iter()
                .filter(|b| !b.passed())
                .map(move |b| (c.chain_id.as_str(), b))
        })
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

impl<S: BlockStore> ChainEngine<S> {
    /// Verify `trunk_id` and/or its branches.
    ///
    /// Only scope problems are returned as errors: an empty trunk, or a named
    /// branch with no blocks, is `ChainNotFound`. Every per-block problem is
    /// recorded in the report and the walk continues.
    pub fn verify(&self, trunk_id: &str, scope: VerifyScope) -> ZtbResult<VerifyReport> {
        validate_chain_id(trunk_id)?;
        if let VerifyScope::Branch(branch_id) = &scope {
            validate_chain_id(branch_id)?;
        }

        // Discovery looks at every chain: list the store once and slice it.
        let mut by_chain = if scope.discovers_branches() {
            Some(group_by_chain(self.store.list_all()?))
        } else {
            None
        };

        let mut trunk = match by_chain.as_mut() {
            Some(groups) => ChainSnapshot::from_entries(
                &self.store,
                &self.genesis,
                trunk_id,
                groups.remove(trunk_id).unwrap_or_default(),
            ),
            None => self.snapshot(trunk_id)?,
        };
        if trunk.is_empty() {
            return Err(ZtbError::ChainNotFound(trunk_id.to_string()));
        }
        let trunk_ids = trunk.block_ids();

        let mut chains = Vec::new();
        if scope.includes_trunk() {
            chains.push(self.verify_chain(&mut trunk, ChainRole::Trunk, &trunk_ids)?);
        }

        let branches = match (&scope, by_chain) {
            (VerifyScope::Branch(branch_id), _) => {
                if branch_id == trunk_id {
                    return Err(ZtbError::ChainNotFound(branch_id.clone()));
                }
                let branch = self.snapshot(branch_id)?;
                if branch.is_empty() {
                    return Err(ZtbError::ChainNotFound(branch_id.clone()));
                }
                vec![branch]
            }
            (_, Some(groups)) => self.discover_branches(groups, &trunk_ids),
            _ => Vec::new(),
        };

        for mut branch in branches {
            chains.push(self.verify_chain(&mut branch, ChainRole::Branch, &trunk_ids)?);
        }

        let report = VerifyReport {
            trunk_id: trunk_id.to_string(),
            scope,
            chains,
        };
        info!(
            trunk = trunk_id,
            chains = report.chains.len(),
            total = report.total(),
            failed = report.failed(),
            "verification finished"
        );
        Ok(report)
    }

    /// Branch candidates among `others` (every chain but the trunk), minus
    /// those whose block 0 decodes cleanly and shows it is not anchored to
    /// this trunk. Candidates that cannot be read stay in, so damage is
    /// reported.
    fn discover_branches(
        &self,
        others: BTreeMap<String, Vec<BlockEntry>>,
        trunk_ids: &BTreeSet<String>,
    ) -> Vec<ChainSnapshot<'_, S>> {
        let mut branches = Vec::new();
        for (chain_id, entries) in others {
            let roots: Vec<&BlockEntry> = entries.iter().filter(|e| e.index == 0).collect();
            let verdict = match roots.as_slice() {
                [root] => self.root_anchor(root),
                _ => None,
            };
            match verdict {
                Some(Anchor::To(anchor)) if !trunk_ids.contains(&anchor) => {
                    debug!(chain_id = %chain_id, "anchored elsewhere, not a branch of this trunk");
                }
                Some(Anchor::NotBranch) => {
                    debug!(chain_id = %chain_id, "independent chain, not a branch");
                }
                _ => branches.push(ChainSnapshot::from_entries(
                    &self.store,
                    &self.genesis,
                    &chain_id,
                    entries,
                )),
            }
        }
        branches
    }

    /// Read a chain's block 0 under the genesis ROM, where every chain root
    /// is encoded.
    fn root_anchor(&self, root: &BlockEntry) -> Option<Anchor> {
        let ciphertext = self.store.read_block(root).ok()?;
        let raw = codec::decode_block(&ciphertext, self.genesis.rom()).ok()?;
        let (header, _) = open_raw_block(&raw).ok()?;
        if header.block_id != root.block_id {
            return None;
        }
        Some(if header.is_branch() {
            Anchor::To(header.trunk_id)
        } else {
            Anchor::NotBranch
        })
    }

    fn verify_chain(
        &self,
        snap: &mut ChainSnapshot<'_, S>,
        role: ChainRole,
        trunk_ids: &BTreeSet<String>,
    ) -> ZtbResult<ChainReport> {
        let chain_id = snap.chain_id().to_string();
        let mut blocks = Vec::new();

        if let Some(max) = snap.max_index() {
            for index in (0..=max).rev() {
                let files = snap.files_at(index).to_vec();
                match files.as_slice() {
                    [] => {
                        let err = ZtbError::BlockNotFound {
                            chain_id: chain_id.clone(),
                            index,
                        };
                        warn!(chain_id = %chain_id, index, error = %err, "block missing");
                        blocks.push(BlockVerdict {
                            index,
                            block_id: None,
                            file_name: None,
                            failure: Some((&err).into()),
                        });
                    }
                    [entry] => {
                        let result = self.check_block(snap, entry, role, trunk_ids);
                        blocks.push(verdict_for(entry, result));
                    }
                    many => {
                        let message = format!("{} files share index {}", many.len(), index);
                        for entry in many {
                            let err = ZtbError::AmbiguousState(message.clone());
                            blocks.push(verdict_for(entry, Err(err)));
                        }
                    }
                }
            }
        }

        Ok(ChainReport {
            chain_id,
            role,
            blocks,
        })
    }

    /// Every check for one block. The first failing check wins.
    fn check_block(
        &self,
        snap: &mut ChainSnapshot<'_, S>,
        entry: &BlockEntry,
        role: ChainRole,
        trunk_ids: &BTreeSet<String>,
    ) -> ZtbResult<()> {
        let (header, _) = snap.open(&self.rolling, entry)?;

        // Lineage against the neighbouring file name.
        if entry.index == 0 {
            if !header.has_no_predecessor() {
                return Err(ZtbError::Link(format!(
                    "block 0 names predecessor {}",
                    header.prev_block_id
                )));
            }
        } else {
            let prev = match snap.slot(entry.index - 1) {
                Ok(prev) => prev,
                Err(ZtbError::BlockNotFound { index, .. }) => {
                    return Err(ZtbError::Link(format!(
                        "previous block file (index {}) is missing",
                        index
                    )));
                }
                Err(e) => return Err(e),
            };
            if header.prev_block_id != prev.block_id {
                return Err(ZtbError::Link(format!(
                    "prev_block_id {} does not match previous file {}",
                    header.prev_block_id, prev
                )));
            }
        }

        // Kind rules.
        match header.kind {
            BlockKind::Branch if entry.index != 0 => {
                return Err(ZtbError::Link(format!(
                    "branch root marker on block {}",
                    entry.index
                )));
            }
            BlockKind::Branch => {
                if role == ChainRole::Branch && !trunk_ids.contains(&header.trunk_id) {
                    return Err(ZtbError::Link(format!(
                        "branch anchor {} is not a block of the trunk",
                        header.trunk_id
                    )));
                }
            }
            BlockKind::Checkpoint if entry.index == 0 => {
                return Err(ZtbError::Link("checkpoint at block 0".to_string()));
            }
            BlockKind::Trunk | BlockKind::Checkpoint => {
                if !header.has_no_anchor() {
                    return Err(ZtbError::Link(format!(
                        "non-root block {} carries anchor {}",
                        entry.index, header.trunk_id
                    )));
                }
                if role == ChainRole::Branch && entry.index == 0 {
                    return Err(ZtbError::Link(
                        "block 0 of a branch is not a branch root".to_string(),
                    ));
                }
            }
        }

        debug!(chain_id = %entry.chain_id, index = entry.index, "block verified");
        Ok(())
    }
}

/// What a chain's block 0 says about its parent.
enum Anchor {
    To(String),
    NotBranch,
}

/// Split a store-wide listing into per-chain listings, keeping order.
fn group_by_chain(entries: Vec<BlockEntry>) -> BTreeMap<String, Vec<BlockEntry>> {
    let mut groups: BTreeMap<String, Vec<BlockEntry>> = BTreeMap::new();
    for entry in entries {
        groups.entry(entry.chain_id.clone()).or_default().push(entry);
    }
    groups
}

fn verdict_for(entry: &BlockEntry, result: ZtbResult<()>) -> BlockVerdict {
    let failure = match result {
        Ok(()) => None,
        Err(err) => {
            warn!(
                chain_id = %entry.chain_id,
                index = entry.index,
                file = %entry,
                error = %err,
                "block failed verification"
            );
            Some(VerifyFailure::from(&err))
        }
    };
    BlockVerdict {
        index: entry.index,
        block_id: Some(entry.block_id.clone()),
        file_name: Some(entry.to_string()),
        failure,
    }
}
