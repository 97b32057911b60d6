// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ZTB Protocol — Core Library
//!
//! ZOSCII Tamperproof Blocks: append-only chains of blocks where every block
//! is encoded against a ROM derived from the chain's own history, so a block
//! only reads back in the exact place it was written, and a changed byte
//! shows up as a block that no longer checks out.
//!
//! Not cryptography. The guarantees are tamper *evidence* and lineage, not
//! secrecy against someone holding the genesis ROM.
//!
//! ## Architecture
//!
//! - **codec** — ZOSCII encode/decode, the genesis ROM, rolling ROM derivation.
//! - **chain** — Block header format, the chain engine, verification.
//! - **storage** — Block stores: a flat directory, or memory for tests.
//! - **error** — One error type for everything above.
//! - **config** — Protocol constants and header offsets.
//!
//! ## Quick Tour
//!
//! ```no_run
//! use ztb_protocol::{ChainEngine, FsStore, GenesisRom, VerifyScope};
//!
//! # fn main() -> ztb_protocol::ZtbResult<()> {
//! let genesis = GenesisRom::load("genesis.rom")?;
//! let engine = ChainEngine::new(genesis, FsStore::open("chains")?);
//!
//! engine.add_block("audit", b"first entry")?;
//! engine.add_branch("audit", "audit-eu", b"regional fork")?;
//! assert_eq!(engine.fetch("audit", 0)?.payload, b"first entry");
//!
//! let report = engine.verify("audit", VerifyScope::Everything)?;
//! assert!(report.is_clean());
//! # Ok(())
//! # }
//! ```
//!
//! ## Design Philosophy
//!
//! 1. The files are the state. Nothing is cached between calls.
//! 2. Writes are all-or-nothing; verification never stops early.
//! 3. Every failure is deterministic given the bytes on disk, so none are retried.

pub mod chain;
pub mod codec;
pub mod config;
pub mod error;
pub mod storage;

pub use chain::{
    BlockHeader, BlockKind, BlockRecord, BlockVerdict, ChainEngine, ChainReport, ChainRole,
    FetchedBlock, VerifyFailure, VerifyReport, VerifyScope,
};
pub use codec::{EntropyReport, GenesisRom, Rom, RollingRomBuilder};
pub use error::{ErrorKind, ZtbError, ZtbResult};
pub use storage::{BlockEntry, BlockFileName, BlockStore, FsStore, MemoryStore};
