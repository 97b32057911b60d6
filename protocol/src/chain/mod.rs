//! # Chain Module
//!
//! Block format and the engine that appends, fetches and verifies blocks.
//!
//! ## Architecture
//!
//! ```text
//! block.rs     — 129-byte header, padding law, mod-7 checksum
//! engine.rs    — AddBlock / AddBranch / AddCheckpoint / Fetch
//! verify.rs    — Verify: scopes, branch discovery, reports
//! snapshot.rs  — one consistent listing per operation, ROM derivation
//! locks.rs     — per-chain writer lock table
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! payload ─► pad ─► header ─► raw block ─► ZOSCII(rolling ROM) ─► BlockStore
//!                                               ▲
//!                    genesis ROM + prior ciphertexts
//! ```

pub mod block;
pub mod engine;
pub mod locks;
mod snapshot;
pub mod verify;

pub use block::{BlockHeader, BlockKind};
pub use engine::{BlockRecord, ChainEngine, FetchedBlock};
pub use verify::{BlockVerdict, ChainReport, ChainRole, VerifyFailure, VerifyReport, VerifyScope};
