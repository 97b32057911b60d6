// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ZTB CLI
//!
//! Entry point for the `ztb` binary. Parses CLI arguments, initializes
//! logging, opens the genesis ROM and block directory, and runs one engine
//! operation.
//!
//! Subcommands:
//!
//! - `genesis`     — create a genesis ROM and report its byte coverage
//! - `add-block`   — append a block to a chain
//! - `add-branch`  — anchor a new branch to a trunk's tip
//! - `checkpoint`  — append an archival checkpoint
//! - `fetch`       — decode one block and emit its payload
//! - `verify`      — verify a trunk and/or its branches
//! - `version`     — print build version information
//!
//! Payload bytes and reports go to stdout. Status lines and logs go to
//! stderr, so `ztb fetch ... > out.bin` captures exactly the payload.

mod cli;
mod logging;

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use clap::Parser;
use std::io::Write;
use std::path::Path;

use ztb_protocol::config::{HEADER_SIZE, ROM_SIZE};
use ztb_protocol::{
    BlockRecord, ChainEngine, FsStore, GenesisRom, VerifyReport, VerifyScope,
};

use cli::{Commands, PayloadArgs, VerifyArgs, ZtbCli};
use logging::LogFormat;

fn main() -> Result<()> {
    let cli = ZtbCli::parse();
    logging::init_logging(logging::DEFAULT_FILTER, LogFormat::from_str_lossy(&cli.log_format));

    match cli.command {
        Commands::Genesis(args) => create_genesis(&args.out, args.force),
        Commands::AddBlock(args) => {
            let engine = open_engine(&cli.genesis, &cli.dir)?;
            let payload = read_payload(&args.payload)?;
            let record = engine
                .add_block(&args.chain, &payload)
                .with_context(|| format!("failed to append to chain '{}'", args.chain))?;
            report_record(&record);
            Ok(())
        }
        Commands::AddBranch(args) => {
            let engine = open_engine(&cli.genesis, &cli.dir)?;
            let payload = read_payload(&args.payload)?;
            let record = engine
                .add_branch(&args.trunk, &args.branch, &payload)
                .with_context(|| {
                    format!("failed to branch '{}' from '{}'", args.branch, args.trunk)
                })?;
            report_record(&record);
            Ok(())
        }
        Commands::Checkpoint(args) => {
            let engine = open_engine(&cli.genesis, &cli.dir)?;
            let record = engine
                .add_checkpoint(&args.chain)
                .with_context(|| format!("failed to checkpoint chain '{}'", args.chain))?;
            report_record(&record);
            Ok(())
        }
        Commands::Fetch(args) => {
            let engine = open_engine(&cli.genesis, &cli.dir)?;
            let block = engine
                .fetch(&args.chain, args.index)
                .with_context(|| format!("failed to fetch {}[{}]", args.chain, args.index))?;
            eprintln!(
                "{}  kind={:?}  {} bytes  written {}",
                block.file_name,
                block.header.kind,
                block.payload.len(),
                format_timestamp(block.header.timestamp)
            );
            match args.out {
                Some(path) => std::fs::write(&path, &block.payload)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&block.payload)?;
                    stdout.flush()?;
                }
            }
            Ok(())
        }
        Commands::Verify(args) => {
            let engine = open_engine(&cli.genesis, &cli.dir)?;
            run_verify(&engine, &args)
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Loads the genesis ROM and opens the block directory.
fn open_engine(genesis_path: &Path, dir: &Path) -> Result<ChainEngine<FsStore>> {
    let genesis = GenesisRom::load(genesis_path)
        .with_context(|| format!("failed to load genesis ROM {}", genesis_path.display()))?;
    let store = FsStore::open(dir)
        .with_context(|| format!("failed to open block directory {}", dir.display()))?;
    Ok(ChainEngine::new(genesis, store))
}

fn create_genesis(out: &Path, force: bool) -> Result<()> {
    if out.exists() && !force {
        bail!(
            "{} already exists; every chain built on it would become unreadable. \
             Pass --force to replace it.",
            out.display()
        );
    }

    let genesis = GenesisRom::create();
    genesis
        .save(out)
        .with_context(|| format!("failed to write genesis ROM {}", out.display()))?;
    tracing::info!(path = %out.display(), "genesis ROM created");

    let report = genesis.entropy();
    println!("genesis      {}", out.display());
    println!("fingerprint  {}", genesis.fingerprint());
    println!("size         {} bytes", report.total_bytes);
    println!(
        "coverage     {}/256 byte values",
        256 - report.missing_values
    );
    println!(
        "occurrences  min {}  max {}  expected {:.1}",
        report.min_occurrences, report.max_occurrences, report.expected_per_value
    );
    println!(
        "spread       {:.1}%  ({:?})",
        report.spread_percent, report.rating
    );
    Ok(())
}

fn read_payload(args: &PayloadArgs) -> Result<Vec<u8>> {
    match (&args.text, &args.file) {
        (Some(text), _) => Ok(text.as_bytes().to_vec()),
        (None, Some(path)) => std::fs::read(path)
            .with_context(|| format!("failed to read payload file {}", path.display())),
        (None, None) => bail!("a payload is required: pass --text or --file"),
    }
}

fn report_record(record: &BlockRecord) {
    eprintln!(
        "{}  kind={:?}  id={}  {} ciphertext bytes",
        record.file_name,
        record.header.kind,
        record.block_id(),
        record.ciphertext_len
    );
}

fn scope_from_args(args: &VerifyArgs) -> VerifyScope {
    if args.trunk_only {
        VerifyScope::TrunkOnly
    } else if args.branches_only {
        VerifyScope::AllBranches
    } else if let Some(branch) = &args.branch {
        VerifyScope::Branch(branch.clone())
    } else {
        VerifyScope::Everything
    }
}

fn run_verify(engine: &ChainEngine<FsStore>, args: &VerifyArgs) -> Result<()> {
    let scope = scope_from_args(args);
    let report = engine
        .verify(&args.trunk, scope)
        .with_context(|| format!("failed to verify '{}'", args.trunk))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.is_clean() {
        bail!(
            "verification failed: {} of {} blocks did not check out",
            report.failed(),
            report.total()
        );
    }
    Ok(())
}

fn print_report(report: &VerifyReport) {
    for chain in &report.chains {
        println!(
            "{:<24} {:?}  {}/{} passed",
            chain.chain_id,
            chain.role,
            chain.passed(),
            chain.total()
        );
    }
    for (chain_id, verdict) in report.failures() {
        let location = verdict.file_name.as_deref().unwrap_or("<missing>");
        if let Some(failure) = &verdict.failure {
            println!(
                "  FAIL {}[{}] {}: {:?}: {}",
                chain_id, verdict.index, location, failure.kind, failure.message
            );
        }
    }
    println!(
        "total {}  passed {}  failed {}",
        report.total(),
        report.passed(),
        report.failed()
    );
}

fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| format!("@{secs}"))
}

/// Prints build and format version information.
fn print_version() {
    println!("ztb          {}", env!("CARGO_PKG_VERSION"));
    println!("header       {} bytes", HEADER_SIZE);
    println!("genesis rom  {} bytes", ROM_SIZE);
    println!("rustc        {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verify_args(argv: &[&str]) -> VerifyArgs {
        let mut full = vec!["ztb", "verify", "--trunk", "t"];
        full.extend_from_slice(argv);
        match ZtbCli::try_parse_from(full).unwrap().command {
            Commands::Verify(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn scope_flags_map_to_verify_scopes() {
        assert_eq!(scope_from_args(&verify_args(&[])), VerifyScope::Everything);
        assert_eq!(
            scope_from_args(&verify_args(&["--trunk-only"])),
            VerifyScope::TrunkOnly
        );
        assert_eq!(
            scope_from_args(&verify_args(&["--branches-only"])),
            VerifyScope::AllBranches
        );
        assert_eq!(
            scope_from_args(&verify_args(&["--branch", "eu"])),
            VerifyScope::Branch("eu".to_string())
        );
    }

    #[test]
    fn payload_from_file_is_read_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        std::fs::write(&path, [0u8, 255, 10]).unwrap();
        let args = PayloadArgs {
            text: None,
            file: Some(path),
        };
        assert_eq!(read_payload(&args).unwrap(), vec![0, 255, 10]);
    }

    #[test]
    fn genesis_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis.rom");
        create_genesis(&path, false).unwrap();
        let first = std::fs::read(&path).unwrap();

        assert!(create_genesis(&path, false).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), first);

        create_genesis(&path, true).unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), ROM_SIZE);
    }

    #[test]
    fn timestamps_render_as_rfc3339() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00+00:00");
    }
}
