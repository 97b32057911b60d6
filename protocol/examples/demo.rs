//! Interactive walkthrough of a ZTB chain's life.
//!
//! Creates a genesis ROM, grows a trunk and a branch, archives history
//! behind a checkpoint, then damages one stored byte and shows verification
//! pinpointing it. The output uses ANSI escape codes for colored,
//! storytelling-style terminal rendering.
//!
//! Run with:
//!   cargo run --example demo --release

use std::time::Instant;

use ztb_protocol::config::HEADER_SIZE;
use ztb_protocol::{ChainEngine, GenesisRom, MemoryStore, VerifyReport, VerifyScope};

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

const BG_BLUE: &str = "\x1b[44m";

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn banner() {
    println!();
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}    ZTB  --  ZOSCII Tamperproof Blocks Walkthrough                  {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}    64 KiB genesis ROM  |  rolling ROMs  |  mod-7 checksums         {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!();
}

fn section(num: u32, title: &str) {
    println!();
    println!(
        "{BOLD}{CYAN}===[{YELLOW} Step {num} {CYAN}]=============================================================={RESET}"
    );
    println!("{BOLD}{WHITE}  {title}{RESET}");
    println!(
        "{CYAN}------------------------------------------------------------------------{RESET}"
    );
}

fn subsection(text: &str) {
    println!("{DIM}{CYAN}  >> {text}{RESET}");
}

fn success(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

fn alarm(text: &str) {
    println!("{RED}{BOLD}  [!!] {text}{RESET}");
}

fn info(label: &str, value: &str) {
    println!("{WHITE}  {BOLD}{label}:{RESET} {YELLOW}{value}{RESET}");
}

fn timing(label: &str, elapsed: std::time::Duration) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    println!("{DIM}{MAGENTA}  [{label}: {ms:.2} ms]{RESET}");
}

fn report_rows(report: &VerifyReport) {
    for chain in &report.chains {
        let color = if chain.is_clean() { GREEN } else { RED };
        println!(
            "  {color}{BOLD}{:<10}{RESET} {DIM}{:?}{RESET}  {WHITE}{}/{} blocks pass{RESET}",
            chain.chain_id,
            chain.role,
            chain.passed(),
            chain.total()
        );
    }
    for (chain_id, verdict) in report.failures() {
        if let Some(failure) = &verdict.failure {
            println!(
                "  {RED}  {chain_id}[{}] {:?}{RESET} {DIM}{}{RESET}",
                verdict.index, failure.kind, failure.message
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let demo_start = Instant::now();

    banner();

    // -----------------------------------------------------------------------
    // Step 1: Genesis
    // -----------------------------------------------------------------------

    section(1, "Genesis ROM");
    subsection("Filling 65,536 bytes until every byte value appears at least once...");

    let t = Instant::now();
    let genesis = GenesisRom::create();
    timing("genesis", t.elapsed());

    let entropy = genesis.entropy();
    info("Fingerprint", &genesis.fingerprint()[..16]);
    info(
        "Occurrences",
        &format!(
            "min {} / max {} (expected {:.0})",
            entropy.min_occurrences, entropy.max_occurrences, entropy.expected_per_value
        ),
    );
    info("Rating", &format!("{:?}", entropy.rating));
    success("Every byte value is addressable");

    let engine = ChainEngine::new(genesis, MemoryStore::new());

    // -----------------------------------------------------------------------
    // Step 2: Trunk
    // -----------------------------------------------------------------------

    section(2, "Growing the trunk");
    subsection("Each block is encoded against a ROM built from the blocks before it...");

    let entries: [&[u8]; 4] = [
        b"Hi",
        b"invoice #1042 settled",
        b"invoice #1043 issued",
        b"quarter closed",
    ];
    let t = Instant::now();
    for entry in entries {
        let record = engine.add_block("ledger", entry).expect("append");
        println!(
            "  {DIM}{}{RESET}  {WHITE}{} payload bytes -> {} on disk{RESET}",
            record.file_name,
            entry.len(),
            record.ciphertext_len
        );
    }
    timing("4 appends", t.elapsed());

    let first = engine.fetch("ledger", 0).expect("fetch");
    info(
        "Block 0 payload",
        &String::from_utf8_lossy(&first.payload),
    );
    success("Header is 129 bytes, payload padded to 1024, every byte stored as a 2-byte address");
    assert_eq!(HEADER_SIZE, 129);

    // -----------------------------------------------------------------------
    // Step 3: Branch
    // -----------------------------------------------------------------------

    section(3, "Branching");
    subsection("A branch's first block records the trunk tip it grew from...");

    let branch = engine
        .add_branch("ledger", "audit", b"external audit opened")
        .expect("branch");
    engine
        .add_block("audit", b"sampled 40 invoices")
        .expect("branch append");
    info("Branch root", &branch.file_name);
    info("Anchored to", &branch.header.trunk_id);
    info("Predecessor", &branch.header.prev_block_id);
    success("Branch rolls its own history; the anchor ties it to the trunk");

    // -----------------------------------------------------------------------
    // Step 4: Checkpoint
    // -----------------------------------------------------------------------

    section(4, "Checkpoint");
    subsection("A checkpoint is encoded under genesis alone, so history before it can be archived...");

    let checkpoint = engine.add_checkpoint("ledger").expect("checkpoint");
    engine
        .add_block("ledger", b"new quarter opened")
        .expect("append after checkpoint");
    info("Checkpoint", &checkpoint.file_name);
    success("Blocks after the checkpoint no longer depend on the blocks before it");

    // -----------------------------------------------------------------------
    // Step 5: Verification
    // -----------------------------------------------------------------------

    section(5, "Verifying everything");

    let t = Instant::now();
    let report = engine
        .verify("ledger", VerifyScope::Everything)
        .expect("verify");
    timing("verify", t.elapsed());
    report_rows(&report);
    assert!(report.is_clean());
    success(&format!("{} blocks across {} chains verify clean", report.total(), report.chains.len()));

    // -----------------------------------------------------------------------
    // Step 6: Tampering
    // -----------------------------------------------------------------------

    section(6, "Tampering with one stored byte");
    subsection("Redirecting a single padding address in ledger block 0 to a different ROM byte...");

    let target = engine.blocks("ledger").expect("list")[0].to_string();
    let rom = engine.genesis().as_bytes().to_vec();
    let raw_pos = 600;
    let tampered = engine.store().tamper(&target, |bytes| {
        let lo = bytes[2 * raw_pos];
        let hi = bytes[2 * raw_pos + 1];
        let old = rom[u16::from_le_bytes([lo, hi]) as usize] as i32;
        // A delta that is a multiple of 7 would slip past the checksum.
        if let Some(candidate) = (1..=255u8).map(|x| lo ^ x).find(|&c| {
            let new = rom[u16::from_le_bytes([c, hi]) as usize] as i32;
            (new - old).rem_euclid(7) != 0
        }) {
            bytes[2 * raw_pos] = candidate;
        }
    });
    assert!(tampered);
    info("Damaged file", &target);

    let report = engine
        .verify("ledger", VerifyScope::Everything)
        .expect("verify");
    report_rows(&report);
    if report.is_clean() {
        success("No damage detected");
    } else {
        alarm(&format!(
            "{} of {} blocks failed verification",
            report.failed(),
            report.total()
        ));
    }

    // -----------------------------------------------------------------------
    // Summary
    // -----------------------------------------------------------------------

    println!();
    println!(
        "{BOLD}{CYAN}========================================================================{RESET}"
    );
    timing("total demo", demo_start.elapsed());
    println!();
}
