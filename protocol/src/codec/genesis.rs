//! # Genesis ROM
//!
//! The root of trust for every chain. 64 KiB of high-entropy bytes, created
//! once by an operator and never modified. Every rolling ROM falls back to
//! genesis bytes, block 0 of every chain is encoded against it directly, and
//! so are checkpoints. Lose it and nothing built on it can be read back.
//!
//! Creation regenerates until all 256 byte values are present; a ROM
//! missing a value cannot encode a block containing that value.

use std::fs;
use std::path::Path;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{byte_histogram, Rom};
use crate::config::{BYTE_ALPHABET, ROM_SIZE};
use crate::error::{ZtbError, ZtbResult};

/// The immutable genesis ROM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenesisRom {
    rom: Rom,
}

impl GenesisRom {
    /// Generate a fresh genesis ROM from the operating system's RNG.
    pub fn create() -> Self {
        Self::create_with_rng(&mut OsRng)
    }

    /// Generate a genesis ROM from `rng`, retrying until every byte value
    /// occurs at least once. With 64 KiB of uniform bytes the first attempt
    /// virtually always succeeds.
    pub fn create_with_rng<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let mut bytes = vec![0u8; ROM_SIZE];
            rng.fill_bytes(&mut bytes);

            if byte_histogram(&bytes).iter().all(|&c| c > 0) {
                if attempts > 1 {
                    info!(attempts, "genesis ROM reached full byte coverage after retries");
                }
                // Length is ROM_SIZE by construction.
                return Self {
                    rom: Rom(bytes.into_boxed_slice()),
                };
            }
            warn!(attempt = attempts, "generated genesis ROM missing byte values, regenerating");
        }
    }

    /// Wrap existing bytes. Wrong length is a configuration error; missing
    /// byte values are tolerated but logged, since encoding will fail only
    /// if a block actually needs one of them.
    pub fn from_bytes(bytes: Vec<u8>) -> ZtbResult<Self> {
        let rom = Rom::from_vec(bytes)?;
        let missing = rom.missing_byte_values();
        if !missing.is_empty() {
            warn!(
                missing = missing.len(),
                "genesis ROM does not contain every byte value; some payloads will not encode"
            );
        }
        Ok(Self { rom })
    }

    /// Read a genesis ROM file.
    pub fn load<P: AsRef<Path>>(path: P) -> ZtbResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        Self::from_bytes(bytes).map_err(|e| match e {
            ZtbError::Configuration(msg) => {
                ZtbError::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Write the ROM out as a raw 64 KiB file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ZtbResult<()> {
        fs::write(path, self.rom.as_bytes())?;
        Ok(())
    }

    pub fn rom(&self) -> &Rom {
        &self.rom
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.rom.as_bytes()
    }

    /// BLAKE3 digest of the ROM, hex encoded. Lets an operator confirm which
    /// root of trust a chain was built on without comparing 64 KiB files.
    pub fn fingerprint(&self) -> String {
        hex::encode(blake3::hash(self.rom.as_bytes()).as_bytes())
    }

    /// Byte-distribution statistics of this ROM.
    pub fn entropy(&self) -> EntropyReport {
        EntropyReport::analyze(self.rom.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Entropy Report
// ---------------------------------------------------------------------------

/// Qualitative rating of a ROM's byte distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntropyRating {
    Excellent,
    Good,
    Fair,
}

/// How evenly the 256 byte values are spread across a ROM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntropyReport {
    pub total_bytes: usize,
    /// Occurrences a perfectly even ROM would have per value (256).
    pub expected_per_value: f64,
    /// Fewest occurrences among the values that do occur.
    pub min_occurrences: u32,
    pub max_occurrences: u32,
    /// Number of byte values that never occur.
    pub missing_values: usize,
    /// `(max - min) / expected * 100`.
    pub spread_percent: f64,
    pub rating: EntropyRating,
}

impl EntropyReport {
    pub fn analyze(bytes: &[u8]) -> Self {
        let counts = byte_histogram(bytes);
        let present: Vec<u32> = counts.iter().copied().filter(|&c| c > 0).collect();
        let missing_values = BYTE_ALPHABET - present.len();
        let min_occurrences = present.iter().copied().min().unwrap_or(0);
        let max_occurrences = present.iter().copied().max().unwrap_or(0);

        let expected_per_value = bytes.len() as f64 / BYTE_ALPHABET as f64;
        let spread_percent = if expected_per_value > 0.0 {
            (max_occurrences as f64 - min_occurrences as f64) / expected_per_value * 100.0
        } else {
            0.0
        };

        // A ROM with holes cannot encode everything, whatever its spread.
        let rating = if missing_values > 0 {
            EntropyRating::Fair
        } else if spread_percent < 50.0 {
            EntropyRating::Excellent
        } else if spread_percent < 100.0 {
            EntropyRating::Good
        } else {
            EntropyRating::Fair
        };

        Self {
            total_bytes: bytes.len(),
            expected_per_value,
            min_occurrences,
            max_occurrences,
            missing_values,
            spread_percent,
            rating,
        }
    }

    /// True when every byte value occurs at least once.
    pub fn is_complete(&self) -> bool {
        self.missing_values == 0
    }
}
