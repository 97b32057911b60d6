//! # Rolling ROM Construction
//!
//! Each block is encoded against a ROM derived from the chain history that
//! precedes it. Samples are taken from the **persisted ciphertext** of prior
//! blocks, not their plaintext: decoding a prior block would itself need
//! that block's rolling ROM, so sampling plaintext turns ROM derivation into
//! a recursive decode of the whole chain. Sampling ciphertext keeps every
//! ROM reproducible from the files alone, at the cost of the ROM no longer
//! reflecting the "real" payload history.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────┬──────────┬─────┬──────────┬──────────────────────────────┐
//! │ prior -1 │ prior -2 │ ... │ prior -n │ genesis[0 .. 65536 - n*1024] │
//! │  1 KiB   │  1 KiB   │     │  1 KiB   │                              │
//! └──────────┴──────────┴─────┴──────────┴──────────────────────────────┘
//!   most recent first, n <= 64
//! ```
//!
//! The builder is a pure function of its inputs. Choosing *which* blocks
//! are prior (index < k, checkpoint truncation) is the engine's job.

use tracing::debug;

use super::Rom;
use crate::config::{MAX_HISTORY_SAMPLES, ROM_SIZE, SAMPLE_SIZE};
use crate::error::ZtbResult;

/// Derives rolling ROMs from a genesis ROM and prior block ciphertexts.
#[derive(Debug, Clone, Copy)]
pub struct RollingRomBuilder {
    history_cap: usize,
}

impl Default for RollingRomBuilder {
    fn default() -> Self {
        Self {
            history_cap: MAX_HISTORY_SAMPLES,
        }
    }
}

impl RollingRomBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of prior blocks that contribute a sample.
    pub fn history_cap(&self) -> usize {
        self.history_cap
    }

    /// Build the ROM for one chain position.
    ///
    /// `genesis` must be exactly 64 KiB (a configuration error otherwise).
    /// `prior` lists the ciphertexts of the blocks that precede the
    /// position, **most recent first**. Each contributes its first 1 KiB
    /// (or all of it, if shorter) until 64 samples or 64 KiB are collected;
    /// the rest is filled with genesis bytes from offset 0.
    pub fn build<B: AsRef<[u8]>>(&self, genesis: &[u8], prior: &[B]) -> ZtbResult<Rom> {
        // Validate genesis before doing any work.
        let genesis = Rom::from_slice(genesis)?;
        Ok(self.build_from(&genesis, prior))
    }

    /// Same as [`RollingRomBuilder::build`] for an already-validated genesis ROM.
    pub fn build_from<B: AsRef<[u8]>>(&self, genesis: &Rom, prior: &[B]) -> Rom {
        let mut rom = Vec::with_capacity(ROM_SIZE);
        let mut samples = 0usize;

        for block in prior.iter().take(self.history_cap) {
            let remaining = ROM_SIZE - rom.len();
            if remaining == 0 {
                break;
            }
            let block = block.as_ref();
            let take = block.len().min(SAMPLE_SIZE).min(remaining);
            rom.extend_from_slice(&block[..take]);
            samples += 1;
        }

        let history_bytes = rom.len();
        let fill = ROM_SIZE - history_bytes;
        rom.extend_from_slice(&genesis.as_bytes()[..fill]);

        debug!(samples, history_bytes, genesis_bytes = fill, "rolling ROM built");

        // Exactly ROM_SIZE bytes by construction.
        Rom(rom.into_boxed_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ZtbError;

    fn genesis_bytes() -> Vec<u8> {
        (0..ROM_SIZE).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn empty_history_is_pure_genesis() {
        let genesis = genesis_bytes();
        let rom = RollingRomBuilder::new().build::<Vec<u8>>(&genesis, &[]).unwrap();
        assert_eq!(rom.as_bytes(), &genesis[..]);
    }

    #[test]
    fn samples_come_first_most_recent_first() {
        let genesis = genesis_bytes();
        let newest = vec![0xEEu8; 3000];
        let older = vec![0x11u8; 3000];
        let rom = RollingRomBuilder::new()
            .build(&genesis, &[newest, older])
            .unwrap();
        let bytes = rom.as_bytes();

        assert!(bytes[..SAMPLE_SIZE].iter().all(|&b| b == 0xEE));
        assert!(bytes[SAMPLE_SIZE..2 * SAMPLE_SIZE].iter().all(|&b| b == 0x11));
        assert_eq!(&bytes[2 * SAMPLE_SIZE..], &genesis[..ROM_SIZE - 2 * SAMPLE_SIZE]);
    }

    #[test]
    fn history_is_capped_at_64_samples() {
        let genesis = genesis_bytes();
        let prior: Vec<Vec<u8>> = (0..100u8).map(|i| vec![i; SAMPLE_SIZE * 2]).collect();
        let builder = RollingRomBuilder::new();
        assert_eq!(builder.history_cap(), 64);
        let rom = builder.build(&genesis, &prior).unwrap();
        let bytes = rom.as_bytes();

        assert_eq!(bytes.len(), ROM_SIZE);
        // The 64th sample is the last one; nothing from genesis remains.
        assert!(bytes[63 * SAMPLE_SIZE..].iter().all(|&b| b == 63));
    }

    #[test]
    fn short_samples_are_taken_whole() {
        let genesis = genesis_bytes();
        let rom = RollingRomBuilder::new()
            .build(&genesis, &[vec![0xAAu8; 10]])
            .unwrap();
        let bytes = rom.as_bytes();
        assert!(bytes[..10].iter().all(|&b| b == 0xAA));
        assert_eq!(&bytes[10..], &genesis[..ROM_SIZE - 10]);
    }

    #[test]
    fn output_is_always_rom_sized() {
        let genesis = genesis_bytes();
        for depth in [0usize, 1, 5, 63, 64, 65, 200] {
            let prior: Vec<Vec<u8>> = (0..depth).map(|_| vec![1u8; 2306]).collect();
            let rom = RollingRomBuilder::new().build(&genesis, &prior).unwrap();
            assert_eq!(rom.as_bytes().len(), ROM_SIZE, "depth {depth}");
        }
    }

    #[test]
    fn build_is_deterministic() {
        let genesis = genesis_bytes();
        let prior = vec![vec![5u8; 2306], vec![9u8; 2306]];
        let a = RollingRomBuilder::new().build(&genesis, &prior).unwrap();
        let b = RollingRomBuilder::new().build(&genesis, &prior).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn wrong_genesis_size_is_configuration_error() {
        let err = RollingRomBuilder::new()
            .build::<Vec<u8>>(&[0u8; 10], &[])
            .unwrap_err();
        assert!(matches!(err, ZtbError::Configuration(_)));
    }
}
