//! # ZOSCII Codec
//!
//! The substitution codec every block goes through. Encoding replaces each
//! byte with the address of a randomly chosen ROM cell holding that same
//! byte; decoding looks the addresses back up. The ciphertext is therefore
//! meaningless without the exact ROM it was produced against, and the chain
//! engine exploits that by deriving a different ROM for every position.
//!
//! ```text
//! raw byte b ──► pick a with rom[a] == b ──► a as LE u16 (2 bytes)
//! LE u16 a   ──► rom[a]                  ──► raw byte
//! ```
//!
//! ## Modules
//!
//! - **genesis** — the operator-supplied root ROM, its creation and entropy report.
//! - **rolling** — derivation of per-position ROMs from chain history.

pub mod genesis;
pub mod rolling;

pub use genesis::{EntropyReport, GenesisRom};
pub use rolling::RollingRomBuilder;

use rand::Rng;

use crate::config::{ADDRESS_WIDTH, BYTE_ALPHABET, ROM_SIZE};
use crate::error::{ZtbError, ZtbResult};

// ---------------------------------------------------------------------------
// Rom
// ---------------------------------------------------------------------------

/// A reference buffer of exactly [`ROM_SIZE`] bytes.
///
/// The length invariant is checked once at construction, so the codec never
/// has to ask again.
#[derive(Clone, PartialEq, Eq)]
pub struct Rom(Box<[u8]>);

impl Rom {
    /// Wrap a buffer, rejecting anything that is not exactly 64 KiB.
    pub fn from_vec(bytes: Vec<u8>) -> ZtbResult<Self> {
        if bytes.len() != ROM_SIZE {
            return Err(ZtbError::Configuration(format!(
                "ROM must be exactly {} bytes, got {}",
                ROM_SIZE,
                bytes.len()
            )));
        }
        Ok(Self(bytes.into_boxed_slice()))
    }

    /// Copying variant of [`Rom::from_vec`].
    pub fn from_slice(bytes: &[u8]) -> ZtbResult<Self> {
        Self::from_vec(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Byte values that never occur in this ROM. Any of them makes encoding
    /// fail when it shows up in a raw block.
    pub fn missing_byte_values(&self) -> Vec<u8> {
        let counts = byte_histogram(&self.0);
        (0..BYTE_ALPHABET)
            .filter(|&b| counts[b] == 0)
            .map(|b| b as u8)
            .collect()
    }

    /// True when all 256 byte values occur at least once.
    pub fn has_full_coverage(&self) -> bool {
        byte_histogram(&self.0).iter().all(|&c| c > 0)
    }
}

impl AsRef<[u8]> for Rom {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Rom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Rom({} bytes)", self.0.len())
    }
}

/// Occurrence count of each byte value.
pub(crate) fn byte_histogram(bytes: &[u8]) -> [u32; BYTE_ALPHABET] {
    let mut counts = [0u32; BYTE_ALPHABET];
    for &b in bytes {
        counts[b as usize] += 1;
    }
    counts
}

// ---------------------------------------------------------------------------
// Address Table
// ---------------------------------------------------------------------------

/// Reverse index of a ROM: for every byte value, every address holding it.
struct AddressTable {
    positions: Vec<Vec<u16>>,
}

impl AddressTable {
    fn new(rom: &Rom) -> Self {
        let mut positions = vec![Vec::new(); BYTE_ALPHABET];
        for (addr, &b) in rom.as_bytes().iter().enumerate() {
            // ROM_SIZE == 1 << 16, so every address fits.
            positions[b as usize].push(addr as u16);
        }
        Self { positions }
    }

    fn candidates(&self, byte: u8) -> &[u16] {
        &self.positions[byte as usize]
    }
}

// ---------------------------------------------------------------------------
// Encode / Decode
// ---------------------------------------------------------------------------

/// Encode `raw` against `rom` using the thread-local RNG.
///
/// Two encodes of the same input are not expected to match; only the
/// decoded result is stable.
pub fn encode(raw: &[u8], rom: &Rom) -> ZtbResult<Vec<u16>> {
    encode_with_rng(raw, rom, &mut rand::thread_rng())
}

/// Encode with a caller-supplied RNG. Tests seed this for reproducibility.
///
/// Fails with [`ZtbError::Encoding`] on the first byte value the ROM lacks;
/// no partial output is ever returned.
pub fn encode_with_rng<R: Rng + ?Sized>(raw: &[u8], rom: &Rom, rng: &mut R) -> ZtbResult<Vec<u16>> {
    let table = AddressTable::new(rom);
    let mut addresses = Vec::with_capacity(raw.len());

    for &byte in raw {
        let candidates = table.candidates(byte);
        if candidates.is_empty() {
            return Err(ZtbError::Encoding { byte });
        }
        addresses.push(candidates[rng.gen_range(0..candidates.len())]);
    }

    Ok(addresses)
}

/// Look every address up in `rom`.
pub fn decode(addresses: &[u16], rom: &Rom) -> ZtbResult<Vec<u8>> {
    let bytes = rom.as_bytes();
    addresses
        .iter()
        .map(|&addr| {
            bytes.get(addr as usize).copied().ok_or_else(|| {
                ZtbError::Decoding(format!("address {} out of bounds ({})", addr, bytes.len()))
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Wire Form
// ---------------------------------------------------------------------------

/// Serialize addresses as little-endian `u16`s: exactly 2x the raw length.
pub fn to_wire(addresses: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(addresses.len() * ADDRESS_WIDTH);
    for addr in addresses {
        out.extend_from_slice(&addr.to_le_bytes());
    }
    out
}

/// Parse little-endian `u16` addresses. An odd byte count cannot be valid.
pub fn from_wire(bytes: &[u8]) -> ZtbResult<Vec<u16>> {
    if bytes.len() % ADDRESS_WIDTH != 0 {
        return Err(ZtbError::Decoding(format!(
            "ciphertext length {} is not a multiple of {}",
            bytes.len(),
            ADDRESS_WIDTH
        )));
    }
    Ok(bytes
        .chunks_exact(ADDRESS_WIDTH)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// [`encode`] followed by [`to_wire`].
pub fn encode_block(raw: &[u8], rom: &Rom) -> ZtbResult<Vec<u8>> {
    encode(raw, rom).map(|addrs| to_wire(&addrs))
}

/// [`from_wire`] followed by [`decode`].
pub fn decode_block(ciphertext: &[u8], rom: &Rom) -> ZtbResult<Vec<u8>> {
    decode(&from_wire(ciphertext)?, rom)
}
