//! # Protocol Configuration & Constants
//!
//! Every magic number in ZTB lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong.
//!
//! These values define the on-disk format. A chain written with one set of
//! constants cannot be read back with another, so changing any of them
//! after the first block lands is a format break, not a tuning knob.

// ---------------------------------------------------------------------------
// ROM Geometry
// ---------------------------------------------------------------------------

/// Size of every ROM the codec works against: the genesis ROM and every
/// rolling ROM derived from it. 64 KiB, so every address fits in a `u16`.
pub const ROM_SIZE: usize = 65_536;

/// Number of distinct byte values a ROM must contain to encode arbitrary data.
pub const BYTE_ALPHABET: usize = 256;

/// Bytes of ciphertext each prior block contributes to a rolling ROM.
pub const SAMPLE_SIZE: usize = 1024;

/// Maximum number of prior blocks sampled into a rolling ROM.
/// 64 samples of 1 KiB fill the whole 64 KiB ROM.
pub const MAX_HISTORY_SAMPLES: usize = ROM_SIZE / SAMPLE_SIZE;

/// Width of one encoded address on the wire (little-endian `u16`).
pub const ADDRESS_WIDTH: usize = 2;

// ---------------------------------------------------------------------------
// Payload Padding
// ---------------------------------------------------------------------------

/// Payloads shorter than this are padded up before alignment.
pub const MIN_PAYLOAD_SIZE: usize = 512;

/// Padded payloads are always a multiple of this.
pub const PAYLOAD_ALIGNMENT: usize = 1024;

/// Filler byte appended by the padding step.
pub const PAD_BYTE: u8 = 0xAB;

// ---------------------------------------------------------------------------
// Block Header Layout
// ---------------------------------------------------------------------------

/// Width of a GUID field: 36 characters of hyphenated UUID text plus a NUL.
pub const GUID_LEN: usize = 37;

/// Textual length of a hyphenated UUID.
pub const GUID_TEXT_LEN: usize = 36;

/// The NULL sentinel stored where a block has no predecessor or no anchor.
pub const NULL_BLOCK_ID: &str = "00000000-0000-0000-0000-000000000000";

pub const OFFSET_BLOCK_ID: usize = 0;
pub const OFFSET_PREV_BLOCK_ID: usize = OFFSET_BLOCK_ID + GUID_LEN;
pub const OFFSET_TRUNK_ID: usize = OFFSET_PREV_BLOCK_ID + GUID_LEN;
pub const OFFSET_PAYLOAD_LEN: usize = OFFSET_TRUNK_ID + GUID_LEN;
pub const OFFSET_PADDED_LEN: usize = OFFSET_PAYLOAD_LEN + 4;
pub const OFFSET_CHECKSUM: usize = OFFSET_PADDED_LEN + 4;
pub const OFFSET_TIMESTAMP: usize = OFFSET_CHECKSUM + 1;
pub const OFFSET_KIND: usize = OFFSET_TIMESTAMP + 8;

/// Total header width: 3 GUIDs + two `u32` + `u8` + `u64` + `u8` = 129 bytes.
pub const HEADER_SIZE: usize = OFFSET_KIND + 1;

/// The integrity checksum is the byte sum of the raw block modulo this.
/// It catches accidents, not adversaries.
pub const CHECKSUM_MODULUS: u32 = 7;

// ---------------------------------------------------------------------------
// Storage Naming
// ---------------------------------------------------------------------------

/// Extension of persisted block files.
pub const BLOCK_FILE_EXTENSION: &str = "ztb";

/// Minimum digits of the zero-padded index component of a block file name.
pub const INDEX_WIDTH: usize = 4;

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

/// Marker payload carried by every checkpoint block.
pub const CHECKPOINT_PAYLOAD: &[u8] = b"CHECKPOINT_ARCHIVAL_BOUNDARY";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_129_bytes() {
        assert_eq!(OFFSET_PREV_BLOCK_ID, 37);
        assert_eq!(OFFSET_TRUNK_ID, 74);
        assert_eq!(OFFSET_PAYLOAD_LEN, 111);
        assert_eq!(OFFSET_PADDED_LEN, 115);
        assert_eq!(OFFSET_CHECKSUM, 119);
        assert_eq!(OFFSET_TIMESTAMP, 120);
        assert_eq!(OFFSET_KIND, 128);
        assert_eq!(HEADER_SIZE, 129);
    }

    #[test]
    fn history_samples_fill_exactly_one_rom() {
        assert_eq!(MAX_HISTORY_SAMPLES, 64);
        assert_eq!(MAX_HISTORY_SAMPLES * SAMPLE_SIZE, ROM_SIZE);
    }

    #[test]
    fn rom_is_fully_addressable_by_u16() {
        assert_eq!(ROM_SIZE - 1, u16::MAX as usize);
    }

    #[test]
    fn null_block_id_is_guid_shaped() {
        assert_eq!(NULL_BLOCK_ID.len(), GUID_TEXT_LEN);
        assert!(GUID_TEXT_LEN < GUID_LEN);
    }

    #[test]
    fn checkpoint_payload_fits_minimum_padding() {
        assert!(CHECKPOINT_PAYLOAD.len() < MIN_PAYLOAD_SIZE);
    }
}
