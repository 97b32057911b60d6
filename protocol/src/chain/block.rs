//! # Block Structure
//!
//! A block is one immutable, checksummed unit of chain history. Before the
//! codec touches it, a block is a *raw block*: a fixed 129-byte header
//! followed by the padded payload. The whole raw block, header included,
//! is then ZOSCII-encoded, so nothing about a block is readable without the
//! rolling ROM of its position.
//!
//! ## Raw Block Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  BlockHeader (129 bytes)                    │
//! │  ├── block_id       [37]  GUID text + NUL   │
//! │  ├── prev_block_id  [37]  GUID or NULL      │
//! │  ├── trunk_id       [37]  GUID or NULL      │
//! │  ├── payload_len    u32 LE                  │
//! │  ├── padded_len     u32 LE                  │
//! │  ├── checksum       u8    (sum mod 7)       │
//! │  ├── timestamp      u64 LE (unix seconds)   │
//! │  └── kind           u8    0 trunk / 1 branch│
//! │                           / 2 checkpoint    │
//! ├─────────────────────────────────────────────┤
//! │  payload ‖ 0xAB filler   (padded_len bytes) │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Checksum
//!
//! The checksum is the sum of every raw block byte **except the checksum
//! byte itself**, modulo 7. Excluding the field is what lets the writer and
//! the verifier compute the same value; including it would make the sum
//! depend on its own result.

use serde::{Deserialize, Serialize};

use crate::config::{
    CHECKSUM_MODULUS, GUID_LEN, GUID_TEXT_LEN, HEADER_SIZE, MIN_PAYLOAD_SIZE, NULL_BLOCK_ID,
    OFFSET_BLOCK_ID, OFFSET_CHECKSUM, OFFSET_KIND, OFFSET_PADDED_LEN, OFFSET_PAYLOAD_LEN,
    OFFSET_PREV_BLOCK_ID, OFFSET_TIMESTAMP, OFFSET_TRUNK_ID, PAD_BYTE, PAYLOAD_ALIGNMENT,
};
use crate::error::{ZtbError, ZtbResult};

// ---------------------------------------------------------------------------
// BlockKind
// ---------------------------------------------------------------------------

/// What role a block plays in its chain. Persisted in the header's last byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    /// Ordinary block: any block of a trunk, or a branch block after index 0.
    Trunk,
    /// Index 0 of a branch, anchored to a trunk block via `trunk_id`.
    Branch,
    /// Archival boundary. Encoded against the genesis ROM and cuts the
    /// history that later rolling ROMs sample.
    Checkpoint,
}

impl BlockKind {
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Trunk => 0,
            Self::Branch => 1,
            Self::Checkpoint => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Trunk),
            1 => Some(Self::Branch),
            2 => Some(Self::Checkpoint),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// BlockHeader
// ---------------------------------------------------------------------------

/// The fixed-width header at the front of every raw block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// This block's GUID. Also the last component of its file name.
    pub block_id: String,
    /// GUID of the previous block in the same chain, or [`NULL_BLOCK_ID`].
    pub prev_block_id: String,
    /// For a branch root, the trunk block it anchors to; otherwise NULL.
    pub trunk_id: String,
    /// Length of the caller's payload before padding.
    pub payload_len: u32,
    /// Length of the payload area after padding.
    pub padded_len: u32,
    /// Mod-7 byte sum of the raw block, checksum byte excluded.
    pub checksum: u8,
    /// Unix seconds at creation.
    pub timestamp: u64,
    pub kind: BlockKind,
}

impl BlockHeader {
    /// True exactly for a branch root (the `is_branch` flag of the format).
    pub fn is_branch(&self) -> bool {
        self.kind == BlockKind::Branch
    }

    pub fn is_checkpoint(&self) -> bool {
        self.kind == BlockKind::Checkpoint
    }

    /// True when `prev_block_id` is the NULL sentinel.
    pub fn has_no_predecessor(&self) -> bool {
        self.prev_block_id == NULL_BLOCK_ID
    }

    /// True when `trunk_id` is the NULL sentinel.
    pub fn has_no_anchor(&self) -> bool {
        self.trunk_id == NULL_BLOCK_ID
    }

    /// Serialize to exactly [`HEADER_SIZE`] bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        write_guid(&mut out[OFFSET_BLOCK_ID..OFFSET_PREV_BLOCK_ID], &self.block_id);
        write_guid(&mut out[OFFSET_PREV_BLOCK_ID..OFFSET_TRUNK_ID], &self.prev_block_id);
        write_guid(&mut out[OFFSET_TRUNK_ID..OFFSET_PAYLOAD_LEN], &self.trunk_id);
        out[OFFSET_PAYLOAD_LEN..OFFSET_PADDED_LEN].copy_from_slice(&self.payload_len.to_le_bytes());
        out[OFFSET_PADDED_LEN..OFFSET_CHECKSUM].copy_from_slice(&self.padded_len.to_le_bytes());
        out[OFFSET_CHECKSUM] = self.checksum;
        out[OFFSET_TIMESTAMP..OFFSET_KIND].copy_from_slice(&self.timestamp.to_le_bytes());
        out[OFFSET_KIND] = self.kind.as_byte();
        out
    }

    /// Parse a header. The buffer must be exactly [`HEADER_SIZE`] bytes.
    ///
    /// Fields that cannot be represented at all (non-UTF-8 GUIDs, unknown
    /// kind byte) are reported as corruption here; semantic consistency is
    /// checked separately by [`BlockHeader::validate_layout`].
    pub fn from_bytes(bytes: &[u8]) -> ZtbResult<Self> {
        if bytes.len() != HEADER_SIZE {
            return Err(ZtbError::Corruption(format!(
                "header must be {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let kind_byte = bytes[OFFSET_KIND];
        let kind = BlockKind::from_byte(kind_byte)
            .ok_or_else(|| ZtbError::Corruption(format!("unknown block kind {}", kind_byte)))?;

        Ok(Self {
            block_id: read_guid(&bytes[OFFSET_BLOCK_ID..OFFSET_PREV_BLOCK_ID], "block_id")?,
            prev_block_id: read_guid(
                &bytes[OFFSET_PREV_BLOCK_ID..OFFSET_TRUNK_ID],
                "prev_block_id",
            )?,
            trunk_id: read_guid(&bytes[OFFSET_TRUNK_ID..OFFSET_PAYLOAD_LEN], "trunk_id")?,
            payload_len: read_u32(&bytes[OFFSET_PAYLOAD_LEN..OFFSET_PADDED_LEN]),
            padded_len: read_u32(&bytes[OFFSET_PADDED_LEN..OFFSET_CHECKSUM]),
            checksum: bytes[OFFSET_CHECKSUM],
            timestamp: read_u64(&bytes[OFFSET_TIMESTAMP..OFFSET_KIND]),
            kind,
        })
    }

    /// Internal consistency of the header on its own: GUID shape and the
    /// padding law relating `payload_len` to `padded_len`.
    pub fn validate_layout(&self) -> ZtbResult<()> {
        for (name, value) in [
            ("block_id", &self.block_id),
            ("prev_block_id", &self.prev_block_id),
            ("trunk_id", &self.trunk_id),
        ] {
            if !is_guid_text(value) {
                return Err(ZtbError::Corruption(format!(
                    "{} is not a GUID: {:?}",
                    name, value
                )));
            }
        }

        let expected = padded_len_for(self.payload_len as usize);
        if self.padded_len as usize != expected {
            return Err(ZtbError::Corruption(format!(
                "padded_len {} inconsistent with payload_len {} (expected {})",
                self.padded_len, self.payload_len, expected
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Padding
// ---------------------------------------------------------------------------

/// Smallest multiple of 1024 that is at least `max(len, 512)`.
pub fn padded_len_for(len: usize) -> usize {
    let target = len.max(MIN_PAYLOAD_SIZE);
    target.div_ceil(PAYLOAD_ALIGNMENT) * PAYLOAD_ALIGNMENT
}

/// Append [`PAD_BYTE`] until the payload reaches [`padded_len_for`].
pub fn pad(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(padded_len_for(payload.len()));
    out.extend_from_slice(payload);
    out.resize(padded_len_for(payload.len()), PAD_BYTE);
    out
}

// ---------------------------------------------------------------------------
// Checksum
// ---------------------------------------------------------------------------

/// Checksum over a header and padded payload, skipping the checksum byte.
pub fn compute_checksum(header: &[u8; HEADER_SIZE], padded_payload: &[u8]) -> u8 {
    let header_sum: u64 = header
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != OFFSET_CHECKSUM)
        .map(|(_, &b)| b as u64)
        .sum();
    let payload_sum: u64 = padded_payload.iter().map(|&b| b as u64).sum();
    ((header_sum + payload_sum) % CHECKSUM_MODULUS as u64) as u8
}

/// Checksum over a complete raw block (header followed by padded payload).
///
/// Callers must pass at least [`HEADER_SIZE`] bytes.
pub fn raw_block_checksum(raw: &[u8]) -> u8 {
    let sum: u64 = raw
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != OFFSET_CHECKSUM)
        .map(|(_, &b)| b as u64)
        .sum();
    (sum % CHECKSUM_MODULUS as u64) as u8
}

// ---------------------------------------------------------------------------
// Raw Block Assembly
// ---------------------------------------------------------------------------

/// Fields of a header before padding and checksumming are applied.
#[derive(Clone, Debug)]
pub struct HeaderDraft {
    pub block_id: String,
    pub prev_block_id: String,
    pub trunk_id: String,
    pub timestamp: u64,
    pub kind: BlockKind,
}

/// Pad `payload`, fill in lengths and checksum, and return the final header
/// together with the raw block bytes (`header ‖ padded payload`).
pub fn assemble_raw_block(draft: HeaderDraft, payload: &[u8]) -> ZtbResult<(BlockHeader, Vec<u8>)> {
    let payload_len = u32::try_from(payload.len()).map_err(|_| {
        ZtbError::Configuration(format!("payload of {} bytes exceeds u32", payload.len()))
    })?;
    let padded = pad(payload);
    let padded_len = u32::try_from(padded.len()).map_err(|_| {
        ZtbError::Configuration(format!("padded payload of {} bytes exceeds u32", padded.len()))
    })?;

    let mut header = BlockHeader {
        block_id: draft.block_id,
        prev_block_id: draft.prev_block_id,
        trunk_id: draft.trunk_id,
        payload_len,
        padded_len,
        checksum: 0,
        timestamp: draft.timestamp,
        kind: draft.kind,
    };
    header.checksum = compute_checksum(&header.to_bytes(), &padded);

    let mut raw = Vec::with_capacity(HEADER_SIZE + padded.len());
    raw.extend_from_slice(&header.to_bytes());
    raw.extend_from_slice(&padded);
    Ok((header, raw))
}

/// Parse and check a decoded raw block, returning the header and the
/// original (unpadded) payload.
///
/// Checks, in order: header parse, length (`HEADER_SIZE + padded_len`),
/// header layout, checksum.
pub fn open_raw_block(raw: &[u8]) -> ZtbResult<(BlockHeader, Vec<u8>)> {
    if raw.len() < HEADER_SIZE {
        return Err(ZtbError::Corruption(format!(
            "decoded block of {} bytes is shorter than the {}-byte header",
            raw.len(),
            HEADER_SIZE
        )));
    }
    let header = BlockHeader::from_bytes(&raw[..HEADER_SIZE])?;

    let expected_len = HEADER_SIZE + header.padded_len as usize;
    if raw.len() != expected_len {
        return Err(ZtbError::Corruption(format!(
            "decoded block is {} bytes, header implies {}",
            raw.len(),
            expected_len
        )));
    }
    header.validate_layout()?;

    let computed = raw_block_checksum(raw);
    if computed != header.checksum {
        return Err(ZtbError::Checksum {
            stored: header.checksum,
            computed,
        });
    }

    let payload_end = HEADER_SIZE + header.payload_len as usize;
    let payload = raw[HEADER_SIZE..payload_end].to_vec();
    Ok((header, payload))
}

// ---------------------------------------------------------------------------
// Field Helpers
// ---------------------------------------------------------------------------

fn write_guid(field: &mut [u8], guid: &str) {
    // The field is pre-zeroed, which provides the NUL padding. Text longer
    // than GUID_LEN - 1 is truncated so a terminator always remains.
    let bytes = guid.as_bytes();
    let n = bytes.len().min(GUID_LEN - 1);
    field[..n].copy_from_slice(&bytes[..n]);
}

fn read_guid(field: &[u8], name: &str) -> ZtbResult<String> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end])
        .map(str::to_owned)
        .map_err(|_| ZtbError::Corruption(format!("{} is not valid UTF-8", name)))
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Hyphenated 8-4-4-4-12 hex text, either case.
pub fn is_guid_text(s: &str) -> bool {
    s.len() == GUID_TEXT_LEN
        && s.char_indices().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID_A: &str = "3f2b8c1e-9d4a-4c6b-8e2f-1a2b3c4d5e6f";
    const ID_B: &str = "a1b2c3d4-e5f6-4789-9abc-def012345678";

    fn draft(kind: BlockKind) -> HeaderDraft {
        HeaderDraft {
            block_id: ID_A.to_string(),
            prev_block_id: NULL_BLOCK_ID.to_string(),
            trunk_id: NULL_BLOCK_ID.to_string(),
            timestamp: 1_760_000_000,
            kind,
        }
    }

    #[test]
    fn padding_law_examples() {
        assert_eq!(padded_len_for(0), 1024);
        assert_eq!(padded_len_for(2), 1024);
        assert_eq!(padded_len_for(512), 1024);
        assert_eq!(padded_len_for(1024), 1024);
        assert_eq!(padded_len_for(1025), 2048);
        assert_eq!(padded_len_for(5000), 5120);
    }

    #[test]
    fn padding_law_holds_across_lengths() {
        for len in 0..4200usize {
            let padded = padded_len_for(len);
            assert_eq!(padded % PAYLOAD_ALIGNMENT, 0);
            assert!(padded >= len.max(MIN_PAYLOAD_SIZE));
            assert!(padded - len < PAYLOAD_ALIGNMENT + MIN_PAYLOAD_SIZE);
            assert!(padded - PAYLOAD_ALIGNMENT < len.max(MIN_PAYLOAD_SIZE));
        }
    }

    #[test]
    fn pad_appends_filler() {
        let padded = pad(b"Hi");
        assert_eq!(padded.len(), 1024);
        assert_eq!(&padded[..2], b"Hi");
        assert!(padded[2..].iter().all(|&b| b == PAD_BYTE));
    }

    #[test]
    fn header_bytes_round_trip() {
        let header = BlockHeader {
            block_id: ID_A.to_string(),
            prev_block_id: ID_B.to_string(),
            trunk_id: NULL_BLOCK_ID.to_string(),
            payload_len: 2,
            padded_len: 1024,
            checksum: 5,
            timestamp: u64::MAX - 1,
            kind: BlockKind::Checkpoint,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(bytes[OFFSET_BLOCK_ID + 36], 0, "GUID must be NUL terminated");
        assert_eq!(BlockHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn from_bytes_rejects_wrong_length() {
        let err = BlockHeader::from_bytes(&[0u8; HEADER_SIZE - 1]).unwrap_err();
        assert!(matches!(err, ZtbError::Corruption(_)));
        let err = BlockHeader::from_bytes(&[0u8; HEADER_SIZE + 1]).unwrap_err();
        assert!(matches!(err, ZtbError::Corruption(_)));
    }

    #[test]
    fn from_bytes_rejects_unknown_kind() {
        let (header, _) = assemble_raw_block(draft(BlockKind::Trunk), b"x").unwrap();
        let mut bytes = header.to_bytes();
        bytes[OFFSET_KIND] = 9;
        assert!(matches!(
            BlockHeader::from_bytes(&bytes).unwrap_err(),
            ZtbError::Corruption(_)
        ));
    }

    #[test]
    fn scenario_hi_block_is_1153_bytes() {
        let (header, raw) = assemble_raw_block(draft(BlockKind::Trunk), b"Hi").unwrap();
        assert_eq!(header.payload_len, 2);
        assert_eq!(header.padded_len, 1024);
        assert_eq!(raw.len(), 1153);
        assert!(header.checksum < 7);
    }

    #[test]
    fn checksum_excludes_its_own_field() {
        let (header, raw) = assemble_raw_block(draft(BlockKind::Trunk), b"payload").unwrap();
        assert_eq!(raw_block_checksum(&raw), header.checksum);

        // Rewriting the checksum byte does not change what it must equal.
        let mut altered = raw.clone();
        altered[OFFSET_CHECKSUM] = altered[OFFSET_CHECKSUM].wrapping_add(3);
        assert_eq!(raw_block_checksum(&altered), header.checksum);
    }

    #[test]
    fn open_returns_original_payload() {
        let payload = vec![0x5Au8; 1500];
        let (header, raw) = assemble_raw_block(draft(BlockKind::Branch), &payload).unwrap();
        let (opened, out) = open_raw_block(&raw).unwrap();
        assert_eq!(opened, header);
        assert!(opened.is_branch());
        assert_eq!(out, payload);
    }

    #[test]
    fn open_detects_length_mismatch() {
        let (_, mut raw) = assemble_raw_block(draft(BlockKind::Trunk), b"abc").unwrap();
        raw.truncate(raw.len() - 1);
        assert!(matches!(open_raw_block(&raw).unwrap_err(), ZtbError::Corruption(_)));
    }

    #[test]
    fn open_detects_checksum_mismatch() {
        let (_, mut raw) = assemble_raw_block(draft(BlockKind::Trunk), b"abc").unwrap();
        // +1 on one payload byte moves the sum by 1, never a multiple of 7.
        raw[HEADER_SIZE] = raw[HEADER_SIZE].wrapping_add(1);
        assert!(matches!(
            open_raw_block(&raw).unwrap_err(),
            ZtbError::Checksum { .. }
        ));
    }

    #[test]
    fn open_detects_inconsistent_padding() {
        let (header, raw) = assemble_raw_block(draft(BlockKind::Trunk), b"abc").unwrap();
        let mut bad = header.clone();
        bad.payload_len = 2000;
        let mut bytes = bad.to_bytes().to_vec();
        bytes.extend_from_slice(&raw[HEADER_SIZE..]);
        assert!(matches!(open_raw_block(&bytes).unwrap_err(), ZtbError::Corruption(_)));
    }

    #[test]
    fn guid_text_shape() {
        assert!(is_guid_text(ID_A));
        assert!(is_guid_text(NULL_BLOCK_ID));
        assert!(is_guid_text(&ID_A.to_uppercase()));
        assert!(!is_guid_text("not-a-guid"));
        assert!(!is_guid_text("3f2b8c1e_9d4a-4c6b-8e2f-1a2b3c4d5e6f"));
    }

    #[test]
    fn kind_byte_mapping() {
        for kind in [BlockKind::Trunk, BlockKind::Branch, BlockKind::Checkpoint] {
            assert_eq!(BlockKind::from_byte(kind.as_byte()), Some(kind));
        }
        assert_eq!(BlockKind::from_byte(3), None);
    }
}
