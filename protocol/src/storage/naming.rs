//! Block file naming: `<chain_id>_<index>_<block_id>.ztb`.
//!
//! The file name is the only place a block's chain, position and identity
//! are stored in the clear. Verification relies on it as a channel that is
//! independent from the encoded header.
//!
//! Parsing works from the right: the block id and the index never contain
//! `_`, so whatever is left of them is the chain id, underscores included.

use std::fmt;

use crate::chain::block::is_guid_text;
use crate::config::{BLOCK_FILE_EXTENSION, INDEX_WIDTH};
use crate::error::{ZtbError, ZtbResult};

/// A parsed block file name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockFileName {
    pub chain_id: String,
    pub index: u32,
    pub block_id: String,
}

impl BlockFileName {
    pub fn new(chain_id: impl Into<String>, index: u32, block_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            index,
            block_id: block_id.into(),
        }
    }

    /// Parse a file name. Returns `None` for anything that does not follow
    /// the convention, so unrelated files in the directory are skipped.
    pub fn parse(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(BLOCK_FILE_EXTENSION)?.strip_suffix('.')?;
        let (rest, block_id) = stem.rsplit_once('_')?;
        let (chain_id, index) = rest.rsplit_once('_')?;

        if !is_guid_text(block_id) || validate_chain_id(chain_id).is_err() {
            return None;
        }
        if index.len() < INDEX_WIDTH || !index.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        Some(Self {
            chain_id: chain_id.to_string(),
            index: index.parse().ok()?,
            block_id: block_id.to_string(),
        })
    }
}

impl fmt::Display for BlockFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{:0width$}_{}.{}",
            self.chain_id,
            self.index,
            self.block_id,
            BLOCK_FILE_EXTENSION,
            width = INDEX_WIDTH
        )
    }
}

/// Chain ids become file name components: non-empty, `[A-Za-z0-9_-]` only.
pub fn validate_chain_id(chain_id: &str) -> ZtbResult<()> {
    let ok = !chain_id.is_empty()
        && chain_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if ok {
        Ok(())
    } else {
        Err(ZtbError::InvalidChainId(chain_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "0f8e7d6c-5b4a-4938-8271-605f4e3d2c1b";

    #[test]
    fn formats_with_padded_index() {
        let name = BlockFileName::new("trunk", 7, ID);
        assert_eq!(name.to_string(), format!("trunk_0007_{ID}.ztb"));
    }

    #[test]
    fn wide_indices_are_not_truncated() {
        let name = BlockFileName::new("t", 123_456, ID);
        assert_eq!(name.to_string(), format!("t_123456_{ID}.ztb"));
        assert_eq!(BlockFileName::parse(&name.to_string()), Some(name));
    }

    #[test]
    fn parse_inverts_format() {
        let name = BlockFileName::new("ledger-2026", 42, ID);
        assert_eq!(BlockFileName::parse(&name.to_string()), Some(name));
    }

    #[test]
    fn chain_ids_may_contain_underscores() {
        let parsed = BlockFileName::parse(&format!("my_audit_log_0003_{ID}.ztb")).unwrap();
        assert_eq!(parsed.chain_id, "my_audit_log");
        assert_eq!(parsed.index, 3);
        assert_eq!(parsed.block_id, ID);
    }

    #[test]
    fn foreign_files_are_ignored() {
        for name in [
            "genesis.rom",
            "notes.txt",
            &format!("trunk_0001_{ID}.tmp"),
            &format!("trunk_1_{ID}.ztb"),
            &format!("trunk_00x1_{ID}.ztb"),
            "trunk_0001_not-a-guid.ztb",
            &format!("_0001_{ID}.ztb"),
            &format!(".trunk_0001_{ID}.ztb"),
        ] {
            assert_eq!(BlockFileName::parse(name), None, "{name}");
        }
    }

    #[test]
    fn chain_id_validation() {
        assert!(validate_chain_id("trunk").is_ok());
        assert!(validate_chain_id("a_b-C9").is_ok());
        assert!(matches!(
            validate_chain_id("").unwrap_err(),
            ZtbError::InvalidChainId(_)
        ));
        assert!(validate_chain_id("../etc").is_err());
        assert!(validate_chain_id("with space").is_err());
        assert!(validate_chain_id("dot.ted").is_err());
    }
}
