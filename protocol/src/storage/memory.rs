//! In-memory block store.
//!
//! Keyed by the same file names [`FsStore`](super::FsStore) would use, so
//! engine behaviour is identical on both backends. The raw accessors let
//! tests stage the damage a hostile operator could do to a directory:
//! flipped bytes, renamed files, duplicated indices.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::{sort_entries, BlockEntry, BlockFileName, BlockStore};
use crate::error::{ZtbError, ZtbResult};

/// A map from block file name to ciphertext.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored files, parseable or not.
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    /// Insert or replace a file by raw name, bypassing write-once.
    pub fn put_raw(&self, name: impl Into<String>, bytes: Vec<u8>) {
        self.files.write().insert(name.into(), bytes);
    }

    /// Remove a file by raw name, returning its contents.
    pub fn remove_raw(&self, name: &str) -> Option<Vec<u8>> {
        self.files.write().remove(name)
    }

    /// Mutate a stored file in place. Returns false if it does not exist.
    pub fn tamper<F: FnOnce(&mut Vec<u8>)>(&self, name: &str, f: F) -> bool {
        match self.files.write().get_mut(name) {
            Some(bytes) => {
                f(bytes);
                true
            }
            None => false,
        }
    }

    fn parsed(&self) -> Vec<BlockEntry> {
        self.files
            .read()
            .keys()
            .filter_map(|name| BlockFileName::parse(name))
            .collect()
    }
}

impl BlockStore for MemoryStore {
    fn list_chain(&self, chain_id: &str) -> ZtbResult<Vec<BlockEntry>> {
        let mut entries: Vec<BlockEntry> = self
            .parsed()
            .into_iter()
            .filter(|e| e.chain_id == chain_id)
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    fn list_all(&self) -> ZtbResult<Vec<BlockEntry>> {
        let mut entries = self.parsed();
        sort_entries(&mut entries);
        Ok(entries)
    }

    fn read_block(&self, entry: &BlockEntry) -> ZtbResult<Vec<u8>> {
        self.files
            .read()
            .get(&entry.to_string())
            .cloned()
            .ok_or_else(|| ZtbError::BlockNotFound {
                chain_id: entry.chain_id.clone(),
                index: entry.index,
            })
    }

    fn write_block(&self, entry: &BlockEntry, ciphertext: &[u8]) -> ZtbResult<()> {
        let name = entry.to_string();
        let mut files = self.files.write();
        if files.contains_key(&name) {
            return Err(ZtbError::AmbiguousState(format!(
                "block file {} already exists",
                name
            )));
        }
        files.insert(name, ciphertext.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "abcdef01-2345-4678-89ab-cdef01234567";

    #[test]
    fn write_is_once_only() {
        let store = MemoryStore::new();
        let entry = BlockFileName::new("c", 0, ID);
        store.write_block(&entry, b"one").unwrap();
        assert!(matches!(
            store.write_block(&entry, b"two").unwrap_err(),
            ZtbError::AmbiguousState(_)
        ));
        assert_eq!(store.read_block(&entry).unwrap(), b"one");
    }

    #[test]
    fn missing_block_is_not_found() {
        let store = MemoryStore::new();
        let err = store.read_block(&BlockFileName::new("c", 3, ID)).unwrap_err();
        assert!(matches!(err, ZtbError::BlockNotFound { index: 3, .. }));
    }

    #[test]
    fn tamper_and_raw_access() {
        let store = MemoryStore::new();
        let entry = BlockFileName::new("c", 0, ID);
        store.write_block(&entry, &[1, 2, 3]).unwrap();

        assert!(store.tamper(&entry.to_string(), |b| b[0] = 9));
        assert_eq!(store.read_block(&entry).unwrap(), vec![9, 2, 3]);
        assert!(!store.tamper("nope", |_| {}));

        store.put_raw("readme.txt", b"hello".to_vec());
        assert_eq!(store.len(), 2);
        assert_eq!(store.chain_ids().unwrap().len(), 1);
        assert_eq!(store.remove_raw("readme.txt"), Some(b"hello".to_vec()));
    }
}
