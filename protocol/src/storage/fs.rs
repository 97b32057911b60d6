//! Filesystem-backed block store.
//!
//! All chains share one flat directory. A block is published by writing a
//! dot-prefixed temporary file and hard-linking it into place: the link
//! fails if the final name already exists, so a block can never be
//! overwritten, and readers never observe a half-written file. Temporary
//! files do not match the naming convention and are ignored by listings.
//!
//! Writers of one chain serialize on `.<chain>.lock`, an advisory file lock
//! that every process opening the directory honours. The lock file is
//! created on first use and never removed.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use tracing::debug;

use super::{sort_entries, BlockEntry, BlockFileName, BlockStore, ChainLockGuard};
use crate::error::{ZtbError, ZtbResult};

/// A directory of `.ztb` block files.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open<P: AsRef<Path>>(root: P) -> ZtbResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Full path of a block file.
    pub fn path_of(&self, entry: &BlockEntry) -> PathBuf {
        self.root.join(entry.to_string())
    }

    /// Path of the writer lock file of `chain_id`.
    pub fn lock_path(&self, chain_id: &str) -> PathBuf {
        self.root.join(format!(".{}.lock", chain_id))
    }

    /// Every parseable block file in the directory.
    fn scan(&self) -> ZtbResult<Vec<BlockEntry>> {
        let mut entries = Vec::new();
        for dirent in fs::read_dir(&self.root)? {
            let dirent = dirent?;
            if !dirent.file_type()?.is_file() {
                continue;
            }
            let name = dirent.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(entry) = BlockFileName::parse(name) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

impl BlockStore for FsStore {
    fn list_chain(&self, chain_id: &str) -> ZtbResult<Vec<BlockEntry>> {
        let mut entries: Vec<BlockEntry> = self
            .scan()?
            .into_iter()
            .filter(|e| e.chain_id == chain_id)
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    fn list_all(&self) -> ZtbResult<Vec<BlockEntry>> {
        let mut entries = self.scan()?;
        sort_entries(&mut entries);
        Ok(entries)
    }

    fn read_block(&self, entry: &BlockEntry) -> ZtbResult<Vec<u8>> {
        match fs::read(self.path_of(entry)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ZtbError::BlockNotFound {
                chain_id: entry.chain_id.clone(),
                index: entry.index,
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn write_block(&self, entry: &BlockEntry, ciphertext: &[u8]) -> ZtbResult<()> {
        let final_path = self.path_of(entry);
        let tmp_path = self.root.join(format!(
            ".{}.{}.tmp",
            entry,
            uuid::Uuid::new_v4().simple()
        ));

        let written = (|| -> io::Result<()> {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp_path)?;
            file.write_all(ciphertext)?;
            file.sync_all()?;
            fs::hard_link(&tmp_path, &final_path)
        })();
        // The temporary name is never needed past this point.
        let _ = fs::remove_file(&tmp_path);

        match written {
            Ok(()) => {
                debug!(file = %entry, bytes = ciphertext.len(), "block file published");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(ZtbError::AmbiguousState(
                format!("block file {} already exists", entry),
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn lock_chain(&self, chain_id: &str) -> ZtbResult<ChainLockGuard> {
        let path = self.lock_path(chain_id);
        let file = fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        FileExt::lock_exclusive(&file)?;
        debug!(chain_id, lock = %path.display(), "chain writer lock acquired");
        Ok(ChainLockGuard::with_file(chain_id, file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID_A: &str = "11111111-2222-4333-8444-555555555555";
    const ID_B: &str = "66666666-7777-4888-9999-aaaaaaaaaaaa";

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let entry = BlockFileName::new("trunk", 0, ID_A);

        store.write_block(&entry, b"cipher").unwrap();
        assert_eq!(store.read_block(&entry).unwrap(), b"cipher");
        assert!(dir.path().join(entry.to_string()).is_file());
    }

    #[test]
    fn refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let entry = BlockFileName::new("trunk", 0, ID_A);

        store.write_block(&entry, b"first").unwrap();
        let err = store.write_block(&entry, b"second").unwrap_err();
        assert!(matches!(err, ZtbError::AmbiguousState(_)));
        assert_eq!(store.read_block(&entry).unwrap(), b"first");
    }

    #[test]
    fn no_temporary_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let entry = BlockFileName::new("trunk", 0, ID_A);
        store.write_block(&entry, b"x").unwrap();
        let _ = store.write_block(&entry, b"y");

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|d| d.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![entry.to_string()]);
    }

    #[test]
    fn listing_is_sorted_keeps_duplicates_and_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();

        store.write_block(&BlockFileName::new("trunk", 1, ID_B), b"b").unwrap();
        store.write_block(&BlockFileName::new("trunk", 0, ID_A), b"a").unwrap();
        store.write_block(&BlockFileName::new("trunk", 1, ID_A), b"c").unwrap();
        store.write_block(&BlockFileName::new("side", 0, ID_B), b"d").unwrap();
        fs::write(dir.path().join("genesis.rom"), b"rom").unwrap();

        let listed = store.list_chain("trunk").unwrap();
        let shape: Vec<(u32, &str)> = listed.iter().map(|e| (e.index, e.block_id.as_str())).collect();
        assert_eq!(shape, vec![(0, ID_A), (1, ID_A), (1, ID_B)]);

        let ids: Vec<String> = store.chain_ids().unwrap().into_iter().collect();
        assert_eq!(ids, vec!["side".to_string(), "trunk".to_string()]);
        assert!(store.list_chain("missing").unwrap().is_empty());

        let listed_all = store.list_all().unwrap();
        let all: Vec<(&str, u32)> =
            listed_all.iter().map(|e| (e.chain_id.as_str(), e.index)).collect();
        assert_eq!(all, vec![("side", 0), ("trunk", 0), ("trunk", 1), ("trunk", 1)]);
    }

    #[test]
    fn vanished_file_reads_as_block_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let entry = BlockFileName::new("trunk", 3, ID_A);
        store.write_block(&entry, b"x").unwrap();
        fs::remove_file(store.path_of(&entry)).unwrap();

        match store.read_block(&entry).unwrap_err() {
            ZtbError::BlockNotFound { chain_id, index } => {
                assert_eq!(chain_id, "trunk");
                assert_eq!(index, 3);
            }
            other => panic!("expected BlockNotFound, got {other:?}"),
        }
    }

    #[test]
    fn lock_file_is_not_a_block() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let guard = store.lock_chain("trunk").unwrap();
        assert_eq!(guard.chain_id(), "trunk");
        assert!(store.lock_path("trunk").is_file());
        drop(guard);

        assert!(store.list_all().unwrap().is_empty());
        assert!(store.chain_ids().unwrap().is_empty());
    }

    #[test]
    fn chain_lock_excludes_other_handles_on_the_directory() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::{Arc, Barrier};
        use std::thread;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let holder = FsStore::open(dir.path()).unwrap();
        let waiter = FsStore::open(dir.path()).unwrap();
        let released = Arc::new(AtomicBool::new(false));
        let locked = Arc::new(Barrier::new(2));

        let handle = {
            let released = Arc::clone(&released);
            let locked = Arc::clone(&locked);
            thread::spawn(move || {
                let guard = holder.lock_chain("trunk").unwrap();
                locked.wait();
                thread::sleep(Duration::from_millis(100));
                released.store(true, Ordering::SeqCst);
                drop(guard);
            })
        };

        locked.wait();
        let _guard = waiter.lock_chain("trunk").unwrap();
        assert!(released.load(Ordering::SeqCst));
        handle.join().unwrap();

        // Other chains are never blocked.
        let other = FsStore::open(dir.path()).unwrap();
        other.lock_chain("side").unwrap();
    }
}
