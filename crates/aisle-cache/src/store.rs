//! # Partition Store
//!
//! Disk-backed, memory-indexed storage for cached responses.
//!
//! ## Design
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          CacheStore                                     │
//! │                                                                         │
//! │   in memory                         on disk                             │
//! │   ─────────                         ───────                             │
//! │   static    {url → CacheEntry} ◄──► static-<tag>/<sha256>.json|.bin    │
//! │   dynamic   {url → CacheEntry} ◄──► dynamic-<tag>/<sha256>.json|.bin   │
//! │   fallback  {url → CacheEntry} ◄──► offline-fallback-<tag>/...         │
//! │                                                                         │
//! │   put: insert in memory, then write through to disk.                   │
//! │        A failed disk write is logged; the entry still serves from      │
//! │        memory for this process lifetime.                               │
//! │   open: loads every readable entry of the current build tag.           │
//! │   activate: deletes partition directories of any other build tag.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use crate::entry::{entry_file_stem, CacheEntry, PartitionKind};
use crate::error::CacheResult;

// =============================================================================
// Partition
// =============================================================================

/// One partition: a directory plus its in-memory index.
#[derive(Debug)]
struct Partition {
    dir: PathBuf,
    entries: HashMap<String, CacheEntry>,
}

impl Partition {
    async fn open(dir: PathBuf) -> CacheResult<Self> {
        fs::create_dir_all(&dir).await?;
        let entries = load_entries(&dir).await?;
        Ok(Partition { dir, entries })
    }
}

// =============================================================================
// Cache Store
// =============================================================================

/// The three partitions of the active build generation.
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    build_tag: String,
    static_assets: Partition,
    dynamic: Partition,
    offline_fallback: Partition,
}

impl CacheStore {
    /// Opens (creating if needed) the partitions for `build_tag` under
    /// `root`, loading any entries a previous run persisted.
    pub async fn open(root: &Path, build_tag: &str) -> CacheResult<Self> {
        fs::create_dir_all(root).await?;
        let static_assets =
            Partition::open(root.join(PartitionKind::Static.dir_name(build_tag))).await?;
        let dynamic =
            Partition::open(root.join(PartitionKind::Dynamic.dir_name(build_tag))).await?;
        let offline_fallback =
            Partition::open(root.join(PartitionKind::OfflineFallback.dir_name(build_tag))).await?;

        let store = CacheStore {
            root: root.to_path_buf(),
            build_tag: build_tag.to_string(),
            static_assets,
            dynamic,
            offline_fallback,
        };
        debug!(
            build_tag = %store.build_tag,
            static_entries = store.len(PartitionKind::Static),
            dynamic_entries = store.len(PartitionKind::Dynamic),
            "cache store opened"
        );
        Ok(store)
    }

    /// The build tag this store serves.
    pub fn build_tag(&self) -> &str {
        &self.build_tag
    }

    fn partition(&self, kind: PartitionKind) -> &Partition {
        match kind {
            PartitionKind::Static => &self.static_assets,
            PartitionKind::Dynamic => &self.dynamic,
            PartitionKind::OfflineFallback => &self.offline_fallback,
        }
    }

    fn partition_mut(&mut self, kind: PartitionKind) -> &mut Partition {
        match kind {
            PartitionKind::Static => &mut self.static_assets,
            PartitionKind::Dynamic => &mut self.dynamic,
            PartitionKind::OfflineFallback => &mut self.offline_fallback,
        }
    }

    /// Looks up an entry by its normalized URL.
    pub fn get(&self, kind: PartitionKind, url: &str) -> Option<&CacheEntry> {
        self.partition(kind).entries.get(url)
    }

    /// Number of entries in a partition.
    pub fn len(&self, kind: PartitionKind) -> usize {
        self.partition(kind).entries.len()
    }

    /// Inserts an entry, writing through to disk.
    ///
    /// Never fails: a disk write error is logged and the entry still serves
    /// from memory, which keeps a full disk from taking responses away.
    pub async fn put(&mut self, kind: PartitionKind, entry: CacheEntry) {
        let stem = entry_file_stem(&entry.url);
        let partition = self.partition_mut(kind);
        let meta_path = partition.dir.join(format!("{}.json", stem));
        let body_path = partition.dir.join(format!("{}.bin", stem));

        match serde_json::to_string(&entry) {
            Ok(meta) => {
                if let Err(err) = fs::write(&body_path, &entry.body).await {
                    warn!(url = %entry.url, error = %err, "cache body write failed");
                } else if let Err(err) = fs::write(&meta_path, meta).await {
                    warn!(url = %entry.url, error = %err, "cache metadata write failed");
                }
            }
            Err(err) => {
                warn!(url = %entry.url, error = %err, "cache entry encode failed");
            }
        }

        partition.entries.insert(entry.url.clone(), entry);
    }

    /// Removes an entry and its files. Returns whether it existed.
    pub async fn remove(&mut self, kind: PartitionKind, url: &str) -> bool {
        let partition = self.partition_mut(kind);
        if partition.entries.remove(url).is_none() {
            return false;
        }
        let stem = entry_file_stem(url);
        let _ = fs::remove_file(partition.dir.join(format!("{}.json", stem))).await;
        let _ = fs::remove_file(partition.dir.join(format!("{}.bin", stem))).await;
        true
    }

    /// Deletes every partition directory under the root whose build tag is
    /// not this store's. Directories that are not cache partitions are left
    /// alone. Returns the names of the removed directories.
    pub async fn activate(&mut self) -> CacheResult<Vec<String>> {
        let mut removed = Vec::new();
        let mut dir_entries = fs::read_dir(&self.root).await?;
        while let Some(dirent) = dir_entries.next_entry().await? {
            if !dirent.file_type().await?.is_dir() {
                continue;
            }
            let name = dirent.file_name().to_string_lossy().into_owned();
            match PartitionKind::parse_dir_name(&name) {
                Some((_, tag)) if tag == self.build_tag => {}
                Some((_, tag)) => {
                    fs::remove_dir_all(dirent.path()).await?;
                    info!(partition = %name, stale_tag = %tag, "removed stale cache partition");
                    removed.push(name);
                }
                None => {}
            }
        }
        Ok(removed)
    }
}

// =============================================================================
// Disk Loading
// =============================================================================

async fn load_entries(dir: &Path) -> CacheResult<HashMap<String, CacheEntry>> {
    let mut entries = HashMap::new();
    let mut dir_entries = fs::read_dir(dir).await?;
    while let Some(dirent) = dir_entries.next_entry().await? {
        let path = dirent.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match load_entry(&path).await {
            Ok(entry) => {
                entries.insert(entry.url.clone(), entry);
            }
            Err(err) => {
                // One unreadable entry should not take down the partition.
                warn!(path = %path.display(), error = %err, "skipping unreadable cache entry");
            }
        }
    }
    Ok(entries)
}

async fn load_entry(meta_path: &Path) -> CacheResult<CacheEntry> {
    let meta = fs::read_to_string(meta_path).await?;
    let mut entry: CacheEntry = serde_json::from_str(&meta)?;
    entry.body = fs::read(meta_path.with_extension("bin")).await?;
    Ok(entry)
}

// =============================================================================
// Unit Tests
// =============================================================================
