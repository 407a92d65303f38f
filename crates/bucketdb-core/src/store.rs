//! The store: a RAM-first bucket tree behind a write-ahead log.
//!
//! **Read path**: snapshot the current tree (one `Arc` clone), never touch disk
//! **Write path**: one writer at a time; WAL-append the batch, then swap the tree
//! **Open**: replay every WAL batch into an empty tree

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::bucket::Bucket;
use crate::checkpoint::{snapshot_ops, CheckpointResult};
use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::tx::{owned_path, ReadTx, Tx, WriteTx};
use crate::wal::{WalReader, WalWriter};

/// Ordered, transactional key-value store with nested buckets.
///
/// All public methods take `&self`; share it across threads with `Arc<Store>`.
/// Readers never block. `begin_write` blocks while another `WriteTx` is open,
/// so a thread must not begin a second write while it still holds one.
pub struct Store {
    /// Last committed tree; readers clone the Arc
    root: RwLock<Arc<Bucket>>,
    /// Write-ahead log; its lock is the single-writer lock
    wal: Mutex<WalWriter>,
    /// Data directory path
    path: PathBuf,
    /// Store configuration
    config: Config,
}

impl Store {
    /// Open or create a store at the given directory and replay its WAL.
    pub fn open<P: AsRef<Path>>(path: P, config: Config) -> StoreResult<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        let wal_dir = path.join("wal");

        std::fs::create_dir_all(&wal_dir).map_err(|e| StoreError::Io {
            path: Some(wal_dir.clone()),
            kind: e.kind(),
            message: format!("Failed to create WAL directory: {}", e),
        })?;

        let batches = WalReader::new(&wal_dir).recover_batches()?;
        let mut root = Bucket::default();
        let mut skipped = 0usize;
        for batch in &batches {
            for op in &batch.ops {
                if let Err(e) = root.apply(op) {
                    skipped += 1;
                    tracing::warn!(error = %e, "Skipping WAL operation that no longer applies");
                }
            }
        }

        if !batches.is_empty() {
            tracing::info!(
                path = %path.display(),
                batches = batches.len(),
                skipped,
                buckets = root.bucket_names().len(),
                "Recovered store from WAL"
            );
        }

        let wal = WalWriter::new(&wal_dir, config.wal_rotation_size_bytes)?;

        Ok(Self {
            root: RwLock::new(Arc::new(root)),
            wal: Mutex::new(wal),
            path,
            config,
        })
    }

    /// Start a read-only transaction over the last committed state.
    pub fn begin_read(&self) -> ReadTx {
        ReadTx::new(Arc::clone(&self.root.read()))
    }

    /// Start the write transaction, waiting for any open one to finish.
    pub fn begin_write(&self) -> WriteTx<'_> {
        let wal = self.wal.lock();
        let root = (**self.root.read()).clone();
        WriteTx::new(self, wal, root)
    }

    /// Run `f` against a read snapshot.
    pub fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&ReadTx) -> Result<T, E>,
    {
        f(&self.begin_read())
    }

    /// Run `f` in a write transaction; commit on `Ok`, roll back on `Err`.
    pub fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut WriteTx<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut tx = self.begin_write();
        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback();
                Err(e)
            }
        }
    }

    /// Create bucket `name` inside `parent` (empty `parent` = top level).
    /// Every parent segment must already exist.
    pub fn create_bucket<P: AsRef<str>>(&self, parent: &[P], name: &str) -> StoreResult<()> {
        let mut path = owned_path(parent);
        path.push(name.to_string());
        self.update(|tx| tx.create_bucket(&path))
    }

    /// Create every missing level of `path`. Returns how many were created.
    pub fn create_bucket_path<P: AsRef<str>>(&self, path: &[P]) -> StoreResult<usize> {
        if path.is_empty() {
            return Err(StoreError::EmptyPath);
        }
        self.update(|tx| {
            let mut created = 0;
            for depth in 1..=path.len() {
                if tx.create_bucket_if_missing(&path[..depth])? {
                    created += 1;
                }
            }
            Ok(created)
        })
    }

    /// True if every segment of `path` exists in the committed state.
    pub fn bucket_exists<P: AsRef<str>>(&self, path: &[P]) -> bool {
        self.begin_read().bucket_exists(path)
    }

    /// Rewrite the WAL as a single snapshot of the current tree and drop the
    /// history before it. Waits for the open write transaction, if any.
    pub fn checkpoint(&self) -> StoreResult<CheckpointResult> {
        let mut wal = self.wal.lock();
        let root = Arc::clone(&self.root.read());
        let (ops, mut result) = snapshot_ops(&root);
        result.removed_files = wal.rotate_with_snapshot(&ops)?;

        tracing::info!(
            path = %self.path.display(),
            buckets = result.buckets,
            entries = result.entries,
            removed_files = result.removed_files,
            "Checkpointed store"
        );
        Ok(result)
    }

    /// Data directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn publish(&self, root: Bucket) {
        *self.root.write() = Arc::new(root);
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("buckets", &self.root.read().bucket_names().len())
            .finish()
    }
}
