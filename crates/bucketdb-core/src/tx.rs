//! Transactions: `ReadTx` (snapshot) and `WriteTx` (buffered, single writer).
//!
//! A read transaction pins the tree as it was when it began. A write
//! transaction works on a private copy-on-write clone and records every
//! mutation; commit appends the whole record to the WAL as one entry and
//! then publishes the new tree. Dropping a `WriteTx` without committing
//! discards its changes.

use std::sync::Arc;

use parking_lot::MutexGuard;

use crate::bucket::Bucket;
use crate::cursor::Cursor;
use crate::error::{StoreError, StoreResult};
use crate::format::Operation;
use crate::store::Store;
use crate::wal::WalWriter;

pub(crate) fn owned_path<P: AsRef<str>>(path: &[P]) -> Vec<String> {
    path.iter().map(|p| p.as_ref().to_string()).collect()
}

/// Read access shared by both transaction kinds.
pub trait Tx {
    /// Root of the tree this transaction sees.
    fn root(&self) -> &Bucket;

    /// Open a bucket by path. Fails if any segment is missing.
    fn bucket<P: AsRef<str>>(&self, path: &[P]) -> StoreResult<&Bucket> {
        if path.is_empty() {
            return Err(StoreError::EmptyPath);
        }
        self.root()
            .resolve(path)
            .ok_or_else(|| StoreError::BucketNotFound { path: owned_path(path) })
    }

    /// Read one entry.
    fn get<P: AsRef<str>>(&self, path: &[P], key: &[u8]) -> StoreResult<Option<&[u8]>> {
        Ok(self.bucket(path)?.get(key))
    }

    /// Ordered cursor over a bucket.
    fn cursor<P: AsRef<str>>(&self, path: &[P]) -> StoreResult<Cursor<'_>> {
        Ok(self.bucket(path)?.cursor())
    }

    /// True if every segment of `path` exists.
    fn bucket_exists<P: AsRef<str>>(&self, path: &[P]) -> bool {
        !path.is_empty() && self.root().resolve(path).is_some()
    }
}

// ---------------------------------------------------------------------------
// Read-only transaction
// ---------------------------------------------------------------------------

/// Read-only transaction: an immutable snapshot of the store.
///
/// Holds no lock, so any number of readers run alongside each other and
/// alongside the single writer.
pub struct ReadTx {
    root: Arc<Bucket>,
}

impl ReadTx {
    pub(crate) fn new(root: Arc<Bucket>) -> Self {
        Self { root }
    }
}

impl Tx for ReadTx {
    fn root(&self) -> &Bucket {
        &self.root
    }
}

impl std::fmt::Debug for ReadTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadTx")
            .field("buckets", &self.root.bucket_names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Read-write transaction
// ---------------------------------------------------------------------------

/// Read-write transaction. Only one exists per store at a time: it owns the
/// WAL writer lock from `begin_write` until commit, rollback or drop.
pub struct WriteTx<'s> {
    store: &'s Store,
    wal: MutexGuard<'s, WalWriter>,
    root: Bucket,
    ops: Vec<Operation>,
}

impl<'s> WriteTx<'s> {
    pub(crate) fn new(store: &'s Store, wal: MutexGuard<'s, WalWriter>, root: Bucket) -> Self {
        Self { store, wal, root, ops: Vec::new() }
    }

    fn bucket_mut<P: AsRef<str>>(&mut self, path: &[P]) -> StoreResult<&mut Bucket> {
        if path.is_empty() {
            return Err(StoreError::EmptyPath);
        }
        self.root
            .resolve_mut(path)
            .ok_or_else(|| StoreError::BucketNotFound { path: owned_path(path) })
    }

    fn check_sizes(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let config = self.store.config();
        if key.len() > config.max_key_size {
            return Err(StoreError::OversizedEntry {
                entry_size: key.len() as u64,
                max_size: config.max_key_size as u64,
                component: "key".to_string(),
            });
        }
        if value.len() > config.max_value_size {
            return Err(StoreError::OversizedEntry {
                entry_size: value.len() as u64,
                max_size: config.max_value_size as u64,
                component: "value".to_string(),
            });
        }
        Ok(())
    }

    /// Insert or overwrite an entry.
    pub fn put<P: AsRef<str>>(&mut self, path: &[P], key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.check_sizes(key, value)?;
        self.bucket_mut(path)?.put(key.to_vec(), value.to_vec());
        self.ops.push(Operation::Put {
            path: owned_path(path),
            key: key.to_vec(),
            value: value.to_vec(),
        });
        Ok(())
    }

    /// Delete an entry. Returns whether it existed.
    pub fn delete<P: AsRef<str>>(&mut self, path: &[P], key: &[u8]) -> StoreResult<bool> {
        let existed = self.bucket_mut(path)?.delete(key);
        if existed {
            self.ops.push(Operation::Delete { path: owned_path(path), key: key.to_vec() });
        }
        Ok(existed)
    }

    /// Create the last segment of `path` inside the bucket named by the rest.
    /// The parent must exist and the new name must be free.
    pub fn create_bucket<P: AsRef<str>>(&mut self, path: &[P]) -> StoreResult<()> {
        let path = owned_path(path);
        let max = self.store.config().max_key_size;
        if let Some(name) = path.last().filter(|name| name.len() > max) {
            return Err(StoreError::OversizedEntry {
                entry_size: name.len() as u64,
                max_size: max as u64,
                component: "bucket name".to_string(),
            });
        }
        let op = Operation::CreateBucket { path };
        self.root.apply(&op)?;
        self.ops.push(op);
        Ok(())
    }

    /// Like `create_bucket`, but an existing bucket is not an error.
    /// Returns true if the bucket was created.
    pub fn create_bucket_if_missing<P: AsRef<str>>(&mut self, path: &[P]) -> StoreResult<bool> {
        if self.bucket_exists(path) {
            return Ok(false);
        }
        self.create_bucket(path)?;
        Ok(true)
    }

    /// Increment and return the bucket's sequence counter.
    pub fn next_sequence<P: AsRef<str>>(&mut self, path: &[P]) -> StoreResult<u64> {
        let bucket = self.bucket_mut(path)?;
        let value = bucket.sequence() + 1;
        bucket.set_sequence(value);
        self.ops.push(Operation::SetSequence { path: owned_path(path), value });
        Ok(value)
    }

    /// Number of mutations recorded so far.
    pub fn pending(&self) -> usize {
        self.ops.len()
    }

    /// Log the batch, then publish the new tree. On error nothing is
    /// published and the transaction is gone: the caller starts over.
    pub fn commit(mut self) -> StoreResult<()> {
        let ops = std::mem::take(&mut self.ops);
        if ops.is_empty() {
            return Ok(());
        }

        self.wal.append_batch(&ops, self.store.config().sync_on_commit)?;

        let root = std::mem::take(&mut self.root);
        self.store.publish(root);
        tracing::debug!(ops = ops.len(), "Committed write transaction");
        Ok(())
    }

    /// Discard every change made in this transaction.
    pub fn rollback(mut self) {
        let discarded = std::mem::take(&mut self.ops).len();
        tracing::debug!(ops = discarded, "Rolled back write transaction");
    }
}

impl Tx for WriteTx<'_> {
    fn root(&self) -> &Bucket {
        &self.root
    }
}

impl Drop for WriteTx<'_> {
    fn drop(&mut self) {
        if !self.ops.is_empty() {
            tracing::debug!(ops = self.ops.len(), "Write transaction dropped without commit");
        }
    }
}

impl std::fmt::Debug for WriteTx<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTx")
            .field("pending", &self.ops.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn test_store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), Config::relaxed()).unwrap();
        (store, dir)
    }

    #[test]
    fn test_read_sees_only_committed() {
        let (store, _dir) = test_store();
        let mut tx = store.begin_write();
        tx.create_bucket(&["b"]).unwrap();
        tx.put(&["b"], b"k", b"v").unwrap();

        // Uncommitted: invisible to readers
        assert!(!store.begin_read().bucket_exists(&["b"]));
        // Visible inside the writer itself
        assert_eq!(tx.get(&["b"], b"k").unwrap(), Some(&b"v"[..]));

        tx.commit().unwrap();
        assert_eq!(store.begin_read().get(&["b"], b"k").unwrap(), Some(&b"v"[..]));
    }

    #[test]
    fn test_rollback_discards() {
        let (store, _dir) = test_store();
        let mut tx = store.begin_write();
        tx.create_bucket(&["b"]).unwrap();
        tx.rollback();

        assert!(!store.begin_read().bucket_exists(&["b"]));
    }

    #[test]
    fn test_drop_discards() {
        let (store, _dir) = test_store();
        {
            let mut tx = store.begin_write();
            tx.create_bucket(&["b"]).unwrap();
        }
        assert!(!store.begin_read().bucket_exists(&["b"]));
    }

    #[test]
    fn test_put_into_missing_bucket() {
        let (store, _dir) = test_store();
        let mut tx = store.begin_write();
        let err = tx.put(&["missing"], b"k", b"v").unwrap_err();
        assert!(matches!(err, StoreError::BucketNotFound { .. }));
        assert_eq!(tx.pending(), 0);
    }

    #[test]
    fn test_empty_path_rejected() {
        let (store, _dir) = test_store();
        let tx = store.begin_read();
        let empty: [&str; 0] = [];
        assert!(matches!(tx.bucket(&empty), Err(StoreError::EmptyPath)));
    }

    #[test]
    fn test_delete_reports_existence() {
        let (store, _dir) = test_store();
        let mut tx = store.begin_write();
        tx.create_bucket(&["b"]).unwrap();
        tx.put(&["b"], b"k", b"v").unwrap();
        assert!(tx.delete(&["b"], b"k").unwrap());
        assert!(!tx.delete(&["b"], b"k").unwrap());
    }

    #[test]
    fn test_oversized_value_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::relaxed();
        config.max_value_size = 8;
        let store = Store::open(dir.path(), config).unwrap();

        let mut tx = store.begin_write();
        tx.create_bucket(&["b"]).unwrap();
        let err = tx.put(&["b"], b"k", b"way too long").unwrap_err();
        assert!(matches!(err, StoreError::OversizedEntry { component, .. } if component == "value"));
    }

    #[test]
    fn test_sequence_rolls_back_with_tx() {
        let (store, _dir) = test_store();
        let mut tx = store.begin_write();
        tx.create_bucket(&["b"]).unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin_write();
        assert_eq!(tx.next_sequence(&["b"]).unwrap(), 1);
        assert_eq!(tx.next_sequence(&["b"]).unwrap(), 2);
        tx.rollback();

        let mut tx = store.begin_write();
        assert_eq!(tx.next_sequence(&["b"]).unwrap(), 1);
        tx.commit().unwrap();
        assert_eq!(store.begin_read().bucket(&["b"]).unwrap().sequence(), 1);
    }

    #[test]
    fn test_create_if_missing() {
        let (store, _dir) = test_store();
        let mut tx = store.begin_write();
        assert!(tx.create_bucket_if_missing(&["b"]).unwrap());
        assert!(!tx.create_bucket_if_missing(&["b"]).unwrap());
        assert!(matches!(tx.create_bucket(&["b"]), Err(StoreError::BucketExists { .. })));
    }
}
