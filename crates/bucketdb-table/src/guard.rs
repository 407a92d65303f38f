//! Concurrency guard for tables used from several threads.
//!
//! A plain `Table` is single-owner: every mutating method takes `&mut self`,
//! so no lock is needed. `SharedTable` puts one readers-writer lock around a
//! `Table` and hands out RAII guards: dropping the guard ends the read or
//! write. Locking blocks with no timeout.

use std::sync::Arc;

use bucketdb_core::WriteTx;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::TableResult;
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sharing {
    NotShared,
    Shared,
}

/// A `Table` behind a readers-writer lock. Clones share the same table.
#[derive(Clone)]
pub struct SharedTable {
    inner: Arc<RwLock<Table>>,
}

impl SharedTable {
    pub fn new(table: Table) -> Self {
        Self { inner: Arc::new(RwLock::new(table)) }
    }

    /// Shared access until the guard is dropped.
    pub fn start_read(&self) -> RwLockReadGuard<'_, Table> {
        self.inner.read()
    }

    /// Exclusive access until the guard is dropped.
    pub fn start_write(&self) -> RwLockWriteGuard<'_, Table> {
        self.inner.write()
    }

    pub fn sharing(&self) -> Sharing {
        Sharing::Shared
    }

    pub fn load(&self) -> TableResult<usize> {
        self.start_write().load()
    }

    pub fn load_one(&self, key: &str) -> TableResult<usize> {
        self.start_write().load_one(key)
    }

    pub fn load_some<K: AsRef<str>>(&self, keys: &[K]) -> TableResult<usize> {
        self.start_write().load_some(keys)
    }

    pub fn load_range(&self, start: &str, end: &str) -> TableResult<usize> {
        self.start_write().load_range(start, end)
    }

    pub fn load_prefix(&self, prefix: &str) -> TableResult<usize> {
        self.start_write().load_prefix(prefix)
    }

    pub fn create_order_by<S: AsRef<str>>(&self, name: &str, specs: &[S]) -> TableResult<usize> {
        self.start_write().create_order_by(name, specs)
    }

    pub fn save(&self, tx: &mut WriteTx<'_>) -> TableResult<usize> {
        self.start_write().save(tx)
    }

    // Key drawing waits on the store's writer lock, and `save` is called
    // while holding it, so the table lock must not be held across the draw.

    pub fn next_key(&self) -> TableResult<String> {
        let (store, path, sequencer) = {
            let table = self.start_read();
            (Arc::clone(table.store()), table.path().to_vec(), table.sequencer())
        };
        sequencer.next_key(&store, &path)
    }

    pub fn next_keys(&self, count: usize) -> TableResult<Vec<String>> {
        let (store, path, sequencer) = {
            let table = self.start_read();
            (Arc::clone(table.store()), table.path().to_vec(), table.sequencer())
        };
        sequencer.next_keys(&store, &path, count)
    }

    /// Unwrap the table if this is the last handle.
    pub fn try_into_inner(self) -> Result<Table, SharedTable> {
        Arc::try_unwrap(self.inner)
            .map(RwLock::into_inner)
            .map_err(|inner| SharedTable { inner })
    }
}

impl std::fmt::Debug for SharedTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_read() {
            Some(table) => f.debug_tuple("SharedTable").field(&*table).finish(),
            None => f.write_str("SharedTable(<locked>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, Schema};
    use bucketdb_core::{Config, Store};
    use std::time::Duration;
    use tempfile::TempDir;

    fn shared() -> (SharedTable, Arc<Store>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path(), Config::relaxed()).unwrap());
        store.create_bucket_path(&["parts"]).unwrap();
        let schema = Schema::new().field("name", FieldType::String);
        let table = Table::new(Arc::clone(&store), schema, &["parts"]).unwrap();
        (table.into_shared(), store, dir)
    }

    #[test]
    fn test_sharing_reported() {
        let (table, _store, _dir) = shared();
        assert_eq!(table.sharing(), Sharing::Shared);
        // The guarded value reports its own mode, not the wrapper's
        assert_eq!(table.start_read().sharing(), Sharing::NotShared);
    }

    #[test]
    fn test_readers_run_together() {
        let (table, _store, _dir) = shared();
        let r1 = table.start_read();
        let r2 = table.start_read();
        assert!(r1.is_empty() && r2.is_empty());
    }

    #[test]
    fn test_writer_excludes_readers() {
        let (table, _store, _dir) = shared();
        let mut w = table.start_write();

        let t = table.clone();
        let reader = std::thread::spawn(move || {
            let len = t.start_read().len();
            len
        });

        w.add_record("1");
        w.add_record("2");
        std::thread::sleep(Duration::from_millis(50));
        drop(w);

        // The reader could only get in after both adds
        assert_eq!(reader.join().unwrap(), 2);
    }

    #[test]
    fn test_next_key_while_tx_open_elsewhere() {
        let (table, store, _dir) = shared();

        let mut tx = store.begin_write();
        let t = table.clone();
        let drawer = std::thread::spawn(move || t.next_key().unwrap());

        // Saving under the table lock must not wait on the drawer
        std::thread::sleep(Duration::from_millis(20));
        table.start_write().add_record("x");
        table.save(&mut tx).unwrap();
        tx.commit().unwrap();

        assert_eq!(drawer.join().unwrap(), "00000001");
    }

    #[test]
    fn test_try_into_inner() {
        let (table, _store, _dir) = shared();
        let other = table.clone();
        let table = table.try_into_inner().unwrap_err();
        drop(other);
        assert!(table.try_into_inner().is_ok());
    }
}
