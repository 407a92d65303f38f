//! `Table`: an in-memory record set bound to one bucket path.
//!
//! Loads replace the record set wholesale. Mutations stay in memory until
//! `save` writes them into a caller-owned `WriteTx`; committing that
//! transaction is the caller's job, which lets several tables save
//! atomically together.

use std::fmt;
use std::sync::Arc;

use bucketdb_core::{Store, Tx, WriteTx};
use hashbrown::HashMap;

use crate::codec::{self, Fields};
use crate::error::{TableError, TableResult};
use crate::guard::{SharedTable, Sharing};
use crate::order::{build_order, SortSpec, BY_KEY};
use crate::owned_path;
use crate::record::Record;
use crate::schema::Schema;
use crate::sequence::{KeySequencer, DEFAULT_KEY_WIDTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableConfig {
    /// Digits in keys from `next_key`, zero-padded (1..=20)
    pub key_width: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self { key_width: DEFAULT_KEY_WIDTH }
    }
}

pub struct Table {
    store: Arc<Store>,
    schema: Arc<Schema>,
    path: Vec<String>,
    sequencer: KeySequencer,
    records: HashMap<String, Record>,
    orderings: HashMap<String, Vec<String>>,
}

fn key_string(key: &[u8]) -> TableResult<String> {
    String::from_utf8(key.to_vec()).map_err(|_| TableError::MalformedRecord {
        key: String::from_utf8_lossy(key).into_owned(),
        reason: "key is not valid UTF-8".to_string(),
    })
}

fn decode_entry(schema: &Arc<Schema>, key: &[u8], value: &[u8]) -> TableResult<(String, Record)> {
    let key = key_string(key)?;
    let values = codec::decode_keyed(&key, value)?;
    Ok((key, Record::loaded(Arc::clone(schema), values)))
}

impl Table {
    pub fn new<P: AsRef<str>>(store: Arc<Store>, schema: Schema, path: &[P]) -> TableResult<Self> {
        Self::with_config(store, schema, path, TableConfig::default())
    }

    pub fn with_config<P: AsRef<str>>(
        store: Arc<Store>,
        schema: Schema,
        path: &[P],
        config: TableConfig,
    ) -> TableResult<Self> {
        schema.validate()?;
        if path.is_empty() {
            return Err(TableError::InvalidConfig("table path is empty".to_string()));
        }
        Ok(Self {
            store,
            schema: Arc::new(schema),
            path: owned_path(path),
            sequencer: KeySequencer::new(config.key_width)?,
            records: HashMap::new(),
            orderings: HashMap::new(),
        })
    }

    /// Wrap this table in a readers-writer lock for use from several threads.
    pub fn into_shared(self) -> SharedTable {
        SharedTable::new(self)
    }

    /// Ownership mode of this bare value. A `Table` reached through a
    /// `SharedTable` guard still reports `NotShared`; ask the `SharedTable`.
    pub fn sharing(&self) -> Sharing {
        Sharing::NotShared
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    fn replace(&mut self, records: HashMap<String, Record>, by_key: Option<Vec<String>>, how: &str) -> usize {
        let count = records.len();
        self.records = records;
        self.orderings.clear();
        if let Some(order) = by_key {
            self.orderings.insert(BY_KEY.to_string(), order);
        }
        tracing::debug!(path = %self.path.join("/"), count, how, "Loaded table");
        count
    }

    /// Walk the bucket from `start` (or the first key) while `keep` holds.
    fn scan(&mut self, start: Option<&[u8]>, keep: impl Fn(&[u8]) -> bool, how: &str) -> TableResult<usize> {
        let tx = self.store.begin_read();
        let bucket = tx.bucket(&self.path)?;
        // Only a full load knows how many rows it will keep
        let mut records = match start {
            None => HashMap::with_capacity(bucket.len()),
            Some(_) => HashMap::new(),
        };
        let mut order = Vec::new();

        let mut cursor = bucket.cursor();
        let mut entry = match start {
            Some(key) => cursor.seek(key),
            None => cursor.first(),
        };
        while let Some((key, value)) = entry {
            if !keep(key) {
                break;
            }
            let (key, record) = decode_entry(&self.schema, key, value)?;
            order.push(key.clone());
            records.insert(key, record);
            entry = cursor.next();
        }

        Ok(self.replace(records, Some(order), how))
    }

    /// Load every record. Records the `byKey` ordering.
    pub fn load(&mut self) -> TableResult<usize> {
        self.scan(None, |_| true, "full")
    }

    /// Load the records with `start <= key <= end`. Records `byKey`.
    pub fn load_range(&mut self, start: &str, end: &str) -> TableResult<usize> {
        let end = end.as_bytes();
        self.scan(Some(start.as_bytes()), |key| key <= end, "range")
    }

    /// Load the records whose key starts with `prefix`. Records `byKey`.
    pub fn load_prefix(&mut self, prefix: &str) -> TableResult<usize> {
        let prefix = prefix.as_bytes();
        self.scan(Some(prefix), |key| key.starts_with(prefix), "prefix")
    }

    /// Load a single record; 0 if the key is absent.
    pub fn load_one(&mut self, key: &str) -> TableResult<usize> {
        self.load_some(&[key])
    }

    /// Load the listed keys, skipping any that are absent.
    pub fn load_some<K: AsRef<str>>(&mut self, keys: &[K]) -> TableResult<usize> {
        let tx = self.store.begin_read();
        let bucket = tx.bucket(&self.path)?;
        let mut records = HashMap::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref();
            if let Some(value) = bucket.get(key.as_bytes()) {
                let (key, record) = decode_entry(&self.schema, key.as_bytes(), value)?;
                records.insert(key, record);
            }
        }
        Ok(self.replace(records, None, "keys"))
    }

    // ------------------------------------------------------------------
    // Saving
    // ------------------------------------------------------------------

    /// Write dirty records and delete tombstoned ones inside `tx`.
    ///
    /// Returns how many records were written or deleted. The in-memory set
    /// only changes once every write has been accepted by `tx`; on error the
    /// caller should roll `tx` back.
    pub fn save(&mut self, tx: &mut WriteTx<'_>) -> TableResult<usize> {
        let mut deletes = Vec::new();
        let mut puts = Vec::new();
        for (key, record) in &self.records {
            if record.is_deleted() {
                deletes.push(key.clone());
            } else if record.is_dirty() {
                puts.push((key.clone(), codec::encode(record.values())?));
            }
        }

        tx.bucket(&self.path)?;
        for key in &deletes {
            tx.delete(&self.path, key.as_bytes())?;
        }
        for (key, bytes) in &puts {
            tx.put(&self.path, key.as_bytes(), bytes)?;
        }

        for key in &deletes {
            self.records.remove(key);
        }
        for (key, _) in &puts {
            if let Some(record) = self.records.get_mut(key) {
                record.mark_clean();
            }
        }

        let count = deletes.len() + puts.len();
        tracing::debug!(
            path = %self.path.join("/"),
            written = puts.len(),
            deleted = deletes.len(),
            "Saved table"
        );
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------

    /// Next key from this table's bucket counter, in its own transaction.
    /// Do not call while this thread holds a `WriteTx`; use `next_key_in`.
    pub fn next_key(&self) -> TableResult<String> {
        self.sequencer.next_key(&self.store, &self.path)
    }

    pub fn next_keys(&self, count: usize) -> TableResult<Vec<String>> {
        self.sequencer.next_keys(&self.store, &self.path, count)
    }

    pub fn next_key_in(&self, tx: &mut WriteTx<'_>) -> TableResult<String> {
        self.sequencer.next_key_in(tx, &self.path)
    }

    pub fn next_keys_in(&self, tx: &mut WriteTx<'_>, count: usize) -> TableResult<Vec<String>> {
        self.sequencer.next_keys_in(tx, &self.path, count)
    }

    // ------------------------------------------------------------------
    // Orderings and iteration
    // ------------------------------------------------------------------

    /// Sort the current records by `specs` (e.g. `["color", "w", "h:d"]`) and
    /// cache the key sequence under `name`. Returns its length.
    pub fn create_order_by<S: AsRef<str>>(&mut self, name: &str, specs: &[S]) -> TableResult<usize> {
        let specs: Vec<SortSpec> = specs.iter().map(|s| SortSpec::parse(s.as_ref())).collect();
        let order = build_order(&self.records, &self.schema, &specs)?;
        let len = order.len();
        self.orderings.insert(name.to_string(), order);
        Ok(len)
    }

    pub fn ordering(&self, name: &str) -> Option<&[String]> {
        self.orderings.get(name).map(Vec::as_slice)
    }

    fn ordered_keys(&self, name: &str) -> TableResult<&Vec<String>> {
        self.orderings
            .get(name)
            .ok_or_else(|| TableError::OrderingNotFound { name: name.to_string() })
    }

    /// Visit live records, in the named ordering or in unspecified order.
    pub fn for_each<F>(&self, order: Option<&str>, mut f: F) -> TableResult<()>
    where
        F: FnMut(&str, &Record) -> TableResult<()>,
    {
        match order {
            Some(name) => {
                for key in self.ordered_keys(name)? {
                    match self.records.get(key) {
                        Some(record) if !record.is_deleted() => f(key, record)?,
                        _ => {}
                    }
                }
            }
            None => {
                for (key, record) in &self.records {
                    if !record.is_deleted() {
                        f(key, record)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Like `for_each`, with mutable access to each record.
    pub fn for_each_mut<F>(&mut self, order: Option<&str>, mut f: F) -> TableResult<()>
    where
        F: FnMut(&str, &mut Record) -> TableResult<()>,
    {
        match order {
            Some(name) => {
                let keys = self
                    .orderings
                    .get(name)
                    .ok_or_else(|| TableError::OrderingNotFound { name: name.to_string() })?;
                for key in keys {
                    match self.records.get_mut(key) {
                        Some(record) if !record.is_deleted() => f(key, record)?,
                        _ => {}
                    }
                }
            }
            None => {
                for (key, record) in self.records.iter_mut() {
                    if !record.is_deleted() {
                        f(key, record)?;
                    }
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    pub fn get_record(&self, key: &str) -> Option<&Record> {
        self.records.get(key)
    }

    pub fn get_record_mut(&mut self, key: &str) -> Option<&mut Record> {
        self.records.get_mut(key)
    }

    /// Add an empty record under `key`, replacing any record already there.
    /// It is dirty, so the next `save` writes it.
    pub fn add_record(&mut self, key: impl Into<String>) -> &mut Record {
        self.insert_record(key.into(), Fields::new())
    }

    /// Add a record with initial values. Every name must be in the schema.
    pub fn add_record_with<I, N, V>(&mut self, key: impl Into<String>, values: I) -> TableResult<&mut Record>
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        let mut fields = Fields::new();
        for (name, value) in values {
            let name = name.into();
            self.schema.require(&name)?;
            fields.insert(name, value.into());
        }
        Ok(self.insert_record(key.into(), fields))
    }

    fn insert_record(&mut self, key: String, fields: Fields) -> &mut Record {
        let record = Record::added(Arc::clone(&self.schema), fields);
        match self.records.entry(key) {
            hashbrown::hash_map::Entry::Occupied(mut slot) => {
                slot.insert(record);
                slot.into_mut()
            }
            hashbrown::hash_map::Entry::Vacant(slot) => slot.insert(record),
        }
    }

    /// Mark `key` for deletion on the next `save`.
    pub fn delete_record(&mut self, key: &str) -> TableResult<()> {
        let record = self
            .records
            .get_mut(key)
            .ok_or_else(|| TableError::RecordNotFound { key: key.to_string() })?;
        record.mark_deleted();
        Ok(())
    }

    /// Drop every record and ordering from memory. Storage is untouched.
    pub fn clear(&mut self) {
        self.records = HashMap::new();
        self.orderings = HashMap::new();
    }

    /// Records in memory, including ones marked for deletion.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn key_width(&self) -> usize {
        self.sequencer.width()
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub(crate) fn sequencer(&self) -> KeySequencer {
        self.sequencer
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "---- table {} ----", self.path.join("/"))?;
        writeln!(f, "key width: {}", self.key_width())?;
        writeln!(f, "fields: {}", self.schema)?;

        let mut keys: Vec<&String> = self.records.keys().collect();
        keys.sort_unstable();
        for key in keys {
            let Some(record) = self.records.get(key) else { continue };
            write!(f, "{}:", key)?;
            for (name, value) in record.values() {
                write!(f, " {}={}", name, value)?;
            }
            if record.is_deleted() {
                f.write_str(" (deleted)")?;
            } else if record.is_dirty() {
                f.write_str(" (changed)")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("path", &self.path)
            .field("records", &self.records.len())
            .field("orderings", &self.orderings.len())
            .finish()
    }
}
