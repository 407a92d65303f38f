//! Nested buckets: the in-memory shape of the store.
//!
//! A bucket holds byte-ordered entries, named child buckets and a sequence
//! counter. Children and entry maps sit behind `Arc`, so cloning a tree is
//! cheap and a write transaction only copies the buckets it actually touches.

use std::collections::BTreeMap;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::cursor::Cursor;
use crate::error::{StoreError, StoreResult};
use crate::format::Operation;

/// Byte-ordered entries of one bucket
pub type Entries = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Debug, Clone, Default)]
pub struct Bucket {
    entries: Arc<Entries>,
    children: HashMap<String, Arc<Bucket>>,
    sequence: u64,
}

impl Bucket {
    /// Value stored under `key`, if any.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Number of entries (child buckets not counted).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Last value handed out by `next_sequence`, 0 if never used.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Child bucket by name.
    pub fn bucket(&self, name: &str) -> Option<&Bucket> {
        self.children.get(name).map(Arc::as_ref)
    }

    /// Names of child buckets, sorted.
    pub fn bucket_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.children.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Ordered cursor over this bucket's entries.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(&self.entries)
    }

    /// Walk `path` down from this bucket.
    pub fn resolve<P: AsRef<str>>(&self, path: &[P]) -> Option<&Bucket> {
        let mut current = self;
        for name in path {
            current = current.bucket(name.as_ref())?;
        }
        Some(current)
    }

    pub(crate) fn resolve_mut<P: AsRef<str>>(&mut self, path: &[P]) -> Option<&mut Bucket> {
        let mut current = self;
        for name in path {
            current = Arc::make_mut(current.children.get_mut(name.as_ref())?);
        }
        Some(current)
    }

    pub(crate) fn entries(&self) -> &Entries {
        &self.entries
    }

    pub(crate) fn children(&self) -> impl Iterator<Item = (&str, &Bucket)> {
        self.children.iter().map(|(name, child)| (name.as_str(), child.as_ref()))
    }

    pub(crate) fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        Arc::make_mut(&mut self.entries).insert(key, value);
    }

    pub(crate) fn delete(&mut self, key: &[u8]) -> bool {
        if !self.entries.contains_key(key) {
            return false;
        }
        Arc::make_mut(&mut self.entries).remove(key).is_some()
    }

    /// Returns false if a child with this name already exists.
    pub(crate) fn create_child(&mut self, name: &str) -> bool {
        if self.children.contains_key(name) {
            return false;
        }
        self.children.insert(name.to_string(), Arc::new(Bucket::default()));
        true
    }

    pub(crate) fn set_sequence(&mut self, value: u64) {
        self.sequence = value;
    }

    /// Apply one logged operation to this tree (used as the root).
    pub(crate) fn apply(&mut self, op: &Operation) -> StoreResult<()> {
        match op {
            Operation::CreateBucket { path } => {
                let (name, parent) = path.split_last().ok_or(StoreError::EmptyPath)?;
                let parent_bucket = self
                    .resolve_mut(parent)
                    .ok_or_else(|| StoreError::BucketNotFound { path: parent.to_vec() })?;
                if !parent_bucket.create_child(name) {
                    return Err(StoreError::BucketExists { path: path.clone() });
                }
            }
            Operation::Put { path, key, value } => {
                self.resolve_mut(path)
                    .ok_or_else(|| StoreError::BucketNotFound { path: path.clone() })?
                    .put(key.clone(), value.clone());
            }
            Operation::Delete { path, key } => {
                self.resolve_mut(path)
                    .ok_or_else(|| StoreError::BucketNotFound { path: path.clone() })?
                    .delete(key);
            }
            Operation::SetSequence { path, value } => {
                self.resolve_mut(path)
                    .ok_or_else(|| StoreError::BucketNotFound { path: path.clone() })?
                    .set_sequence(*value);
            }
            Operation::Reset => *self = Bucket::default(),
        }
        Ok(())
    }
}
