//! Key sequencing from a bucket's atomic counter.
//!
//! Keys are the counter value as zero-padded decimal, so byte order equals
//! numeric order as long as the counter stays within the width.

use bucketdb_core::{Store, WriteTx};

use crate::error::{TableError, TableResult};
use crate::owned_path;

pub const DEFAULT_KEY_WIDTH: usize = 8;
/// u64::MAX has 20 digits
pub const MAX_KEY_WIDTH: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySequencer {
    width: usize,
}

impl Default for KeySequencer {
    fn default() -> Self {
        Self { width: DEFAULT_KEY_WIDTH }
    }
}

impl KeySequencer {
    pub fn new(width: usize) -> TableResult<Self> {
        if width == 0 || width > MAX_KEY_WIDTH {
            return Err(TableError::InvalidConfig(format!(
                "key width must be 1..={}, got {}",
                MAX_KEY_WIDTH, width
            )));
        }
        Ok(Self { width })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn format_key(&self, n: u64) -> String {
        format!("{:0width$}", n, width = self.width)
    }

    /// Draw one key inside the caller's transaction.
    pub fn next_key_in<P: AsRef<str>>(&self, tx: &mut WriteTx<'_>, path: &[P]) -> TableResult<String> {
        Ok(self.format_key(tx.next_sequence(path)?))
    }

    /// Draw `count` consecutive keys inside the caller's transaction.
    pub fn next_keys_in<P: AsRef<str>>(
        &self,
        tx: &mut WriteTx<'_>,
        path: &[P],
        count: usize,
    ) -> TableResult<Vec<String>> {
        (0..count).map(|_| self.next_key_in(tx, path)).collect()
    }

    /// Draw one key in its own committed transaction.
    ///
    /// Blocks until any open `WriteTx` on `store` finishes, so never call it
    /// from a thread that is holding one.
    pub fn next_key<P: AsRef<str>>(&self, store: &Store, path: &[P]) -> TableResult<String> {
        store.update(|tx| self.next_key_in(tx, path))
    }

    /// Draw `count` keys in one committed transaction. Same caveat as `next_key`.
    pub fn next_keys<P: AsRef<str>>(&self, store: &Store, path: &[P], count: usize) -> TableResult<Vec<String>> {
        if count == 0 {
            // Nothing to draw; still report a missing bucket
            if !store.bucket_exists(path) {
                return Err(TableError::BucketNotFound { path: owned_path(path) });
            }
            return Ok(Vec::new());
        }
        let keys = store.update(|tx| self.next_keys_in(tx, path, count))?;
        tracing::debug!(path = %owned_path(path).join("/"), count, "Drew keys");
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketdb_core::Config;
    use tempfile::TempDir;

    #[test]
    fn test_format_key() {
        let seq = KeySequencer::default();
        assert_eq!(seq.format_key(1), "00000001");
        assert_eq!(seq.format_key(12345678), "12345678");
        // Wider than the width: not truncated
        assert_eq!(seq.format_key(123456789), "123456789");
        assert_eq!(KeySequencer::new(4).unwrap().format_key(7), "0007");
    }

    #[test]
    fn test_width_bounds() {
        assert!(KeySequencer::new(0).is_err());
        assert!(KeySequencer::new(21).is_err());
        assert_eq!(KeySequencer::new(20).unwrap().format_key(u64::MAX), u64::MAX.to_string());
    }

    #[test]
    fn test_next_keys_continue() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), Config::relaxed()).unwrap();
        store.create_bucket_path(&["shapes"]).unwrap();

        let seq = KeySequencer::default();
        assert_eq!(seq.next_key(&store, &["shapes"]).unwrap(), "00000001");
        assert_eq!(seq.next_keys(&store, &["shapes"], 3).unwrap(), vec!["00000002", "00000003", "00000004"]);
        assert_eq!(seq.next_key(&store, &["shapes"]).unwrap(), "00000005");
    }

    #[test]
    fn test_missing_bucket() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), Config::relaxed()).unwrap();
        let seq = KeySequencer::default();
        assert!(matches!(seq.next_key(&store, &["nope"]), Err(TableError::BucketNotFound { .. })));
        assert!(matches!(seq.next_keys(&store, &["nope"], 0), Err(TableError::BucketNotFound { .. })));
    }
}
