//! Write-Ahead Log implementation for BucketDB
//!
//! Each committed write transaction becomes exactly one WAL entry, so a
//! commit is atomic across every bucket it touched: recovery either replays
//! the whole batch or (torn/corrupt) none of it.
//!
//! The WRITE path is WAL-first: the batch is appended (and synced, when the
//! store is configured to) before the in-memory tree is swapped.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::format::{deserialize_batch, serialize_batch, Operation, WalBatch, HEADER_SIZE, MAGIC_ARRAY};
use crate::platform_durability::{durable_sync, sync_directory};

const WAL_PREFIX: &str = "wal-";
const WAL_SUFFIX: &str = ".bkdb";

fn wal_file_name(sequence: u64) -> String {
    format!("{}{:016x}{}", WAL_PREFIX, sequence, WAL_SUFFIX)
}

fn parse_wal_sequence(name: &str) -> Option<u64> {
    let hex = name.strip_prefix(WAL_PREFIX)?.strip_suffix(WAL_SUFFIX)?;
    u64::from_str_radix(hex, 16).ok()
}

fn io_error(path: &Path, e: std::io::Error, what: &str) -> StoreError {
    StoreError::Io {
        path: Some(path.to_path_buf()),
        kind: e.kind(),
        message: format!("{}: {}", what, e),
    }
}

/// WAL writer handles appending committed batches and ensuring durability.
///
/// append_batch() must complete BEFORE the caller publishes the new tree.
pub struct WalWriter {
    file: File,
    path: PathBuf,
    /// Bytes written to `file` so far
    size: u64,
    wal_dir: PathBuf,
    /// Number in the current file's name; grows on every rotation
    sequence: u64,
    /// Rotation threshold in bytes
    rotation_size: u64,
}

impl WalWriter {
    /// Create a new WAL writer in the specified directory.
    /// Always starts a fresh file after the highest existing one, so new
    /// commits never land behind a torn tail left by a crash.
    pub fn new<P: AsRef<Path>>(wal_dir: P, rotation_size: u64) -> StoreResult<Self> {
        let wal_dir = wal_dir.as_ref().to_path_buf();

        std::fs::create_dir_all(&wal_dir)
            .map_err(|e| io_error(&wal_dir, e, "Failed to create WAL directory"))?;

        let sequence = list_wal_files(&wal_dir)?
            .last()
            .map(|(seq, _)| seq + 1)
            .unwrap_or(0);
        let (file, path, size) = open_wal_file(&wal_dir, sequence)?;

        Ok(Self { file, path, size, wal_dir, sequence, rotation_size })
    }

    /// Append one committed batch.
    ///
    /// 1. serialize: ops to binary with CRC32C
    /// 2. write:     append to the current file
    /// 3. sync:      durable_sync when `sync` is set
    ///
    /// A crash between 2 and 3 leaves either the full entry or a torn tail,
    /// which recovery discards as a unit.
    pub fn append_batch(&mut self, ops: &[Operation], sync: bool) -> StoreResult<()> {
        let entry_bytes = serialize_batch(ops)?;

        if self.size > 0 && self.size + entry_bytes.len() as u64 > self.rotation_size {
            self.rotate()?;
        }

        self.file
            .write_all(&entry_bytes)
            .map_err(|e| io_error(&self.path, e, "WAL write failed"))?;

        if sync {
            self.sync()?;
        }

        self.size += entry_bytes.len() as u64;
        Ok(())
    }

    /// Start a new file whose first entry is `snapshot`, then delete every
    /// older WAL file. The snapshot is synced before anything is removed, so
    /// a crash at any point recovers either the old history or the snapshot.
    pub fn rotate_with_snapshot(&mut self, snapshot: &[Operation]) -> StoreResult<usize> {
        self.rotate()?;
        self.append_batch(snapshot, true)?;
        sync_dir(&self.wal_dir)?;

        let mut removed = 0;
        for (seq, path) in list_wal_files(&self.wal_dir)? {
            if seq < self.sequence {
                std::fs::remove_file(&path)
                    .map_err(|e| io_error(&path, e, "Failed to remove superseded WAL file"))?;
                removed += 1;
            }
        }
        sync_dir(&self.wal_dir)?;
        Ok(removed)
    }

    /// Rotate to a new WAL file. Syncs current file before switching.
    fn rotate(&mut self) -> StoreResult<()> {
        self.sync()?;

        let (file, path, size) = open_wal_file(&self.wal_dir, self.sequence + 1)?;
        self.sequence += 1;
        self.file = file;
        self.path = path;
        self.size = size;

        Ok(())
    }

    pub fn current_path(&self) -> &Path {
        &self.path
    }

    /// Bytes in the current file.
    pub fn current_size(&self) -> u64 {
        self.size
    }

    /// Sync the current WAL file to persistent storage.
    pub fn sync(&self) -> StoreResult<()> {
        durable_sync(&self.file).map_err(|e| io_error(&self.path, e, "WAL durable_sync failed"))
    }
}

fn open_wal_file(wal_dir: &Path, sequence: u64) -> StoreResult<(File, PathBuf, u64)> {
    let path = wal_dir.join(wal_file_name(sequence));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| io_error(&path, e, "Failed to open WAL file"))?;
    let size = file
        .metadata()
        .map_err(|e| io_error(&path, e, "Failed to stat WAL file"))?
        .len();
    Ok((file, path, size))
}

/// WAL files in the directory, sorted by sequence number.
fn list_wal_files(wal_dir: &Path) -> StoreResult<Vec<(u64, PathBuf)>> {
    let dir_entries = std::fs::read_dir(wal_dir)
        .map_err(|e| io_error(wal_dir, e, "Failed to read WAL directory"))?;

    let mut files = Vec::new();
    for entry in dir_entries {
        let entry = entry.map_err(|e| io_error(wal_dir, e, "Failed to read directory entry"))?;
        let path = entry.path();
        if let Some(seq) = path.file_name().and_then(|n| n.to_str()).and_then(parse_wal_sequence) {
            files.push((seq, path));
        }
    }
    files.sort();
    Ok(files)
}

fn sync_dir(dir: &Path) -> StoreResult<()> {
    sync_directory(dir).map_err(|e| io_error(dir, e, "Failed to sync WAL directory"))
}

/// WAL reader handles recovery by replaying batches from WAL files.
pub struct WalReader {
    wal_dir: PathBuf,
}

impl WalReader {
    pub fn new<P: AsRef<Path>>(wal_dir: P) -> Self {
        Self { wal_dir: wal_dir.as_ref().to_path_buf() }
    }

    /// Recover all batches from WAL files in sequence order.
    ///
    /// Per file:
    /// 1. Validate magic bytes at the current offset
    /// 2. Check payload length against remaining file size
    /// 3. Verify CRC32C and parse the batch
    /// 4. On mismatch/corruption: skip to the next magic and continue
    /// 5. On torn write (incomplete entry at EOF): stop, this is the crash point
    pub fn recover_batches(&self) -> StoreResult<Vec<WalBatch>> {
        let mut batches = Vec::new();
        for (_, wal_path) in list_wal_files(&self.wal_dir)? {
            batches.extend(self.recover_from_file(&wal_path)?);
        }
        Ok(batches)
    }

    fn recover_from_file(&self, path: &Path) -> StoreResult<Vec<WalBatch>> {
        let mut file = File::open(path)
            .map_err(|e| io_error(path, e, "Failed to open WAL file for recovery"))?;

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)
            .map_err(|e| io_error(path, e, "Failed to read WAL file"))?;

        let mut batches = Vec::new();
        let mut offset = 0;

        while offset + HEADER_SIZE <= buffer.len() {
            if buffer[offset..offset + 4] != MAGIC_ARRAY {
                tracing::warn!(file = %path.display(), offset, "Bad WAL magic, scanning for next entry");
                match find_next_magic(&buffer, offset + 1) {
                    Some(next) => { offset = next; continue; }
                    None => break,
                }
            }

            let length = u32::from_le_bytes([
                buffer[offset + 4], buffer[offset + 5],
                buffer[offset + 6], buffer[offset + 7],
            ]) as usize;
            let total_entry_size = HEADER_SIZE + length;

            if offset + total_entry_size > buffer.len() {
                tracing::warn!(
                    file = %path.display(),
                    offset,
                    needed = total_entry_size,
                    available = buffer.len() - offset,
                    "Torn WAL write, discarding incomplete commit"
                );
                break;
            }

            match deserialize_batch(&buffer[offset..offset + total_entry_size]) {
                Ok(batch) => {
                    batches.push(batch);
                    offset += total_entry_size;
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), offset, error = %e, "Corrupt WAL entry skipped");
                    match find_next_magic(&buffer, offset + 1) {
                        Some(next) => { offset = next; continue; }
                        None => break,
                    }
                }
            }
        }

        Ok(batches)
    }
}

/// Scan forward in buffer to find next occurrence of the magic bytes.
fn find_next_magic(buffer: &[u8], start: usize) -> Option<usize> {
    (start..buffer.len().saturating_sub(3)).find(|&i| buffer[i..i + 4] == MAGIC_ARRAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ROTATE: u64 = 100 * 1024 * 1024;

    fn put(key: &str, value: &str) -> Operation {
        Operation::Put {
            path: vec!["b".to_string()],
            key: key.as_bytes().to_vec(),
            value: value.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_wal_write_read_roundtrip() {
        let temp = TempDir::new().unwrap();

        let mut writer = WalWriter::new(temp.path(), ROTATE).unwrap();
        writer.append_batch(&[Operation::CreateBucket { path: vec!["b".to_string()] }], true).unwrap();
        writer.append_batch(&[put("key1", "value1"), put("key2", "value2")], true).unwrap();
        drop(writer);

        let batches = WalReader::new(temp.path()).recover_batches().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].ops, vec![put("key1", "value1"), put("key2", "value2")]);
    }

    #[test]
    fn test_corruption_recovery_skips_bad_batch() {
        let temp = TempDir::new().unwrap();

        let mut writer = WalWriter::new(temp.path(), ROTATE).unwrap();
        writer.append_batch(&[put("good1", "val1")], true).unwrap();
        let first_len = writer.current_size() as usize;
        writer.append_batch(&[put("bad2", "val2")], true).unwrap();
        writer.append_batch(&[put("good3", "val3")], true).unwrap();
        let wal_path = writer.current_path().to_path_buf();
        drop(writer);

        // Flip a payload byte inside the second entry
        let mut data = std::fs::read(&wal_path).unwrap();
        data[first_len + HEADER_SIZE + 6] ^= 0xFF;
        std::fs::write(&wal_path, data).unwrap();

        let batches = WalReader::new(temp.path()).recover_batches().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].ops, vec![put("good1", "val1")]);
        assert_eq!(batches[1].ops, vec![put("good3", "val3")]);
    }

    #[test]
    fn test_torn_write_drops_whole_batch() {
        let temp = TempDir::new().unwrap();

        let mut writer = WalWriter::new(temp.path(), ROTATE).unwrap();
        writer.append_batch(&[put("complete", "entry")], true).unwrap();
        let wal_path = writer.current_path().to_path_buf();
        drop(writer);

        // Simulate a crash halfway through appending a two-op batch
        let torn = serialize_batch(&[put("a", "1"), put("b", "2")]).unwrap();
        let mut data = std::fs::read(&wal_path).unwrap();
        data.extend_from_slice(&torn[..torn.len() / 2]);
        std::fs::write(&wal_path, data).unwrap();

        let batches = WalReader::new(temp.path()).recover_batches().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].ops, vec![put("complete", "entry")]);
    }

    #[test]
    fn test_empty_wal_directory() {
        let temp = TempDir::new().unwrap();
        let batches = WalReader::new(temp.path()).recover_batches().unwrap();
        assert!(batches.is_empty());
    }

    #[test]
    fn test_wal_file_naming() {
        let temp = TempDir::new().unwrap();
        let writer = WalWriter::new(temp.path(), ROTATE).unwrap();
        let name = writer.current_path().file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("wal-"));
        assert!(name.ends_with(".bkdb"));
        assert_eq!(parse_wal_sequence(&name), Some(0));
    }

    #[test]
    fn test_reopen_starts_after_torn_tail() {
        let temp = TempDir::new().unwrap();
        let mut writer = WalWriter::new(temp.path(), ROTATE).unwrap();
        writer.append_batch(&[put("before", "1")], true).unwrap();
        let first = writer.current_path().to_path_buf();
        drop(writer);

        let mut data = std::fs::read(&first).unwrap();
        data.extend_from_slice(&MAGIC_ARRAY);
        data.extend_from_slice(&[0xFF, 0x00, 0x00, 0x00]);
        std::fs::write(&first, data).unwrap();

        let mut writer = WalWriter::new(temp.path(), ROTATE).unwrap();
        assert_ne!(writer.current_path(), first.as_path());
        writer.append_batch(&[put("after", "2")], true).unwrap();
        drop(writer);

        let batches = WalReader::new(temp.path()).recover_batches().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].ops, vec![put("after", "2")]);
    }

    #[test]
    fn test_rotation_keeps_order() {
        let temp = TempDir::new().unwrap();
        // Tiny threshold: every batch after the first forces a new file
        let mut writer = WalWriter::new(temp.path(), 1).unwrap();
        for i in 0..4 {
            writer.append_batch(&[put(&format!("k{}", i), "v")], false).unwrap();
        }
        drop(writer);

        assert_eq!(list_wal_files(temp.path()).unwrap().len(), 4);
        let batches = WalReader::new(temp.path()).recover_batches().unwrap();
        let keys: Vec<_> = batches.iter().map(|b| match &b.ops[0] {
            Operation::Put { key, .. } => String::from_utf8(key.clone()).unwrap(),
            other => panic!("unexpected op {:?}", other),
        }).collect();
        assert_eq!(keys, vec!["k0", "k1", "k2", "k3"]);
    }

    #[test]
    fn test_snapshot_removes_older_files() {
        let temp = TempDir::new().unwrap();
        let mut writer = WalWriter::new(temp.path(), ROTATE).unwrap();
        writer.append_batch(&[put("old", "1")], true).unwrap();
        writer.append_batch(&[put("old", "2")], true).unwrap();

        let removed = writer.rotate_with_snapshot(&[Operation::Reset, put("old", "2")]).unwrap();
        assert_eq!(removed, 1);
        writer.append_batch(&[put("new", "3")], true).unwrap();
        drop(writer);

        let batches = WalReader::new(temp.path()).recover_batches().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].ops[0], Operation::Reset);
        assert_eq!(batches[1].ops, vec![put("new", "3")]);
    }
}
