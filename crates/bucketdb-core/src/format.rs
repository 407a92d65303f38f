//! Binary format definitions for BucketDB WAL entries
//!
//! Every WAL entry is one committed transaction:
//! ChunkHeader (32 bytes) + op_count(u32) + op*
//!
//! Each op starts with a tag byte:
//!   1 CreateBucket: path
//!   2 Put:          path + key_len(u16) + value_len(u32) + key + value
//!   3 Delete:       path + key_len(u16) + key
//!   4 SetSequence:  path + value(u64)
//!   5 Reset:        (no body) drop the whole tree before applying what follows
//!
//! A path is segment_count(u16) followed by segment_len(u16) + bytes per segment.
//! All integers are little-endian.

use std::path::PathBuf;

use crate::error::{StoreError, StoreResult};

/// Magic bytes identifying BucketDB WAL entries: "BKDB" in ASCII
pub const MAGIC_ARRAY: [u8; 4] = [0x42, 0x4B, 0x44, 0x42]; // 'B','K','D','B'

/// Header size in bytes
pub const HEADER_SIZE: usize = 32;

/// Entry type for a committed batch of operations
pub const ENTRY_BATCH: u8 = 1;

const TAG_CREATE_BUCKET: u8 = 1;
const TAG_PUT: u8 = 2;
const TAG_DELETE: u8 = 3;
const TAG_SET_SEQUENCE: u8 = 4;
const TAG_RESET: u8 = 5;

/// One mutation recorded by a write transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Create an empty bucket; the parent path must exist
    CreateBucket { path: Vec<String> },
    /// Insert or update a key-value pair
    Put { path: Vec<String>, key: Vec<u8>, value: Vec<u8> },
    /// Delete a key
    Delete { path: Vec<String>, key: Vec<u8> },
    /// Set a bucket's sequence counter
    SetSequence { path: Vec<String>, value: u64 },
    /// Clear the whole tree (first op of a checkpoint snapshot)
    Reset,
}

/// Fixed-size header for each WAL entry
/// Size: 32 bytes, alignment: 4
///
/// Layout:
///   [0..4]   magic:      [u8;4] - "BKDB"
///   [4..8]   length:     u32    - payload length in bytes
///   [8..12]  checksum:   u32    - CRC32C of payload bytes
///   [12]     entry_type: u8     - ENTRY_BATCH
///   [13..32] reserved, zero
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct ChunkHeader {
    /// Magic bytes for entry identification and corruption recovery
    pub magic: [u8; 4],
    /// Total length of the entry payload (excluding this header)
    pub length: u32,
    /// CRC32C checksum of the payload bytes
    pub checksum: u32,
    /// Entry type
    pub entry_type: u8,
    /// Reserved for future use, must be zero
    pub reserved: [u8; 3],
    /// Padding to reach 32 bytes
    pub _padding: [u8; 16],
}

/// A committed batch read back from the WAL
#[derive(Debug, Clone)]
pub struct WalBatch {
    pub header: ChunkHeader,
    pub ops: Vec<Operation>,
}

impl ChunkHeader {
    pub fn new(length: u32, checksum: u32, entry_type: u8) -> Self {
        Self {
            magic: MAGIC_ARRAY,
            length,
            checksum,
            entry_type,
            reserved: [0; 3],
            _padding: [0; 16],
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..8].copy_from_slice(&self.length.to_le_bytes());
        buf[8..12].copy_from_slice(&self.checksum.to_le_bytes());
        buf[12] = self.entry_type;
        buf[13..16].copy_from_slice(&self.reserved);
        buf
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        let mut padding = [0u8; 16];
        padding.copy_from_slice(&bytes[16..32]);

        Self {
            magic,
            length: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            checksum: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            entry_type: bytes[12],
            reserved: [bytes[13], bytes[14], bytes[15]],
            _padding: padding,
        }
    }
}

fn oversized(component: &str, size: usize, max: usize) -> StoreError {
    StoreError::OversizedEntry {
        entry_size: size as u64,
        max_size: max as u64,
        component: component.to_string(),
    }
}

fn put_path(buf: &mut Vec<u8>, path: &[String]) -> StoreResult<()> {
    if path.len() > u16::MAX as usize {
        return Err(oversized("bucket path", path.len(), u16::MAX as usize));
    }
    buf.extend_from_slice(&(path.len() as u16).to_le_bytes());
    for segment in path {
        put_short(buf, segment.as_bytes(), "bucket name")?;
    }
    Ok(())
}

fn put_short(buf: &mut Vec<u8>, bytes: &[u8], component: &str) -> StoreResult<()> {
    if bytes.len() > u16::MAX as usize {
        return Err(oversized(component, bytes.len(), u16::MAX as usize));
    }
    buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Serialize a batch of operations into a complete WAL entry
pub fn serialize_batch(ops: &[Operation]) -> StoreResult<Vec<u8>> {
    let mut payload = Vec::with_capacity(64);
    payload.extend_from_slice(&(ops.len() as u32).to_le_bytes());

    for op in ops {
        match op {
            Operation::CreateBucket { path } => {
                payload.push(TAG_CREATE_BUCKET);
                put_path(&mut payload, path)?;
            }
            Operation::Put { path, key, value } => {
                if value.len() > u32::MAX as usize {
                    return Err(oversized("value", value.len(), u32::MAX as usize));
                }
                if key.len() > u16::MAX as usize {
                    return Err(oversized("key", key.len(), u16::MAX as usize));
                }
                payload.push(TAG_PUT);
                put_path(&mut payload, path)?;
                payload.extend_from_slice(&(key.len() as u16).to_le_bytes());
                payload.extend_from_slice(&(value.len() as u32).to_le_bytes());
                payload.extend_from_slice(key);
                payload.extend_from_slice(value);
            }
            Operation::Delete { path, key } => {
                payload.push(TAG_DELETE);
                put_path(&mut payload, path)?;
                put_short(&mut payload, key, "key")?;
            }
            Operation::SetSequence { path, value } => {
                payload.push(TAG_SET_SEQUENCE);
                put_path(&mut payload, path)?;
                payload.extend_from_slice(&value.to_le_bytes());
            }
            Operation::Reset => payload.push(TAG_RESET),
        }
    }

    if payload.len() > u32::MAX as usize {
        return Err(oversized("batch", payload.len(), u32::MAX as usize));
    }

    let checksum = crc32c::crc32c(&payload);
    let header = ChunkHeader::new(payload.len() as u32, checksum, ENTRY_BATCH);

    let mut buffer = Vec::with_capacity(HEADER_SIZE + payload.len());
    buffer.extend_from_slice(&header.to_bytes());
    buffer.extend_from_slice(&payload);
    Ok(buffer)
}

/// Cursor over a verified payload. Offsets in errors are payload-relative
/// plus the header size, i.e. relative to the start of the entry.
struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn corrupted(&self, reason: String) -> StoreError {
        StoreError::WalCorrupted {
            path: PathBuf::from("<buffer>"),
            offset: (HEADER_SIZE + self.pos) as u64,
            reason,
        }
    }

    fn take(&mut self, n: usize) -> StoreResult<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(self.corrupted(format!(
                "Payload too short: need {} bytes, {} remain",
                n,
                self.buf.len() - self.pos
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> StoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> StoreResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> StoreResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> StoreResult<u64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    fn path(&mut self) -> StoreResult<Vec<String>> {
        let count = self.u16()? as usize;
        let mut path = Vec::with_capacity(count);
        for _ in 0..count {
            let len = self.u16()? as usize;
            let bytes = self.take(len)?;
            let name = String::from_utf8(bytes.to_vec())
                .map_err(|_| self.corrupted("Bucket name is not valid UTF-8".to_string()))?;
            path.push(name);
        }
        Ok(path)
    }
}

/// Deserialize a WAL entry from a byte slice
pub fn deserialize_batch(data: &[u8]) -> StoreResult<WalBatch> {
    if data.len() < HEADER_SIZE {
        return Err(StoreError::WalCorrupted {
            path: PathBuf::from("<buffer>"),
            offset: 0,
            reason: format!("Entry too short: {} bytes, need at least {}", data.len(), HEADER_SIZE),
        });
    }

    let mut header_bytes = [0u8; HEADER_SIZE];
    header_bytes.copy_from_slice(&data[..HEADER_SIZE]);
    let header = ChunkHeader::from_bytes(&header_bytes);

    if header.magic != MAGIC_ARRAY {
        return Err(StoreError::NoMagicFound {
            path: PathBuf::from("<buffer>"),
            offset: 0,
            found_bytes: header.magic,
        });
    }

    let payload_end = HEADER_SIZE + header.length as usize;
    if data.len() < payload_end {
        return Err(StoreError::TornWrite {
            path: PathBuf::from("<buffer>"),
            expected_size: header.length,
            available_bytes: (data.len() - HEADER_SIZE) as u64,
            offset: HEADER_SIZE as u64,
        });
    }

    let payload = &data[HEADER_SIZE..payload_end];
    let computed = crc32c::crc32c(payload);
    if computed != header.checksum {
        return Err(StoreError::ChecksumMismatch {
            path: PathBuf::from("<buffer>"),
            expected: header.checksum,
            actual: computed,
            offset: HEADER_SIZE as u64,
        });
    }

    if header.entry_type != ENTRY_BATCH {
        return Err(StoreError::WalCorrupted {
            path: PathBuf::from("<buffer>"),
            offset: 12,
            reason: format!("Invalid entry type: {}", header.entry_type),
        });
    }

    let mut reader = PayloadReader { buf: payload, pos: 0 };
    let count = reader.u32()? as usize;
    let mut ops = Vec::with_capacity(count.min(1024));

    for _ in 0..count {
        let op = match reader.u8()? {
            TAG_CREATE_BUCKET => Operation::CreateBucket { path: reader.path()? },
            TAG_PUT => {
                let path = reader.path()?;
                let key_len = reader.u16()? as usize;
                let value_len = reader.u32()? as usize;
                let key = reader.take(key_len)?.to_vec();
                let value = reader.take(value_len)?.to_vec();
                Operation::Put { path, key, value }
            }
            TAG_DELETE => {
                let path = reader.path()?;
                let key_len = reader.u16()? as usize;
                let key = reader.take(key_len)?.to_vec();
                Operation::Delete { path, key }
            }
            TAG_SET_SEQUENCE => {
                let path = reader.path()?;
                let value = reader.u64()?;
                Operation::SetSequence { path, value }
            }
            TAG_RESET => Operation::Reset,
            other => return Err(reader.corrupted(format!("Invalid operation tag: {}", other))),
        };
        ops.push(op);
    }

    if reader.pos != payload.len() {
        return Err(reader.corrupted(format!(
            "{} trailing bytes after {} operations",
            payload.len() - reader.pos,
            count
        )));
    }

    Ok(WalBatch { header, ops })
}
