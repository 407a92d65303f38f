//! Error types for BucketDB storage operations
//!
//! All storage errors are represented by the StoreError enum, which carries
//! enough context (paths, offsets, bucket names) to report and continue.

use std::path::PathBuf;

use thiserror::Error;

/// Storage errors, each carrying enough context to log and carry on.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("{}", io_message(.path, .kind, .message))]
    Io {
        path: Option<PathBuf>,
        kind: std::io::ErrorKind,
        message: String,
    },

    /// Unreadable WAL region that recovery could not resync past
    #[error("WAL corrupted in {} at offset {offset}: {reason}", .path.display())]
    WalCorrupted { path: PathBuf, offset: u64, reason: String },

    #[error("Checksum mismatch in {} at offset {offset}: expected 0x{expected:08x}, got 0x{actual:08x}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: u32,
        actual: u32,
        offset: u64,
    },

    /// Entry header promises more bytes than the file holds (crash mid-write)
    #[error("Torn write in {} at offset {offset}: expected {expected_size} bytes, only {available_bytes} available", .path.display())]
    TornWrite {
        path: PathBuf,
        expected_size: u32,
        available_bytes: u64,
        offset: u64,
    },

    /// `component` is "key", "value", "bucket name" or "batch"
    #[error("Entry {component} too large: {entry_size} bytes exceeds limit of {max_size} bytes")]
    OversizedEntry {
        entry_size: u64,
        max_size: u64,
        component: String,
    },

    #[error("Magic bytes not found in {} at offset {offset}: found {:02x}{:02x}{:02x}{:02x}",
            .path.display(), .found_bytes[0], .found_bytes[1], .found_bytes[2], .found_bytes[3])]
    NoMagicFound {
        path: PathBuf,
        offset: u64,
        found_bytes: [u8; 4],
    },

    /// Some segment of `path` does not exist
    #[error("Bucket not found: {}", .path.join("/"))]
    BucketNotFound { path: Vec<String> },

    #[error("Bucket already exists: {}", .path.join("/"))]
    BucketExists { path: Vec<String> },

    #[error("Bucket path must contain at least one name")]
    EmptyPath,

    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),
}

fn io_message(path: &Option<PathBuf>, kind: &std::io::ErrorKind, message: &str) -> String {
    match path {
        Some(path) => format!("I/O error in {}: {} ({})", path.display(), message, kind),
        None => format!("I/O error: {} ({})", message, kind),
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io {
            path: None,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
