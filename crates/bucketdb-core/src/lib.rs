//! BucketDB Core: an ordered, transactional key-value store with nested buckets.
//!
//! The whole tree lives in RAM. Every committed write transaction is appended
//! to a write-ahead log as one checksummed entry before it becomes visible, so
//! a crash loses at most the transaction that was in flight.
//!
//! # Architecture
//!
//! - **Read path**: `ReadTx` pins an immutable snapshot of the tree
//! - **Write path**: one `WriteTx` at a time; WAL append, then publish
//! - **Recovery**: replay WAL batches in file order, dropping a torn tail
//! - **Checkpoint**: rewrite the WAL as one snapshot batch
//!
//! ```no_run
//! use bucketdb_core::{Config, Store, StoreError, Tx};
//!
//! let store = Store::open("/tmp/bucketdb", Config::default())?;
//! store.create_bucket_path(&["shapes", "rects"])?;
//! store.update(|tx| tx.put(&["shapes", "rects"], b"00000001", b"{}"))?;
//! let value = store.view(|tx| Ok::<_, StoreError>(tx.get(&["shapes", "rects"], b"00000001")?.map(<[u8]>::to_vec)))?;
//! # Ok::<(), StoreError>(())
//! ```

pub mod bucket;
pub mod checkpoint;
pub mod config;
pub mod cursor;
pub mod error;
pub mod format;
pub mod platform_durability;
pub mod store;
pub mod tx;
pub mod wal;

pub use bucket::Bucket;
pub use checkpoint::CheckpointResult;
pub use config::Config;
pub use cursor::{Cursor, Entry};
pub use error::{StoreError, StoreResult};
pub use format::Operation;
pub use store::Store;
pub use tx::{ReadTx, Tx, WriteTx};
pub use wal::{WalReader, WalWriter};
