//! BucketDB tables: typed record sets over bucket paths.
//!
//! A `Table` loads the records under one bucket path of a `Store` into
//! memory (all of them, a key range, a key prefix or an explicit key list),
//! lets the caller read and change them through schema-checked accessors,
//! builds cached multi-field orderings, and writes changes back inside a
//! caller-owned write transaction.
//!
//! # Layout
//!
//! - `codec`: the `{"field":"value",...}` record encoding
//! - `schema` / `record`: field types and typed access to one row
//! - `sequence`: zero-padded keys from a bucket's counter
//! - `order`: multi-key sort into a named key sequence
//! - `guard`: `SharedTable`, a table behind one readers-writer lock
//! - `table`: load, save and iteration
//!
//! Saving several tables against one `WriteTx` and committing once makes
//! the whole set of changes atomic.

pub mod codec;
pub mod error;
pub mod guard;
pub mod order;
pub mod record;
pub mod schema;
pub mod sequence;
pub mod table;

pub use error::{TableError, TableResult};
pub use guard::{SharedTable, Sharing};
pub use order::{Direction, SortSpec, BY_KEY};
pub use record::Record;
pub use schema::{FieldType, Schema};
pub use sequence::KeySequencer;
pub use table::{Table, TableConfig};

pub(crate) fn owned_path<P: AsRef<str>>(path: &[P]) -> Vec<String> {
    path.iter().map(|p| p.as_ref().to_string()).collect()
}
