use bucketdb_core::StoreError;
use thiserror::Error;

/// Errors raised by tables, records and the record codec.
#[derive(Debug, Error)]
pub enum TableError {
    /// Field name not present in the table's schema
    #[error("Unknown field: {field}")]
    UnknownField { field: String },

    /// Stored string cannot be read as the requested type
    #[error("Field {field}: {value:?} is not a valid {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: &'static str,
    },

    /// Stored record bytes are not in the `{"k":"v",...}` form
    #[error("Malformed record {key:?}: {reason}")]
    MalformedRecord { key: String, reason: String },

    /// Name or value contains the quote character the codec cannot carry
    #[error("Field {field} contains a quote character and cannot be encoded")]
    UnencodableValue { field: String },

    #[error("Bucket not found: {}", .path.join("/"))]
    BucketNotFound { path: Vec<String> },

    #[error("Ordering not found: {name}")]
    OrderingNotFound { name: String },

    #[error("Record not found: {key}")]
    RecordNotFound { key: String },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid table configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for TableError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::BucketNotFound { path } => TableError::BucketNotFound { path },
            other => TableError::Storage(other),
        }
    }
}

pub type TableResult<T> = Result<T, TableError>;
