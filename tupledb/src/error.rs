use std::fmt;

/// Errors produced by the store.
///
/// Variants map onto the kinds a caller needs to branch on: a missing row is
/// not the same failure as a corrupted schema, and callers routinely match on
/// these to decide whether to retry, surface to a user, or abort a process.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A parameter was structurally invalid (wrong arity, out-of-range index, ...).
    Inval(String),
    /// The caller is not allowed to perform the operation (e.g. schema txn on
    /// a non-alterable database).
    Perm(String),
    /// An option flag combination is not supported for the target.
    Flag(String),
    /// A table/column/index name failed validation or lookup.
    Name(String),
    /// A column type did not match what the operation expected.
    Type(String),
    /// A value was out of range or otherwise not representable for its column type.
    Value(String),
    /// Encoded data length did not match the shove describing it.
    DataLenMismatch { expected: usize, found: usize },
    /// Insert found a key that already exists.
    KeyExist,
    /// Point lookup or cursor move found no matching row.
    NotFound,
    /// A table exists but currently has no rows satisfying the query.
    NoData,
    /// A cursor was used outside of its valid range or positioning state.
    Cursor(String),
    /// A referenced column is not present in the schema.
    ColumnMissing(String),
    /// A secondary index's content disagrees with the primary table.
    IndexCorrupted(String),
    /// Two indexes describe the same column set and comparator.
    SimilarIndex(String),
    /// The stored schema record failed integrity checks.
    SchemaCorrupted(String),
    /// The schema changed since a handle/cursor was opened against it.
    SchemaChanged,
    /// The transaction has already been aborted or committed.
    TxnCancelled,
    /// A cached dbi handle outlived the schema generation it was opened under.
    TardyDbi,
    /// A row did not have a value for every column the schema requires.
    RowMismatch,
    /// The process handle cache or engine is out of capacity.
    NoMem,
    /// The operation is recognized but not implemented.
    NoImp(&'static str),
    /// An unrecoverable internal invariant was violated; the enclosing
    /// transaction must be aborted.
    WannaDie(String),
    /// Propagated failure from the underlying key-value engine.
    Engine(String),
}

pub type TdResult<T> = Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Inval(msg) => write!(f, "invalid argument: {}", msg),
            Error::Perm(msg) => write!(f, "operation not permitted: {}", msg),
            Error::Flag(msg) => write!(f, "unsupported flag combination: {}", msg),
            Error::Name(msg) => write!(f, "invalid name: {}", msg),
            Error::Type(msg) => write!(f, "type mismatch: {}", msg),
            Error::Value(msg) => write!(f, "invalid value: {}", msg),
            Error::DataLenMismatch { expected, found } => {
                write!(f, "data length mismatch: expected {}, found {}", expected, found)
            }
            Error::KeyExist => write!(f, "key already exists"),
            Error::NotFound => write!(f, "not found"),
            Error::NoData => write!(f, "no data"),
            Error::Cursor(msg) => write!(f, "cursor error: {}", msg),
            Error::ColumnMissing(name) => write!(f, "column missing: {}", name),
            Error::IndexCorrupted(msg) => write!(f, "index corrupted: {}", msg),
            Error::SimilarIndex(msg) => write!(f, "similar index already exists: {}", msg),
            Error::SchemaCorrupted(msg) => write!(f, "schema corrupted: {}", msg),
            Error::SchemaChanged => write!(f, "schema changed since handle was opened"),
            Error::TxnCancelled => write!(f, "transaction already ended"),
            Error::TardyDbi => write!(f, "cached handle is stale for this schema generation"),
            Error::RowMismatch => write!(f, "row does not match table schema"),
            Error::NoMem => write!(f, "out of memory"),
            Error::NoImp(what) => write!(f, "not implemented: {}", what),
            Error::WannaDie(msg) => write!(f, "fatal internal error, aborting transaction: {}", msg),
            Error::Engine(msg) => write!(f, "storage engine error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Error::Engine(err.to_string())
    }
}

impl From<sled::transaction::TransactionError<()>> for Error {
    fn from(err: sled::transaction::TransactionError<()>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(()) => {
                Error::Engine("transaction aborted".to_string())
            }
            sled::transaction::TransactionError::Storage(e) => Error::Engine(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_payload() {
        let err = Error::ColumnMissing("age".to_string());
        assert_eq!(err.to_string(), "column missing: age");
    }

    #[test]
    fn engine_error_wraps_sled() {
        let sled_err = sled::Error::Unsupported("boom".to_string());
        let err: Error = sled_err.into();
        assert!(matches!(err, Error::Engine(_)));
    }
}
