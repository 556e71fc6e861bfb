//! Error types for the persistence layer.

use packgate_protocol::ProtocolError;

/// Errors from reading or writing acceptance records.
///
/// redb splits its failures into one type per stage (open, begin,
/// table, storage, commit); each gets a variant with `#[from]` so the
/// store code can just use `?`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database file couldn't be created or opened.
    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// A stored record couldn't be encoded or decoded.
    #[error("record codec error: {0}")]
    Codec(#[from] ProtocolError),

    /// The data directory couldn't be created.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
