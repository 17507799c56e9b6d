//! # Storage Module
//!
//! Durable persistence for diagnostics and context, backed by redb.
//!
//! Uses the redb embedded database for:
//! - ACID transactions (every mutation commits before the call returns)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Records are encoded with postcard. A stored value that fails to decode
//! surfaces as [`StoreError::Corrupt`] for that call, never as "not found".

mod redb_store;

pub use redb_store::Store;

use thiserror::Error;

/// Errors surfaced by the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A solution was recorded against a fingerprint with no error record.
    #[error("unknown fingerprint '{0}'")]
    UnknownFingerprint(String),

    /// A stored value exists but cannot be decoded.
    #[error("corrupt record at '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: postcard::Error,
    },

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
}

impl StoreError {
    pub(crate) fn corrupt(key: impl Into<String>, source: postcard::Error) -> Self {
        Self::Corrupt {
            key: key.into(),
            source,
        }
    }
}
