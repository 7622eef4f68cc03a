//! Store errors.

use thiserror::Error;

use tether_core::{CoreError, ErrorClass};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Database(#[from] rusqlite::Error),

    /// A snapshot or permission set could not be encoded or decoded.
    #[error("cbor: {0}")]
    Serialization(String),

    /// A stored record decoded but failed validation.
    #[error("invalid stored record: {0}")]
    InvalidData(String),

    #[error("schema: {0}")]
    Migration(String),

    /// The blocking worker running a query panicked or was cancelled.
    #[error("store worker: {0}")]
    Task(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StoreError {
    /// Every store failure is a storage failure to callers.
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Storage
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
