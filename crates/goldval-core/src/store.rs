//! Reference store interface.
//!
//! A store keeps historical records per key (test, configuration, algorithm mask, record
//! length) and row index. Implementations live in `goldval-store`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no record stored for row {row}")]
    NotFound { row: u32 },
    #[error("unknown store handle {0}")]
    UnknownHandle(u64),
    #[error("record length {actual} does not match the handle's record length {expected}")]
    LengthMismatch { expected: u32, actual: u32 },
    #[error("io: {0}")]
    Io(String),
    #[error("corrupt store data: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Identity of one family of records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreKey {
    pub test_name: String,
    pub config_name: String,
    pub algorithm_mask: u32,
    pub record_len: u32,
}

/// Opaque handle returned by [`ReferenceStore::open_handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreHandle(pub u64);

/// Persistent store of reference records.
///
/// Methods take `&self`; implementations synchronize internally.
pub trait ReferenceStore {
    fn open_handle(&self, key: &StoreKey) -> Result<StoreHandle, StoreError>;

    fn get(&self, handle: StoreHandle, row: u32) -> Result<Vec<u32>, StoreError>;

    /// Write `record` at `row`. With `marked_only`, a row that already holds a record is
    /// left untouched.
    fn put(
        &self,
        handle: StoreHandle,
        row: u32,
        record: &[u32],
        marked_only: bool,
    ) -> Result<(), StoreError>;

    /// Whether the record stored at `row` equals `record`.
    fn compare_to_row(
        &self,
        handle: StoreHandle,
        row: u32,
        record: &[u32],
    ) -> Result<bool, StoreError>;
}
