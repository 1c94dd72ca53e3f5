//! In-memory reference store.

use parking_lot::RwLock;

use goldval_core::{ReferenceStore, StoreError, StoreHandle, StoreKey};

use crate::table::TableSet;

/// Reference store living for the process; used by tests and single-run sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<TableSet>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows stored under `handle`.
    pub fn row_count(&self, handle: StoreHandle) -> Result<usize, StoreError> {
        Ok(self.tables.read().table(handle)?.rows.len())
    }

    /// Overwrite one value of a stored row, for simulating content drift.
    pub fn poke(
        &self,
        handle: StoreHandle,
        row: u32,
        index: usize,
        value: u32,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let table = tables
            .tables
            .get_mut(handle.0 as usize)
            .ok_or(StoreError::UnknownHandle(handle.0))?;
        let record = table
            .rows
            .get_mut(&row)
            .ok_or(StoreError::NotFound { row })?;
        let slot = record.get_mut(index).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "index {index} is beyond the record length {}",
                table.key.record_len
            ))
        })?;
        *slot = value;
        Ok(())
    }
}

impl ReferenceStore for MemoryStore {
    fn open_handle(&self, key: &StoreKey) -> Result<StoreHandle, StoreError> {
        Ok(self.tables.write().open(key))
    }

    fn get(&self, handle: StoreHandle, row: u32) -> Result<Vec<u32>, StoreError> {
        self.tables.read().get(handle, row)
    }

    fn put(
        &self,
        handle: StoreHandle,
        row: u32,
        record: &[u32],
        marked_only: bool,
    ) -> Result<(), StoreError> {
        self.tables
            .write()
            .put(handle, row, record, marked_only)
            .map(|_| ())
    }

    fn compare_to_row(
        &self,
        handle: StoreHandle,
        row: u32,
        record: &[u32],
    ) -> Result<bool, StoreError> {
        self.tables.read().compare_to_row(handle, row, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> StoreKey {
        StoreKey {
            test_name: "scene".to_string(),
            config_name: "default".to_string(),
            algorithm_mask: 3,
            record_len: 3,
        }
    }

    #[test]
    fn put_get_compare() {
        let store = MemoryStore::new();
        let handle = store.open_handle(&key()).unwrap();
        assert_eq!(
            store.get(handle, 0),
            Err(StoreError::NotFound { row: 0 })
        );
        store.put(handle, 0, &[1, 2, 3], false).unwrap();
        assert_eq!(store.get(handle, 0).unwrap(), vec![1, 2, 3]);
        assert!(store.compare_to_row(handle, 0, &[1, 2, 3]).unwrap());
        assert!(!store.compare_to_row(handle, 0, &[1, 2, 4]).unwrap());
        assert_eq!(store.row_count(handle).unwrap(), 1);
    }

    #[test]
    fn poke_changes_one_value() {
        let store = MemoryStore::new();
        let handle = store.open_handle(&key()).unwrap();
        store.put(handle, 2, &[1, 2, 3], false).unwrap();
        store.poke(handle, 2, 1, 9).unwrap();
        assert_eq!(store.get(handle, 2).unwrap(), vec![1, 9, 3]);
        assert!(store.poke(handle, 2, 3, 0).is_err());
        assert!(store.poke(handle, 5, 0, 0).is_err());
    }

    #[test]
    fn shared_across_threads() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let handle = store.open_handle(&key()).unwrap();
        let workers: Vec<_> = (0..4u32)
            .map(|row| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || store.put(handle, row, &[row, row, row], false))
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker joins").expect("put succeeds");
        }
        assert_eq!(store.row_count(handle).unwrap(), 4);
    }
}
