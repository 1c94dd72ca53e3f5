//! Keyed tables of reference rows shared by the store implementations.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use goldval_core::{StoreError, StoreHandle, StoreKey};

/// Overview of one stored table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub key: StoreKey,
    pub rows: usize,
    pub first_row: Option<u32>,
    pub last_row: Option<u32>,
}

/// Rows recorded under one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Table {
    pub(crate) key: StoreKey,
    pub(crate) rows: BTreeMap<u32, Vec<u32>>,
}

/// All tables of a store; a handle is the table's position.
#[derive(Debug, Default, Clone)]
pub(crate) struct TableSet {
    pub(crate) tables: Vec<Table>,
    by_key: HashMap<StoreKey, u64>,
}

impl TableSet {
    pub(crate) fn from_tables(tables: Vec<Table>) -> Self {
        let by_key = (0u64..)
            .zip(&tables)
            .map(|(handle, table)| (table.key.clone(), handle))
            .collect();
        Self { tables, by_key }
    }

    pub(crate) fn open(&mut self, key: &StoreKey) -> StoreHandle {
        if let Some(&handle) = self.by_key.get(key) {
            return StoreHandle(handle);
        }
        let handle = self.tables.len() as u64;
        self.tables.push(Table {
            key: key.clone(),
            rows: BTreeMap::new(),
        });
        self.by_key.insert(key.clone(), handle);
        StoreHandle(handle)
    }

    pub(crate) fn summaries(&self) -> Vec<TableSummary> {
        self.tables
            .iter()
            .map(|table| TableSummary {
                key: table.key.clone(),
                rows: table.rows.len(),
                first_row: table.rows.keys().next().copied(),
                last_row: table.rows.keys().next_back().copied(),
            })
            .collect()
    }

    pub(crate) fn table(&self, handle: StoreHandle) -> Result<&Table, StoreError> {
        self.tables
            .get(handle.0 as usize)
            .ok_or(StoreError::UnknownHandle(handle.0))
    }

    pub(crate) fn get(&self, handle: StoreHandle, row: u32) -> Result<Vec<u32>, StoreError> {
        self.table(handle)?
            .rows
            .get(&row)
            .cloned()
            .ok_or(StoreError::NotFound { row })
    }

    /// Returns whether the row was written.
    pub(crate) fn put(
        &mut self,
        handle: StoreHandle,
        row: u32,
        record: &[u32],
        marked_only: bool,
    ) -> Result<bool, StoreError> {
        let table = self
            .tables
            .get_mut(handle.0 as usize)
            .ok_or(StoreError::UnknownHandle(handle.0))?;
        if record.len() != table.key.record_len as usize {
            return Err(StoreError::LengthMismatch {
                expected: table.key.record_len,
                actual: record.len() as u32,
            });
        }
        if marked_only && table.rows.contains_key(&row) {
            return Ok(false);
        }
        table.rows.insert(row, record.to_vec());
        Ok(true)
    }

    pub(crate) fn compare_to_row(
        &self,
        handle: StoreHandle,
        row: u32,
        record: &[u32],
    ) -> Result<bool, StoreError> {
        let table = self.table(handle)?;
        let stored = table.rows.get(&row).ok_or(StoreError::NotFound { row })?;
        Ok(stored.as_slice() == record)
    }
}
