//! JSON file-backed reference store.
//!
//! The whole store is one JSON document. Every table carries the SHA-256 digest of its
//! key and every row the BLAKE3 digest of its values; both are checked on load. Writes go
//! through to disk before `put` returns, and a failed write leaves the store as it was.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use goldval_core::{ReferenceStore, StoreError, StoreHandle, StoreKey};

use crate::digest::{key_digest, row_digest};
use crate::table::{Table, TableSet, TableSummary};

/// On-disk format version.
pub const FILE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    tables: Vec<TableFile>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TableFile {
    key: StoreKey,
    key_digest: String,
    rows: Vec<RowFile>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RowFile {
    row: u32,
    values: Vec<u32>,
    digest: String,
}

impl StoreFile {
    fn from_tables(tables: &TableSet) -> Self {
        Self {
            version: FILE_FORMAT_VERSION,
            tables: tables
                .tables
                .iter()
                .map(|table| TableFile {
                    key: table.key.clone(),
                    key_digest: key_digest(&table.key),
                    rows: table
                        .rows
                        .iter()
                        .map(|(&row, values)| RowFile {
                            row,
                            values: values.clone(),
                            digest: row_digest(values),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    fn into_tables(self) -> Result<TableSet, StoreError> {
        if self.version != FILE_FORMAT_VERSION {
            return Err(StoreError::Corrupt(format!(
                "unsupported store version {}",
                self.version
            )));
        }
        let mut tables = Vec::with_capacity(self.tables.len());
        for table in self.tables {
            if table.key_digest != key_digest(&table.key) {
                return Err(StoreError::Corrupt(format!(
                    "key digest mismatch for test '{}'",
                    table.key.test_name
                )));
            }
            let mut rows = std::collections::BTreeMap::new();
            for row in table.rows {
                if row.values.len() != table.key.record_len as usize {
                    return Err(StoreError::Corrupt(format!(
                        "row {} holds {} values, key expects {}",
                        row.row,
                        row.values.len(),
                        table.key.record_len
                    )));
                }
                if row.digest != row_digest(&row.values) {
                    return Err(StoreError::Corrupt(format!(
                        "row {} of test '{}' fails its digest",
                        row.row, table.key.test_name
                    )));
                }
                rows.insert(row.row, row.values);
            }
            tables.push(Table {
                key: table.key,
                rows,
            });
        }
        Ok(TableSet::from_tables(tables))
    }
}

/// Reference store persisted to a JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    tables: RwLock<TableSet>,
}

impl FileStore {
    /// Open `path`, loading and verifying it when it exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let tables = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let file: StoreFile = serde_json::from_str(&content)
                .map_err(|err| StoreError::Corrupt(format!("{}: {err}", path.display())))?;
            file.into_tables()?
        } else {
            TableSet::default()
        };
        Ok(Self {
            path,
            tables: RwLock::new(tables),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Tables in handle order.
    #[must_use]
    pub fn tables(&self) -> Vec<TableSummary> {
        self.tables.read().summaries()
    }

    fn save(&self, tables: &TableSet) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&StoreFile::from_tables(tables))
            .map_err(|err| StoreError::Io(err.to_string()))?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, json)?;
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

impl ReferenceStore for FileStore {
    fn open_handle(&self, key: &StoreKey) -> Result<StoreHandle, StoreError> {
        let mut tables = self.tables.write();
        let mut staged = tables.clone();
        let handle = staged.open(key);
        if staged.tables.len() != tables.tables.len() {
            self.save(&staged)?;
            *tables = staged;
        }
        Ok(handle)
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
        let mut tables = self.tables.write();
        let mut staged = tables.clone();
        if staged.put(handle, row, record, marked_only)? {
            self.save(&staged)?;
            *tables = staged;
        }
        Ok(())
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

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "goldval-store-{}-{name}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        dir.join("golden.json")
    }

    fn key() -> StoreKey {
        StoreKey {
            test_name: "scene".to_string(),
            config_name: "default".to_string(),
            algorithm_mask: 3,
            record_len: 2,
        }
    }

    #[test]
    fn rows_survive_reopen() {
        let path = scratch("reopen");
        {
            let store = FileStore::open(&path).expect("open new store");
            let handle = store.open_handle(&key()).unwrap();
            store.put(handle, 0, &[10, 20], false).unwrap();
            store.put(handle, 1, &[11, 21], false).unwrap();
        }
        let store = FileStore::open(&path).expect("reopen store");
        let handle = store.open_handle(&key()).unwrap();
        assert_eq!(store.get(handle, 1).unwrap(), vec![11, 21]);
        assert!(store.compare_to_row(handle, 0, &[10, 20]).unwrap());
    }

    #[test]
    fn tampered_row_is_corrupt() {
        let path = scratch("tamper");
        {
            let store = FileStore::open(&path).expect("open new store");
            let handle = store.open_handle(&key()).unwrap();
            store.put(handle, 0, &[10, 20], false).unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let mut doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        doc["tables"][0]["rows"][0]["values"][1] = serde_json::json!(99);
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

        let err = FileStore::open(&path).expect_err("digest mismatch");
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn failed_save_leaves_tables_unchanged() {
        let blocker = scratch("blocked").with_file_name("not-a-dir");
        std::fs::write(&blocker, b"file").expect("write blocker");
        let store = FileStore::open(blocker.join("golden.json")).expect("open never touches disk");

        assert!(matches!(store.open_handle(&key()), Err(StoreError::Io(_))));
        assert!(store.tables().is_empty());
        assert!(matches!(store.open_handle(&key()), Err(StoreError::Io(_))));

        let handle = StoreHandle(0);
        assert_eq!(
            store.put(handle, 0, &[7, 8], false),
            Err(StoreError::UnknownHandle(0))
        );
        assert_eq!(store.get(handle, 0), Err(StoreError::UnknownHandle(0)));
    }

    #[test]
    fn failed_put_is_not_visible() {
        let path = scratch("vanishing");
        let store = FileStore::open(&path).expect("open new store");
        let handle = store.open_handle(&key()).unwrap();
        store.put(handle, 0, &[10, 20], false).unwrap();

        // Replace the parent directory with a file so the next save fails.
        let parent = path.parent().unwrap().to_path_buf();
        std::fs::remove_dir_all(&parent).unwrap();
        std::fs::write(&parent, b"file").unwrap();

        assert!(matches!(
            store.put(handle, 1, &[11, 21], false),
            Err(StoreError::Io(_))
        ));
        assert_eq!(store.get(handle, 1), Err(StoreError::NotFound { row: 1 }));
        assert!(!store.compare_to_row(handle, 1, &[11, 21]).unwrap_or(false));
        assert_eq!(store.get(handle, 0).unwrap(), vec![10, 20]);
        std::fs::remove_file(&parent).unwrap();
    }

    #[test]
    fn garbage_file_is_corrupt() {
        let path = scratch("garbage");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            FileStore::open(&path),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn marked_only_does_not_rewrite() {
        let path = scratch("marked");
        let store = FileStore::open(&path).expect("open new store");
        let handle = store.open_handle(&key()).unwrap();
        store.put(handle, 0, &[1, 2], true).unwrap();
        store.put(handle, 0, &[3, 4], true).unwrap();
        let reopened = FileStore::open(&path).expect("reopen");
        let handle = reopened.open_handle(&key()).unwrap();
        assert_eq!(reopened.get(handle, 0).unwrap(), vec![1, 2]);
    }
}
