//! Persistent backing table for the collection.
//!
//! The collection keeps its rows in memory and mirrors every change to a
//! [`BookStore`]. A store is keyed by book path: `upsert` replaces the row
//! with the same path, `delete` removes it.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::collection::CollectionEntry;
use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Store trait: any backing table implements this
// ---------------------------------------------------------------------------

pub trait BookStore {
    /// Create the table if it does not exist yet. Idempotent.
    fn ensure_schema(&mut self) -> Result<(), StoreError>;

    /// Every stored row, in insertion order.
    fn load_all(&self) -> Result<Vec<CollectionEntry>, StoreError>;

    fn upsert(&mut self, entry: &CollectionEntry) -> Result<(), StoreError>;

    /// Remove the row for `path`. Deleting an unknown path is not an error.
    fn delete(&mut self, path: &Path) -> Result<(), StoreError>;
}

fn upsert_row(rows: &mut Vec<CollectionEntry>, entry: &CollectionEntry) {
    match rows.iter_mut().find(|row| row.path == entry.path) {
        Some(row) => *row = entry.clone(),
        None => rows.push(entry.clone()),
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Store that lives only as long as the value. Useful for tests and for
/// running without a writable cache directory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rows: Vec<CollectionEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BookStore for MemoryStore {
    fn ensure_schema(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<CollectionEntry>, StoreError> {
        Ok(self.rows.clone())
    }

    fn upsert(&mut self, entry: &CollectionEntry) -> Result<(), StoreError> {
        upsert_row(&mut self.rows, entry);
        Ok(())
    }

    fn delete(&mut self, path: &Path) -> Result<(), StoreError> {
        self.rows.retain(|row| row.path != path);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON table file
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct Table {
    #[serde(default)]
    books: Vec<CollectionEntry>,
}

/// Single JSON file holding `{"books": [...]}`.
///
/// Every write replaces the whole file through a sibling temp file and a
/// rename, so a reader never sees a half-written table.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_table(&self) -> Result<Table, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Table::default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text).map_err(|source| StoreError::Json {
            path: self.path.display().to_string(),
            source,
        })
    }

    fn write_table(&self, table: &Table) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(table).map_err(|source| StoreError::Json {
            path: self.path.display().to_string(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        let result = (|| {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result.map_err(StoreError::from)
    }
}

impl BookStore for JsonStore {
    fn ensure_schema(&mut self) -> Result<(), StoreError> {
        if self.path.exists() {
            return Ok(());
        }
        tracing::debug!("Creating collection table {}", self.path.display());
        self.write_table(&Table::default())
    }

    fn load_all(&self) -> Result<Vec<CollectionEntry>, StoreError> {
        Ok(self.read_table()?.books)
    }

    fn upsert(&mut self, entry: &CollectionEntry) -> Result<(), StoreError> {
        let mut table = self.read_table()?;
        upsert_row(&mut table.books, entry);
        self.write_table(&table)
    }

    fn delete(&mut self, path: &Path) -> Result<(), StoreError> {
        let mut table = self.read_table()?;
        let before = table.books.len();
        table.books.retain(|row| row.path != path);
        if table.books.len() == before {
            return Ok(());
        }
        self.write_table(&table)
    }
}
