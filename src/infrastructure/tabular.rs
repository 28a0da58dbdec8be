//! Tabular persistence: the `TableStore` seam and its CSV implementation.
//!
//! Files are UTF-8 with a BOM so spreadsheet tools open Vietnamese text
//! correctly. A write replaces the whole file through a temp file + rename.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::domain::Row;
use crate::domain::record::column_union;

const UTF8_BOM: &str = "\u{feff}";

/// Rows read back from an artifact
#[derive(Debug, Clone, Default)]
pub struct LoadedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

pub trait TableStore: Send + Sync {
    /// `Ok(None)` when the file does not exist
    fn load_rows(&self, path: &Path) -> Result<Option<LoadedTable>>;

    /// Replaces the file with `rows`; columns are the union of row keys
    fn write_rows(&self, rows: &[Row], path: &Path) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct CsvTableStore {
    delimiter: u8,
}

impl Default for CsvTableStore {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl CsvTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        path.with_file_name(name)
    }

    fn write_to(&self, rows: &[Row], columns: &[String], target: &Path) -> Result<()> {
        let file = File::create(target)
            .with_context(|| format!("Failed to create {}", target.display()))?;
        let mut buffered = BufWriter::new(file);
        buffered.write_all(UTF8_BOM.as_bytes())?;

        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(buffered);
        writer.write_record(columns)?;
        for row in rows {
            writer.write_record(
                columns
                    .iter()
                    .map(|column| row.get(column).map_or("", String::as_str)),
            )?;
        }
        writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush {}: {}", target.display(), e.error()))?
            .flush()?;
        Ok(())
    }
}

impl TableStore for CsvTableStore {
    fn load_rows(&self, path: &Path) -> Result<Option<LoadedTable>> {
        if !path.exists() {
            return Ok(None);
        }
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let h = if i == 0 { h.trim_start_matches(UTF8_BOM) } else { h };
                h.to_string()
            })
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.with_context(|| format!("Malformed row in {}", path.display()))?;
            let row: Row = columns
                .iter()
                .zip(record.iter())
                .map(|(column, value)| (column.clone(), value.to_string()))
                .collect();
            rows.push(row);
        }
        debug!("Loaded {} rows from {}", rows.len(), path.display());
        Ok(Some(LoadedTable { columns, rows }))
    }

    fn write_rows(&self, rows: &[Row], path: &Path) -> Result<()> {
        let columns = column_union(rows);
        let temp = Self::temp_path(path);
        if let Err(err) = self.write_to(rows, &columns, &temp) {
            let _ = std::fs::remove_file(&temp);
            return Err(err);
        }
        if let Err(err) = std::fs::rename(&temp, path) {
            let _ = std::fs::remove_file(&temp);
            return Err(err).with_context(|| format!("Failed to replace {}", path.display()));
        }
        debug!("Wrote {} rows x {} columns to {}", rows.len(), columns.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvTableStore::new();
        assert!(store.load_rows(&dir.path().join("absent.csv")).unwrap().is_none());
    }

    #[test]
    fn ragged_rows_share_the_column_union() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let store = CsvTableStore::new();

        store
            .write_rows(
                &[
                    row(&[("Entity Name", "Công ty A"), ("Mã định danh", "001")]),
                    row(&[("Entity Name", "Công ty B, chi nhánh"), ("Địa chỉ", "Huế")]),
                ],
                &path,
            )
            .unwrap();

        let table = store.load_rows(&path).unwrap().unwrap();
        assert_eq!(table.columns, vec!["Entity Name", "Mã định danh", "Địa chỉ"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1]["Entity Name"], "Công ty B, chi nhánh");
        assert_eq!(table.rows[1]["Mã định danh"], "");
        assert!(!CsvTableStore::temp_path(&path).exists());
    }
}
