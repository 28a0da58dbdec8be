//! Rebuilds run state from the previously written artifact.

use std::path::Path;

use tracing::{info, warn};

use crate::domain::{AccumulatedRowSet, ProcessedIndex, Row, select_identifier_column};
use crate::infrastructure::TableStore;

/// Rows and identifiers carried by one artifact during a run
#[derive(Debug, Default)]
pub struct HarvestState {
    pub index: ProcessedIndex,
    pub rows: AccumulatedRowSet,
    /// Column the index was built from, if the artifact had one
    pub identifier_column: Option<String>,
}

impl HarvestState {
    pub fn seeded_rows(&self) -> usize {
        self.rows.len()
    }

    /// Appends `row` and marks `id` processed
    pub fn record(&mut self, id: &str, row: Row) {
        self.index.insert(id);
        self.rows.push(row);
    }

    /// Appends rows that belong to an item identified elsewhere
    pub fn extend_rows(&mut self, rows: impl IntoIterator<Item = Row>) {
        for row in rows {
            self.rows.push(row);
        }
    }
}

pub struct CheckpointStore<'a> {
    store: &'a dyn TableStore,
}

impl<'a> CheckpointStore<'a> {
    pub fn new(store: &'a dyn TableStore) -> Self {
        Self { store }
    }

    /// Missing or unreadable files yield an empty state; never fatal.
    pub fn load(&self, path: &Path, candidates: &[String], display_column: &str) -> HarvestState {
        let table = match self.store.load_rows(path) {
            Ok(Some(table)) => table,
            Ok(None) => return HarvestState::default(),
            Err(e) => {
                warn!("Could not read existing file {} ({:#}); starting fresh", path.display(), e);
                return HarvestState::default();
            }
        };

        let identifier_column = select_identifier_column(&table.columns, candidates, display_column);
        let mut index = identifier_column
            .as_deref()
            .map(|column| ProcessedIndex::from_rows(&table.rows, column))
            .unwrap_or_default();
        // listings without ids are looked up by title
        if identifier_column.as_deref() != Some(display_column) {
            index.extend_from_rows(&table.rows, display_column);
        }

        info!(
            "Loaded {} rows from {}; {} identifiers via {:?}",
            table.rows.len(),
            path.display(),
            index.len(),
            identifier_column
        );
        HarvestState {
            index,
            rows: AccumulatedRowSet::from_rows(table.rows),
            identifier_column,
        }
    }
}
