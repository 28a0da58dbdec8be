//! Set of identifiers already present in the output artifact.

use std::collections::HashSet;

use super::record::Row;

#[derive(Debug, Clone, Default)]
pub struct ProcessedIndex {
    ids: HashSet<String>,
}

impl ProcessedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the index from the values of `column`; blank identifiers are dropped
    pub fn from_rows(rows: &[Row], column: &str) -> Self {
        let mut index = Self::new();
        index.extend_from_rows(rows, column);
        index
    }

    pub fn extend_from_rows(&mut self, rows: &[Row], column: &str) {
        for value in rows.iter().filter_map(|row| row.get(column)) {
            self.insert(value);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id.trim())
    }

    /// Returns `false` for blank identifiers and for ones already present
    pub fn insert(&mut self, id: &str) -> bool {
        let id = id.trim();
        if id.is_empty() {
            return false;
        }
        self.ids.insert(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Picks the first candidate present in `columns`, else the display column
/// when present.
pub fn select_identifier_column(
    columns: &[String],
    candidates: &[String],
    display_column: &str,
) -> Option<String> {
    candidates
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(display_column))
        .find(|candidate| columns.iter().any(|c| c == candidate))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[rstest]
    #[case(&["Entity Name", "Mã định danh"], Some("Mã định danh"))]
    #[case(&["Entity Name", "Địa chỉ"], Some("Entity Name"))]
    #[case(&["Địa chỉ"], None)]
    fn identifier_column_follows_preference_order(
        #[case] columns: &[&str],
        #[case] expected: Option<&str>,
    ) {
        let candidates = cols(&["Mã định danh", "Mã số thuế"]);
        let chosen = select_identifier_column(&cols(columns), &candidates, "Entity Name");
        assert_eq!(chosen.as_deref(), expected);
    }

    #[test]
    fn blank_and_padded_identifiers() {
        let mut index = ProcessedIndex::new();
        assert!(index.insert("  X1 "));
        assert!(!index.insert("X1"));
        assert!(!index.insert("   "));
        assert!(index.contains(" X1"));
        assert_eq!(index.len(), 1);
    }
}
