//! Row-level data model: listing entries, detail records and the
//! accumulated row set that is flushed as a full snapshot.

use indexmap::IndexMap;
use indexmap::IndexSet;

/// One flat output row, label → value in insertion order
pub type Row = IndexMap<String, String>;

/// Synthesized title column present in every detail record
pub const ENTITY_NAME: &str = "Entity Name";

/// Placeholder stored when no title could be recovered at all
pub const UNKNOWN_TITLE: &str = "Unknown";

/// Entry seen on a listing page before its detail view is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    /// Zero-based position on the current page
    pub position: usize,
    pub list_id: Option<String>,
    pub title: String,
}

impl CatalogItem {
    pub fn new(position: usize, list_id: Option<String>, title: impl Into<String>) -> Self {
        Self {
            position,
            list_id: list_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
            title: title.into().trim().to_string(),
        }
    }

    /// Listing identifier, else the display title
    pub fn item_id(&self) -> Option<String> {
        self.list_id
            .clone()
            .or_else(|| (!self.title.is_empty()).then(|| self.title.clone()))
    }
}

/// Label → value mapping built by the extraction cascade
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailRecord {
    fields: Row,
}

impl DetailRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_row(fields: Row) -> Self {
        Self { fields }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.fields.get(label).map(String::as_str)
    }

    pub fn is_blank(&self, label: &str) -> bool {
        self.get(label).is_none_or(|v| v.trim().is_empty())
    }

    /// Overwrites any previous value
    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(label.into(), value.into());
    }

    /// Sets `label` only when it is missing or blank; returns whether it was written
    pub fn fill(&mut self, label: &str, value: &str) -> bool {
        let value = value.trim();
        if label.trim().is_empty() || value.is_empty() || !self.is_blank(label) {
            return false;
        }
        self.fields.insert(label.trim().to_string(), value.to_string());
        true
    }

    pub fn title(&self) -> Option<&str> {
        self.get(ENTITY_NAME)
            .filter(|t| !t.trim().is_empty() && *t != UNKNOWN_TITLE)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_row(self) -> Row {
        self.fields
    }
}

/// Ordered rows seeded from the checkpoint and appended monotonically
#[derive(Debug, Clone, Default)]
pub struct AccumulatedRowSet {
    rows: Vec<Row>,
}

impl AccumulatedRowSet {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Union of every row's keys in first-seen order
    pub fn columns(&self) -> Vec<String> {
        column_union(&self.rows)
    }
}

pub fn column_union(rows: &[Row]) -> Vec<String> {
    let mut seen: IndexSet<&str> = IndexSet::new();
    for row in rows {
        for key in row.keys() {
            seen.insert(key.as_str());
        }
    }
    seen.into_iter().map(str::to_string).collect()
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
    fn item_id_prefers_listing_identifier() {
        let with_id = CatalogItem::new(0, Some(" CDT-01 ".into()), "Alpha");
        let without = CatalogItem::new(1, Some("   ".into()), "Beta");
        let neither = CatalogItem::new(2, None, "  ");

        assert_eq!(with_id.item_id().as_deref(), Some("CDT-01"));
        assert_eq!(without.item_id().as_deref(), Some("Beta"));
        assert_eq!(neither.item_id(), None);
    }

    #[test]
    fn fill_never_overwrites_a_populated_field() {
        let mut record = DetailRecord::new();
        assert!(record.fill("Địa chỉ", "Hà Nội"));
        assert!(!record.fill("Địa chỉ", "Đà Nẵng"));
        record.insert("Email", "");
        assert!(record.fill("Email", "a@b.vn"));
        assert_eq!(record.get("Địa chỉ"), Some("Hà Nội"));
        assert_eq!(record.get("Email"), Some("a@b.vn"));
    }

    #[test]
    fn unknown_placeholder_is_not_a_title() {
        let mut record = DetailRecord::new();
        record.insert(ENTITY_NAME, UNKNOWN_TITLE);
        assert_eq!(record.title(), None);
    }

    #[test]
    fn columns_are_unioned_in_first_seen_order() {
        let set = AccumulatedRowSet::from_rows(vec![
            row(&[("a", "1"), ("b", "2")]),
            row(&[("c", "3"), ("a", "4")]),
            row(&[("d", "5")]),
        ]);
        assert_eq!(set.columns(), vec!["a", "b", "c", "d"]);
    }
}
