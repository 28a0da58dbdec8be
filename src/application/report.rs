//! Counters returned to the caller of a run.

use std::ops::AddAssign;
use std::path::PathBuf;

use serde::Serialize;

use crate::domain::HarvestMode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HarvestStats {
    pub pages: u32,
    pub collected: usize,
    pub skipped: usize,
    pub abandoned: usize,
    pub failed_flushes: usize,
}

impl AddAssign for HarvestStats {
    fn add_assign(&mut self, other: Self) {
        self.pages += other.pages;
        self.collected += other.collected;
        self.skipped += other.skipped;
        self.abandoned += other.abandoned;
        self.failed_flushes += other.failed_flushes;
    }
}

/// Rows held by one artifact at the end of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    pub path: PathBuf,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: uuid::Uuid,
    pub mode: HarvestMode,
    pub output: PathBuf,
    pub seeded_rows: usize,
    pub total_rows: usize,
    pub stats: HarvestStats,
    /// Secondary artifacts of the contractor-selection join
    pub artifacts: Vec<ArtifactSummary>,
    pub cancelled: bool,
    pub started_at: chrono::DateTime<chrono::Local>,
    pub finished_at: chrono::DateTime<chrono::Local>,
}

impl RunReport {
    pub fn new_rows(&self) -> usize {
        self.total_rows.saturating_sub(self.seeded_rows)
    }
}
