//! Domain module - records, identifiers and value rendering
//!
//! Pure data types with no I/O:
//! - `record`: listing entries, detail records, accumulated rows
//! - `processed_index`: identifiers already harvested
//! - `task`: harvest mode, task queue, date window
//! - `notice`: typed records of the contractor-selection join
//! - `lookups` / `formatting`: code tables and cell rendering

pub mod error;
pub mod formatting;
pub mod lookups;
pub mod notice;
pub mod processed_index;
pub mod record;
pub mod task;

pub use error::{HarvestError, HarvestResult};
pub use notice::{
    AwardOutcome, ContractorResultRow, GoodsLineRow, JoinKeys, LotRow, NoticeDetail, NoticeSummary,
    json_text, json_text_any,
};
pub use processed_index::{ProcessedIndex, select_identifier_column};
pub use record::{AccumulatedRowSet, CatalogItem, DetailRecord, ENTITY_NAME, Row};
pub use task::{DateRange, HarvestMode, PipelineTask};
