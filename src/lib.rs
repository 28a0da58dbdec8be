//! eps-harvest - resumable harvester for the VN e-procurement registry
//!
//! Collects approved-investor and drug-price records from the portal's
//! rendered registries and joins contractor-selection notices from its JSON
//! API into flat CSV artifacts. Runs can be paused, resumed, cancelled and
//! restarted without duplicating rows.

// Module declarations
pub mod domain;
pub mod application;
pub mod infrastructure;

pub use application::{
    Collaborators, ControlHandle, ControlSignal, HarvestOptions, RunReport, control_pair, start,
};
pub use domain::{DateRange, HarvestError, HarvestMode, HarvestResult, PipelineTask};
