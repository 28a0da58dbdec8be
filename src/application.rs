//! Application layer - the harvesting pipeline
//!
//! Run-level plumbing (control, connectivity, retry, context), the generic
//! traversal and resolution steps, and the two mode drivers built on them:
//! `registry` for the rendered UI registries and `contractor_selection` for
//! the four-phase API join. `pipeline::start` is the entry point.

pub mod checkpoint;
pub mod connectivity;
pub mod context;
pub mod contractor_selection;
pub mod control;
pub mod extraction;
pub mod paginator;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod retry;
pub mod sink;

pub use control::{ControlHandle, ControlSignal, control_pair};
pub use pipeline::{Collaborators, HarvestOptions, resolve_output, start};
pub use progress::{ChannelProgress, ProgressSink, RecordingProgress, TracingProgress};
pub use report::{ArtifactSummary, HarvestStats, RunReport};
