//! Infrastructure layer for configuration, logging, persistence and the
//! external seams (page automation, JSON API, liveness probe).

pub mod api_client;
pub mod automation;
#[cfg(feature = "browser")]
pub mod browser;
pub mod config;
pub mod logging;
pub mod tabular;

pub use api_client::{ApiClient, ApiClientConfig};
pub use automation::{CapturedRequest, JsonApi, LivenessProbe, PageAutomation, PageProbe};
#[cfg(feature = "browser")]
pub use browser::ChromeSurface;
pub use config::{AppConfig, ConfigError, load_config};
pub use logging::init_logging_with_config;
pub use tabular::{CsvTableStore, LoadedTable, TableStore};
