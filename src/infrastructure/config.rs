//! Configuration infrastructure
//!
//! Settings are layered with the `config` crate:
//! 1. Built-in defaults (`defaults` constants, `Default` impls)
//! 2. Optional file passed with `--config` (TOML / JSON / YAML by extension)
//! 3. Environment overrides, e.g. `EPS_HARVEST_PACING__ITEM_DELAY_MIN_MS=0`
//!
//! The merged result is validated before any run starts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::domain::HarvestMode;

/// Default values shared by the `Default` impls
pub mod defaults {
    pub const ENV_PREFIX: &str = "EPS_HARVEST";
    pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;
    pub const NAVIGATION_TIMEOUT_SECONDS: u64 = 60;
    pub const ELEMENT_TIMEOUT_SECONDS: u64 = 30;
    pub const CLICK_TIMEOUT_SECONDS: u64 = 10;
    pub const DETAIL_READY_TIMEOUT_SECONDS: u64 = 10;
    pub const LISTING_RETURN_TIMEOUT_SECONDS: u64 = 20;
    pub const MAX_REQUESTS_PER_SECOND: u32 = 2;

    pub const MAX_ATTEMPTS: u32 = 3;
    pub const BASE_DELAY_MS: u64 = 1_000;
    pub const MAX_DELAY_MS: u64 = 10_000;
    pub const BACKOFF_MULTIPLIER: f64 = 1.0;
    pub const JITTER_MS: u64 = 250;
    pub const ATTEMPT_TIMEOUT_SECONDS: u64 = 90;

    pub const CONNECTIVITY_POLL_MS: u64 = 5_000;
    pub const PROBE_TIMEOUT_MS: u64 = 10_000;

    pub const ITEM_DELAY_MIN_MS: u64 = 1_000;
    pub const ITEM_DELAY_MAX_MS: u64 = 2_000;
    pub const PAGE_SETTLE_MS: u64 = 2_000;
    pub const NEXT_SETTLE_MS: u64 = 3_000;
    pub const SCROLL_SETTLE_MS: u64 = 1_000;

    pub const PAGE_SIZE: u32 = 50;
    pub const DETAIL_BATCH_SIZE: usize = 20;

    pub const DISPLAY_COLUMN: &str = crate::domain::ENTITY_NAME;
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub browser: BrowserConfig,
    pub retry: RetryConfig,
    pub connectivity: ConnectivityConfig,
    pub pacing: PacingConfig,
    pub logging: LoggingConfig,
    pub registry: RegistryProfiles,
    pub contractor_selection: ContractorSelectionConfig,
}

/// HTTP and page-wait limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub user_agent: String,
    pub request_timeout_seconds: u64,
    /// Navigation, back and reload
    pub navigation_timeout_seconds: u64,
    /// Generic element waits
    pub element_timeout_seconds: u64,
    pub click_timeout_seconds: u64,
    pub detail_ready_timeout_seconds: u64,
    pub listing_return_timeout_seconds: u64,
    pub max_requests_per_second: u32,
    /// Liveness probe target for API-only runs
    pub probe_url: String,
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    /// Chrome/Edge binary; auto-detected when unset
    pub executable: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_ms: u64,
    /// Upper bound for a single attempt
    pub attempt_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    pub poll_interval_ms: u64,
    pub probe_timeout_ms: u64,
}

/// Human-paced delays between UI steps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub item_delay_min_ms: u64,
    pub item_delay_max_ms: u64,
    /// Wait after a listing appears, before counting its items
    pub page_settle_ms: u64,
    /// Wait after clicking the next-page control
    pub next_settle_ms: u64,
    /// Wait after scrolling to the bottom, before looking for the next control
    pub scroll_settle_ms: u64,
}

impl PacingConfig {
    /// Zero delays, for tests and replays against local fixtures
    pub fn immediate() -> Self {
        Self {
            item_delay_min_ms: 0,
            item_delay_max_ms: 0,
            page_settle_ms: 0,
            next_settle_ms: 0,
            scroll_settle_ms: 0,
        }
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_millis(self.page_settle_ms)
    }

    pub fn next_settle(&self) -> Duration {
        Duration::from_millis(self.next_settle_ms)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// "error", "warn", "info", "debug", "trace"
    pub level: String,
    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,
    /// Defaults to `<data dir>/eps-harvest/logs`
    pub log_dir: Option<PathBuf>,
    pub file_prefix: String,
}

/// Row selector strategy of the detail extraction cascade.
///
/// With `label` set, the label is the first `label` match inside each row
/// and the value is the `value_index`-th `cells` match. Without it, the
/// first two `cells` matches are label and value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowStrategy {
    pub row: String,
    #[serde(default)]
    pub label: Option<String>,
    pub cells: String,
    #[serde(default = "default_value_index")]
    pub value_index: usize,
}

fn default_value_index() -> usize {
    1
}

/// Selectors and output conventions of one UI registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryProfile {
    pub listing_url: String,
    pub search_input: String,
    /// `<select>` receiving the task scope, when the registry has one
    pub scope_select: Option<String>,
    /// Clickable title of each listing entry
    pub item_title: String,
    /// Listing card; holds the list-level identifier
    pub item_card: String,
    pub item_id: String,
    /// Present once a detail view is rendered
    pub detail_ready: String,
    pub back_button: String,
    pub title_selectors: Vec<String>,
    pub row_strategies: Vec<RowStrategy>,
    /// Container whose text is split into "Label: value" lines as a last resort
    pub raw_text_container: String,
    pub next_button: String,
    pub identifier_columns: Vec<String>,
    pub display_column: String,
    /// Fields cross-filled with the title in both directions
    pub cross_fill_labels: Vec<String>,
    pub default_output: String,
}

impl RegistryProfile {
    /// Approved-investor registry
    pub fn investors() -> Self {
        Self::default()
    }

    /// Declared drug price registry; same portal layout, different columns
    pub fn drug_prices() -> Self {
        Self {
            listing_url: "https://muasamcong.mpi.gov.vn/web/guest/drug-price-declaration".into(),
            search_input: r#"input[placeholder="Tìm kiếm thuốc"]"#.into(),
            identifier_columns: vec!["Số đăng ký".into(), "Số GPLH/GPNK".into()],
            cross_fill_labels: vec!["Tên thuốc".into()],
            default_output: "drug_prices_detailed".into(),
            ..Self::default()
        }
    }
}

impl Default for RegistryProfile {
    fn default() -> Self {
        Self {
            listing_url: "https://muasamcong.mpi.gov.vn/web/guest/investors-approval-v2".into(),
            search_input: r#"input[placeholder="Tìm kiếm chủ đầu tư"]"#.into(),
            scope_select: None,
            item_title: "h2.content__body__item__title".into(),
            item_card: ".content__body__item".into(),
            item_id: "h4.content__body__item__heading__text".into(),
            detail_ready: "button.btn-back".into(),
            back_button: "button.btn-back".into(),
            title_selectors: vec![
                ".content-body__header".into(),
                "h3.font-weight-bold".into(),
                "h3".into(),
                "h2".into(),
                ".title".into(),
            ],
            row_strategies: vec![
                RowStrategy {
                    row: ".infomation-course__content".into(),
                    label: Some(".infomation-course__content__title".into()),
                    cells: "div".into(),
                    value_index: 1,
                },
                RowStrategy {
                    row: ".row".into(),
                    label: None,
                    cells: "div".into(),
                    value_index: 1,
                },
            ],
            raw_text_container: "body".into(),
            next_button: "button.btn-next".into(),
            identifier_columns: vec!["Mã định danh".into()],
            display_column: defaults::DISPLAY_COLUMN.into(),
            cross_fill_labels: vec!["Tên chủ đầu tư".into(), "Tên nhà đầu tư".into()],
            default_output: "investors_data_detailed".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryProfiles {
    pub investors: RegistryProfile,
    pub drug_prices: RegistryProfile,
}

impl Default for RegistryProfiles {
    fn default() -> Self {
        Self {
            investors: RegistryProfile::investors(),
            drug_prices: RegistryProfile::drug_prices(),
        }
    }
}

/// Endpoints and batching of the four-phase API join
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractorSelectionConfig {
    /// Page whose search form issues the request captured in phase 1
    pub search_page_url: String,
    pub search_input: String,
    /// URL fragment identifying the search request to capture
    pub capture_fragment: String,
    /// Replay target when no page automation is available
    pub search_api_url: Option<String>,
    /// Session token for `search_api_url` runs
    pub token: Option<String>,
    pub detail_url: String,
    pub lot_url: String,
    pub bid_open_url: String,
    pub result_url: String,
    pub page_size: u32,
    pub detail_batch_size: usize,
    /// Search filter field receiving the task scope
    pub scope_field: String,
    /// Search filter field receiving the date window
    pub date_field: String,
    pub default_output: String,
}

impl Default for ContractorSelectionConfig {
    fn default() -> Self {
        const BASE: &str = "https://muasamcong.mpi.gov.vn/o/egp-portal-contractor-selection-v2/services";
        Self {
            search_page_url: "https://muasamcong.mpi.gov.vn/web/guest/contractor-selection".into(),
            search_input: r#"input[name="keyword"]"#.into(),
            capture_fragment: "/services/smart/search".into(),
            search_api_url: None,
            token: None,
            detail_url: format!("{BASE}/expose/lcnt/bid-po-bido-notify-contractor-view/get-by-id"),
            lot_url: format!("{BASE}/expose/lcnt/bid-po-lot/get-by-bid-id"),
            bid_open_url: format!("{BASE}/expose/ldtkqmt/bid-notification-p/bid-open"),
            result_url: format!("{BASE}/expose/contractor-input-result/get"),
            page_size: defaults::PAGE_SIZE,
            detail_batch_size: defaults::DETAIL_BATCH_SIZE,
            scope_field: "investorCode".into(),
            date_field: "publicDate".into(),
            default_output: "contractor_selection".into(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::USER_AGENT.into(),
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            navigation_timeout_seconds: defaults::NAVIGATION_TIMEOUT_SECONDS,
            element_timeout_seconds: defaults::ELEMENT_TIMEOUT_SECONDS,
            click_timeout_seconds: defaults::CLICK_TIMEOUT_SECONDS,
            detail_ready_timeout_seconds: defaults::DETAIL_READY_TIMEOUT_SECONDS,
            listing_return_timeout_seconds: defaults::LISTING_RETURN_TIMEOUT_SECONDS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            probe_url: "https://muasamcong.mpi.gov.vn".into(),
            accept_invalid_certs: true,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            executable: None,
            window_width: 1280,
            window_height: 720,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            base_delay_ms: defaults::BASE_DELAY_MS,
            max_delay_ms: defaults::MAX_DELAY_MS,
            backoff_multiplier: defaults::BACKOFF_MULTIPLIER,
            jitter_ms: defaults::JITTER_MS,
            attempt_timeout_seconds: defaults::ATTEMPT_TIMEOUT_SECONDS,
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::CONNECTIVITY_POLL_MS,
            probe_timeout_ms: defaults::PROBE_TIMEOUT_MS,
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            item_delay_min_ms: defaults::ITEM_DELAY_MIN_MS,
            item_delay_max_ms: defaults::ITEM_DELAY_MAX_MS,
            page_settle_ms: defaults::PAGE_SETTLE_MS,
            next_settle_ms: defaults::NEXT_SETTLE_MS,
            scroll_settle_ms: defaults::SCROLL_SETTLE_MS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: None,
            file_prefix: "eps-harvest.log".into(),
        }
    }
}

impl AppConfig {
    pub fn registry_profile(&self, mode: HarvestMode) -> Option<&RegistryProfile> {
        match mode {
            HarvestMode::Investors => Some(&self.registry.investors),
            HarvestMode::DrugPrices => Some(&self.registry.drug_prices),
            HarvestMode::ContractorSelection => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if !(self.retry.backoff_multiplier.is_finite() && self.retry.backoff_multiplier >= 1.0) {
            return invalid("retry.backoff_multiplier must be a finite number >= 1.0");
        }
        if self.network.max_requests_per_second == 0 {
            return invalid("network.max_requests_per_second must be at least 1");
        }
        if self.connectivity.poll_interval_ms == 0 {
            return invalid("connectivity.poll_interval_ms must be positive");
        }
        if self.pacing.item_delay_min_ms > self.pacing.item_delay_max_ms {
            return invalid("pacing.item_delay_min_ms exceeds pacing.item_delay_max_ms");
        }
        if self.contractor_selection.page_size == 0 || self.contractor_selection.detail_batch_size == 0 {
            return invalid("contractor_selection page and batch sizes must be positive");
        }
        for (name, profile) in [
            ("investors", &self.registry.investors),
            ("drug_prices", &self.registry.drug_prices),
        ] {
            if profile.item_title.trim().is_empty() || profile.listing_url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "registry.{name} needs listing_url and item_title"
                )));
            }
            if profile.row_strategies.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "registry.{name} needs at least one row strategy"
                )));
            }
        }
        Ok(())
    }
}

/// Loads defaults, then `path` (if any), then `EPS_HARVEST_*` overrides
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        info!("Loading configuration from {}", path.display());
        builder = builder.add_source(config::File::from(path).required(true));
    }
    builder = builder.add_source(
        config::Environment::with_prefix(defaults::ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config: AppConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.connectivity.poll_interval_ms, 5_000);
        assert_eq!(config.registry.investors.identifier_columns, vec!["Mã định danh"]);
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[pacing]\nitem_delay_min_ms = 0\nitem_delay_max_ms = 0\n\n[contractor_selection]\npage_size = 100\n"
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.pacing.item_delay_max_ms, 0);
        assert_eq!(config.pacing.page_settle_ms, defaults::PAGE_SETTLE_MS);
        assert_eq!(config.contractor_selection.page_size, 100);
        assert_eq!(config.contractor_selection.detail_batch_size, 20);
    }

    #[test]
    fn inverted_delay_range_is_rejected() {
        let mut config = AppConfig::default();
        config.pacing.item_delay_min_ms = 5_000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[rstest::rstest]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    #[case(0.5)]
    fn unusable_backoff_multiplier_is_rejected(#[case] multiplier: f64) {
        let mut config = AppConfig::default();
        config.retry.backoff_multiplier = multiplier;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn nan_multiplier_in_a_file_fails_to_load() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[retry]\nbackoff_multiplier = nan\n").unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }

    #[test]
    fn profiles_resolve_by_mode() {
        let config = AppConfig::default();
        assert!(config.registry_profile(HarvestMode::ContractorSelection).is_none());
        assert_eq!(
            config.registry_profile(HarvestMode::DrugPrices).map(|p| p.default_output.as_str()),
            Some("drug_prices_detailed")
        );
    }
}
