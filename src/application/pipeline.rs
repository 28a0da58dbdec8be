//! Run entry point: options in, `RunReport` out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::application::checkpoint::CheckpointStore;
use crate::application::connectivity::ConnectivityGuard;
use crate::application::context::RunContext;
use crate::application::contractor_selection::{ContractorSelectionEngine, JoinArtifacts};
use crate::application::control::ControlSignal;
use crate::application::progress::ProgressSink;
use crate::application::registry::RegistryHarvester;
use crate::application::report::{HarvestStats, RunReport};
use crate::application::retry::RetryPolicy;
use crate::application::sink::PersistenceSink;
use crate::domain::{DateRange, HarvestError, HarvestMode, HarvestResult, PipelineTask};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::{JsonApi, LivenessProbe, PageAutomation, PageProbe, TableStore};

const OUTPUT_EXTENSION: &str = "csv";

#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub mode: HarvestMode,
    /// Run sequentially; empty means one unfiltered search
    pub tasks: Vec<PipelineTask>,
    pub date_range: DateRange,
    pub output: Option<PathBuf>,
    /// `None` walks every page
    pub max_pages: Option<u32>,
}

impl HarvestOptions {
    pub fn new(mode: HarvestMode) -> Self {
        Self {
            mode,
            tasks: Vec::new(),
            date_range: DateRange::default(),
            output: None,
            max_pages: None,
        }
    }
}

/// Implementations of the outside-world seams for one run
#[derive(Clone)]
pub struct Collaborators {
    pub automation: Option<Arc<dyn PageAutomation>>,
    pub api: Option<Arc<dyn JsonApi>>,
    /// Falls back to the page's own connectivity view
    pub probe: Option<Arc<dyn LivenessProbe>>,
    pub store: Arc<dyn TableStore>,
    pub progress: Arc<dyn ProgressSink>,
}

/// Requested path (or the mode's default name), always with a `.csv`
/// extension
pub fn resolve_output(config: &AppConfig, mode: HarvestMode, requested: Option<&Path>) -> PathBuf {
    let mut path = match requested {
        Some(path) if !path.as_os_str().is_empty() => path.to_path_buf(),
        _ => PathBuf::from(match config.registry_profile(mode) {
            Some(profile) => profile.default_output.as_str(),
            None => config.contractor_selection.default_output.as_str(),
        }),
    };
    path.set_extension(OUTPUT_EXTENSION);
    path
}

fn validate(options: &HarvestOptions, deps: &Collaborators) -> HarvestResult<()> {
    if !options.date_range.is_valid() {
        return Err(HarvestError::Config("date range ends before it starts".into()));
    }
    if options.max_pages == Some(0) {
        return Err(HarvestError::Config("page limit must be positive".into()));
    }
    if options.mode.is_registry() && deps.automation.is_none() {
        return Err(HarvestError::Config(format!(
            "{} mode needs page automation (build with the `browser` feature)",
            options.mode
        )));
    }
    if options.mode == HarvestMode::ContractorSelection && deps.api.is_none() {
        return Err(HarvestError::Config("contractor-selection mode needs a JSON API client".into()));
    }
    Ok(())
}

/// Runs every task of `options` and reports what was collected.
///
/// Only configuration problems are returned as errors. A cancelled run
/// still flushes what it holds and reports `cancelled: true`.
pub async fn start(
    config: &AppConfig,
    options: HarvestOptions,
    deps: &Collaborators,
    control: &ControlSignal,
) -> HarvestResult<RunReport> {
    validate(&options, deps)?;

    let page_probe;
    let probe: &dyn LivenessProbe = match (&deps.probe, deps.automation.as_deref()) {
        (Some(probe), _) => probe.as_ref(),
        (None, Some(page)) => {
            page_probe = PageProbe(page);
            &page_probe
        }
        (None, None) => return Err(HarvestError::Config("no liveness probe available".into())),
    };

    let run_id = uuid::Uuid::new_v4();
    let started_at = chrono::Local::now();
    let output = resolve_output(config, options.mode, options.output.as_deref());
    let tasks = if options.tasks.is_empty() {
        vec![PipelineTask::new(None, "")]
    } else {
        options.tasks.clone()
    };

    let guard = ConnectivityGuard::from_config(&config.connectivity);
    let retry = RetryPolicy::from_config(&config.retry);
    let ctx = RunContext {
        control,
        guard: &guard,
        probe,
        retry: &retry,
        pacing: &config.pacing,
        progress: deps.progress.as_ref(),
    };
    let checkpoints = CheckpointStore::new(deps.store.as_ref());
    let sink = PersistenceSink::new(deps.store.as_ref());

    info!(%run_id, mode = %options.mode, output = %output.display(), "Starting harvest");
    ctx.report(format!("Mode: {}", options.mode));
    ctx.report(format!("Output: {}", output.display()));
    ctx.report(format!(
        "Tasks: {} | Pages: {}",
        tasks.len(),
        options
            .max_pages
            .map_or_else(|| "all".to_string(), |n| n.to_string())
    ));

    let mut stats = HarvestStats::default();
    let mut cancelled = false;
    let seeded_rows;
    let total_rows;
    let mut artifacts = Vec::new();

    if let Some(profile) = config.registry_profile(options.mode) {
        let Some(page) = deps.automation.as_deref() else {
            return Err(HarvestError::Config("page automation missing".into()));
        };
        let mut state =
            checkpoints.load(&output, &profile.identifier_columns, &profile.display_column);
        seeded_rows = state.seeded_rows();
        if seeded_rows > 0 {
            ctx.report(format!("Resuming: {seeded_rows} rows already saved"));
        }

        let harvester = RegistryHarvester::new(page, profile, &config.network)?;
        for task in &tasks {
            match harvester
                .run_task(task, options.max_pages, &mut state, &sink, &output, &ctx)
                .await
            {
                Ok(task_stats) => stats += task_stats,
                Err(e) if e.is_cancelled() => {
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!("Task {} failed: {}", task, e);
                    ctx.report(format!("Task {task} failed: {e}"));
                }
            }
        }

        if (stats.collected > 0 || cancelled) && !sink.flush(&state.rows, &output).is_persisted() {
            stats.failed_flushes += 1;
        }
        total_rows = state.rows.len();
    } else {
        let Some(api) = deps.api.as_deref() else {
            return Err(HarvestError::Config("JSON API client missing".into()));
        };
        let mut join = JoinArtifacts::load(&checkpoints, &output);
        seeded_rows = join.primary.state.seeded_rows();
        if seeded_rows > 0 {
            ctx.report(format!("Resuming: {seeded_rows} notices already saved"));
        }

        let engine = ContractorSelectionEngine::new(
            &config.contractor_selection,
            &config.network,
            api,
            deps.automation.as_deref(),
        );
        match engine
            .run(&tasks, &options.date_range, options.max_pages, &mut join, &sink, &ctx)
            .await
        {
            Ok(run_stats) => stats += run_stats,
            Err(e) if e.is_cancelled() => cancelled = true,
            Err(HarvestError::Config(message)) => {
                error!("Contractor-selection run cannot start: {}", message);
                return Err(HarvestError::Config(message));
            }
            Err(e) => {
                warn!("Contractor-selection run stopped early: {}", e);
                ctx.report(format!("Stopped early: {e}"));
            }
        }

        stats.failed_flushes += join.flush_all(&sink);
        total_rows = join.primary.state.rows.len();
        artifacts = join.secondary_summaries();
    }

    let report = RunReport {
        run_id,
        mode: options.mode,
        output,
        seeded_rows,
        total_rows,
        stats,
        artifacts,
        cancelled,
        started_at,
        finished_at: chrono::Local::now(),
    };
    if cancelled {
        ctx.report(format!("Stopped by user; {} rows saved", report.total_rows));
    } else {
        ctx.report(format!(
            "Completed: {} new rows, {} total",
            report.new_rows(),
            report.total_rows
        ));
    }
    info!(%run_id, cancelled, collected = report.stats.collected, "Harvest finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::control::control_pair;
    use crate::application::progress::RecordingProgress;
    use crate::infrastructure::CsvTableStore;
    use rstest::rstest;

    #[rstest]
    #[case(HarvestMode::Investors, None, "investors_data_detailed.csv")]
    #[case(HarvestMode::DrugPrices, None, "drug_prices_detailed.csv")]
    #[case(HarvestMode::ContractorSelection, None, "contractor_selection.csv")]
    #[case(HarvestMode::Investors, Some("out/data.xlsx"), "out/data.csv")]
    #[case(HarvestMode::Investors, Some("plain"), "plain.csv")]
    fn output_path_defaults_and_extension(
        #[case] mode: HarvestMode,
        #[case] requested: Option<&str>,
        #[case] expected: &str,
    ) {
        let config = AppConfig::default();
        assert_eq!(
            resolve_output(&config, mode, requested.map(Path::new)),
            PathBuf::from(expected)
        );
    }

    #[tokio::test]
    async fn registry_mode_without_automation_is_a_config_error() {
        let (_handle, control) = control_pair();
        let deps = Collaborators {
            automation: None,
            api: None,
            probe: None,
            store: Arc::new(CsvTableStore::new()),
            progress: Arc::new(RecordingProgress::default()),
        };
        let result = start(
            &AppConfig::default(),
            HarvestOptions::new(HarvestMode::Investors),
            &deps,
            &control,
        )
        .await;
        assert!(matches!(result, Err(HarvestError::Config(_))));
    }
}
