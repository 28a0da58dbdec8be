//! eps-harvest command line
//!
//! `eps-harvest run --mode investors --pages 0` harvests every page;
//! type `p` / `r` / `q` + Enter to pause, resume or stop, or press Ctrl-C.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use eps_harvest::application::{Collaborators, ControlHandle, HarvestOptions, TracingProgress};
use eps_harvest::domain::{DateRange, HarvestMode, PipelineTask};
use eps_harvest::infrastructure::{
    ApiClient, ApiClientConfig, AppConfig, CsvTableStore, LivenessProbe, PageAutomation,
    init_logging_with_config, load_config,
};
#[cfg(feature = "browser")]
use eps_harvest::infrastructure::ChromeSurface;
use eps_harvest::{control_pair, start};

#[derive(Parser, Debug)]
#[command(name = "eps-harvest", version, about = "Resumable harvester for the VN e-procurement registry")]
struct Cli {
    /// Configuration file (TOML or JSON); EPS_HARVEST_* variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest one mode into CSV artifacts
    Run(RunArgs),
    /// Print the effective configuration as JSON
    Config,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// investors, drug-prices or contractor-selection
    #[arg(long, default_value = "investors")]
    mode: HarvestMode,

    /// Output file; the extension is always .csv
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Pages per task, 0 for all
    #[arg(long, default_value_t = 0)]
    pages: u32,

    /// Search keyword; repeat for several searches
    #[arg(long = "keyword", short)]
    keywords: Vec<String>,

    /// Scope filter (investor code or select value); repeat for several
    #[arg(long = "scope")]
    scopes: Vec<String>,

    /// First publication date (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last publication date (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,
}

impl RunArgs {
    fn options(&self) -> HarvestOptions {
        HarvestOptions {
            mode: self.mode,
            tasks: PipelineTask::expand(&self.scopes, &self.keywords),
            date_range: DateRange {
                from: self.from,
                to: self.to,
            },
            output: self.output.clone(),
            max_pages: (self.pages > 0).then_some(self.pages),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Run(args) => run(config, args).await,
    }
}

async fn run(mut config: AppConfig, args: RunArgs) -> Result<()> {
    if args.headless {
        config.browser.headless = true;
    }
    init_logging_with_config(&config.logging).context("Failed to initialize logging")?;

    let (handle, control) = control_pair();
    watch_ctrl_c(handle.clone());
    watch_stdin(handle);

    let options = args.options();
    let api = Arc::new(
        ApiClient::with_config(ApiClientConfig::from_network_config(&config.network))
            .context("Failed to build the HTTP client")?,
    );

    #[cfg(feature = "browser")]
    let surface = if options.mode.is_registry() || config.contractor_selection.search_api_url.is_none() {
        Some(Arc::new(
            ChromeSurface::launch(&config.browser, &config.network).await?,
        ))
    } else {
        None
    };
    #[cfg(feature = "browser")]
    let automation = surface.clone().map(|s| s as Arc<dyn PageAutomation>);
    #[cfg(not(feature = "browser"))]
    let automation: Option<Arc<dyn PageAutomation>> = None;

    let deps = Collaborators {
        probe: automation
            .is_none()
            .then(|| api.clone() as Arc<dyn LivenessProbe>),
        automation,
        api: Some(api),
        store: Arc::new(CsvTableStore::new()),
        progress: Arc::new(TracingProgress),
    };

    let outcome = start(&config, options, &deps, &control).await;

    #[cfg(feature = "browser")]
    if let Some(surface) = &surface {
        surface.close().await;
    }

    let report = outcome?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn watch_ctrl_c(handle: ControlHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received; stopping after the current step");
            handle.cancel();
        }
    });
}

/// A plain thread, so a pending read never holds up runtime shutdown
fn watch_stdin(handle: ControlHandle) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match line.trim() {
                "p" => {
                    handle.pause();
                    info!("Paused; type r to resume");
                }
                "r" => {
                    handle.resume();
                    info!("Resumed");
                }
                "q" => {
                    handle.cancel();
                    info!("Stopping...");
                    break;
                }
                _ => {}
            }
        }
    });
}
