//! UI registry harvesting (investors, drug prices).
//!
//! A `RegistryView` drives one search of a rendered registry: it is both the
//! `PageSource` the paginator walks and the `DetailSource` items are resolved
//! against. `RegistryHarvester` ties a view to the run state for one task.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::application::checkpoint::HarvestState;
use crate::application::context::RunContext;
use crate::application::control::ControlSignal;
use crate::application::extraction::{CrossFill, DetailExtractor, ListingParser};
use crate::application::paginator::{PageSource, Paginator};
use crate::application::report::HarvestStats;
use crate::application::resolver::{DetailSource, ItemResolver, Resolution};
use crate::application::sink::PersistenceSink;
use crate::domain::record::UNKNOWN_TITLE;
use crate::domain::{CatalogItem, DetailRecord, HarvestError, HarvestResult, PipelineTask};
use crate::infrastructure::PageAutomation;
use crate::infrastructure::config::{NetworkConfig, PacingConfig, RegistryProfile};

/// Attempts for the next-page click: the first try plus one retry
const NEXT_CLICK_ATTEMPTS: u32 = 2;

pub struct RegistryView<'a> {
    page: &'a dyn PageAutomation,
    profile: &'a RegistryProfile,
    network: &'a NetworkConfig,
    pacing: &'a PacingConfig,
    control: &'a ControlSignal,
    listing: &'a ListingParser,
    extractor: &'a DetailExtractor,
    task: &'a PipelineTask,
}

impl<'a> RegistryView<'a> {
    fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.network.element_timeout_seconds)
    }

    fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.network.navigation_timeout_seconds)
    }

    fn click_timeout(&self) -> Duration {
        Duration::from_secs(self.network.click_timeout_seconds)
    }

    fn listing_return_timeout(&self) -> Duration {
        Duration::from_secs(self.network.listing_return_timeout_seconds)
    }

    async fn navigate(&self) -> HarvestResult<()> {
        self.page
            .goto(&self.profile.listing_url, self.navigation_timeout())
            .await?;
        self.page
            .wait_for(&self.profile.search_input, self.element_timeout())
            .await?;
        Ok(())
    }

    async fn reload_to_search(&self) -> HarvestResult<()> {
        self.page.reload(self.navigation_timeout()).await?;
        self.page
            .wait_for(&self.profile.search_input, self.element_timeout())
            .await?;
        Ok(())
    }

    /// Applies the task's scope and keyword, then submits
    async fn search(&self) -> HarvestResult<()> {
        if let (Some(select), Some(scope)) = (&self.profile.scope_select, &self.task.scope) {
            self.page.select_option(select, scope).await?;
        }
        self.page
            .fill(&self.profile.search_input, &self.task.keyword)
            .await?;
        self.page.press(&self.profile.search_input, "Enter").await?;
        Ok(())
    }

    async fn wait_for_items(&self, timeout: Duration) -> HarvestResult<()> {
        self.page.wait_for(&self.profile.item_title, timeout).await?;
        Ok(())
    }

    async fn research(&self) -> HarvestResult<()> {
        self.reload_to_search().await?;
        self.search().await?;
        self.wait_for_items(self.element_timeout()).await
    }

    /// Loads the listing and runs the task's search. `Ok(false)` means the
    /// listing could not be brought up (or the search matched nothing) and
    /// the task should be skipped.
    pub async fn open_listing(&self, ctx: &RunContext<'_>) -> HarvestResult<bool> {
        let view = self;
        let once = ctx.retry.once();

        match ctx.retrier().run("open listing", move || view.navigate()).await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!("Listing did not load ({}); reloading once", e);
                if let Err(e) = ctx
                    .retrier_with(&once)
                    .run("reload listing", move || view.reload_to_search())
                    .await
                {
                    if e.is_cancelled() {
                        return Err(e);
                    }
                    warn!("Search input still missing after reload: {}", e);
                    return Ok(false);
                }
            }
        }

        match ctx.retrier().run("submit search", move || view.search()).await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!("Could not submit search for {}: {}", self.task, e);
                return Ok(false);
            }
        }

        if let Err(e) = self.wait_for_items(self.element_timeout()).await {
            info!("No items after search for {} ({}); reloading and searching again", self.task, e);
            ctx.ensure_online().await?;
            match ctx.retrier_with(&once).run("search again", move || view.research()).await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Listing stayed empty for {}: {}", self.task, e);
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    async fn on_listing(&self) -> HarvestResult<bool> {
        Ok(self.page.count(&self.profile.item_title).await? > 0)
    }
}

#[async_trait]
impl PageSource for RegistryView<'_> {
    type Item = CatalogItem;

    async fn fetch_page(&self) -> HarvestResult<Vec<CatalogItem>> {
        self.control.sleep(self.pacing.page_settle()).await?;
        let html = self.page.content().await?;
        let items = self.listing.parse(&html);
        debug!("Listing snapshot holds {} entries", items.len());
        Ok(items)
    }

    async fn has_next(&self) -> HarvestResult<bool> {
        self.page.scroll_to_bottom().await?;
        self.control.sleep(self.pacing.scroll_settle()).await?;

        let next = &self.profile.next_button;
        if self.page.count(next).await? == 0 || !self.page.is_visible(next, 0).await? {
            info!("No next button; last page reached");
            return Ok(false);
        }
        if !self.page.is_enabled(next, 0).await? {
            info!("Next button disabled; last page reached");
            return Ok(false);
        }
        Ok(true)
    }

    async fn advance(&self) -> HarvestResult<()> {
        self.page
            .click(&self.profile.next_button, 0, self.click_timeout())
            .await?;
        self.control.sleep(self.pacing.next_settle()).await?;
        self.wait_for_items(self.listing_return_timeout()).await
    }

    fn advance_attempts(&self) -> Option<u32> {
        Some(NEXT_CLICK_ATTEMPTS)
    }
}

#[async_trait]
impl DetailSource for RegistryView<'_> {
    async fn open_detail(&self, item: &CatalogItem) -> HarvestResult<()> {
        if !self.on_listing().await? {
            self.return_to_listing().await?;
        }
        let visible = self.page.count(&self.profile.item_title).await?;
        if item.position >= visible {
            return Err(HarvestError::automation(format!(
                "listing shows {visible} entries; entry {} is gone",
                item.position + 1
            )));
        }
        self.page
            .click(&self.profile.item_title, item.position, self.click_timeout())
            .await?;
        self.page
            .wait_for(
                &self.profile.detail_ready,
                Duration::from_secs(self.network.detail_ready_timeout_seconds),
            )
            .await?;
        Ok(())
    }

    async fn read_detail(&self) -> HarvestResult<DetailRecord> {
        let html = self.page.content().await?;
        Ok(self.extractor.extract(&html))
    }

    async fn return_to_listing(&self) -> HarvestResult<()> {
        if self.page.count(&self.profile.back_button).await? > 0 {
            self.page
                .click(&self.profile.back_button, 0, self.click_timeout())
                .await?;
        } else if self.on_listing().await? {
            return Ok(());
        } else {
            self.page.go_back(self.navigation_timeout()).await?;
        }
        self.wait_for_items(self.listing_return_timeout()).await
    }

    async fn reload_listing(&self) -> HarvestResult<()> {
        self.page.reload(self.navigation_timeout()).await?;
        if self.wait_for_items(self.navigation_timeout()).await.is_ok() {
            return Ok(());
        }
        debug!("Reloaded listing is empty; submitting the search again");
        self.search().await?;
        self.wait_for_items(self.element_timeout()).await
    }
}

/// Compiled profile plus the page it drives
pub struct RegistryHarvester<'a> {
    page: &'a dyn PageAutomation,
    profile: &'a RegistryProfile,
    network: &'a NetworkConfig,
    listing: ListingParser,
    extractor: DetailExtractor,
    cross_fill: CrossFill,
}

impl<'a> RegistryHarvester<'a> {
    pub fn new(
        page: &'a dyn PageAutomation,
        profile: &'a RegistryProfile,
        network: &'a NetworkConfig,
    ) -> HarvestResult<Self> {
        Ok(Self {
            page,
            profile,
            network,
            listing: ListingParser::from_profile(profile)?,
            extractor: DetailExtractor::from_profile(profile)?,
            cross_fill: CrossFill::new(&profile.cross_fill_labels),
        })
    }

    /// Column the detail-level identifier is read from and written to
    fn identifier_column(&self) -> Option<&str> {
        self.profile.identifier_columns.first().map(String::as_str)
    }

    /// Searches for `task` and harvests every page of its results into
    /// `state`, flushing to `output` after each page.
    pub async fn run_task(
        &self,
        task: &PipelineTask,
        max_pages: Option<u32>,
        state: &mut HarvestState,
        sink: &PersistenceSink<'_>,
        output: &Path,
        ctx: &RunContext<'_>,
    ) -> HarvestResult<HarvestStats> {
        let mut stats = HarvestStats::default();
        let view = RegistryView {
            page: self.page,
            profile: self.profile,
            network: self.network,
            pacing: ctx.pacing,
            control: ctx.control,
            listing: &self.listing,
            extractor: &self.extractor,
            task,
        };

        ctx.report(format!("Searching {task}..."));
        if !view.open_listing(ctx).await? {
            ctx.report(format!("No listing for {task}; skipping"));
            return Ok(stats);
        }

        let identifier_column = self.identifier_column();
        let resolver = ItemResolver::new(&view, &self.cross_fill, identifier_column);
        let mut pager = Paginator::new(max_pages);

        while let Some(page) = pager.next_page(&view, ctx).await? {
            ctx.report(format!(
                "Processing page {} ({} items)",
                page.number,
                page.items.len()
            ));
            for item in &page.items {
                ctx.checkpoint().await?;
                match resolver.resolve(item, &state.index, ctx).await? {
                    Resolution::Resolved {
                        id,
                        listing_key,
                        record,
                    } => {
                        let detail_id = identifier_column
                            .and_then(|column| record.get(column))
                            .map(str::to_string);
                        // title-keyed listings only learn the real id after opening
                        let known = state.index.contains(&id)
                            || detail_id.as_deref().is_some_and(|d| state.index.contains(d));
                        state.index.insert(&listing_key);
                        if known {
                            ctx.report(format!("  Skipping duplicate: {id}"));
                            stats.skipped += 1;
                            continue;
                        }
                        ctx.report(format!(
                            "  Collected: {} (ID: {})",
                            record.title().unwrap_or(UNKNOWN_TITLE),
                            id
                        ));
                        state.record(&id, record.into_row());
                        if let Some(detail_id) = detail_id {
                            state.index.insert(&detail_id);
                        }
                        stats.collected += 1;
                        ctx.polite_delay().await?;
                    }
                    Resolution::Skipped { id } => {
                        ctx.report(format!("  Skipping duplicate: {id}"));
                        stats.skipped += 1;
                    }
                    Resolution::Abandoned { id, reason } => {
                        ctx.report(format!("  Gave up on {id}: {reason}"));
                        stats.abandoned += 1;
                    }
                }
            }

            stats.pages += 1;
            if sink.flush(&state.rows, output).is_persisted() {
                ctx.report(format!("Page {} saved ({} rows)", page.number, state.rows.len()));
            } else {
                stats.failed_flushes += 1;
            }
        }

        let summary = pager.summary();
        info!(
            "Task {} finished after {} pages ({:?})",
            task, summary.pages_visited, summary.stop_reason
        );
        Ok(stats)
    }
}
