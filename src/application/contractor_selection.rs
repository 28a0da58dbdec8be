//! Contractor-selection mode: a four-phase join over the portal's JSON API.
//!
//! 1. catalog scan: capture the search request once, replay it page by page
//! 2. detail fetch: one detail call per new notice → primary artifact
//! 3. lot join: lots × bid openings → `<stem>_lots`
//! 4. result decomposition: contractor results → `<stem>_contractors`,
//!    `<stem>_goods`
//!
//! Phases 3 and 4 run over every notice in the primary artifact, including
//! rows checkpointed by earlier runs, plus catalog notices that have no
//! primary row; each secondary artifact skips notices it already holds.

pub mod catalog_scan;
pub mod detail_fetch;
pub mod lot_join;
pub mod result_decomposition;
pub mod search_payload;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use self::catalog_scan::CatalogScan;
use self::detail_fetch::{detail_request, map_detail};
use self::lot_join::{bid_request, join_lots};
use self::result_decomposition::{decompose, result_request};
use self::search_payload::{SearchQuery, SearchTemplate, endpoint_url};
use crate::application::checkpoint::{CheckpointStore, HarvestState};
use crate::application::context::RunContext;
use crate::application::paginator::Paginator;
use crate::application::report::{ArtifactSummary, HarvestStats};
use crate::application::sink::{PersistenceSink, sibling_path};
use crate::domain::notice::columns;
use crate::domain::{
    AccumulatedRowSet, ContractorResultRow, DateRange, GoodsLineRow, HarvestError, HarvestResult,
    JoinKeys, LotRow, NoticeSummary, PipelineTask,
};
use crate::infrastructure::config::{ContractorSelectionConfig, NetworkConfig};
use crate::infrastructure::{CapturedRequest, JsonApi, PageAutomation};

/// One output file and the rows/identifiers it carries
#[derive(Debug)]
pub struct Artifact {
    pub path: PathBuf,
    pub state: HarvestState,
}

impl Artifact {
    fn load(checkpoints: &CheckpointStore<'_>, path: PathBuf) -> Self {
        let candidates = [columns::NOTIFY_NO.to_string()];
        let state = checkpoints.load(&path, &candidates, columns::NOTIFY_NO);
        Self { path, state }
    }

    /// `true` when the snapshot reached disk (possibly at the backup path)
    pub fn flush(&self, sink: &PersistenceSink<'_>) -> bool {
        sink.flush(&self.state.rows, &self.path).is_persisted()
    }

    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            path: self.path.clone(),
            rows: self.state.rows.len(),
        }
    }
}

#[derive(Debug)]
pub struct JoinArtifacts {
    pub primary: Artifact,
    pub lots: Artifact,
    pub contractors: Artifact,
    pub goods: Artifact,
}

impl JoinArtifacts {
    /// Primary file at `output`, secondary files next to it
    pub fn load(checkpoints: &CheckpointStore<'_>, output: &Path) -> Self {
        Self {
            primary: Artifact::load(checkpoints, output.to_path_buf()),
            lots: Artifact::load(checkpoints, sibling_path(output, "_lots")),
            contractors: Artifact::load(checkpoints, sibling_path(output, "_contractors")),
            goods: Artifact::load(checkpoints, sibling_path(output, "_goods")),
        }
    }

    fn all(&self) -> [&Artifact; 4] {
        [&self.primary, &self.lots, &self.contractors, &self.goods]
    }

    /// Flushes every artifact; returns how many writes failed
    pub fn flush_all(&self, sink: &PersistenceSink<'_>) -> usize {
        self.all().iter().filter(|artifact| !artifact.flush(sink)).count()
    }

    pub fn secondary_summaries(&self) -> Vec<ArtifactSummary> {
        [&self.lots, &self.contractors, &self.goods]
            .iter()
            .map(|artifact| artifact.summary())
            .collect()
    }
}

/// Join-key bundles for every notice in the primary rows, then for catalog
/// notices that never reached the primary artifact (no notice id, or the
/// detail call failed). Keys seen in this run's catalog fill gaps left by
/// earlier runs.
pub fn join_bundles(primary: &AccumulatedRowSet, summaries: &[NoticeSummary]) -> Vec<JoinKeys> {
    let fresh: HashMap<&str, &NoticeSummary> = summaries
        .iter()
        .map(|s| (s.notify_no.as_str(), s))
        .collect();

    let mut seen = HashSet::new();
    let mut bundles: Vec<JoinKeys> = primary
        .rows()
        .iter()
        .filter_map(JoinKeys::from_row)
        .filter(|keys| seen.insert(keys.notify_no.clone()))
        .map(|mut keys| {
            if let Some(summary) = fresh.get(keys.notify_no.as_str()) {
                if keys.input_result_id.is_none() {
                    keys.input_result_id = summary.input_result_id.clone();
                }
                if keys.notify_id.is_none() {
                    keys.notify_id = summary.notify_id.clone();
                }
            }
            keys
        })
        .collect();

    bundles.extend(
        summaries
            .iter()
            .filter(|summary| seen.insert(summary.notify_no.clone()))
            .map(NoticeSummary::keys),
    );
    bundles
}

/// Flushes `artifact` every `batch` processed notices
struct BatchFlusher<'s> {
    sink: &'s PersistenceSink<'s>,
    batch: usize,
    pending: usize,
}

impl<'s> BatchFlusher<'s> {
    fn new(sink: &'s PersistenceSink<'s>, batch: usize) -> Self {
        Self {
            sink,
            batch: batch.max(1),
            pending: 0,
        }
    }

    fn processed(&mut self, artifacts: &[&Artifact], stats: &mut HarvestStats) {
        self.pending += 1;
        if self.pending >= self.batch {
            self.finish(artifacts, stats);
        }
    }

    fn finish(&mut self, artifacts: &[&Artifact], stats: &mut HarvestStats) {
        if self.pending == 0 {
            return;
        }
        for artifact in artifacts {
            if !artifact.flush(self.sink) {
                stats.failed_flushes += 1;
            }
        }
        self.pending = 0;
    }
}

pub struct ContractorSelectionEngine<'a> {
    config: &'a ContractorSelectionConfig,
    network: &'a NetworkConfig,
    api: &'a dyn JsonApi,
    page: Option<&'a dyn PageAutomation>,
}

impl<'a> ContractorSelectionEngine<'a> {
    pub fn new(
        config: &'a ContractorSelectionConfig,
        network: &'a NetworkConfig,
        api: &'a dyn JsonApi,
        page: Option<&'a dyn PageAutomation>,
    ) -> Self {
        Self {
            config,
            network,
            api,
            page,
        }
    }

    pub async fn run(
        &self,
        tasks: &[PipelineTask],
        dates: &DateRange,
        max_pages: Option<u32>,
        artifacts: &mut JoinArtifacts,
        sink: &PersistenceSink<'_>,
        ctx: &RunContext<'_>,
    ) -> HarvestResult<HarvestStats> {
        let mut stats = HarvestStats::default();

        ctx.report("Phase 1/4: capturing the search request");
        let template = self.search_template(tasks.first(), ctx).await?;
        let summaries = self
            .scan_catalog(&template, tasks, dates, max_pages, &mut stats, ctx)
            .await?;
        ctx.report(format!("Phase 1/4: {} notices listed", summaries.len()));

        ctx.report("Phase 2/4: fetching notice details");
        self.fetch_details(&template, &summaries, &mut artifacts.primary, sink, &mut stats, ctx)
            .await?;

        let bundles = join_bundles(&artifacts.primary.state.rows, &summaries);
        ctx.report(format!("Phase 3/4: joining lots for {} notices", bundles.len()));
        self.join_lot_openings(&template, &bundles, &mut artifacts.lots, sink, &mut stats, ctx)
            .await?;

        ctx.report("Phase 4/4: decomposing contractor results");
        self.decompose_results(
            &template,
            &bundles,
            &mut artifacts.contractors,
            &mut artifacts.goods,
            sink,
            &mut stats,
            ctx,
        )
        .await?;

        info!("Contractor-selection join finished: {:?}", stats);
        Ok(stats)
    }

    async fn post(
        &self,
        ctx: &RunContext<'_>,
        label: &str,
        url: &str,
        body: &Value,
        headers: &[(String, String)],
    ) -> HarvestResult<Value> {
        let api = self.api;
        ctx.retrier()
            .run(label, move || async move {
                api.post_json(url, body, headers).await.map_err(HarvestError::from)
            })
            .await
    }

    async fn search_template(
        &self,
        first_task: Option<&PipelineTask>,
        ctx: &RunContext<'_>,
    ) -> HarvestResult<SearchTemplate> {
        if let Some(page) = self.page {
            let keyword = first_task.map_or("", |task| task.keyword.as_str());
            let engine = self;
            let captured = ctx
                .retrier()
                .run("capture search request", move || engine.capture_search(page, keyword))
                .await?;
            return SearchTemplate::from_capture(captured);
        }
        SearchTemplate::from_config(self.config)?.ok_or_else(|| {
            HarvestError::Config(
                "contractor-selection needs a browser or contractor_selection.search_api_url".into(),
            )
        })
    }

    async fn capture_search(
        &self,
        page: &dyn PageAutomation,
        keyword: &str,
    ) -> HarvestResult<CapturedRequest> {
        let element_timeout = Duration::from_secs(self.network.element_timeout_seconds);
        page.arm_request_capture(&self.config.capture_fragment).await?;
        page.goto(
            &self.config.search_page_url,
            Duration::from_secs(self.network.navigation_timeout_seconds),
        )
        .await?;
        page.wait_for(&self.config.search_input, element_timeout).await?;
        page.fill(&self.config.search_input, keyword).await?;
        page.press(&self.config.search_input, "Enter").await?;
        let captured = page.take_captured_request(element_timeout).await?;
        debug!("Captured {} {}", captured.method, captured.url);
        Ok(captured)
    }

    async fn scan_catalog(
        &self,
        template: &SearchTemplate,
        tasks: &[PipelineTask],
        dates: &DateRange,
        max_pages: Option<u32>,
        stats: &mut HarvestStats,
        ctx: &RunContext<'_>,
    ) -> HarvestResult<Vec<NoticeSummary>> {
        let mut seen = HashSet::new();
        let mut summaries = Vec::new();

        for task in tasks {
            ctx.checkpoint().await?;
            let query = SearchQuery {
                task,
                dates,
                scope_field: &self.config.scope_field,
                date_field: &self.config.date_field,
            };
            let scan = CatalogScan::new(self.api, template, query, self.config.page_size);
            let mut pager = Paginator::new(max_pages);
            while let Some(page) = pager.next_page(&scan, ctx).await? {
                stats.pages += 1;
                ctx.report(format!(
                    "  {} page {}: {} notices",
                    task,
                    page.number,
                    page.items.len()
                ));
                summaries.extend(
                    page.items
                        .into_iter()
                        .filter(|summary| seen.insert(summary.notify_no.clone())),
                );
            }
        }
        Ok(summaries)
    }

    async fn fetch_details(
        &self,
        template: &SearchTemplate,
        summaries: &[NoticeSummary],
        primary: &mut Artifact,
        sink: &PersistenceSink<'_>,
        stats: &mut HarvestStats,
        ctx: &RunContext<'_>,
    ) -> HarvestResult<()> {
        let url = endpoint_url(&self.config.detail_url, template.token.as_deref())?;
        let mut batch = BatchFlusher::new(sink, self.config.detail_batch_size);
        let total = summaries.len();

        for (i, summary) in summaries.iter().enumerate() {
            ctx.checkpoint().await?;
            if primary.state.index.contains(&summary.notify_no) {
                debug!("{} already saved", summary.notify_no);
                stats.skipped += 1;
                continue;
            }
            let Some(notify_id) = summary.notify_id.as_deref() else {
                debug!("{} has no notice id; no detail to fetch", summary.notify_no);
                stats.skipped += 1;
                continue;
            };

            match self
                .post(ctx, "notice detail", &url, &detail_request(notify_id), &template.headers)
                .await
            {
                Ok(response) => {
                    let detail = map_detail(summary, &response);
                    primary.state.record(&summary.notify_no, detail.into_row());
                    stats.collected += 1;
                    ctx.report(format!("  [{}/{}] {}", i + 1, total, summary.notify_no));
                    batch.processed(&[&*primary], stats);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Detail of {} failed: {}", summary.notify_no, e);
                    stats.abandoned += 1;
                }
            }
        }
        batch.finish(&[&*primary], stats);
        Ok(())
    }

    async fn join_lot_openings(
        &self,
        template: &SearchTemplate,
        bundles: &[JoinKeys],
        lots: &mut Artifact,
        sink: &PersistenceSink<'_>,
        stats: &mut HarvestStats,
        ctx: &RunContext<'_>,
    ) -> HarvestResult<()> {
        let token = template.token.as_deref();
        let lot_url = endpoint_url(&self.config.lot_url, token)?;
        let open_url = endpoint_url(&self.config.bid_open_url, token)?;
        let mut batch = BatchFlusher::new(sink, self.config.detail_batch_size);

        for keys in bundles {
            ctx.checkpoint().await?;
            if lots.state.index.contains(&keys.notify_no) {
                continue;
            }
            let Some(bid_id) = keys.bid_id.as_deref() else {
                debug!("{} has no bid id; skipping lot join", keys.notify_no);
                continue;
            };

            let body = bid_request(bid_id);
            let lot_list = match self.post(ctx, "lot list", &lot_url, &body, &template.headers).await {
                Ok(response) => response,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Lots of {} unavailable: {}", keys.notify_no, e);
                    stats.abandoned += 1;
                    continue;
                }
            };
            let openings = match self.post(ctx, "bid opening", &open_url, &body, &template.headers).await {
                Ok(response) => response,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    // bidder counts would read as zero; retry the notice next run
                    warn!("Bid opening of {} unavailable: {}", keys.notify_no, e);
                    stats.abandoned += 1;
                    continue;
                }
            };

            let rows = join_lots(&keys.notify_no, &lot_list, &openings);
            if rows.is_empty() {
                debug!("{} lists no lots", keys.notify_no);
            }
            lots.state.extend_rows(rows.iter().map(LotRow::to_row));
            lots.state.index.insert(&keys.notify_no);
            batch.processed(&[&*lots], stats);
        }
        batch.finish(&[&*lots], stats);
        Ok(())
    }

    async fn decompose_results(
        &self,
        template: &SearchTemplate,
        bundles: &[JoinKeys],
        contractors: &mut Artifact,
        goods: &mut Artifact,
        sink: &PersistenceSink<'_>,
        stats: &mut HarvestStats,
        ctx: &RunContext<'_>,
    ) -> HarvestResult<()> {
        let url = endpoint_url(&self.config.result_url, template.token.as_deref())?;
        let mut batch = BatchFlusher::new(sink, self.config.detail_batch_size);

        for keys in bundles {
            ctx.checkpoint().await?;
            if contractors.state.index.contains(&keys.notify_no) {
                continue;
            }
            let Some(result_id) = keys.input_result_id.as_deref() else {
                debug!("{} has no published result", keys.notify_no);
                continue;
            };

            let response = match self
                .post(ctx, "contractor result", &url, &result_request(result_id), &template.headers)
                .await
            {
                Ok(response) => response,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Result of {} unavailable: {}", keys.notify_no, e);
                    stats.abandoned += 1;
                    continue;
                }
            };

            let decomposed = decompose(&keys.notify_no, &response);
            if decomposed.is_empty() {
                debug!("{} result holds no contractors or goods", keys.notify_no);
            }
            contractors
                .state
                .extend_rows(decomposed.contractors.iter().map(ContractorResultRow::to_row));
            goods
                .state
                .extend_rows(decomposed.goods.iter().map(GoodsLineRow::to_row));
            contractors.state.index.insert(&keys.notify_no);
            goods.state.index.insert(&keys.notify_no);
            batch.processed(&[&*contractors, &*goods], stats);
        }
        batch.finish(&[&*contractors, &*goods], stats);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Row;

    fn primary_row(notify_no: &str, bid_id: &str, result_id: &str) -> Row {
        let mut row = Row::new();
        row.insert(columns::NOTIFY_NO.into(), notify_no.into());
        row.insert(columns::BID_ID.into(), bid_id.into());
        row.insert(columns::INPUT_RESULT_ID.into(), result_id.into());
        row
    }

    fn summary(notify_no: &str, notify_id: Option<&str>, result_id: Option<&str>) -> NoticeSummary {
        NoticeSummary {
            notify_no: notify_no.into(),
            notify_id: notify_id.map(Into::into),
            input_result_id: result_id.map(Into::into),
            bid_name: String::new(),
            investor_name: String::new(),
            public_date: String::new(),
            status: String::new(),
        }
    }

    #[test]
    fn bundles_are_rebuilt_from_rows_and_refreshed() {
        let rows = AccumulatedRowSet::from_rows(vec![
            primary_row("IB1", "b-1", ""),
            primary_row("IB2", "", "r-2"),
            primary_row("IB1", "b-1", ""),
        ]);
        let summaries = vec![summary("IB1", None, Some("r-1"))];

        let bundles = join_bundles(&rows, &summaries);
        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[0].bid_id.as_deref(), Some("b-1"));
        assert_eq!(bundles[0].input_result_id.as_deref(), Some("r-1"));
        assert_eq!(bundles[1].bid_id, None);
    }

    #[test]
    fn catalog_notices_without_primary_rows_still_get_bundles() {
        let rows = AccumulatedRowSet::from_rows(vec![primary_row("IB1", "b-1", "")]);
        let summaries = vec![
            summary("IB1", Some("n-1"), None),
            summary("IB3", None, Some("r-3")),
            summary("IB4", Some("n-4"), None),
        ];

        let bundles = join_bundles(&rows, &summaries);

        let numbers: Vec<&str> = bundles.iter().map(|k| k.notify_no.as_str()).collect();
        assert_eq!(numbers, vec!["IB1", "IB3", "IB4"]);
        assert_eq!(bundles[0].notify_id.as_deref(), Some("n-1"));
        assert_eq!(bundles[1].input_result_id.as_deref(), Some("r-3"));
        assert_eq!(bundles[1].bid_id, None);
        assert_eq!(bundles[2].notify_id.as_deref(), Some("n-4"));
    }
}
