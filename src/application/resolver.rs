//! Per-item detail resolution: dedup check, open, extract, return.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::application::context::RunContext;
use crate::application::extraction::CrossFill;
use crate::application::retry::Attempted;
use crate::domain::{CatalogItem, DetailRecord, HarvestError, HarvestResult, ProcessedIndex};

/// Where detail views come from
#[async_trait]
pub trait DetailSource: Send + Sync {
    /// Opens the detail view of `item` and waits until it is rendered
    async fn open_detail(&self, item: &CatalogItem) -> HarvestResult<()>;

    /// Extracts the currently open detail view
    async fn read_detail(&self) -> HarvestResult<DetailRecord>;

    /// Back to the listing the item came from
    async fn return_to_listing(&self) -> HarvestResult<()>;

    /// Full reload of the listing; the coarse recovery
    async fn reload_listing(&self) -> HarvestResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved {
        /// Listing id, else the detail id, else the title
        id: String,
        /// Key the item was looked up by on the listing
        listing_key: String,
        record: DetailRecord,
    },
    /// Already present in the output; nothing was fetched
    Skipped { id: String },
    Abandoned { id: String, reason: String },
}

pub struct ItemResolver<'a> {
    source: &'a dyn DetailSource,
    cross_fill: &'a CrossFill,
    /// Column holding the detail-level identifier
    identifier_column: Option<&'a str>,
}

impl<'a> ItemResolver<'a> {
    pub fn new(
        source: &'a dyn DetailSource,
        cross_fill: &'a CrossFill,
        identifier_column: Option<&'a str>,
    ) -> Self {
        Self {
            source,
            cross_fill,
            identifier_column,
        }
    }

    pub async fn resolve(
        &self,
        item: &CatalogItem,
        index: &ProcessedIndex,
        ctx: &RunContext<'_>,
    ) -> HarvestResult<Resolution> {
        let Some(item_id) = item.item_id() else {
            return Ok(Resolution::Abandoned {
                id: format!("#{}", item.position + 1),
                reason: "listing entry has neither identifier nor title".into(),
            });
        };
        if index.contains(&item_id) {
            debug!("Skipping {} (already saved)", item_id);
            return Ok(Resolution::Skipped { id: item_id });
        }

        let source = self.source;
        let opened = ctx
            .retrier()
            .run_or_escalate(
                "open detail",
                || source.open_detail(item),
                || self.recover_listing(ctx),
            )
            .await;
        match opened {
            Ok(Attempted::Completed(())) => {}
            Ok(Attempted::Recovered(e)) => {
                return Ok(Resolution::Abandoned {
                    id: item_id,
                    reason: e.to_string(),
                });
            }
            Err(HarvestError::Abandoned { reason, .. }) => {
                return Ok(Resolution::Abandoned { id: item_id, reason });
            }
            Err(e) => return Err(e),
        }

        let mut record = match ctx.retrier().run("read detail", || source.read_detail()).await {
            Ok(record) => record,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                self.restore_listing(ctx).await?;
                return Ok(Resolution::Abandoned {
                    id: item_id,
                    reason: e.to_string(),
                });
            }
        };
        self.cross_fill.apply(&mut record);

        let id = item
            .list_id
            .clone()
            .or_else(|| {
                self.identifier_column
                    .and_then(|column| record.get(column))
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
            })
            .unwrap_or_else(|| item_id.clone());
        if let Some(column) = self.identifier_column {
            record.fill(column, &id);
        }

        self.restore_listing(ctx).await?;
        Ok(Resolution::Resolved {
            id,
            listing_key: item_id,
            record,
        })
    }

    /// Back, else reload; fails only when both fail
    async fn recover_listing(&self, ctx: &RunContext<'_>) -> HarvestResult<()> {
        let once = ctx.retry.once();
        let source = self.source;
        match ctx
            .retrier_with(&once)
            .run("return to listing", || source.return_to_listing())
            .await
        {
            Ok(()) => return Ok(()),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => warn!("Back navigation failed ({}); reloading listing", e),
        }
        ctx.retrier().run("reload listing", || source.reload_listing()).await
    }

    /// Like `recover_listing`, but a total failure is only logged; the next
    /// item starts with another recovery attempt.
    async fn restore_listing(&self, ctx: &RunContext<'_>) -> HarvestResult<()> {
        match self.recover_listing(ctx).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!("Listing could not be restored: {}", e);
                Ok(())
            }
        }
    }
}
