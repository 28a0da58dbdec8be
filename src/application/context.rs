//! Per-run collaborators threaded through every component.

use std::time::Duration;

use crate::application::connectivity::ConnectivityGuard;
use crate::application::control::{Checkpoint, ControlSignal};
use crate::application::progress::ProgressSink;
use crate::application::retry::{Retrier, RetryPolicy};
use crate::domain::HarvestResult;
use crate::infrastructure::LivenessProbe;
use crate::infrastructure::config::PacingConfig;

pub struct RunContext<'a> {
    pub control: &'a ControlSignal,
    pub guard: &'a ConnectivityGuard,
    pub probe: &'a dyn LivenessProbe,
    pub retry: &'a RetryPolicy,
    pub pacing: &'a PacingConfig,
    pub progress: &'a dyn ProgressSink,
}

impl RunContext<'_> {
    pub fn retrier(&self) -> Retrier<'_> {
        Retrier::new(self.retry, self.guard, self.probe, self.control)
    }

    pub fn retrier_with<'p>(&'p self, policy: &'p RetryPolicy) -> Retrier<'p> {
        Retrier::new(policy, self.guard, self.probe, self.control)
    }

    /// Control checkpoint; after a resume, waits for connectivity
    pub async fn checkpoint(&self) -> HarvestResult<()> {
        if self.control.checkpoint().await? == Checkpoint::Resumed {
            self.ensure_online().await?;
        }
        Ok(())
    }

    pub async fn ensure_online(&self) -> HarvestResult<()> {
        self.guard.ensure_online(self.probe, self.control).await
    }

    pub async fn sleep(&self, duration: Duration) -> HarvestResult<()> {
        self.control.sleep(duration).await
    }

    /// Random delay between two items, inside the configured range
    pub async fn polite_delay(&self) -> HarvestResult<()> {
        let min = self.pacing.item_delay_min_ms;
        let max = self.pacing.item_delay_max_ms.max(min);
        self.sleep(Duration::from_millis(fastrand::u64(min..=max))).await
    }

    pub fn report(&self, line: impl AsRef<str>) {
        self.progress.line(line.as_ref());
    }
}
