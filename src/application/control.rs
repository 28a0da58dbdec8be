//! Cooperative pause / resume / stop between the operator and the pipeline.
//!
//! Cancellation is terminal (`CancellationToken`); the running flag is
//! reversible (`watch<bool>`). The pipeline only observes, the operator only
//! writes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::{HarvestError, HarvestResult};

/// What the caller must do after passing a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Proceed,
    /// The run was paused; connectivity must be re-validated before continuing
    Resumed,
}

/// Operator side: pause, resume, stop
#[derive(Debug, Clone)]
pub struct ControlHandle {
    cancel: CancellationToken,
    running: Arc<watch::Sender<bool>>,
}

impl ControlHandle {
    pub fn pause(&self) {
        if !self.running.send_replace(false) {
            return;
        }
        info!("Pause requested");
    }

    pub fn resume(&self) {
        if self.running.send_replace(true) {
            return;
        }
        info!("Resume requested");
    }

    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            info!("Stop requested");
        }
        self.cancel.cancel();
    }

    pub fn is_paused(&self) -> bool {
        !*self.running.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Pipeline side
#[derive(Debug, Clone)]
pub struct ControlSignal {
    cancel: CancellationToken,
    running: watch::Receiver<bool>,
}

pub fn control_pair() -> (ControlHandle, ControlSignal) {
    let cancel = CancellationToken::new();
    let (tx, rx) = watch::channel(true);
    (
        ControlHandle {
            cancel: cancel.clone(),
            running: Arc::new(tx),
        },
        ControlSignal { cancel, running: rx },
    )
}

impl ControlSignal {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn ensure_not_cancelled(&self) -> HarvestResult<()> {
        if self.is_cancelled() {
            Err(HarvestError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Blocks while paused; errors once cancelled.
    ///
    /// A paused run whose operator handle is dropped can never resume and is
    /// treated as cancelled.
    pub async fn checkpoint(&self) -> HarvestResult<Checkpoint> {
        self.ensure_not_cancelled()?;
        let mut running = self.running.clone();
        if *running.borrow_and_update() {
            return Ok(Checkpoint::Proceed);
        }

        info!("Paused; waiting for resume");
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return Err(HarvestError::Cancelled),
                changed = running.changed() => {
                    if changed.is_err() {
                        return Err(HarvestError::Cancelled);
                    }
                    if *running.borrow_and_update() {
                        break;
                    }
                }
            }
        }
        self.ensure_not_cancelled()?;
        info!("Resumed");
        Ok(Checkpoint::Resumed)
    }

    /// Sleeps for `duration` unless cancelled first
    pub async fn sleep(&self, duration: Duration) -> HarvestResult<()> {
        if duration.is_zero() {
            return self.ensure_not_cancelled();
        }
        tokio::select! {
            () = self.cancel.cancelled() => Err(HarvestError::Cancelled),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn running_signal_passes_straight_through() {
        let (_handle, signal) = control_pair();
        assert_eq!(signal.checkpoint().await.unwrap(), Checkpoint::Proceed);
    }

    #[tokio::test]
    async fn pause_blocks_until_resume() {
        let (handle, signal) = control_pair();
        handle.pause();

        let blocked = tokio::time::timeout(Duration::from_millis(50), signal.checkpoint()).await;
        assert!(blocked.is_err(), "checkpoint must not return while paused");

        let resumer = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            resumer.resume();
        });
        assert_eq!(signal.checkpoint().await.unwrap(), Checkpoint::Resumed);
    }

    #[tokio::test]
    async fn cancel_wakes_a_paused_pipeline() {
        let (handle, signal) = control_pair();
        handle.pause();
        let canceller = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        assert!(signal.checkpoint().await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn dropping_the_handle_while_paused_cancels() {
        let (handle, signal) = control_pair();
        handle.pause();
        drop(handle);
        assert!(signal.checkpoint().await.unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_interrupted_by_cancel() {
        let (handle, signal) = control_pair();
        handle.cancel();
        let outcome = signal.sleep(Duration::from_secs(3600)).await;
        assert!(outcome.unwrap_err().is_cancelled());
    }
}
