//! Blocks remote work until the liveness probe reports online.

use std::time::Duration;

use tracing::{info, warn};

use crate::application::control::ControlSignal;
use crate::domain::HarvestResult;
use crate::infrastructure::config::ConnectivityConfig;
use crate::infrastructure::LivenessProbe;

#[derive(Debug, Clone)]
pub struct ConnectivityGuard {
    poll_interval: Duration,
    probe_timeout: Duration,
}

impl ConnectivityGuard {
    pub fn new(poll_interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            poll_interval,
            probe_timeout,
        }
    }

    pub fn from_config(config: &ConnectivityConfig) -> Self {
        Self::new(
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_millis(config.probe_timeout_ms),
        )
    }

    /// Returns once the probe answers `true`. Probe errors and probe timeouts
    /// count as offline; cancellation is observed on every poll.
    pub async fn ensure_online(
        &self,
        probe: &dyn LivenessProbe,
        control: &ControlSignal,
    ) -> HarvestResult<()> {
        let mut offline_since_poll = 0_u32;
        loop {
            control.ensure_not_cancelled()?;
            match tokio::time::timeout(self.probe_timeout, probe.is_online()).await {
                Ok(Ok(true)) => {
                    if offline_since_poll > 0 {
                        info!("Connection restored after {} checks", offline_since_poll);
                    }
                    return Ok(());
                }
                Ok(Ok(false)) => {
                    if offline_since_poll == 0 {
                        warn!("Internet connection lost; waiting to reconnect...");
                    }
                }
                Ok(Err(e)) => warn!("Connectivity check failed: {}; retrying", e),
                Err(_) => warn!("Connectivity check timed out; retrying"),
            }
            offline_since_poll += 1;
            control.sleep(self.poll_interval).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::control::control_pair;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays a scripted sequence of probe answers, then reports online
    struct ScriptedProbe {
        script: Mutex<Vec<Option<bool>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedProbe {
        fn new(mut script: Vec<Option<bool>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl LivenessProbe for ScriptedProbe {
        async fn is_online(&self) -> anyhow::Result<bool> {
            *self.calls.lock().unwrap() += 1;
            match self.script.lock().unwrap().pop() {
                Some(Some(online)) => Ok(online),
                Some(None) => Err(anyhow!("evaluate failed")),
                None => Ok(true),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_through_offline_and_probe_errors() {
        let (_handle, signal) = control_pair();
        let probe = ScriptedProbe::new(vec![Some(false), None, Some(false), Some(true)]);
        let guard = ConnectivityGuard::new(Duration::from_secs(5), Duration::from_secs(1));

        guard.ensure_online(&probe, &signal).await.unwrap();
        assert_eq!(*probe.calls.lock().unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_ends_the_wait() {
        let (handle, signal) = control_pair();
        let probe = ScriptedProbe::new(vec![Some(false); 1000]);
        let guard = ConnectivityGuard::new(Duration::from_secs(5), Duration::from_secs(1));

        let canceller = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            canceller.cancel();
        });
        let outcome = guard.ensure_online(&probe, &signal).await;
        assert!(outcome.unwrap_err().is_cancelled());
    }
}
