//! Declarative retry combinator.
//!
//! Every attempt is preceded by a connectivity check and bounded by a
//! timeout; backoff sleeps are cancellable. Cancellation is never retried.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::application::connectivity::ConnectivityGuard;
use crate::application::control::ControlSignal;
use crate::domain::{HarvestError, HarvestResult};
use crate::infrastructure::LivenessProbe;
use crate::infrastructure::config::RetryConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            jitter: Duration::from_millis(config.jitter_ms),
            attempt_timeout: Duration::from_secs(config.attempt_timeout_seconds),
        }
    }

    /// Single attempt, no backoff
    pub fn once(&self) -> Self {
        Self {
            max_attempts: 1,
            ..self.clone()
        }
    }

    pub fn with_attempts(&self, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..self.clone()
        }
    }

    /// Delay after failed attempt `attempt` (1-based), capped and jittered
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()));
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            capped
        } else {
            capped + Duration::from_millis(fastrand::u64(0..=jitter_ms))
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Outcome of `run_or_escalate`
#[derive(Debug)]
pub enum Attempted<T> {
    Completed(T),
    /// The operation was exhausted but the escalation restored a usable state
    Recovered(HarvestError),
}

pub struct Retrier<'a> {
    policy: &'a RetryPolicy,
    guard: &'a ConnectivityGuard,
    probe: &'a dyn LivenessProbe,
    control: &'a ControlSignal,
}

impl<'a> Retrier<'a> {
    pub fn new(
        policy: &'a RetryPolicy,
        guard: &'a ConnectivityGuard,
        probe: &'a dyn LivenessProbe,
        control: &'a ControlSignal,
    ) -> Self {
        Self {
            policy,
            guard,
            probe,
            control,
        }
    }

    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> HarvestResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = HarvestResult<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            self.guard.ensure_online(self.probe, self.control).await?;

            let outcome = match tokio::time::timeout(self.policy.attempt_timeout, op()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(HarvestError::timeout(label, self.policy.attempt_timeout.as_secs())),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("{} failed (attempt {}/{}): {}", label, attempt, max_attempts, e);
                    last_error = Some(e);
                    if attempt < max_attempts {
                        self.control.sleep(self.policy.delay_for(attempt)).await?;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| HarvestError::automation(format!("{label} never ran"))))
    }

    /// Runs `op` with retries; when exhausted, runs `escalate` once.
    /// A failed escalation abandons the item.
    pub async fn run_or_escalate<T, F, Fut, E, EFut>(
        &self,
        label: &str,
        op: F,
        escalate: E,
    ) -> HarvestResult<Attempted<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = HarvestResult<T>>,
        E: FnOnce() -> EFut,
        EFut: Future<Output = HarvestResult<()>>,
    {
        match self.run(label, op).await {
            Ok(value) => Ok(Attempted::Completed(value)),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!("{} exhausted; escalating recovery", label);
                self.guard.ensure_online(self.probe, self.control).await?;
                match escalate().await {
                    Ok(()) => Ok(Attempted::Recovered(e)),
                    Err(recovery) if recovery.is_cancelled() => Err(recovery),
                    Err(recovery) => Err(HarvestError::abandoned(
                        label,
                        format!("{e}; recovery failed: {recovery}"),
                    )),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::control::control_pair;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysOnline;

    #[async_trait]
    impl LivenessProbe for AlwaysOnline {
        async fn is_online(&self) -> anyhow::Result<bool> {
            Ok(true)
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: Duration::ZERO,
            attempt_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn delays_grow_and_cap() {
        let policy = policy();
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(10), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let (_handle, signal) = control_pair();
        let guard = ConnectivityGuard::new(Duration::from_secs(5), Duration::from_secs(1));
        let policy = policy();
        let retrier = Retrier::new(&policy, &guard, &AlwaysOnline, &signal);
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let value = retrier
            .run("click item", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(HarvestError::automation("detached"))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_not_retried() {
        let (_handle, signal) = control_pair();
        let guard = ConnectivityGuard::new(Duration::from_secs(5), Duration::from_secs(1));
        let policy = policy();
        let retrier = Retrier::new(&policy, &guard, &AlwaysOnline, &signal);
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let outcome: HarvestResult<()> = retrier
            .run("fetch", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HarvestError::Cancelled)
            })
            .await;

        assert!(outcome.unwrap_err().is_cancelled());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_attempts_time_out() {
        let (_handle, signal) = control_pair();
        let guard = ConnectivityGuard::new(Duration::from_secs(5), Duration::from_secs(1));
        let policy = policy().once();
        let retrier = Retrier::new(&policy, &guard, &AlwaysOnline, &signal);

        let outcome: HarvestResult<()> = retrier
            .run("wait for list", || std::future::pending())
            .await;
        assert!(matches!(outcome, Err(HarvestError::Timeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn escalation_outcomes() {
        let (_handle, signal) = control_pair();
        let guard = ConnectivityGuard::new(Duration::from_secs(5), Duration::from_secs(1));
        let policy = policy();
        let retrier = Retrier::new(&policy, &guard, &AlwaysOnline, &signal);

        let recovered: Attempted<()> = retrier
            .run_or_escalate(
                "open detail",
                || async { Err(HarvestError::automation("no marker")) },
                || async { Ok(()) },
            )
            .await
            .unwrap();
        assert!(matches!(recovered, Attempted::Recovered(_)));

        let abandoned = retrier
            .run_or_escalate(
                "open detail",
                || async { Err::<(), _>(HarvestError::automation("no marker")) },
                || async { Err(HarvestError::automation("reload failed")) },
            )
            .await;
        assert!(matches!(abandoned, Err(HarvestError::Abandoned { .. })));
    }
}
