//! Error taxonomy shared by every harvesting component
//!
//! Structural misses (a selector that matches nothing, a JSON field that is
//! absent) are not errors: the extraction cascade simply yields empty values.
//! The variants below describe conditions that change control flow:
//! - `Offline`, `Automation`, `Timeout` and `Http` are retried
//! - `Abandoned` drops a single item, never the run
//! - `Cancelled` is the only variant that unwinds a whole run

use thiserror::Error;

/// Result alias used across the application layer
pub type HarvestResult<T> = Result<T, HarvestError>;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("run cancelled by operator")]
    Cancelled,

    #[error("network unavailable: {0}")]
    Offline(String),

    #[error("automation step failed: {0}")]
    Automation(String),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("unexpected response shape: {0}")]
    Decode(String),

    #[error("item '{item}' abandoned: {reason}")]
    Abandoned { item: String, reason: String },

    #[error("failed to persist {path}: {message}")]
    Persistence { path: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl HarvestError {
    pub fn automation(message: impl Into<String>) -> Self {
        Self::Automation(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            seconds,
        }
    }

    pub fn abandoned(item: impl Into<String>, reason: impl ToString) -> Self {
        Self::Abandoned {
            item: item.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether another attempt of the same operation can reasonably succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Offline(_) | Self::Automation(_) | Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_)
            | Self::Abandoned { .. }
            | Self::Cancelled
            | Self::Persistence { .. }
            | Self::Config(_) => false,
        }
    }
}

/// Adapters report failures through `anyhow`; a `HarvestError` travelling
/// inside one is recovered as-is so cancellation is never flattened.
impl From<anyhow::Error> for HarvestError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<HarvestError>() {
            Ok(inner) => inner,
            Err(other) => Self::Automation(format!("{other:#}")),
        }
    }
}

impl From<serde_json::Error> for HarvestError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anyhow_wrapping_preserves_cancellation() {
        let wrapped = anyhow::Error::new(HarvestError::Cancelled);
        assert!(HarvestError::from(wrapped).is_cancelled());
    }

    #[test]
    fn foreign_errors_become_automation_failures() {
        let err = HarvestError::from(anyhow::anyhow!("element detached"));
        assert!(matches!(err, HarvestError::Automation(ref m) if m.contains("detached")));
        assert!(err.is_recoverable());
    }

    #[test]
    fn client_errors_are_not_retried() {
        let not_found = HarvestError::Http { status: 404, url: "x".into() };
        let throttled = HarvestError::Http { status: 429, url: "x".into() };
        assert!(!not_found.is_recoverable());
        assert!(throttled.is_recoverable());
    }
}
