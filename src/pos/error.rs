// src/pos/error.rs

use thiserror::Error;

use crate::pos::Height;

/// A milestone schedule that cannot drive slot arithmetic.
/// Detected once, when the schedule is materialized; never recovered automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("milestone schedule is empty; a genesis milestone is required")]
    EmptySchedule,
    #[error("milestone activation height must be >= 1")]
    ZeroActivationHeight,
    #[error("milestone heights must be strictly increasing: {height} follows {previous}")]
    NonIncreasingHeight { previous: Height, height: Height },
    #[error("genesis milestone is missing `{field}`")]
    MissingGenesisField { field: &'static str },
    #[error("milestone at height {height} has a zero block interval")]
    ZeroInterval { height: Height },
    #[error("milestone at height {height} has a zero rotation size")]
    ZeroRotation { height: Height },
}

/// The chain history cannot answer for a height that is needed to anchor an epoch.
/// Transient: the caller retries on its next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no block timestamp recorded at height {height}")]
pub struct HistoryUnavailable {
    pub height: Height,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    HistoryUnavailable(#[from] HistoryUnavailable),
}

impl SchedulerError {
    /// Whether retrying on a later tick can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SchedulerError::HistoryUnavailable(_))
    }
}
