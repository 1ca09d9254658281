// src/pos/mod.rs

pub mod error;
pub mod forging;
pub mod history;
pub mod milestones;
pub mod slots;

/// Block height. Genesis is height 1.
pub type Height = u64;

/// Seconds since network genesis.
pub type Timestamp = i64;

/// Global slot number, continuous across epochs.
pub type Slot = i64;

pub use error::{ConfigurationError, HistoryUnavailable, SchedulerError};
pub use forging::{ForgingDecision, SlotCalculator};
pub use history::{FnHistory, HistoricalTimestampOracle, InMemoryHistory};
pub use milestones::{Milestone, MilestoneConfig, MilestoneSchedule};
pub use slots::{EpochAnchor, NetworkClock, SlotInfo};
