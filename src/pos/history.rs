// src/pos/history.rs

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::pos::error::HistoryUnavailable;
use crate::pos::{Height, Timestamp};

/// Read-only view of already-materialized chain history.
/// Implementations answer synchronously from local, durable data.
pub trait HistoricalTimestampOracle: Send + Sync {
    /// Timestamp recorded on-chain for the block at `height`.
    fn timestamp_at(&self, height: Height) -> Result<Timestamp, HistoryUnavailable>;
}

impl<T: HistoricalTimestampOracle + ?Sized> HistoricalTimestampOracle for std::sync::Arc<T> {
    fn timestamp_at(&self, height: Height) -> Result<Timestamp, HistoryUnavailable> {
        (**self).timestamp_at(height)
    }
}

impl<T: HistoricalTimestampOracle + ?Sized> HistoricalTimestampOracle for &T {
    fn timestamp_at(&self, height: Height) -> Result<Timestamp, HistoryUnavailable> {
        (**self).timestamp_at(height)
    }
}

/// Height -> timestamp index kept in memory. The node appends to it as blocks are applied.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    blocks: RwLock<BTreeMap<Height, Timestamp>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blocks(blocks: impl IntoIterator<Item = (Height, Timestamp)>) -> Self {
        Self { blocks: RwLock::new(blocks.into_iter().collect()) }
    }

    /// Record (or overwrite) the timestamp of the block at `height`.
    pub fn record(&self, height: Height, timestamp: Timestamp) {
        self.blocks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(height, timestamp);
    }

    /// Highest recorded height, if any.
    pub fn tip(&self) -> Option<(Height, Timestamp)> {
        self.blocks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .next_back()
            .map(|(h, ts)| (*h, *ts))
    }

    pub fn len(&self) -> usize {
        self.blocks.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistoricalTimestampOracle for InMemoryHistory {
    fn timestamp_at(&self, height: Height) -> Result<Timestamp, HistoryUnavailable> {
        self.blocks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&height)
            .copied()
            .ok_or(HistoryUnavailable { height })
    }
}

/// Adapts a lookup closure (`None` = not in history yet) to the oracle trait.
pub struct FnHistory<F>(pub F);

impl<F> HistoricalTimestampOracle for FnHistory<F>
where
    F: Fn(Height) -> Option<Timestamp> + Send + Sync,
{
    fn timestamp_at(&self, height: Height) -> Result<Timestamp, HistoryUnavailable> {
        (self.0)(height).ok_or(HistoryUnavailable { height })
    }
}
