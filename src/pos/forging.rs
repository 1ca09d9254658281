// src/pos/forging.rs

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pos::error::{ConfigurationError, SchedulerError};
use crate::pos::history::HistoricalTimestampOracle;
use crate::pos::milestones::{MilestoneConfig, MilestoneSchedule};
use crate::pos::slots::{EpochAnchor, SlotInfo};
use crate::pos::{Height, Slot, Timestamp};

/// Who forges now, who forges next, and whether this is the instant to do it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgingDecision {
    pub current_forger: u32,
    pub next_forger: u32,
    /// Opening instant of the slot containing `now`; the timestamp the block must carry.
    pub block_timestamp: Timestamp,
    /// True only when `now == block_timestamp`.
    pub can_forge: bool,
}

/// Delegated round-robin slot scheduler.
///
/// Pure function of `(now, last_confirmed_height)`, the milestone schedule and the
/// chain history, except for a memoized chain of epoch anchors. The anchors live in an
/// immutable snapshot swapped atomically, so concurrent callers never see a partial update.
/// Each boundary is queried from history at most once per cache lifetime.
pub struct SlotCalculator<O> {
    schedule: Arc<MilestoneSchedule>,
    oracle: O,
    // anchors[k] is the anchor of epoch k; always holds at least the genesis anchor.
    anchors: ArcSwap<Vec<EpochAnchor>>,
    recalibration: Mutex<()>,
}

impl<O: HistoricalTimestampOracle> SlotCalculator<O> {
    pub fn new(schedule: impl Into<Arc<MilestoneSchedule>>, oracle: O) -> Self {
        let schedule = schedule.into();
        let genesis = EpochAnchor::genesis(schedule.genesis());
        Self {
            schedule,
            oracle,
            anchors: ArcSwap::from_pointee(vec![genesis]),
            recalibration: Mutex::new(()),
        }
    }

    /// Materialize `milestones` and build a calculator over them.
    pub fn from_milestones(milestones: Vec<MilestoneConfig>, oracle: O) -> Result<Self, ConfigurationError> {
        Ok(Self::new(MilestoneSchedule::materialize(milestones)?, oracle))
    }

    pub fn schedule(&self) -> &MilestoneSchedule {
        &self.schedule
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Decide the forging state for wall-clock `now` given the last confirmed height.
    pub fn evaluate(&self, now: Timestamp, last_height: Height) -> Result<ForgingDecision, SchedulerError> {
        let anchor = self.anchor_for(last_height)?;
        let slot = anchor.slot_number(now);
        let block_timestamp = anchor.slot_start(slot);

        // The next block (height last_height + 1) may already fall under a different rotation size.
        let next_rotation = self.schedule.resolve(last_height.saturating_add(1)).rotation_size;

        Ok(ForgingDecision {
            current_forger: EpochAnchor::rotation_index(slot, anchor.rotation_size),
            next_forger: EpochAnchor::rotation_index(slot.saturating_add(1), next_rotation),
            block_timestamp,
            can_forge: now == block_timestamp,
        })
    }

    pub fn slot_number(&self, now: Timestamp, last_height: Height) -> Result<Slot, SchedulerError> {
        Ok(self.anchor_for(last_height)?.slot_number(now))
    }

    /// Opening instant of `slot` under the epoch governing `last_height`.
    pub fn slot_start(&self, slot: Slot, last_height: Height) -> Result<Timestamp, SchedulerError> {
        Ok(self.anchor_for(last_height)?.slot_start(slot))
    }

    pub fn slot_info(&self, now: Timestamp, last_height: Height) -> Result<SlotInfo, SchedulerError> {
        Ok(self.anchor_for(last_height)?.slot_info(now))
    }

    pub fn is_forging_allowed(&self, now: Timestamp, last_height: Height) -> Result<bool, SchedulerError> {
        Ok(self.evaluate(now, last_height)?.can_forge)
    }

    /// Anchor of the epoch governing `height`, recalibrating if that epoch has not been
    /// anchored yet.
    pub fn anchor_for(&self, height: Height) -> Result<EpochAnchor, SchedulerError> {
        let epoch = self.schedule.epoch_index(height);
        if let Some(anchor) = self.anchors.load().get(epoch) {
            return Ok(*anchor);
        }
        self.recalibrate(epoch)
    }

    /// Drop every cached anchor except genesis. Later calls rebuild them from history.
    pub fn invalidate(&self) {
        let _guard = self.recalibration.lock().unwrap_or_else(PoisonError::into_inner);
        let genesis = EpochAnchor::genesis(self.schedule.genesis());
        self.anchors.store(Arc::new(vec![genesis]));
    }

    /// Number of epochs currently anchored (genesis included).
    pub fn anchored_epochs(&self) -> usize {
        self.anchors.load().len()
    }

    fn recalibrate(&self, epoch: usize) -> Result<EpochAnchor, SchedulerError> {
        let _guard = self.recalibration.lock().unwrap_or_else(PoisonError::into_inner);

        // Another caller may have anchored this epoch while we waited.
        let current = self.anchors.load_full();
        if let Some(anchor) = current.get(epoch) {
            return Ok(*anchor);
        }

        let mut chain: Vec<EpochAnchor> = current.as_ref().clone();
        let mut result: Result<(), SchedulerError> = Ok(());

        while chain.len() <= epoch {
            let previous = chain[chain.len() - 1];
            let Some(next) = self.schedule.epoch(chain.len()) else {
                break;
            };

            let boundary = next.activation_height - 1;
            let boundary_timestamp = match self.boundary_timestamp(&chain[0], boundary) {
                Ok(ts) => ts,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            };

            let anchor = previous.successor(next, boundary_timestamp);
            debug!(
                epoch = anchor.epoch,
                boundary_height = boundary,
                boundary_timestamp,
                anchor_timestamp = anchor.anchor_timestamp,
                anchor_slot_base = anchor.anchor_slot_base,
                block_interval = anchor.block_interval,
                rotation_size = anchor.rotation_size,
                "epoch anchor recalibrated"
            );
            chain.push(anchor);
        }

        // Keep whatever boundaries were resolved, even if a later one is not in history yet.
        if chain.len() > current.len() {
            self.anchors.store(Arc::new(chain.clone()));
        }

        result?;
        Ok(chain[epoch])
    }

    // The genesis block is stamped at the genesis anchor by definition; only later
    // boundaries come from history.
    fn boundary_timestamp(&self, genesis: &EpochAnchor, boundary: Height) -> Result<Timestamp, SchedulerError> {
        if boundary == genesis.anchor_height {
            return Ok(genesis.anchor_timestamp);
        }
        Ok(self.oracle.timestamp_at(boundary)?)
    }
}
