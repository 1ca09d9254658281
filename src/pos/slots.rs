// src/pos/slots.rs

use serde::{Deserialize, Serialize};

use crate::pos::milestones::Milestone;
use crate::pos::{Height, Slot, Timestamp};

/// Converts UNIX wall-clock seconds to network time.
/// - `genesis_unix_secs` is the UNIX timestamp at which network time 0 (slot 0) starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetworkClock {
    pub genesis_unix_secs: u64, // fixed at genesis
}

impl NetworkClock {
    pub fn new(genesis_unix_secs: u64) -> Self {
        Self { genesis_unix_secs }
    }

    /// Network time for `now_unix_secs`. Pre-genesis instants map to negative times.
    #[inline]
    pub fn network_time(&self, now_unix_secs: u64) -> Timestamp {
        let now = i64::try_from(now_unix_secs).unwrap_or(i64::MAX);
        let genesis = i64::try_from(self.genesis_unix_secs).unwrap_or(i64::MAX);
        now.saturating_sub(genesis)
    }

    /// UNIX seconds at which network time `ts` occurs (clamps to 0 before the UNIX epoch).
    #[inline]
    pub fn unix_time(&self, ts: Timestamp) -> u64 {
        let genesis = i64::try_from(self.genesis_unix_secs).unwrap_or(i64::MAX);
        u64::try_from(genesis.saturating_add(ts)).unwrap_or(0)
    }

    /// Current network time read from the system clock.
    pub fn now(&self) -> Timestamp {
        let unix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.network_time(unix)
    }
}

/// Reference point for slot numbering inside one epoch.
/// `anchor_slot_base` is the slot number reached when the epoch opened, so numbering
/// continues across epochs instead of restarting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochAnchor {
    pub epoch: usize,
    pub anchor_height: Height,
    pub anchor_timestamp: Timestamp,
    pub anchor_slot_base: Slot,
    pub block_interval: u32,
    pub rotation_size: u32,
}

impl EpochAnchor {
    /// Anchor of the first epoch: time 0, slot 0. Needs no history.
    pub fn genesis(milestone: &Milestone) -> Self {
        Self {
            epoch: 0,
            anchor_height: milestone.activation_height,
            anchor_timestamp: 0,
            anchor_slot_base: 0,
            block_interval: milestone.block_interval,
            rotation_size: milestone.rotation_size,
        }
    }

    /// Anchor of the epoch that follows `self`, given the timestamp recorded for the
    /// last block of this epoch (height `next.activation_height - 1`).
    /// The new epoch opens at the slot after that block, numbered by this epoch's grid.
    pub fn successor(&self, next: &Milestone, boundary_timestamp: Timestamp) -> Self {
        let anchor_timestamp = boundary_timestamp.saturating_add(i64::from(self.block_interval));
        Self {
            epoch: self.epoch + 1,
            anchor_height: next.activation_height,
            anchor_timestamp,
            anchor_slot_base: self.slot_number(anchor_timestamp),
            block_interval: next.block_interval,
            rotation_size: next.rotation_size,
        }
    }

    #[inline]
    fn interval(&self) -> i64 {
        i64::from(self.block_interval)
    }

    /// Global slot containing `ts`: `base + floor((ts - anchor_ts) / interval)`.
    #[inline]
    pub fn slot_number(&self, ts: Timestamp) -> Slot {
        let elapsed = ts.saturating_sub(self.anchor_timestamp);
        self.anchor_slot_base.saturating_add(elapsed.div_euclid(self.interval()))
    }

    /// Opening instant of `slot` on this epoch's grid.
    #[inline]
    pub fn slot_start(&self, slot: Slot) -> Timestamp {
        let offset = slot.saturating_sub(self.anchor_slot_base).saturating_mul(self.interval());
        self.anchor_timestamp.saturating_add(offset)
    }

    /// Position of `slot` in a rotation of `rotation_size` delegates.
    #[inline]
    pub fn rotation_index(slot: Slot, rotation_size: u32) -> u32 {
        // rem_euclid keeps pre-genesis slots in range; the result is < rotation_size.
        slot.rem_euclid(i64::from(rotation_size.max(1))) as u32
    }

    /// Slot details for `ts`.
    pub fn slot_info(&self, ts: Timestamp) -> SlotInfo {
        let slot_number = self.slot_number(ts);
        let start_time = self.slot_start(slot_number);
        SlotInfo {
            slot_number,
            start_time,
            end_time: start_time.saturating_add(self.interval() - 1),
            block_interval: self.block_interval,
            forging_status: ts == start_time,
        }
    }
}

/// Information about the slot containing a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub slot_number: Slot,
    /// Opening instant of the slot (the canonical block timestamp).
    pub start_time: Timestamp,
    /// Last second still inside the slot.
    pub end_time: Timestamp,
    pub block_interval: u32,
    /// True only at the opening instant.
    pub forging_status: bool,
}
