// src/consensus/forging_loop.rs

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::pos::{
    ConfigurationError, ForgingDecision, Height, HistoricalTimestampOracle, SchedulerError, Slot, SlotCalculator,
    Timestamp,
};

pub const DEFAULT_TICK_MS: u64 = crate::config::DEFAULT_TICK_MS;

#[derive(Clone, Copy, Debug)]
pub struct ForgingLoopConfig {
    pub tick_ms: u64,
}

impl Default for ForgingLoopConfig {
    fn default() -> Self {
        Self { tick_ms: DEFAULT_TICK_MS }
    }
}

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("block rejected: {0}")]
    Rejected(String),
    #[error("node is not ready: {0}")]
    NotReady(String),
}

/// What the loop needs from the node. Generic so tests can swap in fakes.
pub trait ForgerNode {
    /// Height of the last confirmed block.
    fn last_height(&self) -> Height;
    /// Timestamp of the last confirmed block, if the node has one.
    fn last_block_timestamp(&self) -> Option<Timestamp>;
    /// Current network time in seconds.
    fn now(&self) -> Timestamp;
    /// Our position in the delegate rotation.
    fn delegate_index(&self) -> u32;
    /// Produce and apply a block stamped `block_timestamp`; returns the new height.
    fn forge(&mut self, block_timestamp: Timestamp) -> Result<Height, ForgeError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Forged { height: Height, block_timestamp: Timestamp },
    NotOurSlot { forger: u32 },
    /// Our slot, but not its opening instant.
    Waiting { block_timestamp: Timestamp },
    /// An epoch boundary is not in history yet; retried next tick.
    HistoryPending { height: Height },
    /// The open slot does not come after the tip block, by slot number or by time.
    /// Happens right after a block, and when the first block of a new epoch landed
    /// late on the old grid.
    SlotFilled { slot: Slot, tip_slot: Slot },
    ForgeFailed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub forged: u64,
    pub missed_slots: u64,
    pub history_pending: u64,
    pub forge_failures: u64,
}

pub struct ForgingLoop<N, O> {
    pub node: N,
    calculator: Arc<SlotCalculator<O>>,
    cfg: ForgingLoopConfig,
    stats: LoopStats,
    // last slot already counted as missed
    missed_through: Option<Slot>,
}

impl<N, O> ForgingLoop<N, O>
where
    N: ForgerNode,
    O: HistoricalTimestampOracle,
{
    pub fn new(node: N, calculator: Arc<SlotCalculator<O>>, cfg: ForgingLoopConfig) -> Self {
        assert!(cfg.tick_ms > 0, "tick_ms must be > 0");
        Self { node, calculator, cfg, stats: LoopStats::default(), missed_through: None }
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn calculator(&self) -> &SlotCalculator<O> {
        &self.calculator
    }

    /// Evaluate the schedule once and forge if this is our slot's opening instant.
    /// Only a broken schedule is returned as an error; missing history is retried.
    pub fn tick_once(&mut self) -> Result<TickOutcome, ConfigurationError> {
        self.stats.ticks += 1;
        let height = self.node.last_height();
        let now = self.node.now();

        let (decision, slot, tip) = match self.decide(now, height) {
            Ok(v) => v,
            Err(SchedulerError::HistoryUnavailable(e)) => {
                warn!(height = e.height, last_height = height, "epoch boundary not in history yet; retrying next tick");
                self.stats.history_pending += 1;
                return Ok(TickOutcome::HistoryPending { height: e.height });
            }
            Err(SchedulerError::Configuration(e)) => return Err(e),
        };

        if let Some((tip_timestamp, tip_slot)) = tip {
            self.track_missed(height, tip_slot, slot);
            // A block must come after the tip both in slot order and in time.
            if slot <= tip_slot || decision.block_timestamp <= tip_timestamp {
                debug!(slot, tip_slot, tip_timestamp, forger = decision.current_forger, "open slot not after tip");
                return Ok(TickOutcome::SlotFilled { slot, tip_slot });
            }
        }

        let ours = self.node.delegate_index();
        if decision.current_forger != ours {
            debug!(slot, forger = decision.current_forger, next = decision.next_forger, "not our slot");
            return Ok(TickOutcome::NotOurSlot { forger: decision.current_forger });
        }
        if !decision.can_forge {
            return Ok(TickOutcome::Waiting { block_timestamp: decision.block_timestamp });
        }

        match self.node.forge(decision.block_timestamp) {
            Ok(new_height) => {
                info!(height = new_height, slot, block_timestamp = decision.block_timestamp, "forged block");
                self.stats.forged += 1;
                Ok(TickOutcome::Forged { height: new_height, block_timestamp: decision.block_timestamp })
            }
            Err(e) => {
                error!(slot, block_timestamp = decision.block_timestamp, "forging failed: {e}");
                self.stats.forge_failures += 1;
                Ok(TickOutcome::ForgeFailed)
            }
        }
    }

    fn decide(
        &self,
        now: Timestamp,
        height: Height,
    ) -> Result<(ForgingDecision, Slot, Option<(Timestamp, Slot)>), SchedulerError> {
        let decision = self.calculator.evaluate(now, height)?;
        let slot = self.calculator.slot_number(now, height)?;
        // The tip was forged while its parent was the last confirmed block.
        let tip = match self.node.last_block_timestamp() {
            Some(ts) => Some((ts, self.calculator.slot_number(ts, height.saturating_sub(1))?)),
            None => None,
        };
        Ok((decision, slot, tip))
    }

    // Every slot strictly between the tip's slot and the open one closed without a block.
    fn track_missed(&mut self, height: Height, tip_slot: Slot, slot: Slot) {
        let from = self.missed_through.map_or(tip_slot, |m| m.max(tip_slot));
        let last_closed = slot - 1;
        if last_closed > from {
            let missed = (last_closed - from) as u64;
            self.stats.missed_slots += missed;
            self.missed_through = Some(last_closed);
            warn!(height, from_slot = from + 1, to_slot = last_closed, missed, "missed slot(s)");
        }
    }

    fn sleep_rest_of_tick(&self, start: Instant) {
        let tick = Duration::from_millis(self.cfg.tick_ms);
        let elapsed = start.elapsed();
        if elapsed < tick {
            thread::sleep(tick - elapsed);
        }
    }

    pub fn run_for_ticks(&mut self, n: u64) -> Result<(), ConfigurationError> {
        for _ in 0..n {
            let start = Instant::now();
            self.tick_once()?;
            self.sleep_rest_of_tick(start);
        }
        Ok(())
    }

    pub fn run_until_height(&mut self, h: Height) -> Result<(), ConfigurationError> {
        while self.node.last_height() < h {
            let start = Instant::now();
            self.tick_once()?;
            self.sleep_rest_of_tick(start);
        }
        Ok(())
    }
}
