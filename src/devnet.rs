// src/devnet.rs

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::consensus::forging_loop::{ForgeError, ForgerNode, ForgingLoop, ForgingLoopConfig, LoopStats, TickOutcome};
use crate::pos::{
    ConfigurationError, Height, InMemoryHistory, MilestoneSchedule, NetworkClock, SlotCalculator, Timestamp,
};

/// Genesis block height; its timestamp is network time 0.
pub const GENESIS_HEIGHT: Height = 1;

/// Where a dev node reads the time from.
#[derive(Clone, Debug)]
pub enum ClockSource {
    /// Shared virtual clock, advanced explicitly.
    Virtual(Arc<AtomicI64>),
    /// System wall clock converted to network time.
    System(NetworkClock),
}

impl ClockSource {
    pub fn now(&self) -> Timestamp {
        match self {
            ClockSource::Virtual(t) => t.load(Ordering::SeqCst),
            ClockSource::System(clock) => clock.now(),
        }
    }
}

/// Minimal delegate: its "chain" is the shared height -> timestamp history.
pub struct DevNode {
    pub delegate_index: u32,
    clock: ClockSource,
    history: Arc<InMemoryHistory>,
}

impl DevNode {
    pub fn new(delegate_index: u32, clock: ClockSource, history: Arc<InMemoryHistory>) -> Self {
        Self { delegate_index, clock, history }
    }

    pub fn history(&self) -> &Arc<InMemoryHistory> {
        &self.history
    }
}

impl ForgerNode for DevNode {
    fn last_height(&self) -> Height {
        self.history.tip().map(|(h, _)| h).unwrap_or(0)
    }

    fn last_block_timestamp(&self) -> Option<Timestamp> {
        self.history.tip().map(|(_, ts)| ts)
    }

    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn delegate_index(&self) -> u32 {
        self.delegate_index
    }

    fn forge(&mut self, block_timestamp: Timestamp) -> Result<Height, ForgeError> {
        let (tip_height, tip_timestamp) = self
            .history
            .tip()
            .ok_or_else(|| ForgeError::NotReady("no genesis block".into()))?;
        if block_timestamp <= tip_timestamp {
            return Err(ForgeError::Rejected(format!(
                "timestamp {block_timestamp} not after tip timestamp {tip_timestamp}"
            )));
        }
        let height = tip_height + 1;
        self.history.record(height, block_timestamp);
        Ok(height)
    }
}

/// Record the genesis block into `history` if it is empty.
pub fn init_genesis(history: &InMemoryHistory) {
    if history.is_empty() {
        history.record(GENESIS_HEIGHT, 0);
    }
}

/// In-process network of delegates sharing one history and a virtual clock.
/// Delegates listed as offline never tick, so their slots are missed.
pub struct SimulatedNetwork {
    clock: Arc<AtomicI64>,
    history: Arc<InMemoryHistory>,
    calculator: Arc<SlotCalculator<Arc<InMemoryHistory>>>,
    loops: Vec<ForgingLoop<DevNode, Arc<InMemoryHistory>>>,
}

impl SimulatedNetwork {
    /// One delegate per rotation position (the largest rotation in the schedule),
    /// minus the `offline` ones.
    pub fn new(schedule: MilestoneSchedule, offline: &[u32]) -> Self {
        // genesis fills slot 0, so the first instant worth ticking is t=1
        let clock = Arc::new(AtomicI64::new(1));
        let history = Arc::new(InMemoryHistory::new());
        init_genesis(&history);

        let delegates = schedule.milestones().iter().map(|m| m.rotation_size).max().unwrap_or(1);
        let calculator = Arc::new(SlotCalculator::new(schedule, history.clone()));

        let loops = (0..delegates)
            .filter(|idx| !offline.contains(idx))
            .map(|idx| {
                let node = DevNode::new(idx, ClockSource::Virtual(clock.clone()), history.clone());
                ForgingLoop::new(node, calculator.clone(), ForgingLoopConfig::default())
            })
            .collect();

        Self { clock, history, calculator, loops }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.load(Ordering::SeqCst)
    }

    pub fn height(&self) -> Height {
        self.history.tip().map(|(h, _)| h).unwrap_or(0)
    }

    pub fn history(&self) -> &InMemoryHistory {
        &self.history
    }

    pub fn calculator(&self) -> &SlotCalculator<Arc<InMemoryHistory>> {
        &self.calculator
    }

    /// Tick every online delegate once at the current instant, then advance one second.
    /// Returns the blocks forged during this instant.
    pub fn step(&mut self) -> Result<Vec<(u32, TickOutcome)>, ConfigurationError> {
        let mut forged = Vec::new();
        for l in self.loops.iter_mut() {
            let outcome = l.tick_once()?;
            if let TickOutcome::Forged { .. } = outcome {
                forged.push((l.node.delegate_index, outcome));
            }
        }
        self.clock.fetch_add(1, Ordering::SeqCst);
        Ok(forged)
    }

    pub fn advance(&mut self, seconds: u64) -> Result<(), ConfigurationError> {
        for _ in 0..seconds {
            self.step()?;
        }
        Ok(())
    }

    /// Step until `height` is reached or `max_seconds` elapse. Returns whether it was reached.
    pub fn run_until_height(&mut self, height: Height, max_seconds: u64) -> Result<bool, ConfigurationError> {
        for _ in 0..max_seconds {
            if self.height() >= height {
                return Ok(true);
            }
            self.step()?;
        }
        Ok(self.height() >= height)
    }

    /// Per-delegate loop statistics, by delegate index.
    pub fn stats(&self) -> Vec<(u32, LoopStats)> {
        self.loops.iter().map(|l| (l.node.delegate_index, l.stats())).collect()
    }
}

/// Run a simulated network for `seconds` of virtual time and log every block.
pub fn start_simulated_network(
    schedule: MilestoneSchedule,
    offline: &[u32],
    seconds: u64,
) -> Result<SimulatedNetwork, ConfigurationError> {
    let mut net = SimulatedNetwork::new(schedule, offline);
    for _ in 0..seconds {
        let now = net.now();
        for (delegate, outcome) in net.step()? {
            if let TickOutcome::Forged { height, block_timestamp } = outcome {
                info!(delegate, height, block_timestamp, now, "block");
            }
        }
    }
    let tip = net.history.tip();
    info!(height = net.height(), ?tip, "simulation finished");
    Ok(net)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pos::{HistoricalTimestampOracle, MilestoneConfig};

    fn schedule(entries: Vec<MilestoneConfig>) -> MilestoneSchedule {
        MilestoneSchedule::materialize(entries).unwrap()
    }

    #[test]
    fn all_online_forges_one_block_per_slot() {
        let mut net = SimulatedNetwork::new(
            schedule(vec![MilestoneConfig::new(1).with_blocktime(4).with_active_delegates(3)]),
            &[],
        );
        // slots 1..=5 open at 4, 8, ..., 20
        net.advance(20).unwrap();
        assert_eq!(net.height(), 6);
        assert_eq!(net.history().timestamp_at(6), Ok(20));
    }

    #[test]
    fn dev_node_rejects_stale_timestamp() {
        let history = Arc::new(InMemoryHistory::from_blocks([(1, 0), (2, 8)]));
        let mut node = DevNode::new(0, ClockSource::Virtual(Arc::new(AtomicI64::new(8))), history);
        assert!(matches!(node.forge(8), Err(ForgeError::Rejected(_))));
        assert_eq!(node.forge(12).unwrap(), 3);
    }
}
