//! Property tests for slot arithmetic across arbitrary schedules.
//! Run: `cargo test --test prop_slots -- --nocapture`

use proptest::prelude::*;

use std::sync::Arc;

use dpos_scheduler::consensus::forging_loop::{ForgeError, ForgerNode, ForgingLoop, ForgingLoopConfig, TickOutcome};
use dpos_scheduler::pos::{Height, InMemoryHistory, MilestoneConfig, SlotCalculator, Timestamp};

// -------------------- helpers --------------------

/// Two epochs: `(a, r1)` from genesis, `(b, r2)` from `switch`, with the last block of
/// the first epoch stamped `boundary_slot * a` and the first block of the second epoch
/// stamped `late` slots after the second epoch opens.
#[derive(Clone, Debug)]
struct TwoEpochs {
    a: u32,
    r1: u32,
    b: u32,
    r2: u32,
    switch: Height,
    boundary_slot: i64,
    late: i64,
}

fn arb_two_epochs() -> impl Strategy<Value = TwoEpochs> {
    (1u32..30, 1u32..60, 1u32..30, 1u32..60, 2u64..200, 0i64..50, 0i64..6).prop_map(
        |(a, r1, b, r2, switch, extra, late)| {
            // genesis sits in slot 0; later blocks take at least one slot each
            let boundary_slot = if switch == 2 { 0 } else { (switch as i64 - 2) + extra };
            TwoEpochs { a, r1, b, r2, switch, boundary_slot, late }
        },
    )
}

impl TwoEpochs {
    fn boundary_timestamp(&self) -> Timestamp {
        self.boundary_slot * i64::from(self.a)
    }

    /// Timestamp of block `switch`, on the first epoch's grid.
    fn first_block_timestamp(&self) -> Timestamp {
        (self.boundary_slot + 1 + self.late) * i64::from(self.a)
    }

    fn calculator(&self) -> SlotCalculator<InMemoryHistory> {
        SlotCalculator::from_milestones(
            vec![
                MilestoneConfig::new(1).with_blocktime(self.a).with_active_delegates(self.r1),
                MilestoneConfig::new(self.switch).with_blocktime(self.b).with_active_delegates(self.r2),
            ],
            InMemoryHistory::from_blocks([
                (self.switch - 1, self.boundary_timestamp()),
                (self.switch, self.first_block_timestamp()),
            ]),
        )
        .unwrap()
    }
}

/// Node that always holds the open slot's rotation index and accepts every block,
/// without moving its tip.
struct EagerNode {
    height: Height,
    tip: Timestamp,
    now: Timestamp,
    index: u32,
}

impl ForgerNode for EagerNode {
    fn last_height(&self) -> Height {
        self.height
    }

    fn last_block_timestamp(&self) -> Option<Timestamp> {
        Some(self.tip)
    }

    fn now(&self) -> Timestamp {
        self.now
    }

    fn delegate_index(&self) -> u32 {
        self.index
    }

    fn forge(&mut self, _block_timestamp: Timestamp) -> Result<Height, ForgeError> {
        Ok(self.height + 1)
    }
}

// -------------------- properties --------------------

proptest! {
    #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

    /// Inside one epoch the decision always points at the open slot.
    #[test]
    fn prop_decision_points_at_open_slot(
        interval in 1u32..60,
        rotation in 1u32..100,
        now in -1_000i64..1_000_000,
        height in 1u64..10_000,
    ) {
        let calc = SlotCalculator::from_milestones(
            vec![MilestoneConfig::new(1).with_blocktime(interval).with_active_delegates(rotation)],
            InMemoryHistory::new(),
        ).unwrap();

        let d = calc.evaluate(now, height).unwrap();
        prop_assert!(d.block_timestamp <= now);
        prop_assert!(now - d.block_timestamp < i64::from(interval));
        prop_assert!(d.current_forger < rotation);
        prop_assert!(d.next_forger < rotation);
        prop_assert_eq!(d.can_forge, now == d.block_timestamp);
        prop_assert_eq!(d.next_forger, (d.current_forger + 1) % rotation);
    }

    /// Slot numbering continues across an epoch boundary and never goes backwards.
    #[test]
    fn prop_slots_continue_across_boundary(epochs in arb_two_epochs(), span in 1i64..500) {
        let calc = epochs.calculator();
        let boundary_ts = epochs.boundary_timestamp();
        let anchor_ts = boundary_ts + i64::from(epochs.a);

        let last_old = calc.slot_number(boundary_ts, epochs.switch - 1).unwrap();
        let first_new = calc.slot_number(anchor_ts, epochs.switch).unwrap();
        prop_assert_eq!(last_old, epochs.boundary_slot);
        prop_assert_eq!(first_new, last_old + 1);

        let mut prev = calc.evaluate(anchor_ts, epochs.switch).unwrap();
        prop_assert!(prev.can_forge);
        let mut prev_slot = first_new;
        for now in anchor_ts + 1..anchor_ts + span {
            let slot = calc.slot_number(now, epochs.switch).unwrap();
            let d = calc.evaluate(now, epochs.switch).unwrap();
            prop_assert!(slot >= prev_slot);
            prop_assert!(d.block_timestamp >= prev.block_timestamp);
            prop_assert!(d.current_forger < epochs.r2);
            prev = d;
            prev_slot = slot;
        }
    }

    /// The decision for the last block before the switch already looks ahead to the
    /// next epoch's rotation.
    #[test]
    fn prop_next_forger_uses_next_rotation(epochs in arb_two_epochs(), offset in 0i64..20) {
        let calc = epochs.calculator();
        let now = epochs.boundary_timestamp() + offset;
        let d = calc.evaluate(now, epochs.switch - 1).unwrap();
        let slot = calc.slot_number(now, epochs.switch - 1).unwrap();

        prop_assert!(d.current_forger < epochs.r1);
        prop_assert_eq!(i64::from(d.next_forger), (slot + 1).rem_euclid(i64::from(epochs.r2)));
    }

    /// Repeated evaluation and a rebuilt cache give identical answers.
    #[test]
    fn prop_recalibration_is_deterministic(epochs in arb_two_epochs(), offset in 0i64..1_000) {
        let calc = epochs.calculator();
        let now = epochs.boundary_timestamp() + i64::from(epochs.a) + offset;
        let height = epochs.switch + 3;

        let first = calc.evaluate(now, height).unwrap();
        prop_assert_eq!(calc.evaluate(now, height).unwrap(), first);
        calc.invalidate();
        prop_assert_eq!(calc.evaluate(now, height).unwrap(), first);
    }

    /// However late the first block of the new epoch lands, the loop never forges a
    /// block stamped at or before it.
    #[test]
    fn prop_loop_never_forges_before_tip(epochs in arb_two_epochs(), span in 1i64..300) {
        let calc = Arc::new(epochs.calculator());
        let tip = epochs.first_block_timestamp();
        let node = EagerNode { height: epochs.switch, tip, now: tip, index: 0 };
        let mut dl = ForgingLoop::new(node, calc.clone(), ForgingLoopConfig { tick_ms: 1 });

        for now in tip..tip + span {
            dl.node.now = now;
            dl.node.index = calc.evaluate(now, epochs.switch).unwrap().current_forger;
            if let TickOutcome::Forged { block_timestamp, .. } = dl.tick_once().unwrap() {
                prop_assert!(block_timestamp > tip, "forged at {} with tip at {}", block_timestamp, tip);
            }
        }
    }
}
