// src/pos/milestones.rs

use serde::{Deserialize, Serialize};

use crate::pos::error::ConfigurationError;
use crate::pos::Height;

/// A milestone as written in the network configuration.
/// `blocktime` and `activeDelegates` may be omitted on every entry but the first;
/// omitted values carry forward from the previous entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneConfig {
    pub height: Height,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocktime: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_delegates: Option<u32>,
}

impl MilestoneConfig {
    pub fn new(height: Height) -> Self {
        Self { height, blocktime: None, active_delegates: None }
    }

    pub fn with_blocktime(mut self, blocktime: u32) -> Self {
        self.blocktime = Some(blocktime);
        self
    }

    pub fn with_active_delegates(mut self, active_delegates: u32) -> Self {
        self.active_delegates = Some(active_delegates);
        self
    }
}

/// A fully resolved epoch: interval and rotation size are constant from
/// `activation_height` until the next milestone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub activation_height: Height,
    pub block_interval: u32,
    pub rotation_size: u32,
}

/// Validated, immutable list of epochs ordered by activation height.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MilestoneSchedule {
    milestones: Vec<Milestone>, // strictly increasing activation_height, len >= 1
}

impl MilestoneSchedule {
    /// Build the schedule from configuration entries.
    /// - Entries must be non-empty and strictly increasing by height (height >= 1).
    /// - The first entry must set both `blocktime` and `activeDelegates`.
    /// - Later entries forward-fill whatever they omit.
    /// - Zero intervals or rotation sizes are rejected.
    /// - Entries that change neither value are folded into the epoch before them.
    pub fn materialize(entries: Vec<MilestoneConfig>) -> Result<Self, ConfigurationError> {
        let first = entries.first().ok_or(ConfigurationError::EmptySchedule)?;
        let mut interval = first
            .blocktime
            .ok_or(ConfigurationError::MissingGenesisField { field: "blocktime" })?;
        let mut rotation = first
            .active_delegates
            .ok_or(ConfigurationError::MissingGenesisField { field: "activeDelegates" })?;

        let mut milestones: Vec<Milestone> = Vec::with_capacity(entries.len());
        let mut previous_height: Option<Height> = None;

        for entry in &entries {
            // 1) Height ordering
            if entry.height == 0 {
                return Err(ConfigurationError::ZeroActivationHeight);
            }
            if let Some(previous) = previous_height {
                if entry.height <= previous {
                    return Err(ConfigurationError::NonIncreasingHeight { previous, height: entry.height });
                }
            }
            previous_height = Some(entry.height);

            // 2) Forward-fill
            interval = entry.blocktime.unwrap_or(interval);
            rotation = entry.active_delegates.unwrap_or(rotation);

            // 3) Positivity
            if interval == 0 {
                return Err(ConfigurationError::ZeroInterval { height: entry.height });
            }
            if rotation == 0 {
                return Err(ConfigurationError::ZeroRotation { height: entry.height });
            }

            // 4) Fold no-op entries into the running epoch
            if let Some(last) = milestones.last() {
                if last.block_interval == interval && last.rotation_size == rotation {
                    continue;
                }
            }

            milestones.push(Milestone {
                activation_height: entry.height,
                block_interval: interval,
                rotation_size: rotation,
            });
        }

        Ok(Self { milestones })
    }

    /// Index of the epoch governing `height`: the last milestone whose activation height
    /// does not exceed it. Heights below genesis resolve to the genesis epoch.
    #[inline]
    pub fn epoch_index(&self, height: Height) -> usize {
        self.milestones
            .partition_point(|m| m.activation_height <= height)
            .saturating_sub(1)
    }

    /// The milestone governing `height`.
    #[inline]
    pub fn resolve(&self, height: Height) -> &Milestone {
        &self.milestones[self.epoch_index(height)]
    }

    #[inline]
    pub fn epoch(&self, index: usize) -> Option<&Milestone> {
        self.milestones.get(index)
    }

    #[inline]
    pub fn genesis(&self) -> &Milestone {
        &self.milestones[0]
    }

    #[inline]
    pub fn milestones(&self) -> &[Milestone] {
        &self.milestones
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.milestones.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.milestones.is_empty()
    }
}

impl TryFrom<Vec<MilestoneConfig>> for MilestoneSchedule {
    type Error = ConfigurationError;

    fn try_from(entries: Vec<MilestoneConfig>) -> Result<Self, Self::Error> {
        Self::materialize(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(height: Height, blocktime: Option<u32>, delegates: Option<u32>) -> MilestoneConfig {
        MilestoneConfig { height, blocktime, active_delegates: delegates }
    }

    #[test]
    fn forward_fills_omitted_fields() {
        let schedule = MilestoneSchedule::materialize(vec![
            ms(1, Some(8), Some(4)),
            ms(2, Some(4), None),
            ms(6, None, Some(5)),
        ])
        .unwrap();

        assert_eq!(
            schedule.milestones(),
            &[
                Milestone { activation_height: 1, block_interval: 8, rotation_size: 4 },
                Milestone { activation_height: 2, block_interval: 4, rotation_size: 4 },
                Milestone { activation_height: 6, block_interval: 4, rotation_size: 5 },
            ]
        );
    }

    #[test]
    fn folds_entries_that_change_nothing() {
        let schedule = MilestoneSchedule::materialize(vec![
            ms(1, Some(8), Some(4)),
            ms(10, Some(8), None),
            ms(20, None, Some(4)),
            ms(30, Some(6), None),
        ])
        .unwrap();

        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule.epoch(1).unwrap().activation_height, 30);
    }

    #[test]
    fn rejects_empty_schedule() {
        assert_eq!(MilestoneSchedule::materialize(vec![]), Err(ConfigurationError::EmptySchedule));
    }

    #[test]
    fn rejects_zero_rotation_and_interval() {
        assert_eq!(
            MilestoneSchedule::materialize(vec![ms(1, Some(8), Some(0))]),
            Err(ConfigurationError::ZeroRotation { height: 1 })
        );
        assert_eq!(
            MilestoneSchedule::materialize(vec![ms(1, Some(8), Some(4)), ms(5, Some(0), None)]),
            Err(ConfigurationError::ZeroInterval { height: 5 })
        );
    }

    #[test]
    fn rejects_non_increasing_heights() {
        assert_eq!(
            MilestoneSchedule::materialize(vec![ms(1, Some(8), Some(4)), ms(5, Some(4), None), ms(5, Some(3), None)]),
            Err(ConfigurationError::NonIncreasingHeight { previous: 5, height: 5 })
        );
        assert_eq!(
            MilestoneSchedule::materialize(vec![ms(0, Some(8), Some(4))]),
            Err(ConfigurationError::ZeroActivationHeight)
        );
    }

    #[test]
    fn genesis_needs_both_fields() {
        assert_eq!(
            MilestoneSchedule::materialize(vec![ms(1, None, Some(4))]),
            Err(ConfigurationError::MissingGenesisField { field: "blocktime" })
        );
        assert_eq!(
            MilestoneSchedule::materialize(vec![ms(1, Some(8), None)]),
            Err(ConfigurationError::MissingGenesisField { field: "activeDelegates" })
        );
    }

    #[test]
    fn resolve_picks_last_milestone_not_above_height() {
        let schedule = MilestoneSchedule::materialize(vec![
            ms(1, Some(8), Some(4)),
            ms(4, Some(3), None),
            ms(10, Some(5), Some(5)),
        ])
        .unwrap();

        assert_eq!(schedule.resolve(0).activation_height, 1);
        assert_eq!(schedule.resolve(1).activation_height, 1);
        assert_eq!(schedule.resolve(3).activation_height, 1);
        assert_eq!(schedule.resolve(4).activation_height, 4);
        assert_eq!(schedule.resolve(9).activation_height, 4);
        assert_eq!(schedule.resolve(10).activation_height, 10);
        assert_eq!(schedule.resolve(u64::MAX).activation_height, 10);
    }

    #[test]
    fn deserializes_network_config_shape() {
        let raw = r#"[{"height":1,"blocktime":8,"activeDelegates":51},{"height":100,"blocktime":6}]"#;
        let entries: Vec<MilestoneConfig> = serde_json::from_str(raw).unwrap();
        assert_eq!(entries[1], MilestoneConfig::new(100).with_blocktime(6));
        let schedule = MilestoneSchedule::try_from(entries).unwrap();
        assert_eq!(schedule.resolve(150).rotation_size, 51);
    }
}
