use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timings and ranges for the destruction sequence.
///
/// Every field has a default, so a partial config file only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestroyConfig {
    /// Delay between the destruction effect and the relocation stage.
    pub relocate_delay_ms: u64,
    /// Base delay before an occupant is transferred.
    pub transfer_delay_ms: u64,
    /// Upper bound (exclusive) of the random delay added to each transfer.
    pub transfer_jitter_ms: u64,
    /// Half-width of the planar offset around the destination station.
    pub station_offset: i32,
    /// Faction a destination station must belong to.
    pub faction: String,
    /// Resolution of the cosmetic severity sent with the destruction effect.
    pub severity_steps: u32,
    /// Seed for reproducible runs. Entropy when unset.
    pub seed: Option<u64>,
}

impl Default for DestroyConfig {
    fn default() -> Self {
        Self {
            relocate_delay_ms: 5000,
            transfer_delay_ms: 6000,
            transfer_jitter_ms: 2000,
            station_offset: 50,
            faction: "neutral".into(),
            severity_steps: 100,
            seed: None,
        }
    }
}

impl DestroyConfig {
    pub fn relocate_delay(&self) -> Duration {
        Duration::from_millis(self.relocate_delay_ms)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
