//! Simulation tuning knobs.
//!
//! Every field has a default, so a scenario only needs to spell out the
//! values it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_power_per_plant() -> u32 {
    200
}

fn default_coverage_radius() -> u32 {
    8
}

fn default_spawn_probability() -> f64 {
    0.01
}

fn default_upgrade_probability() -> f64 {
    0.005
}

fn default_happy_multiplier() -> f64 {
    2.0
}

fn default_happy_threshold() -> f64 {
    0.7
}

fn default_abandon_after_seconds() -> f64 {
    30.0
}

fn default_tax_interval_ms() -> u64 {
    3_000
}

fn default_base_happiness() -> f64 {
    0.5
}

fn default_power_bonus() -> f64 {
    0.2
}

fn default_spare_power_ratio() -> f64 {
    0.1
}

fn default_road_upkeep() -> f64 {
    1.0
}

fn default_plant_upkeep() -> f64 {
    5.0
}

fn default_history_capacity() -> usize {
    100
}

fn default_snapshot_dir() -> String {
    "saves".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub tick: TickConfig,
    #[serde(default)]
    pub power: PowerConfig,
    #[serde(default)]
    pub growth: GrowthConfig,
    #[serde(default)]
    pub economy: EconomyConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub interval_ms: u64,
}

impl TickConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_tick_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerConfig {
    #[serde(default = "default_power_per_plant")]
    pub power_per_plant: u32,
    /// Manhattan distance a plant reaches, inclusive.
    #[serde(default = "default_coverage_radius")]
    pub coverage_radius: u32,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            power_per_plant: default_power_per_plant(),
            coverage_radius: default_coverage_radius(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthConfig {
    #[serde(default = "default_spawn_probability")]
    pub spawn_probability: f64,
    #[serde(default = "default_upgrade_probability")]
    pub upgrade_probability: f64,
    #[serde(default = "default_happy_multiplier")]
    pub happy_multiplier: f64,
    #[serde(default = "default_happy_threshold")]
    pub happy_threshold: f64,
    #[serde(default = "default_abandon_after_seconds")]
    pub abandon_after_seconds: f64,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            spawn_probability: default_spawn_probability(),
            upgrade_probability: default_upgrade_probability(),
            happy_multiplier: default_happy_multiplier(),
            happy_threshold: default_happy_threshold(),
            abandon_after_seconds: default_abandon_after_seconds(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomyConfig {
    #[serde(default = "default_tax_interval_ms")]
    pub tax_interval_ms: u64,
    #[serde(default = "default_base_happiness")]
    pub base_happiness: f64,
    #[serde(default = "default_power_bonus")]
    pub power_bonus: f64,
    /// Share of capacity that must stay unused to earn the power bonus.
    #[serde(default = "default_spare_power_ratio")]
    pub spare_power_ratio: f64,
    #[serde(default = "default_road_upkeep")]
    pub road_upkeep: f64,
    #[serde(default = "default_plant_upkeep")]
    pub plant_upkeep: f64,
}

impl EconomyConfig {
    pub fn tax_interval(&self) -> Duration {
        Duration::from_millis(self.tax_interval_ms.max(1))
    }
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            tax_interval_ms: default_tax_interval_ms(),
            base_happiness: default_base_happiness(),
            power_bonus: default_power_bonus(),
            spare_power_ratio: default_spare_power_ratio(),
            road_upkeep: default_road_upkeep(),
            plant_upkeep: default_plant_upkeep(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Autosave cadence in ticks; 0 turns autosave off.
    #[serde(default)]
    pub interval_ticks: u64,
    #[serde(default = "default_snapshot_dir")]
    pub dir: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            interval_ticks: 0,
            dir: default_snapshot_dir(),
        }
    }
}
