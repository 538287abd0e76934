use std::time::Duration;

use serde::Serialize;

use crate::{
    config::PowerConfig,
    grid::{Grid, TileType},
    systems::{economy::CityStats, power::PowerGridState},
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerSummary {
    pub capacity: u32,
    pub demand: u32,
    pub plants: usize,
    pub powered_tiles: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TileCounts {
    pub roads: usize,
    pub residential: usize,
    pub commercial: usize,
    pub industrial: usize,
    pub power_plants: usize,
}

/// Read-only view of the city handed to hosts every tick.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CitySnapshot {
    pub tick: u64,
    pub elapsed_ms: u64,
    pub width: u32,
    pub height: u32,
    pub stats: CityStats,
    pub power: PowerSummary,
    pub tiles: TileCounts,
}

pub struct World {
    grid: Grid,
    power: PowerGridState,
    power_config: PowerConfig,
    stats: CityStats,
    tick: u64,
    elapsed: Duration,
}

impl World {
    pub fn new(grid: Grid, power_config: PowerConfig) -> Self {
        let power = PowerGridState::compute(&grid, &power_config);
        Self {
            grid,
            power,
            power_config,
            stats: CityStats::default(),
            tick: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn with_stats(mut self, stats: CityStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    pub fn power(&self) -> &PowerGridState {
        &self.power
    }

    pub fn power_config(&self) -> &PowerConfig {
        &self.power_config
    }

    pub fn stats(&self) -> &CityStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut CityStats {
        &mut self.stats
    }

    pub(crate) fn grid_and_power_mut(&mut self) -> (&mut Grid, &PowerGridState) {
        (&mut self.grid, &self.power)
    }

    pub(crate) fn grid_and_stats_mut(&mut self) -> (&Grid, &mut CityStats) {
        (&self.grid, &mut self.stats)
    }

    pub fn recalculate_power(&mut self) {
        self.power = PowerGridState::compute(&self.grid, &self.power_config);
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn advance_time(&mut self, dt: Duration) {
        self.tick += 1;
        self.elapsed += dt;
    }

    pub fn snapshot(&self) -> CitySnapshot {
        CitySnapshot {
            tick: self.tick,
            elapsed_ms: self.elapsed.as_millis() as u64,
            width: self.grid.width(),
            height: self.grid.height(),
            stats: self.stats,
            power: PowerSummary {
                capacity: self.power.capacity(),
                demand: self.power.demand(),
                plants: self.power.plant_positions().len(),
                powered_tiles: self.power.powered_tiles().len(),
            },
            tiles: TileCounts {
                roads: self.grid.count_tiles(TileType::Road),
                residential: self.grid.count_tiles(TileType::Residential),
                commercial: self.grid.count_tiles(TileType::Commercial),
                industrial: self.grid.count_tiles(TileType::Industrial),
                power_plants: self.grid.count_tiles(TileType::PowerPlant),
            },
        }
    }
}
