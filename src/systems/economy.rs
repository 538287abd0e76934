use std::any::Any;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    config::EconomyConfig,
    engine::{System, SystemContext},
    events::{EventQueue, SimEvent},
    grid::{Grid, TileType, Zone},
    systems::power::PowerGridState,
    world::World,
};

const EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CityStats {
    pub balance: f64,
    pub population: u64,
    pub jobs: u64,
    pub shoppers: u64,
    pub happiness: f64,
}

impl Default for CityStats {
    fn default() -> Self {
        Self {
            balance: 0.0,
            population: 0,
            jobs: 0,
            shoppers: 0,
            happiness: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Contribution {
    pub population: u64,
    pub jobs: u64,
    pub shoppers: u64,
}

impl Contribution {
    const fn new(population: u64, jobs: u64, shoppers: u64) -> Self {
        Self {
            population,
            jobs,
            shoppers,
        }
    }
}

/// What one building adds to the city, keyed by zone and level.
pub fn contribution(zone: Zone, level: u8) -> Contribution {
    match (zone, level) {
        (Zone::Residential, 1) => Contribution::new(10, 0, 0),
        (Zone::Residential, 2) => Contribution::new(25, 0, 0),
        (Zone::Residential, 3) => Contribution::new(50, 0, 0),
        (Zone::Commercial, 1) => Contribution::new(0, 4, 10),
        (Zone::Commercial, 2) => Contribution::new(0, 10, 25),
        (Zone::Commercial, 3) => Contribution::new(0, 20, 50),
        (Zone::Industrial, 1) => Contribution::new(0, 8, 0),
        (Zone::Industrial, 2) => Contribution::new(0, 20, 0),
        (Zone::Industrial, 3) => Contribution::new(0, 40, 0),
        _ => Contribution::default(),
    }
}

/// Sums the contribution table over every zoned building.
pub fn tally(grid: &Grid) -> Contribution {
    grid.zone_tiles()
        .map(|(_, zone, building)| contribution(zone, building.level))
        .fold(Contribution::default(), |acc, c| Contribution {
            population: acc.population + c.population,
            jobs: acc.jobs + c.jobs,
            shoppers: acc.shoppers + c.shoppers,
        })
}

pub fn happiness(power: &PowerGridState, config: &EconomyConfig) -> f64 {
    let capacity = f64::from(power.capacity());
    let spare = power.spare_capacity() as f64;
    let bonus = if capacity > 0.0 && spare + EPS >= capacity * config.spare_power_ratio {
        config.power_bonus
    } else {
        0.0
    };
    (config.base_happiness + bonus).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxReport {
    pub income: f64,
    pub upkeep: f64,
    pub balance: f64,
}

/// Applies one tax collection to `stats` using its current figures.
pub fn collect_taxes(stats: &mut CityStats, grid: &Grid, config: &EconomyConfig) -> TaxReport {
    let income =
        stats.population as f64 * 2.0 + stats.shoppers as f64 + stats.jobs as f64;
    let upkeep = grid.count_tiles(TileType::Road) as f64 * config.road_upkeep
        + grid.count_tiles(TileType::PowerPlant) as f64 * config.plant_upkeep;
    if !stats.balance.is_finite() {
        warn!(balance = stats.balance, "balance corrupted, resetting to 0");
        stats.balance = 0.0;
    }
    stats.balance += income - upkeep;
    TaxReport {
        income,
        upkeep,
        balance: stats.balance,
    }
}

/// Recomputes city statistics every tick and collects taxes on a fixed
/// simulated-time interval.
pub struct EconomySystem {
    config: EconomyConfig,
    tax_elapsed: Duration,
}

impl EconomySystem {
    pub fn new(config: EconomyConfig) -> Self {
        Self {
            config,
            tax_elapsed: Duration::ZERO,
        }
    }

    /// Simulated time since the last collection.
    pub fn tax_elapsed(&self) -> Duration {
        self.tax_elapsed
    }

    pub fn set_tax_elapsed(&mut self, elapsed: Duration) {
        self.tax_elapsed = elapsed.min(self.config.tax_interval());
    }
}

impl Default for EconomySystem {
    fn default() -> Self {
        Self::new(EconomyConfig::default())
    }
}

impl System for EconomySystem {
    fn name(&self) -> &str {
        "economy"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        events: &mut EventQueue,
    ) -> Result<()> {
        let totals = tally(world.grid());
        let happiness = happiness(world.power(), &self.config);
        let stats = world.stats_mut();
        stats.population = totals.population;
        stats.jobs = totals.jobs;
        stats.shoppers = totals.shoppers;
        stats.happiness = happiness;

        self.tax_elapsed += ctx.dt;
        let interval = self.config.tax_interval();
        while self.tax_elapsed >= interval {
            self.tax_elapsed -= interval;
            let (grid, stats) = world.grid_and_stats_mut();
            let report = collect_taxes(stats, grid, &self.config);
            debug!(
                tick = ctx.tick,
                income = report.income,
                upkeep = report.upkeep,
                balance = report.balance,
                "taxes collected"
            );
            events.push(SimEvent::TaxCollected {
                income: report.income,
                upkeep: report.upkeep,
                balance: report.balance,
            });
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
