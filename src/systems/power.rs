use std::any::Any;
use std::collections::HashSet;

use anyhow::Result;
use serde::Serialize;

use crate::{
    config::PowerConfig,
    engine::{System, SystemContext},
    events::EventQueue,
    grid::{Grid, TilePos, TileType},
    world::World,
};

/// Coverage derived from the current plant layout. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PowerGridState {
    capacity: u32,
    demand: u32,
    plant_positions: Vec<TilePos>,
    powered_tiles: HashSet<TilePos>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerStatus {
    pub powered: bool,
    pub consumer: bool,
    pub nearest_plant_distance: Option<u32>,
}

impl PowerGridState {
    /// Recomputes coverage from scratch; calling it twice on the same grid
    /// yields the same state.
    pub fn compute(grid: &Grid, config: &PowerConfig) -> Self {
        let plant_positions = grid.positions_of(TileType::PowerPlant);
        let capacity = (plant_positions.len() as u32).saturating_mul(config.power_per_plant);

        let powered_tiles: HashSet<TilePos> = grid
            .iter()
            .filter(|(_, tile)| tile.tile_type().consumes_power())
            .filter(|(pos, _)| {
                plant_positions
                    .iter()
                    .any(|plant| plant.manhattan_distance(*pos) <= config.coverage_radius)
            })
            .map(|(pos, _)| pos)
            .collect();

        Self {
            capacity,
            // Consumers that received power, not unmet demand.
            demand: powered_tiles.len() as u32,
            plant_positions,
            powered_tiles,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn demand(&self) -> u32 {
        self.demand
    }

    /// Capacity minus demand; negative when demand outgrows the plants.
    pub fn spare_capacity(&self) -> i64 {
        i64::from(self.capacity) - i64::from(self.demand)
    }

    pub fn plant_positions(&self) -> &[TilePos] {
        &self.plant_positions
    }

    pub fn powered_tiles(&self) -> &HashSet<TilePos> {
        &self.powered_tiles
    }

    pub fn is_powered_at(&self, pos: TilePos) -> bool {
        self.powered_tiles.contains(&pos)
    }

    pub fn is_powered(&self, x: i32, y: i32) -> bool {
        match (u32::try_from(x), u32::try_from(y)) {
            (Ok(x), Ok(y)) => self.is_powered_at(TilePos::new(x, y)),
            _ => false,
        }
    }

    pub fn power_status(&self, grid: &Grid, x: i32, y: i32) -> Option<PowerStatus> {
        let pos = grid.pos(x, y)?;
        let tile = grid.tile(pos)?;
        Some(PowerStatus {
            powered: self.is_powered_at(pos),
            consumer: tile.tile_type().consumes_power(),
            nearest_plant_distance: self
                .plant_positions
                .iter()
                .map(|plant| plant.manhattan_distance(pos))
                .min(),
        })
    }
}

/// Refreshes power coverage at the start of every tick.
pub struct PowerSystem;

impl PowerSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PowerSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for PowerSystem {
    fn name(&self) -> &str {
        "power"
    }

    fn run(
        &mut self,
        _ctx: &SystemContext,
        world: &mut World,
        _events: &mut EventQueue,
    ) -> Result<()> {
        world.recalculate_power();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
