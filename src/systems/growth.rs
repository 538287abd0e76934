use std::any::Any;

use anyhow::Result;
use tracing::debug;

use crate::{
    config::GrowthConfig,
    engine::{System, SystemContext},
    events::{EventQueue, SimEvent},
    grid::{TilePos, MAX_LEVEL},
    rng::Lcg,
    world::World,
};

const EPS: f64 = 1e-9;

/// Spawns, upgrades and abandons buildings on zoned tiles.
///
/// Every random draw comes from the system's own [`Lcg`], so two systems
/// built from the same seed make the same decisions tick for tick.
pub struct GrowthSystem {
    config: GrowthConfig,
    rng: Lcg,
}

impl GrowthSystem {
    pub fn new(config: GrowthConfig, seed: u32) -> Self {
        Self {
            config,
            rng: Lcg::new(seed),
        }
    }

    pub fn rng_state(&self) -> u32 {
        self.rng.state()
    }

    pub fn restore_rng(&mut self, state: u32) {
        self.rng = Lcg::from_state(state);
    }
}

impl System for GrowthSystem {
    fn name(&self) -> &str {
        "growth"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        events: &mut EventQueue,
    ) -> Result<()> {
        let dt = ctx.dt.as_secs_f64();
        let multiplier = if world.stats().happiness >= self.config.happy_threshold {
            self.config.happy_multiplier
        } else {
            1.0
        };
        let upgrade_probability = self.config.upgrade_probability * multiplier;

        let (grid, power) = world.grid_and_power_mut();
        let zoned: Vec<TilePos> = grid.zone_tiles().map(|(pos, _, _)| pos).collect();

        let mut changed = Vec::new();
        for pos in zoned {
            let powered = power.is_powered_at(pos);
            let Some(building) = grid.tile_mut(pos).and_then(|tile| tile.building_mut()) else {
                continue;
            };

            if powered {
                building.unpowered_seconds = 0.0;
            } else {
                building.unpowered_seconds += dt;
            }

            if building.level > 0
                && building.unpowered_seconds + EPS >= self.config.abandon_after_seconds
            {
                building.level -= 1;
                building.unpowered_seconds = 0.0;
                debug!(tick = ctx.tick, tile = %pos, level = building.level, "building abandoned");
                events.push(SimEvent::BuildingAbandoned {
                    x: pos.x,
                    y: pos.y,
                    level: building.level,
                });
                changed.push(pos);
                continue;
            }

            if !powered {
                continue;
            }
            if building.level == 0 {
                if self.rng.chance(self.config.spawn_probability) {
                    building.level = 1;
                    changed.push(pos);
                }
            } else if building.level < MAX_LEVEL && self.rng.chance(upgrade_probability) {
                building.level += 1;
                changed.push(pos);
            }
        }

        if !changed.is_empty() {
            events.push(SimEvent::TilesChanged { tiles: changed });
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

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::PowerConfig;
    use crate::grid::{Building, Grid, Tile, TileType, Zone};

    fn ctx(tick: u64) -> SystemContext {
        SystemContext {
            tick,
            dt: Duration::from_millis(100),
        }
    }

    fn world_with(grid: Grid) -> World {
        let mut world = World::new(grid, PowerConfig::default());
        world.recalculate_power();
        world
    }

    #[test]
    fn test_certain_spawn_fills_every_powered_lot() {
        let mut grid = Grid::new(10, 10, 3);
        grid.set_tile_type(0, 0, TileType::PowerPlant);
        grid.set_tile_type(1, 0, TileType::Residential);
        grid.set_tile_type(9, 9, TileType::Residential);
        let mut world = world_with(grid);
        let mut system = GrowthSystem::new(
            GrowthConfig {
                spawn_probability: 1.0,
                ..GrowthConfig::default()
            },
            3,
        );
        let mut events = EventQueue::new();
        system.run(&ctx(0), &mut world, &mut events).unwrap();

        assert_eq!(world.grid().get_tile(1, 0).unwrap().level(), 1);
        assert_eq!(world.grid().get_tile(9, 9).unwrap().level(), 0);
        assert_eq!(
            events.drain(),
            vec![SimEvent::TilesChanged {
                tiles: vec![TilePos::new(1, 0)]
            }]
        );
    }

    #[test]
    fn test_unpowered_building_is_abandoned_after_thirty_seconds() {
        let mut grid = Grid::new(4, 4, 1);
        grid.set_tile(2, 2, Tile::zone(Zone::Industrial, Building::at_level(2)));
        let mut world = world_with(grid);
        let mut system = GrowthSystem::new(GrowthConfig::default(), 1);
        let mut events = EventQueue::new();

        for tick in 0..299 {
            system.run(&ctx(tick), &mut world, &mut events).unwrap();
        }
        assert!(events.is_empty());
        assert_eq!(world.grid().get_tile(2, 2).unwrap().level(), 2);

        system.run(&ctx(299), &mut world, &mut events).unwrap();
        let tile = world.grid().get_tile(2, 2).unwrap();
        assert_eq!(tile.level(), 1);
        assert_eq!(tile.building().unwrap().unpowered_seconds, 0.0);
        let drained = events.drain();
        assert_eq!(
            drained[0],
            SimEvent::BuildingAbandoned { x: 2, y: 2, level: 1 }
        );
    }

    #[test]
    fn test_power_resets_the_abandonment_timer() {
        let mut grid = Grid::new(4, 4, 1);
        grid.set_tile(1, 1, Tile::zone(Zone::Residential, Building::at_level(1)));
        let mut world = world_with(grid);
        let mut system = GrowthSystem::new(
            GrowthConfig {
                upgrade_probability: 0.0,
                ..GrowthConfig::default()
            },
            1,
        );
        let mut events = EventQueue::new();
        for tick in 0..10 {
            system.run(&ctx(tick), &mut world, &mut events).unwrap();
        }
        let timer = world.grid().get_tile(1, 1).unwrap().building().unwrap().unpowered_seconds;
        assert!((timer - 1.0).abs() < EPS);

        world.grid_mut().set_tile_type(0, 0, TileType::PowerPlant);
        world.recalculate_power();
        system.run(&ctx(10), &mut world, &mut events).unwrap();
        let timer = world.grid().get_tile(1, 1).unwrap().building().unwrap().unpowered_seconds;
        assert_eq!(timer, 0.0);
    }

    #[test]
    fn test_same_seed_same_growth() {
        let build = || {
            let mut grid = Grid::new(16, 16, 42);
            grid.set_tile_type(8, 8, TileType::PowerPlant);
            for x in 4..12 {
                grid.set_tile_type(x, 6, TileType::Residential);
                grid.set_tile_type(x, 10, TileType::Commercial);
            }
            (world_with(grid), GrowthSystem::new(GrowthConfig::default(), 42))
        };
        let (mut left_world, mut left) = build();
        let (mut right_world, mut right) = build();
        let mut left_events = EventQueue::new();
        let mut right_events = EventQueue::new();
        for tick in 0..2_000 {
            left.run(&ctx(tick), &mut left_world, &mut left_events).unwrap();
            right.run(&ctx(tick), &mut right_world, &mut right_events).unwrap();
        }
        assert_eq!(left_world.grid(), right_world.grid());
        assert_eq!(left_events.drain(), right_events.drain());
        assert_eq!(left.rng_state(), right.rng_state());
    }

    /// Powered level-1 house next to a plant, with the city at `happiness`.
    fn upgrade_world(happiness: f64) -> World {
        let mut grid = Grid::new(4, 4, 1);
        grid.set_tile_type(0, 0, TileType::PowerPlant);
        grid.set_tile(1, 0, Tile::zone(Zone::Residential, Building::at_level(1)));
        let mut world = world_with(grid);
        world.stats_mut().happiness = happiness;
        world
    }

    #[test]
    fn test_happy_city_doubles_upgrade_chance() {
        // First draw of this stream lands between 0.005 and 0.01.
        const SEED: u32 = 3_558_199_291;
        let draw = Lcg::new(SEED).next_f64();
        assert!((0.005..0.01).contains(&draw));

        let mut world = upgrade_world(0.69);
        let mut system = GrowthSystem::new(GrowthConfig::default(), SEED);
        let mut events = EventQueue::new();
        system.run(&ctx(0), &mut world, &mut events).unwrap();
        assert_eq!(world.grid().get_tile(1, 0).unwrap().level(), 1);
        assert!(events.is_empty());

        let mut world = upgrade_world(0.7);
        let mut system = GrowthSystem::new(GrowthConfig::default(), SEED);
        system.run(&ctx(0), &mut world, &mut events).unwrap();
        assert_eq!(world.grid().get_tile(1, 0).unwrap().level(), 2);
        assert_eq!(
            events.drain(),
            vec![SimEvent::TilesChanged {
                tiles: vec![TilePos::new(1, 0)]
            }]
        );
    }

    #[test]
    fn test_upgrades_climb_to_max_level() {
        let mut world = upgrade_world(0.5);
        let mut system = GrowthSystem::new(
            GrowthConfig {
                upgrade_probability: 1.0,
                ..GrowthConfig::default()
            },
            9,
        );
        let mut events = EventQueue::new();
        for tick in 0..2 {
            system.run(&ctx(tick), &mut world, &mut events).unwrap();
        }
        assert_eq!(world.grid().get_tile(1, 0).unwrap().level(), MAX_LEVEL);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_max_level_building_draws_nothing() {
        let mut world = upgrade_world(0.9);
        world
            .grid_mut()
            .set_tile(1, 0, Tile::zone(Zone::Residential, Building::at_level(MAX_LEVEL)));
        let mut system = GrowthSystem::new(
            GrowthConfig {
                upgrade_probability: 1.0,
                ..GrowthConfig::default()
            },
            77,
        );
        let before = system.rng_state();
        let mut events = EventQueue::new();
        for tick in 0..50 {
            system.run(&ctx(tick), &mut world, &mut events).unwrap();
        }
        assert_eq!(system.rng_state(), before);
        assert_eq!(world.grid().get_tile(1, 0).unwrap().level(), MAX_LEVEL);
        assert!(events.is_empty());
    }
}
