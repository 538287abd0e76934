use std::any::Any;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info};

use crate::{
    commands::{CommandHistory, EditCommand, PaintStroke},
    config::SimConfig,
    events::{EventQueue, SimEvent},
    grid::{Grid, Tile, TilePos, TileType},
    scheduler::TickScheduler,
    snapshot::{SaveData, SnapshotError, SnapshotWriter, SAVE_VERSION},
    systems::{EconomySystem, GrowthSystem, PowerSystem},
    world::{CitySnapshot, World},
};

pub struct SystemContext {
    pub tick: u64,
    pub dt: Duration,
}

/// One stage of the per-tick pipeline. Systems run in registration order.
pub trait System: Send {
    fn name(&self) -> &str;
    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        events: &mut EventQueue,
    ) -> Result<()>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub scenario_name: String,
    pub tick_interval: Duration,
    pub history_capacity: usize,
    pub snapshot_interval_ticks: u64,
    pub snapshot_dir: PathBuf,
}

impl EngineSettings {
    pub fn from_config(scenario_name: impl Into<String>, config: &SimConfig) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            tick_interval: config.tick.interval(),
            history_capacity: config.history.capacity,
            snapshot_interval_ticks: config.snapshot.interval_ticks,
            snapshot_dir: PathBuf::from(&config.snapshot.dir),
        }
    }
}

pub struct EngineBuilder {
    settings: EngineSettings,
    world: World,
    systems: Vec<Box<dyn System>>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings, world: World) -> Self {
        Self {
            settings,
            world,
            systems: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl System + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    /// Registers power, growth and economy in that order, seeding growth
    /// from the grid.
    pub fn with_city_systems(self, config: &SimConfig) -> Self {
        let seed = self.world.grid().seed();
        self.with_system(PowerSystem::new())
            .with_system(GrowthSystem::new(config.growth.clone(), seed))
            .with_system(EconomySystem::new(config.economy.clone()))
    }

    pub fn build(self) -> Engine {
        Engine {
            world: self.world,
            systems: self.systems,
            scheduler: TickScheduler::new(self.settings.tick_interval),
            history: CommandHistory::new(self.settings.history_capacity),
            events: EventQueue::new(),
            stroke: None,
            snapshot_writer: SnapshotWriter::new(
                &self.settings.snapshot_dir,
                self.settings.snapshot_interval_ticks,
            ),
            settings: self.settings,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SystemRunReport {
    pub name: String,
    pub duration_ms: f64,
}

#[derive(Clone, Debug)]
pub struct TickSummary {
    pub tick: u64,
    pub system_reports: Vec<SystemRunReport>,
    pub snapshot_path: Option<PathBuf>,
}

pub struct Engine {
    world: World,
    systems: Vec<Box<dyn System>>,
    scheduler: TickScheduler,
    history: CommandHistory,
    events: EventQueue,
    stroke: Option<PaintStroke>,
    snapshot_writer: SnapshotWriter,
    settings: EngineSettings,
}

impl Engine {
    /// Restores an engine with the standard systems from a save.
    pub fn from_save(
        save: SaveData,
        config: &SimConfig,
        scenario_name: &str,
    ) -> Result<Self, SnapshotError> {
        // `load` validates and installs the real grid.
        let world = World::new(Grid::new(0, 0, save.grid.seed), config.power.clone());
        let settings = EngineSettings::from_config(scenario_name, config);
        let mut engine = EngineBuilder::new(settings, world)
            .with_city_systems(config)
            .build();
        engine.load(save)?;
        Ok(engine)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn snapshot(&self) -> CitySnapshot {
        self.world.snapshot()
    }

    pub fn scenario_name(&self) -> &str {
        &self.settings.scenario_name
    }

    pub fn current_tick(&self) -> u64 {
        self.world.tick()
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn system<T: 'static>(&self) -> Option<&T> {
        self.systems
            .iter()
            .find_map(|system| system.as_any().downcast_ref::<T>())
    }

    pub fn system_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.systems
            .iter_mut()
            .find_map(|system| system.as_any_mut().downcast_mut::<T>())
    }

    /// Feeds the host clock and fires every tick that has come due.
    pub fn frame(&mut self, now: Duration) -> Result<u32> {
        let due = self.scheduler.advance(now);
        for _ in 0..due {
            self.tick()?;
        }
        Ok(due)
    }

    /// Runs one tick regardless of the pause flag.
    pub fn tick(&mut self) -> Result<TickSummary> {
        let ctx = SystemContext {
            tick: self.world.tick(),
            dt: self.settings.tick_interval,
        };
        let mut system_reports = Vec::with_capacity(self.systems.len());
        for system in &mut self.systems {
            let start = Instant::now();
            system.run(&ctx, &mut self.world, &mut self.events)?;
            system_reports.push(SystemRunReport {
                name: system.name().to_string(),
                duration_ms: start.elapsed().as_secs_f64() * 1_000.0,
            });
        }
        self.world.advance_time(ctx.dt);

        let tick = self.world.tick();
        let snapshot_path = self
            .snapshot_writer
            .maybe_write(tick, &self.settings.scenario_name, || self.serialize())?;

        Ok(TickSummary {
            tick,
            system_reports,
            snapshot_path,
        })
    }

    pub fn run(&mut self, ticks: u64) -> Result<()> {
        self.run_with_hook(ticks, |_| {})
    }

    pub fn run_with_hook<F>(&mut self, ticks: u64, mut hook: F) -> Result<()>
    where
        F: FnMut(CitySnapshot),
    {
        for _ in 0..ticks {
            self.tick()?;
            hook(self.world.snapshot());
        }
        Ok(())
    }

    pub fn pause(&mut self) {
        self.scheduler.pause();
        info!(tick = self.world.tick(), "simulation paused");
    }

    pub fn resume(&mut self) {
        self.scheduler.resume();
        info!(tick = self.world.tick(), "simulation resumed");
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Starts a drag stroke; an unfinished previous stroke is committed first.
    pub fn begin_stroke(&mut self, tile_type: TileType) {
        self.end_stroke();
        self.stroke = Some(PaintStroke::new(tile_type));
    }

    /// Paints one tile of the current stroke. `false` without a stroke or
    /// outside the grid.
    pub fn paint(&mut self, x: i32, y: i32) -> bool {
        let Some(stroke) = self.stroke.as_mut() else {
            return false;
        };
        let Some(pos) = self.world.grid().pos(x, y) else {
            return false;
        };
        if !stroke.paint(self.world.grid_mut(), x, y) {
            return false;
        }
        self.after_edit(vec![pos]);
        true
    }

    /// Commits the current stroke as one undo step. Returns whether anything
    /// was recorded.
    pub fn end_stroke(&mut self) -> bool {
        let Some(stroke) = self.stroke.take() else {
            return false;
        };
        match stroke.finish(self.world.grid()) {
            Some(command) => {
                debug!(tiles = command.edits().len(), "stroke committed");
                self.history.record(command, self.world.grid_mut());
                true
            }
            None => false,
        }
    }

    pub fn paint_tile(&mut self, x: i32, y: i32, tile_type: TileType) -> bool {
        match EditCommand::paint(self.world.grid(), x, y, tile_type) {
            Some(command) => self.execute(command),
            None => false,
        }
    }

    pub fn place_tile(&mut self, x: i32, y: i32, tile: Tile) -> bool {
        match EditCommand::place(self.world.grid(), x, y, tile) {
            Some(command) => self.execute(command),
            None => false,
        }
    }

    fn execute(&mut self, command: EditCommand) -> bool {
        if command.edits().iter().all(|edit| edit.is_noop()) {
            return true;
        }
        let positions = command.positions();
        self.history.execute(command, self.world.grid_mut());
        self.after_edit(positions);
        true
    }

    pub fn undo(&mut self) -> bool {
        self.end_stroke();
        let positions = self.history.undo(self.world.grid_mut()).map(EditCommand::positions);
        match positions {
            Some(positions) => {
                debug!(tiles = positions.len(), "undo");
                self.after_edit(positions);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        self.end_stroke();
        let positions = self.history.redo(self.world.grid_mut()).map(EditCommand::positions);
        match positions {
            Some(positions) => {
                debug!(tiles = positions.len(), "redo");
                self.after_edit(positions);
                true
            }
            None => false,
        }
    }

    fn after_edit(&mut self, tiles: Vec<TilePos>) {
        self.world.recalculate_power();
        self.events.push(SimEvent::GridEdited { tiles });
    }

    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        self.events.drain()
    }

    pub fn serialize(&self) -> SaveData {
        SaveData {
            version: SAVE_VERSION,
            grid: self.world.grid().snapshot(),
            city_stats: *self.world.stats(),
            rng_state: self.system::<GrowthSystem>().map(GrowthSystem::rng_state),
            tax_elapsed_ms: self
                .system::<EconomySystem>()
                .map(|economy| economy.tax_elapsed().as_millis() as u64),
        }
    }

    /// Replaces the running city with a save. On error the current city is
    /// left untouched.
    pub fn load(&mut self, save: SaveData) -> Result<(), SnapshotError> {
        let grid = Grid::from_snapshot(save.grid)?;
        let seed = grid.seed();
        let power_config = self.world.power_config().clone();
        self.world = World::new(grid, power_config).with_stats(save.city_stats);
        self.stroke = None;
        self.history.clear();

        let rng_state = save.rng_state.unwrap_or(seed);
        if let Some(growth) = self.system_mut::<GrowthSystem>() {
            growth.restore_rng(rng_state);
        }
        let tax_elapsed = Duration::from_millis(save.tax_elapsed_ms.unwrap_or(0));
        if let Some(economy) = self.system_mut::<EconomySystem>() {
            economy.set_tax_elapsed(tax_elapsed);
        }
        info!(
            width = self.world.grid().width(),
            height = self.world.grid().height(),
            seed,
            "save loaded"
        );
        Ok(())
    }
}
