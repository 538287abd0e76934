pub mod commands;
pub mod config;
pub mod engine;
pub mod events;
pub mod grid;
pub mod rng;
pub mod scenario;
pub mod scheduler;
pub mod snapshot;
pub mod systems;
pub mod web;
pub mod world;

pub use config::SimConfig;
pub use engine::{Engine, EngineBuilder, EngineSettings, TickSummary};
pub use grid::{Grid, Tile, TileType};
pub use scenario::{Scenario, ScenarioLoader};
