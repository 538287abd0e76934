use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    config::SimConfig,
    engine::EngineSettings,
    grid::{Grid, TileSize, TileType},
    rng::fresh_seed,
    systems::CityStats,
    world::World,
};

fn default_starting_balance() -> f64 {
    10_000.0
}

fn default_extent() -> u32 {
    1
}

#[derive(Debug, Error, PartialEq)]
pub enum ScenarioError {
    #[error("grid must be at least 1x1, got {width}x{height}")]
    ZeroDimensions { width: u32, height: u32 },
    #[error("tile size {width}x{height} must be positive")]
    BadTileSize { width: f64, height: f64 },
    #[error("placement {index} ({tile:?} at {x},{y} size {width}x{height}) leaves the grid")]
    PlacementOutOfBounds {
        index: usize,
        tile: TileType,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Random when omitted.
    #[serde(default)]
    pub seed: Option<u32>,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub tile_size: Option<TileSize>,
    #[serde(default = "default_starting_balance")]
    pub starting_balance: f64,
    #[serde(default)]
    pub ticks: Option<u64>,
    #[serde(default)]
    pub placements: Vec<Placement>,
    #[serde(default)]
    pub config: SimConfig,
}

/// A filled rectangle of one tile type, anchored at its top-left tile.
#[derive(Debug, Clone, Deserialize)]
pub struct Placement {
    pub tile: TileType,
    pub x: i32,
    pub y: i32,
    #[serde(default = "default_extent")]
    pub width: u32,
    #[serde(default = "default_extent")]
    pub height: u32,
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        scenario
            .validate()
            .with_context(|| format!("Invalid scenario {}", path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.width == 0 || self.height == 0 {
            return Err(ScenarioError::ZeroDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if let Some(size) = self.tile_size {
            if !(size.width > 0.0 && size.height > 0.0) {
                return Err(ScenarioError::BadTileSize {
                    width: size.width,
                    height: size.height,
                });
            }
        }
        for (index, placement) in self.placements.iter().enumerate() {
            let fits = |start: i32, extent: u32, limit: u32| {
                start >= 0 && extent > 0 && i64::from(start) + i64::from(extent) <= i64::from(limit)
            };
            if !fits(placement.x, placement.width, self.width)
                || !fits(placement.y, placement.height, self.height)
            {
                return Err(ScenarioError::PlacementOutOfBounds {
                    index,
                    tile: placement.tile,
                    x: placement.x,
                    y: placement.y,
                    width: placement.width,
                    height: placement.height,
                });
            }
        }
        Ok(())
    }

    /// Builds the starting world with every placement painted in order.
    pub fn build_world(&self) -> Result<World, ScenarioError> {
        self.validate()?;
        let seed = self.seed.unwrap_or_else(fresh_seed);
        let mut grid = Grid::with_tile_size(
            self.width,
            self.height,
            self.tile_size.unwrap_or_default(),
            seed,
        );
        for placement in &self.placements {
            for dy in 0..placement.height as i32 {
                for dx in 0..placement.width as i32 {
                    grid.set_tile_type(placement.x + dx, placement.y + dy, placement.tile);
                }
            }
        }
        let stats = CityStats {
            balance: self.starting_balance,
            ..CityStats::default()
        };
        Ok(World::new(grid, self.config.power.clone()).with_stats(stats))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings::from_config(&self.name, &self.config)
    }

    pub fn ticks(&self, override_ticks: Option<u64>) -> u64 {
        override_ticks.or(self.ticks).unwrap_or(600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
name: test_town
seed: 12
width: 16
height: 8
starting_balance: 500
placements:
  - { tile: POWER_PLANT, x: 2, y: 2 }
  - { tile: ROAD, x: 0, y: 4, width: 16 }
  - { tile: RESIDENTIAL, x: 3, y: 5, width: 2, height: 2 }
config:
  power:
    coverage_radius: 4
"#;

    #[test]
    fn test_parses_and_builds_world() {
        let scenario: Scenario = serde_yaml::from_str(YAML).unwrap();
        assert_eq!(scenario.config.power.coverage_radius, 4);
        assert_eq!(scenario.config.economy.tax_interval_ms, 3_000);

        let world = scenario.build_world().unwrap();
        let grid = world.grid();
        assert_eq!(grid.seed(), 12);
        assert_eq!(grid.count_tiles(TileType::Road), 16);
        assert_eq!(grid.count_tiles(TileType::Residential), 4);
        assert_eq!(grid.count_tiles(TileType::PowerPlant), 1);
        assert_eq!(world.stats().balance, 500.0);
        assert!(world.power().is_powered(2, 4));
        assert!(!world.power().is_powered(10, 4));
    }

    #[test]
    fn test_rejects_placements_outside_grid() {
        let mut scenario: Scenario = serde_yaml::from_str(YAML).unwrap();
        scenario.placements[1].width = 17;
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::PlacementOutOfBounds { index: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_empty_grid() {
        let mut scenario: Scenario = serde_yaml::from_str(YAML).unwrap();
        scenario.height = 0;
        assert_eq!(
            scenario.build_world().err(),
            Some(ScenarioError::ZeroDimensions {
                width: 16,
                height: 0
            })
        );
    }

    #[test]
    fn test_loader_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ScenarioLoader::new(dir.path());
        let err = loader.load("nope.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read scenario file"));
    }
}
