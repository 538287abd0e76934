//! Save files and periodic autosave.
//!
//! A save is the grid snapshot plus the city statistics, written as camelCase
//! JSON. Loading goes through [`SaveData::from_json`]; anything malformed is
//! reported as a [`SnapshotError`] and the host decides whether to start fresh.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::grid::GridSnapshot;
use crate::systems::economy::CityStats;

pub const SAVE_VERSION: u32 = 1;

fn default_version() -> u32 {
    SAVE_VERSION
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed save json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("save shape mismatch: {0}")]
    Shape(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveData {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(flatten)]
    pub grid: GridSnapshot,
    #[serde(default, deserialize_with = "lenient_stats")]
    pub city_stats: CityStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng_state: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_elapsed_ms: Option<u64>,
}

/// Wire form of [`CityStats`] that tolerates the `null` serde_json writes
/// for a NaN balance.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsRecord {
    #[serde(default)]
    balance: Option<f64>,
    #[serde(default)]
    population: u64,
    #[serde(default)]
    jobs: u64,
    #[serde(default)]
    shoppers: u64,
    #[serde(default)]
    happiness: Option<f64>,
}

fn lenient_stats<'de, D>(deserializer: D) -> Result<CityStats, D::Error>
where
    D: Deserializer<'de>,
{
    let record = StatsRecord::deserialize(deserializer)?;
    let balance = match record.balance {
        Some(value) if value.is_finite() => value,
        Some(_) | None => {
            warn!("save carried no usable balance, resetting to 0");
            0.0
        }
    };
    let happiness = record
        .happiness
        .filter(|value| value.is_finite())
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);
    Ok(CityStats {
        balance,
        population: record.population,
        jobs: record.jobs,
        shoppers: record.shoppers,
        happiness,
    })
}

impl SaveData {
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let data: SaveData = serde_json::from_str(json)?;
        Ok(migrate(data))
    }

    pub fn write_to(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self, SnapshotError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Brings an older save up to [`SAVE_VERSION`]. Only version 1 exists so far.
pub fn migrate(data: SaveData) -> SaveData {
    if data.version != SAVE_VERSION {
        info!(
            from = data.version,
            to = SAVE_VERSION,
            "migrating save data"
        );
    }
    SaveData {
        version: SAVE_VERSION,
        ..data
    }
}

/// Reads a save, treating a missing or malformed file as "no save".
pub fn load_or_none(path: &Path) -> Option<SaveData> {
    match SaveData::read_from(path) {
        Ok(data) => Some(data),
        Err(SnapshotError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no save found");
            None
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring unreadable save");
            None
        }
    }
}

/// Writes `<dir>/<scenario>/tick_NNNNNN.json` every `interval_ticks` ticks.
pub struct SnapshotWriter {
    output_dir: PathBuf,
    interval_ticks: u64,
}

impl SnapshotWriter {
    pub fn new(output_dir: impl Into<PathBuf>, interval_ticks: u64) -> Self {
        Self {
            output_dir: output_dir.into(),
            interval_ticks,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.interval_ticks > 0
    }

    pub fn maybe_write(
        &self,
        tick: u64,
        scenario_name: &str,
        save: impl FnOnce() -> SaveData,
    ) -> Result<Option<PathBuf>, SnapshotError> {
        if !self.is_enabled() || tick == 0 || tick % self.interval_ticks != 0 {
            return Ok(None);
        }
        let path = self
            .output_dir
            .join(scenario_name)
            .join(format!("tick_{tick:06}.json"));
        save().write_to(&path)?;
        debug!(tick, path = %path.display(), "autosaved");
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Grid, TileType};

    fn sample_save() -> SaveData {
        let mut grid = Grid::new(4, 3, 77);
        grid.set_tile_type(1, 1, TileType::Residential);
        grid.set_tile_type(0, 0, TileType::PowerPlant);
        SaveData {
            version: SAVE_VERSION,
            grid: grid.snapshot(),
            city_stats: CityStats {
                balance: 1234.5,
                ..CityStats::default()
            },
            rng_state: Some(99),
            tax_elapsed_ms: Some(1500),
        }
    }

    #[test]
    fn test_save_json_uses_camel_case_fields() {
        let json = sample_save().to_json().unwrap();
        assert!(json.contains("\"tileSize\""));
        assert!(json.contains("\"cityStats\""));
        assert!(json.contains("\"rngState\""));
        assert!(json.contains("\"POWER_PLANT\""));

        let restored = SaveData::from_json(&json).unwrap();
        assert_eq!(restored, sample_save_with_timestamp(&restored));
    }

    fn sample_save_with_timestamp(restored: &SaveData) -> SaveData {
        let mut expected = sample_save();
        expected.grid.timestamp = restored.grid.timestamp;
        expected
    }

    #[test]
    fn test_missing_version_defaults_to_current() {
        let mut value: serde_json::Value =
            serde_json::from_str(&sample_save().to_json().unwrap()).unwrap();
        value.as_object_mut().unwrap().remove("version");
        let data = SaveData::from_json(&value.to_string()).unwrap();
        assert_eq!(data.version, SAVE_VERSION);
    }

    #[test]
    fn test_null_balance_is_reset_to_zero() {
        let mut save = sample_save();
        save.city_stats.balance = f64::NAN;
        let json = save.to_json().unwrap();
        assert!(json.contains("\"balance\": null"));
        let data = SaveData::from_json(&json).unwrap();
        assert_eq!(data.city_stats.balance, 0.0);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(
            SaveData::from_json("{\"width\": 3"),
            Err(SnapshotError::Json(_))
        ));
    }

    #[test]
    fn test_load_or_none_falls_back_on_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(load_or_none(&missing).is_none());

        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "not json").unwrap();
        assert!(load_or_none(&garbage).is_none());

        let good = dir.path().join("good.json");
        sample_save().write_to(&good).unwrap();
        let loaded = load_or_none(&good).unwrap();
        assert_eq!(loaded.grid.seed, 77);
    }

    #[test]
    fn test_writer_respects_interval() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path(), 5);
        assert!(writer.maybe_write(3, "town", sample_save).unwrap().is_none());
        let path = writer.maybe_write(10, "town", sample_save).unwrap().unwrap();
        assert_eq!(path, dir.path().join("town").join("tick_000010.json"));
        assert!(path.exists());

        let disabled = SnapshotWriter::new(dir.path(), 0);
        assert!(disabled.maybe_write(10, "town", sample_save).unwrap().is_none());
    }
}
