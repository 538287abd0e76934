use std::fs;

use tilecity::{
    engine::{Engine, EngineBuilder, EngineSettings},
    grid::{Grid, TileType},
    snapshot::{load_or_none, SaveData, SAVE_VERSION},
    world::World,
    SimConfig,
};
use tempfile::tempdir;

fn town(seed: u32) -> Engine {
    let config = SimConfig::default();
    let world = World::new(Grid::new(24, 24, seed), config.power.clone());
    let mut engine = EngineBuilder::new(EngineSettings::from_config("saves", &config), world)
        .with_city_systems(&config)
        .build();
    engine.paint_tile(12, 12, TileType::PowerPlant);
    engine.begin_stroke(TileType::Road);
    for x in 4..20 {
        engine.paint(x, 11);
    }
    engine.end_stroke();
    engine.begin_stroke(TileType::Residential);
    for x in 6..18 {
        engine.paint(x, 10);
        engine.paint(x, 13);
    }
    engine.end_stroke();
    engine
}

#[test]
fn restored_engine_continues_identically() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("city.json");

    let mut original = town(77);
    original.run(450).unwrap();
    original.serialize().write_to(&path).unwrap();

    let save = load_or_none(&path).expect("save readable");
    assert_eq!(save.version, SAVE_VERSION);
    let mut restored = Engine::from_save(save, &SimConfig::default(), "saves").unwrap();
    assert_eq!(restored.world().grid(), original.world().grid());
    assert_eq!(restored.world().stats(), original.world().stats());

    original.run(600).unwrap();
    restored.run(600).unwrap();
    assert_eq!(restored.world().grid(), original.world().grid());
    assert_eq!(restored.world().stats(), original.world().stats());
}

#[test]
fn malformed_saves_fall_back_to_none() {
    let dir = tempdir().expect("tempdir");
    let truncated = dir.path().join("truncated.json");
    let json = town(1).serialize().to_json().unwrap();
    fs::write(&truncated, &json[..json.len() / 2]).unwrap();
    assert!(load_or_none(&truncated).is_none());

    let ragged = dir.path().join("ragged.json");
    let mut save = town(1).serialize();
    save.grid.tiles[3].truncate(5);
    save.write_to(&ragged).unwrap();
    let loaded = load_or_none(&ragged).expect("json itself is valid");
    assert!(Engine::from_save(loaded, &SimConfig::default(), "saves").is_err());

    assert!(load_or_none(&dir.path().join("missing.json")).is_none());
}

#[test]
fn nan_balance_in_save_is_sanitised() {
    let mut save = town(3).serialize();
    save.city_stats.balance = f64::NAN;
    let json = save.to_json().unwrap();
    let data = SaveData::from_json(&json).unwrap();
    let engine = Engine::from_save(data, &SimConfig::default(), "saves").unwrap();
    assert_eq!(engine.world().stats().balance, 0.0);
}

#[test]
fn load_clears_history_and_recomputes_power() {
    let mut engine = town(5);
    let save = engine.serialize();
    engine.paint_tile(0, 0, TileType::PowerPlant);
    assert!(engine.history().can_undo());

    engine.load(save).unwrap();
    assert!(!engine.history().can_undo());
    assert_eq!(engine.world().power().capacity(), 200);
    assert!(engine.world().power().is_powered(12, 13));
}
