//! Tile grid storage and isometric coordinate math.
//!
//! The grid is the only owner of tile state. Zone tiles carry their building
//! inline, so a building can never exist on a road, a plant or an empty lot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::snapshot::SnapshotError;

pub const MAX_LEVEL: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TileType {
    Empty,
    Road,
    Residential,
    Commercial,
    Industrial,
    PowerPlant,
}

impl TileType {
    pub fn zone(self) -> Option<Zone> {
        match self {
            TileType::Residential => Some(Zone::Residential),
            TileType::Commercial => Some(Zone::Commercial),
            TileType::Industrial => Some(Zone::Industrial),
            TileType::Empty | TileType::Road | TileType::PowerPlant => None,
        }
    }

    pub fn is_zone(self) -> bool {
        self.zone().is_some()
    }

    /// Tile types that draw from the power grid.
    pub fn consumes_power(self) -> bool {
        matches!(
            self,
            TileType::Road | TileType::Residential | TileType::Commercial | TileType::Industrial
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Zone {
    Residential,
    Commercial,
    Industrial,
}

impl Zone {
    pub fn tile_type(self) -> TileType {
        match self {
            Zone::Residential => TileType::Residential,
            Zone::Commercial => TileType::Commercial,
            Zone::Industrial => TileType::Industrial,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Building {
    pub level: u8,
    pub unpowered_seconds: f64,
}

impl Building {
    pub fn vacant() -> Self {
        Self::default()
    }

    pub fn at_level(level: u8) -> Self {
        Self {
            level: level.min(MAX_LEVEL),
            unpowered_seconds: 0.0,
        }
    }

    /// Level clamped to `MAX_LEVEL`; a negative or non-finite timer reads as 0.
    pub fn sanitized(self) -> Self {
        let timer = self.unpowered_seconds;
        let unpowered_seconds = if timer.is_finite() && timer > 0.0 { timer } else { 0.0 };
        Self {
            level: self.level.min(MAX_LEVEL),
            unpowered_seconds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "TileRecord", into = "TileRecord")]
pub enum Tile {
    #[default]
    Empty,
    Road,
    PowerPlant,
    Zone { zone: Zone, building: Building },
}

impl Tile {
    /// Fresh tile of the given type; zones start as a vacant lot.
    pub fn of_type(tile_type: TileType) -> Self {
        if let Some(zone) = tile_type.zone() {
            return Tile::Zone {
                zone,
                building: Building::vacant(),
            };
        }
        match tile_type {
            TileType::Road => Tile::Road,
            TileType::PowerPlant => Tile::PowerPlant,
            _ => Tile::Empty,
        }
    }

    pub fn zone(zone: Zone, building: Building) -> Self {
        Tile::Zone {
            zone,
            building: building.sanitized(),
        }
    }

    pub(crate) fn sanitized(self) -> Self {
        match self {
            Tile::Zone { zone, building } => Tile::zone(zone, building),
            other => other,
        }
    }

    pub fn tile_type(&self) -> TileType {
        match self {
            Tile::Empty => TileType::Empty,
            Tile::Road => TileType::Road,
            Tile::PowerPlant => TileType::PowerPlant,
            Tile::Zone { zone, .. } => zone.tile_type(),
        }
    }

    pub fn building(&self) -> Option<&Building> {
        match self {
            Tile::Zone { building, .. } => Some(building),
            _ => None,
        }
    }

    pub fn building_mut(&mut self) -> Option<&mut Building> {
        match self {
            Tile::Zone { building, .. } => Some(building),
            _ => None,
        }
    }

    pub fn level(&self) -> u8 {
        self.building().map_or(0, |b| b.level)
    }

    /// The tile that results from painting `tile_type` over `self`.
    ///
    /// Repainting the same type keeps the tile (and its building) as is.
    pub fn retyped(self, tile_type: TileType) -> Self {
        if self.tile_type() == tile_type {
            self
        } else {
            Tile::of_type(tile_type)
        }
    }
}

/// Wire form of a tile: `{"type": ..., "building": {...}}`.
#[derive(Serialize, Deserialize)]
struct TileRecord {
    #[serde(rename = "type")]
    tile_type: TileType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    building: Option<Building>,
}

impl From<TileRecord> for Tile {
    fn from(record: TileRecord) -> Self {
        match record.tile_type.zone() {
            Some(zone) => Tile::zone(zone, record.building.unwrap_or_default()),
            None => Tile::of_type(record.tile_type),
        }
    }
}

impl From<Tile> for TileRecord {
    fn from(tile: Tile) -> Self {
        TileRecord {
            tile_type: tile.tile_type(),
            building: tile.building().copied(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TilePos {
    pub x: u32,
    pub y: u32,
}

impl TilePos {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub fn manhattan_distance(self, other: TilePos) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl fmt::Display for TilePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Screen footprint of one isometric tile in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileSize {
    pub width: f64,
    pub height: f64,
}

impl Default for TileSize {
    fn default() -> Self {
        Self {
            width: 64.0,
            height: 32.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSnapshot {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub tile_size: TileSize,
    pub seed: u32,
    /// `height` rows of `width` tiles each.
    pub tiles: Vec<Vec<Tile>>,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    width: u32,
    height: u32,
    tile_size: TileSize,
    seed: u32,
    tiles: Vec<Tile>,
}

impl Grid {
    pub fn new(width: u32, height: u32, seed: u32) -> Self {
        Self::with_tile_size(width, height, TileSize::default(), seed)
    }

    pub fn with_tile_size(width: u32, height: u32, tile_size: TileSize, seed: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            tile_size,
            seed,
            tiles: vec![Tile::Empty; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn tile_size(&self) -> TileSize {
        self.tile_size
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        self.pos(x, y).is_some()
    }

    pub fn pos(&self, x: i32, y: i32) -> Option<TilePos> {
        let x = u32::try_from(x).ok()?;
        let y = u32::try_from(y).ok()?;
        (x < self.width && y < self.height).then_some(TilePos::new(x, y))
    }

    fn index(&self, pos: TilePos) -> Option<usize> {
        if pos.x < self.width && pos.y < self.height {
            Some(pos.y as usize * self.width as usize + pos.x as usize)
        } else {
            None
        }
    }

    /// Copy of the tile at `(x, y)`; `None` outside the grid.
    pub fn get_tile(&self, x: i32, y: i32) -> Option<Tile> {
        self.pos(x, y).and_then(|pos| self.tile(pos)).copied()
    }

    pub fn tile(&self, pos: TilePos) -> Option<&Tile> {
        self.index(pos).and_then(|index| self.tiles.get(index))
    }

    pub(crate) fn tile_mut(&mut self, pos: TilePos) -> Option<&mut Tile> {
        self.index(pos).and_then(|index| self.tiles.get_mut(index))
    }

    pub fn set_tile(&mut self, x: i32, y: i32, tile: Tile) -> bool {
        match self.pos(x, y) {
            Some(pos) => self.put(pos, tile),
            None => false,
        }
    }

    /// Every whole-tile write lands here, so stored buildings stay in range.
    pub(crate) fn put(&mut self, pos: TilePos, tile: Tile) -> bool {
        match self.tile_mut(pos) {
            Some(slot) => {
                *slot = tile.sanitized();
                true
            }
            None => false,
        }
    }

    /// Changes the tile type, creating or dropping the building as needed.
    pub fn set_tile_type(&mut self, x: i32, y: i32, tile_type: TileType) -> bool {
        let Some(pos) = self.pos(x, y) else {
            return false;
        };
        match self.tile_mut(pos) {
            Some(slot) => {
                *slot = slot.retyped(tile_type);
                true
            }
            None => false,
        }
    }

    /// World-space anchor of a tile in the isometric projection.
    pub fn tile_to_world(&self, x: i32, y: i32) -> (f64, f64) {
        let half_w = self.tile_size.width / 2.0;
        let half_h = self.tile_size.height / 2.0;
        let (x, y) = (f64::from(x), f64::from(y));
        ((x - y) * half_w, (x + y) * half_h)
    }

    /// Inverse of [`Grid::tile_to_world`], floored to whole tiles.
    ///
    /// The result may lie outside the grid; callers probe it with
    /// [`Grid::get_tile`].
    pub fn world_to_tile(&self, world_x: f64, world_y: f64) -> (i32, i32) {
        let a = world_x / (self.tile_size.width / 2.0);
        let b = world_y / (self.tile_size.height / 2.0);
        let x = ((a + b) / 2.0).floor();
        let y = ((b - a) / 2.0).floor();
        (x as i32, y as i32)
    }

    pub fn count_tiles(&self, tile_type: TileType) -> usize {
        self.tiles
            .iter()
            .filter(|tile| tile.tile_type() == tile_type)
            .count()
    }

    /// Row-major iteration over every tile.
    pub fn iter(&self) -> impl Iterator<Item = (TilePos, &Tile)> + '_ {
        let width = self.width.max(1);
        self.tiles.iter().enumerate().map(move |(index, tile)| {
            let index = index as u32;
            (TilePos::new(index % width, index / width), tile)
        })
    }

    pub fn positions_of(&self, tile_type: TileType) -> Vec<TilePos> {
        self.iter()
            .filter(|(_, tile)| tile.tile_type() == tile_type)
            .map(|(pos, _)| pos)
            .collect()
    }

    pub fn zone_tiles(&self) -> impl Iterator<Item = (TilePos, Zone, &Building)> + '_ {
        self.iter().filter_map(|(pos, tile)| match tile {
            Tile::Zone { zone, building } => Some((pos, *zone, building)),
            _ => None,
        })
    }

    pub fn snapshot(&self) -> GridSnapshot {
        let tiles = if self.width == 0 {
            vec![Vec::new(); self.height as usize]
        } else {
            self.tiles
                .chunks(self.width as usize)
                .map(|row| row.to_vec())
                .collect()
        };
        GridSnapshot {
            width: self.width,
            height: self.height,
            tile_size: self.tile_size,
            seed: self.seed,
            tiles,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn from_snapshot(snapshot: GridSnapshot) -> Result<Self, SnapshotError> {
        let GridSnapshot {
            width,
            height,
            tile_size,
            seed,
            tiles,
            ..
        } = snapshot;
        if tiles.len() != height as usize {
            return Err(SnapshotError::Shape(format!(
                "expected {height} rows, found {}",
                tiles.len()
            )));
        }
        if let Some((row, len)) = tiles
            .iter()
            .map(Vec::len)
            .enumerate()
            .find(|(_, len)| *len != width as usize)
        {
            return Err(SnapshotError::Shape(format!(
                "row {row} has {len} tiles, expected {width}"
            )));
        }
        if !(tile_size.width > 0.0 && tile_size.height > 0.0) {
            return Err(SnapshotError::Shape(format!(
                "tile size {}x{} must be positive",
                tile_size.width, tile_size.height
            )));
        }
        Ok(Self {
            width,
            height,
            tile_size,
            seed,
            tiles: tiles.into_iter().flatten().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isometric_transform_round_trips_every_tile() {
        let grid = Grid::new(24, 17, 1);
        for y in 0..17 {
            for x in 0..24 {
                let (wx, wy) = grid.tile_to_world(x, y);
                assert_eq!(grid.world_to_tile(wx, wy), (x, y));
            }
        }
    }

    #[test]
    fn test_world_to_tile_floors_points_inside_the_diamond() {
        let grid = Grid::new(8, 8, 1);
        let (wx, wy) = grid.tile_to_world(3, 2);
        // Just below the anchor, still inside tile (3, 2).
        assert_eq!(grid.world_to_tile(wx, wy + 4.0), (3, 2));
    }

    #[test]
    fn test_out_of_bounds_access_is_absorbed() {
        let mut grid = Grid::new(4, 4, 1);
        assert_eq!(grid.get_tile(-1, 0), None);
        assert_eq!(grid.get_tile(4, 0), None);
        assert!(!grid.set_tile(0, 4, Tile::Road));
        assert!(!grid.set_tile_type(-3, 2, TileType::Road));
        assert_eq!(grid.count_tiles(TileType::Road), 0);
    }

    #[test]
    fn test_set_tile_type_manages_building_presence() {
        let mut grid = Grid::new(4, 4, 1);
        assert!(grid.set_tile_type(1, 1, TileType::Residential));
        let tile = grid.get_tile(1, 1).unwrap();
        assert_eq!(tile.building(), Some(&Building::vacant()));

        assert!(grid.set_tile_type(1, 1, TileType::Road));
        assert_eq!(grid.get_tile(1, 1).unwrap().building(), None);
    }

    #[test]
    fn test_repainting_same_zone_keeps_building() {
        let mut grid = Grid::new(4, 4, 1);
        grid.set_tile(2, 2, Tile::zone(Zone::Commercial, Building::at_level(2)));
        grid.set_tile_type(2, 2, TileType::Commercial);
        assert_eq!(grid.get_tile(2, 2).unwrap().level(), 2);

        grid.set_tile_type(2, 2, TileType::Industrial);
        assert_eq!(grid.get_tile(2, 2).unwrap().level(), 0);
    }

    #[test]
    fn test_get_tile_returns_an_independent_copy() {
        let mut grid = Grid::new(2, 2, 1);
        grid.set_tile_type(0, 0, TileType::Residential);
        let mut copy = grid.get_tile(0, 0).unwrap();
        copy.building_mut().unwrap().level = 3;
        assert_eq!(grid.get_tile(0, 0).unwrap().level(), 0);
    }

    #[test]
    fn test_count_tiles_scans_whole_grid() {
        let mut grid = Grid::new(5, 5, 1);
        for x in 0..5 {
            grid.set_tile_type(x, 0, TileType::Road);
        }
        grid.set_tile_type(2, 2, TileType::PowerPlant);
        assert_eq!(grid.count_tiles(TileType::Road), 5);
        assert_eq!(grid.count_tiles(TileType::PowerPlant), 1);
        assert_eq!(grid.count_tiles(TileType::Empty), 19);
    }

    #[test]
    fn test_snapshot_restores_an_equal_grid() {
        let mut grid = Grid::new(3, 2, 99);
        grid.set_tile_type(0, 1, TileType::Industrial);
        grid.set_tile_type(2, 0, TileType::Road);
        let snapshot = grid.snapshot();
        assert_eq!(snapshot.tiles.len(), 2);
        assert_eq!(snapshot.tiles[1][0].tile_type(), TileType::Industrial);

        let mut restored = Grid::from_snapshot(snapshot.clone()).unwrap();
        assert_eq!(restored, grid);
        restored.set_tile_type(1, 1, TileType::Road);
        assert_eq!(snapshot.tiles[1][1], Tile::Empty);
    }

    #[test]
    fn test_from_snapshot_rejects_ragged_rows() {
        let mut snapshot = Grid::new(3, 2, 1).snapshot();
        snapshot.tiles[1].pop();
        assert!(matches!(
            Grid::from_snapshot(snapshot),
            Err(SnapshotError::Shape(_))
        ));
    }

    #[test]
    fn test_tile_wire_format_repairs_invariant_violations() {
        let road: Tile =
            serde_json::from_str(r#"{"type":"ROAD","building":{"level":2,"unpoweredSeconds":1.0}}"#)
                .unwrap();
        assert_eq!(road, Tile::Road);

        let zone: Tile = serde_json::from_str(r#"{"type":"RESIDENTIAL"}"#).unwrap();
        assert_eq!(zone.building(), Some(&Building::vacant()));

        let tall: Tile = serde_json::from_str(
            r#"{"type":"COMMERCIAL","building":{"level":9,"unpoweredSeconds":0.0}}"#,
        )
        .unwrap();
        assert_eq!(tall.level(), MAX_LEVEL);

        let json = serde_json::to_string(&Tile::PowerPlant).unwrap();
        assert_eq!(json, r#"{"type":"POWER_PLANT"}"#);
    }

    #[test]
    fn test_set_tile_keeps_building_in_range() {
        let mut grid = Grid::new(4, 4, 1);
        let wild = Building {
            level: 9,
            unpowered_seconds: -5.0,
        };
        assert!(grid.set_tile(
            1,
            1,
            Tile::Zone {
                zone: Zone::Residential,
                building: wild,
            }
        ));
        let stored = grid.get_tile(1, 1).unwrap();
        assert_eq!(stored.level(), MAX_LEVEL);
        assert_eq!(stored.building().unwrap().unpowered_seconds, 0.0);

        let mut copy = stored;
        copy.building_mut().unwrap().unpowered_seconds = f64::NAN;
        grid.set_tile(1, 1, copy);
        assert_eq!(grid.get_tile(1, 1).unwrap().building().unwrap().unpowered_seconds, 0.0);

        assert_eq!(Tile::zone(Zone::Commercial, wild).level(), MAX_LEVEL);
    }

    #[test]
    fn test_tile_pos_key_matches_x_comma_y() {
        assert_eq!(TilePos::new(32, 36).to_string(), "32,36");
        assert_eq!(TilePos::new(32, 32).manhattan_distance(TilePos::new(30, 45)), 15);
    }
}
