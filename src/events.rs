//! Simulation events, queued by the engine and drained by the host.

use std::collections::VecDeque;

use serde::Serialize;

use crate::grid::TilePos;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SimEvent {
    /// Building levels changed during one growth pass.
    TilesChanged { tiles: Vec<TilePos> },
    /// A building lost a level after sitting unpowered too long.
    BuildingAbandoned { x: u32, y: u32, level: u8 },
    TaxCollected {
        income: f64,
        upkeep: f64,
        balance: f64,
    },
    /// Tiles repainted by a command, an undo or a redo.
    GridEdited { tiles: Vec<TilePos> },
}

#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<SimEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: SimEvent) {
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Removes and returns every queued event, oldest first.
    pub fn drain(&mut self) -> Vec<SimEvent> {
        self.events.drain(..).collect()
    }
}
