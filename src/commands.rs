//! Undoable grid edits.
//!
//! Every player edit is recorded as an [`EditCommand`] holding the tile
//! values before and after, so undo restores exactly what was there.
//! [`CommandHistory`] keeps a linear list with a cursor; executing a new
//! command drops anything that could have been redone.

use std::collections::HashMap;

use crate::grid::{Grid, Tile, TilePos, TileType};

pub const MAX_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileEdit {
    pub pos: TilePos,
    pub before: Tile,
    pub after: Tile,
}

impl TileEdit {
    pub fn is_noop(&self) -> bool {
        self.before == self.after
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditCommand {
    PaintTile(TileEdit),
    /// One drag stroke; undone as a unit.
    BatchPaint(Vec<TileEdit>),
}

impl EditCommand {
    /// Captures painting `tile_type` at `(x, y)`; `None` when out of bounds.
    pub fn paint(grid: &Grid, x: i32, y: i32, tile_type: TileType) -> Option<Self> {
        let pos = grid.pos(x, y)?;
        let before = *grid.tile(pos)?;
        Some(EditCommand::PaintTile(TileEdit {
            pos,
            before,
            after: before.retyped(tile_type),
        }))
    }

    /// Captures replacing the tile at `(x, y)` wholesale.
    pub fn place(grid: &Grid, x: i32, y: i32, tile: Tile) -> Option<Self> {
        let pos = grid.pos(x, y)?;
        let before = *grid.tile(pos)?;
        Some(EditCommand::PaintTile(TileEdit {
            pos,
            before,
            after: tile.sanitized(),
        }))
    }

    pub fn edits(&self) -> &[TileEdit] {
        match self {
            EditCommand::PaintTile(edit) => std::slice::from_ref(edit),
            EditCommand::BatchPaint(edits) => edits,
        }
    }

    pub fn positions(&self) -> Vec<TilePos> {
        self.edits().iter().map(|edit| edit.pos).collect()
    }

    pub fn apply(&self, grid: &mut Grid) {
        for edit in self.edits() {
            grid.put(edit.pos, edit.after);
        }
    }

    pub fn invert(&self, grid: &mut Grid) {
        for edit in self.edits().iter().rev() {
            grid.put(edit.pos, edit.before);
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandHistory {
    commands: Vec<EditCommand>,
    cursor: usize,
    capacity: usize,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(MAX_HISTORY)
    }
}

impl CommandHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            commands: Vec::new(),
            cursor: 0,
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.commands.len()
    }

    /// Applies `command` and records it, discarding the redo branch.
    pub fn execute(&mut self, command: EditCommand, grid: &mut Grid) {
        self.commands.truncate(self.cursor);
        command.apply(grid);
        self.commands.push(command);
        self.cursor += 1;
        if self.commands.len() > self.capacity {
            let overflow = self.commands.len() - self.capacity;
            self.commands.drain(..overflow);
            self.cursor -= overflow;
        }
    }

    /// Records a command whose effect is already on the grid.
    pub fn record(&mut self, command: EditCommand, grid: &mut Grid) {
        // Re-applying `after` values that are already in place is a no-op.
        self.execute(command, grid);
    }

    pub fn undo(&mut self, grid: &mut Grid) -> Option<&EditCommand> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        let command = &self.commands[self.cursor];
        command.invert(grid);
        Some(command)
    }

    pub fn redo(&mut self, grid: &mut Grid) -> Option<&EditCommand> {
        let command = self.commands.get(self.cursor)?;
        command.apply(grid);
        self.cursor += 1;
        Some(command)
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.cursor = 0;
    }
}

/// A mouse-down to mouse-up drag, painted live and undone as one command.
#[derive(Debug, Clone)]
pub struct PaintStroke {
    tile_type: TileType,
    order: Vec<TilePos>,
    before: HashMap<TilePos, Tile>,
}

impl PaintStroke {
    pub fn new(tile_type: TileType) -> Self {
        Self {
            tile_type,
            order: Vec::new(),
            before: HashMap::new(),
        }
    }

    /// Paints one tile immediately. Returns `false` outside the grid.
    pub fn paint(&mut self, grid: &mut Grid, x: i32, y: i32) -> bool {
        let Some(pos) = grid.pos(x, y) else {
            return false;
        };
        let Some(current) = grid.tile(pos).copied() else {
            return false;
        };
        if !self.before.contains_key(&pos) {
            self.before.insert(pos, current);
            self.order.push(pos);
        }
        grid.put(pos, current.retyped(self.tile_type))
    }

    /// Closes the stroke; `None` when it changed nothing.
    pub fn finish(self, grid: &Grid) -> Option<EditCommand> {
        let edits: Vec<TileEdit> = self
            .order
            .into_iter()
            .filter_map(|pos| {
                let before = *self.before.get(&pos)?;
                let after = *grid.tile(pos)?;
                Some(TileEdit { pos, before, after })
            })
            .filter(|edit| !edit.is_noop())
            .collect();
        if edits.is_empty() {
            None
        } else {
            Some(EditCommand::BatchPaint(edits))
        }
    }
}
