use serde::{Deserialize, Serialize};

use crate::{Cell, Document, DocumentObserver, Result};

/// Where the caret was before and after the write that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorAnnotation {
    pub prior_x: usize,
    pub prior_y: usize,
    pub next_x: usize,
    pub next_y: usize,
}

/// The value a cell held before one write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoRecord {
    pub x: usize,
    pub y: usize,
    pub prior_cell: Cell,
    pub cursor: Option<CursorAnnotation>,
}

/// Records for one user action, in mutation order. The same cell may appear
/// more than once.
pub type UndoChunk = Vec<UndoRecord>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

#[derive(Debug, Default, Clone)]
pub struct UndoHistory {
    undo_stack: Vec<UndoChunk>,
    redo_stack: Vec<UndoChunk>,
    /// True while the top of `undo_stack` accepts new records.
    open: bool,
}

impl UndoHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Opens a new chunk. Any redo history is discarded.
    pub fn start_chunk(&mut self, observer: &mut dyn DocumentObserver) {
        self.redo_stack.clear();
        self.undo_stack.push(UndoChunk::new());
        self.open = true;
        observer.history_changed(true, false);
    }

    /// Appends a pre-image to the open chunk, opening one if needed.
    pub fn record(&mut self, x: usize, y: usize, prior_cell: Cell, cursor: Option<CursorAnnotation>) {
        if !self.open {
            self.redo_stack.clear();
            self.undo_stack.push(UndoChunk::new());
            self.open = true;
        }
        if let Some(chunk) = self.undo_stack.last_mut() {
            chunk.push(UndoRecord {
                x,
                y,
                prior_cell,
                cursor,
            });
        }
    }

    /// Reverts the most recent chunk. Returns `false` when there is nothing to undo.
    pub fn undo(&mut self, doc: &mut Document, observer: &mut dyn DocumentObserver) -> Result<bool> {
        let Some(chunk) = self.undo_stack.pop() else {
            return Ok(false);
        };
        let mirror = replay(chunk, Direction::Undo, doc, observer)?;
        self.redo_stack.push(mirror);
        self.open = false;
        observer.history_changed(self.can_undo(), true);
        Ok(true)
    }

    /// Re-applies the most recently undone chunk.
    pub fn redo(&mut self, doc: &mut Document, observer: &mut dyn DocumentObserver) -> Result<bool> {
        let Some(chunk) = self.redo_stack.pop() else {
            return Ok(false);
        };
        let mirror = replay(chunk, Direction::Redo, doc, observer)?;
        self.undo_stack.push(mirror);
        self.open = false;
        observer.history_changed(true, self.can_redo());
        Ok(true)
    }

    /// Drops all history, e.g. when the grid is replaced or resized.
    pub fn reset(&mut self, observer: &mut dyn DocumentObserver) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.open = false;
        observer.history_changed(false, false);
    }
}

/// Walks `chunk` backwards restoring each pre-image, and returns the chunk
/// that reverses the walk.
fn replay(
    chunk: UndoChunk,
    direction: Direction,
    doc: &mut Document,
    observer: &mut dyn DocumentObserver,
) -> Result<UndoChunk> {
    let mut mirror = UndoChunk::with_capacity(chunk.len());
    for record in chunk.into_iter().rev() {
        let current = doc.set(record.x, record.y, record.prior_cell)?;
        mirror.push(UndoRecord {
            prior_cell: current,
            ..record
        });
        observer.render_cell(record.x, record.y, record.prior_cell);
        observer.broadcast_cell(record.x, record.y, record.prior_cell);
        if let Some(cursor) = record.cursor {
            match direction {
                Direction::Undo => observer.cursor_moved(cursor.prior_x, cursor.prior_y),
                Direction::Redo => observer.cursor_moved(cursor.next_x, cursor.next_y),
            }
        }
    }
    Ok(mirror)
}
