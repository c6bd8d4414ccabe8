use serde::{Deserialize, Serialize};

use crate::{Cell, Document, Rect, MAX_COLUMNS, MAX_ROWS};

/// Largest side a region may have in either orientation.
const MAX_SIDE: usize = if MAX_COLUMNS > MAX_ROWS { MAX_COLUMNS } else { MAX_ROWS };

/// A rectangular copy of cells lifted out of a document, e.g. a clipboard
/// buffer or the in-flight contents of a move operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRegion {
    pub columns: usize,
    pub rows: usize,
    pub data: Vec<Cell>,
    /// Blank black cells are skipped when the region is placed.
    #[serde(default)]
    pub transparent: bool,
}

impl BlockRegion {
    pub fn new(columns: usize, rows: usize) -> Self {
        Self {
            columns,
            rows,
            data: vec![Cell::BLANK; columns * rows],
            transparent: false,
        }
    }

    pub fn at(&self, x: usize, y: usize) -> Option<Cell> {
        if x < self.columns && y < self.rows {
            self.data.get(y * self.columns + x).copied()
        } else {
            None
        }
    }

    /// Dimensions fit on a canvas and match the cell data.
    pub fn is_valid(&self) -> bool {
        self.columns <= MAX_SIDE
            && self.rows <= MAX_SIDE
            && self.columns.checked_mul(self.rows) == Some(self.data.len())
    }

    /// Mirrors every row left to right.
    pub fn flip_x(&mut self) {
        if self.columns == 0 {
            return;
        }
        for row in self.data.chunks_mut(self.columns) {
            row.reverse();
        }
    }

    /// Mirrors the row order top to bottom.
    pub fn flip_y(&mut self) {
        if self.columns == 0 {
            return;
        }
        let rows: Vec<Vec<Cell>> = self
            .data
            .chunks(self.columns)
            .rev()
            .map(|row| row.to_vec())
            .collect();
        self.data = rows.concat();
    }

    /// Rotates 90 degrees clockwise; width and height swap.
    pub fn rotate(&mut self) {
        if !self.is_valid() {
            return;
        }
        let (columns, rows) = (self.columns, self.rows);
        let mut rotated = Vec::with_capacity(self.data.len());
        for x in 0..columns {
            for y in (0..rows).rev() {
                rotated.push(self.data[y * columns + x]);
            }
        }
        self.columns = rows;
        self.rows = columns;
        self.data = rotated;
    }
}

/// Copies the inclusive rectangle `rect` out of `doc`, clamped to the grid.
pub fn get_blocks(doc: &Document, rect: Rect) -> BlockRegion {
    let dx = rect.dx.min(doc.columns() - 1);
    let dy = rect.dy.min(doc.rows() - 1);
    if rect.sx > dx || rect.sy > dy {
        return BlockRegion::new(0, 0);
    }
    let columns = dx - rect.sx + 1;
    let rows = dy - rect.sy + 1;
    let mut data = Vec::with_capacity(columns * rows);
    for y in rect.sy..=dy {
        let start = y * doc.columns() + rect.sx;
        data.extend_from_slice(&doc.cells()[start..start + columns]);
    }
    BlockRegion {
        columns,
        rows,
        data,
        transparent: false,
    }
}
