use crate::{
    BlockRegion, Cell, ColorIndex, CursorAnnotation, Document, Rect, Result, UndoHistory,
    FULL_BLOCK, LEFT_HALF_BLOCK, LOWER_HALF_BLOCK, RIGHT_HALF_BLOCK, SPACE, UPPER_HALF_BLOCK,
};

/// Side effects of document mutation. Every method defaults to a no-op.
pub trait DocumentObserver {
    /// Redraw one cell.
    fn render_cell(&mut self, _x: usize, _y: usize, _cell: Cell) {}

    /// Propagate a local write to other peers.
    fn broadcast_cell(&mut self, _x: usize, _y: usize, _cell: Cell) {}

    /// Undo or redo wants the caret at this position.
    fn cursor_moved(&mut self, _x: usize, _y: usize) {}

    fn history_changed(&mut self, _can_undo: bool, _can_redo: bool) {}

    /// The first edit since the document was loaded or saved.
    fn document_modified(&mut self) {}
}

impl DocumentObserver for () {}

/// How a cell splits into two half-height (or half-width) pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalfBlock {
    pub x: usize,
    pub y: usize,
    pub text_y: usize,
    pub is_top: bool,
    pub is_blocky: bool,
    pub is_vertically_blocky: bool,
    pub upper_block_color: ColorIndex,
    pub lower_block_color: ColorIndex,
    pub left_block_color: ColorIndex,
    pub right_block_color: ColorIndex,
    pub fg: ColorIndex,
    pub bg: ColorIndex,
}

/// Owns the local document and its undo history. All local mutation goes
/// through here so the undo record, the write, the render and the broadcast
/// happen together.
#[derive(Debug, Clone, Default)]
pub struct Editor {
    document: Document,
    history: UndoHistory,
    collaborative: bool,
    modified: bool,
}

impl Editor {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            history: UndoHistory::new(),
            collaborative: false,
            modified: false,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn history(&self) -> &UndoHistory {
        &self.history
    }

    pub fn at(&self, x: usize, y: usize) -> Result<Cell> {
        self.document.at(x, y)
    }

    /// In a shared session edits are never flagged as unsaved local changes.
    pub fn set_collaborative(&mut self, collaborative: bool) {
        self.collaborative = collaborative;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn mark_saved(&mut self) {
        self.modified = false;
    }

    /// Replaces the whole document; old history no longer applies.
    pub fn load(&mut self, document: Document, observer: &mut dyn DocumentObserver) {
        self.document = document;
        self.modified = false;
        self.history.reset(observer);
    }

    pub fn start_undo(&mut self, observer: &mut dyn DocumentObserver) {
        self.history.start_chunk(observer);
        if !self.collaborative && !self.modified {
            self.modified = true;
            observer.document_modified();
        }
    }

    pub fn undo(&mut self, observer: &mut dyn DocumentObserver) -> Result<bool> {
        self.history.undo(&mut self.document, observer)
    }

    pub fn redo(&mut self, observer: &mut dyn DocumentObserver) -> Result<bool> {
        self.history.redo(&mut self.document, observer)
    }

    /// Writes one cell, recording its pre-image in the open undo chunk.
    pub fn change_data(
        &mut self,
        x: usize,
        y: usize,
        cell: Cell,
        cursor: Option<CursorAnnotation>,
        observer: &mut dyn DocumentObserver,
    ) -> Result<()> {
        let prior = self.document.at(x, y)?;
        if !self.history.is_open() {
            self.start_undo(observer);
        }
        self.history.record(x, y, prior, cursor);
        self.document.set(x, y, cell)?;
        observer.render_cell(x, y, cell);
        observer.broadcast_cell(x, y, cell);
        Ok(())
    }

    pub fn clear_at(
        &mut self,
        x: usize,
        y: usize,
        cursor: Option<CursorAnnotation>,
        observer: &mut dyn DocumentObserver,
    ) -> Result<()> {
        self.change_data(x, y, Cell::BLANK, cursor, observer)
    }

    /// Applies a write that arrived from another peer: no history, no echo.
    pub fn apply_remote_draw(
        &mut self,
        x: usize,
        y: usize,
        cell: Cell,
        observer: &mut dyn DocumentObserver,
    ) -> Result<()> {
        self.document.set(x, y, cell)?;
        observer.render_cell(x, y, cell);
        Ok(())
    }

    pub fn fill_with_code(
        &mut self,
        rect: Rect,
        cell: Cell,
        observer: &mut dyn DocumentObserver,
    ) -> Result<()> {
        self.start_undo(observer);
        for y in rect.sy..=rect.dy {
            for x in rect.sx..=rect.dx {
                self.change_data(x, y, cell, None, observer)?;
            }
        }
        Ok(())
    }

    pub fn erase(&mut self, rect: Rect, observer: &mut dyn DocumentObserver) -> Result<()> {
        self.fill_with_code(rect, Cell::BLANK, observer)
    }

    /// Colour 0 erases; anything else paints full blocks.
    pub fn fill(
        &mut self,
        rect: Rect,
        color: ColorIndex,
        observer: &mut dyn DocumentObserver,
    ) -> Result<()> {
        if color == 0 {
            self.erase(rect, observer)
        } else {
            self.fill_with_code(rect, Cell::new(FULL_BLOCK, color, 0), observer)
        }
    }

    /// Stamps `blocks` with its top-left corner at `(dx, dy)`, clipped to the grid.
    pub fn place(
        &mut self,
        blocks: &BlockRegion,
        dx: usize,
        dy: usize,
        single_undo: bool,
        observer: &mut dyn DocumentObserver,
    ) -> Result<()> {
        if !single_undo {
            self.start_undo(observer);
        }
        let rows = blocks.rows.min(self.document.rows().saturating_sub(dy));
        let columns = blocks.columns.min(self.document.columns().saturating_sub(dx));
        for y in 0..rows {
            for x in 0..columns {
                let Some(cell) = blocks.at(x, y) else {
                    continue;
                };
                if !blocks.transparent || !cell.is_blank() {
                    self.change_data(dx + x, dy + y, cell, None, observer)?;
                }
            }
        }
        Ok(())
    }

    pub fn resize(
        &mut self,
        columns: usize,
        rows: usize,
        observer: &mut dyn DocumentObserver,
    ) -> Result<()> {
        self.document.resize(columns, rows)?;
        self.history.reset(observer);
        Ok(())
    }

    pub fn set_sauce(&mut self, title: String, author: String, group: String, comments: Vec<String>) {
        self.document.title = title;
        self.document.author = author;
        self.document.group = group;
        self.document.comments = comments;
    }

    pub fn set_ice_colors(&mut self, value: bool) {
        self.document.ice_colors = value;
    }

    pub fn set_use_9px_font(&mut self, value: bool) {
        self.document.use_9px_font = value;
    }

    pub fn set_font_name(&mut self, font_name: String) {
        self.document.font_name = font_name;
    }

    /// Classifies the cell under half-row `half_y` for half-block painting.
    pub fn get_half_block(&self, x: usize, half_y: usize) -> Result<HalfBlock> {
        let text_y = half_y / 2;
        let cell = self.document.at(x, text_y)?;
        let mut block = HalfBlock {
            x,
            y: half_y,
            text_y,
            is_top: half_y % 2 == 0,
            is_blocky: false,
            is_vertically_blocky: false,
            upper_block_color: 0,
            lower_block_color: 0,
            left_block_color: 0,
            right_block_color: 0,
            fg: cell.fg,
            bg: cell.bg,
        };
        match cell.code {
            0 | SPACE | 255 => {
                block.upper_block_color = cell.bg;
                block.lower_block_color = cell.bg;
                block.is_blocky = true;
            }
            LOWER_HALF_BLOCK => {
                block.upper_block_color = cell.bg;
                block.lower_block_color = cell.fg;
                block.is_blocky = true;
            }
            UPPER_HALF_BLOCK => {
                block.upper_block_color = cell.fg;
                block.lower_block_color = cell.bg;
                block.is_blocky = true;
            }
            FULL_BLOCK => {
                block.upper_block_color = cell.fg;
                block.lower_block_color = cell.fg;
                block.is_blocky = true;
            }
            LEFT_HALF_BLOCK => {
                block.left_block_color = cell.fg;
                block.right_block_color = cell.bg;
                block.is_vertically_blocky = true;
            }
            RIGHT_HALF_BLOCK => {
                block.left_block_color = cell.bg;
                block.right_block_color = cell.fg;
                block.is_vertically_blocky = true;
            }
            _ if cell.fg == cell.bg => {
                block.upper_block_color = cell.fg;
                block.lower_block_color = cell.fg;
                block.is_blocky = true;
            }
            _ => {}
        }
        Ok(block)
    }

    /// Paints the upper or lower half of a cell with `color`.
    pub fn set_half_block(
        &mut self,
        x: usize,
        half_y: usize,
        color: ColorIndex,
        observer: &mut dyn DocumentObserver,
    ) -> Result<()> {
        let block = self.get_half_block(x, half_y)?;
        let y = block.text_y;
        let cell = if block.is_blocky {
            let other_half = if block.is_top {
                block.lower_block_color
            } else {
                block.upper_block_color
            };
            if other_half == color {
                Cell::new(FULL_BLOCK, color, 0)
            } else if block.is_top {
                Cell::new(UPPER_HALF_BLOCK, color, block.lower_block_color)
            } else {
                Cell::new(LOWER_HALF_BLOCK, color, block.upper_block_color)
            }
        } else if block.is_top {
            Cell::new(UPPER_HALF_BLOCK, color, block.bg)
        } else {
            Cell::new(LOWER_HALF_BLOCK, color, block.bg)
        };
        self.change_data(x, y, cell, None, observer)?;
        self.send_black_to_back(x, y, observer)
    }

    /// Keeps black in the background where the glyph allows swapping it.
    pub fn send_black_to_back(
        &mut self,
        x: usize,
        y: usize,
        observer: &mut dyn DocumentObserver,
    ) -> Result<()> {
        let cell = self.document.at(x, y)?;
        if cell.fg != 0 {
            return Ok(());
        }
        if cell.bg == 0 || cell.code == FULL_BLOCK {
            self.change_data(x, y, Cell::BLANK, None, observer)
        } else {
            match cell.code {
                LOWER_HALF_BLOCK => self.change_data(
                    x,
                    y,
                    Cell::new(UPPER_HALF_BLOCK, cell.bg, cell.fg),
                    None,
                    observer,
                ),
                UPPER_HALF_BLOCK => self.change_data(
                    x,
                    y,
                    Cell::new(LOWER_HALF_BLOCK, cell.bg, cell.fg),
                    None,
                    observer,
                ),
                _ => Ok(()),
            }
        }
    }

    fn is_empty_at(&self, x: usize, y: usize) -> Result<bool> {
        let half = self.get_half_block(x, y * 2)?;
        Ok(half.is_blocky && half.upper_block_color == 0 && half.lower_block_color == 0)
    }

    /// Number of blank cells at the start of row `y`; zero for an empty row.
    pub fn count_left(&self, y: usize) -> Result<usize> {
        for x in 0..self.document.columns() {
            if !self.is_empty_at(x, y)? {
                return Ok(x);
            }
        }
        Ok(0)
    }

    /// Number of blank cells at the end of row `y`; zero for an empty row.
    pub fn count_right(&self, y: usize) -> Result<usize> {
        let columns = self.document.columns();
        for x in 0..columns {
            if !self.is_empty_at(columns - 1 - x, y)? {
                return Ok(x);
            }
        }
        Ok(0)
    }

    pub fn left_justify_line(&mut self, y: usize, observer: &mut dyn DocumentObserver) -> Result<()> {
        let count = self.count_left(y)?;
        if count == 0 {
            return Ok(());
        }
        let columns = self.document.columns();
        self.start_undo(observer);
        for x in 0..columns - count {
            let cell = self.document.at(x + count, y)?;
            self.change_data(x, y, cell, None, observer)?;
        }
        for x in columns - count..columns {
            self.change_data(x, y, Cell::BLANK, None, observer)?;
        }
        Ok(())
    }

    pub fn right_justify_line(&mut self, y: usize, observer: &mut dyn DocumentObserver) -> Result<()> {
        let count = self.count_right(y)?;
        if count == 0 {
            return Ok(());
        }
        let columns = self.document.columns();
        self.start_undo(observer);
        for x in (count..columns).rev() {
            let cell = self.document.at(x - count, y)?;
            self.change_data(x, y, cell, None, observer)?;
        }
        for x in (0..count).rev() {
            self.change_data(x, y, Cell::BLANK, None, observer)?;
        }
        Ok(())
    }

    pub fn center_line(&mut self, y: usize, observer: &mut dyn DocumentObserver) -> Result<()> {
        let left = self.count_left(y)?;
        let right = self.count_right(y)?;
        if left == 0 && right == 0 {
            return Ok(());
        }
        let columns = self.document.columns();
        let width = columns.saturating_sub(left + right);
        let start = self.document.index_of(left, y)?;
        let content: Vec<Cell> = self.document.cells()[start..start + width].to_vec();
        let new_left = (left + right) / 2;

        self.start_undo(observer);
        for x in 0..new_left {
            self.change_data(x, y, Cell::BLANK, None, observer)?;
        }
        for (i, cell) in content.into_iter().enumerate() {
            self.change_data(new_left + i, y, cell, None, observer)?;
        }
        for x in new_left + width..columns {
            self.change_data(x, y, Cell::BLANK, None, observer)?;
        }
        Ok(())
    }
}
