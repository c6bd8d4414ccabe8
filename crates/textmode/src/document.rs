use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Cell, Result, TextmodeError};

pub const DEFAULT_COLUMNS: usize = 80;
pub const DEFAULT_ROWS: usize = 25;
pub const DEFAULT_FONT: &str = "IBM VGA";
pub const MAX_COLUMNS: usize = 2000;
pub const MAX_ROWS: usize = 10000;

/// Number of cells in a `columns` by `rows` grid, if that size is allowed.
pub fn cell_count(columns: usize, rows: usize) -> Result<usize> {
    if columns == 0 || rows == 0 || columns > MAX_COLUMNS || rows > MAX_ROWS {
        return Err(TextmodeError::InvalidSize(columns, rows));
    }
    columns
        .checked_mul(rows)
        .ok_or(TextmodeError::InvalidSize(columns, rows))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// The sixteen-colour CGA palette.
pub fn default_palette() -> Vec<Rgb> {
    vec![
        Rgb::new(0, 0, 0),
        Rgb::new(0, 0, 170),
        Rgb::new(0, 170, 0),
        Rgb::new(0, 170, 170),
        Rgb::new(170, 0, 0),
        Rgb::new(170, 0, 170),
        Rgb::new(170, 85, 0),
        Rgb::new(170, 170, 170),
        Rgb::new(85, 85, 85),
        Rgb::new(85, 85, 255),
        Rgb::new(85, 255, 85),
        Rgb::new(85, 255, 255),
        Rgb::new(255, 85, 85),
        Rgb::new(255, 85, 255),
        Rgb::new(255, 255, 85),
        Rgb::new(255, 255, 255),
    ]
}

/// The shared grid plus its metadata.
///
/// `cells` is row-major and always holds exactly `columns * rows` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    columns: usize,
    rows: usize,
    cells: Vec<Cell>,
    pub title: String,
    pub author: String,
    pub group: String,
    pub date: NaiveDate,
    pub comments: Vec<String>,
    pub palette: Vec<Rgb>,
    pub font_name: String,
    pub use_9px_font: bool,
    pub ice_colors: bool,
}

impl Document {
    pub fn new(columns: usize, rows: usize) -> Result<Self> {
        cell_count(columns, rows)?;
        Ok(Self::blank(columns, rows))
    }

    fn blank(columns: usize, rows: usize) -> Self {
        Self {
            columns,
            rows,
            cells: vec![Cell::BLANK; columns * rows],
            title: String::new(),
            author: String::new(),
            group: String::new(),
            date: chrono::Local::now().date_naive(),
            comments: Vec::new(),
            palette: default_palette(),
            font_name: DEFAULT_FONT.to_string(),
            use_9px_font: false,
            ice_colors: false,
        }
    }

    /// Assembles a document from raw parts, checking the size invariant.
    pub fn from_cells(columns: usize, rows: usize, cells: Vec<Cell>) -> Result<Self> {
        let expected = cell_count(columns, rows)?;
        if cells.len() != expected {
            return Err(TextmodeError::Corrupt(format!(
                "expected {} cells, found {}",
                expected,
                cells.len()
            )));
        }
        let mut doc = Self::blank(columns, rows);
        doc.cells = cells;
        Ok(doc)
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x < self.columns && y < self.rows
    }

    pub fn index_of(&self, x: usize, y: usize) -> Result<usize> {
        if self.contains(x, y) {
            Ok(y * self.columns + x)
        } else {
            Err(TextmodeError::OutOfBounds {
                x,
                y,
                columns: self.columns,
                rows: self.rows,
            })
        }
    }

    pub fn at(&self, x: usize, y: usize) -> Result<Cell> {
        let index = self.index_of(x, y)?;
        Ok(self.cells[index])
    }

    /// Replaces one cell and returns the value it held.
    pub fn set(&mut self, x: usize, y: usize, cell: Cell) -> Result<Cell> {
        let index = self.index_of(x, y)?;
        Ok(std::mem::replace(&mut self.cells[index], cell))
    }

    /// Rebuilds the grid at a new size, keeping the overlapping top-left region.
    pub fn resize(&mut self, columns: usize, rows: usize) -> Result<()> {
        let mut cells = vec![Cell::BLANK; cell_count(columns, rows)?];
        for y in 0..rows.min(self.rows) {
            for x in 0..columns.min(self.columns) {
                cells[y * columns + x] = self.cells[y * self.columns + x];
            }
        }
        self.columns = columns;
        self.rows = rows;
        self.cells = cells;
        Ok(())
    }

    /// Checks the size invariant, used after deserializing untrusted input.
    pub fn validate(&self) -> Result<()> {
        let expected = cell_count(self.columns, self.rows)?;
        if self.cells.len() != expected {
            return Err(TextmodeError::Corrupt(format!(
                "expected {} cells, found {}",
                expected,
                self.cells.len()
            )));
        }
        Ok(())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::blank(DEFAULT_COLUMNS, DEFAULT_ROWS)
    }
}
