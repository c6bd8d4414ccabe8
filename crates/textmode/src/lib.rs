use serde::{Deserialize, Serialize};
use thiserror::Error;

mod cell;
pub use cell::*;
mod document;
pub use document::*;
mod blocks;
pub use blocks::*;
mod compress;
pub use compress::*;
mod history;
pub use history::*;
mod editor;
pub use editor::*;
mod io;
pub use io::*;

#[derive(Debug, Error)]
pub enum TextmodeError {
    #[error("position out of bounds: ({x}, {y}) on a {columns}x{rows} canvas")]
    OutOfBounds {
        x: usize,
        y: usize,
        columns: usize,
        rows: usize,
    },
    #[error("invalid canvas size: {0}x{1}")]
    InvalidSize(usize, usize),
    #[error("corrupt document: {0}")]
    Corrupt(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TextmodeError>;

/// A grid coordinate, column first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: usize,
    pub y: usize,
}

impl Point {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// An inclusive, normalized rectangle: `sx <= dx` and `sy <= dy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub sx: usize,
    pub sy: usize,
    pub dx: usize,
    pub dy: usize,
}

impl Rect {
    /// Builds the rectangle spanned by two corners in any order.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            sx: a.x.min(b.x),
            sy: a.y.min(b.y),
            dx: a.x.max(b.x),
            dy: a.y.max(b.y),
        }
    }

    pub fn width(&self) -> usize {
        self.dx - self.sx + 1
    }

    pub fn height(&self) -> usize {
        self.dy - self.sy + 1
    }
}
