use serde::{Deserialize, Serialize};

/// Index into the document palette.
pub type ColorIndex = u8;

pub const SPACE: u8 = 32;
pub const FULL_BLOCK: u8 = 219;
pub const LOWER_HALF_BLOCK: u8 = 220;
pub const LEFT_HALF_BLOCK: u8 = 221;
pub const RIGHT_HALF_BLOCK: u8 = 222;
pub const UPPER_HALF_BLOCK: u8 = 223;

/// One grid position: a character code with foreground and background colours.
///
/// Cells are plain values; the grid replaces them wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub code: u8,
    pub fg: ColorIndex,
    pub bg: ColorIndex,
}

impl Cell {
    /// Light grey space on black.
    pub const BLANK: Cell = Cell {
        code: SPACE,
        fg: 7,
        bg: 0,
    };

    pub const fn new(code: u8, fg: ColorIndex, bg: ColorIndex) -> Self {
        Self { code, fg, bg }
    }

    pub fn is_blank(&self) -> bool {
        self.code == SPACE && self.bg == 0
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::BLANK
    }
}
