use textmode::{get_blocks, BlockRegion, Document, Point, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorMode {
    #[default]
    Editing,
    Selection,
    /// Carrying a copied block region.
    Operation,
}

/// Selection corners as the remote user dragged them, not normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionAnchor {
    pub anchor_x: usize,
    pub anchor_y: usize,
    pub drag_x: usize,
    pub drag_y: usize,
}

/// Local replica of another peer's caret, selection and floating paste buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCursor {
    pub mode: CursorMode,
    pub x: usize,
    pub y: usize,
    pub selection: SelectionAnchor,
    pub operation_buffer: Option<BlockRegion>,
    pub hidden: bool,
}

impl Default for RemoteCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteCursor {
    /// Cursors start hidden until the first positional action arrives.
    pub fn new() -> Self {
        Self {
            mode: CursorMode::Editing,
            x: 0,
            y: 0,
            selection: SelectionAnchor::default(),
            operation_buffer: None,
            hidden: true,
        }
    }

    fn move_to(&mut self, x: usize, y: usize) {
        self.x = x;
        self.y = y;
        self.hidden = false;
        if self.mode == CursorMode::Selection {
            self.selection.drag_x = x;
            self.selection.drag_y = y;
        }
    }

    pub fn cursor(&mut self, x: usize, y: usize) {
        if self.mode != CursorMode::Editing {
            self.mode = CursorMode::Editing;
            self.operation_buffer = None;
        }
        self.move_to(x, y);
    }

    /// Entering selection mode anchors at the current caret.
    pub fn selection(&mut self, x: usize, y: usize) {
        if self.mode != CursorMode::Selection {
            self.mode = CursorMode::Selection;
            self.selection = SelectionAnchor {
                anchor_x: self.x,
                anchor_y: self.y,
                drag_x: self.x,
                drag_y: self.y,
            };
        }
        self.move_to(x, y);
    }

    /// Only meaningful while selecting; ignored in other modes.
    pub fn resize_selection(&mut self, x: usize, y: usize) {
        if self.mode == CursorMode::Selection {
            self.move_to(x, y);
        }
    }

    /// Entering operation mode snapshots the selected cells from `doc`.
    /// Later moves only reposition the buffer.
    pub fn operation(&mut self, x: usize, y: usize, doc: &Document) {
        if self.mode != CursorMode::Operation {
            self.operation_buffer = Some(get_blocks(doc, self.selection_rect()));
            self.mode = CursorMode::Operation;
        }
        self.move_to(x, y);
    }

    pub fn paste_as_selection(&mut self, blocks: BlockRegion) {
        self.operation_buffer = Some(blocks);
        self.mode = CursorMode::Operation;
    }

    pub fn hide(&mut self) {
        self.hidden = true;
    }

    pub fn rotate(&mut self) -> bool {
        self.transform(BlockRegion::rotate)
    }

    pub fn flip_x(&mut self) -> bool {
        self.transform(BlockRegion::flip_x)
    }

    pub fn flip_y(&mut self) -> bool {
        self.transform(BlockRegion::flip_y)
    }

    /// Buffer transforms apply only in operation mode.
    fn transform(&mut self, apply: fn(&mut BlockRegion)) -> bool {
        match (self.mode, self.operation_buffer.as_mut()) {
            (CursorMode::Operation, Some(buffer)) => {
                apply(buffer);
                true
            }
            _ => false,
        }
    }

    /// Normalized selection rectangle, whatever direction it was dragged in.
    pub fn selection_rect(&self) -> Rect {
        Rect::from_corners(
            Point::new(self.selection.anchor_x, self.selection.anchor_y),
            Point::new(self.selection.drag_x, self.selection.drag_y),
        )
    }
}
