use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Cell, Document, Result, Rgb, TextmodeError};

/// A run of identical cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRun {
    pub count: usize,
    pub cell: Cell,
}

/// Wire form of a document, cells run-length encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedDocument {
    pub columns: usize,
    pub rows: usize,
    pub runs: Vec<CellRun>,
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

pub fn compress(doc: &Document) -> CompressedDocument {
    let mut runs: Vec<CellRun> = Vec::new();
    for cell in doc.cells() {
        match runs.last_mut() {
            Some(run) if run.cell == *cell => run.count += 1,
            _ => runs.push(CellRun {
                count: 1,
                cell: *cell,
            }),
        }
    }
    CompressedDocument {
        columns: doc.columns(),
        rows: doc.rows(),
        runs,
        title: doc.title.clone(),
        author: doc.author.clone(),
        group: doc.group.clone(),
        date: doc.date,
        comments: doc.comments.clone(),
        palette: doc.palette.clone(),
        font_name: doc.font_name.clone(),
        use_9px_font: doc.use_9px_font,
        ice_colors: doc.ice_colors,
    }
}

/// Expands a compressed document; the runs must cover exactly `columns * rows` cells.
pub fn uncompress(compressed: CompressedDocument) -> Result<Document> {
    let expected = compressed
        .columns
        .checked_mul(compressed.rows)
        .ok_or(TextmodeError::InvalidSize(compressed.columns, compressed.rows))?;
    let total = compressed
        .runs
        .iter()
        .try_fold(0usize, |acc, run| acc.checked_add(run.count));
    if total != Some(expected) {
        return Err(TextmodeError::Corrupt(format!(
            "runs do not cover a {}x{} canvas",
            compressed.columns, compressed.rows
        )));
    }

    let mut cells = Vec::with_capacity(expected);
    for run in &compressed.runs {
        cells.extend(std::iter::repeat(run.cell).take(run.count));
    }

    let mut doc = Document::from_cells(compressed.columns, compressed.rows, cells)?;
    doc.title = compressed.title;
    doc.author = compressed.author;
    doc.group = compressed.group;
    doc.date = compressed.date;
    doc.comments = compressed.comments;
    doc.palette = compressed.palette;
    doc.font_name = compressed.font_name;
    doc.use_9px_font = compressed.use_9px_font;
    doc.ice_colors = compressed.ice_colors;
    Ok(doc)
}
