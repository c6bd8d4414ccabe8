use std::fs;
use std::path::Path;

use tracing::debug;

use crate::{Document, Result, TextmodeError};

/// Loads a document saved by [`write_file`].
pub fn read_file(path: impl AsRef<Path>) -> Result<Document> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let doc: Document = serde_json::from_slice(&bytes)?;
    doc.validate()?;
    debug!(
        "Loaded {}x{} document from {}",
        doc.columns(),
        doc.rows(),
        path.display()
    );
    Ok(doc)
}

/// Saves a document. The file is written next to its destination and renamed
/// into place, so readers never observe a partial file.
pub fn write_file(doc: &Document, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .ok_or_else(|| TextmodeError::Corrupt(format!("not a file path: {}", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let json = serde_json::to_vec(doc)?;
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)?;
    debug!("Saved document to {}", path.display());
    Ok(())
}
