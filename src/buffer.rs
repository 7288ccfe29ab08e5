//! The single shared source buffer every visitor edits and runs.
//!
//! There is exactly one buffer per deployment and no locking around it. Two
//! visitors saving at once simply overwrite each other: whichever rename lands
//! last wins, with no merge and no conflict detection. A save by one visitor
//! and an execute by another may interleave in any order. Saves are atomic
//! replaces, so a reader always sees one complete version.

use crate::error::{DashboardError, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Content written when the buffer does not exist yet.
pub const PLACEHOLDER: &str = "# Edit code here\n";

#[derive(Debug, Clone)]
pub struct SharedBuffer {
    path: PathBuf,
}

impl SharedBuffer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current content. Creates the buffer with [`PLACEHOLDER`] if absent.
    pub fn load(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "Creating shared buffer");
                self.save(PLACEHOLDER)?;
                Ok(PLACEHOLDER.to_string())
            }
            Err(e) => Err(DashboardError::io(&self.path, e)),
        }
    }

    /// Replace the buffer with `content`.
    pub fn save(&self, content: &str) -> Result<()> {
        replace_file(&self.path, content.as_bytes())?;
        debug!(path = %self.path.display(), len = content.len(), "Shared buffer saved");
        Ok(())
    }
}

/// Atomically replace `path`: write a temp file beside it, then rename.
pub(crate) fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| DashboardError::io(dir, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| DashboardError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| DashboardError::io(path, e.error))?;
    Ok(())
}
