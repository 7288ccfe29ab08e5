//! File-backed visitor counter.
//!
//! Like the shared buffer this is unsynchronized: two first visits landing
//! together may both read N and both write N + 1.

use crate::buffer::replace_file;
use crate::error::{DashboardError, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct VisitorCounter {
    path: PathBuf,
}

impl VisitorCounter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored count; a missing or unreadable number counts as zero.
    pub fn current(&self) -> Result<u64> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text.trim().parse().unwrap_or_else(|_| {
                warn!(path = %self.path.display(), "Visitor count is not a number, restarting at 0");
                0
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(DashboardError::io(&self.path, e)),
        }
    }

    /// Count one new visitor and return the new total.
    pub fn record_visit(&self) -> Result<u64> {
        let count = self.current()? + 1;
        replace_file(&self.path, count.to_string().as_bytes())?;
        Ok(count)
    }
}
