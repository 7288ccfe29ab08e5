//! Error types for the dashboard.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("command `{program}` timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("package name must not be empty")]
    InvalidPackage,

    #[error("unexpected output from `{program}`: {message}")]
    Parse { program: String, message: String },

    #[error("no command given")]
    EmptyCommand,

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl DashboardError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DashboardError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for failures caused by the caller's input rather than the host.
    pub fn is_client_error(&self) -> bool {
        matches!(self, DashboardError::InvalidPackage)
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;
