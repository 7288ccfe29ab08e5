//! Codeboard - a shared multi-visitor code dashboard.
//!
//! All visitors share one code buffer, one scratch file and one package
//! environment. Nothing is isolated or locked between them, and executed
//! code runs with the privileges of the hosting process. See each module
//! for the concurrency rules of the state it owns.

pub mod buffer;
pub mod config;
pub mod counter;
pub mod engine;
pub mod error;
pub mod http_server;
pub mod packages;
pub mod page;
pub mod runner;
pub mod state;
pub mod telemetry;

pub use buffer::SharedBuffer;
pub use config::Config;
pub use engine::{ExecutionEngine, ExecutionResult};
pub use error::{DashboardError, Result};
pub use packages::{InstallResult, InstalledPackages, PackageManager};
pub use state::AppState;
