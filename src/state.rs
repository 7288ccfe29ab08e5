//! Shared application state.

use crate::buffer::SharedBuffer;
use crate::config::Config;
use crate::counter::VisitorCounter;
use crate::engine::ExecutionEngine;
use crate::packages::PackageManager;
use std::sync::Arc;

/// Everything a request handler needs. Cheap to clone; holds no locks,
/// since none of the shared files are synchronized.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub buffer: SharedBuffer,
    pub counter: VisitorCounter,
    pub engine: ExecutionEngine,
    pub packages: PackageManager,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            buffer: SharedBuffer::new(&config.buffer_path),
            counter: VisitorCounter::new(&config.counter_path),
            engine: ExecutionEngine::new(&config),
            packages: PackageManager::new(&config),
            config: Arc::new(config),
        }
    }
}
