//! Runs source text as a standalone program in a fresh interpreter process.
//!
//! The executed program inherits every privilege of the hosting process,
//! including filesystem, network and environment access. Only the wall-clock
//! timeout bounds it. All executions share one scratch file: concurrent
//! runs race on it and each interpreter runs whatever content was written
//! last before it read the file. Executions are not queued and not limited
//! in number.

use crate::buffer::SharedBuffer;
use crate::config::Config;
use crate::error::{DashboardError, Result};
use crate::runner::{self, RunConfig};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    interpreter: String,
    scratch_path: PathBuf,
    timeout: Duration,
    output_limit: usize,
}

impl ExecutionEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            scratch_path: config.scratch_path.clone(),
            timeout: config.exec_timeout,
            output_limit: config.output_limit,
        }
    }

    /// Write `source` to the scratch file and run it.
    ///
    /// Errors only when the scratch file cannot be written or the interpreter
    /// cannot be started. Timeouts and non-zero exits are ordinary results.
    pub async fn execute(&self, source: &str) -> Result<ExecutionResult> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("execute", run_id = %run_id);
        async {
            let started_at = Utc::now();
            info!(len = source.len(), scratch = %self.scratch_path.display(), "Executing source");
            tokio::fs::write(&self.scratch_path, source)
                .await
                .map_err(|e| DashboardError::io(&self.scratch_path, e))?;

            let config = RunConfig {
                command: vec![
                    self.interpreter.clone(),
                    self.scratch_path.to_string_lossy().into_owned(),
                ],
                timeout: self.timeout,
                output_limit: self.output_limit,
            };
            let result = runner::run(&config).await?;

            Ok::<_, DashboardError>(ExecutionResult {
                run_id: run_id.clone(),
                started_at,
                stdout: result.stdout,
                stderr: result.stderr,
                exit_code: result.exit_code,
                signal: result.signal,
                timed_out: result.timed_out,
                stdout_truncated: result.stdout_truncated,
                stderr_truncated: result.stderr_truncated,
                duration_ms: result.duration_ms,
            })
        }
        .instrument(span)
        .await
    }

    /// Run the last saved content of `buffer`.
    pub async fn execute_saved(&self, buffer: &SharedBuffer) -> Result<ExecutionResult> {
        let buffer = buffer.clone();
        let source = tokio::task::spawn_blocking(move || buffer.load()).await??;
        self.execute(&source).await
    }
}
