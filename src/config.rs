//! Runtime configuration shared by every component.

use std::path::PathBuf;
use std::time::Duration;

/// Wall-clock budget for one execution, in seconds.
pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 20;
/// Wall-clock budget for one package installation, in seconds.
pub const DEFAULT_INSTALL_TIMEOUT_SECS: u64 = 60;
/// Per-stream character budget for captured output.
pub const DEFAULT_OUTPUT_LIMIT: usize = 20_000;
/// Number of installed packages shown before the listing is cut off.
pub const DEFAULT_PACKAGE_DISPLAY_LIMIT: usize = 50;

/// Packages offered as one-click suggestions in the installer form.
pub const POPULAR_PACKAGES: &[&str] = &[
    "psutil",
    "numpy",
    "pandas",
    "matplotlib",
    "streamlit",
    "scipy",
    "requests",
    "GPUtil",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub buffer_path: PathBuf,
    pub scratch_path: PathBuf,
    pub counter_path: PathBuf,
    /// Program that interprets the scratch file.
    pub interpreter: String,
    /// Install command; the package name is appended as the last argument.
    pub install_command: Vec<String>,
    /// Command printing installed packages as a JSON array of `{name, version}`.
    pub list_command: Vec<String>,
    pub exec_timeout: Duration,
    pub install_timeout: Duration,
    pub output_limit: usize,
    pub package_display_limit: usize,
}

impl Config {
    /// Builds the pip-based install and list commands for `interpreter`.
    pub fn with_interpreter(interpreter: impl Into<String>) -> Self {
        let interpreter = interpreter.into();
        Self {
            install_command: vec![
                interpreter.clone(),
                "-m".to_string(),
                "pip".to_string(),
                "install".to_string(),
            ],
            list_command: vec![
                interpreter.clone(),
                "-m".to_string(),
                "pip".to_string(),
                "list".to_string(),
                "--format=json".to_string(),
            ],
            interpreter,
            ..Self::default()
        }
    }

    /// Every file lives in `dir`; handy for tests and throwaway deployments.
    pub fn in_dir(mut self, dir: &std::path::Path) -> Self {
        self.buffer_path = dir.join("shared_code.py");
        self.scratch_path = dir.join("run_code.py");
        self.counter_path = dir.join("visitor_count.txt");
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_path: PathBuf::from("/tmp/shared_code.py"),
            scratch_path: PathBuf::from("/tmp/run_code.py"),
            counter_path: PathBuf::from("/tmp/visitor_count.txt"),
            interpreter: "python3".to_string(),
            install_command: ["python3", "-m", "pip", "install"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            list_command: ["python3", "-m", "pip", "list", "--format=json"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exec_timeout: Duration::from_secs(DEFAULT_EXEC_TIMEOUT_SECS),
            install_timeout: Duration::from_secs(DEFAULT_INSTALL_TIMEOUT_SECS),
            output_limit: DEFAULT_OUTPUT_LIMIT,
            package_display_limit: DEFAULT_PACKAGE_DISPLAY_LIMIT,
        }
    }
}
