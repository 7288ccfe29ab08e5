//! Package installation into the shared runtime, and the installed listing.
//!
//! An install mutates the one process-wide environment every later execution
//! sees. There is no rollback: a failed or timed-out install leaves the
//! environment in whatever state the package manager reached. The package
//! name is passed through untouched, so whatever the package manager accepts
//! as an argument (including flags) is accepted here too.

use crate::config::Config;
use crate::error::{DashboardError, Result};
use crate::runner::{self, RunConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};

/// Budget for the listing command.
const LIST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize)]
pub struct InstallResult {
    pub run_id: String,
    pub package: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
}

/// Snapshot of the installed packages, in the order the lister reported them.
#[derive(Debug, Clone, Default)]
pub struct InstalledPackages {
    packages: Vec<Package>,
}

/// The capped view rendered to visitors.
#[derive(Debug, Clone, Serialize)]
pub struct PackageListing {
    pub packages: Vec<Package>,
    pub total: usize,
    pub truncated: bool,
}

impl InstalledPackages {
    pub fn new(packages: Vec<Package>) -> Self {
        Self { packages }
    }

    /// A fresh iterator over the snapshot; may be called any number of times.
    pub fn iter(&self) -> impl Iterator<Item = &Package> + '_ {
        self.packages.iter()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.iter().any(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// First `cap` packages plus a marker telling whether more exist.
    pub fn display(&self, cap: usize) -> PackageListing {
        PackageListing {
            packages: self.iter().take(cap).cloned().collect(),
            total: self.len(),
            truncated: self.len() > cap,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PackageManager {
    install_command: Vec<String>,
    list_command: Vec<String>,
    install_timeout: Duration,
    output_limit: usize,
}

impl PackageManager {
    pub fn new(config: &Config) -> Self {
        Self {
            install_command: config.install_command.clone(),
            list_command: config.list_command.clone(),
            install_timeout: config.install_timeout,
            output_limit: config.output_limit,
        }
    }

    /// Install `package` into the shared environment.
    ///
    /// Success means the package manager exited with zero in time. Whether the
    /// package is importable afterwards is not checked.
    pub async fn install(&self, package: &str) -> Result<InstallResult> {
        let package = package.trim();
        if package.is_empty() {
            return Err(DashboardError::InvalidPackage);
        }
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("install", run_id = %run_id, package);
        async {
            let mut command = self.install_command.clone();
            command.push(package.to_string());
            let config = RunConfig {
                command,
                timeout: self.install_timeout,
                output_limit: self.output_limit,
            };
            let result = runner::run(&config).await?;
            let success = result.success();
            if success {
                info!("Package installed");
            } else {
                warn!(exit_code = ?result.exit_code, timed_out = result.timed_out, "Package install failed");
            }

            Ok::<_, DashboardError>(InstallResult {
                run_id: run_id.clone(),
                package: package.to_string(),
                stdout: result.stdout,
                stderr: result.stderr,
                exit_code: result.exit_code,
                timed_out: result.timed_out,
                stdout_truncated: result.stdout_truncated,
                stderr_truncated: result.stderr_truncated,
                success,
            })
        }
        .instrument(span)
        .await
    }

    /// Query the environment for its installed packages.
    pub async fn list_installed(&self) -> Result<InstalledPackages> {
        let program = self.list_command.first().cloned().unwrap_or_default();
        let config = RunConfig {
            command: self.list_command.clone(),
            timeout: LIST_TIMEOUT,
            // Listing output is parsed, so it must not be cut
            output_limit: usize::MAX / 4,
        };
        let result = runner::run_to_completion(&config).await?;
        if result.exit_code != Some(0) {
            return Err(DashboardError::Parse {
                program,
                message: format!(
                    "exited with {:?}: {}",
                    result.exit_code,
                    result.stderr.trim()
                ),
            });
        }
        parse_listing(&program, &result.stdout)
    }
}

fn parse_listing(program: &str, stdout: &str) -> Result<InstalledPackages> {
    let packages: Vec<Package> =
        serde_json::from_str(stdout.trim()).map_err(|e| DashboardError::Parse {
            program: program.to_string(),
            message: e.to_string(),
        })?;
    Ok(InstalledPackages::new(packages))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(n: usize) -> InstalledPackages {
        InstalledPackages::new(
            (0..n)
                .map(|i| Package {
                    name: format!("pkg{i}"),
                    version: "1.0".to_string(),
                })
                .collect(),
        )
    }

    #[test]
    fn test_parse_pip_json() {
        let out = r#"[{"name": "numpy", "version": "1.26.4"}, {"name": "requests", "version": "2.31.0", "editable_project_location": "/src"}]"#;
        let installed = parse_listing("pip", out).unwrap();
        assert_eq!(installed.len(), 2);
        assert!(installed.contains("NumPy"));
        assert_eq!(installed.iter().nth(1).unwrap().version, "2.31.0");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_listing("pip", "WARNING: not json").unwrap_err();
        assert!(matches!(err, DashboardError::Parse { .. }));
    }

    #[test]
    fn test_display_caps_and_marks_truncation() {
        let listing = sample(51).display(50);
        assert_eq!(listing.packages.len(), 50);
        assert_eq!(listing.total, 51);
        assert!(listing.truncated);

        let listing = sample(50).display(50);
        assert_eq!(listing.packages.len(), 50);
        assert!(!listing.truncated);
    }

    #[test]
    fn test_iteration_is_restartable() {
        let installed = sample(3);
        let first: Vec<_> = installed.iter().map(|p| p.name.clone()).collect();
        let second: Vec<_> = installed.iter().map(|p| p.name.clone()).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec!["pkg0", "pkg1", "pkg2"]);
    }

    #[tokio::test]
    async fn test_blank_package_name_is_rejected() {
        let manager = PackageManager::new(&Config::default());
        let err = manager.install("   ").await.unwrap_err();
        assert!(matches!(err, DashboardError::InvalidPackage));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_install_appends_name_as_last_argument() {
        let mut config = Config::default();
        config.install_command = vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "echo installing $0; exit 1".to_string(),
        ];
        let manager = PackageManager::new(&config);
        let result = manager.install("left-pad").await.unwrap();
        assert_eq!(result.stdout, "installing left-pad\n");
        assert_eq!(result.exit_code, Some(1));
        assert!(!result.success);
        assert!(!result.stdout_truncated);
    }

    #[tokio::test]
    async fn test_long_install_output_is_flagged() {
        let mut config = Config::default();
        config.output_limit = 10;
        config.install_command = vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "echo 'Collecting a very long package name'".to_string(),
        ];
        let manager = PackageManager::new(&config);
        let result = manager.install("pkg").await.unwrap();
        assert_eq!(result.stdout, "Collecting");
        assert!(result.stdout_truncated);
        assert!(!result.stderr_truncated);
        assert!(result.success);
    }
}
