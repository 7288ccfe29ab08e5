//! Host telemetry snapshot: platform, CPU, memory, disks and GPUs.

use crate::runner::{self, RunConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use sysinfo::{Disks, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tracing::{debug, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_OUTPUT_LIMIT: usize = 4096;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub os: String,
    pub kernel: String,
    pub arch: String,
    pub hostname: String,
    /// `None` when the interpreter could not report its version.
    pub runtime_version: Option<String>,
    pub cpu_per_core: Vec<f32>,
    pub cpu_average: f32,
    pub memory: MemoryUsage,
    pub disks: Vec<DiskUsage>,
    pub gpus: Vec<GpuUsage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub used: u64,
    pub total: u64,
    pub usage_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskUsage {
    pub device: String,
    pub mount_point: String,
    pub used: u64,
    pub total: u64,
    pub usage_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuUsage {
    pub name: String,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub load_percent: f64,
}

/// Bytes to GiB, rounded to two decimals.
pub fn gib(bytes: u64) -> f64 {
    (bytes as f64 / 1024f64.powi(3) * 100.0).round() / 100.0
}

fn percent(used: u64, total: u64) -> f64 {
    if total > 0 {
        (used as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

/// Take a snapshot. Never fails: anything that cannot be read stays empty.
pub async fn snapshot(interpreter: &str) -> TelemetrySnapshot {
    let host = match tokio::task::spawn_blocking(read_host).await {
        Ok(host) => host,
        Err(e) => {
            warn!(error = %e, "Host stats task failed");
            TelemetrySnapshot::default()
        }
    };
    let (runtime_version, gpus) = tokio::join!(runtime_version(interpreter), read_gpus());
    TelemetrySnapshot {
        runtime_version,
        gpus,
        ..host
    }
}

fn read_host() -> TelemetrySnapshot {
    let mut sys = System::new();
    sys.refresh_cpu();
    // Usage is a delta between two refreshes
    std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu();
    sys.refresh_memory();

    let cpu_per_core = sys.cpus().iter().map(|cpu| cpu.cpu_usage()).collect();
    let cpu_average = sys.global_cpu_info().cpu_usage();

    let used = sys.used_memory();
    let total = sys.total_memory();

    let disks = Disks::new_with_refreshed_list()
        .iter()
        .map(|disk| {
            let total = disk.total_space();
            let used = total.saturating_sub(disk.available_space());
            DiskUsage {
                device: disk.name().to_string_lossy().to_string(),
                mount_point: disk.mount_point().to_string_lossy().to_string(),
                used,
                total,
                usage_percent: percent(used, total),
            }
        })
        .collect();

    TelemetrySnapshot {
        os: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
        kernel: System::kernel_version().unwrap_or_default(),
        arch: std::env::consts::ARCH.to_string(),
        hostname: System::host_name().unwrap_or_default(),
        runtime_version: None,
        cpu_per_core,
        cpu_average,
        memory: MemoryUsage {
            used,
            total,
            usage_percent: percent(used, total),
        },
        disks,
        gpus: Vec::new(),
    }
}

async fn probe(command: &[&str]) -> Option<String> {
    let config = RunConfig {
        command: command.iter().map(|s| s.to_string()).collect(),
        timeout: PROBE_TIMEOUT,
        output_limit: PROBE_OUTPUT_LIMIT,
    };
    match runner::run_to_completion(&config).await {
        Ok(result) if result.success() => Some(result.stdout),
        Ok(result) => {
            debug!(command = ?command, exit_code = ?result.exit_code, "Probe failed");
            None
        }
        Err(e) => {
            debug!(command = ?command, error = %e, "Probe unavailable");
            None
        }
    }
}

async fn runtime_version(interpreter: &str) -> Option<String> {
    let config = RunConfig {
        command: vec![interpreter.to_string(), "--version".to_string()],
        timeout: PROBE_TIMEOUT,
        output_limit: PROBE_OUTPUT_LIMIT,
    };
    let result = runner::run_to_completion(&config).await.ok()?;
    if !result.success() {
        return None;
    }
    // Older interpreters print their version on stderr
    [result.stdout, result.stderr]
        .into_iter()
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

async fn read_gpus() -> Vec<GpuUsage> {
    probe(&[
        "nvidia-smi",
        "--query-gpu=name,memory.used,memory.total,utilization.gpu",
        "--format=csv,noheader,nounits",
    ])
    .await
    .map(|out| parse_gpus(&out))
    .unwrap_or_default()
}

fn parse_gpus(csv: &str) -> Vec<GpuUsage> {
    csv.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            match fields.as_slice() {
                [name, used, total, load] => Some(GpuUsage {
                    name: name.to_string(),
                    memory_used_mb: used.parse().ok()?,
                    memory_total_mb: total.parse().ok()?,
                    load_percent: load.parse().ok()?,
                }),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gib_rounds_to_two_decimals() {
        assert_eq!(gib(0), 0.0);
        assert_eq!(gib(1024 * 1024 * 1024), 1.0);
        assert_eq!(gib(1_610_612_736), 1.5);
        assert_eq!(gib(1_000_000_000), 0.93);
    }

    #[test]
    fn test_parse_gpus() {
        let out = "NVIDIA A100-SXM4-40GB, 1024, 40960, 37\nTesla T4, 0, 15360, 0\n";
        let gpus = parse_gpus(out);
        assert_eq!(gpus.len(), 2);
        assert_eq!(gpus[0].name, "NVIDIA A100-SXM4-40GB");
        assert_eq!(gpus[0].memory_total_mb, 40960);
        assert_eq!(gpus[0].load_percent, 37.0);
    }

    #[test]
    fn test_parse_gpus_skips_malformed_lines() {
        assert!(parse_gpus("No devices were found\n").is_empty());
        assert!(parse_gpus("gpu, [N/A], 100, 1\n").is_empty());
    }

    #[test]
    fn test_read_host() {
        let host = read_host();
        assert!(!host.cpu_per_core.is_empty());
        assert!(host.memory.total > 0);
        assert!(!host.arch.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_degrades_without_interpreter() {
        let snap = snapshot("/nonexistent/python").await;
        assert!(snap.runtime_version.is_none());
        assert!(!snap.cpu_per_core.is_empty());
    }
}
