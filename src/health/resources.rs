// src/health/resources.rs
use super::probe::ProbeOutcome;
use serde::Serialize;
use std::path::{Path, PathBuf};
use sysinfo::{Disks, System};

/// Host memory, load average and disk usage of the data directory.
/// Utilisation is reported, never judged: only a failed system query fails
/// the probe.
#[derive(Debug, Clone)]
pub struct ResourceProbe {
    data_dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("memory information is unavailable")]
    MemoryUnavailable,

    #[error("no mounted filesystem contains {0}")]
    NoDisk(PathBuf),
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceUsage {
    pub memory: MemoryUsage,
    pub load_average: LoadAverage,
    pub disk: DiskUsage,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryUsage {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskUsage {
    pub path: PathBuf,
    pub mount_point: PathBuf,
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_percent: f64,
}

/// Used share of `total`, as a percentage rounded to one decimal.
pub fn used_percent(available: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let used = total.saturating_sub(available) as f64;
    (used / total as f64 * 1000.0).round() / 10.0
}

/// Pick the mount point with the longest prefix of `path`.
fn containing_mount<'a>(path: &Path, mounts: impl Iterator<Item = &'a Path>) -> Option<&'a Path> {
    mounts
        .filter(|mount| path.starts_with(mount))
        .max_by_key(|mount| mount.as_os_str().len())
}

fn sample(data_dir: &Path) -> Result<ResourceUsage, ResourceError> {
    let mut system = System::new();
    system.refresh_memory();
    let total = system.total_memory();
    if total == 0 {
        return Err(ResourceError::MemoryUnavailable);
    }
    let available = system.available_memory();

    let load = System::load_average();

    let path = std::fs::canonicalize(data_dir).unwrap_or_else(|_| data_dir.to_path_buf());
    let disks = Disks::new_with_refreshed_list();
    let mount = containing_mount(&path, disks.list().iter().map(|d| d.mount_point()))
        .ok_or_else(|| ResourceError::NoDisk(path.clone()))?;
    let disk = disks
        .list()
        .iter()
        .find(|d| d.mount_point() == mount)
        .ok_or_else(|| ResourceError::NoDisk(path.clone()))?;

    Ok(ResourceUsage {
        memory: MemoryUsage {
            total_bytes: total,
            available_bytes: available,
            used_percent: used_percent(available, total),
        },
        load_average: LoadAverage {
            one: load.one,
            five: load.five,
            fifteen: load.fifteen,
        },
        disk: DiskUsage {
            path,
            mount_point: mount.to_path_buf(),
            total_bytes: disk.total_space(),
            available_bytes: disk.available_space(),
            used_percent: used_percent(disk.available_space(), disk.total_space()),
        },
    })
}

impl ResourceProbe {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub async fn run(&self) -> ProbeOutcome {
        let data_dir = self.data_dir.clone();
        match tokio::task::spawn_blocking(move || sample(&data_dir)).await {
            Ok(Ok(usage)) => ProbeOutcome::success(&usage),
            Ok(Err(e)) => ProbeOutcome::failure(e.to_string()),
            Err(e) => ProbeOutcome::failure(format!("resource sampling aborted: {}", e)),
        }
    }
}
