//! Derived resource metrics and fleet-wide aggregation.
//!
//! Raw runtime counters are cumulative; rates come out of delta-over-delta
//! ratios between the snapshot's previous and current readings. Every
//! division is guarded: a zero system delta or memory limit yields 0, never
//! NaN or infinity.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::runtime::{ContainerFilter, ContainerHandle, ContainerRuntime, StatsSnapshot};
use crate::types::{SystemInfo, VersionInfo};

/// Human-meaningful usage figures for one container. Computed on demand,
/// never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_usage_bytes: u64,
    pub memory_limit_bytes: u64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
    pub block_read_bytes: u64,
    pub block_write_bytes: u64,
    pub timestamp: DateTime<Utc>,
}

impl DerivedMetrics {
    /// Derive usage figures from a raw snapshot. Pure: identical snapshots
    /// and timestamp always yield identical metrics.
    pub fn from_snapshot(snapshot: &StatsSnapshot, timestamp: DateTime<Utc>) -> Self {
        let cpu_delta = snapshot.cpu.total_usage.saturating_sub(snapshot.precpu.total_usage) as f64;
        let system_delta =
            snapshot.cpu.system_usage.saturating_sub(snapshot.precpu.system_usage) as f64;
        let cpu_count = snapshot
            .cpu
            .online_cpus
            .map(|n| n as usize)
            .unwrap_or(snapshot.cpu.percpu_usage.len()) as f64;

        let cpu_percent = if system_delta > 0.0 {
            (cpu_delta / system_delta) * cpu_count * 100.0
        } else {
            0.0
        };

        let memory_percent = if snapshot.memory.limit > 0 {
            snapshot.memory.usage as f64 / snapshot.memory.limit as f64 * 100.0
        } else {
            0.0
        };

        let network_rx_bytes = snapshot.networks.values().map(|n| n.rx_bytes).sum();
        let network_tx_bytes = snapshot.networks.values().map(|n| n.tx_bytes).sum();

        // Op tags are the runtime's own; the match is case-sensitive.
        let block_read_bytes = snapshot
            .blkio
            .iter()
            .filter(|e| e.op == "Read")
            .map(|e| e.value)
            .sum();
        let block_write_bytes = snapshot
            .blkio
            .iter()
            .filter(|e| e.op == "Write")
            .map(|e| e.value)
            .sum();

        Self {
            cpu_percent,
            memory_percent,
            memory_usage_bytes: snapshot.memory.usage,
            memory_limit_bytes: snapshot.memory.limit,
            network_rx_bytes,
            network_tx_bytes,
            block_read_bytes,
            block_write_bytes,
            timestamp,
        }
    }
}

/// Container counts bucketed by state. States other than `running` and
/// `exited` contribute to `total` only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerCounts {
    pub total: usize,
    pub running: usize,
    pub stopped: usize,
}

/// Per-container entry in the aggregate report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerUsage {
    pub id: String,
    pub name: String,
    pub metrics: DerivedMetrics,
}

/// A stats fetch that failed for one container; isolated so it cannot take
/// down the whole aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageFailure {
    pub name: String,
    pub error: String,
}

/// Fleet-wide report combining daemon info with per-container usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSnapshot {
    pub system: SystemInfo,
    pub version: VersionInfo,
    pub containers: ContainerCounts,
    pub images_total: usize,
    pub networks_total: usize,
    pub usage: Vec<ContainerUsage>,
    pub failures: Vec<UsageFailure>,
    /// Sum of per-container CPU percentages, not normalized by host CPU
    /// count. A documented approximation.
    pub total_cpu_percent: f64,
    /// Sum of per-container memory percentages. Same approximation.
    pub total_memory_percent: f64,
    pub timestamp: DateTime<Utc>,
}

/// Collect the fleet-wide report: daemon info, resource counts, and derived
/// usage for every running container.
///
/// Stats fetches fan out concurrently; entry ordering in `usage` is not
/// guaranteed. A failed fetch for one container lands in `failures` and
/// leaves the rest of the report intact.
pub async fn admin_snapshot<R: ContainerRuntime>(runtime: &R) -> Result<AdminSnapshot> {
    let system = runtime.system_info().await?;
    let version = runtime.version().await?;
    let containers = runtime
        .list_containers(ContainerFilter { all: true })
        .await?;
    let images = runtime.list_images().await?;
    let networks = runtime.list_networks().await?;

    let counts = ContainerCounts {
        total: containers.len(),
        running: containers.iter().filter(|c| c.state == "running").count(),
        stopped: containers.iter().filter(|c| c.state == "exited").count(),
    };

    let running = containers.iter().filter(|c| c.state == "running");
    let fetches = running.map(|c| {
        let handle = ContainerHandle {
            id: c.id.clone(),
            name: c.name.clone(),
        };
        async move {
            let result = runtime.get_stats(&handle).await;
            (handle, result)
        }
    });

    let mut usage = Vec::new();
    let mut failures = Vec::new();
    let mut total_cpu_percent = 0.0;
    let mut total_memory_percent = 0.0;
    let now = Utc::now();

    for (handle, result) in join_all(fetches).await {
        match result {
            Ok(snapshot) => {
                let metrics = DerivedMetrics::from_snapshot(&snapshot, now);
                total_cpu_percent += metrics.cpu_percent;
                total_memory_percent += metrics.memory_percent;
                usage.push(ContainerUsage {
                    id: handle.id,
                    name: handle.name,
                    metrics,
                });
            }
            Err(e) => {
                warn!(container = %handle.name, error = %e, "stats fetch failed, skipping container");
                failures.push(UsageFailure {
                    name: handle.name,
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(AdminSnapshot {
        system,
        version,
        containers: counts,
        images_total: images.len(),
        networks_total: networks.len(),
        usage,
        failures,
        total_cpu_percent,
        total_memory_percent,
        timestamp: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{BlkioEntry, CpuCounters, MemoryCounters, NetworkCounters};
    use std::collections::HashMap;

    fn snapshot() -> StatsSnapshot {
        StatsSnapshot {
            cpu: CpuCounters {
                total_usage: 400,
                system_usage: 2000,
                online_cpus: Some(4),
                percpu_usage: vec![100, 100, 100, 100],
            },
            precpu: CpuCounters {
                total_usage: 200,
                system_usage: 1000,
                online_cpus: Some(4),
                percpu_usage: vec![50, 50, 50, 50],
            },
            memory: MemoryCounters {
                usage: 256,
                limit: 1024,
            },
            networks: HashMap::from([
                ("eth0".to_string(), NetworkCounters { rx_bytes: 100, tx_bytes: 50 }),
                ("eth1".to_string(), NetworkCounters { rx_bytes: 200, tx_bytes: 25 }),
            ]),
            blkio: vec![
                BlkioEntry { op: "Read".into(), value: 10 },
                BlkioEntry { op: "Write".into(), value: 20 },
                BlkioEntry { op: "Read".into(), value: 5 },
                BlkioEntry { op: "Sync".into(), value: 99 },
                BlkioEntry { op: "read".into(), value: 1000 },
            ],
        }
    }

    #[test]
    fn cpu_percent_is_delta_over_delta_times_cpus() {
        let metrics = DerivedMetrics::from_snapshot(&snapshot(), Utc::now());
        // (200 / 1000) * 4 * 100
        assert!((metrics.cpu_percent - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cpu_count_falls_back_to_percpu_length() {
        let mut snap = snapshot();
        snap.cpu.online_cpus = None;
        snap.cpu.percpu_usage = vec![0, 0];
        let metrics = DerivedMetrics::from_snapshot(&snap, Utc::now());
        // (200 / 1000) * 2 * 100
        assert!((metrics.cpu_percent - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_system_delta_yields_zero_not_nan() {
        let mut snap = snapshot();
        snap.cpu.system_usage = snap.precpu.system_usage;
        let metrics = DerivedMetrics::from_snapshot(&snap, Utc::now());
        assert_eq!(metrics.cpu_percent, 0.0);
        assert!(metrics.cpu_percent.is_finite());
    }

    #[test]
    fn zero_memory_limit_yields_zero_not_nan() {
        let mut snap = snapshot();
        snap.memory.limit = 0;
        let metrics = DerivedMetrics::from_snapshot(&snap, Utc::now());
        assert_eq!(metrics.memory_percent, 0.0);
        assert!(metrics.memory_percent.is_finite());
    }

    #[test]
    fn memory_percent_is_usage_over_limit() {
        let metrics = DerivedMetrics::from_snapshot(&snapshot(), Utc::now());
        assert!((metrics.memory_percent - 25.0).abs() < f64::EPSILON);
        assert_eq!(metrics.memory_usage_bytes, 256);
        assert_eq!(metrics.memory_limit_bytes, 1024);
    }

    #[test]
    fn network_bytes_sum_over_all_interfaces() {
        let metrics = DerivedMetrics::from_snapshot(&snapshot(), Utc::now());
        assert_eq!(metrics.network_rx_bytes, 300);
        assert_eq!(metrics.network_tx_bytes, 75);
    }

    #[test]
    fn blkio_matches_read_and_write_tags_case_sensitively() {
        let metrics = DerivedMetrics::from_snapshot(&snapshot(), Utc::now());
        assert_eq!(metrics.block_read_bytes, 15);
        assert_eq!(metrics.block_write_bytes, 20);
    }

    #[test]
    fn derivation_is_pure() {
        let ts = Utc::now();
        let a = DerivedMetrics::from_snapshot(&snapshot(), ts);
        let b = DerivedMetrics::from_snapshot(&snapshot(), ts);
        assert_eq!(a, b);
    }

    #[test]
    fn counter_reset_does_not_underflow() {
        let mut snap = snapshot();
        // Previous reading above current, as after a daemon restart.
        snap.precpu.total_usage = snap.cpu.total_usage + 1;
        snap.precpu.system_usage = snap.cpu.system_usage + 1;
        let metrics = DerivedMetrics::from_snapshot(&snap, Utc::now());
        assert_eq!(metrics.cpu_percent, 0.0);
    }
}
