// src/modules/docker/stats.rs

use super::unix;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use sysinfo::System;

const MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Default)]
pub struct ContainerStats {
    // Share of the whole host, 0-100, already divided by the core count.
    pub cpu_percent: f64,
    pub mem_used_mb: f64,
    pub mem_cap_mb: f64,
    // usage minus inactive page cache, the figure the daemon's own CLI shows.
    pub working_set_mb: f64,
}

#[derive(Deserialize)]
struct StatsPayload {
    #[serde(default)]
    cpu_stats: CpuStats,
    #[serde(default)]
    precpu_stats: CpuStats,
    #[serde(default)]
    memory_stats: MemoryStats,
}

#[derive(Default, Deserialize)]
struct CpuStats {
    #[serde(default)]
    cpu_usage: CpuUsage,
    #[serde(default)]
    system_cpu_usage: u64,
    #[serde(default)]
    online_cpus: u32,
}

#[derive(Default, Deserialize)]
struct CpuUsage {
    #[serde(default)]
    total_usage: u64,
}

#[derive(Default, Deserialize)]
struct MemoryStats {
    #[serde(default)]
    usage: u64,
    #[serde(default)]
    limit: u64,
    #[serde(default)]
    stats: HashMap<String, u64>,
}

static CPU_COUNT: Lazy<usize> = Lazy::new(|| {
    let sys = System::new_all();
    sys.cpus().len().max(1)
});

pub fn system_cpu_count() -> usize {
    *CPU_COUNT
}

// One-shot stats sample. `stream=false` makes the daemon take two readings
// itself, so the cpu delta is already in the payload.
pub async fn sample(id: &str) -> Option<ContainerStats> {
    let short: String = id.chars().take(12).collect();
    let body = unix::cached_request(
        &format!("/containers/{}/stats?stream=false", id),
        &format!("stats_{}", short),
        Duration::from_secs(2),
    )
    .await
    .ok()?;
    let payload: StatsPayload = serde_json::from_slice(&body).ok()?;
    Some(compute(&payload))
}

fn compute(payload: &StatsPayload) -> ContainerStats {
    let cpu_delta = payload
        .cpu_stats
        .cpu_usage
        .total_usage
        .saturating_sub(payload.precpu_stats.cpu_usage.total_usage) as f64;
    let system_delta = payload
        .cpu_stats
        .system_cpu_usage
        .saturating_sub(payload.precpu_stats.system_cpu_usage) as f64;

    let online = if payload.cpu_stats.online_cpus > 0 {
        payload.cpu_stats.online_cpus as f64
    } else {
        system_cpu_count() as f64
    };

    // Docker's CLI multiplies by the core count so a saturated 4 core box
    // reads 400%. The dashboard wants a whole-host share, so divide it back
    // out.
    let cpu_percent = if system_delta > 0.0 && cpu_delta > 0.0 {
        let all_cores = (cpu_delta / system_delta) * online * 100.0;
        all_cores / online
    } else {
        0.0
    };

    let usage = payload.memory_stats.usage as f64;
    let inactive = *payload
        .memory_stats
        .stats
        .get("inactive_file")
        .or_else(|| payload.memory_stats.stats.get("total_inactive_file"))
        .unwrap_or(&0) as f64;
    let limit = payload.memory_stats.limit as f64;

    ContainerStats {
        cpu_percent,
        mem_used_mb: usage / MIB,
        // An unlimited container reports the host total; treat absurdly
        // large limits as "no cap".
        mem_cap_mb: if limit > 0.0 && limit < 1e15 { limit / MIB } else { 0.0 },
        working_set_mb: ((usage - inactive).max(0.0)) / MIB,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_percent_is_host_share() {
        let payload = StatsPayload {
            cpu_stats: CpuStats {
                cpu_usage: CpuUsage { total_usage: 2_000_000_000 },
                system_cpu_usage: 20_000_000_000,
                online_cpus: 8,
            },
            precpu_stats: CpuStats {
                cpu_usage: CpuUsage { total_usage: 1_000_000_000 },
                system_cpu_usage: 10_000_000_000,
                online_cpus: 8,
            },
            memory_stats: MemoryStats::default(),
        };
        let stats = compute(&payload);
        assert!((stats.cpu_percent - 10.0).abs() < 0.001);
    }

    #[test]
    fn working_set_subtracts_inactive_cache() {
        let payload = StatsPayload {
            cpu_stats: CpuStats::default(),
            precpu_stats: CpuStats::default(),
            memory_stats: MemoryStats {
                usage: 4096 * 1024 * 1024,
                limit: 8192 * 1024 * 1024,
                stats: HashMap::from([("inactive_file".to_string(), 1024 * 1024 * 1024)]),
            },
        };
        let stats = compute(&payload);
        assert!((stats.working_set_mb - 3072.0).abs() < 0.001);
        assert!((stats.mem_cap_mb - 8192.0).abs() < 0.001);
    }
}
