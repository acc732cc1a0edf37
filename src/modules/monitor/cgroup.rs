/* src/modules/monitor/cgroup.rs */

// Reads container memory and CPU straight from the cgroup filesystem, so the
// listing can survive a slow or wedged docker daemon. Handles both the v2
// unified layout and the v1 controllers docker used before it.

use crate::modules::docker::stats::system_cpu_count;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Default)]
pub struct CgroupStats {
    pub mem_used_mb: f64,
    pub mem_cap_mb: f64,
    pub mem_percent: f64,
    pub cpu_percent: f64,
}

// Previous CPU sample, persisted between polls so a stateless HTTP handler
// can still compute a delta.
#[derive(Serialize, Deserialize)]
struct CpuSample {
    ts: f64,
    usage: f64,
}

fn cpu_state_path(cid: &str) -> PathBuf {
    let safe: String = cid
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.' || *c == '-')
        .collect();
    std::env::temp_dir().join("moddock_cpu").join(format!("{}.json", safe))
}

// Docker has moved the container cgroup directory around between releases
// and cgroup versions; probe the known locations, then a prefix glob.
fn find_cgroup_base(cid: &str) -> Option<PathBuf> {
    let candidates = [
        format!("/sys/fs/cgroup/docker/{}", cid),
        format!("/sys/fs/cgroup/system.slice/docker-{}.scope", cid),
        format!("/sys/fs/cgroup/{}", cid),
    ];
    for path in candidates {
        let p = PathBuf::from(path);
        if p.is_dir() {
            return Some(p);
        }
    }

    // Short ids: match any directory starting with the prefix.
    let docker_root = PathBuf::from("/sys/fs/cgroup/docker");
    if let Ok(entries) = fs::read_dir(&docker_root) {
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().starts_with(cid) && entry.path().is_dir() {
                return Some(entry.path());
            }
        }
    }
    None
}

fn read_number(path: &PathBuf) -> Option<f64> {
    let content = fs::read_to_string(path).ok()?;
    let trimmed = content.trim();
    if trimmed == "max" {
        return None;
    }
    trimmed.parse().ok()
}

// Cumulative CPU time in nanoseconds: v2 cpu.stat usage_usec, else v1
// cpuacct.usage.
fn read_cpu_usage_ns(base: &PathBuf) -> Option<f64> {
    if let Ok(stat) = fs::read_to_string(base.join("cpu.stat")) {
        for line in stat.lines() {
            if let Some(rest) = line.strip_prefix("usage_usec ") {
                return rest.trim().parse::<f64>().ok().map(|us| us * 1000.0);
            }
        }
    }
    read_number(&base.join("cpuacct.usage"))
}

pub fn stats(cid: &str, configured_mem_mb: Option<f64>) -> CgroupStats {
    let mut out = CgroupStats::default();
    let base = find_cgroup_base(cid);

    if let Some(base) = &base {
        // v2 first, v1 names as fallback.
        out.mem_used_mb = read_number(&base.join("memory.current"))
            .or_else(|| read_number(&base.join("memory.usage_in_bytes")))
            .map(|b| b / MIB)
            .unwrap_or(0.0);
        out.mem_cap_mb = read_number(&base.join("memory.max"))
            .or_else(|| read_number(&base.join("memory.limit_in_bytes")))
            .map(|b| b / MIB)
            .unwrap_or(0.0);
    }

    if let Some(configured) = configured_mem_mb {
        if configured > 0.0 {
            out.mem_cap_mb = configured;
        }
    }
    if out.mem_cap_mb > 0.0 && out.mem_used_mb >= 0.0 {
        out.mem_percent = out.mem_used_mb / out.mem_cap_mb * 100.0;
    }

    if let Some(base) = &base {
        if let Some(usage) = read_cpu_usage_ns(base) {
            out.cpu_percent = cpu_percent_from_delta(cid, usage);
        }
    }

    out
}

// Percent of the whole host since the previous poll. First call for a
// container returns 0 and just seeds the state file.
fn cpu_percent_from_delta(cid: &str, usage_ns: f64) -> f64 {
    let state_path = cpu_state_path(cid);
    let now = Utc::now().timestamp_millis() as f64 / 1000.0;

    let prev: Option<CpuSample> = fs::read_to_string(&state_path)
        .ok()
        .and_then(|c| serde_json::from_str(&c).ok());

    if let Some(dir) = state_path.parent() {
        let _ = fs::create_dir_all(dir);
    }
    let _ = fs::write(
        &state_path,
        serde_json::to_string(&CpuSample { ts: now, usage: usage_ns }).unwrap_or_default(),
    );

    let Some(prev) = prev else { return 0.0 };
    let dt = now - prev.ts;
    let du = usage_ns - prev.usage;
    if dt <= 0.0 || du <= 0.0 {
        return 0.0;
    }
    (du / 1e9) / dt * 100.0 / system_cpu_count() as f64
}

// Working-set memory from the host side: current usage minus inactive file
// cache, None when the cgroup is not visible.
pub fn working_set_mb(cid: &str) -> Option<f64> {
    let base = find_cgroup_base(cid)?;

    let current = read_number(&base.join("memory.current"))
        .or_else(|| read_number(&base.join("memory.usage_in_bytes")))?;

    let inactive = fs::read_to_string(base.join("memory.stat"))
        .ok()
        .and_then(|stat| {
            stat.lines().find_map(|line| {
                line.strip_prefix("inactive_file ")
                    .or_else(|| line.strip_prefix("total_inactive_file "))
                    .and_then(|v| v.trim().parse::<f64>().ok())
            })
        })
        .unwrap_or(0.0);

    Some(((current - inactive).max(0.0)) / MIB)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_state_path_sanitizes_ids() {
        let path = cpu_state_path("abc123/../../etc");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(name, "abc123....etc.json");
        assert!(!path.to_string_lossy().contains("/../"));
    }
}
