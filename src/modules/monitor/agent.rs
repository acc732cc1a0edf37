// src/modules/monitor/agent.rs

use crate::core::response;
use crate::modules::docker::{cli, inspect, ps};
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const METRICS_FILE: &str = "moddock_metrics.json";
const AGENT_FILE: &str = "moddock_agent.sh";
const STALE_AFTER: Duration = Duration::from_secs(60);
const RESTART_THROTTLE: Duration = Duration::from_secs(300);

// Sampler pushed into each container. It runs off the /data bind mount, so
// writing the script on the host is enough to make it executable inside.
// Every 10s it samples the Java process: PSS and RSS from /proc, heap via
// jstat when the JDK ships one, and a CPU share delta from /proc/stat.
const AGENT_SCRIPT: &str = r#"#!/bin/sh
DATA_FILE="/data/moddock_metrics.json"
INTERVAL=10
CPU_PREV=""
TOTAL_PREV=""

while true; do
  PID=$(pidof java | awk '{print $1}')
  if [ -n "$PID" ] && [ -d "/proc/$PID" ]; then
    RSS_KB=$(awk '/VmRSS/ {print $2}' /proc/$PID/status 2>/dev/null)
    PSS_KB=$(awk '/^Pss:/ {print $2}' /proc/$PID/smaps_rollup 2>/dev/null)
    HEAP_USED_KB=0
    if command -v jstat >/dev/null 2>&1; then
      STATS=$(jstat -gc "$PID" 1 1 | tail -n 1)
      HEAP_USED_KB=$(echo "$STATS" | awk '{print int($3 + $4 + $6 + $8)}')
    fi
    CPU_LINE=$(head -n1 /proc/stat)
    TOTAL=0
    for v in $(echo "$CPU_LINE" | cut -d ' ' -f2-); do TOTAL=$((TOTAL + v)); done
    STAT=$(cat /proc/$PID/stat)
    PROC_UTIME=$(echo "$STAT" | awk '{print $14}')
    PROC_STIME=$(echo "$STAT" | awk '{print $15}')
    PROC_TOTAL=$((PROC_UTIME + PROC_STIME))
    CPU_PCT=0
    if [ -n "$CPU_PREV" ] && [ -n "$TOTAL_PREV" ]; then
      DPROC=$((PROC_TOTAL - CPU_PREV))
      DTOTAL=$((TOTAL - TOTAL_PREV))
      if [ "$DTOTAL" -gt 0 ]; then
        CPU_PCT=$((DPROC * 100 / DTOTAL))
      fi
    fi
    CPU_PREV=$PROC_TOTAL
    TOTAL_PREV=$TOTAL
    TS=$(date +%s)
    echo "{\"ts\":$TS,\"pid\":\"$PID\",\"heap_used_mb\":$((HEAP_USED_KB / 1024)),\"rss_mb\":$((${RSS_KB:-0} / 1024)),\"pss_mb\":$((${PSS_KB:-0} / 1024)),\"cpu_percent\":$CPU_PCT}" > "$DATA_FILE"
  fi
  sleep $INTERVAL
done
"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentMetrics {
    pub ts: i64,
    pub heap_used_mb: f64,
    pub rss_mb: f64,
    pub pss_mb: f64,
    pub ws_mb: f64,
    pub cpu_percent: f64,
}

// Reads the agent's output file; stale samples (agent died, server stopped)
// count as absent.
pub fn read_metrics(data_dir: &str) -> Option<AgentMetrics> {
    let path = Path::new(data_dir).join(METRICS_FILE);
    let meta = fs::metadata(&path).ok()?;
    let fresh = meta
        .modified()
        .ok()
        .and_then(|m| m.elapsed().ok())
        .map(|age| age < STALE_AFTER)
        .unwrap_or(false);
    if !fresh {
        return None;
    }
    serde_json::from_str(&fs::read_to_string(&path).ok()?).ok()
}

pub fn metrics_path(data_dir: &str) -> PathBuf {
    Path::new(data_dir).join(METRICS_FILE)
}

fn throttle_path(container_id: &str) -> PathBuf {
    let short: String = container_id.chars().take(12).collect();
    std::env::temp_dir().join(format!("moddock_agent_{}.ts", short))
}

// True when the agent was (re)started recently and should be left alone.
fn recently_started(container_id: &str) -> bool {
    fs::metadata(throttle_path(container_id))
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|m| m.elapsed().ok())
        .map(|age| age < RESTART_THROTTLE)
        .unwrap_or(false)
}

// Drops the agent script into the data dir and launches it inside the
// container when it is not already running.
pub async fn ensure_agent(container_id: &str, data_dir: &str) -> bool {
    let script_path = Path::new(data_dir).join(AGENT_FILE);
    if !script_path.exists() {
        if fs::write(&script_path, AGENT_SCRIPT).is_err() {
            return false;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755));
        }
    }

    let check = cli::exec(container_id, &["sh", "-c", "ps | grep moddock_agent.sh | grep -v grep"])
        .await;
    let running = check.map(|o| !o.stdout.trim().is_empty()).unwrap_or(false);
    if running {
        return true;
    }

    let _ = fs::write(throttle_path(container_id), b"");
    cli::exec_detached(
        container_id,
        &["sh", "-c", "nohup /data/moddock_agent.sh > /data/moddock_agent.log 2>&1 &"],
    )
    .await
}

// Restart the agent for a running server whose metrics went missing, at most
// once per throttle window.
pub async fn heal_agent(container_id: &str, data_dir: &str) {
    if recently_started(container_id) {
        return;
    }
    ensure_agent(container_id, data_dir).await;
}

// POST /v1/agents/start
pub async fn start_agents_handler() -> Response {
    let mut started = Vec::new();
    for container in ps::list_managed().await {
        if !container.is_running() {
            continue;
        }
        let Some(detail) = inspect::inspect(&container.id).await else {
            continue;
        };
        let Some(data_dir) = detail.data_dir() else {
            continue;
        };
        if ensure_agent(&container.id, &data_dir).await {
            started.push(container.name());
        }
    }
    response::success(Some(json!({ "started": started })))
}
