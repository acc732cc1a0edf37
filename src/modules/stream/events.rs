// src/modules/stream/events.rs

// Server-Sent Events feed replacing the dashboard's listing poll: status
// every 2 seconds when something changed, metrics attached every 6 seconds
// unconditionally. Plain periodic sampling; "send if changed" is the only
// delivery guarantee.

use crate::modules::docker::ps;
use crate::modules::monitor::agent;
use crate::modules::servers::container_data_dir;
use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::Utc;
use futures::stream::Stream;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::convert::Infallible;
use std::time::Duration;

const STATUS_EVERY: u64 = 2;
const METRICS_EVERY: u64 = 6;

struct StreamState {
    counter: u64,
    last_hash: String,
}

async fn snapshot(include_metrics: bool) -> Vec<Value> {
    let mut servers = Vec::new();
    for container in ps::list_managed().await {
        let is_running = container.is_running();
        let mut entry = json!({
            "id": container.id,
            "name": container.name(),
            "running": is_running,
            "status": container.status,
        });

        if include_metrics && is_running {
            if let Some(data_dir) = container_data_dir(&container.id).await {
                if let Some(metrics) = agent::read_metrics(&data_dir) {
                    entry["metrics"] = json!({
                        "cpu": metrics.cpu_percent,
                        "ram": metrics.rss_mb,
                        "heap": metrics.heap_used_mb,
                    });
                }
            }
        }
        servers.push(entry);
    }
    servers
}

fn state_hash(servers: &[Value]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_string(servers).unwrap_or_default());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

// GET /v1/stream
pub async fn stream_handler() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let initial = StreamState {
        counter: 0,
        last_hash: String::new(),
    };

    let stream = futures::stream::unfold(initial, |mut state| async move {
        loop {
            tokio::time::sleep(Duration::from_secs(1)).await;
            state.counter += 1;

            if state.counter % STATUS_EVERY != 0 {
                continue;
            }
            let include_metrics = state.counter % METRICS_EVERY == 0;

            let servers = snapshot(include_metrics).await;
            if servers.is_empty() {
                continue;
            }

            let hash = state_hash(&servers);
            if !include_metrics && hash == state.last_hash {
                continue;
            }
            state.last_hash = hash;

            let payload = json!({
                "type": "server_list",
                "servers": servers,
                "timestamp": Utc::now().timestamp(),
            });
            let event = Event::default().event("server_update").data(payload.to_string());
            return Some((Ok(event), state));
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
