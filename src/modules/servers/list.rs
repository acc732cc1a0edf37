// src/modules/servers/list.rs

use crate::core::response;
use crate::modules::docker::{inspect, ps, stats};
use crate::modules::metadata::store::{self, MetadataCache};
use crate::modules::metadata::reconcile;
use crate::modules::monitor::{agent, cgroup};
use crate::modules::servers::container_data_dir;
use crate::modules::settings::handlers::{parse_memory_mb, Settings};
use axum::response::Response;
use chrono::Utc;
use serde_json::{json, Value};

// GET /v1/servers
//
// The dashboard's main view: every managed container with its runtime state,
// identity metadata and resource usage, assembled from batched daemon calls
// so the handler stays cheap under 2 second polling.
pub async fn list_handler() -> Response {
    let settings = Settings::load();
    let api_key = settings.curseforge_api_key();

    let containers = ps::list_managed().await;
    let records = store::configs_by_container();
    let images = ps::local_image_ids().await;

    let ids: Vec<String> = containers.iter().map(|c| c.id.clone()).collect();
    let details = inspect::inspect_many(&ids).await;

    let mut servers = Vec::with_capacity(containers.len());
    for container in &containers {
        let name = container.name();
        let is_running = container.is_running();
        let record = records.get(&name);
        let detail = details.get(&container.id).or_else(|| details.get(&name));

        let env = detail.map(|d| d.env_map()).unwrap_or_default();
        let env_memory_mb = env.get("MEMORY").map(|m| parse_memory_mb(m));

        let metadata = reconcile::server_metadata(&env, &name, &api_key).await;

        let players_max = env
            .get("MAX_PLAYERS")
            .and_then(|m| m.parse::<u32>().ok())
            .or_else(|| record.map(|r| r.max_players).filter(|m| *m > 0))
            .or_else(|| settings.get("default_max_players").parse().ok())
            .unwrap_or(20);

        let icon = record
            .map(|r| r.logo.clone())
            .filter(|l| !l.is_empty())
            .or_else(|| container.icon_label())
            .or_else(|| env.get("ICON").cloned())
            .unwrap_or_default();

        let config_mem_mb = record
            .map(|r| parse_memory_mb(&r.memory))
            .filter(|m| *m > 0.0)
            .or(env_memory_mb);

        // --- Telemetry ---
        let data_dir = container_data_dir(&container.id).await;
        let metrics = data_dir.as_deref().and_then(agent::read_metrics);

        // A running server with no fresh metrics gets its agent restarted,
        // throttled inside heal_agent.
        if is_running && metrics.is_none() {
            if let Some(dir) = &data_dir {
                agent::heal_agent(&container.id, dir).await;
            }
        }

        let engine_stats = if is_running {
            stats::sample(&container.id).await.unwrap_or_default()
        } else {
            Default::default()
        };
        let cgroup_ws_mb = if is_running {
            cgroup::working_set_mb(&container.id)
        } else {
            None
        };

        let mut ram_limit_mb = config_mem_mb.unwrap_or(0.0);
        if ram_limit_mb <= 0.0 {
            ram_limit_mb = parse_memory_mb(settings.get("default_memory"));
        }

        // RAM source ladder, most truthful first: proportional set size from
        // the in-container agent, its RSS, the host-side cgroup working set,
        // the agent working set, finally raw engine stats.
        let (ram_used_mb, ram_source) = if let Some(m) = metrics.as_ref().filter(|m| m.pss_mb > 0.0)
        {
            (m.pss_mb, "agent_pss")
        } else if let Some(m) = metrics.as_ref().filter(|m| m.rss_mb > 0.0) {
            (m.rss_mb, "agent_rss")
        } else if let Some(ws) = cgroup_ws_mb.filter(|ws| *ws > 0.0) {
            (ws, "host_cgroup_ws")
        } else if let Some(m) = metrics.as_ref().filter(|m| m.ws_mb > 0.0) {
            (m.ws_mb, "agent_ws")
        } else if engine_stats.mem_used_mb > 0.0 {
            (engine_stats.mem_used_mb, "docker_stats")
        } else {
            (0.0, "unavailable")
        };

        let cpu_usage = if engine_stats.cpu_percent > 0.0 {
            engine_stats.cpu_percent
        } else {
            metrics
                .as_ref()
                .map(|m| m.cpu_percent / stats::system_cpu_count() as f64)
                .unwrap_or(0.0)
        };

        let ram_percent = if ram_limit_mb > 0.0 {
            (ram_used_mb / ram_limit_mb * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        // Pullable update: tag resolves to a newer local image than the one
        // the container runs.
        let update_available = detail
            .map(|d| {
                images
                    .get(&d.config.image)
                    .map(|latest| *latest != d.image_id)
                    .unwrap_or(false)
            })
            .unwrap_or(false);

        let heap_used_mb = metrics.as_ref().map(|m| m.heap_used_mb).unwrap_or(0.0);

        servers.push(json!({
            "containerUpdate": update_available,
            "id": container.id,
            "name": name,
            "status": if is_running { "Running" } else { "Stopped" },
            "isRunning": is_running,
            "ports": container.game_port(),
            "image": container.image,
            "icon": icon,
            "ram": (ram_percent * 10.0).round() / 10.0,
            "ramUsedMb": (ram_used_mb * 10.0).round() / 10.0,
            "ramLimitMb": ram_limit_mb,
            "ramConfigMb": config_mem_mb,
            "cpu": (cpu_usage * 100.0).round() / 100.0,
            "ramDetails": {
                "usedMb": ram_used_mb,
                "rssMb": metrics.as_ref().map(|m| m.rss_mb).unwrap_or(engine_stats.mem_used_mb),
                "heapUsedMb": heap_used_mb,
                "limitMb": ram_limit_mb,
                "cpuPercent": cpu_usage,
                "source": ram_source,
                "agent": {
                    "present": metrics.is_some(),
                    "ts": metrics.as_ref().map(|m| m.ts),
                },
                "cgroup": {
                    "memUsedMb": engine_stats.mem_used_mb,
                    "memCapMb": engine_stats.mem_cap_mb,
                    "workingSetMb": cgroup_ws_mb,
                },
                "configMemMb": config_mem_mb,
            },
            // The listing stays instant; live counts arrive via the players
            // endpoint the frontend polls per server.
            "players": { "online": 0, "max": players_max },
            "mcVersion": metadata.mc_version,
            "loader": metadata.loader,
            "modpackVersion": metadata.modpack_version,
        }));

        // Persist what reconciliation learned so the next boot paints the
        // list before any catalog call returns.
        store::save_metadata_cache(
            &name,
            &MetadataCache {
                mc_version: if metadata.mc_version.is_empty() {
                    "Unknown".to_string()
                } else {
                    metadata.mc_version.clone()
                },
                loader: if metadata.loader.is_empty() {
                    "Vanilla".to_string()
                } else {
                    metadata.loader.clone()
                },
                modpack_version: metadata.modpack_version.clone(),
                last_updated: Utc::now().timestamp(),
            },
        );
    }

    response::success(Some(Value::Array(servers)))
}
