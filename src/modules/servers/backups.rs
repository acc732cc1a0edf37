// src/modules/servers/backups.rs

use crate::common::env::CONFIG;
use crate::common::log::{log, LogLevel};
use crate::core::response;
use crate::modules::docker::{create, ps, unix};
use crate::modules::metadata::store;
use crate::modules::servers::deploy;
use axum::extract::Path as AxumPath;
use axum::http::StatusCode;
use axum::response::Response;
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::process::Command;

lazy_static! {
    static ref BACKUP_NAME: Regex = Regex::new(r"^backup_(.*)_(\d+)\.zip$").unwrap();
}

const META_FILE: &str = "moddock_backup_meta.json";

pub fn parse_backup_name(file_name: &str) -> Option<(String, i64)> {
    let caps = BACKUP_NAME.captures(file_name)?;
    Some((caps[1].to_string(), caps[2].parse().ok()?))
}

fn backup_dir() -> PathBuf {
    PathBuf::from(&CONFIG.backup_dir)
}

// GET /v1/backups
pub async fn list_handler() -> Response {
    let _ = fs::create_dir_all(backup_dir());

    // Records and live labels provide icons and pack identity for display.
    let records = store::load_all_configs();
    let live_icons: std::collections::HashMap<String, String> = ps::list_all()
        .await
        .iter()
        .filter_map(|c| c.icon_label().map(|icon| (c.name(), icon)))
        .collect();

    let mut backups = Vec::new();
    let Ok(entries) = fs::read_dir(backup_dir()) else {
        return response::success(Some(json!([])));
    };

    for entry in entries.flatten() {
        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some((server_name, timestamp)) = parse_backup_name(&file_name) else {
            continue;
        };
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);

        // Name may carry the deploy suffix; match records by container name,
        // then by slug with the suffix stripped, then by display name.
        let slug_candidate = crate::modules::metadata::reconcile::guess_slug(&server_name);
        let record = records
            .iter()
            .find(|r| r.container_name == server_name)
            .or_else(|| records.iter().find(|r| !r.slug.is_empty() && r.slug == slug_candidate))
            .or_else(|| {
                records
                    .iter()
                    .find(|r| deploy::safe_container_name(&r.name) == server_name)
            });

        let icon = record
            .map(|r| r.logo.clone())
            .filter(|l| !l.is_empty())
            .or_else(|| live_icons.get(&server_name).cloned())
            .unwrap_or_default();

        backups.push(json!({
            "name": file_name,
            "size": size,
            "date": timestamp,
            "server": server_name,
            "icon": icon,
            "modpack": record
                .map(|r| if r.modpack.is_empty() { r.name.clone() } else { r.modpack.clone() })
                .unwrap_or_else(|| server_name.clone()),
            "mc_version": record.map(|r| r.mc_version.clone()).unwrap_or_default(),
            "loader": record.map(|r| r.loader.clone()).unwrap_or_default(),
        }));
    }

    backups.sort_by_key(|b| -b.get("date").and_then(|d| d.as_i64()).unwrap_or(0));
    response::success(Some(Value::Array(backups)))
}

// POST /v1/servers/{id}/backups
pub async fn create_handler(AxumPath(id): AxumPath<String>) -> Response {
    // The raw inspect document goes into the archive so restore can rebuild
    // the container without guessing.
    let Ok(raw) = unix::request(&format!("/containers/{}/json", id)).await else {
        return response::service_unavailable();
    };
    let Ok(inspect) = serde_json::from_slice::<Value>(&raw) else {
        return response::error(StatusCode::NOT_FOUND, "Container not found");
    };

    let server_name = inspect
        .get("Name")
        .and_then(|n| n.as_str())
        .unwrap_or("")
        .trim_start_matches('/')
        .to_string();
    if server_name.is_empty() {
        return response::error(StatusCode::NOT_FOUND, "Container not found");
    }

    let data_dir = inspect
        .get("Mounts")
        .and_then(|m| m.as_array())
        .and_then(|mounts| {
            mounts.iter().find_map(|m| {
                (m.get("Destination")?.as_str()? == "/data")
                    .then(|| m.get("Source")?.as_str().map(str::to_string))
                    .flatten()
            })
        });
    let Some(data_dir) = data_dir.filter(|d| Path::new(d).is_dir()) else {
        return response::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Could not locate /data mount for this server",
        );
    };

    let _ = fs::create_dir_all(backup_dir());
    let ts = Utc::now().timestamp();
    let backup_name = format!("backup_{}_{}.zip", server_name, ts);
    let backup_path = backup_dir().join(&backup_name);

    // Embed enough of the inspect document to re-create the container.
    let meta = json!({
        "serverName": server_name,
        "timestamp": ts,
        "containerConfig": inspect.get("Config").cloned().unwrap_or(Value::Null),
        "hostConfig": inspect.get("HostConfig").cloned().unwrap_or(Value::Null),
    });
    let meta_path = Path::new(&data_dir).join(META_FILE);
    if fs::write(&meta_path, serde_json::to_string_pretty(&meta).unwrap_or_default()).is_err() {
        return response::error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to write backup metadata");
    }

    let output = Command::new("zip")
        .arg("-r")
        .arg(&backup_path)
        .arg(".")
        .arg("-x")
        .arg("*.log")
        .arg("*.lck")
        .arg(crate::modules::monitor::agent::METRICS_FILE)
        .current_dir(&data_dir)
        .output()
        .await;
    let _ = fs::remove_file(&meta_path);

    match output {
        Ok(out) if backup_path.exists() && out.status.success() => {
            log(LogLevel::Info, &format!("✓ Backup created: {}", backup_name));
            response::success(Some(json!({ "message": "Backup created", "name": backup_name })))
        }
        Ok(out) => response::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!(
                "Failed to create zip: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            ),
        ),
        Err(e) => response::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to run zip: {}", e),
        ),
    }
}

// DELETE /v1/backups/{name}
pub async fn delete_handler(AxumPath(name): AxumPath<String>) -> Response {
    // Strip any path components; only files directly in the backup dir are
    // deletable.
    let base = Path::new(&name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if base.is_empty() || parse_backup_name(&base).is_none() {
        return response::bad_request("Invalid backup name");
    }

    let path = backup_dir().join(&base);
    if !path.exists() {
        return response::error(StatusCode::NOT_FOUND, "Backup not found");
    }
    match fs::remove_file(&path) {
        Ok(()) => response::success(Some(json!({ "message": "Backup deleted" }))),
        Err(e) => response::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to delete backup: {}", e),
        ),
    }
}

// POST /v1/backups/{name}/restore
//
// Rebuilds the server from an archive: stop and remove whatever currently
// runs under that name, cycle the data directory aside, extract, and
// re-create the container from the embedded metadata.
pub async fn restore_handler(AxumPath(name): AxumPath<String>) -> Response {
    let base = Path::new(&name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let backup_path = backup_dir().join(&base);
    if base.is_empty() || !backup_path.exists() {
        return response::error(StatusCode::NOT_FOUND, "Backup file not found");
    }

    // 1. Peek at the embedded metadata without extracting the archive.
    let meta_out = Command::new("unzip")
        .arg("-p")
        .arg(&backup_path)
        .arg(META_FILE)
        .output()
        .await;
    let meta: Value = match meta_out {
        Ok(out) if out.status.success() => match serde_json::from_slice(&out.stdout) {
            Ok(meta) => meta,
            Err(_) => {
                return response::error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to read backup metadata",
                )
            }
        },
        _ => {
            return response::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read backup metadata",
            )
        }
    };

    let Some(server_name) = meta
        .get("serverName")
        .and_then(|n| n.as_str())
        .map(|n| n.trim_start_matches('/').to_string())
        .filter(|n| !n.is_empty())
    else {
        return response::error(StatusCode::INTERNAL_SERVER_ERROR, "Backup metadata has no server name");
    };

    let data_dir = format!("{}/{}", CONFIG.appdata_dir, server_name);

    // 2. Clear the way: existing container and current data dir move aside.
    let _ = create::lifecycle(&server_name, "stop").await;
    let _ = create::remove(&server_name, true).await;

    if Path::new(&data_dir).is_dir() {
        let old_dir = format!("{}.reinstall_old_{}", data_dir, Utc::now().timestamp());
        let _ = fs::rename(&data_dir, &old_dir);
    }
    if let Err(e) = fs::create_dir_all(&data_dir) {
        return response::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to create data directory: {}", e),
        );
    }

    // 3. Extract.
    let unzip = Command::new("unzip")
        .arg(&backup_path)
        .arg("-d")
        .arg(&data_dir)
        .output()
        .await;
    if !matches!(&unzip, Ok(out) if out.status.success()) {
        return response::error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to extract backup");
    }
    let _ = fs::remove_file(Path::new(&data_dir).join(META_FILE));

    // 4. Re-create the container from the recorded env, labels and port.
    let container_config = meta.get("containerConfig").cloned().unwrap_or(Value::Null);
    let host_config = meta.get("hostConfig").cloned().unwrap_or(Value::Null);

    let env: BTreeMap<String, String> = container_config
        .get("Env")
        .and_then(|e| e.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| e.as_str())
                .filter_map(|e| e.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let labels: BTreeMap<String, String> = container_config
        .get("Labels")
        .and_then(|l| l.as_object())
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let image = container_config
        .get("Image")
        .and_then(|i| i.as_str())
        .unwrap_or(deploy::DEFAULT_IMAGE)
        .to_string();

    let host_port = host_config
        .get("PortBindings")
        .and_then(|p| p.get("25565/tcp"))
        .and_then(|b| b.as_array())
        .and_then(|binds| binds.first())
        .and_then(|b| b.get("HostPort"))
        .and_then(|p| p.as_str())
        .and_then(|p| p.parse().ok())
        .unwrap_or(ps::GAME_PORT);

    let spec = create::CreateSpec {
        name: server_name.clone(),
        image,
        env,
        labels,
        host_port,
        container_port: ps::GAME_PORT,
        data_dir,
    };

    match create::create_and_start(&spec).await {
        Ok(id) => {
            log(LogLevel::Info, &format!("✓ Restored {} from {}", server_name, base));
            response::success(Some(json!({
                "message": "Server reinstalled and started",
                "containerId": id,
            })))
        }
        Err(e) => response::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to recreate container: {}", e),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_names_parse_and_reject() {
        assert_eq!(
            parse_backup_name("backup_atm10-47a4db_1717171717.zip"),
            Some(("atm10-47a4db".to_string(), 1717171717))
        );
        assert_eq!(parse_backup_name("random.zip"), None);
        assert_eq!(parse_backup_name("backup__12.zip"), Some(("".to_string(), 12)));
    }
}
