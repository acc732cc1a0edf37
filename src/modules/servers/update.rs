// src/modules/servers/update.rs

use crate::core::response;
use crate::modules::docker::{create, inspect, ps};
use crate::modules::servers::deploy;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use rand::RngCore;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateRequest {
    pub env: BTreeMap<String, String>,
    pub port: Option<u16>,
}

// Env edits that would wedge the JVM get rewritten rather than rejected.
pub fn guard_env_value(key: &str, value: &str, java_version: &str) -> String {
    if key == "JVM_OPTS" && java_version == "8" {
        return value.replace("-XX:+UseZGC", "-XX:+UseG1GC");
    }
    value.to_string()
}

// POST /v1/servers/{id}/update
//
// Containers are immutable; an edit is stop + remove + create with the same
// name, image and data mount, merged env and the requested port.
pub async fn update_handler(Path(id): Path<String>, Json(req): Json<UpdateRequest>) -> Response {
    let Some(detail) = inspect::inspect_fresh(&id).await else {
        return response::error(StatusCode::NOT_FOUND, "Container not found");
    };

    let name = detail.container_name();
    let image = detail.config.image.clone();
    let java_version = detail.detected_java();

    let Some(data_dir) = detail.data_dir() else {
        return response::error(StatusCode::INTERNAL_SERVER_ERROR, "Could not find /data mount");
    };

    let mut env: BTreeMap<String, String> = detail.env_map().into_iter().collect();
    for (key, value) in &req.env {
        env.insert(key.clone(), guard_env_value(key, value, &java_version));
    }

    // The image picks its own JDK from the tag.
    env.remove("JAVA_VERSION");

    let port = req.port.unwrap_or_else(|| detail.game_host_port());
    env.insert("SERVER_PORT".into(), port.to_string());
    env.insert("QUERY_PORT".into(), port.to_string());
    env.entry("ENABLE_QUERY".into()).or_insert_with(|| "TRUE".into());

    // Player management needs RCON; older containers may predate it.
    if env.get("RCON_PASSWORD").map(|p| p.is_empty()).unwrap_or(true) {
        let mut buf = [0u8; 6];
        rand::thread_rng().fill_bytes(&mut buf);
        let password: String = buf.iter().map(|b| format!("{:02x}", b)).collect();
        env.insert("RCON_PASSWORD".into(), password);
        env.entry("RCON_PORT".into()).or_insert_with(|| "25575".into());
        env.insert("ENABLE_RCON".into(), "TRUE".into());
    }

    let icon = env.get("ICON").cloned().unwrap_or_default();

    let _ = create::lifecycle(&id, "stop").await;
    if let Err(e) = create::remove(&id, true).await {
        return response::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to remove old container: {}", e),
        );
    }

    let spec = create::CreateSpec {
        name: name.clone(),
        image: image.clone(),
        env,
        labels: deploy::build_labels(&image, &icon),
        host_port: port,
        container_port: ps::GAME_PORT,
        data_dir,
    };

    match create::create_and_start(&spec).await {
        Ok(_) => response::success(Some(json!({ "message": "Server updated successfully" }))),
        Err(e) => response::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to recreate server: {}", e),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zgc_is_rewritten_on_java8_only() {
        assert_eq!(
            guard_env_value("JVM_OPTS", "-Xmx4G -XX:+UseZGC", "8"),
            "-Xmx4G -XX:+UseG1GC"
        );
        assert_eq!(
            guard_env_value("JVM_OPTS", "-Xmx4G -XX:+UseZGC", "21"),
            "-Xmx4G -XX:+UseZGC"
        );
        assert_eq!(guard_env_value("MEMORY", "8G", "8"), "8G");
    }
}
