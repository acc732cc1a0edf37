// src/modules/servers/details.rs

use crate::core::response;
use crate::modules::docker::inspect;
use crate::modules::metadata::reconcile;
use crate::modules::settings::handlers::Settings;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::json;

// GET /v1/servers/{id}
pub async fn details_handler(Path(id): Path<String>) -> Response {
    let Some(detail) = inspect::inspect(&id).await else {
        return response::error(StatusCode::NOT_FOUND, "Failed to inspect container");
    };

    let container_name = detail.container_name();
    let mut env = detail.env_map();
    env.insert("JAVA_VERSION_DETECTED".to_string(), detail.detected_java());

    let max_players = env.get("MAX_PLAYERS").and_then(|m| m.parse::<u32>().ok());

    let api_key = Settings::load().curseforge_api_key();
    let metadata = reconcile::server_metadata(&env, &container_name, &api_key).await;

    response::success(Some(json!({
        "id": detail.id,
        "name": container_name,
        "env": env,
        "mcVersion": metadata.mc_version,
        "loader": metadata.loader,
        "maxPlayers": max_players,
        "port": detail.game_host_port(),
        "image": detail.config.image,
        "metadata_debug": metadata.debug,
    })))
}
