// src/modules/servers/control.rs

use crate::common::env::CONFIG;
use crate::common::log::{log, LogLevel};
use crate::core::response;
use crate::modules::docker::{create, inspect};
use crate::modules::metadata::store;
use crate::modules::servers::container_data_dir;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::json;
use std::fs;
use std::path::Path as FsPath;

// POST /v1/servers/{id}/control/{cmd}
pub async fn control_handler(Path((id, cmd)): Path<(String, String)>) -> Response {
    if !matches!(cmd.as_str(), "start" | "stop" | "restart") {
        return response::bad_request("Invalid command");
    }

    match create::lifecycle(&id, &cmd).await {
        Ok(()) => response::success(Some(json!({
            "message": format!("Server {} command executed", cmd),
        }))),
        Err(e) => response::error(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

// DELETE /v1/servers/{id}
//
// Resolves paths before the container disappears, then removes container,
// appdata and the plugin's own record.
pub async fn delete_handler(Path(id): Path<String>) -> Response {
    let data_dir = container_data_dir(&id).await;
    let container_name = inspect::inspect(&id)
        .await
        .map(|d| d.container_name())
        .unwrap_or_else(|| id.clone());

    let _ = create::lifecycle(&id, "stop").await;
    if let Err(e) = create::remove(&id, true).await {
        return response::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to remove container: {}", e),
        );
    }

    // Only ever delete under the appdata root, whatever inspect reported.
    let mut data_deleted = false;
    if let Some(dir) = &data_dir {
        let inside_appdata = FsPath::new(dir)
            .canonicalize()
            .map(|p| p.starts_with(&CONFIG.appdata_dir))
            .unwrap_or(false);
        if inside_appdata && FsPath::new(dir).is_dir() {
            data_deleted = fs::remove_dir_all(dir).is_ok();
        }
    }

    store::delete_record(&id);
    store::delete_record(&container_name);

    log(LogLevel::Info, &format!("✓ Deleted server {}", container_name));
    response::success(Some(json!({
        "message": "Server and data deleted",
        "data_deleted": data_deleted,
    })))
}
