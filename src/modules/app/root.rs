// src/modules/app/root.rs

use crate::common::log;
use crate::core::response;
use axum::response::Response;
use chrono::Local;
use serde_json::json;
use std::fs;

// Handles requests to the root endpoint and returns project information.
pub async fn get_root_handler() -> Response {
    let cargo_version = env!("CARGO_PKG_VERSION");

    let response_data = json!({
        "name": "Moddock",
        "version": cargo_version,
        "description": "Modded Minecraft server manager for docker hosts",
    });

    response::success(Some(response_data))
}

// GET /v1/ping
pub async fn get_ping_handler() -> Response {
    response::success(Some(json!({
        "message": "API is working!",
        "time": Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    })))
}

// GET /v1/logs — this run's service log, for the dashboard's debug panel.
pub async fn get_logs_handler() -> Response {
    let content = log::get_log_path()
        .and_then(|path| fs::read_to_string(path).ok())
        .unwrap_or_default();

    response::success(Some(json!({
        "log": if content.is_empty() { "No logs found".to_string() } else { content },
    })))
}
