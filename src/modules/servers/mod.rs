// src/modules/servers/mod.rs

pub mod backups;
pub mod console;
pub mod control;
pub mod deploy;
pub mod details;
pub mod list;
pub mod players;
pub mod update;

use crate::common::env::CONFIG;
use crate::modules::docker::inspect;
use std::path::Path;

// Host directory bind-mounted at /data for a container, preferring what the
// daemon reports and falling back to the appdata convention.
pub async fn container_data_dir(id_or_name: &str) -> Option<String> {
    if let Some(detail) = inspect::inspect(id_or_name).await {
        if let Some(dir) = detail.data_dir() {
            if Path::new(&dir).is_dir() {
                return Some(dir);
            }
        }
        let fallback = format!("{}/{}", CONFIG.appdata_dir, detail.container_name());
        if Path::new(&fallback).is_dir() {
            return Some(fallback);
        }
    }
    let fallback = format!("{}/{}", CONFIG.appdata_dir, id_or_name);
    if Path::new(&fallback).is_dir() {
        return Some(fallback);
    }
    None
}

// Mods directory for a server, whether or not it exists yet.
pub async fn container_mods_dir(id_or_name: &str) -> Option<String> {
    container_data_dir(id_or_name)
        .await
        .map(|dir| format!("{}/mods", dir.trim_end_matches('/')))
}
