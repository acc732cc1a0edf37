// src/modules/metadata/store.rs

use crate::common::env::CONFIG;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

// Per-server record, written at deploy time and backfilled for adopted
// containers. Field aliases absorb the key spellings older records used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub id: String,
    pub name: String,
    #[serde(alias = "modpackName")]
    pub modpack: String,
    pub slug: String,
    pub platform: String,
    #[serde(rename = "containerName")]
    pub container_name: String,
    #[serde(rename = "modpackId")]
    pub modpack_id: String,
    #[serde(rename = "modpackVersion")]
    pub modpack_version: String,
    #[serde(alias = "gameVersion")]
    pub mc_version: String,
    pub loader: String,
    #[serde(alias = "icon", alias = "icon_url")]
    pub logo: String,
    pub memory: String,
    pub port: u16,
    #[serde(rename = "maxPlayers")]
    pub max_players: u32,
    pub backfilled: bool,
}

// One installed mod as remembered by the plugin (not the jar scanner).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstalledMod {
    #[serde(rename = "modId")]
    pub mod_id: Value,
    pub name: String,
    pub platform: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "fileId")]
    pub file_id: Value,
    pub logo: String,
    pub author: String,
    pub summary: String,
    #[serde(rename = "mcVersion")]
    pub mc_version: String,
    #[serde(rename = "installedAt")]
    pub installed_at: i64,
}

pub type InstalledMods = HashMap<String, InstalledMod>;

// Reconciled version/loader snapshot, kept so page loads never wait on the
// catalog APIs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataCache {
    #[serde(rename = "mcVersion")]
    pub mc_version: String,
    pub loader: String,
    #[serde(rename = "modpackVersion")]
    pub modpack_version: String,
    #[serde(rename = "lastUpdated")]
    pub last_updated: i64,
}

fn servers_dir() -> PathBuf {
    PathBuf::from(CONFIG.servers_dir())
}

// Stable directory key for ids that are not filesystem-safe.
pub fn record_key(raw: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(raw.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> bool {
    if let Some(dir) = path.parent() {
        if fs::create_dir_all(dir).is_err() {
            return false;
        }
    }
    match serde_json::to_string_pretty(value) {
        Ok(json) => fs::write(path, json).is_ok(),
        Err(_) => false,
    }
}

// --- Server records ---

pub fn load_all_configs() -> Vec<ServerConfig> {
    let mut configs = Vec::new();
    let Ok(entries) = fs::read_dir(servers_dir()) else {
        return configs;
    };
    for entry in entries.flatten() {
        let path = entry.path().join("config.json");
        if let Some(cfg) = read_json::<ServerConfig>(&path) {
            if !cfg.container_name.is_empty() {
                configs.push(cfg);
            }
        }
    }
    configs
}

pub fn configs_by_container() -> HashMap<String, ServerConfig> {
    load_all_configs()
        .into_iter()
        .map(|c| (c.container_name.clone(), c))
        .collect()
}

pub fn find_config(id_or_name: &str) -> Option<ServerConfig> {
    load_all_configs()
        .into_iter()
        .find(|c| c.id == id_or_name || c.container_name == id_or_name)
}

pub fn save_config(cfg: &ServerConfig) -> bool {
    let dir_key = if cfg.id.is_empty() {
        record_key(&cfg.container_name)
    } else {
        cfg.id.clone()
    };
    write_json(&servers_dir().join(dir_key).join("config.json"), cfg)
}

// Removes the record directory belonging to a server id or container name.
pub fn delete_record(id_or_name: &str) {
    if let Some(cfg) = find_config(id_or_name) {
        if !cfg.id.is_empty() {
            let _ = fs::remove_dir_all(servers_dir().join(&cfg.id));
        }
        let _ = fs::remove_dir_all(servers_dir().join(record_key(&cfg.container_name)));
    }
    let _ = fs::remove_dir_all(servers_dir().join(record_key(id_or_name)));
}

// --- Installed mods ---

fn installed_path(server_id: &str) -> PathBuf {
    servers_dir().join(server_id).join("installed_mods.json")
}

pub fn load_installed(server_id: &str) -> InstalledMods {
    read_json(&installed_path(server_id)).unwrap_or_default()
}

pub fn save_installed(server_id: &str, mods: &InstalledMods) -> bool {
    write_json(&installed_path(server_id), mods)
}

pub fn remember_installed(server_id: &str, entry: InstalledMod) {
    let mut mods = load_installed(server_id);
    let key = match &entry.mod_id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    mods.insert(key, entry);
    save_installed(server_id, &mods);
}

// --- Metadata cache ---

fn metadata_path(container_name: &str) -> PathBuf {
    servers_dir()
        .join(record_key(container_name))
        .join("metadata_v1.json")
}

pub fn load_metadata_cache(container_name: &str) -> Option<MetadataCache> {
    read_json(&metadata_path(container_name))
}

pub fn save_metadata_cache(container_name: &str, cache: &MetadataCache) {
    write_json(&metadata_path(container_name), cache);
}

// --- Jar scan caches ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanCache {
    pub timestamp: i64,
    #[serde(rename = "serverId")]
    pub server_id: String,
    pub mods: Vec<Value>,
}

pub fn load_scan_cache(server_id: &str, max_age_secs: i64) -> Option<ScanCache> {
    let path = servers_dir().join(record_key(server_id)).join("mods_cache.json");
    let cache: ScanCache = read_json(&path)?;
    if Utc::now().timestamp() - cache.timestamp < max_age_secs {
        Some(cache)
    } else {
        None
    }
}

pub fn save_scan_cache(server_id: &str, mods: &[Value]) {
    let cache = ScanCache {
        timestamp: Utc::now().timestamp(),
        server_id: server_id.to_string(),
        mods: mods.to_vec(),
    };
    write_json(
        &servers_dir().join(record_key(server_id)).join("mods_cache.json"),
        &cache,
    );
}

pub fn save_updates_cache(server_id: &str, mods: &[Value]) {
    let cache = ScanCache {
        timestamp: Utc::now().timestamp(),
        server_id: server_id.to_string(),
        mods: mods.to_vec(),
    };
    write_json(
        &servers_dir().join(record_key(server_id)).join("mods_updates.json"),
        &cache,
    );
}

// --- Global mod dictionary ---

fn dictionary_path() -> PathBuf {
    PathBuf::from(&CONFIG.appdata_dir).join("moddock/mod_ids.json")
}

pub fn load_mod_dictionary() -> HashMap<String, Value> {
    read_json(&dictionary_path()).unwrap_or_default()
}

pub fn save_mod_dictionary(dict: &HashMap<String, Value>) {
    write_json(&dictionary_path(), dict);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_key_is_stable_hex() {
        let a = record_key("atm10-47a4db");
        let b = record_key("atm10-47a4db");
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn server_config_accepts_legacy_keys() {
        let legacy = r#"{
            "id": "abc",
            "containerName": "atm10-47a4db",
            "gameVersion": "1.21.1",
            "loader": "neoforge",
            "modpackId": "925200",
            "icon": "https://media.forgecdn.net/atm.png"
        }"#;
        let cfg: ServerConfig = serde_json::from_str(legacy).unwrap();
        assert_eq!(cfg.mc_version, "1.21.1");
        assert_eq!(cfg.logo, "https://media.forgecdn.net/atm.png");
        assert_eq!(cfg.modpack_id, "925200");
    }

    #[test]
    fn installed_mods_round_trip() {
        let entry = InstalledMod {
            mod_id: Value::from(238222),
            name: "Just Enough Items".into(),
            platform: "curseforge".into(),
            file_name: "jei-1.21.1.jar".into(),
            file_id: Value::from(5846909),
            installed_at: 1700000000,
            ..Default::default()
        };
        let json = serde_json::to_string(&entry).unwrap();
        let back: InstalledMod = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "Just Enough Items");
        assert_eq!(back.file_name, "jei-1.21.1.jar");
    }
}
