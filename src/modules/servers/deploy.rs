// src/modules/servers/deploy.rs

use crate::common::env::CONFIG;
use crate::common::log::{log, LogLevel};
use crate::core::response;
use crate::modules::catalog::resolve;
use crate::modules::docker::{create, ps};
use crate::modules::metadata::store::{self, ServerConfig};
use crate::modules::settings::handlers::{bool_input, Settings};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use rand::RngCore;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;

pub const DEFAULT_IMAGE: &str = "itzg/minecraft-server";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeployRequest {
    pub modpack_id: u64,
    pub modpack_file_id: Option<u64>,
    pub modpack_name: String,
    pub modpack_slug: String,
    pub server_name: String,
    pub mc_version: String,
    pub loader: String,
    pub port: Option<u16>,
    pub server_ip: String,
    pub memory: String,
    pub max_players: Option<u32>,
    pub jvm_flags: String,
    pub whitelist: String,
    pub icon_url: String,
    pub java_version: String,
    pub pvp: Option<Value>,
    pub hardcore: Option<Value>,
    pub allow_flight: Option<Value>,
    pub command_blocks: Option<Value>,
    pub rolling_logs: Option<Value>,
    pub log_timestamp: Option<Value>,
    pub aikar_flags: Option<Value>,
    pub meowice_flags: Option<Value>,
    pub graalvm_flags: Option<Value>,
}

// Container names must satisfy the daemon's [a-zA-Z0-9_.-] rule.
pub fn safe_container_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "minecraft-server".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn slugify(value: &str) -> String {
    let lowered: String = value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    lowered.trim_matches('-').to_string()
}

// Six hex chars derived from the deploy identity, so re-deploying the same
// pack yields distinct container names.
pub fn unique_suffix(file_id: u64, modpack_id: u64, server_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}-{}-{}", file_id, modpack_id, server_id));
    let digest = hasher.finalize();
    digest[..3].iter().map(|b| format!("{:02x}", b)).collect()
}

// First host port >= start not already mapped onto a game port, probing up
// to 100 increments before giving up and returning the start.
pub fn find_available_port(start: u16, containers: &[ps::ContainerSummary]) -> u16 {
    let used: std::collections::HashSet<u16> = containers
        .iter()
        .flat_map(|c| c.ports.iter())
        .filter(|p| p.private_port == ps::GAME_PORT && p.proto == "tcp")
        .filter_map(|p| p.public_port)
        .collect();

    let mut port = start;
    for _ in 0..100 {
        if port >= 1 && !used.contains(&port) {
            return port;
        }
        port = match port.checked_add(1) {
            Some(p) => p,
            None => return start,
        };
    }
    start
}

pub fn image_for_java(java_version: &str) -> String {
    match java_version {
        "21" | "17" | "11" | "8" => format!("{}:java{}", DEFAULT_IMAGE, java_version),
        _ => DEFAULT_IMAGE.to_string(),
    }
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{:02x}", b)).collect()
}

fn flag(input: &Option<Value>, settings: &Settings, key: &str) -> bool {
    bool_input(input.as_ref(), settings.bool(key))
}

// Builds the itzg/minecraft-server environment contract for one deploy.
pub fn build_env(
    req: &DeployRequest,
    settings: &Settings,
    api_key: &str,
    slug: &str,
    server_name: &str,
    file_id: u64,
    port: u16,
) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();

    let memory = if req.memory.is_empty() {
        settings.get("default_memory").to_string()
    } else {
        req.memory.clone()
    };
    let server_ip = if req.server_ip.is_empty() {
        let default = settings.get("default_ip");
        if default.is_empty() { "0.0.0.0".to_string() } else { default.to_string() }
    } else {
        req.server_ip.clone()
    };
    let max_players = req
        .max_players
        .unwrap_or_else(|| settings.get("default_max_players").parse().unwrap_or(20));
    let whitelist = if req.whitelist.is_empty() {
        settings.get("default_whitelist").to_string()
    } else {
        req.whitelist.clone()
    };
    let icon = if req.icon_url.is_empty() {
        settings.get("default_icon_url").to_string()
    } else {
        req.icon_url.clone()
    };
    let mut jvm_opts = if req.jvm_flags.is_empty() {
        settings.get("jvm_flags").to_string()
    } else {
        req.jvm_flags.clone()
    };

    let on_off = |b: bool| if b { "TRUE" } else { "FALSE" };

    env.insert("EULA".into(), "TRUE".into());
    env.insert("TYPE".into(), "AUTO_CURSEFORGE".into());
    env.insert("CF_API_KEY".into(), api_key.to_string());
    env.insert(
        "CF_SLUG".into(),
        if slug.is_empty() { server_name.to_string() } else { slug.to_string() },
    );
    if file_id > 0 {
        env.insert("CF_FILE_ID".into(), file_id.to_string());
    }
    env.insert("MEMORY".into(), memory);
    env.insert("SERVER_NAME".into(), server_name.to_string());
    env.insert("SERVER_IP".into(), server_ip);
    env.insert("SERVER_PORT".into(), port.to_string());
    env.insert("ENABLE_QUERY".into(), "TRUE".into());
    env.insert("QUERY_PORT".into(), port.to_string());
    env.insert("MAX_PLAYERS".into(), max_players.to_string());
    env.insert(
        "ENABLE_WHITELIST".into(),
        on_off(!whitelist.is_empty()).into(),
    );
    env.insert("WHITELIST".into(), whitelist);
    env.insert("ICON".into(), icon);
    env.insert("PVP".into(), on_off(flag(&req.pvp, settings, "default_pvp")).into());
    env.insert(
        "HARDCORE".into(),
        on_off(flag(&req.hardcore, settings, "default_hardcore")).into(),
    );
    env.insert(
        "ALLOW_FLIGHT".into(),
        on_off(flag(&req.allow_flight, settings, "default_allow_flight")).into(),
    );
    env.insert(
        "ENABLE_COMMAND_BLOCK".into(),
        on_off(flag(&req.command_blocks, settings, "default_command_blocks")).into(),
    );
    env.insert(
        "ENABLE_ROLLING_LOGS".into(),
        on_off(flag(&req.rolling_logs, settings, "default_rolling_logs")).into(),
    );
    env.insert(
        "USE_LOG_TIMESTAMP".into(),
        on_off(flag(&req.log_timestamp, settings, "default_log_timestamp")).into(),
    );
    env.insert(
        "USE_AIKAR_FLAGS".into(),
        on_off(flag(&req.aikar_flags, settings, "default_aikar_flags")).into(),
    );

    // The "MeowIce" flag set boils down to the modern collector, which Java 8
    // does not ship.
    if flag(&req.meowice_flags, settings, "default_meowice_flags") {
        let gc = if req.java_version == "8" { "-XX:+UseG1GC" } else { "-XX:+UseZGC" };
        jvm_opts = format!("{} {}", jvm_opts, gc).trim().to_string();
    }
    env.insert("JVM_OPTS".into(), jvm_opts);

    if flag(&req.graalvm_flags, settings, "default_graalvm_flags") {
        env.insert("USE_GRAALVM_JDK".into(), "TRUE".into());
    }

    // RCON backs the console and player management; enable it always.
    env.insert("RCON_PASSWORD".into(), random_hex(6));
    env.insert("RCON_PORT".into(), "25575".into());
    env.insert("ENABLE_RCON".into(), "TRUE".into());

    env
}

pub fn build_labels(image: &str, icon: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(ps::MANAGED_LABEL.to_string(), "1".to_string());
    labels.insert("net.unraid.docker.managed".to_string(), "dockerman".to_string());
    labels.insert("net.unraid.docker.repository".to_string(), image.to_string());
    if !icon.is_empty() {
        labels.insert("net.unraid.docker.icon".to_string(), icon.to_string());
        labels.insert("moddock.icon".to_string(), icon.to_string());
    }
    labels
}

// POST /v1/servers
pub async fn deploy_handler(Json(req): Json<DeployRequest>) -> Response {
    let settings = Settings::load();
    let api_key = settings.curseforge_api_key();
    if api_key.is_empty() {
        return response::bad_request("CurseForge API key not configured");
    }
    if req.modpack_id == 0 {
        return response::bad_request("Missing modpack_id");
    }

    let server_id = random_hex(8);
    let server_name = if req.server_name.trim().is_empty() {
        settings.get("default_server_name").to_string()
    } else {
        req.server_name.trim().to_string()
    };
    let slug = slugify(&req.modpack_slug);

    let suffix = unique_suffix(req.modpack_file_id.unwrap_or(0), req.modpack_id, &server_id);
    let base = if slug.is_empty() { server_name.clone() } else { slug.clone() };
    let container_name = safe_container_name(&format!("{}-{}", base, suffix));

    let containers = ps::list_all().await;
    if containers.iter().any(|c| c.name() == container_name) {
        return response::error(
            StatusCode::CONFLICT,
            "A container with this name already exists",
        );
    }

    let requested_port = req
        .port
        .or_else(|| settings.get("default_port").parse().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(25565);
    let port = find_available_port(requested_port, &containers);

    // Resolve the server pack before touching the host.
    let Some((file_id, _download_url)) =
        resolve::server_pack_download(req.modpack_id, &api_key, req.modpack_file_id).await
    else {
        log(
            LogLevel::Warn,
            &format!("! No server pack for modpack {}", req.modpack_id),
        );
        return response::error(
            StatusCode::BAD_GATEWAY,
            "Could not resolve modpack download URL. Check CurseForge API key and network, or choose a different version.",
        );
    };

    let data_dir = format!("{}/{}", CONFIG.appdata_dir, container_name);
    if let Err(e) = fs::create_dir_all(&data_dir) {
        return response::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to create data directory: {}", e),
        );
    }

    let env = build_env(&req, &settings, &api_key, &slug, &server_name, file_id, port);
    let icon = env.get("ICON").cloned().unwrap_or_default();
    let image = image_for_java(&req.java_version);

    let spec = create::CreateSpec {
        name: container_name.clone(),
        image: image.clone(),
        env,
        labels: build_labels(&image, &icon),
        host_port: port,
        container_port: ps::GAME_PORT,
        data_dir: data_dir.clone(),
    };

    let container_id = match create::create_and_start(&spec).await {
        Ok(id) => id,
        Err(e) => {
            log(LogLevel::Error, &format!("✗ Deploy failed: {}", e));
            return response::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to create container: {}", e),
            );
        }
    };

    let record = ServerConfig {
        id: server_id.clone(),
        name: server_name.clone(),
        modpack: if req.modpack_name.is_empty() { server_name.clone() } else { req.modpack_name.clone() },
        slug,
        platform: "curseforge".to_string(),
        container_name: container_name.clone(),
        modpack_id: req.modpack_id.to_string(),
        modpack_version: file_id.to_string(),
        mc_version: req.mc_version.clone(),
        loader: req.loader.to_lowercase(),
        logo: icon,
        memory: spec.env.get("MEMORY").cloned().unwrap_or_default(),
        port,
        max_players: spec
            .env
            .get("MAX_PLAYERS")
            .and_then(|m| m.parse().ok())
            .unwrap_or(20),
        backfilled: false,
    };
    store::save_config(&record);

    response::success(Some(json!({
        "id": server_id,
        "containerId": container_id,
        "containerName": container_name,
        "port": port,
        "image": image,
        "message": "Server deployed",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container_with_port(port: u16) -> ps::ContainerSummary {
        serde_json::from_value(json!({
            "Id": "c1",
            "Names": ["/x"],
            "Image": "itzg/minecraft-server",
            "Ports": [{ "PrivatePort": 25565, "PublicPort": port, "Type": "tcp" }],
        }))
        .unwrap()
    }

    #[test]
    fn safe_names_replace_forbidden_chars() {
        assert_eq!(safe_container_name("All The Mods 10!"), "All-The-Mods-10");
        assert_eq!(safe_container_name("---"), "minecraft-server");
        assert_eq!(safe_container_name("ok_name.v2"), "ok_name.v2");
    }

    #[test]
    fn slugify_collapses_to_lower_kebab() {
        assert_eq!(slugify("All the Mods 10"), "all-the-mods-10");
        assert_eq!(slugify("-Crazy Craft-"), "crazy-craft");
    }

    #[test]
    fn suffix_is_six_hex_and_identity_sensitive() {
        let a = unique_suffix(100, 200, "abc");
        let b = unique_suffix(100, 200, "abc");
        let c = unique_suffix(101, 200, "abc");
        assert_eq!(a.len(), 6);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn port_scan_skips_taken_ports() {
        let containers = vec![container_with_port(25565), container_with_port(25566)];
        assert_eq!(find_available_port(25565, &containers), 25567);
        assert_eq!(find_available_port(30000, &containers), 30000);
    }

    #[test]
    fn image_tag_follows_java_selection() {
        assert_eq!(image_for_java("21"), "itzg/minecraft-server:java21");
        assert_eq!(image_for_java(""), "itzg/minecraft-server");
        assert_eq!(image_for_java("latest"), "itzg/minecraft-server");
    }
}
