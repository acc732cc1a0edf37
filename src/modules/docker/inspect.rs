// src/modules/docker/inspect.rs

use super::unix;
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerDetail {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Image", default)]
    pub image_id: String,
    #[serde(rename = "Config")]
    pub config: ContainerConfig,
    #[serde(rename = "HostConfig", default)]
    pub host_config: HostConfig,
    #[serde(rename = "Mounts", default)]
    pub mounts: Vec<Mount>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerConfig {
    #[serde(rename = "Image", default)]
    pub image: String,
    #[serde(rename = "Env", default)]
    pub env: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostConfig {
    #[serde(rename = "PortBindings", default)]
    pub port_bindings: HashMap<String, Vec<HostPort>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostPort {
    #[serde(rename = "HostPort", default)]
    pub host_port: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Mount {
    #[serde(rename = "Source", default)]
    pub source: String,
    #[serde(rename = "Destination", default)]
    pub destination: String,
}

impl ContainerDetail {
    pub fn container_name(&self) -> String {
        self.name.trim_start_matches('/').to_string()
    }

    // KEY=VALUE env entries as a lookup map.
    pub fn env_map(&self) -> HashMap<String, String> {
        parse_env_pairs(&self.config.env)
    }

    // Host path bind-mounted at /data, where the server keeps its world,
    // mods and agent metrics.
    pub fn data_dir(&self) -> Option<String> {
        self.mounts
            .iter()
            .find(|m| m.destination == "/data")
            .map(|m| m.source.clone())
    }

    pub fn game_host_port(&self) -> u16 {
        self.host_config
            .port_bindings
            .get("25565/tcp")
            .and_then(|binds| binds.first())
            .and_then(|b| b.host_port.parse().ok())
            .unwrap_or(25565)
    }

    // "itzg/minecraft-server:java21" -> "21"; plain tag -> "latest".
    pub fn detected_java(&self) -> String {
        match self.config.image.split_once(":java") {
            Some((_, ver)) if !ver.is_empty() => ver.to_string(),
            _ => "latest".to_string(),
        }
    }
}

pub fn parse_env_pairs(env: &[String]) -> HashMap<String, String> {
    env.iter()
        .filter_map(|e| e.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub async fn inspect(id: &str) -> Option<ContainerDetail> {
    let short: String = id.chars().take(12).collect();
    let body = unix::cached_request(
        &format!("/containers/{}/json", id),
        &format!("inspect_{}", short),
        Duration::from_secs(2),
    )
    .await
    .ok()?;
    serde_json::from_slice(&body).ok()
}

// Inspect fetched uncached, for flows that are about to mutate the container.
pub async fn inspect_fresh(id: &str) -> Option<ContainerDetail> {
    let body = unix::request(&format!("/containers/{}/json", id)).await.ok()?;
    serde_json::from_slice(&body).ok()
}

// Batched inspect keyed by id, short id and name, matching however callers
// address a container.
pub async fn inspect_many(ids: &[String]) -> HashMap<String, ContainerDetail> {
    let details = join_all(ids.iter().map(|id| inspect(id))).await;

    let mut map = HashMap::new();
    for detail in details.into_iter().flatten() {
        let short: String = detail.id.chars().take(12).collect();
        map.insert(detail.container_name(), detail.clone());
        map.insert(short, detail.clone());
        map.insert(detail.id.clone(), detail);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(image: &str, env: &[&str]) -> ContainerDetail {
        ContainerDetail {
            id: "aabbccddeeff00112233".into(),
            name: "/atm10-47a4db".into(),
            image_id: "sha256:11".into(),
            config: ContainerConfig {
                image: image.into(),
                env: env.iter().map(|e| e.to_string()).collect(),
            },
            host_config: HostConfig {
                port_bindings: HashMap::from([(
                    "25565/tcp".to_string(),
                    vec![HostPort { host_port: "25570".into() }],
                )]),
            },
            mounts: vec![Mount {
                source: "/mnt/user/appdata/atm10-47a4db".into(),
                destination: "/data".into(),
            }],
        }
    }

    #[test]
    fn env_map_splits_on_first_equals() {
        let d = detail("itzg/minecraft-server", &["JVM_OPTS=-Xmx4G -Dkey=value", "EULA=TRUE"]);
        let env = d.env_map();
        assert_eq!(env.get("JVM_OPTS").unwrap(), "-Xmx4G -Dkey=value");
        assert_eq!(env.get("EULA").unwrap(), "TRUE");
    }

    #[test]
    fn detects_java_tag_from_image() {
        assert_eq!(detail("itzg/minecraft-server:java21", &[]).detected_java(), "21");
        assert_eq!(detail("itzg/minecraft-server", &[]).detected_java(), "latest");
    }

    #[test]
    fn finds_data_mount_and_port() {
        let d = detail("itzg/minecraft-server", &[]);
        assert_eq!(d.data_dir().unwrap(), "/mnt/user/appdata/atm10-47a4db");
        assert_eq!(d.game_host_port(), 25570);
    }
}
