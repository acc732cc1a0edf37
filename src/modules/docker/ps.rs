// src/modules/docker/ps.rs

use super::unix;
use serde::Deserialize;
use std::collections::HashMap;
use std::process::Command;
use std::time::Duration;

pub const MANAGED_LABEL: &str = "moddock";
pub const GAME_PORT: u16 = 25565;

// check if docker command exists
pub fn is_docker_installed() -> bool {
    Command::new("which")
        .arg("docker")
        .status()
        .map_or(false, |status| status.success())
}

// check if docker daemon is running via unix socket ping
pub async fn is_docker_running() -> bool {
    match unix::request("/_ping").await {
        Ok(body) => String::from_utf8(body.to_vec()).unwrap_or_default().trim() == "OK",
        Err(_) => false,
    }
}

// One entry of GET /containers/json.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerSummary {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Names", default)]
    pub names: Vec<String>,
    #[serde(rename = "Image", default)]
    pub image: String,
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Labels", default)]
    pub labels: HashMap<String, String>,
    #[serde(rename = "Ports", default)]
    pub ports: Vec<PortBinding>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortBinding {
    #[serde(rename = "PrivatePort")]
    pub private_port: u16,
    #[serde(rename = "PublicPort", default)]
    pub public_port: Option<u16>,
    #[serde(rename = "Type", default)]
    pub proto: String,
}

impl ContainerSummary {
    pub fn name(&self) -> String {
        self.names
            .first()
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_else(|| self.id.chars().take(12).collect())
    }

    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running") || self.status.contains("Up")
    }

    // Host port mapped onto the Minecraft game port, default if unmapped.
    pub fn game_port(&self) -> u16 {
        self.ports
            .iter()
            .find(|p| p.private_port == GAME_PORT && p.proto == "tcp")
            .and_then(|p| p.public_port)
            .unwrap_or(GAME_PORT)
    }

    // A container is ours when it runs an itzg image, carries our label, or
    // was imported from a dockerman template pointing at an itzg repository.
    pub fn is_managed(&self) -> bool {
        if self.image.contains("itzg/") {
            return true;
        }
        if self.labels.get(MANAGED_LABEL).map(String::as_str) == Some("1") {
            return true;
        }
        self.labels
            .get("net.unraid.docker.repository")
            .map(|r| r.starts_with("itzg/"))
            .unwrap_or(false)
    }

    pub fn icon_label(&self) -> Option<String> {
        self.labels
            .get("net.unraid.docker.icon")
            .or_else(|| self.labels.get("moddock.icon"))
            .filter(|v| !v.is_empty())
            .cloned()
    }
}

// All containers, cached for 2 seconds against dashboard polling bursts.
pub async fn list_all() -> Vec<ContainerSummary> {
    let body = match unix::cached_request("/containers/json?all=true", "ps", Duration::from_secs(2))
        .await
    {
        Ok(body) => body,
        Err(_) => return Vec::new(),
    };
    serde_json::from_slice(&body).unwrap_or_default()
}

// Only the containers this plugin manages.
pub async fn list_managed() -> Vec<ContainerSummary> {
    list_all().await.into_iter().filter(|c| c.is_managed()).collect()
}

// Local image tag -> image id, used to flag pullable updates.
pub async fn local_image_ids() -> HashMap<String, String> {
    #[derive(Deserialize)]
    struct ImageSummary {
        #[serde(rename = "Id")]
        id: String,
        #[serde(rename = "RepoTags", default)]
        repo_tags: Vec<String>,
    }

    let body = match unix::cached_request("/images/json", "images", Duration::from_secs(30)).await {
        Ok(body) => body,
        Err(_) => return HashMap::new(),
    };
    let images: Vec<ImageSummary> = serde_json::from_slice(&body).unwrap_or_default();

    let mut map = HashMap::new();
    for image in images {
        for tag in image.repo_tags {
            map.insert(tag, image.id.clone());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(image: &str, labels: &[(&str, &str)]) -> ContainerSummary {
        ContainerSummary {
            id: "0123456789abcdef".into(),
            names: vec!["/atm10-47a4db".into()],
            image: image.into(),
            state: "running".into(),
            status: "Up 3 hours".into(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ports: vec![PortBinding {
                private_port: 25565,
                public_port: Some(25566),
                proto: "tcp".into(),
            }],
        }
    }

    #[test]
    fn itzg_image_is_managed() {
        assert!(summary("itzg/minecraft-server:java21", &[]).is_managed());
    }

    #[test]
    fn label_marks_managed_even_with_foreign_image() {
        assert!(summary("sha256:deadbeef", &[("moddock", "1")]).is_managed());
        assert!(summary(
            "sha256:deadbeef",
            &[("net.unraid.docker.repository", "itzg/minecraft-server")]
        )
        .is_managed());
        assert!(!summary("nginx:latest", &[]).is_managed());
    }

    #[test]
    fn game_port_prefers_tcp_mapping() {
        let c = summary("itzg/minecraft-server", &[]);
        assert_eq!(c.game_port(), 25566);
        let unmapped = ContainerSummary {
            ports: vec![],
            ..summary("itzg/minecraft-server", &[])
        };
        assert_eq!(unmapped.game_port(), 25565);
    }

    #[test]
    fn name_strips_leading_slash() {
        assert_eq!(summary("itzg/minecraft-server", &[]).name(), "atm10-47a4db");
    }
}
