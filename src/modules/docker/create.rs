// src/modules/docker/create.rs

use super::unix;
use crate::common::log::{log, LogLevel};
use serde_json::json;
use std::collections::BTreeMap;

// Everything needed to materialize a managed server container. The field
// set mirrors the docker run flags the plugin has always used: name, image,
// env, labels, one game port mapping, the /data bind and a restart policy.
pub struct CreateSpec {
    pub name: String,
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub host_port: u16,
    pub container_port: u16,
    pub data_dir: String,
}

impl CreateSpec {
    fn body(&self) -> serde_json::Value {
        let env: Vec<String> = self
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        let port_key = format!("{}/tcp", self.container_port);

        let mut exposed = serde_json::Map::new();
        exposed.insert(port_key.clone(), json!({}));

        let mut bindings = serde_json::Map::new();
        bindings.insert(
            port_key,
            json!([{ "HostPort": self.host_port.to_string() }]),
        );

        json!({
            "Image": self.image,
            "Env": env,
            "Labels": self.labels,
            "ExposedPorts": exposed,
            "HostConfig": {
                "Binds": [format!("{}:/data", self.data_dir)],
                "PortBindings": bindings,
                "RestartPolicy": { "Name": "unless-stopped" }
            }
        })
    }
}

// POST /containers/create + /start. Returns the new container id.
pub async fn create_and_start(spec: &CreateSpec) -> Result<String, String> {
    let path = format!("/containers/create?name={}", spec.name);
    let (status, body) = unix::post(&path, Some(spec.body()))
        .await
        .map_err(|e| format!("Docker socket unavailable: {}", e))?;

    if !status.is_success() {
        return Err(unix::daemon_error_message(&body));
    }

    let id = serde_json::from_slice::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("Id").and_then(|i| i.as_str()).map(str::to_string))
        .ok_or_else(|| "Daemon returned no container id".to_string())?;

    lifecycle(&id, "start").await?;
    log(LogLevel::Info, &format!("✓ Created container {} ({})", spec.name, &id[..12]));
    Ok(id)
}

// POST /containers/{id}/{start|stop|restart|kill}.
pub async fn lifecycle(id: &str, action: &str) -> Result<(), String> {
    let path = format!("/containers/{}/{}", id, action);
    let (status, body) = unix::post(&path, None)
        .await
        .map_err(|e| format!("Docker socket unavailable: {}", e))?;

    // 304 means "already in that state", which is fine for our callers.
    if status.is_success() || status.as_u16() == 304 {
        Ok(())
    } else {
        Err(unix::daemon_error_message(&body))
    }
}

pub async fn remove(id: &str, force: bool) -> Result<(), String> {
    let path = format!("/containers/{}?force={}", id, force);
    let (status, body) = unix::delete(&path)
        .await
        .map_err(|e| format!("Docker socket unavailable: {}", e))?;

    if status.is_success() {
        Ok(())
    } else {
        Err(unix::daemon_error_message(&body))
    }
}
