// src/modules/docker/hub.rs

use crate::core::response;
use crate::modules::catalog;
use crate::modules::docker::unix;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::json;

// Compares the registry's manifest digest for an image tag against the
// locally recorded repo digest. Returns None when the registry cannot be
// reached or the image has no comparable digest.
pub async fn check_image_update(image: &str, current_digest: &str) -> Option<bool> {
    let image = if image.contains('/') {
        image.to_string()
    } else {
        // Official images live under the library namespace.
        format!("library/{}", image)
    };
    let (repo, tag) = match image.split_once(':') {
        Some((r, t)) => (r.to_string(), t.to_string()),
        None => (image, "latest".to_string()),
    };

    let client = catalog::http_client();

    // 1. Anonymous pull token
    let token_url = format!(
        "https://auth.docker.io/token?service=registry.docker.io&scope=repository:{}:pull",
        repo
    );
    let token_payload: serde_json::Value = client
        .get(&token_url)
        .send()
        .await
        .ok()?
        .json()
        .await
        .ok()?;
    let token = token_payload.get("token")?.as_str()?.to_string();

    // 2. Manifest digest via HEAD; the digest rides in a response header.
    let manifest_url = format!("https://registry-1.docker.io/v2/{}/manifests/{}", repo, tag);
    let res = client
        .head(&manifest_url)
        .bearer_auth(token)
        .header(
            "Accept",
            "application/vnd.docker.distribution.manifest.v2+json, \
             application/vnd.docker.distribution.manifest.list.v2+json, \
             application/vnd.oci.image.manifest.v1+json",
        )
        .send()
        .await
        .ok()?;

    if !res.status().is_success() {
        return None;
    }

    let remote_digest = res
        .headers()
        .get("docker-content-digest")?
        .to_str()
        .ok()?
        .to_string();

    Some(remote_digest != current_digest)
}

// GET /v1/servers/{id}/hub-update
//
// Asks the registry whether a newer image exists than the one the container
// was pulled from. Distinct from the local-image comparison in the listing:
// this one works without a `docker pull` having happened.
pub async fn hub_update_handler(Path(id): Path<String>) -> Response {
    let Ok(raw) = unix::request(&format!("/containers/{}/json", id)).await else {
        return response::service_unavailable();
    };
    let Ok(inspect) = serde_json::from_slice::<serde_json::Value>(&raw) else {
        return response::error(StatusCode::NOT_FOUND, "Container not found");
    };

    let image = inspect
        .get("Config")
        .and_then(|c| c.get("Image"))
        .and_then(|i| i.as_str())
        .unwrap_or_default()
        .to_string();

    // RepoDigests carries the distribution digest ("repo@sha256:..."), the
    // only digest comparable with what the registry reports.
    let image_id = inspect
        .get("Image")
        .and_then(|i| i.as_str())
        .unwrap_or_default();
    let repo_digest = unix::request(&format!("/images/{}/json", image_id))
        .await
        .ok()
        .and_then(|body| serde_json::from_slice::<serde_json::Value>(&body).ok())
        .and_then(|img| {
            img.get("RepoDigests")?
                .as_array()?
                .first()?
                .as_str()
                .and_then(|d| d.split('@').nth(1))
                .map(str::to_string)
        });

    let Some(digest) = repo_digest else {
        return response::success(Some(json!({ "updateAvailable": null })));
    };

    response::success(Some(json!({
        "image": image,
        "updateAvailable": check_image_update(&image, &digest).await,
    })))
}
