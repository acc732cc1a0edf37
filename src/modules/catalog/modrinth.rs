// src/modules/catalog/modrinth.rs

use super::{format_downloads, http_client, Loader};
use crate::common::log::{log, LogLevel};
use serde::Deserialize;
use serde_json::{json, Value};

const API_BASE: &str = "https://api.modrinth.com/v2";

#[derive(Debug, Clone, Deserialize)]
pub struct MrVersionFile {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub hashes: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MrVersion {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version_number: String,
    #[serde(default)]
    pub version_type: String,
    #[serde(default)]
    pub game_versions: Vec<String>,
    #[serde(default)]
    pub loaders: Vec<String>,
    #[serde(default)]
    pub date_published: String,
    #[serde(default)]
    pub files: Vec<MrVersionFile>,
}

impl MrVersion {
    // The file a client should download: the marked primary, else the first
    // jar, else whatever is first.
    pub fn primary_file(&self) -> Option<&MrVersionFile> {
        self.files
            .iter()
            .find(|f| f.primary)
            .or_else(|| self.files.iter().find(|f| f.filename.ends_with(".jar")))
            .or_else(|| self.files.first())
    }

    // CurseForge encodes release/beta/alpha as 1/2/3; the dashboard renders
    // both catalogs through the same lens.
    pub fn release_type(&self) -> u8 {
        match self.version_type.as_str() {
            "release" => 1,
            "beta" => 2,
            _ => 3,
        }
    }
}

async fn get(path: &str) -> Option<Value> {
    let url = format!("{}{}", API_BASE, path);
    let res = http_client()
        .get(&url)
        .header("Accept", "application/json")
        .send()
        .await;

    match res {
        Ok(res) if res.status().is_success() => res.json().await.ok(),
        Ok(res) => {
            log(LogLevel::Debug, &format!("▪ MR HTTP {} for {}", res.status(), path));
            None
        }
        Err(e) => {
            log(LogLevel::Debug, &format!("▪ MR request failed: {}", e));
            None
        }
    }
}

// Loader facet values, widened for the ecosystems that share files: forge
// and neoforge are interchangeable targets, quilt servers load fabric mods.
fn loader_facet_values(loader: Loader) -> Vec<&'static str> {
    match loader {
        Loader::Forge | Loader::NeoForge => vec!["forge", "neoforge"],
        Loader::Fabric => vec!["fabric"],
        Loader::Quilt => vec!["quilt", "fabric"],
    }
}

fn build_facets(project_type: &str, version: &str, loader: Option<Loader>) -> String {
    let mut facets: Vec<Vec<String>> = vec![vec![format!("project_type:{}", project_type)]];
    if !version.is_empty() {
        facets.push(vec![format!("versions:{}", version)]);
    }
    if let Some(l) = loader {
        facets.push(
            loader_facet_values(l)
                .into_iter()
                .map(|v| format!("categories:{}", v))
                .collect(),
        );
    }
    serde_json::to_string(&facets).unwrap_or_else(|_| "[]".to_string())
}

// --- Search ---

pub async fn search(
    project_type: &str,
    query: &str,
    version: &str,
    loader: Option<Loader>,
    page: u32,
    page_size: u32,
) -> Option<(Vec<Value>, u64)> {
    let facets = build_facets(project_type, version, loader);
    let path = format!(
        "/search?query={}&limit={}&offset={}&index=relevance&facets={}",
        super::urlencode(query),
        page_size,
        (page - 1) * page_size,
        super::urlencode(&facets),
    );

    let payload = get(&path).await?;
    let total = payload.get("total_hits").and_then(|t| t.as_u64()).unwrap_or(0);
    let hits = payload.get("hits")?.as_array()?.clone();

    let listing = hits
        .iter()
        .map(|hit| {
            let downloads = hit.get("downloads").and_then(|d| d.as_u64()).unwrap_or(0);
            json!({
                "id": hit.get("project_id").cloned().unwrap_or(Value::Null),
                "name": hit.get("title").cloned().unwrap_or(Value::Null),
                "slug": hit.get("slug").cloned().unwrap_or(Value::Null),
                "author": hit.get("author").and_then(|a| a.as_str()).unwrap_or("Unknown"),
                "downloads": format_downloads(downloads),
                "downloadsRaw": downloads,
                "icon": hit.get("icon_url").and_then(|i| i.as_str()).unwrap_or(""),
                "summary": hit.get("description").and_then(|d| d.as_str()).unwrap_or(""),
                "mcVersion": if version.is_empty() { "Various" } else { version },
            })
        })
        .collect();

    Some((listing, total))
}

// --- Versions ---

pub async fn project_versions(
    project_id: &str,
    version: &str,
    loader: Option<Loader>,
) -> Vec<MrVersion> {
    let mut path = format!("/project/{}/version", project_id);
    let mut params = Vec::new();
    if !version.is_empty() {
        params.push(format!(
            "game_versions={}",
            super::urlencode(&format!("[\"{}\"]", version))
        ));
    }
    if let Some(l) = loader {
        let values: Vec<String> = loader_facet_values(l)
            .into_iter()
            .map(|v| format!("\"{}\"", v))
            .collect();
        params.push(format!(
            "loaders={}",
            super::urlencode(&format!("[{}]", values.join(",")))
        ));
    }
    if !params.is_empty() {
        path.push('?');
        path.push_str(&params.join("&"));
    }

    let Some(payload) = get(&path).await else {
        return Vec::new();
    };
    serde_json::from_value(payload).unwrap_or_default()
}

// Versions mapped into the CurseForge file shape the frontend renders.
pub async fn project_files(project_id: &str, version: &str, loader: Option<Loader>) -> Vec<Value> {
    project_versions(project_id, version, loader)
        .await
        .iter()
        .map(|ver| {
            let primary = ver.primary_file();
            json!({
                "id": ver.id,
                "displayName": if ver.name.is_empty() {
                    primary.map(|f| f.filename.clone()).unwrap_or_else(|| "Version".to_string())
                } else {
                    ver.name.clone()
                },
                "fileName": primary.map(|f| f.filename.clone()).unwrap_or_default(),
                "releaseType": ver.release_type(),
                "gameVersions": ver.game_versions.clone(),
                "downloadUrl": primary.map(|f| f.url.clone()).unwrap_or_default(),
            })
        })
        .collect()
}

pub async fn version_download(version_id: &str) -> Option<(String, Option<String>)> {
    let payload = get(&format!("/version/{}", version_id)).await?;
    let ver: MrVersion = serde_json::from_value(payload).ok()?;
    let file = ver.primary_file()?;
    let sha1 = file.hashes.get("sha1").cloned();
    Some((file.url.clone(), sha1))
}

pub async fn project(project_id: &str) -> Option<Value> {
    get(&format!("/project/{}", project_id)).await
}

pub async fn project_loaders(project_id: &str) -> Vec<String> {
    project(project_id)
        .await
        .and_then(|p| {
            p.get("loaders").and_then(|l| {
                l.as_array().map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
            })
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version_with_files(files: Vec<MrVersionFile>) -> MrVersion {
        MrVersion {
            id: "abc123".into(),
            name: "1.0.0".into(),
            version_number: "1.0.0".into(),
            version_type: "beta".into(),
            game_versions: vec!["1.20.1".into()],
            loaders: vec!["fabric".into()],
            date_published: String::new(),
            files,
        }
    }

    fn file(name: &str, primary: bool) -> MrVersionFile {
        MrVersionFile {
            url: format!("https://cdn.modrinth.com/{}", name),
            filename: name.into(),
            primary,
            hashes: Default::default(),
        }
    }

    #[test]
    fn primary_file_prefers_flag_then_jar() {
        let v = version_with_files(vec![file("sources.zip", false), file("mod.jar", false)]);
        assert_eq!(v.primary_file().unwrap().filename, "mod.jar");

        let v = version_with_files(vec![file("other.jar", false), file("real.jar", true)]);
        assert_eq!(v.primary_file().unwrap().filename, "real.jar");

        let v = version_with_files(vec![file("data.zip", false)]);
        assert_eq!(v.primary_file().unwrap().filename, "data.zip");
    }

    #[test]
    fn release_type_maps_to_curseforge_codes() {
        let mut v = version_with_files(vec![]);
        assert_eq!(v.release_type(), 2);
        v.version_type = "release".into();
        assert_eq!(v.release_type(), 1);
        v.version_type = "alpha".into();
        assert_eq!(v.release_type(), 3);
    }

    #[test]
    fn facets_widen_loader_families() {
        let facets = build_facets("mod", "1.20.1", Some(Loader::Quilt));
        assert!(facets.contains("project_type:mod"));
        assert!(facets.contains("versions:1.20.1"));
        assert!(facets.contains("categories:quilt"));
        assert!(facets.contains("categories:fabric"));
    }
}
