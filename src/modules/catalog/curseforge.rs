// src/modules/catalog/curseforge.rs

use super::{format_downloads, http_client, is_mc_version, urlencode, Loader};
use crate::common::log::{log, LogLevel};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

const API_BASE: &str = "https://api.curseforge.com/v1";
const GAME_MINECRAFT: u32 = 432;
const CLASS_MODPACKS: u32 = 4471;
const CLASS_MODS: u32 = 6;
const SORT_POPULARITY: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfFile {
    pub id: u64,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "fileName", default)]
    pub file_name: String,
    #[serde(rename = "fileDate", default)]
    pub file_date: String,
    #[serde(rename = "downloadUrl", default)]
    pub download_url: Option<String>,
    #[serde(rename = "gameVersions", default)]
    pub game_versions: Vec<String>,
    #[serde(rename = "modLoaderType", default)]
    pub mod_loader_type: Option<u8>,
    #[serde(rename = "isServerPack", default)]
    pub is_server_pack: Option<bool>,
    #[serde(rename = "fileFingerprint", default)]
    pub file_fingerprint: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CfLogo {
    #[serde(default)]
    pub url: String,
    #[serde(rename = "thumbnailUrl", default)]
    pub thumbnail_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CfAuthor {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CfCategory {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CfMod {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub authors: Vec<CfAuthor>,
    #[serde(default)]
    pub logo: Option<CfLogo>,
    #[serde(rename = "downloadCount", default)]
    pub download_count: f64,
    #[serde(rename = "latestFiles", default)]
    pub latest_files: Vec<CfFile>,
    #[serde(rename = "mainFileId", default)]
    pub main_file_id: Option<u64>,
    #[serde(rename = "serverPackFileId", default)]
    pub server_pack_file_id: Option<u64>,
    #[serde(default)]
    pub categories: Vec<CfCategory>,
}

impl CfMod {
    pub fn author(&self) -> String {
        self.authors
            .first()
            .map(|a| a.name.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn icon(&self) -> String {
        self.logo.as_ref().map(|l| l.url.clone()).unwrap_or_default()
    }

    pub fn thumbnail(&self) -> String {
        self.logo
            .as_ref()
            .map(|l| {
                if l.thumbnail_url.is_empty() {
                    l.url.clone()
                } else {
                    l.thumbnail_url.clone()
                }
            })
            .unwrap_or_default()
    }

    // First latest file compatible with the requested version and loader.
    pub fn best_latest_file(&self, version: &str, loader: Option<Loader>) -> Option<&CfFile> {
        self.latest_files
            .iter()
            .find(|f| file_matches(f, version, loader))
    }
}

// A file matches when the version tag is present (or unconstrained) and the
// loader is compatible. Files tag loaders inside gameVersions as plain
// names; modLoaderType is only set on newer uploads.
pub fn file_matches(file: &CfFile, version: &str, loader: Option<Loader>) -> bool {
    if !version.is_empty() && !file.game_versions.iter().any(|v| v == version) {
        return false;
    }

    let Some(target) = loader else { return true };
    let tags_lower: Vec<String> = file.game_versions.iter().map(|v| v.to_lowercase()).collect();

    if let Some(type_id) = file.mod_loader_type {
        if type_id == target.curseforge_id() {
            return true;
        }
    } else {
        // No declared loader type: universal unless the tags explicitly name
        // a different loader.
        let foreign = [Loader::Forge, Loader::Fabric, Loader::Quilt, Loader::NeoForge]
            .iter()
            .filter(|l| **l != target)
            .any(|l| tags_lower.iter().any(|t| t == l.as_str()));
        if !foreign {
            return true;
        }
    }

    // Forge and NeoForge frequently share uploads and tags.
    if matches!(target, Loader::Forge | Loader::NeoForge)
        && tags_lower.iter().any(|t| t == "forge" || t == "neoforge")
    {
        return true;
    }

    tags_lower.iter().any(|t| t == target.as_str())
}

async fn get(path: &str, api_key: &str) -> Option<Value> {
    let url = format!("{}{}", API_BASE, path);
    let res = http_client()
        .get(&url)
        .header("Accept", "application/json")
        .header("x-api-key", api_key)
        .send()
        .await;

    match res {
        Ok(res) if res.status().is_success() => res.json().await.ok(),
        Ok(res) => {
            log(LogLevel::Debug, &format!("▪ CF HTTP {} for {}", res.status(), path));
            None
        }
        Err(e) => {
            log(LogLevel::Debug, &format!("▪ CF request failed: {}", e));
            None
        }
    }
}

async fn post(path: &str, api_key: &str, body: Value) -> Option<Value> {
    let url = format!("{}{}", API_BASE, path);
    let res = http_client()
        .post(&url)
        .header("Accept", "application/json")
        .header("x-api-key", api_key)
        .json(&body)
        .send()
        .await
        .ok()?;

    if !res.status().is_success() {
        log(LogLevel::Debug, &format!("▪ CF HTTP {} for {}", res.status(), path));
        return None;
    }
    res.json().await.ok()
}

fn parse_data<T: serde::de::DeserializeOwned>(payload: Value) -> Option<T> {
    serde_json::from_value(payload.get("data")?.clone()).ok()
}

// --- Search ---

pub async fn search_modpacks(
    search: &str,
    page: u32,
    page_size: u32,
    api_key: &str,
) -> Option<Vec<Value>> {
    let path = format!(
        "/mods/search?gameId={}&classId={}&searchFilter={}&sortField={}&sortOrder=desc&pageSize={}&index={}",
        GAME_MINECRAFT,
        CLASS_MODPACKS,
        urlencode(search),
        SORT_POPULARITY,
        page_size,
        (page - 1) * page_size,
    );
    let packs: Vec<CfMod> = parse_data(get(&path, api_key).await?)?;

    Some(
        packs
            .iter()
            .map(|pack| {
                json!({
                    "id": pack.id,
                    "name": pack.name,
                    "slug": pack.slug,
                    "author": pack.author(),
                    "downloads": format_downloads(pack.download_count as u64),
                    "img": pack.icon(),
                    "summary": pack.summary,
                    "tags": pack.categories.iter().take(3).map(|c| c.name.clone()).collect::<Vec<_>>(),
                })
            })
            .collect(),
    )
}

pub async fn search_mods(
    search: &str,
    version: &str,
    loader: Option<Loader>,
    page: u32,
    page_size: u32,
    api_key: &str,
) -> Option<(Vec<Value>, u64)> {
    let mut path = format!(
        "/mods/search?gameId={}&classId={}&searchFilter={}&sortField={}&sortOrder=desc&pageSize={}&index={}",
        GAME_MINECRAFT,
        CLASS_MODS,
        urlencode(search),
        SORT_POPULARITY,
        page_size,
        (page - 1) * page_size,
    );
    if !version.is_empty() {
        path.push_str(&format!("&gameVersion={}", urlencode(version)));
    }
    if let Some(l) = loader {
        path.push_str(&format!("&modLoaderType={}", l.curseforge_id()));
    }

    let payload = get(&path, api_key).await?;
    let total = payload
        .get("pagination")
        .and_then(|p| p.get("totalCount"))
        .and_then(|t| t.as_u64())
        .unwrap_or(0);
    let mods: Vec<CfMod> = parse_data(payload)?;

    let listing = mods
        .iter()
        .map(|m| {
            let target = m.best_latest_file(version, loader);
            json!({
                "id": m.id,
                "name": m.name,
                "slug": m.slug,
                "author": m.author(),
                "downloads": format_downloads(m.download_count as u64),
                "downloadsRaw": m.download_count as u64,
                "icon": m.icon(),
                "summary": m.summary,
                "latestFileId": target.map(|f| f.id),
                "latestFileName": target.map(|f| {
                    if f.file_name.is_empty() { f.display_name.clone() } else { f.file_name.clone() }
                }),
                "mcVersion": if version.is_empty() { "Various" } else { version },
            })
        })
        .collect();

    Some((listing, total))
}

// --- Files ---

pub async fn files(
    mod_id: u64,
    version: &str,
    loader: Option<Loader>,
    api_key: &str,
) -> Vec<CfFile> {
    let mut path = format!("/mods/{}/files?pageSize=50", mod_id);
    if !version.is_empty() {
        path.push_str(&format!("&gameVersion={}", urlencode(version)));
    }

    let Some(payload) = get(&path, api_key).await else {
        return Vec::new();
    };
    let Some(mut files) = parse_data::<Vec<CfFile>>(payload) else {
        return Vec::new();
    };

    // Server-side filters are advisory; enforce locally too.
    files.retain(|f| file_matches(f, version, loader));
    files.sort_by(|a, b| b.file_date.cmp(&a.file_date));
    files
}

pub async fn file(mod_id: u64, file_id: u64, api_key: &str) -> Option<CfFile> {
    parse_data(get(&format!("/mods/{}/files/{}", mod_id, file_id), api_key).await?)
}

pub async fn file_download_url(mod_id: u64, file_id: u64, api_key: &str) -> Option<String> {
    file(mod_id, file_id, api_key).await.and_then(|f| f.download_url)
}

// Resolve a download url, preferring an explicit file id, otherwise the
// first latest file that has one.
pub async fn mod_download_url(mod_id: u64, file_id: Option<u64>, api_key: &str) -> Option<String> {
    if let Some(fid) = file_id {
        return file_download_url(mod_id, fid, api_key).await;
    }

    let details = mod_details(mod_id, api_key).await?;
    details
        .latest_files
        .iter()
        .find_map(|f| f.download_url.clone())
}

// --- Lookups ---

pub async fn mod_details(mod_id: u64, api_key: &str) -> Option<CfMod> {
    parse_data(get(&format!("/mods/{}", mod_id), api_key).await?)
}

pub async fn mods_batch(ids: &[u64], api_key: &str) -> Vec<CfMod> {
    if ids.is_empty() {
        return Vec::new();
    }
    let Some(payload) = post("/mods", api_key, json!({ "modIds": ids })).await else {
        return Vec::new();
    };
    parse_data(payload).unwrap_or_default()
}

pub async fn search_by_slug(slug: &str, api_key: &str) -> Option<CfMod> {
    let path = format!(
        "/mods/search?gameId={}&classId={}&slug={}",
        GAME_MINECRAFT,
        CLASS_MODPACKS,
        urlencode(slug)
    );
    let mods: Vec<CfMod> = parse_data(get(&path, api_key).await?)?;
    mods.into_iter().next()
}

// --- Fingerprints ---

#[derive(Debug, Clone)]
pub struct FingerprintMatch {
    pub mod_id: u64,
    pub name: String,
    pub file_id: u64,
    pub file_name: String,
}

// Identify jars by their murmur2 hash.
pub async fn fingerprints(hashes: &[u64], api_key: &str) -> HashMap<u64, FingerprintMatch> {
    let mut results = HashMap::new();
    if hashes.is_empty() {
        return results;
    }

    let Some(payload) = post("/fingerprints", api_key, json!({ "fingerprints": hashes })).await
    else {
        return results;
    };

    let matches = payload
        .get("data")
        .and_then(|d| d.get("exactMatches"))
        .and_then(|m| m.as_array())
        .cloned()
        .unwrap_or_default();

    for entry in matches {
        let Some(file) = entry.get("file") else { continue };
        let Some(hash) = file.get("fileFingerprint").and_then(|f| f.as_u64()) else {
            continue;
        };
        results.insert(
            hash,
            FingerprintMatch {
                mod_id: entry.get("id").and_then(|i| i.as_u64()).unwrap_or(0),
                name: file
                    .get("displayName")
                    .and_then(|n| n.as_str())
                    .unwrap_or_default()
                    .to_string(),
                file_id: file.get("id").and_then(|i| i.as_u64()).unwrap_or(0),
                file_name: file
                    .get("fileName")
                    .and_then(|n| n.as_str())
                    .unwrap_or_default()
                    .to_string(),
            },
        );
    }
    results
}

// Split a file's gameVersions into Minecraft versions and loader tags.
pub fn split_game_versions(file: &CfFile) -> (Vec<String>, Vec<String>) {
    let mut versions = Vec::new();
    let mut loaders = Vec::new();
    for tag in &file.game_versions {
        if is_mc_version(tag) {
            versions.push(tag.clone());
        } else {
            loaders.push(tag.clone());
        }
    }
    (versions, loaders)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(tags: &[&str], loader_type: Option<u8>) -> CfFile {
        CfFile {
            id: 1,
            display_name: "Test".into(),
            file_name: "test.jar".into(),
            file_date: "2024-05-01T00:00:00Z".into(),
            download_url: None,
            game_versions: tags.iter().map(|t| t.to_string()).collect(),
            mod_loader_type: loader_type,
            is_server_pack: None,
            file_fingerprint: None,
        }
    }

    #[test]
    fn version_filter_requires_exact_tag() {
        let f = file(&["1.20.1", "Forge"], Some(1));
        assert!(file_matches(&f, "1.20.1", None));
        assert!(!file_matches(&f, "1.21", None));
        assert!(file_matches(&f, "", None));
    }

    #[test]
    fn declared_loader_type_matches() {
        let f = file(&["1.20.1"], Some(4));
        assert!(file_matches(&f, "", Some(Loader::Fabric)));
        assert!(!file_matches(&f, "", Some(Loader::Quilt)));
    }

    #[test]
    fn untyped_file_is_universal_unless_foreign_tagged() {
        let untagged = file(&["1.20.1"], None);
        assert!(file_matches(&untagged, "", Some(Loader::Forge)));

        let fabric_only = file(&["1.20.1", "Fabric"], None);
        assert!(!file_matches(&fabric_only, "", Some(Loader::Forge)));
        assert!(file_matches(&fabric_only, "", Some(Loader::Fabric)));
    }

    #[test]
    fn forge_neoforge_crossover() {
        let forge_tagged = file(&["1.20.1", "Forge"], Some(1));
        assert!(file_matches(&forge_tagged, "", Some(Loader::NeoForge)));
    }

    #[test]
    fn splits_versions_from_loader_tags() {
        let f = file(&["1.20.1", "Forge", "1.20"], Some(1));
        let (versions, loaders) = split_game_versions(&f);
        assert_eq!(versions, vec!["1.20.1", "1.20"]);
        assert_eq!(loaders, vec!["Forge"]);
    }

}
