// src/modules/mods/manage.rs

use super::scan;
use crate::common::log::{log, LogLevel};
use crate::core::response;
use crate::modules::catalog::{self, curseforge, modrinth, Loader, Platform};
use crate::modules::docker::inspect;
use crate::modules::metadata::reconcile;
use crate::modules::metadata::store::{self, InstalledMod};
use crate::modules::servers::{container_data_dir, container_mods_dir};
use crate::modules::settings::handlers::Settings;
use axum::extract::{Path as AxumPath, Query};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sha1::{Digest, Sha1};
use std::fs;
use std::path::Path;

lazy_static! {
    // "jei-1.20.1-forge" -> "jei"; the version tail starts at -v2 / _1.2 etc.
    static ref VERSION_TAIL: Regex = Regex::new(r"[-_][vV]?\d.*$").unwrap();
    static ref CAMEL_BOUNDARY: Regex = Regex::new(r"([a-z])([A-Z])").unwrap();
}

const SCAN_CACHE_SECS: i64 = 3600;

// --- Shared helpers ---

// Streams a mod file to disk, optionally verifying its SHA-1.
pub async fn download_file(url: &str, target: &Path, expected_sha1: Option<&str>) -> Result<(), String> {
    let res = catalog::http_client()
        .get(url)
        .send()
        .await
        .map_err(|e| format!("Download failed: {}", e))?;
    if !res.status().is_success() {
        return Err(format!("Download failed: HTTP {}", res.status()));
    }
    let bytes = res.bytes().await.map_err(|e| format!("Download failed: {}", e))?;

    if let Some(expected) = expected_sha1.filter(|e| !e.is_empty()) {
        let mut hasher = Sha1::new();
        hasher.update(&bytes);
        let actual: String = hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect();
        if !actual.eq_ignore_ascii_case(expected) {
            return Err("Checksum mismatch on downloaded file".to_string());
        }
    }

    if let Some(dir) = target.parent() {
        fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    }
    fs::write(target, &bytes).map_err(|e| e.to_string())
}

pub fn filename_from_url(url: &str) -> Option<String> {
    let path = url.split('?').next()?;
    let name = path.rsplit('/').next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

// Normalized containment comparison for identify heuristics.
fn squash(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

// Search query candidates from a jar filename.
pub fn query_from_filename(filename: &str) -> (String, String) {
    let stem = filename.strip_suffix(".jar").unwrap_or(filename);
    let simple = VERSION_TAIL.replace(stem, "").to_string();
    let spaced = CAMEL_BOUNDARY.replace_all(&simple, "$1 $2").trim().to_string();
    (spaced, simple)
}

// Does a catalog hit plausibly correspond to this filename?
pub fn candidate_matches(name: &str, slug: &str, query: &str, simple: &str) -> bool {
    let c_name = squash(name);
    let q_name = squash(query);
    let f_name = squash(simple);

    if !f_name.is_empty() && (c_name.contains(&f_name) || f_name.contains(&c_name)) {
        return true;
    }
    if levenshtein(&c_name, &q_name) < 4 {
        return true;
    }
    let c_slug = squash(slug);
    !c_slug.is_empty() && (c_slug == f_name || c_slug == q_name)
}

async fn server_version_and_loader(server_id: &str) -> (String, Option<Loader>) {
    let Some(detail) = inspect::inspect(server_id).await else {
        return (String::new(), None);
    };
    let api_key = Settings::load().curseforge_api_key();
    let meta =
        reconcile::server_metadata(&detail.env_map(), &detail.container_name(), &api_key).await;
    (meta.mc_version, Loader::parse(&meta.loader))
}

// --- Install / delete ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InstallRequest {
    pub source: String,
    pub mod_id: Value,
    pub file_id: Value,
    pub mod_name: String,
    pub logo: String,
    pub author: String,
    pub summary: String,
    pub mc_version: String,
}

fn value_as_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn value_as_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// POST /v1/servers/{id}/mods
pub async fn install_handler(
    AxumPath(id): AxumPath<String>,
    Json(req): Json<InstallRequest>,
) -> Response {
    if value_as_string(&req.mod_id).is_empty() {
        return response::bad_request("Missing mod_id");
    }
    let Some(mods_dir) = container_mods_dir(&id).await else {
        return response::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Could not locate server data directory",
        );
    };
    let _ = fs::create_dir_all(&mods_dir);

    let settings = Settings::load();
    let platform = Platform::parse(&req.source);

    // Resolve a download url per platform.
    let (url, sha1) = match platform {
        Platform::Modrinth => {
            let mut version_id = value_as_string(&req.file_id);
            if version_id.is_empty() {
                let project = value_as_string(&req.mod_id);
                version_id = modrinth::project_versions(&project, "", None)
                    .await
                    .first()
                    .map(|v| v.id.clone())
                    .unwrap_or_default();
            }
            match modrinth::version_download(&version_id).await {
                Some((url, sha1)) => (url, sha1),
                None => {
                    return response::error(
                        StatusCode::BAD_GATEWAY,
                        "Could not get Modrinth download URL",
                    )
                }
            }
        }
        Platform::CurseForge => {
            let api_key = settings.curseforge_api_key();
            if api_key.is_empty() {
                return response::bad_request("CurseForge API key not configured");
            }
            let Some(mod_id) = value_as_u64(&req.mod_id) else {
                return response::bad_request("Invalid mod_id");
            };
            match curseforge::mod_download_url(mod_id, value_as_u64(&req.file_id), &api_key).await {
                Some(url) => (url, None),
                None => {
                    return response::error(StatusCode::BAD_GATEWAY, "Could not get download URL")
                }
            }
        }
    };

    let file_name = filename_from_url(&url).unwrap_or_else(|| {
        format!("mod-{}.jar", value_as_string(&req.mod_id))
    });
    let target = Path::new(&mods_dir).join(&file_name);

    if let Err(e) = download_file(&url, &target, sha1.as_deref()).await {
        return response::error(StatusCode::INTERNAL_SERVER_ERROR, e);
    }

    // Replace, not accumulate: drop the previously recorded file for this mod.
    let installed = store::load_installed(&id);
    if let Some(old) = installed.get(&value_as_string(&req.mod_id)) {
        if !old.file_name.is_empty() && old.file_name != file_name {
            let _ = fs::remove_file(Path::new(&mods_dir).join(&old.file_name));
        }
    }

    store::remember_installed(
        &id,
        InstalledMod {
            mod_id: req.mod_id.clone(),
            name: if req.mod_name.is_empty() { file_name.clone() } else { req.mod_name.clone() },
            platform: platform.as_str().to_string(),
            file_name,
            file_id: req.file_id.clone(),
            logo: req.logo.clone(),
            author: if req.author.is_empty() { "Unknown".into() } else { req.author.clone() },
            summary: req.summary.clone(),
            mc_version: req.mc_version.clone(),
            installed_at: Utc::now().timestamp(),
        },
    );

    log(LogLevel::Info, &format!("✓ Installed mod into {}", id));
    response::success(Some(json!({ "message": "Mod installed" })))
}

// DELETE /v1/servers/{id}/mods/{file}
pub async fn delete_handler(AxumPath((id, file)): AxumPath<(String, String)>) -> Response {
    let Some(mods_dir) = container_mods_dir(&id).await else {
        return response::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Could not locate server data directory",
        );
    };

    // basename() defangs traversal attempts in the file parameter.
    let base = Path::new(&file)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if base.is_empty() {
        return response::bad_request("Missing file name");
    }

    let path = Path::new(&mods_dir).join(&base);
    if fs::remove_file(&path).is_err() {
        return response::error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete file");
    }

    let mut installed = store::load_installed(&id);
    let before = installed.len();
    installed.retain(|_, info| info.file_name != base);
    if installed.len() != before {
        store::save_installed(&id, &installed);
    }

    response::success(Some(json!({ "message": "Mod removed" })))
}

// --- Installed listing (metadata-driven) ---

#[derive(Deserialize)]
pub struct ModListQuery {
    #[serde(default)]
    pub mc_version: Option<String>,
    #[serde(default)]
    pub loader: Option<String>,
    #[serde(default)]
    pub check_updates: Option<String>,
}

// GET /v1/servers/{id}/mods
pub async fn list_handler(
    AxumPath(id): AxumPath<String>,
    Query(query): Query<ModListQuery>,
) -> Response {
    let Some(mods_dir) = container_mods_dir(&id).await else {
        return response::success(Some(json!([])));
    };
    if !Path::new(&mods_dir).is_dir() {
        return response::success(Some(json!([])));
    }

    let installed = store::load_installed(&id);
    let check_updates = query.check_updates.as_deref() == Some("true");

    let mut mc_version = query.mc_version.clone().unwrap_or_default();
    let mut loader = query.loader.clone().and_then(|l| Loader::parse(&l));
    if check_updates && (mc_version.is_empty() || loader.is_none()) {
        let (detected_version, detected_loader) = server_version_and_loader(&id).await;
        if mc_version.is_empty() {
            mc_version = detected_version;
        }
        if loader.is_none() {
            loader = detected_loader;
        }
    }

    let mut mods: Vec<Map<String, Value>> = Vec::new();
    if let Ok(entries) = fs::read_dir(&mods_dir) {
        let mut files: Vec<String> = entries
            .flatten()
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|n| n.ends_with(".jar"))
            .collect();
        files.sort();

        for file in files {
            // Exact filename match against the store, then fuzzy.
            let info = installed
                .values()
                .find(|i| i.file_name == file)
                .or_else(|| {
                    let disk = file.to_lowercase();
                    installed.values().find(|i| {
                        let meta_file = i.file_name.to_lowercase();
                        let meta_name = squash(&i.name);
                        (!meta_file.is_empty() && disk.contains(&meta_file))
                            || (!meta_name.is_empty() && squash(&disk).contains(&meta_name))
                    })
                });

            let size = fs::metadata(Path::new(&mods_dir).join(&file))
                .map(|m| m.len())
                .unwrap_or(0);

            let mut row = Map::new();
            row.insert("id".into(), match info {
                Some(i) => i.mod_id.clone(),
                None => Value::String(store::record_key(&file)),
            });
            row.insert("name".into(), Value::String(file.clone()));
            row.insert("file".into(), Value::String(file.clone()));
            row.insert("size".into(), Value::String(scan::format_bytes(size)));
            if let Some(i) = info {
                row.insert(
                    "needsIdentification".into(),
                    Value::Bool(i.author.is_empty() || i.logo.is_empty()),
                );
                row.insert("modId".into(), i.mod_id.clone());
                row.insert("platform".into(), Value::String(i.platform.clone()));
                row.insert("fileId".into(), i.file_id.clone());
                row.insert("logo".into(), Value::String(i.logo.clone()));
                row.insert("author".into(), Value::String(i.author.clone()));
                row.insert("summary".into(), Value::String(i.summary.clone()));
                if !i.name.is_empty() {
                    row.insert("name".into(), Value::String(i.name.clone()));
                }
            } else {
                row.insert("needsIdentification".into(), Value::Bool(true));
            }
            mods.push(row);
        }
    }

    // Optional update sweep against CurseForge for everything identified.
    if check_updates && !mods.is_empty() {
        let settings = Settings::load();
        let api_key = settings.curseforge_api_key();
        let cf_ids: Vec<u64> = installed
            .values()
            .filter(|i| i.platform == "curseforge")
            .filter_map(|i| value_as_u64(&i.mod_id))
            .collect();

        if !cf_ids.is_empty() && !api_key.is_empty() {
            let batch = curseforge::mods_batch(&cf_ids, &api_key).await;
            for cf_mod in batch {
                let Some(target) = cf_mod.best_latest_file(&mc_version, loader) else {
                    continue;
                };
                for row in mods.iter_mut() {
                    let matches = row
                        .get("modId")
                        .and_then(value_as_u64)
                        .map(|mid| mid == cf_mod.id)
                        .unwrap_or(false);
                    if matches {
                        let current = row.get("fileId").map(value_as_string).unwrap_or_default();
                        row.insert(
                            "update_available".into(),
                            Value::Bool(target.id.to_string() != current),
                        );
                        row.insert(
                            "latest_version".into(),
                            Value::String(target.display_name.clone()),
                        );
                        row.insert("latest_file_id".into(), json!(target.id));
                    }
                }
            }
        }
    }

    let rows: Vec<Value> = mods.into_iter().map(Value::Object).collect();
    response::success(Some(Value::Array(rows)))
}

// --- Identification ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IdentifyRequest {
    pub files: Vec<String>,
}

// POST /v1/servers/{id}/mods/identify
//
// Pass 1 matches filenames against what the store already knows; pass 2
// batch-fetches those from CurseForge; pass 3 falls back to heuristic name
// search for the leftovers, trying Modrinth when CurseForge disagrees.
pub async fn identify_handler(
    AxumPath(id): AxumPath<String>,
    Json(req): Json<IdentifyRequest>,
) -> Response {
    if req.files.is_empty() {
        return response::bad_request("Missing file list");
    }

    let settings = Settings::load();
    let api_key = settings.curseforge_api_key();
    let mut installed = store::load_installed(&id);

    let mut known: Vec<(String, u64)> = Vec::new();
    let mut unknown: Vec<String> = Vec::new();

    for filename in &req.files {
        let matched = installed.values().find_map(|info| {
            let matches_exact = info.file_name == *filename;
            let matches_fuzzy = {
                let disk = squash(filename);
                let meta_name = squash(&info.name);
                !meta_name.is_empty() && disk.contains(&meta_name)
            };
            if matches_exact || matches_fuzzy {
                value_as_u64(&info.mod_id)
            } else {
                None
            }
        });
        match matched {
            Some(pid) => known.push((filename.clone(), pid)),
            None => unknown.push(filename.clone()),
        }
    }

    let mut results = Map::new();

    // Pass 2: enrich known ids in one batch call.
    if !known.is_empty() && !api_key.is_empty() {
        let ids: Vec<u64> = known.iter().map(|(_, pid)| *pid).collect();
        let batch = curseforge::mods_batch(&ids, &api_key).await;
        for (filename, pid) in &known {
            let Some(cf_mod) = batch.iter().find(|m| m.id == *pid) else {
                continue;
            };
            let details = json!({
                "id": cf_mod.id,
                "name": cf_mod.name,
                "author": cf_mod.author(),
                "summary": cf_mod.summary,
                "icon": cf_mod.thumbnail(),
                "latestFileId": cf_mod.main_file_id,
                "platform": "curseforge",
            });
            results.insert(filename.clone(), details);

            let entry = installed
                .entry(pid.to_string())
                .or_insert_with(|| InstalledMod {
                    mod_id: json!(pid),
                    platform: "curseforge".into(),
                    installed_at: Utc::now().timestamp(),
                    ..Default::default()
                });
            if entry.name.is_empty() {
                entry.name = cf_mod.name.clone();
            }
            if entry.file_name.is_empty() {
                entry.file_name = filename.clone();
            }
            if entry.logo.is_empty() {
                entry.logo = cf_mod.thumbnail();
            }
            if entry.author.is_empty() {
                entry.author = cf_mod.author();
            }
            if entry.summary.is_empty() {
                entry.summary = cf_mod.summary.clone();
            }
        }
    }

    // Pass 3: heuristic search for files nothing knows about.
    for filename in &unknown {
        let (query, simple) = query_from_filename(filename);
        if query.len() < 2 {
            continue;
        }

        let mut found: Option<Value> = None;
        if !api_key.is_empty() {
            if let Some((hits, _)) = curseforge::search_mods(&query, "", None, 1, 1, &api_key).await
            {
                if let Some(hit) = hits.first() {
                    let name = hit.get("name").and_then(|n| n.as_str()).unwrap_or("");
                    let slug = hit.get("slug").and_then(|s| s.as_str()).unwrap_or("");
                    if candidate_matches(name, slug, &query, &simple) {
                        let mut hit = hit.clone();
                        if let Some(obj) = hit.as_object_mut() {
                            obj.insert("platform".into(), Value::String("curseforge".into()));
                        }
                        found = Some(hit);
                    }
                }
            }
        }
        if found.is_none() {
            if let Some((hits, _)) = modrinth::search("mod", &query, "", None, 1, 1).await {
                if let Some(hit) = hits.first() {
                    let mut hit = hit.clone();
                    if let Some(obj) = hit.as_object_mut() {
                        obj.insert("platform".into(), Value::String("modrinth".into()));
                    }
                    found = Some(hit);
                }
            }
        }

        if let Some(hit) = found {
            let pid = hit.get("id").map(value_as_string).unwrap_or_default();
            if pid.is_empty() {
                continue;
            }
            results.insert(filename.clone(), hit.clone());

            installed.entry(pid.clone()).or_insert_with(|| InstalledMod {
                mod_id: hit.get("id").cloned().unwrap_or(Value::String(pid.clone())),
                name: hit.get("name").and_then(|n| n.as_str()).unwrap_or(filename).to_string(),
                platform: hit
                    .get("platform")
                    .and_then(|p| p.as_str())
                    .unwrap_or("curseforge")
                    .to_string(),
                file_name: filename.clone(),
                file_id: hit.get("latestFileId").cloned().unwrap_or(Value::Null),
                logo: hit.get("icon").and_then(|i| i.as_str()).unwrap_or("").to_string(),
                author: hit.get("author").and_then(|a| a.as_str()).unwrap_or("Unknown").to_string(),
                summary: hit.get("summary").and_then(|s| s.as_str()).unwrap_or("").to_string(),
                mc_version: hit.get("mcVersion").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                installed_at: Utc::now().timestamp(),
            });
        }
    }

    if !results.is_empty() {
        store::save_installed(&id, &installed);
    }
    response::success(Some(Value::Object(results)))
}

// --- Manifest import ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ManifestRequest {
    pub manifest_json: Value,
    pub download: bool,
}

// Accepts a CurseForge manifest.json or an FTB/instance
// minecraftinstance.json and returns projectID -> fileID.
pub fn parse_manifest(data: &Value) -> Vec<(u64, u64)> {
    let mut mods = Vec::new();

    if let Some(files) = data.get("files").and_then(|f| f.as_array()) {
        for f in files {
            if let Some(pid) = f.get("projectID").and_then(|p| p.as_u64()) {
                let fid = f.get("fileID").and_then(|x| x.as_u64()).unwrap_or(0);
                mods.push((pid, fid));
            }
        }
    } else if let Some(addons) = data.get("installedAddons").and_then(|a| a.as_array()) {
        for addon in addons {
            if let Some(pid) = addon.get("addonID").and_then(|p| p.as_u64()) {
                let fid = addon
                    .get("installedFile")
                    .and_then(|f| f.get("id"))
                    .and_then(|x| x.as_u64())
                    .unwrap_or(0);
                mods.push((pid, fid));
            }
        }
    }
    mods
}

// POST /v1/servers/{id}/manifest
pub async fn manifest_handler(
    AxumPath(id): AxumPath<String>,
    Json(req): Json<ManifestRequest>,
) -> Response {
    // The manifest arrives either inline as an object or as a JSON string.
    let data = match &req.manifest_json {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(v) => v,
            Err(_) => return response::bad_request("Invalid JSON"),
        },
        Value::Null => return response::bad_request("Missing ID or manifest JSON"),
        other => other.clone(),
    };

    let manifest = parse_manifest(&data);
    if manifest.is_empty() {
        return response::bad_request("No mods found in manifest");
    }

    let settings = Settings::load();
    let api_key = settings.curseforge_api_key();
    if api_key.is_empty() {
        return response::bad_request("CurseForge API Key required");
    }

    let ids: Vec<u64> = manifest.iter().map(|(pid, _)| *pid).collect();
    let batch = curseforge::mods_batch(&ids, &api_key).await;

    let mods_dir = if req.download {
        container_mods_dir(&id).await
    } else {
        None
    };
    if let Some(dir) = &mods_dir {
        let _ = fs::create_dir_all(dir);
    }

    let mut installed = store::load_installed(&id);
    let mut count = 0;
    let mut downloaded = 0;

    for cf_mod in &batch {
        let file_id = manifest
            .iter()
            .find(|(pid, _)| *pid == cf_mod.id)
            .map(|(_, fid)| *fid)
            .unwrap_or(0);

        let mut file_name = format!("{}.jar", cf_mod.slug);
        if file_id > 0 {
            if let Some(lf) = cf_mod.latest_files.iter().find(|f| f.id == file_id) {
                file_name = lf.file_name.clone();
            }
        }

        if let Some(dir) = &mods_dir {
            let target = Path::new(dir).join(&file_name);
            if file_id > 0 && !target.exists() {
                if let Some(url) =
                    curseforge::file_download_url(cf_mod.id, file_id, &api_key).await
                {
                    match download_file(&url, &target, None).await {
                        Ok(()) => downloaded += 1,
                        Err(e) => log(
                            LogLevel::Debug,
                            &format!("▪ Manifest download failed for {}: {}", file_name, e),
                        ),
                    }
                }
            }
        }

        let entry = installed
            .entry(cf_mod.id.to_string())
            .or_insert_with(|| InstalledMod {
                mod_id: json!(cf_mod.id),
                platform: "curseforge".into(),
                installed_at: Utc::now().timestamp(),
                ..Default::default()
            });
        if entry.name.is_empty() {
            entry.name = cf_mod.name.clone();
        }
        if entry.file_name.is_empty() {
            entry.file_name = file_name;
        }
        if entry.file_id.is_null() && file_id > 0 {
            entry.file_id = json!(file_id);
        }
        if entry.logo.is_empty() {
            entry.logo = cf_mod.thumbnail();
        }
        if entry.author.is_empty() {
            entry.author = cf_mod.author();
        }
        if entry.summary.is_empty() {
            entry.summary = cf_mod.summary.clone();
        }
        count += 1;
    }

    store::save_installed(&id, &installed);
    response::success(Some(json!({
        "count": count,
        "downloaded": downloaded,
        "message": format!("Imported metadata for {} mods", count),
    })))
}

// --- Jar scanning endpoints ---

// GET /v1/servers/{id}/mods/scan
pub async fn scan_handler(AxumPath(id): AxumPath<String>) -> Response {
    let Some(data_dir) = container_data_dir(&id).await else {
        return response::error(StatusCode::NOT_FOUND, "Could not locate server data directory");
    };

    let mods = scan::scan_server_mods(&data_dir).await;
    store::save_scan_cache(&id, &mods);

    let count = mods.len();
    response::success(Some(json!({ "mods": mods, "count": count })))
}

#[derive(Deserialize)]
pub struct CachedListQuery {
    #[serde(default)]
    pub refresh: Option<String>,
}

// GET /v1/servers/{id}/mods/list — cached scan hydrated from the global
// dictionary and, for gaps, a CurseForge batch lookup.
pub async fn cached_list_handler(
    AxumPath(id): AxumPath<String>,
    Query(query): Query<CachedListQuery>,
) -> Response {
    let force_refresh = query.refresh.is_some();

    if !force_refresh {
        if let Some(cache) = store::load_scan_cache(&id, SCAN_CACHE_SECS) {
            let count = cache.mods.len();
            return response::success(Some(json!({
                "mods": cache.mods,
                "count": count,
                "cached": true,
            })));
        }
    }

    let Some(data_dir) = container_data_dir(&id).await else {
        return response::error(StatusCode::NOT_FOUND, "Could not locate server data directory");
    };
    let mut mods = scan::scan_server_mods(&data_dir).await;

    // Hydrate names/icons from the shared dictionary, collecting unknown
    // numeric ids for one batch fetch.
    let mut dictionary = store::load_mod_dictionary();
    let mut missing: Vec<u64> = Vec::new();
    for row in mods.iter_mut() {
        let Some(obj) = row.as_object_mut() else { continue };
        let mod_id = obj.get("modId").map(value_as_string).unwrap_or_default();
        if mod_id.is_empty() {
            continue;
        }
        if let Some(known) = dictionary.get(&mod_id) {
            if let Some(name) = known.get("name").and_then(|n| n.as_str()) {
                obj.insert("name".into(), Value::String(name.to_string()));
            }
            obj.insert("icon".into(), known.get("icon").cloned().unwrap_or_default());
            obj.insert(
                "description".into(),
                known.get("description").cloned().unwrap_or_default(),
            );
            obj.insert("source".into(), known.get("source").cloned().unwrap_or_default());
        } else if let Ok(numeric) = mod_id.parse::<u64>() {
            missing.push(numeric);
        }
    }

    let settings = Settings::load();
    let api_key = settings.curseforge_api_key();
    if !missing.is_empty() && !api_key.is_empty() {
        missing.sort_unstable();
        missing.dedup();
        let batch = curseforge::mods_batch(&missing, &api_key).await;
        for cf_mod in &batch {
            dictionary.insert(
                cf_mod.id.to_string(),
                json!({
                    "name": cf_mod.name,
                    "source": "curseforge",
                    "icon": cf_mod.thumbnail(),
                    "description": cf_mod.summary,
                }),
            );
            for row in mods.iter_mut() {
                let Some(obj) = row.as_object_mut() else { continue };
                let matches = obj
                    .get("modId")
                    .map(value_as_string)
                    .map(|mid| mid == cf_mod.id.to_string())
                    .unwrap_or(false);
                if matches {
                    obj.insert("name".into(), Value::String(cf_mod.name.clone()));
                    obj.insert("icon".into(), Value::String(cf_mod.thumbnail()));
                    obj.insert("description".into(), Value::String(cf_mod.summary.clone()));
                    obj.insert("source".into(), Value::String("curseforge".into()));
                }
            }
        }
        store::save_mod_dictionary(&dictionary);
    }

    store::save_scan_cache(&id, &mods);
    let count = mods.len();
    response::success(Some(json!({
        "mods": mods,
        "count": count,
        "cached": false,
    })))
}

// GET /v1/servers/{id}/mods/updates — fingerprint pass over scanned jars.
pub async fn scan_updates_handler(AxumPath(id): AxumPath<String>) -> Response {
    let settings = Settings::load();
    let api_key = settings.curseforge_api_key();
    if api_key.is_empty() {
        return response::bad_request("CurseForge API key not configured");
    }

    let Some(data_dir) = container_data_dir(&id).await else {
        return response::error(StatusCode::NOT_FOUND, "Could not locate server data directory");
    };
    let mc_version = store::load_metadata_cache(&id)
        .map(|m| m.mc_version)
        .filter(|v| v != "Unknown")
        .unwrap_or_default();

    let mut mods = scan::scan_server_mods(&data_dir).await;
    let hashes: Vec<u64> = mods
        .iter()
        .filter_map(|m| m.get("hash").and_then(|h| h.as_u64()))
        .filter(|h| *h != 0)
        .collect();

    let matches = curseforge::fingerprints(&hashes, &api_key).await;

    // Resolve "newer file exists" per identified mod.
    let ids: Vec<u64> = matches.values().map(|m| m.mod_id).collect();
    let batch = curseforge::mods_batch(&ids, &api_key).await;

    let mut updates_available = 0;
    for row in mods.iter_mut() {
        let Some(obj) = row.as_object_mut() else { continue };
        let Some(hash) = obj.get("hash").and_then(|h| h.as_u64()) else {
            continue;
        };
        let Some(hit) = matches.get(&hash) else { continue };

        obj.insert("curseforgeId".into(), json!(hit.mod_id));
        let latest = batch
            .iter()
            .find(|m| m.id == hit.mod_id)
            .and_then(|m| m.best_latest_file(&mc_version, None));

        if let Some(latest) = latest {
            let has_update = latest.id != hit.file_id;
            obj.insert("updateAvailable".into(), Value::Bool(has_update));
            obj.insert("latestVersion".into(), Value::String(latest.display_name.clone()));
            obj.insert("latestFileId".into(), json!(latest.id));
            if has_update {
                updates_available += 1;
            }
        } else {
            obj.insert("updateAvailable".into(), Value::Bool(false));
        }
    }

    store::save_updates_cache(&id, &mods);
    let total = mods.len();
    response::success(Some(json!({
        "mods": mods,
        "updatesAvailable": updates_available,
        "totalMods": total,
    })))
}

// POST /v1/servers/{id}/mods/{file}/update
pub async fn update_file_handler(AxumPath((id, file)): AxumPath<(String, String)>) -> Response {
    let settings = Settings::load();
    let api_key = settings.curseforge_api_key();
    if api_key.is_empty() {
        return response::bad_request("CurseForge API key not configured");
    }

    let Some(mods_dir) = container_mods_dir(&id).await else {
        return response::error(StatusCode::NOT_FOUND, "Could not locate server data directory");
    };
    let base = Path::new(&file)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let old_path = Path::new(&mods_dir).join(&base);
    if base.is_empty() || !old_path.exists() {
        return response::error(StatusCode::NOT_FOUND, "Mod file not found");
    }

    // Identify this exact jar, then find its newest compatible file.
    let Some(hash) = super::fingerprint::hash_file(&old_path) else {
        return response::error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to hash mod file");
    };
    let matches = curseforge::fingerprints(&[hash as u64], &api_key).await;
    let Some(hit) = matches.get(&(hash as u64)) else {
        return response::bad_request("Update information not available");
    };

    let mc_version = store::load_metadata_cache(&id)
        .map(|m| m.mc_version)
        .filter(|v| v != "Unknown")
        .unwrap_or_default();
    let latest = match curseforge::mod_details(hit.mod_id, &api_key).await {
        Some(details) => details
            .best_latest_file(&mc_version, None)
            .cloned()
            .or_else(|| details.latest_files.first().cloned()),
        None => None,
    };
    let Some(latest) = latest else {
        return response::bad_request("Update information not available");
    };
    if latest.id == hit.file_id {
        return response::success(Some(json!({ "message": "Already up to date" })));
    }
    let Some(url) = latest
        .download_url
        .clone()
        .or(curseforge::file_download_url(hit.mod_id, latest.id, &api_key).await)
    else {
        return response::error(StatusCode::BAD_GATEWAY, "Could not get download URL");
    };

    let new_name = if latest.file_name.is_empty() {
        format!("{}-{}.jar", hit.mod_id, latest.id)
    } else {
        latest.file_name.clone()
    };
    let new_path = Path::new(&mods_dir).join(&new_name);
    if let Err(e) = download_file(&url, &new_path, None).await {
        return response::error(StatusCode::INTERNAL_SERVER_ERROR, e);
    }
    if new_name != base {
        let _ = fs::remove_file(&old_path);
    }

    response::success(Some(json!({
        "message": "Mod updated",
        "file": new_name,
    })))
}

// --- Installed-store update check (dashboard badge) ---

// GET /v1/servers/{id}/updates
pub async fn server_updates_handler(AxumPath(id): AxumPath<String>) -> Response {
    let installed = store::load_installed(&id);
    if installed.is_empty() {
        return response::success(Some(json!({ "updates": {} })));
    }

    let record = store::find_config(&id);
    let mc_version = record.as_ref().map(|r| r.mc_version.clone()).unwrap_or_default();
    let loader = record
        .as_ref()
        .and_then(|r| Loader::parse(&r.loader));

    let settings = Settings::load();
    let api_key = settings.curseforge_api_key();

    let mut cf_ids: Vec<u64> = Vec::new();
    let mut mr_ids: Vec<String> = Vec::new();
    for info in installed.values() {
        if info.platform == "modrinth" {
            mr_ids.push(value_as_string(&info.mod_id));
        } else if let Some(id) = value_as_u64(&info.mod_id) {
            cf_ids.push(id);
        }
    }

    let mut updates = Map::new();

    if !cf_ids.is_empty() && !api_key.is_empty() {
        for cf_mod in curseforge::mods_batch(&cf_ids, &api_key).await {
            if let Some(target) = cf_mod.best_latest_file(&mc_version, loader) {
                updates.insert(
                    cf_mod.id.to_string(),
                    json!({
                        "latestFileId": target.id,
                        "latestFileName": if target.file_name.is_empty() {
                            target.display_name.clone()
                        } else {
                            target.file_name.clone()
                        },
                        "name": cf_mod.name,
                    }),
                );
            }
        }
    }

    for project_id in mr_ids {
        let versions = modrinth::project_versions(&project_id, &mc_version, loader).await;
        if let Some(latest) = versions.first() {
            if let Some(primary) = latest.primary_file() {
                updates.insert(
                    project_id.clone(),
                    json!({
                        "latestFileId": latest.id,
                        "latestFileName": primary.filename,
                        "name": latest.name,
                    }),
                );
            }
        }
    }

    response::success(Some(json!({ "updates": updates })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_from_url_handles_queries() {
        assert_eq!(
            filename_from_url("https://cdn.example/files/123/jei-1.20.1.jar?sig=abc").unwrap(),
            "jei-1.20.1.jar"
        );
        assert_eq!(filename_from_url("https://cdn.example/"), None);
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
    }

    #[test]
    fn query_extraction_splits_camel_case_and_versions() {
        let (query, simple) = query_from_filename("ClothConfigAPI-11.1.106-forge.jar");
        assert_eq!(simple, "ClothConfigAPI");
        assert_eq!(query, "Cloth Config API");

        let (query, _) = query_from_filename("jei-1.20.1-forge-15.2.0.27.jar");
        assert_eq!(query, "jei");
    }

    #[test]
    fn candidate_matching_accepts_slug_and_containment() {
        assert!(candidate_matches("Just Enough Items", "jei", "jei", "jei"));
        assert!(candidate_matches(
            "Cloth Config API",
            "cloth-config",
            "Cloth Config",
            "ClothConfig"
        ));
        assert!(!candidate_matches(
            "Biomes O' Plenty",
            "biomes-o-plenty",
            "jei",
            "jei"
        ));
    }

    #[test]
    fn manifest_both_formats() {
        let cf = json!({ "files": [
            { "projectID": 238222, "fileID": 5846909 },
            { "projectID": 248787 },
        ]});
        assert_eq!(parse_manifest(&cf), vec![(238222, 5846909), (248787, 0)]);

        let instance = json!({ "installedAddons": [
            { "addonID": 60089, "installedFile": { "id": 3872122 } },
        ]});
        assert_eq!(parse_manifest(&instance), vec![(60089, 3872122)]);
    }
}
