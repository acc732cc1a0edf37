// src/modules/catalog/handlers.rs

use super::{curseforge, modrinth, Loader, Platform};
use crate::core::response;
use crate::modules::docker::inspect;
use crate::modules::metadata::reconcile;
use crate::modules::settings::handlers::Settings;
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub source: String,
    pub search: String,
    pub q: String,
    pub version: String,
    pub loader: String,
    pub server_id: String,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl SearchQuery {
    fn term(&self) -> &str {
        if self.search.is_empty() { &self.q } else { &self.search }
    }

    fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(20).clamp(1, 100)
    }
}

// GET /v1/modpacks
pub async fn modpacks_handler(Query(query): Query<SearchQuery>) -> Response {
    let page = query.page();
    let page_size = query.page_size();

    match Platform::parse(&query.source) {
        Platform::Modrinth => {
            match modrinth::search("modpack", query.term(), "", None, page, page_size).await {
                Some((packs, _total)) => response::success(Some(json!({
                    "packs": packs,
                    "source": "modrinth",
                    "page": page,
                }))),
                None => response::error(StatusCode::BAD_GATEWAY, "Failed to contact Modrinth"),
            }
        }
        Platform::CurseForge => {
            let api_key = Settings::load().curseforge_api_key();
            if api_key.is_empty() {
                return response::bad_request("CurseForge API key not configured");
            }
            match curseforge::search_modpacks(query.term(), page, page_size, &api_key).await {
                Some(packs) => response::success(Some(json!({
                    "packs": packs,
                    "source": "curseforge",
                    "page": page,
                }))),
                None => response::error(StatusCode::BAD_GATEWAY, "Failed to contact CurseForge"),
            }
        }
    }
}

// Fills in version/loader from the server container when the caller left
// them blank.
async fn detect_context(query: &SearchQuery) -> (String, Option<Loader>) {
    let mut version = query.version.clone();
    let mut loader = Loader::parse(&query.loader);

    if (version.is_empty() || loader.is_none()) && !query.server_id.is_empty() {
        if let Some(detail) = inspect::inspect(&query.server_id).await {
            let api_key = Settings::load().curseforge_api_key();
            let meta = reconcile::server_metadata(
                &detail.env_map(),
                &detail.container_name(),
                &api_key,
            )
            .await;
            if version.is_empty() {
                version = meta.mc_version;
            }
            if loader.is_none() {
                loader = Loader::parse(&meta.loader);
            }
        }
    }
    (version, loader)
}

// GET /v1/mods/search
pub async fn mod_search_handler(Query(query): Query<SearchQuery>) -> Response {
    let page = query.page();
    let page_size = query.page_size();
    let (version, loader) = detect_context(&query).await;

    let result = match Platform::parse(&query.source) {
        Platform::Modrinth => {
            modrinth::search("mod", query.term(), &version, loader, page, page_size).await
        }
        Platform::CurseForge => {
            let api_key = Settings::load().curseforge_api_key();
            if api_key.is_empty() {
                return response::bad_request("CurseForge API key not configured");
            }
            curseforge::search_mods(query.term(), &version, loader, page, page_size, &api_key).await
        }
    };

    match result {
        Some((mods, total)) => {
            let has_more = (page as u64) * (page_size as u64) < total;
            response::success(Some(json!({
                "mods": mods,
                "page": page,
                "pageSize": page_size,
                "total": total,
                "hasMore": has_more,
                "version": version,
                "loader": loader.map(|l| l.as_str()),
            })))
        }
        None => response::error(StatusCode::BAD_GATEWAY, "Failed to contact mod catalog"),
    }
}

// GET /v1/mods/{source}/{mod_id}/files
pub async fn mod_files_handler(
    Path((source, mod_id)): Path<(String, String)>,
    Query(query): Query<SearchQuery>,
) -> Response {
    let (version, loader) = detect_context(&query).await;

    match Platform::parse(&source) {
        Platform::Modrinth => {
            let files = modrinth::project_files(&mod_id, &version, loader).await;
            response::success(Some(json!({ "files": files })))
        }
        Platform::CurseForge => {
            let api_key = Settings::load().curseforge_api_key();
            if api_key.is_empty() {
                return response::bad_request("CurseForge API key not configured");
            }
            let Ok(numeric_id) = mod_id.parse::<u64>() else {
                return response::bad_request("Invalid mod ID");
            };
            let files = curseforge::files(numeric_id, &version, loader, &api_key).await;
            response::success(Some(json!({ "files": files })))
        }
    }
}

#[derive(Deserialize)]
pub struct JavaDetectQuery {
    #[serde(default, rename = "modpackUrl")]
    pub modpack_url: String,
}

// Suggests a Java major from whatever version hints the pack URL carries.
pub fn suggest_java(reference: &str) -> &'static str {
    if reference.contains("1.20") || reference.contains("1.21") {
        "21"
    } else if reference.contains("1.16") || reference.contains("1.12") {
        "8"
    } else {
        "17"
    }
}

// GET /v1/java/detect
pub async fn java_detect_handler(Query(query): Query<JavaDetectQuery>) -> Response {
    if query.modpack_url.is_empty() {
        return response::bad_request("Missing modpack URL");
    }
    response::success(Some(json!({ "javaVersion": suggest_java(&query.modpack_url) })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn java_suggestion_buckets() {
        assert_eq!(suggest_java("https://cf.example/atm10-1.21.1-server.zip"), "21");
        assert_eq!(suggest_java("stoneblock-1.12.2"), "8");
        assert_eq!(suggest_java("some-1.18.2-pack"), "17");
    }
}
