// src/modules/catalog/resolve.rs

use super::{curseforge, is_mc_version, modrinth, Platform};

// A modpack version in the platform-neutral shape the metadata chain and
// the deploy flow both consume.
#[derive(Debug, Clone)]
pub struct VersionInfo {
    pub id: String,
    pub name: String,
    pub game_versions: Vec<String>,
    pub loaders: Vec<String>,
    pub date: String,
}

impl VersionInfo {
    pub fn first_mc_version(&self) -> Option<String> {
        self.game_versions.iter().find(|v| is_mc_version(v)).cloned()
    }

    pub fn first_loader(&self) -> Option<String> {
        self.loaders.first().map(|l| l.to_lowercase())
    }
}

// Newest-first version list for a modpack on either platform.
pub async fn modpack_versions(platform: Platform, id: &str, api_key: &str) -> Vec<VersionInfo> {
    match platform {
        Platform::Modrinth => modrinth::project_versions(id, "", None)
            .await
            .into_iter()
            .map(|v| VersionInfo {
                id: v.id.clone(),
                name: if v.name.is_empty() { v.version_number.clone() } else { v.name.clone() },
                game_versions: v.game_versions.clone(),
                loaders: v.loaders.clone(),
                date: v.date_published.clone(),
            })
            .collect(),
        Platform::CurseForge => {
            let mod_id = match id.parse::<u64>() {
                Ok(n) => Some(n),
                // A slug slipped in where an id was expected; resolve it.
                Err(_) => curseforge::search_by_slug(id, api_key).await.map(|m| m.id),
            };
            let Some(mod_id) = mod_id else { return Vec::new() };

            curseforge::files(mod_id, "", None, api_key)
                .await
                .iter()
                .map(|file| {
                    let (versions, loaders) = curseforge::split_game_versions(file);
                    VersionInfo {
                        id: file.id.to_string(),
                        name: file.display_name.clone(),
                        game_versions: versions,
                        loaders,
                        date: file.file_date.clone(),
                    }
                })
                .collect()
        }
    }
}

// Loaders a modpack supports, capitalized for display.
pub async fn modpack_loaders(
    platform: Platform,
    slug_or_id: &str,
    api_key: &str,
    modpack_id: Option<&str>,
) -> Vec<String> {
    match platform {
        Platform::Modrinth => modrinth::project_loaders(slug_or_id).await,
        Platform::CurseForge => {
            let id = match modpack_id.and_then(|m| m.parse::<u64>().ok()) {
                Some(id) => Some(id),
                None => curseforge::search_by_slug(slug_or_id, api_key).await.map(|m| m.id),
            };
            let Some(id) = id else { return Vec::new() };

            let files = curseforge::files(id, "", None, api_key).await;
            let Some(newest) = files.first() else { return Vec::new() };

            let mut loaders: Vec<String> = newest
                .game_versions
                .iter()
                .map(|gv| gv.to_lowercase())
                .filter(|gv| matches!(gv.as_str(), "fabric" | "forge" | "neoforge" | "quilt"))
                .map(|gv| {
                    let mut c = gv.chars();
                    match c.next() {
                        Some(first) => first.to_uppercase().collect::<String>() + c.as_str(),
                        None => gv,
                    }
                })
                .collect();
            loaders.dedup();
            loaders
        }
    }
}

// Minecraft version of one specific modpack version.
pub async fn minecraft_version(
    platform: Platform,
    id: &str,
    version_id: &str,
    api_key: &str,
) -> Option<String> {
    modpack_versions(platform, id, api_key)
        .await
        .iter()
        .find(|v| v.id == version_id)
        .and_then(|v| v.first_mc_version())
}

// Resolve the downloadable server pack for a CurseForge modpack. Resolution
// order: the caller's preferred file, the pack's declared server pack, a
// server-pack-looking latest file, any latest file with a url, then the same
// two passes over the full files list.
pub async fn server_pack_download(
    mod_id: u64,
    api_key: &str,
    preferred_file_id: Option<u64>,
) -> Option<(u64, String)> {
    let details = curseforge::mod_details(mod_id, api_key).await?;
    let server_pack_id = details.server_pack_file_id;

    let looks_like_server_pack = |file: &curseforge::CfFile| {
        if file.is_server_pack.unwrap_or(false) {
            return true;
        }
        if server_pack_id == Some(file.id) {
            return true;
        }
        let name = if file.display_name.is_empty() {
            file.file_name.to_lowercase()
        } else {
            file.display_name.to_lowercase()
        };
        name.contains("server")
    };

    if let Some(fid) = preferred_file_id {
        if let Some(url) = curseforge::file_download_url(mod_id, fid, api_key).await {
            return Some((fid, url));
        }
    }

    if let Some(fid) = server_pack_id {
        if let Some(url) = curseforge::file_download_url(mod_id, fid, api_key).await {
            return Some((fid, url));
        }
    }

    for file in &details.latest_files {
        if looks_like_server_pack(file) {
            if let Some(url) = &file.download_url {
                return Some((file.id, url.clone()));
            }
        }
    }
    for file in &details.latest_files {
        if let Some(url) = &file.download_url {
            return Some((file.id, url.clone()));
        }
    }

    let files = curseforge::files(mod_id, "", None, api_key).await;
    for file in &files {
        if looks_like_server_pack(file) {
            if let Some(url) = &file.download_url {
                return Some((file.id, url.clone()));
            }
        }
    }
    for file in &files {
        if let Some(url) = &file.download_url {
            return Some((file.id, url.clone()));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_info_picks_mc_version_over_loader_tag() {
        let info = VersionInfo {
            id: "123".into(),
            name: "ATM 10 1.5".into(),
            game_versions: vec!["1.21.1".into()],
            loaders: vec!["NeoForge".into()],
            date: String::new(),
        };
        assert_eq!(info.first_mc_version().unwrap(), "1.21.1");
        assert_eq!(info.first_loader().unwrap(), "neoforge");
    }
}
