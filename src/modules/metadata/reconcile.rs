// src/modules/metadata/reconcile.rs

use super::store;
use crate::modules::catalog::{resolve, Loader, Platform};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;

lazy_static! {
    static ref VERSION_IN_TEXT: Regex = Regex::new(r"\d+\.\d+(\.\d+)?").unwrap();
    static ref NAME_SUFFIX: Regex = Regex::new(r"^(.*?)-[a-f0-9]{6}$").unwrap();
}

#[derive(Debug, Clone, Default)]
pub struct ServerMetadata {
    pub mc_version: String,
    pub loader: String,
    pub modpack_version: String,
    pub debug: Value,
}

// Works out a server's Minecraft version and mod loader from whatever is
// available, cheapest source first, stopping once both are known:
//
//   1. the local server record,
//   2. the container's environment variables,
//   3. the catalogs, keyed by whatever modpack identity can be scraped
//      together from record + env (slug guessed from the container name).
//
// The order is load-bearing: it is what the dashboard has always shown, and
// the catalog steps cost a network round trip each.
pub async fn server_metadata(
    env: &HashMap<String, String>,
    container_name: &str,
    api_key: &str,
) -> ServerMetadata {
    let mut mc_version = String::new();
    let mut loader = String::new();
    let mut modpack_version = String::new();
    let mut debug = serde_json::Map::new();

    // 1. Local record
    let record = store::configs_by_container().remove(container_name);
    if let Some(cfg) = &record {
        mc_version = cfg.mc_version.clone();
        loader = cfg.loader.clone();
        modpack_version = cfg.modpack_version.clone();
    }
    debug.insert(
        "localConfig".into(),
        json!({ "mcVersion": mc_version, "loader": loader }),
    );

    // 2. Environment variables
    if mc_version.is_empty() {
        if let Some(v) = version_from_env(env) {
            mc_version = v;
        }
    }
    if loader.is_empty() {
        if let Some(l) = loader_from_env(env) {
            loader = l.as_str().to_string();
        }
    }
    debug.insert(
        "envCheck".into(),
        json!({ "mcVersion": mc_version, "loader": loader }),
    );

    if !mc_version.is_empty() && !loader.is_empty() {
        return ServerMetadata {
            mc_version,
            loader,
            modpack_version,
            debug: Value::Object(debug),
        };
    }

    // 3. Catalog backfill
    let slug = record
        .as_ref()
        .map(|c| c.slug.clone())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            if mc_version.is_empty() {
                Some(guess_slug(container_name))
            } else {
                None
            }
        });

    let record_modpack_id = record
        .as_ref()
        .map(|c| c.modpack_id.clone())
        .filter(|s| !s.is_empty());
    let record_version = record
        .as_ref()
        .map(|c| c.modpack_version.clone())
        .filter(|s| !s.is_empty());
    let record_platform = record
        .as_ref()
        .map(|c| c.platform.clone())
        .filter(|s| !s.is_empty());

    let cf_modpack_id = env
        .get("CF_MODPACK_ID")
        .cloned()
        .or_else(|| record_modpack_id.clone());
    let cf_file_id = env.get("CF_FILE_ID").cloned().or_else(|| record_version.clone());
    let mr_project_id = env
        .get("MODRINTH_ID")
        .or_else(|| env.get("MODRINTH_PROJECT"))
        .cloned()
        .or_else(|| {
            if record_platform.as_deref() == Some("modrinth") {
                record_modpack_id.clone()
            } else {
                None
            }
        });
    let mr_version_id = env.get("MODRINTH_VERSION").cloned().or_else(|| {
        if record_platform.as_deref() == Some("modrinth") {
            record_version.clone()
        } else {
            None
        }
    });

    debug.insert(
        "backfillSource".into(),
        json!({
            "cfModpackId": cf_modpack_id,
            "cfFileId": cf_file_id,
            "mrProjectId": mr_project_id,
            "mrVersionId": mr_version_id,
            "slug": slug,
        }),
    );

    // CurseForge first, it is where most adopted containers come from.
    if (mc_version.is_empty() || loader.is_empty())
        && !api_key.is_empty()
        && (cf_modpack_id.is_some() || slug.is_some())
    {
        let target_id = cf_modpack_id
            .clone()
            .or_else(|| slug.clone())
            .unwrap_or_default();
        let mut target_file = cf_file_id.clone().unwrap_or_default();

        if !target_id.is_empty() && target_file.is_empty() {
            let versions = resolve::modpack_versions(Platform::CurseForge, &target_id, api_key).await;
            if let Some(latest) = versions.first() {
                target_file = latest.id.clone();
                if mc_version.is_empty() {
                    if let Some(v) = latest.first_mc_version() {
                        mc_version = v;
                    }
                }
                if loader.is_empty() {
                    if let Some(l) = latest.first_loader() {
                        loader = l;
                    }
                }
                if modpack_version.is_empty() {
                    modpack_version = latest.name.clone();
                }
                debug.insert(
                    "cfBackfillLatest".into(),
                    json!({ "fileId": target_file, "mcVersion": mc_version, "loader": loader }),
                );
            }
        }

        if !target_id.is_empty() && !target_file.is_empty() {
            if mc_version.is_empty() {
                if let Some(v) =
                    resolve::minecraft_version(Platform::CurseForge, &target_id, &target_file, api_key)
                        .await
                {
                    mc_version = v;
                }
            }
            if loader.is_empty() {
                let lookup = slug.clone().unwrap_or_else(|| target_id.clone());
                let loaders = resolve::modpack_loaders(
                    Platform::CurseForge,
                    &lookup,
                    api_key,
                    Some(target_id.as_str()),
                )
                .await;
                if let Some(first) = loaders.first() {
                    loader = first.to_lowercase();
                }
            }
            debug.insert(
                "cfBackfillTarget".into(),
                json!({ "mcVersion": mc_version, "loader": loader }),
            );
        }
    }

    // Modrinth second.
    if (mc_version.is_empty() || loader.is_empty()) && mr_project_id.is_some() {
        let project = mr_project_id.unwrap_or_default();
        let mut version_id = mr_version_id.unwrap_or_default();

        if version_id.is_empty() {
            let versions = resolve::modpack_versions(Platform::Modrinth, &project, "").await;
            if let Some(latest) = versions.first() {
                version_id = latest.id.clone();
                if mc_version.is_empty() {
                    if let Some(v) = latest.game_versions.first() {
                        mc_version = v.clone();
                    }
                }
                if loader.is_empty() {
                    if let Some(l) = latest.first_loader() {
                        loader = l;
                    }
                }
                if modpack_version.is_empty() {
                    modpack_version = latest.name.clone();
                }
            }
        }

        if !project.is_empty() && !version_id.is_empty() {
            if mc_version.is_empty() {
                if let Some(v) =
                    resolve::minecraft_version(Platform::Modrinth, &project, &version_id, "").await
                {
                    mc_version = v;
                }
            }
            if loader.is_empty() {
                let loaders = resolve::modpack_loaders(Platform::Modrinth, &project, "", None).await;
                if let Some(first) = loaders.first() {
                    loader = first.to_lowercase();
                }
            }
            debug.insert(
                "mrBackfill".into(),
                json!({ "mcVersion": mc_version, "loader": loader }),
            );
        }
    }

    ServerMetadata {
        mc_version,
        loader,
        modpack_version,
        debug: Value::Object(debug),
    }
}

// First x.y[.z] found in any of the version env vars.
pub fn version_from_env(env: &HashMap<String, String>) -> Option<String> {
    for key in ["VERSION", "MINECRAFT_VERSION", "SERVER_VERSION", "MODRINTH_VERSION"] {
        if let Some(value) = env.get(key) {
            if let Some(m) = VERSION_IN_TEXT.find(value) {
                return Some(m.as_str().to_string());
            }
        }
    }
    None
}

pub fn loader_from_env(env: &HashMap<String, String>) -> Option<Loader> {
    for key in ["TYPE", "GAME_TYPE", "MODRINTH_LOADER"] {
        if let Some(value) = env.get(key) {
            if let Some(loader) = Loader::parse(value) {
                return Some(loader);
            }
        }
    }
    None
}

// atm10-47a4db -> atm10; names without our suffix pass through unchanged.
pub fn guess_slug(container_name: &str) -> String {
    NAME_SUFFIX
        .captures(container_name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| container_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn version_extracted_from_noisy_env_value() {
        let e = env(&[("VERSION", "java17-1.20.1-latest")]);
        assert_eq!(version_from_env(&e).unwrap(), "1.20.1");
        assert_eq!(version_from_env(&env(&[("TYPE", "FORGE")])), None);
    }

    #[test]
    fn env_var_precedence_matches_chain() {
        let e = env(&[("MINECRAFT_VERSION", "1.19.2"), ("VERSION", "1.21")]);
        assert_eq!(version_from_env(&e).unwrap(), "1.21");
    }

    #[test]
    fn loader_detected_from_type_env() {
        // AUTO_CURSEFORGE contains "forge"; substring matching reads it as
        // the forge loader, which is what those packs overwhelmingly are.
        assert_eq!(
            loader_from_env(&env(&[("TYPE", "AUTO_CURSEFORGE")])),
            Some(Loader::Forge)
        );
        assert_eq!(
            loader_from_env(&env(&[("TYPE", "NEOFORGE")])),
            Some(Loader::NeoForge)
        );
        assert_eq!(
            loader_from_env(&env(&[("MODRINTH_LOADER", "fabric")])),
            Some(Loader::Fabric)
        );
        assert_eq!(loader_from_env(&env(&[("TYPE", "VANILLA")])), None);
    }

    #[test]
    fn slug_guess_strips_deploy_suffix() {
        assert_eq!(guess_slug("all-the-mods-10-47a4db"), "all-the-mods-10");
        assert_eq!(guess_slug("myserver"), "myserver");
        // Six hex chars only; longer tails are part of the name.
        assert_eq!(guess_slug("pack-deadbeef"), "pack-deadbeef");
    }
}
