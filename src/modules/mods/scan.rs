// src/modules/mods/scan.rs

use super::fingerprint;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::process::Command;

lazy_static! {
    static ref FILENAME_VERSION_DASH: Regex =
        Regex::new(r"-(\d+\.\d+(?:\.\d+)?(?:\.\d+)?)(?:-|$)").unwrap();
    static ref FILENAME_VERSION_UNDERSCORE: Regex =
        Regex::new(r"_(\d+\.\d+(?:\.\d+)?(?:\.\d+)?)(?:_|$)").unwrap();
    static ref LINE_COMMENT: Regex = Regex::new(r"(?m)//.*$").unwrap();
    static ref BLOCK_COMMENT: Regex = Regex::new(r"(?s)/\*.*?\*/").unwrap();
    static ref TRAILING_COMMA: Regex = Regex::new(r",\s*([\]\}])").unwrap();
}

#[derive(Debug, Clone, Default)]
pub struct ModInfo {
    pub mod_id: String,
    pub name: String,
    pub version: String,
    pub authors: Vec<String>,
    pub description: String,
    pub mc_version: String,
    pub loader: String,
}

// Reads one entry out of a jar. The jar is just a zip; `unzip -p` prints the
// entry to stdout and fails cleanly when it is absent.
async fn read_jar_entry(jar: &Path, entry: &str) -> Option<String> {
    let output = Command::new("unzip")
        .arg("-p")
        .arg(jar)
        .arg(entry)
        .output()
        .await
        .ok()?;
    if !output.status.success() || output.stdout.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).to_string())
}

// Metadata manifests in the order the loaders introduced them. First parse
// that yields a name wins.
pub async fn extract_mod_info(jar: &Path) -> ModInfo {
    let mut info = ModInfo {
        loader: "forge".to_string(),
        ..Default::default()
    };

    let candidates: [(&str, fn(&str) -> Option<ModInfo>, &str); 6] = [
        ("META-INF/mods.toml", parse_mods_toml, "forge"),
        ("META-INF/neoforge.mods.toml", parse_mods_toml, "neoforge"),
        ("mods.toml", parse_mods_toml, "forge"),
        ("mcmod.info", parse_mcmod_info, "forge"),
        ("fabric.mod.json", parse_fabric_mod_json, "fabric"),
        ("quilt.mod.json", parse_quilt_mod_json, "quilt"),
    ];

    for (entry, parser, loader) in candidates {
        if let Some(content) = read_jar_entry(jar, entry).await {
            if let Some(parsed) = parser(&content) {
                if !parsed.name.is_empty() {
                    info = parsed;
                    info.loader = loader.to_string();
                    break;
                }
            }
        }
    }

    // Forge templating leaks through unprocessed in some dev builds.
    if info.version.is_empty() || info.version == "${file.jarVersion}" {
        let file_name = jar.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        info.version = extract_version_from_filename(file_name);
    }

    info
}

// --- Manifest parsers ---

// Forge / NeoForge mods.toml: the first [[mods]] table describes the mod.
pub fn parse_mods_toml(content: &str) -> Option<ModInfo> {
    let value: toml::Value = toml::from_str(content).ok()?;
    let mods = value.get("mods")?.as_array()?;
    let entry = mods.first()?;

    let get = |key: &str| {
        entry
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    let authors = match entry.get("authors") {
        Some(toml::Value::String(s)) => vec![s.clone()],
        Some(toml::Value::Array(arr)) => arr
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };

    Some(ModInfo {
        mod_id: get("modId"),
        name: get("displayName"),
        version: get("version"),
        description: get("description").trim().to_string(),
        authors,
        ..Default::default()
    })
}

// Old-style JSON that routinely carries comments, BOMs and trailing commas.
pub fn clean_lenient_json(json: &str) -> String {
    let without_bom = json.strip_prefix('\u{feff}').unwrap_or(json);
    let no_blocks = BLOCK_COMMENT.replace_all(without_bom, "");
    let no_lines = LINE_COMMENT.replace_all(&no_blocks, "");
    TRAILING_COMMA.replace_all(&no_lines, "$1").to_string()
}

// Legacy Forge mcmod.info: an array of mod descriptors, or rarely a bare
// object.
pub fn parse_mcmod_info(content: &str) -> Option<ModInfo> {
    let value: Value = serde_json::from_str(&clean_lenient_json(content)).ok()?;
    let entry = match &value {
        Value::Array(arr) => arr.first()?.clone(),
        other => other.clone(),
    };

    let get = |key: &str| {
        entry
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    let authors = entry
        .get("authorList")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Some(ModInfo {
        mod_id: get("modid"),
        name: get("name"),
        version: get("version"),
        description: get("description"),
        mc_version: get("mcversion"),
        authors,
        ..Default::default()
    })
}

pub fn parse_fabric_mod_json(content: &str) -> Option<ModInfo> {
    let value: Value = serde_json::from_str(&clean_lenient_json(content)).ok()?;

    let get = |key: &str| {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    // Authors are either strings or {name} objects.
    let authors = value
        .get("authors")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .map(|a| match a {
                    Value::String(s) => s.clone(),
                    other => other
                        .get("name")
                        .and_then(|n| n.as_str())
                        .unwrap_or("Unknown")
                        .to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    Some(ModInfo {
        mod_id: get("id"),
        name: get("name"),
        version: get("version"),
        description: get("description"),
        authors,
        ..Default::default()
    })
}

pub fn parse_quilt_mod_json(content: &str) -> Option<ModInfo> {
    let value: Value = serde_json::from_str(&clean_lenient_json(content)).ok()?;
    let loader = value.get("quilt_loader")?;

    let metadata = loader.get("metadata");
    let meta_get = |key: &str| {
        metadata
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    Some(ModInfo {
        mod_id: loader
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        name: meta_get("name"),
        version: loader
            .get("version")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        description: meta_get("description"),
        ..Default::default()
    })
}

pub fn extract_version_from_filename(filename: &str) -> String {
    let name = filename.strip_suffix(".jar").unwrap_or(filename);

    if let Some(c) = FILENAME_VERSION_DASH.captures(name) {
        return c[1].to_string();
    }
    if let Some(c) = FILENAME_VERSION_UNDERSCORE.captures(name) {
        return c[1].to_string();
    }
    "Unknown".to_string()
}

// --- Directory scan ---

fn collect_jars(dir: &Path, jars: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_jars(&path, jars);
        } else if path.extension().map(|e| e == "jar").unwrap_or(false) {
            jars.push(path);
        }
    }
}

// Scans <data>/mods and returns the dashboard-facing mod rows.
pub async fn scan_server_mods(data_dir: &str) -> Vec<Value> {
    let mods_dir = Path::new(data_dir).join("mods");
    if !mods_dir.is_dir() {
        return Vec::new();
    }

    let mut jars = Vec::new();
    collect_jars(&mods_dir, &mut jars);
    jars.sort();

    let mut mods = Vec::new();
    for jar in jars {
        let file_name = jar
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        // Loader jars live alongside the mods but are not mods.
        if file_name.starts_with("forge-") || file_name.starts_with("fabric-loader") {
            continue;
        }

        let file_size = fs::metadata(&jar).map(|m| m.len()).unwrap_or(0);
        let info = extract_mod_info(&jar).await;
        let hash = fingerprint::hash_file(&jar).unwrap_or(0);

        let relative = jar
            .strip_prefix(&mods_dir)
            .ok()
            .and_then(|p| p.to_str())
            .unwrap_or(&file_name)
            .to_string();

        mods.push(json!({
            "fileName": file_name,
            "filePath": jar.to_string_lossy(),
            "relativePath": relative,
            "fileSize": file_size,
            "modId": info.mod_id,
            "name": if info.name.is_empty() { file_name.clone() } else { info.name.clone() },
            "version": if info.version.is_empty() { "Unknown".to_string() } else { info.version.clone() },
            "authors": info.authors,
            "description": info.description,
            "mcVersion": info.mc_version,
            "loader": info.loader,
            "hash": hash,
        }));
    }

    mods
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mods_toml_first_entry_wins() {
        let toml = r#"
modLoader = "javafml"
loaderVersion = "[47,)"

[[mods]]
modId = "examplemod"
version = "2.1.0"
displayName = "Example Mod"
description = '''
A mod that
does things.
'''
authors = "Dev One"

[[mods]]
modId = "secondary"
displayName = "Secondary"
"#;
        let info = parse_mods_toml(toml).unwrap();
        assert_eq!(info.mod_id, "examplemod");
        assert_eq!(info.name, "Example Mod");
        assert_eq!(info.version, "2.1.0");
        assert_eq!(info.authors, vec!["Dev One"]);
        assert!(info.description.starts_with("A mod that"));
    }

    #[test]
    fn mcmod_info_survives_comments_and_trailing_commas() {
        let raw = "\u{feff}[\n  {\n    // legacy metadata\n    \"modid\": \"jei\",\n    \"name\": \"Just Enough Items\",\n    \"version\": \"4.16.1\",\n    \"mcversion\": \"1.12.2\",\n    \"authorList\": [\"mezz\",],\n  },\n]";
        let info = parse_mcmod_info(raw).unwrap();
        assert_eq!(info.mod_id, "jei");
        assert_eq!(info.name, "Just Enough Items");
        assert_eq!(info.mc_version, "1.12.2");
        assert_eq!(info.authors, vec!["mezz"]);
    }

    #[test]
    fn fabric_authors_accept_objects_and_strings() {
        let raw = r#"{
            "id": "sodium",
            "name": "Sodium",
            "version": "0.5.8",
            "authors": ["jellysquid3", {"name": "IMS"}]
        }"#;
        let info = parse_fabric_mod_json(raw).unwrap();
        assert_eq!(info.authors, vec!["jellysquid3", "IMS"]);
    }

    #[test]
    fn quilt_metadata_is_nested() {
        let raw = r#"{
            "quilt_loader": {
                "id": "ok_zoomer",
                "version": "5.0.0",
                "metadata": { "name": "Ok Zoomer", "description": "Zoom." }
            }
        }"#;
        let info = parse_quilt_mod_json(raw).unwrap();
        assert_eq!(info.mod_id, "ok_zoomer");
        assert_eq!(info.name, "Ok Zoomer");
        assert_eq!(info.version, "5.0.0");
    }

    #[test]
    fn filename_version_fallback() {
        assert_eq!(extract_version_from_filename("jei-1.20.1-forge-15.2.0.27.jar"), "1.20.1");
        assert_eq!(extract_version_from_filename("create_6.0.4.jar"), "6.0.4");
        assert_eq!(extract_version_from_filename("mysterymod.jar"), "Unknown");
    }

    #[test]
    fn byte_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
    }
}
