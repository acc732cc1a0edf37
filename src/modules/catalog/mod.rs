// src/modules/catalog/mod.rs

pub mod curseforge;
pub mod handlers;
pub mod modrinth;
pub mod resolve;

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;

lazy_static! {
    static ref HTTP: Client = Client::builder()
        .user_agent(format!("moddock/{}", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(20))
        .build()
        .expect("Failed to build HTTP client");
    static ref MC_VERSION_RE: Regex = Regex::new(r"^\d+\.\d+(\.\d+)?$").unwrap();
}

pub fn http_client() -> &'static Client {
    &HTTP
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    CurseForge,
    Modrinth,
}

impl Platform {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "modrinth" => Platform::Modrinth,
            _ => Platform::CurseForge,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::CurseForge => "curseforge",
            Platform::Modrinth => "modrinth",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loader {
    Forge,
    Fabric,
    Quilt,
    NeoForge,
}

impl Loader {
    // Loader names arrive from env vars, catalog tags and user input with
    // arbitrary casing and surrounding noise, so this is a substring match.
    // neoforge must be checked before forge.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.to_lowercase();
        if s.contains("neoforge") {
            Some(Loader::NeoForge)
        } else if s.contains("forge") {
            Some(Loader::Forge)
        } else if s.contains("fabric") {
            Some(Loader::Fabric)
        } else if s.contains("quilt") {
            Some(Loader::Quilt)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Loader::Forge => "forge",
            Loader::Fabric => "fabric",
            Loader::Quilt => "quilt",
            Loader::NeoForge => "neoforge",
        }
    }

    // CurseForge modLoaderType ids.
    pub fn curseforge_id(&self) -> u8 {
        match self {
            Loader::Forge => 1,
            Loader::Fabric => 4,
            Loader::Quilt => 5,
            Loader::NeoForge => 6,
        }
    }

    pub fn from_curseforge_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Loader::Forge),
            4 => Some(Loader::Fabric),
            5 => Some(Loader::Quilt),
            6 => Some(Loader::NeoForge),
            _ => None,
        }
    }
}

// Catalog listings tag files with a mix of game versions and loader names;
// anything shaped like x.y or x.y.z is a Minecraft version.
pub fn is_mc_version(tag: &str) -> bool {
    MC_VERSION_RE.is_match(tag)
}

// Minimal query-string escaping; both catalogs take form-style queries.
pub fn urlencode(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            b' ' => "+".to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}

// 1234 -> "1.2K", 5600000 -> "5.6M"
pub fn format_downloads(count: u64) -> String {
    if count >= 1_000_000 {
        let v = (count as f64 / 100_000.0).round() / 10.0;
        format!("{}M", v)
    } else if count >= 1_000 {
        let v = (count as f64 / 100.0).round() / 10.0;
        format!("{}K", v)
    } else {
        count.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_parse_prefers_neoforge_over_forge() {
        assert_eq!(Loader::parse("NeoForge"), Some(Loader::NeoForge));
        assert_eq!(Loader::parse("AUTO_CURSEFORGE forge"), Some(Loader::Forge));
        assert_eq!(Loader::parse("FABRIC"), Some(Loader::Fabric));
        assert_eq!(Loader::parse("vanilla"), None);
    }

    #[test]
    fn loader_ids_round_trip() {
        for loader in [Loader::Forge, Loader::Fabric, Loader::Quilt, Loader::NeoForge] {
            assert_eq!(Loader::from_curseforge_id(loader.curseforge_id()), Some(loader));
        }
    }

    #[test]
    fn mc_version_shape() {
        assert!(is_mc_version("1.21"));
        assert!(is_mc_version("1.20.1"));
        assert!(!is_mc_version("Forge"));
        assert!(!is_mc_version("1.20.1-rc1"));
    }

    #[test]
    fn download_formatting() {
        assert_eq!(format_downloads(999), "999");
        assert_eq!(format_downloads(1_234), "1.2K");
        assert_eq!(format_downloads(5_600_000), "5.6M");
    }
}
