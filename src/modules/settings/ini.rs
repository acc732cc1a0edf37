// src/modules/settings/ini.rs

use std::fs;
use std::io;
use std::path::Path;

// The host platform stores plugin settings as flat `key = "value"` files.
// Order is kept so a hand-edited file survives a rewrite recognizably.

pub fn parse(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        // Section headers are accepted but flattened; the settings file
        // never uses them.
        if line.starts_with('[') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_string();
        let mut value = value.trim();
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = &value[1..value.len() - 1];
        }
        if !key.is_empty() {
            pairs.push((key, value.to_string()));
        }
    }
    pairs
}

pub fn serialize(pairs: &[(String, String)]) -> String {
    let mut content = String::new();
    for (key, value) in pairs {
        if value.is_empty() {
            content.push_str(&format!("{} = \n", key));
        } else {
            content.push_str(&format!("{} = \"{}\"\n", key, value.replace('"', "\\\"")));
        }
    }
    content
}

pub fn read_file(path: &Path) -> Vec<(String, String)> {
    fs::read_to_string(path)
        .map(|content| parse(&content))
        .unwrap_or_default()
}

// Write through a temp file so a crash mid-write never truncates the
// settings the whole plugin boots from.
pub fn write_file(path: &Path, pairs: &[(String, String)]) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("cfg.tmp");
    fs::write(&tmp, serialize(pairs))?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strips_quotes_and_comments() {
        let content = r#"
; plugin settings
curseforge_api_key = "$2a$10$abcdef"
default_port = "25565"
default_memory = 4G
empty_value =
# trailing comment line
"#;
        let pairs = parse(content);
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs[0], ("curseforge_api_key".to_string(), "$2a$10$abcdef".to_string()));
        assert_eq!(pairs[2], ("default_memory".to_string(), "4G".to_string()));
        assert_eq!(pairs[3].1, "");
    }

    #[test]
    fn round_trip_preserves_order_and_values() {
        let pairs = vec![
            ("b_key".to_string(), "two words".to_string()),
            ("a_key".to_string(), "".to_string()),
            ("c_key".to_string(), "true".to_string()),
        ];
        let parsed = parse(&serialize(&pairs));
        assert_eq!(parsed, pairs);
    }

    #[test]
    fn embedded_quotes_survive_serialization() {
        let pairs = vec![("name".to_string(), "My \"Cool\" Server".to_string())];
        let out = serialize(&pairs);
        assert!(out.contains("\\\"Cool\\\""));
    }
}
