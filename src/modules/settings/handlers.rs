// src/modules/settings/handlers.rs

use super::ini;
use crate::common::env::CONFIG;
use crate::common::log::{log, LogLevel};
use crate::core::response;
use axum::response::Response;
use axum::Json;
use serde_json::{json, Map, Value};
use std::path::PathBuf;

const STRING_FIELDS: [&str; 7] = [
    "default_server_name",
    "default_port",
    "default_memory",
    "default_max_players",
    "default_ip",
    "default_whitelist",
    "default_icon_url",
];

const BOOL_FIELDS: [&str; 10] = [
    "default_pvp",
    "default_hardcore",
    "default_allow_flight",
    "default_command_blocks",
    "default_rolling_logs",
    "default_log_timestamp",
    "default_direct_console",
    "default_aikar_flags",
    "default_meowice_flags",
    "default_graalvm_flags",
];

pub fn defaults() -> Vec<(String, String)> {
    [
        ("curseforge_api_key", ""),
        ("default_server_name", "My Modpack Server"),
        ("default_port", "25565"),
        ("default_memory", "4G"),
        ("default_max_players", "20"),
        ("default_ip", "0.0.0.0"),
        ("default_whitelist", ""),
        ("default_icon_url", ""),
        ("default_pvp", "true"),
        ("default_hardcore", "false"),
        ("default_allow_flight", "false"),
        ("default_command_blocks", "true"),
        ("default_rolling_logs", "true"),
        ("default_log_timestamp", "true"),
        ("default_direct_console", "false"),
        ("default_aikar_flags", "true"),
        ("default_meowice_flags", "false"),
        ("default_graalvm_flags", "false"),
        ("jvm_flags", ""),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Debug, Clone)]
pub struct Settings {
    pairs: Vec<(String, String)>,
}

impl Settings {
    // Compiled defaults overlaid with whatever the settings file holds.
    // Unknown keys from the file ride along untouched.
    pub fn load() -> Self {
        let mut pairs = defaults();
        for (key, value) in ini::read_file(&settings_path()) {
            match pairs.iter_mut().find(|(k, _)| *k == key) {
                Some(existing) => existing.1 = value,
                None => pairs.push((key, value)),
            }
        }
        Settings { pairs }
    }

    pub fn get(&self, key: &str) -> &str {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    pub fn set(&mut self, key: &str, value: String) {
        match self.pairs.iter_mut().find(|(k, _)| k == key) {
            Some(existing) => existing.1 = value,
            None => self.pairs.push((key.to_string(), value)),
        }
    }

    pub fn bool(&self, key: &str) -> bool {
        bool_input(Some(&Value::String(self.get(key).to_string())), false)
    }

    pub fn curseforge_api_key(&self) -> String {
        self.get("curseforge_api_key").to_string()
    }

    pub fn save(&self) -> std::io::Result<()> {
        ini::write_file(&settings_path(), &self.pairs)
    }

    fn public_view(&self) -> Value {
        let mut out = Map::new();
        for (key, value) in &self.pairs {
            if key == "curseforge_api_key" {
                continue;
            }
            out.insert(key.clone(), Value::String(value.clone()));
        }
        let api_key = self.curseforge_api_key();
        out.insert("has_curseforge_key".into(), Value::Bool(!api_key.is_empty()));
        out.insert(
            "curseforge_api_key_masked".into(),
            Value::String(mask_key(&api_key)),
        );
        Value::Object(out)
    }
}

fn settings_path() -> PathBuf {
    PathBuf::from(CONFIG.settings_path())
}

pub fn mask_key(key: &str) -> String {
    if key.is_empty() {
        String::new()
    } else {
        format!("{}...", key.chars().take(8).collect::<String>())
    }
}

// Normalizes boolean-ish inputs ("false", "0", "", 1, true) to bool.
pub fn bool_input(value: Option<&Value>, default: bool) -> bool {
    match value {
        None | Some(Value::Null) => default,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(default),
        Some(Value::String(s)) => {
            let v = s.trim().to_lowercase();
            !(v.is_empty() || v == "0" || v == "false" || v == "off" || v == "no")
        }
        Some(_) => default,
    }
}

// Parse memory strings like "8G", "512M", "1.5GiB" into MB.
pub fn parse_memory_mb(value: &str) -> f64 {
    let v = value.trim();
    if v.is_empty() {
        return 0.0;
    }
    let num: String = v
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let num: f64 = num.parse().unwrap_or(0.0);
    let unit: String = v
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_lowercase();

    match unit.as_str() {
        "gib" | "g" | "gb" => num * 1024.0,
        "mib" | "m" | "mb" => num,
        "kib" | "k" | "kb" => num / 1024.0,
        "tib" | "t" | "tb" => num * 1024.0 * 1024.0,
        _ => num, // assume MB if no unit
    }
}

// --- Handlers ---

// GET /v1/settings
pub async fn get_settings_handler() -> Response {
    response::success(Some(Settings::load().public_view()))
}

// POST /v1/settings
pub async fn save_settings_handler(Json(input): Json<Value>) -> Response {
    let Some(data) = input.as_object() else {
        return response::bad_request("No input data received");
    };

    let mut settings = Settings::load();

    if let Some(key) = data.get("curseforge_api_key").and_then(|v| v.as_str()) {
        settings.set("curseforge_api_key", key.trim().to_string());
    }

    for field in STRING_FIELDS.iter().chain(["jvm_flags"].iter()) {
        if let Some(value) = data.get(*field) {
            let text = match value {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                _ => continue,
            };
            settings.set(field, text);
        }
    }

    for field in BOOL_FIELDS.iter() {
        if data.contains_key(*field) {
            let current = settings.bool(field);
            let value = bool_input(data.get(*field), current);
            settings.set(field, value.to_string());
        }
    }

    match settings.save() {
        Ok(()) => {
            log(LogLevel::Info, "✓ Settings saved");
            response::success(Some(json!({ "message": "Settings saved successfully" })))
        }
        Err(e) => {
            log(LogLevel::Error, &format!("✗ Failed to write settings: {}", e));
            response::error(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to write config file. {}", e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_input_accepts_the_usual_spellings() {
        assert!(bool_input(Some(&Value::String("true".into())), false));
        assert!(bool_input(Some(&Value::String("1".into())), false));
        assert!(!bool_input(Some(&Value::String("off".into())), true));
        assert!(!bool_input(Some(&Value::String("".into())), true));
        assert!(bool_input(Some(&Value::Bool(true)), false));
        assert!(bool_input(None, true));
    }

    #[test]
    fn memory_parsing_covers_suffix_families() {
        assert_eq!(parse_memory_mb("4G"), 4096.0);
        assert_eq!(parse_memory_mb("512M"), 512.0);
        assert_eq!(parse_memory_mb("1.5GiB"), 1536.0);
        assert_eq!(parse_memory_mb("2048"), 2048.0);
        assert_eq!(parse_memory_mb(""), 0.0);
    }

    #[test]
    fn key_masking_shows_prefix_only() {
        assert_eq!(mask_key("$2a$10$abcdefgh12345"), "$2a$10$a...");
        assert_eq!(mask_key(""), "");
    }
}
