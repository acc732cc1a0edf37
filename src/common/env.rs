// src/common/env.rs

use dotenvy::dotenv;
use lazy_static::lazy_static;
use std::env;

// Holds all configuration variables for the application.
pub struct Config {
    pub stage: String,
    pub log_level: String,
    pub port: u16,
    // Root of the flat-file system of record (settings + server records).
    pub config_dir: String,
    // Root under which every server's /data directory lives.
    pub appdata_dir: String,
    pub backup_dir: String,
    // Origin allowed to call the API from a browser. "*" disables the check.
    pub dashboard_origin: String,
}

impl Config {
    fn from_env() -> Self {
        dotenv().ok();
        // --- Required Variables ---
        let stage = env::var("STAGE")
            .expect("FATAL: Missing required environment variable: STAGE");
        // --- Optional Variables ---
        let log_level = env::var("LOG_LEVEL")
            .unwrap_or_else(|_| "info".to_string());
        let port = env::var("MODDOCK_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30653);
        let config_dir = env::var("MODDOCK_CONFIG_DIR")
            .unwrap_or_else(|_| "/boot/config/plugins/moddock".to_string());
        let appdata_dir = env::var("MODDOCK_APPDATA_DIR")
            .unwrap_or_else(|_| "/mnt/user/appdata".to_string());
        let backup_dir = env::var("MODDOCK_BACKUP_DIR")
            .unwrap_or_else(|_| "/mnt/user/appdata/backups".to_string());
        let dashboard_origin = env::var("MODDOCK_DASHBOARD_ORIGIN")
            .unwrap_or_else(|_| "*".to_string());
        Config {
            stage,
            log_level,
            port,
            config_dir,
            appdata_dir,
            backup_dir,
            dashboard_origin,
        }
    }

    pub fn servers_dir(&self) -> String {
        format!("{}/servers", self.config_dir)
    }

    pub fn settings_path(&self) -> String {
        format!("{}/moddock.cfg", self.config_dir)
    }
}

// Use lazy_static to create a globally accessible, read-only CONFIG instance.
lazy_static! {
    pub static ref CONFIG: Config = Config::from_env();
}

pub fn load() {
    let _ = &CONFIG.stage;
}
