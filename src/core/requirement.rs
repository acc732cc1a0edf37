/* src/core/requirement.rs */

use crate::common::log;
use std::process::{self, Command};
use std::thread;
use std::time::Duration;

// External tools the service shells out to. `docker` drives containers,
// `zip`/`unzip` handle backup archives and jar metadata extraction.
const REQUIRED_COMMANDS: [&str; 3] = ["docker", "zip", "unzip"];

pub fn run_dependency_check() {
    let mut missing_commands = Vec::new();
    let mut found_commands = Vec::new();

    for &cmd in REQUIRED_COMMANDS.iter() {
        if which(cmd).is_some() {
            found_commands.push(cmd);
        } else {
            missing_commands.push(cmd);
        }
    }

    if !missing_commands.is_empty() {
        log::log(log::LogLevel::Error, "✗ Dependency check fail");
        log::log(log::LogLevel::Error, &format!("  ✗ {}", missing_commands.join(", ")));

        if !found_commands.is_empty() {
            log::log(log::LogLevel::Warn, &format!("  ✓ {}", found_commands.join(", ")));
        }

        let install_list = missing_commands.join(" ");
        let distro = get_linux_distro();
        match distro.as_str() {
            "ubuntu" | "debian" => {
                log::log(log::LogLevel::Warn, "➜ Install missing pkg via apt");
                log::log(log::LogLevel::Warn, &format!("  ✓ apt update && apt install {}", install_list));
            }
            "arch" | "manjaro" => {
                log::log(log::LogLevel::Warn, "➜ Install missing pkg via pacman or yay");
                log::log(log::LogLevel::Warn, &format!("  ✓ pacman -Sy {}", install_list));
            }
            "slackware" => {
                // Unraid reports as slackware; docker ships with the OS there.
                log::log(log::LogLevel::Warn, "➜ Install missing pkg via the NerdTools plugin");
            }
            _ => {
                log::log(log::LogLevel::Error, "➜ Please install the missing commands using your system's package manager.");
            }
        }

        if let Some(path) = crate::common::log::get_log_path() {
            thread::sleep(Duration::from_millis(1000));
            log::log(log::LogLevel::Error, &format!("✗ The crash report can be found at {}", path.display()));
        }

        thread::sleep(Duration::from_millis(500));
        process::exit(1);
    }
}

fn which(cmd: &str) -> Option<String> {
    Command::new("which")
        .arg(cmd)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| {
            let path = String::from_utf8_lossy(&o.stdout).trim().to_string();
            if !path.is_empty() {
                Some(path)
            } else {
                None
            }
        })
}

// Try to get a lowercase distro ID from /etc/os-release or fallback "unknown"
fn get_linux_distro() -> String {
    if let Ok(content) = std::fs::read_to_string("/etc/os-release") {
        for line in content.lines() {
            if let Some(rest) = line.strip_prefix("ID=") {
                return rest.trim_matches('"').to_lowercase();
            }
        }
    }
    "unknown".into()
}
