// src/modules/servers/players.rs

use crate::core::response;
use crate::modules::docker::{cli, inspect};
use crate::modules::slp::client as slp;
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::Response;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

lazy_static! {
    static ref ANSI_ESCAPE: Regex = Regex::new(r"\x1b\[[\d;]*[A-Za-z]").unwrap();
    static ref LIST_NAMES: Regex = Regex::new(r"(?i)(?:online|players): (.*)$").unwrap();
    static ref OPS_NAMES: Regex =
        Regex::new(r"(?i)(?:opped players|opped player|operators):? (.*)$").unwrap();
    static ref BANLIST_NAMES: Regex = Regex::new(r"(?i):\s*(.*)$").unwrap();
}

const DEFAULT_RCON_PORT: u16 = 25575;

pub fn sanitize_name(raw: &str) -> String {
    ANSI_ESCAPE.replace_all(raw, "").trim().to_string()
}

// Pulls player names out of an RCON `list` reply. Vanilla answers
// "There are 2 of a max of 20 players online: Alice, Bob"; modded servers
// produce close-but-not-quite variants, so a looser pass runs second.
pub fn parse_list_output(output: &str) -> Vec<String> {
    let output = output.trim();
    if output.is_empty() {
        return Vec::new();
    }

    if let Some(c) = LIST_NAMES.captures(output) {
        return c[1]
            .split(", ")
            .map(sanitize_name)
            .filter(|n| !n.is_empty())
            .collect();
    }

    // No recognizable prefix: treat the remainder as a bare name list.
    let cleaned = output
        .trim_start_matches("There are")
        .trim_start_matches("Players online:");
    const STOPWORDS: [&str; 7] = ["there", "are", "players", "online", "max", "out", "of"];
    cleaned
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(sanitize_name)
        .filter(|n| !n.is_empty() && !STOPWORDS.contains(&n.to_lowercase().as_str()))
        .collect()
}

pub fn parse_ops_output(output: &str) -> Vec<String> {
    OPS_NAMES
        .captures(output)
        .map(|c| {
            c[1].split(',')
                .map(sanitize_name)
                .filter(|n| !n.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

pub fn parse_banlist_output(output: &str) -> Vec<String> {
    let output = output.trim();
    if output.is_empty() || output.to_lowercase().contains("no banned players") {
        return Vec::new();
    }
    BANLIST_NAMES
        .captures(output)
        .map(|c| {
            c[1].split(", ")
                .map(|entry| {
                    // "Name (reason)" -> "Name"
                    let name = sanitize_name(entry);
                    name.split_whitespace().next().unwrap_or("").to_string()
                })
                .filter(|n| {
                    !n.is_empty() && !matches!(n.to_lowercase().as_str(), "no" | "banned")
                })
                .collect()
        })
        .unwrap_or_default()
}

struct RconTarget {
    password: String,
    port: u16,
}

fn rcon_target(env: &HashMap<String, String>) -> Option<RconTarget> {
    let password = env.get("RCON_PASSWORD").cloned().filter(|p| !p.is_empty())?;
    let port = env
        .get("RCON_PORT")
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_RCON_PORT);
    Some(RconTarget { password, port })
}

#[derive(Deserialize)]
pub struct PlayersQuery {
    #[serde(default)]
    pub port: Option<u16>,
}

// GET /v1/servers/{id}/players
pub async fn players_handler(
    Path(id): Path<String>,
    Query(query): Query<PlayersQuery>,
) -> Response {
    let Some(detail) = inspect::inspect(&id).await else {
        return response::error(StatusCode::NOT_FOUND, "Container not found");
    };
    let env = detail.env_map();
    let rcon = rcon_target(&env);
    let port = query.port.unwrap_or_else(|| detail.game_host_port());

    // Live counts straight from the game's own status protocol.
    let (online, max, sample) = slp::player_counts("127.0.0.1", port)
        .await
        .unwrap_or((0, 0, Vec::new()));

    let mut players: Vec<String> = sample
        .iter()
        .map(|p| sanitize_name(&p.name))
        .filter(|n| !n.is_empty())
        .collect();

    // The status sample is capped and often anonymized; RCON is authoritative
    // when someone is online.
    if players.is_empty() && online > 0 {
        if let Some(rcon) = &rcon {
            if let Some(out) = cli::rcon(&id, rcon.port, &rcon.password, "list").await {
                players = parse_list_output(&out.stdout);
            }
        }
    }

    // Last resort: the mc-monitor binary inside the itzg image.
    if players.is_empty() && online > 0 {
        let internal_port = env
            .get("SERVER_PORT")
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(25565);
        let target = format!("127.0.0.1:{}", internal_port);
        if let Some(out) = cli::exec(&id, &["mc-monitor", "status", "--json", &target]).await {
            if let Ok(status) = serde_json::from_str::<serde_json::Value>(&out.stdout) {
                if let Some(sample) = status
                    .get("players")
                    .and_then(|p| p.get("sample"))
                    .and_then(|s| s.as_array())
                {
                    players = sample
                        .iter()
                        .filter_map(|p| p.get("name").and_then(|n| n.as_str()))
                        .map(sanitize_name)
                        .filter(|n| !n.is_empty())
                        .collect();
                }
            }
        }
    }

    // Operator flags: RCON first, ops.json off the container disk second.
    let mut ops: Vec<String> = Vec::new();
    if let Some(rcon) = &rcon {
        if let Some(out) = cli::rcon(&id, rcon.port, &rcon.password, "op list").await {
            ops = parse_ops_output(&format!("{} {}", out.stdout, out.stderr));
        }
        if ops.is_empty() {
            if let Some(content) =
                cli::read_container_file(&id, &["ops.json", "/data/ops.json"]).await
            {
                if let Ok(entries) = serde_json::from_str::<Vec<serde_json::Value>>(&content) {
                    ops = entries
                        .iter()
                        .filter_map(|e| e.get("name").and_then(|n| n.as_str()))
                        .map(str::to_string)
                        .collect();
                }
            }
        }
    }

    let ops_lower: Vec<String> = ops.iter().map(|o| o.to_lowercase()).collect();
    let players: Vec<_> = players
        .iter()
        .map(|name| {
            json!({
                "name": name,
                "isOp": ops_lower.contains(&name.to_lowercase()),
            })
        })
        .collect();

    response::success(Some(json!({
        "online": online,
        "max": max,
        "players": players,
    })))
}

// GET /v1/servers/{id}/players/banned
pub async fn banned_handler(Path(id): Path<String>) -> Response {
    let Some(detail) = inspect::inspect(&id).await else {
        return response::error(StatusCode::NOT_FOUND, "Container not found");
    };
    let env = detail.env_map();
    let Some(rcon) = rcon_target(&env) else {
        return response::success(Some(json!([])));
    };

    let mut banned: Vec<String> = Vec::new();
    if let Some(out) = cli::rcon(&id, rcon.port, &rcon.password, "banlist players").await {
        banned = parse_banlist_output(&out.stdout);
    }

    // The ban file is authoritative when RCON output parses to nothing.
    if banned.is_empty() {
        if let Some(content) = cli::read_container_file(
            &id,
            &["banned-players.json", "/data/banned-players.json"],
        )
        .await
        {
            if let Ok(entries) = serde_json::from_str::<Vec<serde_json::Value>>(&content) {
                banned = entries
                    .iter()
                    .filter_map(|e| e.get("name").and_then(|n| n.as_str()))
                    .map(str::to_string)
                    .collect();
            }
        }
    }

    banned.dedup();
    let payload: Vec<_> = banned.iter().map(|name| json!({ "name": name })).collect();
    response::success(Some(json!(payload)))
}

#[derive(Deserialize)]
pub struct PlayerActionQuery {
    #[serde(default)]
    pub message: Option<String>,
}

// POST /v1/servers/{id}/players/{player}/{action}
pub async fn player_action_handler(
    Path((id, player, action)): Path<(String, String, String)>,
    Query(query): Query<PlayerActionQuery>,
) -> Response {
    let Some(detail) = inspect::inspect(&id).await else {
        return response::error(StatusCode::NOT_FOUND, "Container not found");
    };
    let env = detail.env_map();
    let Some(rcon) = rcon_target(&env) else {
        return response::bad_request(
            "RCON_PASSWORD not set; cannot run commands. Enable RCON in the server env.",
        );
    };

    let player = sanitize_name(&player);
    if player.is_empty() {
        return response::bad_request("Missing player name");
    }

    let command = match action.as_str() {
        "kick" => format!("kick {}", player),
        "ban" => format!("ban {}", player),
        "unban" => format!("pardon {}", player),
        "op" => format!("op {}", player),
        "deop" => format!("deop {}", player),
        "whisper" => format!("tell {} {}", player, query.message.unwrap_or_default()),
        other => return response::bad_request(format!("Unsupported action: {}", other)),
    };

    match cli::rcon(&id, rcon.port, &rcon.password, &command).await {
        Some(out) if out.success => response::success(Some(json!({
            "message": "Command executed",
            "output": out.stdout.trim(),
        }))),
        Some(out) => response::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Command failed: {}", out.stderr.trim()),
        ),
        None => response::service_unavailable(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vanilla_list_output_parses() {
        let out = "There are 2 of a max of 20 players online: Alice, Bob";
        assert_eq!(parse_list_output(out), vec!["Alice", "Bob"]);
    }

    #[test]
    fn bare_name_list_skips_stopwords() {
        assert_eq!(parse_list_output("Alice Bob"), vec!["Alice", "Bob"]);
        assert!(parse_list_output("").is_empty());
    }

    #[test]
    fn ansi_escapes_are_stripped() {
        assert_eq!(sanitize_name("\x1b[0;33mAlice\x1b[0m "), "Alice");
    }

    #[test]
    fn ops_output_variants() {
        assert_eq!(
            parse_ops_output("Opped players: Alice, Bob"),
            vec!["Alice", "Bob"]
        );
        assert!(parse_ops_output("no output here").is_empty());
    }

    #[test]
    fn banlist_strips_reasons() {
        let out = "There are 2 ban(s): Griefer99 (Banned by admin), Cheater (x-ray)";
        assert_eq!(parse_banlist_output(out), vec!["Griefer99", "Cheater"]);
        assert!(parse_banlist_output("There are no banned players").is_empty());
    }
}
