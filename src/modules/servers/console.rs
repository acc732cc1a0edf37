// src/modules/servers/console.rs

use crate::core::response;
use crate::modules::docker::cli;
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

// Commands the web console may relay. Anything else is refused before it
// reaches RCON.
const ALLOWED_COMMANDS: [&str; 16] = [
    "say", "list", "whitelist", "ban", "kick", "op", "deop", "stop", "restart", "save-all",
    "weather", "time", "gamerule", "pardon", "ban-ip", "pardon-ip",
];

pub fn command_allowed(command: &str) -> bool {
    let cleaned = command.trim().trim_start_matches('/');
    let base = cleaned.split_whitespace().next().unwrap_or("");
    ALLOWED_COMMANDS.contains(&base.to_lowercase().as_str())
}

fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Deserialize)]
pub struct ConsoleQuery {
    #[serde(default)]
    pub lines: Option<u32>,
}

// GET /v1/servers/{id}/console
pub async fn logs_handler(Path(id): Path<String>, Query(query): Query<ConsoleQuery>) -> Response {
    if !valid_id(&id) {
        return response::bad_request("Invalid server ID");
    }
    let lines = query.lines.unwrap_or(200).min(2000);
    let logs = cli::logs_tail(&id, lines).await;
    response::success(Some(json!({ "logs": logs })))
}

#[derive(Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub cmd: String,
}

// POST /v1/servers/{id}/console
pub async fn command_handler(
    Path(id): Path<String>,
    Json(req): Json<CommandRequest>,
) -> Response {
    if !valid_id(&id) {
        return response::bad_request("Invalid server ID");
    }
    if req.cmd.trim().is_empty() {
        return response::bad_request("Missing command");
    }
    if !command_allowed(&req.cmd) {
        let base = req
            .cmd
            .trim()
            .trim_start_matches('/')
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string();
        return response::error(
            StatusCode::FORBIDDEN,
            format!("Command not allowed via web console: {}", base),
        );
    }

    // rcon-cli picks up port and password from the container's own env here,
    // so no credentials cross the exec boundary.
    let mut args = vec!["rcon-cli"];
    let cleaned = req.cmd.trim().trim_start_matches('/').to_string();
    args.extend(cleaned.split_whitespace());

    match cli::exec(&id, &args).await {
        Some(out) if out.success => response::success(Some(json!({
            "message": out.stdout.trim(),
        }))),
        Some(out) => response::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{}{}", out.stdout.trim(), out.stderr.trim()),
        ),
        None => response::service_unavailable(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist_accepts_known_commands() {
        assert!(command_allowed("say hello everyone"));
        assert!(command_allowed("/list"));
        assert!(command_allowed("WEATHER clear"));
    }

    #[test]
    fn whitelist_blocks_everything_else() {
        assert!(!command_allowed("execute as @a run kill @s"));
        assert!(!command_allowed("give Steve diamond 64"));
        assert!(!command_allowed(""));
    }

    #[test]
    fn id_validation_rejects_shell_metacharacters() {
        assert!(valid_id("abc123-def_456"));
        assert!(!valid_id("abc;rm -rf /"));
        assert!(!valid_id(""));
    }
}
