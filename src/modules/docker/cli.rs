// src/modules/docker/cli.rs

use tokio::process::Command;

// Exec-shaped work (rcon-cli, file peeks, agent launch) and log tailing go
// through the docker CLI; everything structured talks to the unix socket.

pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

pub async fn exec(container: &str, args: &[&str]) -> Option<ExecOutput> {
    let output = Command::new("docker")
        .arg("exec")
        .arg(container)
        .args(args)
        .output()
        .await
        .ok()?;
    Some(ExecOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        success: output.status.success(),
    })
}

// Detached exec, for long-lived in-container helpers.
pub async fn exec_detached(container: &str, args: &[&str]) -> bool {
    Command::new("docker")
        .arg("exec")
        .arg("-d")
        .arg(container)
        .args(args)
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

// Run an in-game command through the rcon-cli bundled in the itzg image.
pub async fn rcon(container: &str, port: u16, password: &str, command: &str) -> Option<ExecOutput> {
    let port_str = port.to_string();
    let mut args = vec!["rcon-cli", "--port", &port_str, "--password", password];
    args.extend(command.split_whitespace());
    exec(container, &args).await
}

// Read a file from inside the container, trying each path in order.
pub async fn read_container_file(container: &str, paths: &[&str]) -> Option<String> {
    for path in paths {
        if let Some(out) = exec(container, &["cat", path]).await {
            if out.success && !out.stdout.trim().is_empty() {
                return Some(out.stdout);
            }
        }
    }
    None
}

pub async fn logs_tail(container: &str, lines: u32) -> String {
    let output = Command::new("docker")
        .arg("logs")
        .arg("--tail")
        .arg(lines.to_string())
        .arg(container)
        .output()
        .await;
    match output {
        Ok(out) => {
            // The server writes to both streams; interleave them the way the
            // CLI does on a terminal.
            let mut text = String::from_utf8_lossy(&out.stdout).to_string();
            text.push_str(&String::from_utf8_lossy(&out.stderr));
            text
        }
        Err(_) => String::new(),
    }
}
