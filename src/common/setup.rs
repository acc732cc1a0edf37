// src/common/setup.rs

use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use crate::common::env::CONFIG;
use crate::common::log::{self, LogLevel};
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

const SEED_SIZE: usize = 64;
const TOKEN_COUNT: usize = 4;
// Each token code is valid for one 30 second window; the previous window is
// still accepted so a clock skew of a few seconds never locks clients out.
const WINDOW_SECS: i64 = 30;

fn passwd_path() -> PathBuf {
    Path::new(&CONFIG.config_dir).join("passwd")
}

// Creates the on-disk tree the service treats as its system of record.
pub fn ensure_directories() {
    for dir in [
        CONFIG.config_dir.clone(),
        CONFIG.servers_dir(),
        CONFIG.backup_dir.clone(),
        format!("{}/moddock", CONFIG.appdata_dir),
    ] {
        if let Err(e) = fs::create_dir_all(&dir) {
            log::log(LogLevel::Warn, &format!("! Could not create {}: {}", dir, e));
        }
    }
}

// Generates and stores the node key on first run. The key never leaves this
// host again, so it is printed exactly once.
pub fn init_token() {
    let path = passwd_path();
    if path.exists() {
        return;
    }

    let mut all_seeds = vec![0u8; SEED_SIZE * TOKEN_COUNT];
    OsRng.fill_bytes(&mut all_seeds);

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).expect("! Failed to create config directory");
    }
    let mut file = File::create(&path).expect("! Failed to create token file");
    file.write_all(&all_seeds).expect("! Failed to write token seeds");

    let encoded = general_purpose::STANDARD.encode(&all_seeds);
    println!("\n  Node key generated successfully");
    println!("  {}", encoded);
    println!("  Please keep it properly. You will never see it again.\n");
    thread::sleep(Duration::from_millis(1500));
}

// Returns the accepted token codes for the previous and current window.
pub fn compute_token_windows() -> (Vec<String>, Vec<String>) {
    let mut buf = [0u8; SEED_SIZE * TOKEN_COUNT];
    File::open(passwd_path())
        .expect("Token seed file not found")
        .read_exact(&mut buf)
        .expect("Failed to read token seeds");

    let now = Utc::now().timestamp() / WINDOW_SECS;
    let mut windows = Vec::with_capacity(2);

    for timestamp in [now - 1, now] {
        let mut codes = Vec::with_capacity(TOKEN_COUNT);
        for i in 0..TOKEN_COUNT {
            let seed = &buf[i * SEED_SIZE..(i + 1) * SEED_SIZE];
            let mut hasher = Sha256::new();
            hasher.update(seed);
            hasher.update(timestamp.to_be_bytes());
            let hash = hasher.finalize();
            let number = u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]]) % 1_000_000;
            codes.push(format!("{:06}", number));
        }
        windows.push(codes);
    }

    let curr = windows.pop().unwrap();
    let prev = windows.pop().unwrap();
    (prev, curr)
}
