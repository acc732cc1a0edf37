// src/modules/router/whitelist.rs

// Paths that bypass the guard and token middleware entirely.
pub const WHITELISTED_PATHS: &[&str] = &["/", "/v1/ping"];
