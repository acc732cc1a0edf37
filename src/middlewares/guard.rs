// src/middlewares/guard.rs

use crate::core::response;
use crate::modules::router::whitelist;
use axum::{body::Body, http::Request, middleware::Next, response::Response};

const MAX_VERSION: u8 = 1;

// Rejects anything that is not a whitelisted path or a /v{N}/... API path.
pub async fn handler(req: Request<Body>, next: Next) -> Response {
    let path = req.uri().path();

    if whitelist::WHITELISTED_PATHS.contains(&path) {
        return next.run(req).await;
    }

    if let Some(path_after_v) = path.strip_prefix("/v") {
        if let Some(slash_index) = path_after_v.find('/') {
            let version_str = &path_after_v[..slash_index];
            if let Ok(version) = version_str.parse::<u8>() {
                if version > 0 && version <= MAX_VERSION {
                    return next.run(req).await;
                }
            }
        }
    }

    response::not_found()
}
