/* src/middlewares/cors.rs */

use crate::common::env::CONFIG;
use axum::{
    extract::Request,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

pub async fn handler(req: Request, next: Next) -> Response {
    let origin_header = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    // --- Handle OPTIONS preflight requests ---
    if req.method() == Method::OPTIONS {
        let mut response = (StatusCode::OK, ()).into_response();
        add_cors_headers(response.headers_mut(), origin_header.as_deref());
        return response;
    }

    // --- Handle actual requests (GET, POST, etc.) ---
    let mut response = next.run(req).await;
    add_cors_headers(response.headers_mut(), origin_header.as_deref());
    response
}

// --- CORS headers to any response ---
fn add_cors_headers(headers: &mut axum::http::HeaderMap, origin: Option<&str>) {
    let allowed = CONFIG.dashboard_origin.trim();

    if let Some(origin_str) = origin {
        let matched = if let Some(base) = allowed.strip_prefix("*.") {
            origin_str.ends_with(base) && origin_str != base
        } else {
            allowed == origin_str
        };

        if matched || allowed == "*" {
            if let Ok(value) = HeaderValue::from_str(origin_str) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
            }
        }
    } else if allowed == "*" {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
    }

    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Origin, X-Requested-With, Content-Type, Accept, Authorization"),
    );
}
