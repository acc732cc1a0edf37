// src/modules/docker/unix.rs

use http::uri::Authority;
use http_body_util::{BodyExt, Full};
use hyper::{
    body::{Bytes, Incoming},
    client::conn::http1,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use std::error::Error;
use std::time::Duration;
use tokio::net::UnixStream;

const DOCKER_SOCKET_PATH: &str = "/var/run/docker.sock";

pub type BoxError = Box<dyn Error + Send + Sync>;

// One request per connection. The daemon answers plain HTTP/1.1 over its
// unix socket; no TLS, no pooling needed at dashboard polling rates.
pub async fn send_request(
    method: Method,
    path: &str,
    body: Option<serde_json::Value>,
) -> Result<Response<Incoming>, BoxError> {
    let stream = UnixStream::connect(DOCKER_SOCKET_PATH).await?;
    let io = TokioIo::new(stream);
    let (mut sender, conn) = http1::handshake(io).await?;

    tokio::task::spawn(async move {
        if let Err(err) = conn.await {
            eprintln!("Docker socket connection failed: {:?}", err);
        }
    });

    let authority: Authority = "localhost".parse()?;
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(hyper::header::HOST, authority.as_ref());

    let req = match body {
        Some(json) => {
            builder = builder.header(hyper::header::CONTENT_TYPE, "application/json");
            builder.body(Full::new(Bytes::from(serde_json::to_vec(&json)?)))?
        }
        None => builder.body(Full::new(Bytes::new()))?,
    };

    let res = sender.send_request(req).await?;
    Ok(res)
}

pub async fn request(path: &str) -> Result<Bytes, BoxError> {
    let res = send_request(Method::GET, path, None).await?;
    let body = res.collect().await?.to_bytes();
    Ok(body)
}

// POST and collect the response, surfacing the daemon's error message on
// non-2xx statuses.
pub async fn post(path: &str, body: Option<serde_json::Value>) -> Result<(StatusCode, Bytes), BoxError> {
    let res = send_request(Method::POST, path, body).await?;
    let status = res.status();
    let bytes = res.collect().await?.to_bytes();
    Ok((status, bytes))
}

pub async fn delete(path: &str) -> Result<(StatusCode, Bytes), BoxError> {
    let res = send_request(Method::DELETE, path, None).await?;
    let status = res.status();
    let bytes = res.collect().await?.to_bytes();
    Ok((status, bytes))
}

// GET with a short-lived /tmp cache keyed on file mtime. The dashboard polls
// several endpoints in lockstep; a 2 second cache collapses those bursts into
// one daemon round trip.
pub async fn cached_request(path: &str, cache_name: &str, ttl: Duration) -> Result<Bytes, BoxError> {
    let cache_path = std::env::temp_dir().join(format!("moddock_{}.cache", cache_name));

    if let Ok(meta) = std::fs::metadata(&cache_path) {
        if let Ok(modified) = meta.modified() {
            if modified.elapsed().map(|e| e < ttl).unwrap_or(false) {
                if let Ok(bytes) = std::fs::read(&cache_path) {
                    return Ok(Bytes::from(bytes));
                }
            }
        }
    }

    let body = request(path).await?;
    let _ = std::fs::write(&cache_path, &body);
    Ok(body)
}

// Pulls the daemon's own "message" field out of an error body, if present.
pub fn daemon_error_message(bytes: &Bytes) -> String {
    serde_json::from_slice::<serde_json::Value>(bytes)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(bytes).trim().to_string())
}
