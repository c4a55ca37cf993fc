//! Minimal HTTP/1.1 over tokio: one request per connection, JSON responses,
//! permissive CORS. Enough for the dashboard; not a general server.

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const MAX_HEAD_BYTES: usize = 16 * 1024;
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method:  String,
    pub path:    String,
    pub query:   HashMap<String, String>,
    /// Lower-cased names.
    pub headers: HashMap<String, String>,
    pub body:    Vec<u8>,
}

impl HttpRequest {
    /// Query parameter; empty values count as absent (`?status=` means no filter).
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn split_target(target: &str) -> (String, HashMap<String, String>) {
    let (path, qs) = target.split_once('?').unwrap_or((target, ""));
    let path = if path.len() > 1 { path.trim_end_matches('/') } else { path };
    let query = url::form_urlencoded::parse(qs.as_bytes()).into_owned().collect();
    (path.to_string(), query)
}

pub fn parse_head(head: &str) -> Result<HttpRequest> {
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("empty request line"))?;
    let target = parts.next().ok_or_else(|| anyhow!("missing request target"))?;

    let (path, query) = split_target(target);
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    Ok(HttpRequest {
        method: method.to_ascii_uppercase(),
        path,
        query,
        headers,
        body: Vec::new(),
    })
}

/// Reads one request. `Ok(None)` when the peer closed without sending anything.
pub async fn read_request<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Option<HttpRequest>> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEAD_BYTES {
            bail!("request head over {} bytes", MAX_HEAD_BYTES);
        }
        let n = stream.read(&mut chunk).await.context("http read")?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            bail!("connection closed mid-request");
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = std::str::from_utf8(&buf[..head_end]).context("request head is not UTF-8")?;
    let mut req = parse_head(head)?;

    let content_length = match req.header("content-length") {
        Some(v) => v.parse::<usize>().with_context(|| format!("bad Content-Length '{v}'"))?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        bail!("request body over {} bytes", MAX_BODY_BYTES);
    }

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.context("http body read")?;
        if n == 0 {
            bail!("connection closed after {} of {} body bytes", body.len(), content_length);
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);
    req.body = body;

    Ok(Some(req))
}

// ── Response ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body:   String,
}

impl HttpResponse {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self { status, body },
            Err(e) => Self::error(500, format!("serialize failed: {e}")),
        }
    }

    pub fn ok<T: Serialize>(value: &T) -> Self {
        Self::json(200, value)
    }

    /// `{success: false, error}` envelope.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        let body = serde_json::json!({ "success": false, "error": message.into() });
        Self { status, body: body.to_string() }
    }

    pub fn no_content() -> Self {
        Self { status: 204, body: String::new() }
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

pub fn render(resp: &HttpResponse, cors_origin: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Access-Control-Allow-Origin: {}\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type, Authorization\r\n\
         Connection: close\r\n\r\n{}",
        resp.status,
        reason(resp.status),
        resp.body.len(),
        cors_origin,
        resp.body
    )
}

pub async fn write_response<W: AsyncWrite + Unpin>(
    stream:      &mut W,
    resp:        &HttpResponse,
    cors_origin: &str,
) -> Result<()> {
    stream
        .write_all(render(resp, cors_origin).as_bytes())
        .await
        .context("http write")?;
    stream.flush().await.context("http flush")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_path_query_and_headers() {
        let req = parse_head(
            "get /api/v1/signals/?status=green&date=2026-10-18&userId=u%201 HTTP/1.1\r\nHost: x\r\nContent-Type: application/json",
        )
        .unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/api/v1/signals");
        assert_eq!(req.query_param("status"), Some("green"));
        assert_eq!(req.query_param("userId"), Some("u 1"));
        assert_eq!(req.header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn empty_query_values_are_absent() {
        let req = parse_head("GET /api/v1/signals?status=&date= HTTP/1.1").unwrap();
        assert_eq!(req.query_param("status"), None);
        assert_eq!(req.query_param("date"), None);
    }

    #[tokio::test]
    async fn reads_request_with_body() {
        let raw = b"POST /api/v1/bot/control HTTP/1.1\r\nContent-Length: 18\r\n\r\n{\"action\":\"start\"}";
        let mut input: &[u8] = raw;
        let req = read_request(&mut input).await.unwrap().unwrap();
        assert_eq!(req.method, "POST");
        let body: serde_json::Value = req.json().unwrap();
        assert_eq!(body["action"], "start");
    }

    #[tokio::test]
    async fn closed_connection_yields_none() {
        let mut input: &[u8] = b"";
        assert!(read_request(&mut input).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let mut input: &[u8] = b"POST /x HTTP/1.1\r\nContent-Length: 50\r\n\r\n{}";
        assert!(read_request(&mut input).await.is_err());
    }

    #[test]
    fn error_envelope_and_render() {
        let resp = HttpResponse::error(404, "not found");
        let body: serde_json::Value = serde_json::from_str(&resp.body).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "not found");

        let wire = render(&resp, "*");
        assert!(wire.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(wire.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(wire.contains(&format!("Content-Length: {}\r\n", resp.body.len())));
        assert!(wire.ends_with(&resp.body));
    }
}
