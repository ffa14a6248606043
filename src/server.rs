//! Minimal HTTP/1.1 front end
//!
//! One request per connection, JSON in and out. Each connection is handled on
//! its own tokio task.

use crate::error::AdvisorError;
use crate::service::AdvisorService;
use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Largest request body accepted
pub const MAX_BODY_BYTES: usize = 1 << 20;

/// Largest request line plus headers accepted
pub const MAX_HEAD_BYTES: usize = 16 << 10;

/// An HTTP status with its JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    fn ok<T: Serialize>(payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(body) => Self { status: 200, body },
            Err(e) => Self::error(500, format!("Failed to encode response: {}", e)),
        }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        431 => "Request Header Fields Too Large",
        _ => "Internal Server Error",
    }
}

/// Accept connections until the listener fails
pub async fn serve(listener: TcpListener, service: Arc<AdvisorService>) -> Result<()> {
    info!("Listening on http://{}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &service).await {
                warn!("Request from {} failed: {}", peer, e);
            }
        });
    }
}

/// Request line and headers that were read in full
#[derive(Debug, PartialEq)]
struct RequestHead {
    method: String,
    path: String,
    content_length: usize,
}

/// Read the request line and headers, at most `MAX_HEAD_BYTES`; `None` when over
async fn read_head<R>(reader: &mut R) -> Result<Option<RequestHead>>
where
    R: AsyncBufRead + Unpin,
{
    let mut limited = reader.take(MAX_HEAD_BYTES as u64);

    let mut request_line = String::new();
    limited.read_line(&mut request_line).await?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();

    let mut content_length: usize = 0;
    let mut terminated = false;
    loop {
        let mut header = String::new();
        if limited.read_line(&mut header).await? == 0 {
            break;
        }
        if header.trim().is_empty() {
            terminated = true;
            break;
        }
        if header.to_lowercase().starts_with("content-length:") {
            content_length = header
                .split(':')
                .nth(1)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0);
        }
    }

    if !terminated && limited.limit() == 0 {
        return Ok(None);
    }
    Ok(Some(RequestHead {
        method,
        path,
        content_length,
    }))
}

async fn handle_connection(mut stream: TcpStream, service: &AdvisorService) -> Result<()> {
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);

    let reply = match read_head(&mut reader).await? {
        None => Reply::error(431, "request headers too large"),
        Some(head) if head.content_length > MAX_BODY_BYTES => Reply::error(413, "request body too large"),
        Some(head) => {
            let mut body = vec![0u8; head.content_length];
            if head.content_length > 0 {
                reader.read_exact(&mut body).await?;
            }
            debug!("{} {} ({} bytes)", head.method, head.path, head.content_length);
            route(service, &head.method, &head.path, &body).await
        }
    };

    let payload = serde_json::to_string(&reply.body)?;
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n{}",
        reply.status,
        reason(reply.status),
        payload.len(),
        payload
    );

    write_half.write_all(response.as_bytes()).await?;
    write_half.flush().await?;
    Ok(())
}

/// Map one request to a reply
pub async fn route(service: &AdvisorService, method: &str, path: &str, body: &[u8]) -> Reply {
    let path = path.split('?').next().unwrap_or("").trim_end_matches('/');

    match (method, path) {
        ("GET", "/health") => return Reply::ok(&json!({ "status": "ok" })),
        ("POST", "/advice" | "/checklist" | "/theories") => {}
        ("POST", p) if p.starts_with("/advice/") => {}
        (_, "/health" | "/advice" | "/checklist" | "/theories") => {
            return Reply::error(405, format!("{} not allowed on {}", method, path))
        }
        _ => return Reply::error(404, format!("No route for {} {}", method, path)),
    }

    let body: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => return Reply::error(400, format!("Invalid JSON body: {}", e)),
    };

    let result = match path {
        "/advice" => service.advise(&body).await.map(|r| Reply::ok(&r)),
        "/checklist" => service.checklist(&body).await.map(|r| Reply::ok(&r)),
        "/theories" => service.related_theories(&body).await.map(|r| Reply::ok(&r)),
        _ => {
            let scene = path.trim_start_matches("/advice/");
            service
                .advise_specialist(scene, &body)
                .await
                .map(|advices| Reply::ok(&json!({ "advices": advices })))
        }
    };

    result.unwrap_or_else(|e| match e {
        AdvisorError::Validation(err) => Reply::error(400, err.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdvisorConfig;
    use crate::seed::seed_theories;
    use crate::test_support::{advices_json, RecordingGateway, ScriptedGenerator};

    fn service() -> AdvisorService {
        AdvisorService::new(
            AdvisorConfig::default(),
            Arc::new(ScriptedGenerator::always(Ok(advices_json(3)))),
            Arc::new(RecordingGateway::default()),
            Arc::new(seed_theories()),
        )
    }

    const MEETING: &[u8] = br#"{"scene":"meeting","goal":"decide","time_limit":"short","stakes":"high"}"#;

    #[tokio::test]
    async fn test_health() {
        let reply = route(&service(), "GET", "/health", b"").await;
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["status"], "ok");
    }

    #[tokio::test]
    async fn test_advice_route() {
        let reply = route(&service(), "POST", "/advice", MEETING).await;
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["advices"].as_array().unwrap().len(), 3);
        assert_eq!(reply.body["advices"][2]["selected_rank"], 3);
        assert!(reply.body["session_id"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_specialist_sub_route() {
        let reply = route(&service(), "POST", "/advice/sales", MEETING).await;
        assert_eq!(reply.status, 200);
        assert!(reply.body.get("session_id").is_none());
        assert_eq!(reply.body["advices"].as_array().unwrap().len(), 3);

        let unknown = route(&service(), "POST", "/advice/karaoke", MEETING).await;
        assert_eq!(unknown.status, 400);
    }

    #[tokio::test]
    async fn test_checklist_route() {
        let reply = route(&service(), "POST", "/checklist", MEETING).await;
        assert_eq!(reply.status, 200);
        // an advice-shaped answer is repaired into one checklist item
        assert_eq!(reply.body["checklist"].as_array().unwrap().len(), 1);
        assert!(reply.body["facilitation_tips"].is_array());
    }

    #[tokio::test]
    async fn test_theories_route() {
        let body = br#"{"scene":"sales","goal":"persuade","short_advice":"Offer something first"}"#;
        let reply = route(&service(), "POST", "/theories", body).await;
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["selection_method"], "content");
        assert!(reply.body["related_theories"].as_array().unwrap().len() <= 3);
    }

    #[tokio::test]
    async fn test_errors() {
        let service = service();

        let missing = route(&service, "POST", "/advice", br#"{"scene":"meeting"}"#).await;
        assert_eq!(missing.status, 400);
        assert!(missing.body["error"].as_str().unwrap().contains("goal"));

        let garbled = route(&service, "POST", "/advice", b"{not json").await;
        assert_eq!(garbled.status, 400);

        assert_eq!(route(&service, "GET", "/nowhere", b"").await.status, 404);
        assert_eq!(route(&service, "GET", "/advice", b"").await.status, 405);
    }

    #[tokio::test]
    async fn test_reads_request_head() {
        let raw = b"POST /advice HTTP/1.1\r\nHost: localhost\r\nContent-Length: 12\r\n\r\n{\"goal\":\"x\"}";
        let mut reader = &raw[..];
        let head = read_head(&mut reader).await.unwrap().unwrap();
        assert_eq!(
            head,
            RequestHead {
                method: "POST".to_string(),
                path: "/advice".to_string(),
                content_length: 12,
            }
        );
        assert_eq!(reader, &b"{\"goal\":\"x\"}"[..]);
    }

    #[tokio::test]
    async fn test_oversized_head_is_refused() {
        let mut raw = b"GET /health HTTP/1.1\r\nX-Padding: ".to_vec();
        raw.extend_from_slice(&vec![b'a'; MAX_HEAD_BYTES * 2]);
        raw.extend_from_slice(b"\r\n\r\n");

        let mut reader = &raw[..];
        assert!(read_head(&mut reader).await.unwrap().is_none());

        let mut endless_line = vec![b'G'; MAX_HEAD_BYTES + 1];
        endless_line.extend_from_slice(b"\r\n\r\n");
        let mut reader = &endless_line[..];
        assert!(read_head(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_serves_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, Arc::new(service())));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.ends_with(r#"{"status":"ok"}"#));
    }
}
