//! Shared helpers: a scripted Anthropic stand-in on a raw TCP listener.

#![allow(dead_code)]

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Helper: bind a TCP listener on localhost and return (listener, port).
pub async fn mock_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// One request as seen by the mock upstream.
#[derive(Debug, Clone)]
pub struct Captured {
    pub head: String,
    pub body: Value,
}

impl Captured {
    pub fn has_header(&self, name: &str, value: &str) -> bool {
        self.head.lines().any(|line| {
            line.split_once(':')
                .is_some_and(|(n, v)| n.trim().eq_ignore_ascii_case(name) && v.trim() == value)
        })
    }
}

pub struct MockUpstream {
    pub base_url: String,
    pub requests: mpsc::UnboundedReceiver<Captured>,
    handle: JoinHandle<()>,
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serve every connection with the same status and JSON body, recording each
/// request. Connections are closed after one exchange.
pub async fn spawn_upstream(status: u16, body: &str) -> MockUpstream {
    let (listener, port) = mock_listener().await;
    let (tx, rx) = mpsc::unbounded_channel();
    let body = body.to_string();

    let handle = tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let raw = read_request(&mut socket).await;
            let _ = tx.send(parse_request(&raw));

            let response = format!(
                "HTTP/1.1 {status} {}\r\n\
                 Content-Type: application/json\r\n\
                 Content-Length: {}\r\n\
                 Connection: close\r\n\r\n{body}",
                reason(status),
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    MockUpstream {
        base_url: format!("http://127.0.0.1:{port}"),
        requests: rx,
        handle,
    }
}

/// Serve every connection with the given raw HTTP response bytes, verbatim.
pub async fn spawn_raw_upstream(response: Vec<u8>) -> MockUpstream {
    let (listener, port) = mock_listener().await;
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let raw = read_request(&mut socket).await;
            let _ = tx.send(parse_request(&raw));
            // The client may hang up early once it sees the size.
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        }
    });

    MockUpstream {
        base_url: format!("http://127.0.0.1:{port}"),
        requests: rx,
        handle,
    }
}

/// A 200 response whose body is sent as a single chunk with no
/// `Content-Length` header.
pub fn chunked_ok(body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: application/json\r\n\
         Transfer-Encoding: chunked\r\n\
         Connection: close\r\n\r\n{:x}\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out.extend_from_slice(b"\r\n0\r\n\r\n");
    out
}

/// Accept connections, read the request, and never answer.
pub async fn spawn_silent_upstream() -> MockUpstream {
    let (listener, port) = mock_listener().await;
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let raw = read_request(&mut socket).await;
            let _ = tx.send(parse_request(&raw));
            held.push(socket);
        }
    });

    MockUpstream {
        base_url: format!("http://127.0.0.1:{port}"),
        requests: rx,
        handle,
    }
}

/// A Messages API success body with the given content blocks.
pub fn messages_body(blocks: &[Value]) -> String {
    serde_json::json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "model": "claude-sonnet-4-5",
        "content": blocks,
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 10, "output_tokens": 5}
    })
    .to_string()
}

pub fn text_block(text: &str) -> Value {
    serde_json::json!({"type": "text", "text": text})
}

/// Read headers plus `Content-Length` bytes of body.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn parse_request(raw: &str) -> Captured {
    let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw, ""));
    Captured {
        head: head.to_string(),
        body: serde_json::from_str(body).unwrap_or(Value::Null),
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        529 => "Overloaded",
        _ => "Status",
    }
}
