//! docrag-testkit
//!
//! Dev-only helpers shared by the integration tests of the HTTP-backed crates:
//! a scripted HTTP/1.1 server and canned response bodies.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct Recorded {
    /// Request line and headers, lowercased.
    pub head: String,
    pub body: String,
}

pub enum Reply {
    Json(u16, String),
    Stall(Duration),
}

pub struct StubServer {
    pub url: String,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
}

impl StubServer {
    pub fn recorded(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

/// Serves one scripted reply per connection, in order, then stops accepting.
pub async fn serve(replies: Vec<Reply>) -> StubServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = requests.clone();
    tokio::spawn(async move {
        for reply in replies {
            let Ok((mut socket, _)) = listener.accept().await else { break };
            let recorded = read_request(&mut socket).await;
            log.lock().unwrap().push(recorded);
            let (status, body) = match reply {
                Reply::Json(status, body) => (status, body),
                Reply::Stall(d) => {
                    tokio::time::sleep(d).await;
                    (200, "{}".to_string())
                }
            };
            let response = format!(
                "HTTP/1.1 {} STUB\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    StubServer { url, requests }
}

async fn read_request(socket: &mut TcpStream) -> Recorded {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 { break buf.len(); }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") { break pos + 4; }
    };
    let head = String::from_utf8_lossy(&buf[..header_end.min(buf.len())]).to_lowercase();
    let content_length = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 { break; }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = (header_end + content_length).min(buf.len());
    let body = String::from_utf8_lossy(&buf[header_end.min(body_end)..body_end]).to_string();
    Recorded { head, body }
}

pub fn embedding_body(values: &[f32]) -> String {
    serde_json::json!({ "object": "list", "data": [{ "index": 0, "embedding": values }], "model": "stub" }).to_string()
}
