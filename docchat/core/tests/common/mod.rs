//! Minimal scripted HTTP server for integration tests
//!
//! Serves one scripted response per connection and records each request.
//! Response bodies are written in separate pieces so the client sees events
//! split across reads, and are delimited by closing the connection.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A request as received by the server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A response to play back
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub parts: Vec<Vec<u8>>,
}

impl ScriptedResponse {
    pub fn event_stream(parts: &[&str]) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream",
            parts: parts.iter().map(|p| p.as_bytes().to_vec()).collect(),
        }
    }

    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            parts: vec![body.as_bytes().to_vec()],
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            parts: Vec::new(),
        }
    }
}

pub struct TestServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl TestServer {
    /// Start a server answering connections with `responses`, in order
    pub async fn start(responses: Vec<ScriptedResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            for response in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request = read_request(&mut stream).await;
                recorded.lock().unwrap().push(request);
                write_response(&mut stream, &response).await;
            }
        });

        Self {
            base_url: format!("http://{addr}/api/v1"),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn read_more(stream: &mut TcpStream, buf: &mut Vec<u8>) -> bool {
    let mut tmp = [0u8; 4096];
    let n = stream.read(&mut tmp).await.unwrap();
    buf.extend_from_slice(&tmp[..n]);
    n > 0
}

async fn read_request(stream: &mut TcpStream) -> RecordedRequest {
    let mut buf = Vec::new();
    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        assert!(read_more(stream, &mut buf).await, "connection closed mid-headers");
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split(' ');
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok());
    let chunked = headers
        .iter()
        .any(|(k, v)| k.eq_ignore_ascii_case("transfer-encoding") && v.contains("chunked"));

    let mut body = buf[header_end..].to_vec();
    if let Some(len) = content_length {
        while body.len() < len {
            if !read_more(stream, &mut body).await {
                break;
            }
        }
    } else if chunked {
        while !body.ends_with(b"0\r\n\r\n") {
            if !read_more(stream, &mut body).await {
                break;
            }
        }
    }

    RecordedRequest {
        method,
        path,
        headers,
        body,
    }
}

async fn write_response(stream: &mut TcpStream, response: &ScriptedResponse) {
    let head = format!(
        "HTTP/1.1 {} Scripted\r\nContent-Type: {}\r\nConnection: close\r\n\r\n",
        response.status, response.content_type
    );
    stream.write_all(head.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();

    for part in &response.parts {
        stream.write_all(part).await.unwrap();
        stream.flush().await.unwrap();
    }
    stream.shutdown().await.unwrap();
}
