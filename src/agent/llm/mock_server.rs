//! Scripted HTTP/1.1 server for exercising provider clients over a socket.
//!
//! Every connection serves one request and is closed afterwards. Replies can
//! trickle their body in timed pieces and hold the connection open at the
//! end, which is enough to reproduce slow generations and stalled streams.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub body: String,
}

impl Request {
    /// Whether the JSON body asked for a streamed response.
    pub fn wants_stream(&self) -> bool {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .map(|v| v["stream"] == true)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    content_type: &'static str,
    parts: Vec<String>,
    delay: Duration,
    hold: Duration,
    streamed: bool,
}

impl Reply {
    /// A complete JSON body with a `Content-Length`.
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "application/json",
            parts: vec![body.into()],
            delay: Duration::ZERO,
            hold: Duration::ZERO,
            streamed: false,
        }
    }

    /// A connection-delimited body written piece by piece.
    pub fn stream(content_type: &'static str, parts: Vec<String>) -> Self {
        Self {
            status: 200,
            content_type,
            parts,
            delay: Duration::ZERO,
            hold: Duration::ZERO,
            streamed: true,
        }
    }

    /// Wait this long before writing each piece.
    pub fn every(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Keep the connection open this long after the last piece.
    pub fn then_hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }
}

type Handler = dyn Fn(&Request) -> Reply + Send + Sync;

pub struct MockServer {
    base_url: String,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl MockServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Request) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let log = requests.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = handler.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, handler, log).await;
                });
            }
        });

        Self { base_url, requests }
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }
}

async fn serve(mut stream: TcpStream, handler: Arc<Handler>, log: Arc<Mutex<Vec<Request>>>) -> std::io::Result<()> {
    let Some(request) = read_request(&mut stream).await? else {
        return Ok(());
    };
    let reply = handler(&request);
    log.lock().unwrap().push(request);

    let reason = match reply.status {
        200 => "OK",
        503 => "Service Unavailable",
        _ => "Error",
    };
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nConnection: close\r\n",
        reply.status, reason, reply.content_type
    );
    if !reply.streamed {
        let length: usize = reply.parts.iter().map(String::len).sum();
        head.push_str(&format!("Content-Length: {}\r\n", length));
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes()).await?;
    stream.flush().await?;

    for part in &reply.parts {
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        stream.write_all(part.as_bytes()).await?;
        stream.flush().await?;
    }
    if !reply.hold.is_zero() {
        tokio::time::sleep(reply.hold).await;
    }
    stream.shutdown().await
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<Request>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut request_line = head.split_whitespace();
    let method = request_line.next().unwrap_or("GET").to_string();
    let path = request_line.next().unwrap_or("/").to_string();
    let length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Ok(Some(Request {
        method,
        path,
        body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
    }))
}
