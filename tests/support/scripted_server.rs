//! Minimal HTTP/1.1 server whose first full-body response stalls on demand.
//!
//! A request without `Range` gets `200` with the first `stall_after` bytes,
//! then the connection waits until [`ScriptedServer::release`] before the rest
//! is sent. A `Range: bytes=N-` request gets `206` with `body[N..]` at once.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

pub struct ScriptedServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    release: Arc<Notify>,
}

/// Deterministic test payload.
pub fn pattern_body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

impl ScriptedServer {
    pub async fn start(body: Vec<u8>, stall_after: usize) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));
        let release = Arc::new(Notify::new());
        let body = Arc::new(body);

        let accept_requests = Arc::clone(&requests);
        let accept_release = Arc::clone(&release);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let body = Arc::clone(&body);
                let requests = Arc::clone(&accept_requests);
                let release = Arc::clone(&accept_release);
                tokio::spawn(async move {
                    let _ = serve(stream, &body, stall_after, &requests, &release).await;
                });
            }
        });

        Ok(Self {
            addr,
            requests,
            release,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Lets a stalled response continue.
    pub fn release(&self) {
        self.release.notify_one();
    }

    /// Raw request heads received so far, lowercased.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve(
    mut stream: TcpStream,
    body: &[u8],
    stall_after: usize,
    requests: &Mutex<Vec<String>>,
    release: &Notify,
) -> std::io::Result<()> {
    let head = read_head(&mut stream).await?;
    requests.lock().unwrap().push(head.clone());

    let total = body.len();
    match range_start(&head) {
        Some(start) if start < total => {
            let rest = &body[start..];
            let header = format!(
                "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {start}-{}/{total}\r\nConnection: close\r\n\r\n",
                rest.len(),
                total - 1
            );
            stream.write_all(header.as_bytes()).await?;
            stream.write_all(rest).await?;
        }
        Some(_) => {
            let header = format!(
                "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{total}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            );
            stream.write_all(header.as_bytes()).await?;
        }
        None => {
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {total}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n"
            );
            stream.write_all(header.as_bytes()).await?;
            let split = stall_after.min(total);
            stream.write_all(&body[..split]).await?;
            stream.flush().await?;
            if split < total {
                release.notified().await;
                stream.write_all(&body[split..]).await?;
            }
        }
    }
    stream.flush().await?;
    stream.shutdown().await
}

async fn read_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(String::from_utf8_lossy(&buf).to_ascii_lowercase())
}

fn range_start(head: &str) -> Option<usize> {
    head.lines()
        .find_map(|line| line.strip_prefix("range:"))
        .and_then(|value| value.trim().strip_prefix("bytes="))
        .and_then(|spec| spec.strip_suffix('-'))
        .and_then(|start| start.parse().ok())
}
