//! Raw one-shot HTTP servers on `127.0.0.1`.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A canned response.
#[derive(Debug, Clone)]
pub struct Reply {
    /// Status line without the protocol, e.g. `200 OK`.
    pub status: String,
    /// Content type header.
    pub content_type: String,
    /// Raw body.
    pub body: Vec<u8>,
}

impl Reply {
    /// JSON body with the given status.
    pub fn json(status: &str, body: &str) -> Self {
        Self {
            status: status.to_owned(),
            content_type: "application/json".to_owned(),
            body: body.as_bytes().to_vec(),
        }
    }

    /// Plain text body.
    pub fn text(status: &str, body: &str) -> Self {
        Self {
            status: status.to_owned(),
            content_type: "text/plain".to_owned(),
            body: body.as_bytes().to_vec(),
        }
    }

    /// Binary body.
    pub fn bytes(status: &str, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status: status.to_owned(),
            content_type: content_type.to_owned(),
            body,
        }
    }
}

/// Serve `replies` to consecutive connections, one each.
///
/// Returns the base URL (no trailing slash) and a handle yielding the raw
/// requests received.
pub async fn serve(replies: Vec<Reply>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("listener should expose local addr");

    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for reply in replies {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            requests.push(read_request(&mut socket).await);
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                reply.status,
                reply.content_type,
                reply.body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&reply.body).await;
            let _ = socket.shutdown().await;
        }
        requests
    });

    (format!("http://{addr}"), handle)
}

/// Serve a single reply.
pub async fn serve_once(reply: Reply) -> (String, JoinHandle<Vec<String>>) {
    serve(vec![reply]).await
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if let Some(head_end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Body of a captured raw request.
pub fn body_of(request: &str) -> &str {
    request.split_once("\r\n\r\n").map_or("", |(_, body)| body)
}
