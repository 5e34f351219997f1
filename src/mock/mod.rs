// Mock server - a tiny HTTP/1.1 responder that logs into a tab
//
// Serves exactly one configured path with a canned response and answers
// everything else with a 404 page. Connections are handled one at a time on
// the server's own task; every request and response is pushed to the tab's
// appender as raw text, so the log reads like a transcript of the socket.

use crate::composer::StreamSource;
use crate::stream::{StreamAppender, EVENT_TIMESTAMP_FORMAT};
use crate::view::{on_release, ViewHandle};
use chrono::Local;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// Written after every logged response
pub const SEPARATOR: &str = "-----------------------------\n";

/// Longest request head accepted before giving up on a connection
const MAX_HEAD_BYTES: usize = 64 * 1024;

/// How long a client may take to send its request
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// What the mock server answers with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockConfig {
    /// Port to bind on 127.0.0.1; 0 picks a free port
    pub port: u16,
    /// Exact request path that gets the canned response
    pub path: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            port: 80,
            path: "/".to_string(),
            status: 200,
            headers: Vec::new(),
            body: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// A bound mock server
///
/// Serving starts when the server is attached to a tab. It stops on
/// `shutdown`, on drop, or when the tab releases the handle `attach` returned.
/// The port is free again once the serving task has wound down.
pub struct MockServer {
    config: Arc<MockConfig>,
    local_addr: SocketAddr,
    runtime: Handle,
    listener: Mutex<Option<TcpListener>>,
    shutdown_tx: ShutdownSlot,
}

type ShutdownSlot = Arc<Mutex<Option<oneshot::Sender<()>>>>;

/// Fire the shutdown signal; false if it already fired or serving never began
fn fire(slot: &ShutdownSlot) -> bool {
    let sender = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
    match sender {
        Some(tx) => {
            let _ = tx.send(());
            true
        }
        None => false,
    }
}

impl MockServer {
    /// Bind the listener; must be called inside a tokio runtime
    pub async fn bind(config: MockConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", config.port)).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!(addr = %local_addr, path = %config.path, "Mock server bound");

        Ok(Self {
            config: Arc::new(config),
            local_addr,
            runtime: Handle::current(),
            listener: Mutex::new(Some(listener)),
            shutdown_tx: Arc::new(Mutex::new(None)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    /// Stop accepting connections
    pub fn shutdown(&self) {
        if fire(&self.shutdown_tx) {
            tracing::info!(addr = %self.local_addr, "Mock server stopped");
        }
    }
}

impl StreamSource for MockServer {
    fn attach(&self, appender: StreamAppender) -> Arc<dyn ViewHandle> {
        let listener = self.listener.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(listener) = listener else {
            // The tab that started serving owns the shutdown
            tracing::warn!(addr = %self.local_addr, "Mock server already serving");
            return on_release(|| {});
        };

        let (tx, rx) = oneshot::channel();
        *self.shutdown_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);

        self.runtime
            .spawn(serve(listener, Arc::clone(&self.config), appender, rx));

        let slot = Arc::clone(&self.shutdown_tx);
        let addr = self.local_addr;
        on_release(move || {
            if fire(&slot) {
                tracing::info!(addr = %addr, "Mock tab disposed, server stopped");
            }
        })
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn serve(
    listener: TcpListener,
    config: Arc<MockConfig>,
    appender: StreamAppender,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let port = listener.local_addr().map(|a| a.port()).unwrap_or(config.port);
    appender.deliver(with_time(&format!("Mock server started on port {}\n", port)));

    loop {
        let (stream, peer) = tokio::select! {
            _ = &mut shutdown_rx => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "Mock server accept failed");
                    appender.deliver(with_time(&format!("Mock server error: {}\n", e)));
                    continue;
                }
            }
        };

        // A slow client must not keep a stopped server alive
        tokio::select! {
            _ = &mut shutdown_rx => break,
            handled = handle_connection(stream, peer, &config, &appender) => {
                if let Err(e) = handled {
                    tracing::debug!(peer = %peer, error = %e, "Mock connection failed");
                }
            }
        }

        if appender.is_closed() {
            tracing::debug!(port, "Mock tab closed, stopping server");
            break;
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    config: &MockConfig,
    appender: &StreamAppender,
) -> io::Result<()> {
    appender.deliver(with_time(&format!(
        "Received request from port {}\n",
        peer.port()
    )));

    let raw = match tokio::time::timeout(READ_TIMEOUT, read_request(&mut stream)).await {
        Ok(result) => result?,
        Err(_) => return Err(io::Error::new(io::ErrorKind::TimedOut, "request read timed out")),
    };
    if raw.is_empty() {
        return Ok(());
    }

    appender.deliver(format!("{}\n", raw.replace("\r\n", "\n")));

    let request_path = raw
        .split("\r\n")
        .next()
        .and_then(|line| line.split(' ').nth(1))
        .map(percent_decode)
        .unwrap_or_default();

    let response = if request_path == config.path {
        build_response(config)
    } else {
        not_found_response(&request_path)
    };

    stream.write_all(response.as_bytes()).await?;

    appender.deliver(with_time("Response:\n"));
    appender.deliver(format!("{}\n", response.replace("\r\n", "\n")));
    appender.deliver(SEPARATOR);

    stream.shutdown().await
}

/// Read the request head plus a `Content-Length` body
async fn read_request(stream: &mut TcpStream) -> io::Result<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 8192];

    let head_end = loop {
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "request head too large"));
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(String::from_utf8_lossy(&buf).into_owned());
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let body_len = content_length(&head).unwrap_or(0);

    while buf.len() < head_end + body_len {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn content_length(head: &str) -> Option<usize> {
    head.split("\r\n").find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

fn build_response(config: &MockConfig) -> String {
    let mut out = format!("HTTP/1.1 {} OK\r\n", config.status);
    for (name, value) in &config.headers {
        out.push_str(&format!("{}: {}\r\n", name, value));
    }

    let body = config.body.as_deref().unwrap_or("");
    out.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
    out.push_str(body);
    out
}

fn not_found_response(request_path: &str) -> String {
    let body = format!(
        "<!doctype html>\n<html>\n<head><title>HTTP status 404 - Not Found</title></head>\n\
         <body>\n<h1>HTTP status 404 - Not Found</h1>\n<p>path [{}] not found</p>\n</body>\n</html>",
        request_path
    );

    format!(
        "HTTP/1.1 404 Not Found\r\nContent-Type: text/html;charset=utf-8\r\nDate: {}\r\nServer: httpdash\r\nContent-Length: {}\r\n\r\n{}",
        chrono::Utc::now().to_rfc2822(),
        body.len(),
        body
    )
}

fn with_time(msg: &str) -> String {
    format!("{} - {}", Local::now().format(EVENT_TIMESTAMP_FORMAT), msg)
}

/// Decode `%XX` escapes; malformed escapes are kept literally
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::memory::MemoryViews;
    use crate::composer::ViewComposer;
    use crate::sessions::SessionRegistry;
    use crate::storage::{DatedHistoryRoot, ResponsePersistence};
    use crate::stream::StreamMode;
    use crate::view::{as_sink, ViewFactory};

    #[test]
    fn test_build_response_has_content_length() {
        let config = MockConfig {
            status: 201,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: Some("{\"id\":1}".into()),
            ..Default::default()
        };
        assert_eq!(
            build_response(&config),
            "HTTP/1.1 201 OK\r\nContent-Type: application/json\r\nContent-Length: 8\r\n\r\n{\"id\":1}"
        );
    }

    #[test]
    fn test_empty_body_has_zero_length() {
        let response = build_response(&MockConfig::default());
        assert!(response.ends_with("Content-Length: 0\r\n\r\n"));
    }

    #[test]
    fn test_not_found_names_path() {
        let response = not_found_response("/missing");
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(response.contains("path [/missing] not found"));
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("/a%20b"), "/a b");
        assert_eq!(percent_decode("/100%"), "/100%");
        assert_eq!(percent_decode("/%zz"), "/%zz");
    }

    #[test]
    fn test_content_length_header() {
        let head = "POST / HTTP/1.1\r\ncontent-length: 12\r\n\r\n";
        assert_eq!(content_length(head), Some(12));
        assert_eq!(content_length("GET / HTTP/1.1\r\n\r\n"), None);
    }

    #[tokio::test]
    async fn test_serves_configured_path_and_logs_transcript() {
        let views = MemoryViews::new();
        let (appender, _sub) = StreamAppender::spawn(
            as_sink(views.log_view("mock")),
            StreamMode::MockServer,
            &Handle::current(),
        );

        let server = MockServer::bind(MockConfig {
            port: 0,
            path: "/ping".into(),
            body: Some("pong".into()),
            ..Default::default()
        })
        .await
        .unwrap();
        let addr = server.local_addr();
        server.attach(appender.clone());

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /ping HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut reply = String::new();
        client.read_to_string(&mut reply).await.unwrap();

        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(reply.ends_with("\r\n\r\npong"));

        server.shutdown();
        appender.settled().await;

        let log = views.find("mock").unwrap().content();
        assert!(log.contains(&format!("Mock server started on port {}", addr.port())));
        assert!(log.contains("GET /ping HTTP/1.1\nHost: localhost\n"));
        assert!(log.ends_with(SEPARATOR));
    }

    #[tokio::test]
    async fn test_disposed_tab_stops_server_and_frees_port() {
        let dir = tempfile::tempdir().unwrap();
        let views = Arc::new(MemoryViews::new());
        let composer = ViewComposer::new(
            Arc::new(SessionRegistry::new()),
            Arc::new(ResponsePersistence::new(Arc::new(DatedHistoryRoot::new(
                dir.path(),
            )))),
            Arc::clone(&views) as Arc<dyn ViewFactory>,
            Handle::current(),
        );

        let server = Arc::new(
            MockServer::bind(MockConfig {
                port: 0,
                path: "/p".into(),
                body: Some("hi".into()),
                ..Default::default()
            })
            .await
            .unwrap(),
        );
        let addr = server.local_addr();
        composer
            .compose_mock_server("mock", Arc::clone(&server) as Arc<dyn StreamSource>)
            .unwrap();

        assert!(composer.registry().release("mock"));

        let mut rebound = None;
        for _ in 0..100 {
            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    rebound = Some(listener);
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        assert!(rebound.is_some(), "port {} still bound", addr.port());
        assert!(views.find("mock/log").unwrap().is_released());
    }
}
