//! Data model for one tab run
//!
//! An `HttpInfo` is produced entirely outside this crate (by whatever executed
//! the request) and handed to the composer. It is immutable once built and is
//! owned by the tab session that receives it.

use bytes::Bytes;
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Simple Type
// ─────────────────────────────────────────────────────────────────────────────

/// Coarse classification of a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimpleType {
    Json,
    Xml,
    Text,
    Html,
    Pdf,
    Image,
    Other,
}

impl SimpleType {
    /// Classify a raw `Content-Type` header value
    ///
    /// Parameters (`; charset=...`) are ignored and matching is
    /// case-insensitive. Anything without a `type/subtype` shape is `Other`.
    pub fn from_content_type(content_type: &str) -> Self {
        let Some((top, sub)) = split_media_type(content_type) else {
            return Self::Other;
        };

        match (top.as_str(), sub.as_str()) {
            ("image", _) => Self::Image,
            ("text", "html") | ("application", "xhtml+xml") => Self::Html,
            ("application", "pdf") => Self::Pdf,
            (_, "json") => Self::Json,
            (_, s) if s.ends_with("+json") => Self::Json,
            (_, "xml") => Self::Xml,
            (_, s) if s.ends_with("+xml") => Self::Xml,
            ("text", _) => Self::Text,
            ("application", "javascript" | "x-www-form-urlencoded" | "graphql") => Self::Text,
            _ => Self::Other,
        }
    }

    /// TEXT-like kinds are rendered inline as readable text
    pub fn is_text_like(&self) -> bool {
        matches!(self, Self::Json | Self::Xml | Self::Text)
    }

    /// Payloads that are not safely shown as text in a response description
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Image | Self::Pdf | Self::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Text => "text",
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for SimpleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Split `type/subtype; params` into lowercase `(type, subtype)`
pub(crate) fn split_media_type(content_type: &str) -> Option<(String, String)> {
    let essence = content_type.split(';').next()?.trim();
    let (top, sub) = essence.split_once('/')?;
    let (top, sub) = (top.trim(), sub.trim());

    if top.is_empty() || sub.is_empty() || sub.contains('/') {
        return None;
    }

    Some((top.to_ascii_lowercase(), sub.to_ascii_lowercase()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution Failure
// ─────────────────────────────────────────────────────────────────────────────

/// Marker error placed in a failure chain when the request was interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request was cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// A failure captured while executing the exchange
///
/// Rendered verbatim in place of a response; never raised by this crate.
#[derive(Debug)]
pub struct ExecutionFailure(anyhow::Error);

impl ExecutionFailure {
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self(error.into())
    }

    pub fn cancelled() -> Self {
        Self(anyhow::Error::new(Cancelled))
    }

    /// Top-level message only
    pub fn message(&self) -> String {
        self.0.to_string()
    }

    /// Message followed by its cause chain, one cause per line
    pub fn render(&self) -> String {
        let mut out = self.0.to_string();
        let causes: Vec<String> = self.0.chain().skip(1).map(|c| c.to_string()).collect();

        if !causes.is_empty() {
            out.push_str("\n\nCaused by:");
            for (idx, cause) in causes.iter().enumerate() {
                out.push_str(&format!("\n    {}: {}", idx, cause));
            }
        }
        out.push('\n');
        out
    }

    /// Whether the chain contains a cancellation
    pub fn is_cancelled(&self) -> bool {
        self.0.chain().any(|e| e.is::<Cancelled>())
    }

    pub fn error(&self) -> &anyhow::Error {
        &self.0
    }
}

impl From<anyhow::Error> for ExecutionFailure {
    fn from(error: anyhow::Error) -> Self {
        Self(error)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HttpInfo
// ─────────────────────────────────────────────────────────────────────────────

/// One completed HTTP exchange
#[derive(Debug)]
pub struct HttpInfo {
    request_desc: Vec<String>,
    response_desc: Vec<String>,
    failure: Option<ExecutionFailure>,
    body: Option<Bytes>,
    simple_type: SimpleType,
    content_type: String,
}

impl HttpInfo {
    /// A successful exchange with a response body
    pub fn success(
        request_desc: Vec<String>,
        response_desc: Vec<String>,
        body: impl Into<Bytes>,
        simple_type: SimpleType,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            request_desc,
            response_desc,
            failure: None,
            body: Some(body.into()),
            simple_type,
            content_type: content_type.into(),
        }
    }

    /// A failed exchange; only the request side was produced
    pub fn failed(request_desc: Vec<String>, failure: impl Into<ExecutionFailure>) -> Self {
        Self {
            request_desc,
            response_desc: Vec::new(),
            failure: Some(failure.into()),
            body: None,
            simple_type: SimpleType::Other,
            content_type: String::new(),
        }
    }

    pub fn request_desc(&self) -> &[String] {
        &self.request_desc
    }

    pub fn response_desc(&self) -> &[String] {
        &self.response_desc
    }

    pub fn failure(&self) -> Option<&ExecutionFailure> {
        self.failure.as_ref()
    }

    /// Raw response payload; `None` when the exchange failed
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn simple_type(&self) -> SimpleType {
        self.simple_type
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Request fragments concatenated in insertion order
    pub fn request_text(&self) -> String {
        self.request_desc.concat()
    }

    /// Response fragments concatenated in insertion order
    pub fn response_text(&self) -> String {
        self.response_desc.concat()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Kind
// ─────────────────────────────────────────────────────────────────────────────

/// What a tab is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    Http,
    WebSocket,
    MockServer,
}

impl SessionKind {
    /// Streaming kinds own a live appender subscription
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::WebSocket | Self::MockServer)
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::WebSocket => write!(f, "websocket"),
            Self::MockServer => write!(f, "mock-server"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_simple_type_from_content_type() {
        assert_eq!(
            SimpleType::from_content_type("application/json; charset=utf-8"),
            SimpleType::Json
        );
        assert_eq!(
            SimpleType::from_content_type("application/problem+json"),
            SimpleType::Json
        );
        assert_eq!(SimpleType::from_content_type("TEXT/HTML"), SimpleType::Html);
        assert_eq!(
            SimpleType::from_content_type("application/pdf"),
            SimpleType::Pdf
        );
        assert_eq!(
            SimpleType::from_content_type("image/svg+xml"),
            SimpleType::Image
        );
        assert_eq!(SimpleType::from_content_type("text/xml"), SimpleType::Xml);
        assert_eq!(SimpleType::from_content_type("text/csv"), SimpleType::Text);
        assert_eq!(
            SimpleType::from_content_type("application/octet-stream"),
            SimpleType::Other
        );
    }

    #[test]
    fn test_simple_type_unparseable_is_other() {
        assert_eq!(SimpleType::from_content_type(""), SimpleType::Other);
        assert_eq!(SimpleType::from_content_type("garbage"), SimpleType::Other);
        assert_eq!(SimpleType::from_content_type("a/b/c"), SimpleType::Other);
        assert_eq!(SimpleType::from_content_type("/json"), SimpleType::Other);
    }

    #[test]
    fn test_request_and_response_text_keep_fragment_order() {
        let info = HttpInfo::success(
            vec!["GET /a HTTP/1.1\r\n".into(), "Accept: */*\r\n".into()],
            vec!["// 200\r\n".into(), "{}".into()],
            Bytes::from_static(b"{}"),
            SimpleType::Json,
            "application/json",
        );
        assert_eq!(info.request_text(), "GET /a HTTP/1.1\r\nAccept: */*\r\n");
        assert_eq!(info.response_text(), "// 200\r\n{}");
        assert!(info.failure().is_none());
        assert_eq!(info.body().map(|b| b.len()), Some(2));
    }

    #[test]
    fn test_failure_renders_cause_chain() {
        let err: anyhow::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ))
        .context("GET http://localhost:1 failed");
        let info = HttpInfo::failed(vec!["GET /\r\n".into()], err.unwrap_err());

        let rendered = info.failure().unwrap().render();
        assert!(rendered.starts_with("GET http://localhost:1 failed"));
        assert!(rendered.contains("Caused by:"));
        assert!(rendered.contains("0: connection refused"));
        assert!(info.body().is_none());
    }

    #[test]
    fn test_cancelled_failure_is_detected() {
        assert!(ExecutionFailure::cancelled().is_cancelled());
        assert!(!ExecutionFailure::new(anyhow::anyhow!("boom")).is_cancelled());
    }
}
