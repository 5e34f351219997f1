//! Response classification
//!
//! Picks how a response is presented and which file suffix its body gets.
//! Every function here is pure and total: unknown or malformed content types
//! resolve to the plain/`txt` fallback instead of failing.

use crate::model::{split_media_type, SimpleType};

/// Suffix used when neither the simple type nor the content type decides
pub const FALLBACK_SUFFIX: &str = "txt";

/// Which kind of preview pane accompanies the text view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewHint {
    /// Bytes are not safely editable as text (HTML, PDF)
    Binary,
    /// Dedicated image preview
    Image,
}

/// Presentation strategy for one response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Plain,
    Previewable(PreviewHint),
    Error,
}

impl RenderMode {
    pub fn is_previewable(&self) -> bool {
        matches!(self, Self::Previewable(_))
    }

    /// Whether the persisted artifact carries the binary marker
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Previewable(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub mode: RenderMode,
    pub suffix: String,
}

/// Classify a response
///
/// A captured failure wins over everything else.
pub fn classify(simple_type: SimpleType, content_type: &str, failed: bool) -> Classification {
    let mode = if failed {
        RenderMode::Error
    } else {
        match simple_type {
            SimpleType::Html | SimpleType::Pdf => RenderMode::Previewable(PreviewHint::Binary),
            SimpleType::Image => RenderMode::Previewable(PreviewHint::Image),
            SimpleType::Json | SimpleType::Xml | SimpleType::Text | SimpleType::Other => {
                RenderMode::Plain
            }
        }
    };

    Classification {
        mode,
        suffix: suffix_for(simple_type, content_type),
    }
}

/// Resolve the file suffix for a response body
pub fn suffix_for(simple_type: SimpleType, content_type: &str) -> String {
    let fixed = match simple_type {
        SimpleType::Json => Some("json"),
        SimpleType::Xml => Some("xml"),
        SimpleType::Html => Some("html"),
        SimpleType::Pdf => Some("pdf"),
        SimpleType::Image => return image_suffix(content_type).to_string(),
        SimpleType::Text | SimpleType::Other => None,
    };

    fixed
        .or_else(|| suffix_from_content_type(content_type))
        .unwrap_or(FALLBACK_SUFFIX)
        .to_string()
}

fn image_suffix(content_type: &str) -> &'static str {
    match split_media_type(content_type) {
        Some((top, sub)) if top == "image" => match sub.as_str() {
            "jpeg" | "jpg" | "pjpeg" => "jpg",
            "gif" => "gif",
            "webp" => "webp",
            "bmp" => "bmp",
            "svg+xml" => "svg",
            "x-icon" | "vnd.microsoft.icon" => "ico",
            "tiff" => "tiff",
            _ => "png",
        },
        _ => "png",
    }
}

fn suffix_from_content_type(content_type: &str) -> Option<&'static str> {
    let (_, sub) = split_media_type(content_type)?;

    let suffix = match sub.as_str() {
        "json" => "json",
        s if s.ends_with("+json") => "json",
        "xml" => "xml",
        s if s.ends_with("+xml") => "xml",
        "html" | "xhtml+xml" => "html",
        "pdf" => "pdf",
        "javascript" | "ecmascript" => "js",
        "css" => "css",
        "csv" => "csv",
        "plain" => "txt",
        "yaml" | "x-yaml" => "yaml",
        _ => return None,
    };
    Some(suffix)
}
