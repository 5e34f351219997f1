//! Error types surfaced by the dashboard core
//!
//! Only failures a caller can act on are represented here. Execution failures
//! travel inside `HttpInfo` and are rendered, never raised. Disposal races
//! (release after release, deliver after release) are absorbed as no-ops and
//! have no variant.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors that can occur while composing a tab
#[derive(Debug)]
pub enum DashError {
    /// Creating the history directory or writing the response body failed
    Persistence { path: PathBuf, source: io::Error },
    /// A registry operation named a tab that has no live session
    UnknownTab(String),
    /// The external WebSocket session rejected an outbound message
    Send(String),
}

impl DashError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for DashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persistence { path, source } => {
                write!(
                    f,
                    "Failed to persist response to {}: {}",
                    path.display(),
                    source
                )
            }
            Self::UnknownTab(name) => write!(f, "No live session for tab '{}'", name),
            Self::Send(msg) => write!(f, "WebSocket send failed: {}", msg),
        }
    }
}

impl std::error::Error for DashError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Persistence { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DashError>;
