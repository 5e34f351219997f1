// Storage module - persists response bodies either in memory or on disk
//
// Durable layout, one directory per day and per tab:
//
//   <history-root>/<yyyy-MM-dd>/<tab>/<yyyyMMdd'T'HHmmss>.<suffix>
//
// With no-log enabled nothing touches the filesystem; the body is kept in a
// named in-memory artifact instead. The choice is made once per response.

use crate::error::{DashError, Result};
use bytes::Bytes;
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Timestamp format used in persisted file names
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Date bucket format under the history root
pub const DATE_BUCKET_FORMAT: &str = "%Y-%m-%d";

/// Clock used for file names and date buckets
pub type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Local::now)
}

// ─────────────────────────────────────────────────────────────────────────────
// History Root
// ─────────────────────────────────────────────────────────────────────────────

/// Supplies the directory that today's responses are written under
pub trait HistoryRoot: Send + Sync {
    fn resolve(&self, now: &DateTime<Local>) -> PathBuf;
}

/// `<base>/<yyyy-MM-dd>`
#[derive(Debug, Clone)]
pub struct DatedHistoryRoot {
    base: PathBuf,
}

impl DatedHistoryRoot {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl HistoryRoot for DatedHistoryRoot {
    fn resolve(&self, now: &DateTime<Local>) -> PathBuf {
        self.base.join(now.format(DATE_BUCKET_FORMAT).to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Persisted Response
// ─────────────────────────────────────────────────────────────────────────────

/// Where a response body ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// No-log mode: named buffer, never written anywhere
    Ephemeral { name: String, bytes: Bytes },
    /// Written to the history directory
    Logged { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedResponse {
    artifact: Artifact,
    binary: bool,
}

impl PersistedResponse {
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Bytes are not safely editable as text
    pub fn is_binary(&self) -> bool {
        self.binary
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self.artifact, Artifact::Ephemeral { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.artifact {
            Artifact::Logged { path } => Some(path),
            Artifact::Ephemeral { .. } => None,
        }
    }

    /// Description fragment pointing at the saved file, if there is one
    pub fn location_fragment(&self) -> Option<String> {
        self.path()
            .map(|path| format!("\r\n>> {}\r\n", path.display()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response Persistence
// ─────────────────────────────────────────────────────────────────────────────

/// Writes response bodies to the dated history tree
pub struct ResponsePersistence {
    root: Arc<dyn HistoryRoot>,
    clock: Clock,
}

impl ResponsePersistence {
    pub fn new(root: Arc<dyn HistoryRoot>) -> Self {
        Self::with_clock(root, system_clock())
    }

    pub fn with_clock(root: Arc<dyn HistoryRoot>, clock: Clock) -> Self {
        Self { root, clock }
    }

    /// Persist one response body
    ///
    /// `binary` marks the artifact for preview panes. With `no_log` the body
    /// stays in memory and this never fails.
    pub fn persist(
        &self,
        body: &Bytes,
        suffix: &str,
        tab_name: &str,
        no_log: bool,
        binary: bool,
    ) -> Result<PersistedResponse> {
        let now = (self.clock)();
        let stamp = now.format(FILE_TIMESTAMP_FORMAT).to_string();

        if no_log {
            return Ok(PersistedResponse {
                artifact: Artifact::Ephemeral {
                    name: format!("{}.{}", stamp, suffix),
                    bytes: body.clone(),
                },
                binary,
            });
        }

        let tab_dir = self.root.resolve(&now).join(tab_subdir(tab_name));
        fs::create_dir_all(&tab_dir).map_err(|e| DashError::persistence(&tab_dir, e))?;
        let tab_dir = tab_dir
            .canonicalize()
            .map_err(|e| DashError::persistence(&tab_dir, e))?;

        let path = unique_path(&tab_dir, &stamp, suffix);

        if path.exists() {
            tracing::debug!(path = %path.display(), "Removing stale response file");
            fs::remove_file(&path).map_err(|e| DashError::persistence(&path, e))?;
        }

        fs::write(&path, body).map_err(|e| DashError::persistence(&path, e))?;

        tracing::info!(
            tab = %tab_name,
            path = %path.display(),
            bytes = body.len(),
            "Saved response"
        );

        Ok(PersistedResponse {
            artifact: Artifact::Logged { path },
            binary,
        })
    }
}

/// Tab name as a relative path that stays under the date bucket
///
/// Only plain components survive, so roots, drive prefixes and `..` are
/// dropped. A name with nothing left becomes `_`.
fn tab_subdir(tab_name: &str) -> PathBuf {
    let subdir: PathBuf = Path::new(tab_name)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();

    if subdir.as_os_str().is_empty() {
        PathBuf::from("_")
    } else {
        subdir
    }
}

/// First free `<stamp>.<suffix>`, `<stamp>-1.<suffix>`, ... in `dir`
fn unique_path(dir: &Path, stamp: &str, suffix: &str) -> PathBuf {
    let mut candidate = dir.join(format!("{}.{}", stamp, suffix));
    let mut n = 1u32;

    while candidate.exists() {
        candidate = dir.join(format!("{}-{}.{}", stamp, n, suffix));
        n += 1;
    }
    candidate
}
