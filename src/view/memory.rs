//! In-memory views
//!
//! Every view is a `MemoryDocument` recording its content, cursor, viewport
//! and release calls. Documents can mirror appended text to stdout, which is
//! how the binary shows a live log without a GUI.

use super::{DocumentSink, LogView, ViewFactory, ViewHandle};
use crate::classify::PreviewHint;
use crate::storage::{Artifact, PersistedResponse};
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

/// What a document was created as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Log,
    Preview { hint: PreviewHint, height: u32 },
}

/// Snapshot-able state of one document
#[derive(Debug, Clone, Default)]
pub struct DocumentState {
    pub content: String,
    /// Byte offset of the cursor in `content`
    pub cursor: usize,
    /// Cursor offset the viewport was last scrolled to
    pub scrolled_to: Option<usize>,
    /// `(cursor, content length)` recorded at every scroll
    pub scroll_log: Vec<(usize, usize)>,
    /// How many times `release` was called
    pub release_calls: usize,
}

impl DocumentState {
    /// Cursor is at end-of-content and the viewport shows it
    pub fn is_following(&self) -> bool {
        self.cursor == self.content.len() && self.scrolled_to == Some(self.cursor)
    }
}

#[derive(Debug)]
pub struct MemoryDocument {
    name: String,
    kind: DocumentKind,
    mirror_stdout: bool,
    state: Mutex<DocumentState>,
}

impl MemoryDocument {
    fn new(name: &str, kind: DocumentKind, content: &str, mirror_stdout: bool) -> Self {
        Self {
            name: name.to_string(),
            kind,
            mirror_stdout,
            state: Mutex::new(DocumentState {
                content: content.to_string(),
                ..Default::default()
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn content(&self) -> String {
        self.lock().content.clone()
    }

    pub fn state(&self) -> DocumentState {
        self.lock().clone()
    }

    pub fn is_released(&self) -> bool {
        self.lock().release_calls > 0
    }

    fn lock(&self) -> MutexGuard<'_, DocumentState> {
        // A panic while holding the lock leaves plain data behind; keep using it
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DocumentSink for MemoryDocument {
    fn insert_at_end(&self, text: &str) {
        self.lock().content.push_str(text);

        if self.mirror_stdout {
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(text.as_bytes());
            let _ = out.flush();
        }
    }

    fn move_cursor_to_end(&self) {
        let mut state = self.lock();
        state.cursor = state.content.len();
    }

    fn scroll_to_cursor(&self) {
        let mut state = self.lock();
        let cursor = state.cursor;
        let len = state.content.len();
        state.scrolled_to = Some(cursor);
        state.scroll_log.push((cursor, len));
    }
}

impl ViewHandle for MemoryDocument {
    fn release(&self) {
        self.lock().release_calls += 1;
    }
}

/// Factory that keeps the documents it created until they are released
///
/// Released documents are dropped from the list the next time a view is
/// created; callers holding an `Arc` to one can still inspect it.
#[derive(Debug, Default)]
pub struct MemoryViews {
    mirror_logs: bool,
    documents: Mutex<Vec<Arc<MemoryDocument>>>,
}

impl MemoryViews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log views created by this factory also print appended text to stdout
    pub fn mirroring_logs() -> Self {
        Self {
            mirror_logs: true,
            ..Self::default()
        }
    }

    pub fn documents(&self) -> Vec<Arc<MemoryDocument>> {
        self.lock().clone()
    }

    /// Most recently created document with this name
    pub fn find(&self, name: &str) -> Option<Arc<MemoryDocument>> {
        self.lock().iter().rev().find(|d| d.name == name).cloned()
    }

    pub fn of_kind(&self, matches: impl Fn(DocumentKind) -> bool) -> Vec<Arc<MemoryDocument>> {
        self.lock()
            .iter()
            .filter(|d| matches(d.kind))
            .cloned()
            .collect()
    }

    fn push(&self, doc: MemoryDocument) -> Arc<MemoryDocument> {
        let doc = Arc::new(doc);
        let mut documents = self.lock();
        documents.retain(|d| !d.is_released());
        documents.push(Arc::clone(&doc));
        doc
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<MemoryDocument>>> {
        self.documents.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ViewFactory for MemoryViews {
    fn text_view(&self, name: &str, content: &str) -> Arc<dyn ViewHandle> {
        self.push(MemoryDocument::new(name, DocumentKind::Text, content, false))
    }

    fn log_view(&self, name: &str) -> Arc<dyn LogView> {
        self.push(MemoryDocument::new(
            name,
            DocumentKind::Log,
            "",
            self.mirror_logs,
        ))
    }

    fn preview(
        &self,
        artifact: &PersistedResponse,
        hint: PreviewHint,
        height: u32,
    ) -> Arc<dyn ViewHandle> {
        let label = match artifact.artifact() {
            Artifact::Ephemeral { name, .. } => name.clone(),
            Artifact::Logged { path } => path.display().to_string(),
        };
        self.push(MemoryDocument::new(
            &label,
            DocumentKind::Preview { hint, height },
            "",
            false,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_document_follows_after_append() {
        let views = MemoryViews::new();
        let log = views.log_view("ws");

        log.insert_at_end("one\n");
        log.move_cursor_to_end();
        log.scroll_to_cursor();

        let doc = views.find("ws").unwrap();
        let state = doc.state();
        assert_eq!(state.content, "one\n");
        assert!(state.is_following());
        assert_eq!(state.scroll_log, vec![(4, 4)]);
    }

    #[test]
    fn test_release_is_counted_not_enforced() {
        let views = MemoryViews::new();
        let text = views.text_view("request", "GET /");
        text.release();
        text.release();

        let doc = views.find("request").unwrap();
        assert!(doc.is_released());
        assert_eq!(doc.state().release_calls, 2);
        assert_eq!(doc.content(), "GET /");
    }

    #[test]
    fn test_of_kind_filters_documents() {
        let views = MemoryViews::new();
        views.text_view("a", "");
        views.log_view("b");

        let logs = views.of_kind(|k| k == DocumentKind::Log);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].name(), "b");
    }

    #[test]
    fn test_released_documents_are_pruned() {
        let views = MemoryViews::new();
        let old = views.log_view("ws");
        old.release();
        views.log_view("ws");

        assert_eq!(views.documents().len(), 1);
        assert!(!views.find("ws").unwrap().is_released());
    }
}
