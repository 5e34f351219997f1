//! View collaborators
//!
//! The dashboard never draws anything itself. It asks a host-supplied
//! `ViewFactory` for views and then only ever appends to log views or
//! releases handles. `memory` is an in-process implementation used by the
//! binary and by tests.

pub mod memory;

use crate::classify::PreviewHint;
use crate::storage::PersistedResponse;
use std::sync::{Arc, Mutex};

/// A view resource owned by a tab session
///
/// `release` may be called any number of times; only the first call frees
/// anything.
pub trait ViewHandle: Send + Sync {
    fn release(&self);
}

/// Handle that runs `f` on its first release
///
/// Used by live sources to hand their teardown to the owning session.
pub fn on_release(f: impl FnOnce() + Send + 'static) -> Arc<dyn ViewHandle> {
    type Teardown = Box<dyn FnOnce() + Send>;

    struct OnRelease(Mutex<Option<Teardown>>);

    impl ViewHandle for OnRelease {
        fn release(&self) {
            let teardown = self.0.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let Some(f) = teardown {
                f();
            }
        }
    }

    Arc::new(OnRelease(Mutex::new(Some(Box::new(f)))))
}

/// Append-only document with a cursor and a viewport
///
/// Implementations must not read content back into the dashboard.
pub trait DocumentSink: Send + Sync {
    fn insert_at_end(&self, text: &str);
    fn move_cursor_to_end(&self);
    fn scroll_to_cursor(&self);
}

/// A live event log: appendable and releasable
pub trait LogView: DocumentSink + ViewHandle {}

impl<T: DocumentSink + ViewHandle> LogView for T {}

/// Host factory for the views a tab is built from
pub trait ViewFactory: Send + Sync {
    /// Read-only text view (request text, response text, error text)
    fn text_view(&self, name: &str, content: &str) -> Arc<dyn ViewHandle>;

    /// Empty log view for streaming tabs
    fn log_view(&self, name: &str) -> Arc<dyn LogView>;

    /// Secondary preview pane at a fixed height
    fn preview(
        &self,
        artifact: &PersistedResponse,
        hint: PreviewHint,
        height: u32,
    ) -> Arc<dyn ViewHandle>;
}

/// Adapts a log view for use as a plain sink
pub(crate) fn as_sink(view: Arc<dyn LogView>) -> Arc<dyn DocumentSink> {
    struct Sink(Arc<dyn LogView>);

    impl DocumentSink for Sink {
        fn insert_at_end(&self, text: &str) {
            self.0.insert_at_end(text);
        }
        fn move_cursor_to_end(&self) {
            self.0.move_cursor_to_end();
        }
        fn scroll_to_cursor(&self) {
            self.0.scroll_to_cursor();
        }
    }

    Arc::new(Sink(view))
}

/// Adapts a log view for use as an owned resource
pub(crate) fn as_handle(view: Arc<dyn LogView>) -> Arc<dyn ViewHandle> {
    struct Handle(Arc<dyn LogView>);

    impl ViewHandle for Handle {
        fn release(&self) {
            self.0.release();
        }
    }

    Arc::new(Handle(view))
}
