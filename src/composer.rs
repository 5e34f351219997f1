//! Tab composition
//!
//! Builds the content of one tab for each session kind. Every entry point
//! starts by acquiring the tab in the registry, so whatever the tab showed
//! before is gone by the time new views are created. Views are handed to the
//! session as soon as they exist; a failure halfway leaves the finished views
//! owned by the session.

use crate::classify::{classify, RenderMode};
use crate::error::{DashError, Result};
use crate::model::{HttpInfo, SessionKind};
use crate::sessions::{SessionInfo, SessionRegistry};
use crate::storage::{PersistedResponse, ResponsePersistence};
use crate::stream::{StreamAppender, StreamMode};
use crate::view::{as_handle, as_sink, ViewFactory, ViewHandle};
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;

/// Default preview pane height
pub const DEFAULT_PREVIEW_HEIGHT: u32 = 160;

// ─────────────────────────────────────────────────────────────────────────────
// External sources
// ─────────────────────────────────────────────────────────────────────────────

/// A live source that pushes text into a tab
pub trait StreamSource: Send + Sync {
    /// Start delivering events to `appender`, in the order they occur
    ///
    /// The returned handle is owned by the tab session. Releasing it stops
    /// the source.
    fn attach(&self, appender: StreamAppender) -> Arc<dyn ViewHandle>;
}

/// A WebSocket session: a stream source that also accepts outbound text
///
/// Releasing the handle returned by `attach` closes the connection.
pub trait WsConnection: StreamSource {
    fn send(&self, text: &str) -> anyhow::Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Composed tabs
// ─────────────────────────────────────────────────────────────────────────────

/// Result of composing an HTTP tab
#[derive(Debug, Clone)]
pub struct ComposedHttp {
    pub session: SessionInfo,
    pub mode: RenderMode,
    /// `None` for failed exchanges
    pub persisted: Option<PersistedResponse>,
    /// Response text as rendered, or the error text for failures
    pub rendered: String,
}

/// A composed WebSocket tab with its input box
pub struct WsTab {
    session: SessionInfo,
    appender: StreamAppender,
    connection: Arc<dyn WsConnection>,
    input: Mutex<String>,
}

impl WsTab {
    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    pub fn appender(&self) -> &StreamAppender {
        &self.appender
    }

    pub fn set_input(&self, text: impl Into<String>) {
        *self.lock_input() = text.into();
    }

    pub fn input(&self) -> String {
        self.lock_input().clone()
    }

    /// Send the input box contents and clear it
    ///
    /// On failure the input is kept so it can be sent again. Once the tab
    /// has been disposed nothing is sent.
    pub fn send(&self) -> Result<()> {
        let mut input = self.lock_input();

        if self.appender.is_closed() {
            tracing::debug!(tab = %self.session.name, "Send on a disposed WebSocket tab");
            return Err(DashError::UnknownTab(self.session.name.clone()));
        }

        if let Err(e) = self.connection.send(&input) {
            tracing::warn!(tab = %self.session.name, error = %e, "WebSocket send failed");
            return Err(DashError::Send(e.to_string()));
        }

        tracing::trace!(tab = %self.session.name, bytes = input.len(), "WebSocket message sent");
        input.clear();
        Ok(())
    }

    fn lock_input(&self) -> std::sync::MutexGuard<'_, String> {
        self.input.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A composed mock-server tab; receive only
pub struct MockTab {
    session: SessionInfo,
    appender: StreamAppender,
}

impl MockTab {
    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    pub fn appender(&self) -> &StreamAppender {
        &self.appender
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Composer
// ─────────────────────────────────────────────────────────────────────────────

pub struct ViewComposer {
    registry: Arc<SessionRegistry>,
    persistence: Arc<ResponsePersistence>,
    views: Arc<dyn ViewFactory>,
    runtime: Handle,
    preview_height: u32,
}

impl ViewComposer {
    /// `runtime` is where stream appenders apply their events
    pub fn new(
        registry: Arc<SessionRegistry>,
        persistence: Arc<ResponsePersistence>,
        views: Arc<dyn ViewFactory>,
        runtime: Handle,
    ) -> Self {
        Self {
            registry,
            persistence,
            views,
            runtime,
            preview_height: DEFAULT_PREVIEW_HEIGHT,
        }
    }

    pub fn with_preview_height(mut self, height: u32) -> Self {
        self.preview_height = height;
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Render one finished HTTP exchange into `tab`
    ///
    /// The request view is always created. A captured failure replaces the
    /// whole response side with its error text and nothing is persisted.
    pub fn compose_http(&self, tab: &str, info: &HttpInfo, no_log: bool) -> Result<ComposedHttp> {
        let session = self.registry.acquire(tab, SessionKind::Http);

        let request = self
            .views
            .text_view(&view_name(tab, "request"), &info.request_text());
        self.registry.attach(session.id, request)?;

        if let Some(failure) = info.failure() {
            let rendered = failure.render();
            let error = self.views.text_view(&view_name(tab, "error.log"), &rendered);
            self.registry.attach(session.id, error)?;

            tracing::debug!(tab = %tab, cancelled = failure.is_cancelled(), "Rendered failed exchange");
            return Ok(ComposedHttp {
                session,
                mode: RenderMode::Error,
                persisted: None,
                rendered,
            });
        }

        let classification = classify(info.simple_type(), info.content_type(), false);
        let body = info.body().cloned().unwrap_or_else(Bytes::new);

        let persisted = self
            .persistence
            .persist(
                &body,
                &classification.suffix,
                tab,
                no_log,
                classification.mode.is_binary(),
            )
            .map_err(|e| {
                tracing::error!(tab = %tab, error = %e, "Response could not be saved");
                e
            })?;

        let mut rendered = info.response_text();
        if let Some(fragment) = persisted.location_fragment() {
            rendered.push_str(&fragment);
        }

        let response = self
            .views
            .text_view(&view_name(tab, "response"), &rendered);
        self.registry.attach(session.id, response)?;

        if let RenderMode::Previewable(hint) = classification.mode {
            let preview = self.views.preview(&persisted, hint, self.preview_height);
            self.registry.attach(session.id, preview)?;
        }

        tracing::debug!(
            tab = %tab,
            simple_type = %info.simple_type(),
            suffix = %classification.suffix,
            no_log,
            "Composed HTTP tab"
        );

        Ok(ComposedHttp {
            session,
            mode: classification.mode,
            persisted: Some(persisted),
            rendered,
        })
    }

    /// Open a live WebSocket log in `tab`
    pub fn compose_websocket(&self, tab: &str, connection: Arc<dyn WsConnection>) -> Result<WsTab> {
        let (session, appender) =
            self.compose_stream(tab, SessionKind::WebSocket, StreamMode::WebSocket)?;
        let close = connection.attach(appender.clone());
        self.registry.attach(session.id, close)?;

        Ok(WsTab {
            session,
            appender,
            connection,
            input: Mutex::new(String::new()),
        })
    }

    /// Open a live mock-server log in `tab`
    pub fn compose_mock_server(&self, tab: &str, source: Arc<dyn StreamSource>) -> Result<MockTab> {
        let (session, appender) =
            self.compose_stream(tab, SessionKind::MockServer, StreamMode::MockServer)?;
        let stop = source.attach(appender.clone());
        self.registry.attach(session.id, stop)?;

        Ok(MockTab { session, appender })
    }

    fn compose_stream(
        &self,
        tab: &str,
        kind: SessionKind,
        mode: StreamMode,
    ) -> Result<(SessionInfo, StreamAppender)> {
        let session = self.registry.acquire(tab, kind);

        let log = self.views.log_view(&view_name(tab, "log"));
        self.registry.attach(session.id, as_handle(Arc::clone(&log)))?;

        let (appender, subscription) = StreamAppender::spawn(as_sink(log), mode, &self.runtime);
        self.registry.bind_stream(session.id, subscription)?;

        tracing::debug!(tab = %tab, kind = %kind, "Composed streaming tab");
        Ok((session, appender))
    }
}

fn view_name(tab: &str, part: &str) -> String {
    format!("{}/{}", tab, part)
}
