//! httpdash - session and rendering core for an HTTP/WebSocket client dashboard
//!
//! A host hands finished exchanges and live event sources to a
//! [`composer::ViewComposer`], which keeps one live session per tab name,
//! classifies and persists responses, and feeds streaming tabs through an
//! ordered, auto-following [`stream::StreamAppender`].

pub mod classify;
pub mod composer;
pub mod config;
pub mod error;
pub mod logging;
pub mod mock;
pub mod model;
pub mod sessions;
pub mod storage;
pub mod stream;
pub mod view;

pub use classify::{classify, Classification, PreviewHint, RenderMode};
pub use composer::{ComposedHttp, MockTab, StreamSource, ViewComposer, WsConnection, WsTab};
pub use error::{DashError, Result};
pub use model::{ExecutionFailure, HttpInfo, SessionKind, SimpleType};
pub use sessions::{SessionRegistry, TabSession};
pub use storage::{Artifact, DatedHistoryRoot, HistoryRoot, PersistedResponse, ResponsePersistence};
pub use stream::{StreamAppender, StreamMode, StreamSubscription};
