//! End-to-end tab scenarios against in-memory views

use bytes::Bytes;
use chrono::{DateTime, Local};
use httpdash::view::memory::{DocumentKind, MemoryViews};
use httpdash::view::{on_release, ViewFactory, ViewHandle};
use httpdash::{
    HistoryRoot, HttpInfo, PreviewHint, RenderMode, ResponsePersistence, SessionRegistry,
    SimpleType, StreamAppender, StreamSource, ViewComposer, WsConnection,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// History root without a date bucket
struct FlatRoot(PathBuf);

impl HistoryRoot for FlatRoot {
    fn resolve(&self, _now: &DateTime<Local>) -> PathBuf {
        self.0.clone()
    }
}

fn composer(root: &Path, views: &Arc<MemoryViews>) -> ViewComposer {
    ViewComposer::new(
        Arc::new(SessionRegistry::new()),
        Arc::new(ResponsePersistence::new(Arc::new(FlatRoot(
            root.to_path_buf(),
        )))),
        Arc::clone(views) as Arc<dyn ViewFactory>,
        tokio::runtime::Handle::current(),
    )
}

fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                found.extend(files_under(&path));
            } else {
                found.push(path);
            }
        }
    }
    found
}

#[derive(Default)]
struct FakeSocket {
    appender: Mutex<Option<StreamAppender>>,
}

impl FakeSocket {
    fn receive(&self, text: &str) -> bool {
        match self.appender.lock().unwrap().as_ref() {
            Some(appender) => appender.deliver(text),
            None => false,
        }
    }
}

impl StreamSource for FakeSocket {
    fn attach(&self, appender: StreamAppender) -> Arc<dyn ViewHandle> {
        *self.appender.lock().unwrap() = Some(appender);
        on_release(|| {})
    }
}

impl WsConnection for FakeSocket {
    fn send(&self, _text: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn failed_exchange_renders_only_error_view() {
    let dir = tempfile::tempdir().unwrap();
    let views = Arc::new(MemoryViews::new());
    let composer = composer(dir.path(), &views);

    let info = HttpInfo::failed(
        vec!["GET http://localhost:1/users HTTP/1.1\r\n".into()],
        anyhow::anyhow!("Connection refused (os error 111)"),
    );

    let composed = composer.compose_http("users", &info, false).unwrap();

    assert_eq!(composed.mode, RenderMode::Error);
    assert!(composed.persisted.is_none());

    let error = views.find("users/error.log").unwrap();
    assert!(error.content().contains("Connection refused (os error 111)"));
    assert!(views.find("users/response").is_none());
    assert!(views
        .of_kind(|k| matches!(k, DocumentKind::Preview { .. }))
        .is_empty());
    assert!(files_under(dir.path()).is_empty());
}

#[tokio::test]
async fn image_response_is_saved_and_previewed() {
    let dir = tempfile::tempdir().unwrap();
    let views = Arc::new(MemoryViews::new());
    let composer = composer(dir.path(), &views);

    let png = Bytes::from_static(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR");
    let info = HttpInfo::success(
        vec!["GET /logo.png HTTP/1.1\r\n".into()],
        vec!["HTTP/1.1 200 OK\r\n".into(), "Content-Type: image/png\r\n".into()],
        png.clone(),
        SimpleType::Image,
        "image/png",
    );

    let composed = composer.compose_http("logo", &info, false).unwrap();

    assert_eq!(composed.mode, RenderMode::Previewable(PreviewHint::Image));

    let files = files_under(dir.path());
    assert_eq!(files.len(), 1);
    let saved = files[0].canonicalize().unwrap();
    assert_eq!(saved.parent().unwrap(), dir.path().join("logo").canonicalize().unwrap());

    let name = saved.file_name().unwrap().to_string_lossy().into_owned();
    let stamp = name.strip_suffix(".png").unwrap();
    assert!(chrono::NaiveDateTime::parse_from_str(stamp, "%Y%m%dT%H%M%S").is_ok());
    assert_eq!(std::fs::read(&saved).unwrap(), png.to_vec());

    let response = views.find("logo/response").unwrap().content();
    assert!(response.contains(&saved.display().to_string()));

    let previews = views.of_kind(|k| matches!(k, DocumentKind::Preview { .. }));
    assert_eq!(previews.len(), 1);
    assert_eq!(
        previews[0].kind(),
        DocumentKind::Preview {
            hint: PreviewHint::Image,
            height: 160
        }
    );
}

#[tokio::test]
async fn websocket_log_follows_each_pong() {
    let dir = tempfile::tempdir().unwrap();
    let views = Arc::new(MemoryViews::new());
    let composer = composer(dir.path(), &views);
    let socket = Arc::new(FakeSocket::default());

    let tab = composer
        .compose_websocket("echo", Arc::clone(&socket) as Arc<dyn WsConnection>)
        .unwrap();

    assert!(socket.receive("pong"));
    assert!(socket.receive("pong"));
    tab.appender().settled().await;

    let state = views.find("echo/log").unwrap().state();
    let lines: Vec<&str> = state.content.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in &lines {
        assert!(line.ends_with(" - pong"), "unexpected line {:?}", line);
        let (stamp, _) = line.split_once(" - ").unwrap();
        let (seconds, millis) = stamp.split_once(',').unwrap();
        assert!(
            chrono::NaiveDateTime::parse_from_str(seconds, "%Y-%m-%d %H:%M:%S").is_ok(),
            "bad timestamp {:?}",
            stamp
        );
        assert_eq!(millis.len(), 3);
        assert!(millis.chars().all(|c| c.is_ascii_digit()));
    }
    assert!(lines[0] <= lines[1]);

    assert_eq!(state.scroll_log.len(), 2);
    for (cursor, len) in &state.scroll_log {
        assert_eq!(cursor, len);
    }
    assert!(state.is_following());
}

#[tokio::test]
async fn rerun_disposes_stream_before_new_session() {
    let dir = tempfile::tempdir().unwrap();
    let views = Arc::new(MemoryViews::new());
    let composer = composer(dir.path(), &views);
    let first = Arc::new(FakeSocket::default());

    composer
        .compose_websocket("echo", Arc::clone(&first) as Arc<dyn WsConnection>)
        .unwrap();
    let old_log = views.find("echo/log").unwrap();

    let second = Arc::new(FakeSocket::default());
    let tab = composer
        .compose_websocket("echo", Arc::clone(&second) as Arc<dyn WsConnection>)
        .unwrap();

    assert!(!first.receive("stale"));
    assert!(second.receive("fresh"));
    tab.appender().settled().await;

    assert_eq!(old_log.state().release_calls, 1);
    assert!(old_log.content().is_empty());
    assert!(views.find("echo/log").unwrap().content().ends_with(" - fresh\n"));
    assert_eq!(composer.registry().len(), 1);
}
