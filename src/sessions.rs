// Tab session tracking
//
// Every tab name maps to at most one live `TabSession`. Running a tab again
// supersedes the previous session: its views are released and its stream
// subscription closed before the replacement becomes visible. One mutex
// spans that whole dispose-then-install step so concurrent runs of the same
// tab cannot interleave.
//
// The registry is an explicit value owned by the host and shared by handle.

use crate::error::{DashError, Result};
use crate::model::SessionKind;
use crate::stream::StreamSubscription;
use crate::view::ViewHandle;
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Identity of one run of a tab
///
/// Distinguishes a superseded session from its replacement under the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tab Session
// ─────────────────────────────────────────────────────────────────────────────

/// Resources owned by one run of a tab
pub struct TabSession {
    id: SessionId,
    name: String,
    kind: SessionKind,
    started: DateTime<Local>,
    resources: Vec<Arc<dyn ViewHandle>>,
    subscription: Option<StreamSubscription>,
    disposed: bool,
}

impl std::fmt::Debug for TabSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabSession")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("resources", &self.resources.len())
            .field("streaming", &self.subscription.is_some())
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl TabSession {
    fn new(id: SessionId, name: &str, kind: SessionKind) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            started: Local::now(),
            resources: Vec::new(),
            subscription: None,
            disposed: false,
        }
    }

    /// Release everything this session owns
    ///
    /// Each resource is released once; calling this again does nothing.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if let Some(subscription) = self.subscription.take() {
            subscription.release();
        }
        for resource in self.resources.drain(..) {
            resource.release();
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn started(&self) -> DateTime<Local> {
        self.started
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn is_streaming(&self) -> bool {
        self.subscription.is_some()
    }
}

impl Drop for TabSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct RegistryState {
    sessions: HashMap<String, TabSession>,
    next_id: u64,
}

/// Snapshot of a session returned by `acquire`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub name: String,
    pub kind: SessionKind,
}

/// Process-wide tab name -> session map
#[derive(Debug, Default)]
pub struct SessionRegistry {
    state: Mutex<RegistryState>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session for `name`, disposing any previous one first
    pub fn acquire(&self, name: &str, kind: SessionKind) -> SessionInfo {
        let mut state = self.lock();

        if let Some(mut old) = state.sessions.remove(name) {
            tracing::debug!(
                tab = %name,
                old_session = %old.id,
                old_kind = %old.kind,
                new_kind = %kind,
                "Superseding tab session"
            );
            old.dispose();
        }

        state.next_id += 1;
        let id = SessionId(state.next_id);
        state
            .sessions
            .insert(name.to_string(), TabSession::new(id, name, kind));

        SessionInfo {
            id,
            name: name.to_string(),
            kind,
        }
    }

    /// Close a tab; returns whether a session existed
    pub fn release(&self, name: &str) -> bool {
        let mut state = self.lock();

        match state.sessions.remove(name) {
            Some(mut session) => {
                tracing::debug!(
                    tab = %name,
                    session = %session.id,
                    kind = %session.kind,
                    "Releasing tab session"
                );
                session.dispose();
                true
            }
            None => false,
        }
    }

    /// Hand ownership of a view resource to the live session `id`
    ///
    /// If that session is no longer live the resource is released at once.
    pub fn attach(&self, id: SessionId, resource: Arc<dyn ViewHandle>) -> Result<()> {
        let mut state = self.lock();

        match live_session(&mut state, id) {
            Some(session) => {
                session.resources.push(resource);
                Ok(())
            }
            None => {
                drop(state);
                tracing::debug!(session = %id, "Session gone, releasing late resource");
                resource.release();
                Err(DashError::UnknownTab(id.to_string()))
            }
        }
    }

    /// Give the live session `id` its stream subscription
    ///
    /// A subscription arriving for a superseded session is closed immediately.
    pub fn bind_stream(&self, id: SessionId, subscription: StreamSubscription) -> Result<()> {
        let mut state = self.lock();

        match live_session(&mut state, id) {
            Some(session) => {
                if let Some(previous) = session.subscription.replace(subscription) {
                    previous.release();
                }
                Ok(())
            }
            None => {
                drop(state);
                tracing::debug!(session = %id, "Session gone, closing late stream");
                subscription.release();
                Err(DashError::UnknownTab(id.to_string()))
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().sessions.contains_key(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<SessionKind> {
        self.lock().sessions.get(name).map(|s| s.kind)
    }

    pub fn session_id(&self, name: &str) -> Option<SessionId> {
        self.lock().sessions.get(name).map(|s| s.id)
    }

    pub fn resource_count(&self, name: &str) -> Option<usize> {
        self.lock().sessions.get(name).map(|s| s.resource_count())
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }

    /// Live tab names, sorted
    pub fn tab_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().sessions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Dispose every session (process shutdown)
    pub fn release_all(&self) -> usize {
        let mut state = self.lock();
        let count = state.sessions.len();

        for (_, mut session) in state.sessions.drain() {
            session.dispose();
        }
        if count > 0 {
            tracing::debug!(count, "Released all tab sessions");
        }
        count
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn live_session(state: &mut RegistryState, id: SessionId) -> Option<&mut TabSession> {
    state.sessions.values_mut().find(|s| s.id == id)
}
