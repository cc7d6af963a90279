//! Process-wide table of live sessions.

use crate::session::Session;
use crate::types::SurfaceId;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

static GLOBAL: Lazy<Arc<Registry>> = Lazy::new(|| Arc::new(Registry::new()));

/// Live sessions keyed by the surface they render into.
///
/// At most one session exists per surface. Tags are not unique; a tag
/// lookup returns whichever matching session it finds first.
#[derive(Default)]
pub struct Registry {
    sessions: Mutex<HashMap<SurfaceId, Arc<Session>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry shared by every host in this process.
    pub fn global() -> &'static Arc<Registry> {
        &GLOBAL
    }

    /// Register `session`, returning any session it displaced.
    pub(crate) fn insert(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        self.sessions.lock().insert(session.id(), session)
    }

    /// Remove `session` if it is still the one registered for its surface.
    pub(crate) fn remove(&self, session: &Session) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get(&session.id()) {
            Some(existing) if std::ptr::eq(Arc::as_ptr(existing), session) => {
                sessions.remove(&session.id());
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: SurfaceId) -> Option<Arc<Session>> {
        self.sessions.lock().get(&id).cloned()
    }

    pub fn find_by_tag(&self, tag: &str) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .values()
            .find(|session| session.tag() == Some(tag))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
