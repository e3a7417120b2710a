//! Concurrent registry of active recording sessions.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use super::RecordingSession;
use crate::error::{CoreError, CoreResult};
use crate::utils::new_id;

/// Tracks all in-flight recording sessions, keyed by session id.
///
/// Backed by [`DashMap`] for lock-free concurrent access from the HTTP
/// handlers (begin/end) and the per-session encoder tasks.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<RecordingSession>>,
    max_concurrent: usize,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_concurrent,
        }
    }

    /// Creates and registers a new session in `Negotiating`, failing if the
    /// registry is already at capacity.
    pub fn begin(
        &self,
        principal_id: &str,
        division_id: &str,
        recordings_dir: &str,
        container_ext: &str,
    ) -> CoreResult<Arc<RecordingSession>> {
        if self.sessions.len() >= self.max_concurrent {
            return Err(CoreError::Internal(format!(
                "max concurrent sessions ({}) reached",
                self.max_concurrent
            )));
        }
        let id = new_id();
        let output_path = PathBuf::from(recordings_dir).join(format!("{id}.{container_ext}"));
        let session = Arc::new(RecordingSession::new(
            id.clone(),
            principal_id.to_string(),
            division_id.to_string(),
            output_path,
        ));
        self.sessions.insert(id, Arc::clone(&session));
        Ok(session)
    }

    /// Looks up a session by id. Knowing the id is the only capability
    /// required - there is no separate ownership check.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<RecordingSession>> {
        self.sessions.get(session_id).map(|e| Arc::clone(e.value()))
    }

    /// Removes a session from the registry entirely. Callers should mark it
    /// `Closed` first so any in-flight holders observe the terminal state.
    pub fn remove(&self, session_id: &str) -> Option<Arc<RecordingSession>> {
        self.sessions.remove(session_id).map(|(_, v)| v)
    }

    /// Ids of every session currently registered.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_registers_session_in_negotiating() {
        let registry = SessionRegistry::new(4);
        let session = registry.begin("teacher-1", "div-1", "/tmp", "mkv").unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&session.id).is_some());
        assert_eq!(session.division_id, "div-1");
        assert!(session
            .output_path
            .to_string_lossy()
            .ends_with(&format!("{}.mkv", session.id)));
    }

    #[test]
    fn begin_fails_at_capacity() {
        let registry = SessionRegistry::new(1);
        registry.begin("teacher-1", "div-1", "/tmp", "mkv").unwrap();
        assert!(registry.begin("teacher-1", "div-1", "/tmp", "mkv").is_err());
    }

    #[test]
    fn remove_drops_session_from_registry() {
        let registry = SessionRegistry::new(4);
        let session = registry.begin("teacher-1", "div-1", "/tmp", "mkv").unwrap();
        registry.remove(&session.id);
        assert!(registry.get(&session.id).is_none());
    }
}
