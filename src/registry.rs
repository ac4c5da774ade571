//! Session registry: the one process-wide collection of sessions, and the
//! single mutex guarding it.
//!
//! Discipline enforced by every method here: registry methods only ever
//! touch in-memory fields (`HashMap` bookkeeping, `VecDeque` pushes,
//! `Instant` comparisons). They never perform a blocking syscall - spawning
//! a backend happens in `crate::gateway` *before* the lock is taken, and
//! the resulting handle is simply moved in. Workers and the dispatcher
//! lock the registry just long enough to read or mutate a session's
//! queues, then drop the guard before touching a pipe or socket. See
//! `crate::workers` and `crate::http::dispatcher` for where the syscalls
//! actually happen.

use std::collections::HashMap;

use uuid::Uuid;

use crate::child::BackendHandle;
use crate::session::{Session, SessionStatus};

const TOKEN_PREFIX: &str = "SESSION_";
const TOKEN_COLLISION_RETRIES: usize = 8;

pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_sessions,
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn has_capacity(&self) -> bool {
        self.sessions.len() < self.max_sessions
    }

    pub fn has_idle(&self) -> bool {
        self.sessions.values().any(|s| s.is_idle)
    }

    pub fn lookup(&mut self, token: &str) -> Option<&mut Session> {
        self.sessions.get_mut(token)
    }

    pub fn for_each<F: FnMut(&mut Session)>(&mut self, mut f: F) {
        for session in self.sessions.values_mut() {
            f(session);
        }
    }

    pub fn remove(&mut self, token: &str) -> Option<Session> {
        self.sessions.remove(token)
    }

    pub fn tokens(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    /// Inserts an already-spawned backend as a new, non-idle session. On
    /// failure (registry at capacity, or a token could not be minted) the
    /// handle is handed back so the caller can kill it.
    pub fn create_with_handle(&mut self, backend: BackendHandle) -> Result<String, BackendHandle> {
        if self.sessions.len() >= self.max_sessions {
            return Err(backend);
        }
        let Some(token) = self.fresh_token() else {
            return Err(backend);
        };
        let mut session = Session::new(token.clone(), backend);
        session.status = SessionStatus::Normal;
        session.touch();
        session.is_idle = false;
        self.sessions.insert(token.clone(), session);
        Ok(token)
    }

    /// Inserts an already-spawned backend as a pre-warmed idle session.
    pub fn insert_idle(&mut self, backend: BackendHandle) -> Result<String, BackendHandle> {
        if self.sessions.len() >= self.max_sessions || self.has_idle() {
            return Err(backend);
        }
        let Some(token) = self.fresh_token() else {
            return Err(backend);
        };
        let mut session = Session::new(token.clone(), backend);
        session.status = SessionStatus::Normal;
        session.is_idle = true;
        self.sessions.insert(token.clone(), session);
        Ok(token)
    }

    /// Claims a pre-warmed idle session for immediate use, if one exists.
    pub fn claim_idle(&mut self) -> Option<String> {
        let token = self
            .sessions
            .iter()
            .find(|(_, s)| s.is_idle && s.status == SessionStatus::Normal)
            .map(|(token, _)| token.clone())?;
        if let Some(session) = self.sessions.get_mut(&token) {
            session.touch();
        }
        Some(token)
    }

    fn fresh_token(&self) -> Option<String> {
        for _ in 0..TOKEN_COLLISION_RETRIES {
            let candidate = format!("{TOKEN_PREFIX}{}", Uuid::new_v4().simple());
            if !self.sessions.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fake_handle() -> Option<BackendHandle> {
        // `true` always exits 0 immediately after printing nothing, which is
        // enough to exercise registry bookkeeping without a real backend -
        // these tests only cover paths that never reach the handshake.
        None::<BackendHandle>.or_else(|| {
            crate::child::spawn_backend("true", &[], Duration::from_millis(1)).ok()
        })
    }

    #[test]
    fn lookup_of_unknown_token_is_none() {
        let mut registry = SessionRegistry::new(4);
        assert!(registry.lookup("SESSION_nonexistent").is_none());
    }

    #[test]
    fn claim_idle_with_no_sessions_is_none() {
        let mut registry = SessionRegistry::new(4);
        assert!(registry.claim_idle().is_none());
    }

    #[test]
    fn capacity_is_enforced_and_handle_is_returned() {
        let mut registry = SessionRegistry::new(0);
        if let Some(handle) = fake_handle() {
            let result = registry.create_with_handle(handle);
            assert!(result.is_err());
            assert_eq!(registry.count(), 0);
        }
    }
}
