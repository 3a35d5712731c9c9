//! Server-side session registry.
//!
//! A bearer token proves identity; the registry decides whether the session
//! behind it is still open. Sessions are persisted through a [`SessionStore`]
//! so a restart restores them, and a missing or unreadable store simply
//! starts the registry empty.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use uuid::Uuid;

use herdbook_core::{Classify, ErrorKind, FarmId, UserId};

use crate::JwtClaims;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub farm_id: FarmId,
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.ended_at.is_none() && now < self.expires_at
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session store is corrupt: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("session has ended")]
    Ended,

    #[error("unknown session")]
    Unknown,

    #[error("session belongs to another user or farm")]
    Mismatch,

    #[error("session registry lock poisoned")]
    Poisoned,
}

impl Classify for SessionError {
    fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Ended | SessionError::Unknown | SessionError::Mismatch => {
                ErrorKind::Authorization
            }
            SessionError::Io(_) | SessionError::Serde(_) | SessionError::Poisoned => {
                ErrorKind::Remote
            }
        }
    }
}

/// Persistence for the registry's session list.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Vec<Session>, SessionError>;
    fn save(&self, sessions: &[Session]) -> Result<(), SessionError>;
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<Vec<Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self) -> Result<Vec<Session>, SessionError> {
        let guard = self.sessions.lock().map_err(|_| SessionError::Poisoned)?;
        Ok(guard.clone())
    }

    fn save(&self, sessions: &[Session]) -> Result<(), SessionError> {
        let mut guard = self.sessions.lock().map_err(|_| SessionError::Poisoned)?;
        *guard = sessions.to_vec();
        Ok(())
    }
}

/// JSON file on local disk. Each write goes to its own temp file in the same
/// directory and is renamed into place, so readers never see a partial file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Vec<Session>, SessionError> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, sessions: &[Session]) -> Result<(), SessionError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, sessions)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Open and recently-ended sessions, keyed by session id.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Session>>,
    store: Box<dyn SessionStore>,
    /// Held across snapshot and save, so saves reach the store in the order
    /// their snapshots were taken.
    save_lock: Mutex<()>,
}

impl core::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let count = self.sessions.read().map(|s| s.len()).unwrap_or_default();
        f.debug_struct("SessionRegistry")
            .field("sessions", &count)
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Restore from `store`; an unreadable store yields an empty registry.
    pub fn restore(store: impl SessionStore + 'static) -> Self {
        let sessions = match store.load() {
            Ok(list) => list.into_iter().map(|s| (s.session_id, s)).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "session store unreadable; starting with no sessions");
                HashMap::new()
            }
        };
        tracing::debug!(restored = sessions.len(), "session registry ready");
        Self {
            sessions: RwLock::new(sessions),
            store: Box::new(store),
            save_lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::restore(InMemorySessionStore::new())
    }

    /// Record activity for the session named in `claims`, opening it on first
    /// sight. Fails once the session was ended.
    pub fn touch(&self, claims: &JwtClaims, now: DateTime<Utc>) -> Result<Session, SessionError> {
        let (session, opened) = {
            let mut guard = self.sessions.write().map_err(|_| SessionError::Poisoned)?;
            let opened = !guard.contains_key(&claims.sid);
            let entry = guard.entry(claims.sid).or_insert_with(|| Session {
                session_id: claims.sid,
                farm_id: claims.farm_id,
                user_id: claims.sub,
                started_at: now,
                last_seen_at: now,
                expires_at: claims.expires_at,
                ended_at: None,
            });

            if entry.user_id != claims.sub || entry.farm_id != claims.farm_id {
                return Err(SessionError::Mismatch);
            }
            if entry.ended_at.is_some() {
                return Err(SessionError::Ended);
            }
            entry.last_seen_at = now;
            (entry.clone(), opened)
        };

        // Only the first sighting needs to reach disk. A session that could
        // not be stored is not kept either.
        if opened {
            if let Err(e) = self.persist() {
                if let Ok(mut guard) = self.sessions.write() {
                    guard.remove(&claims.sid);
                }
                return Err(e);
            }
        }
        Ok(session)
    }

    /// End a session. Later requests carrying its token are refused.
    pub fn end(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<Session, SessionError> {
        let session = {
            let mut guard = self.sessions.write().map_err(|_| SessionError::Poisoned)?;
            let entry = guard.get_mut(&session_id).ok_or(SessionError::Unknown)?;
            if entry.ended_at.is_some() {
                return Err(SessionError::Ended);
            }
            entry.ended_at = Some(now);
            entry.clone()
        };
        self.persist()?;
        tracing::info!(session_id = %session_id, user_id = %session.user_id, "session ended");
        Ok(session)
    }

    /// End every open session of `user_id` (used when an account is
    /// deactivated or deleted).
    pub fn end_all_for(&self, user_id: UserId, now: DateTime<Utc>) -> Result<usize, SessionError> {
        let ended = {
            let mut guard = self.sessions.write().map_err(|_| SessionError::Poisoned)?;
            let mut ended = 0;
            for s in guard.values_mut() {
                if s.user_id == user_id && s.ended_at.is_none() {
                    s.ended_at = Some(now);
                    ended += 1;
                }
            }
            ended
        };
        if ended > 0 {
            self.persist()?;
        }
        Ok(ended)
    }

    pub fn get(&self, session_id: Uuid) -> Option<Session> {
        self.sessions.read().ok()?.get(&session_id).cloned()
    }

    /// Drop sessions whose token has expired. Returns how many went.
    pub fn prune(&self, now: DateTime<Utc>) -> Result<usize, SessionError> {
        let removed = {
            let mut guard = self.sessions.write().map_err(|_| SessionError::Poisoned)?;
            let before = guard.len();
            guard.retain(|_, s| now < s.expires_at);
            before - guard.len()
        };
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    fn persist(&self) -> Result<(), SessionError> {
        let _save = self.save_lock.lock().map_err(|_| SessionError::Poisoned)?;
        let snapshot: Vec<Session> = {
            let guard = self.sessions.read().map_err(|_| SessionError::Poisoned)?;
            let mut list: Vec<Session> = guard.values().cloned().collect();
            list.sort_by_key(|s| s.started_at);
            list
        };
        self.store.save(&snapshot)
    }
}
