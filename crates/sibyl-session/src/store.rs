//! Session persistence: one JSON document per session, atomic overwrites,
//! and an in-memory arena of per-session locks.
//!
//! Layout under the data dir:
//!
//! ```text
//! {data_dir}/sessions/{id}.json    one document per session
//! {data_dir}/vars.json             global variable store
//! ```
//!
//! The arena hands out `Arc<tokio::sync::Mutex<Session>>` handles; holding
//! the mutex for the whole of a routing call is what serializes concurrent
//! turns against the same session. Saves go through a temp file and a
//! rename, so a crash mid-write never clobbers the previous document.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Result, SessionError};
use crate::types::{Session, SessionSummary};
use crate::variables::VariableStore;

/// Interactions kept per session before the oldest are pruned.
const DEFAULT_MAX_INTERACTIONS: usize = 50;

/// Owns every read and write of session state.
pub struct SessionStore {
    data_dir: PathBuf,
    max_interactions: usize,
    arena: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    /// Create a store rooted at `data_dir`. Nothing is touched on disk
    /// until a session is saved.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_interactions: DEFAULT_MAX_INTERACTIONS,
            arena: RwLock::new(HashMap::new()),
        }
    }

    /// Override the interaction cap applied on append.
    pub fn with_max_interactions(mut self, max: usize) -> Self {
        self.max_interactions = max;
        self
    }

    /// Root directory this store persists under.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{id}.json"))
    }

    fn globals_path(&self) -> PathBuf {
        self.data_dir.join("vars.json")
    }

    /// Check that an id maps 1:1 onto a file name.
    pub fn validate_id(id: &str) -> Result<()> {
        let ok = !id.is_empty()
            && id.len() <= 64
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if ok {
            Ok(())
        } else {
            Err(SessionError::InvalidId(id.to_string()))
        }
    }

    // ── Sessions ────────────────────────────────────────────────────────

    /// Get-or-create a session handle.
    ///
    /// The first touch loads the document from disk (or starts a fresh
    /// session); after that, every caller shares the same handle and its
    /// lock.
    pub fn open(&self, id: &str) -> Result<Arc<Mutex<Session>>> {
        Self::validate_id(id)?;

        if let Some(handle) = self.arena.read().get(id) {
            return Ok(Arc::clone(handle));
        }

        let loaded = self.load_from_disk(id)?;

        let mut arena = self.arena.write();
        let handle = arena
            .entry(id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(
                    loaded.unwrap_or_else(|| Session::new(id.to_string())),
                ))
            });
        Ok(Arc::clone(handle))
    }

    fn load_from_disk(&self, id: &str) -> Result<Option<Session>> {
        let path = self.session_path(id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SessionError::persistence(format!(
                    "read {}: {e}",
                    path.display()
                )));
            }
        };

        match serde_json::from_str(&raw) {
            Ok(session) => {
                debug!(session_id = %id, "Loaded session from disk");
                Ok(Some(session))
            }
            Err(e) => {
                // A mangled document should not brick the session id; start
                // fresh and let the next save replace it.
                warn!(session_id = %id, error = %e, "Session file is corrupt, starting fresh");
                Ok(None)
            }
        }
    }

    /// Append an interaction and enforce the interaction cap.
    ///
    /// Entities and variables are never dropped by the cap; only the oldest
    /// interactions fall off.
    pub fn append(&self, session: &mut Session, interaction: crate::types::Interaction) {
        session.last_sequence = interaction.sequence;
        session.interactions.push(interaction);
        session.touch();

        if self.max_interactions > 0 {
            let max = self.max_interactions;
            Self::prune(session, max);
        }
    }

    /// Keep only the `max` most recent interactions.
    pub fn prune(session: &mut Session, max: usize) {
        let len = session.interactions.len();
        if len > max {
            session.interactions.drain(0..len - max);
        }
    }

    /// Write the session document, replacing any previous version atomically.
    ///
    /// On failure the in-memory session is untouched, so the caller can fix
    /// the underlying problem and save again without losing the turn.
    pub fn save(&self, session: &Session) -> Result<()> {
        let dir = self.sessions_dir();
        fs::create_dir_all(&dir)
            .map_err(|e| SessionError::persistence(format!("create {}: {e}", dir.display())))?;

        let json = serde_json::to_string_pretty(session)?;
        let path = self.session_path(&session.id);
        write_atomic(&path, &json)?;

        debug!(
            session_id = %session.id,
            interactions = session.interactions.len(),
            "Saved session"
        );
        Ok(())
    }

    /// Summaries of every persisted session, most recently active first.
    ///
    /// Files that fail to parse are skipped with a warning so one bad
    /// document cannot hide the rest.
    pub fn list(&self) -> Result<Vec<SessionSummary>> {
        let dir = self.sessions_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SessionError::persistence(format!(
                    "read {}: {e}",
                    dir.display()
                )));
            }
        };

        let mut summaries = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path).ok().and_then(|raw| {
                serde_json::from_str::<Session>(&raw).ok()
            }) {
                Some(session) => summaries.push(SessionSummary {
                    id: session.id,
                    created_at: session.created_at,
                    last_active: session.last_active,
                    interactions: session.interactions.len(),
                }),
                None => warn!(path = %path.display(), "Skipping unreadable session file"),
            }
        }

        summaries.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        Ok(summaries)
    }

    /// Delete a session from disk and the arena. Missing sessions are a
    /// no-op; returns whether anything was removed.
    pub fn clear(&self, id: &str) -> Result<bool> {
        Self::validate_id(id)?;

        let in_arena = self.arena.write().remove(id).is_some();

        match fs::remove_file(self.session_path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(in_arena),
            Err(e) => Err(SessionError::persistence(format!(
                "remove session {id}: {e}"
            ))),
        }
    }

    /// Sweep sessions whose last activity is older than `days` days.
    /// Returns how many were removed.
    pub fn clear_older_than(&self, days: u64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(days as i64);
        let mut removed = 0;

        for summary in self.list()? {
            if summary.last_active < cutoff && self.clear(&summary.id)? {
                removed += 1;
            }
        }

        debug!(removed, days, "Swept stale sessions");
        Ok(removed)
    }

    // ── Global Variables ────────────────────────────────────────────────

    /// Load the global variable store; missing or corrupt files start empty.
    pub fn load_globals(&self) -> Result<VariableStore> {
        let path = self.globals_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(VariableStore::new());
            }
            Err(e) => {
                return Err(SessionError::persistence(format!(
                    "read {}: {e}",
                    path.display()
                )));
            }
        };

        match serde_json::from_str(&raw) {
            Ok(vars) => Ok(vars),
            Err(e) => {
                warn!(error = %e, "Variable file is corrupt, starting empty");
                Ok(VariableStore::new())
            }
        }
    }

    /// Persist the global variable store atomically.
    pub fn save_globals(&self, vars: &VariableStore) -> Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            SessionError::persistence(format!("create {}: {e}", self.data_dir.display()))
        })?;

        let json = serde_json::to_string_pretty(vars)?;
        write_atomic(&self.globals_path(), &json)
    }
}

/// Write `contents` to `path` through a sibling temp file and a rename.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");

    let mut file = File::create(&tmp)
        .map_err(|e| SessionError::persistence(format!("create {}: {e}", tmp.display())))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| SessionError::persistence(format!("write {}: {e}", tmp.display())))?;
    file.sync_all()
        .map_err(|e| SessionError::persistence(format!("sync {}: {e}", tmp.display())))?;

    fs::rename(&tmp, path).map_err(|e| {
        SessionError::persistence(format!("rename {} -> {}: {e}", tmp.display(), path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentKind, Entity, EntityKind, Interaction, InteractionOutcome};

    fn temp_store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        (dir, store)
    }

    fn interaction(sequence: u64, query: &str) -> Interaction {
        Interaction {
            sequence,
            query: query.to_string(),
            resolved_query: query.to_string(),
            agent: AgentKind::Conversation,
            response: format!("response {sequence}"),
            timestamp: Utc::now(),
            confidence: 0.8,
            outcome: InteractionOutcome::Completed,
            warnings: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_open_creates_fresh_session() {
        let (_dir, store) = temp_store();
        let handle = store.open("s1").unwrap();
        let session = handle.lock().await;

        assert_eq!(session.id, "s1");
        assert!(session.interactions.is_empty());
    }

    #[tokio::test]
    async fn test_open_returns_shared_handle() {
        let (_dir, store) = temp_store();
        let a = store.open("s1").unwrap();
        let b = store.open("s1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_invalid_ids_rejected() {
        assert!(matches!(
            SessionStore::validate_id("../evil"),
            Err(SessionError::InvalidId(_))
        ));
        assert!(SessionStore::validate_id("a/b").is_err());
        assert!(SessionStore::validate_id("").is_err());
        assert!(SessionStore::validate_id("work-2026.08").is_ok());
    }

    #[tokio::test]
    async fn test_append_save_load_round_trip() {
        let (dir, store) = temp_store();

        {
            let handle = store.open("rt").unwrap();
            let mut session = handle.lock().await;
            session.variables.set("k", "v").unwrap();
            session
                .entities
                .push(Entity::new(EntityKind::FilePath, "/tmp/a.py", 1));
            store.append(&mut session, interaction(1, "hello"));
            store.save(&session).unwrap();
        }

        // A second store instance sees exactly what was written.
        let reopened = SessionStore::new(dir.path());
        let handle = reopened.open("rt").unwrap();
        let session = handle.lock().await;

        assert_eq!(session.interactions.len(), 1);
        assert_eq!(session.interactions[0].query, "hello");
        assert_eq!(session.variables.get("k"), Some("v"));
        assert_eq!(session.entities[0].value, "/tmp/a.py");
        assert_eq!(session.last_sequence, 1);
    }

    #[tokio::test]
    async fn test_save_is_idempotent_and_leaves_no_temp_file() {
        let (dir, store) = temp_store();
        let handle = store.open("idem").unwrap();
        let session = handle.lock().await;

        store.save(&session).unwrap();
        let path = dir.path().join("sessions").join("idem.json");
        let first = fs::read(&path).unwrap();

        store.save(&session).unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(first, second);
        assert!(!dir.path().join("sessions").join("idem.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_prune_keeps_recent_interactions_and_all_state() {
        let (_dir, store) = temp_store();
        let handle = store.open("prune").unwrap();
        let mut session = handle.lock().await;

        session.variables.set("keep", "me").unwrap();
        session
            .entities
            .push(Entity::new(EntityKind::Repository, "github.com/a/b", 1));
        for seq in 1..=5 {
            store.append(&mut session, interaction(seq, &format!("q{seq}")));
        }

        SessionStore::prune(&mut session, 2);

        assert_eq!(session.interactions.len(), 2);
        assert_eq!(session.interactions[0].sequence, 4);
        assert_eq!(session.interactions[1].sequence, 5);
        assert_eq!(session.variables.get("keep"), Some("me"));
        assert_eq!(session.entities.len(), 1);
        assert_eq!(session.next_sequence(), 6);
    }

    #[tokio::test]
    async fn test_append_enforces_cap() {
        let (_dir, store) = temp_store();
        let store = store.with_max_interactions(3);
        let handle = store.open("cap").unwrap();
        let mut session = handle.lock().await;

        for seq in 1..=10 {
            store.append(&mut session, interaction(seq, "q"));
        }

        assert_eq!(session.interactions.len(), 3);
        assert_eq!(session.interactions[0].sequence, 8);
    }

    #[tokio::test]
    async fn test_list_sorted_most_recent_first() {
        let (_dir, store) = temp_store();

        for id in ["old", "new"] {
            let handle = store.open(id).unwrap();
            let mut session = handle.lock().await;
            session.last_active = if id == "old" {
                Utc::now() - Duration::days(3)
            } else {
                Utc::now()
            };
            store.save(&session).unwrap();
        }

        let summaries = store.list().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, "new");
        assert_eq!(summaries[1].id, "old");
    }

    #[tokio::test]
    async fn test_list_skips_unreadable_files() {
        let (dir, store) = temp_store();
        {
            let handle = store.open("good").unwrap();
            let session = handle.lock().await;
            store.save(&session).unwrap();
        }
        fs::write(dir.path().join("sessions").join("bad.json"), "{nope").unwrap();

        let summaries = store.list().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, "good");
    }

    #[tokio::test]
    async fn test_clear_removes_session() {
        let (_dir, store) = temp_store();
        {
            let handle = store.open("gone").unwrap();
            let session = handle.lock().await;
            store.save(&session).unwrap();
        }

        assert!(store.clear("gone").unwrap());
        assert!(store.list().unwrap().is_empty());

        // Cleared from the arena too: reopening starts fresh.
        let handle = store.open("gone").unwrap();
        assert_eq!(handle.lock().await.interactions.len(), 0);
    }

    #[test]
    fn test_clear_missing_session_is_noop() {
        let (_dir, store) = temp_store();
        assert!(!store.clear("never-existed").unwrap());
    }

    #[tokio::test]
    async fn test_clear_older_than_sweeps_stale_sessions() {
        let (_dir, store) = temp_store();

        for (id, age_days) in [("stale", 10), ("fresh", 1)] {
            let handle = store.open(id).unwrap();
            let mut session = handle.lock().await;
            session.last_active = Utc::now() - Duration::days(age_days);
            store.save(&session).unwrap();
        }

        let removed = store.clear_older_than(7).unwrap();
        assert_eq!(removed, 1);

        let remaining = store.list().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "fresh");
    }

    #[tokio::test]
    async fn test_corrupt_session_file_starts_fresh() {
        let (dir, store) = temp_store();
        let sessions = dir.path().join("sessions");
        fs::create_dir_all(&sessions).unwrap();
        fs::write(sessions.join("hurt.json"), "not json at all").unwrap();

        let handle = store.open("hurt").unwrap();
        let session = handle.lock().await;
        assert!(session.interactions.is_empty());
    }

    #[test]
    fn test_globals_round_trip() {
        let (_dir, store) = temp_store();

        let mut vars = store.load_globals().unwrap();
        assert!(vars.is_empty());

        vars.set("project_path", "/code/sibyl").unwrap();
        store.save_globals(&vars).unwrap();

        let loaded = store.load_globals().unwrap();
        assert_eq!(loaded.get("project_path"), Some("/code/sibyl"));
    }
}
