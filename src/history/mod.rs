mod export;
mod query;

pub use export::SessionExport;
pub use query::{ SessionFilter, DEFAULT_RECENT };

use crate::models::chat::{ now_millis, Role, Session, SessionUpdate, Message };
use crate::models::event::StoreEvent;
use crate::storage::{ KeyValueStore, SESSIONS_KEY };
use log::{ debug, info, warn };
use std::collections::HashSet;
use std::path::{ Path, PathBuf };
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{ broadcast, Mutex };

pub const TITLE_MAX_CHARS: usize = 40;
pub const DEFAULT_TITLE: &str = "New Chat";
const FUZZY_TITLE_THRESHOLD: f64 = 0.85;
const EVENT_CAPACITY: usize = 256;

pub type SharedSessionStore = Arc<Mutex<SessionStore>>;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("malformed session document: {0}")] Malformed(#[from] serde_json::Error),

    #[error("failed to write export: {0}")] Export(#[from] std::io::Error),
}

/// Title for a transcript: the first user message, cut to a flat character
/// count with an ellipsis marker.
pub fn derive_title(messages: &[Message]) -> String {
    let first = messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.trim())
        .find(|c| !c.is_empty());

    match first {
        Some(content) => {
            let mut chars = content.chars();
            let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
            if chars.next().is_some() {
                format!("{}...", head)
            } else {
                head
            }
        }
        None => DEFAULT_TITLE.to_string(),
    }
}

/// The system of record for chat sessions. Every mutation is written through
/// to durable storage on a best-effort basis and announced to subscribers.
pub struct SessionStore {
    sessions: Vec<Session>,
    storage: Arc<dyn KeyValueStore>,
    events: broadcast::Sender<StoreEvent>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sessions: Vec::new(),
            storage,
            events,
        }
    }

    /// Reads the persisted collection, falling back to an empty one when the
    /// entry is absent or unreadable.
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let mut store = Self::new(storage);
        let raw = match store.storage.get(SESSIONS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                info!("No saved sessions found, starting with an empty history");
                return store;
            }
            Err(e) => {
                warn!("Failed to read saved sessions, starting empty: {}", e);
                return store;
            }
        };

        match serde_json::from_str::<Vec<Session>>(&raw) {
            Ok(sessions) => {
                store.sessions = dedupe(sessions);
                let stale = clear_stale_streaming(&mut store.sessions);
                if stale > 0 {
                    warn!("Cleared {} message(s) left streaming by a previous run", stale);
                }
                info!("Loaded {} saved sessions", store.sessions.len());
            }
            Err(e) => {
                warn!("Saved sessions are corrupted, starting empty: {}", e);
            }
        }
        store
    }

    pub fn into_shared(self) -> SharedSessionStore {
        Arc::new(Mutex::new(self))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Sessions in storage order (most recently created first).
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Reconciles a transcript into the collection. Returns false when the
    /// transcript is empty, since empty sessions are never persisted.
    pub fn upsert(&mut self, update: SessionUpdate) -> bool {
        if update.messages.is_empty() {
            return false;
        }

        let now = now_millis();
        let created = match self.sessions.iter_mut().find(|s| s.id == update.id) {
            Some(existing) => {
                if !existing.user_defined_title {
                    existing.title = derive_title(&update.messages);
                }
                existing.messages = update.messages;
                existing.updated_at = now;
                false
            }
            None => {
                let session = Session {
                    title: derive_title(&update.messages),
                    id: update.id.clone(),
                    messages: update.messages,
                    updated_at: now,
                    model_id: update.model_id,
                    is_pinned: false,
                    user_defined_title: false,
                };
                debug!("Creating session {} '{}'", session.id, session.title);
                self.sessions.insert(0, session);
                true
            }
        };

        self.persist();
        self.publish(StoreEvent::Upserted { id: update.id, created });
        true
    }

    /// Gives a session a user-chosen title, which permanently disables
    /// automatic retitling for it.
    pub fn rename(&mut self, id: &str, new_title: &str) -> bool {
        let title = new_title.trim();
        let Some(session) = self.sessions.iter_mut().find(|s| s.id == id) else {
            return false;
        };
        session.title = title.to_string();
        session.user_defined_title = true;
        session.updated_at = now_millis();

        self.persist();
        self.publish(StoreEvent::Renamed { id: id.to_string(), title: title.to_string() });
        true
    }

    pub fn toggle_pin(&mut self, id: &str) -> bool {
        let Some(session) = self.sessions.iter_mut().find(|s| s.id == id) else {
            return false;
        };
        session.is_pinned = !session.is_pinned;
        let pinned = session.is_pinned;

        self.persist();
        self.publish(StoreEvent::PinToggled { id: id.to_string(), pinned });
        true
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        if self.sessions.len() == before {
            return false;
        }

        self.persist();
        self.publish(StoreEvent::Deleted { id: id.to_string() });
        true
    }

    /// Drops every session along with the persisted entry.
    pub fn clear(&mut self) {
        self.sessions.clear();
        if let Err(e) = self.storage.remove(SESSIONS_KEY) {
            warn!("Failed to remove saved sessions: {}", e);
        }
        self.publish(StoreEvent::Cleared);
    }

    pub fn list(&self, filter: SessionFilter, search: Option<&str>) -> Vec<&Session> {
        query::select(&self.sessions, filter, search)
    }

    /// Resolves a user-typed reference: an exact id first, then the closest
    /// title by Jaro-Winkler similarity.
    pub fn find_by_title(&self, query: &str) -> Option<&Session> {
        let query = query.trim();
        if let Some(session) = self.get(query) {
            return Some(session);
        }

        let needle = query.to_lowercase();
        self.sessions
            .iter()
            .map(|s| (s, strsim::jaro_winkler(&needle, &s.title.to_lowercase())))
            .filter(|(_, score)| *score >= FUZZY_TITLE_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(s, _)| s)
    }

    pub fn export(&self) -> Result<SessionExport, HistoryError> {
        SessionExport::build(&self.sessions)
    }

    /// Writes today's backup into `dir` and returns its path.
    pub fn export_to_dir(&self, dir: &Path) -> Result<PathBuf, HistoryError> {
        self.export()?.write_to_dir(dir)
    }

    /// Replaces the whole collection with an exported document. Nothing is
    /// merged; a malformed document leaves the store untouched.
    pub fn restore(&mut self, document: &str) -> Result<usize, HistoryError> {
        let sessions: Vec<Session> = serde_json::from_str(document)?;
        self.sessions = dedupe(sessions);
        clear_stale_streaming(&mut self.sessions);
        let count = self.sessions.len();

        self.persist();
        self.publish(StoreEvent::Restored { count });
        Ok(count)
    }

    pub fn footprint_bytes(&self) -> usize {
        serde_json::to_vec(&self.sessions).map(|v| v.len()).unwrap_or(0)
    }

    fn persist(&self) {
        let json = match serde_json::to_string(&self.sessions) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize sessions: {}", e);
                return;
            }
        };
        if let Err(e) = self.storage.set(SESSIONS_KEY, &json) {
            warn!("Failed to persist {} sessions: {}", self.sessions.len(), e);
        }
    }

    fn publish(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }
}

/// Nothing can be streaming right after startup.
fn clear_stale_streaming(sessions: &mut [Session]) -> usize {
    let mut cleared = 0;
    for msg in sessions.iter_mut().flat_map(|s| s.messages.iter_mut()) {
        if msg.is_streaming {
            msg.is_streaming = false;
            cleared += 1;
        }
    }
    cleared
}

fn dedupe(sessions: Vec<Session>) -> Vec<Session> {
    let mut seen = HashSet::new();
    sessions
        .into_iter()
        .filter(|s| seen.insert(s.id.clone()))
        .collect()
}
