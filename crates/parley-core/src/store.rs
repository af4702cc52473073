// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The session store: sole owner and writer of the session collection and
//! the active-session pointer.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{derive_title, ChatEvent, Message, Session, SessionId, SessionMap, SessionPersistence};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
}

/// One row of the session list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub title: String,
    pub message_count: usize,
    pub active: bool,
}

pub struct SessionStore {
    sessions: SessionMap,
    active: Option<SessionId>,
    /// Highest identifier ever issued, so ids stay strictly increasing even
    /// when the clock stalls or the newest session was deleted.
    last_id: u64,
    persistence: Arc<dyn SessionPersistence>,
    events: Option<mpsc::UnboundedSender<ChatEvent>>,
    /// Set when the stored collection could not be read and is still in
    /// place; saving would replace it.
    saving_blocked: bool,
}

impl SessionStore {
    /// An empty store with no active session.  Call [`open`](Self::open)
    /// to load the stored collection.
    pub fn new(persistence: Arc<dyn SessionPersistence>) -> Self {
        Self {
            sessions: SessionMap::new(),
            active: None,
            last_id: 0,
            persistence,
            events: None,
            saving_blocked: false,
        }
    }

    /// Route title changes and persistence notices to `tx`.
    pub fn set_event_sender(&mut self, tx: mpsc::UnboundedSender<ChatEvent>) {
        self.events = Some(tx);
    }

    /// Load the stored collection and activate the newest session, creating
    /// one when nothing was stored.  A failed load is reported and the store
    /// continues with an empty collection; see [`load`](Self::load).
    pub async fn open(&mut self) {
        self.load().await;
        match self.sessions.keys().next_back().copied() {
            Some(newest) => self.active = Some(newest),
            None => {
                self.create_session().await;
            }
        }
    }

    /// Replace the in-memory collection with the stored one.
    ///
    /// When the stored collection cannot be read and was not moved out of
    /// the way, saving stays off until a later load succeeds, so the
    /// unreadable data is never overwritten.
    pub async fn load(&mut self) {
        match self.persistence.load().await {
            Ok(sessions) => {
                debug!(count = sessions.len(), "sessions loaded");
                self.saving_blocked = false;
                self.last_id = self.last_id.max(sessions.keys().next_back().map_or(0, |k| k.0));
                self.sessions = sessions;
                if self.active.is_some_and(|id| !self.sessions.contains_key(&id)) {
                    self.active = None;
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to load sessions");
                self.saving_blocked = e.blocks_saving();
                let note = if self.saving_blocked {
                    "; changes will not be saved this run"
                } else {
                    ""
                };
                self.emit(ChatEvent::Notice(format!("Could not load saved chats: {e}{note}")));
            }
        }
    }

    /// Save the whole collection.  Failures are logged and reported as a
    /// notice; in-memory state stays authoritative.  Returns whether the
    /// write succeeded.
    pub async fn persist(&self) -> bool {
        if self.saving_blocked {
            debug!("saving disabled after failed load");
            return false;
        }
        match self.persistence.save(&self.sessions).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to save sessions");
                self.emit(ChatEvent::Notice(format!("Could not save chats: {e}")));
                false
            }
        }
    }

    // ── Mutations ─────────────────────────────────────────────────────────────

    /// Allocate an empty session, make it active and return its id.
    pub async fn create_session(&mut self) -> SessionId {
        let id = self.next_id();
        self.sessions.insert(id, Session::new());
        self.active = Some(id);
        debug!(%id, "session created");
        self.persist().await;
        id
    }

    /// Make `id` the active session.  A no-op for the active or an unknown
    /// id.  The previous session is dropped if it was never used.
    pub async fn switch_active(&mut self, id: SessionId) {
        if self.active == Some(id) || !self.sessions.contains_key(&id) {
            return;
        }
        let mut removed = false;
        if let Some(prev) = self.active {
            if self.sessions.get(&prev).is_some_and(Session::is_untouched) {
                self.sessions.remove(&prev);
                debug!(id = %prev, "discarded unused session");
                removed = true;
            }
        }
        self.active = Some(id);
        if removed {
            self.persist().await;
        }
    }

    /// Append `message` to session `id`.  The first message of a session
    /// also sets its title.
    pub async fn append_message(&mut self, id: SessionId, message: Message) -> Result<(), StoreError> {
        let session = self.sessions.get_mut(&id).ok_or(StoreError::UnknownSession(id))?;
        session.messages.push(message);
        let new_title = if session.messages.len() == 1 {
            session.title = derive_title(&session.messages[0].content);
            Some(session.title.clone())
        } else {
            None
        };
        if let Some(title) = new_title {
            self.emit(ChatEvent::TitleChanged { id, title });
        }
        self.persist().await;
        Ok(())
    }

    /// Remove session `id`.  Deleting the active session activates the
    /// newest remaining one, or a fresh session when none remain.
    pub async fn delete_session(&mut self, id: SessionId) {
        if self.sessions.remove(&id).is_none() {
            return;
        }
        debug!(%id, "session deleted");
        if self.active != Some(id) {
            self.persist().await;
            return;
        }
        self.active = None;
        match self.sessions.keys().next_back().copied() {
            Some(newest) => {
                self.active = Some(newest);
                self.persist().await;
            }
            None => {
                self.create_session().await;
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Sessions newest first.  With a filter, a session is listed when its
    /// title or any message contains the filter, ignoring case.
    pub fn list(&self, filter: Option<&str>) -> Vec<SessionSummary> {
        let needle = filter.map(|f| f.trim().to_lowercase()).unwrap_or_default();
        self.sessions
            .iter()
            .rev()
            .filter(|(_, s)| s.matches(&needle))
            .map(|(id, s)| SessionSummary {
                id: *id,
                title: s.title.clone(),
                message_count: s.messages.len(),
                active: self.active == Some(*id),
            })
            .collect()
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.active
    }

    pub fn active(&self) -> Option<&Session> {
        self.active.and_then(|id| self.sessions.get(&id))
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Messages of session `id`, empty for an unknown id.
    pub fn messages(&self, id: SessionId) -> &[Message] {
        self.sessions.get(&id).map_or(&[], |s| s.messages.as_slice())
    }

    pub fn sessions(&self) -> &SessionMap {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn next_id(&mut self) -> SessionId {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let newest = self.sessions.keys().next_back().map_or(0, |k| k.0);
        let id = now.max(self.last_id + 1).max(newest + 1);
        self.last_id = id;
        SessionId(id)
    }

    fn emit(&self, event: ChatEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parley_model::StopReason;

    use super::*;
    use crate::{JsonFilePersistence, MemoryPersistence, PersistenceError, DEFAULT_TITLE};

    fn store() -> (SessionStore, Arc<MemoryPersistence>) {
        let p = Arc::new(MemoryPersistence::new());
        (SessionStore::new(p.clone()), p)
    }

    fn assert_one_active(s: &SessionStore) {
        assert!(!s.is_empty());
        let active = s.active_id().expect("an active session");
        assert!(s.get(active).is_some(), "active id must resolve");
        assert_eq!(s.list(None).iter().filter(|r| r.active).count(), 1);
    }

    /// Loads fine (or not, per `load_fails`) but never saves.
    #[derive(Default)]
    struct FailingPersistence {
        load_fails: bool,
        saves: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl SessionPersistence for FailingPersistence {
        async fn load(&self) -> Result<SessionMap, PersistenceError> {
            if self.load_fails {
                Err(PersistenceError::Unavailable("disk on fire".into()))
            } else {
                Ok(SessionMap::new())
            }
        }
        async fn save(&self, _: &SessionMap) -> Result<(), PersistenceError> {
            self.saves.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(PersistenceError::Unavailable("disk on fire".into()))
        }
    }

    fn notices(rx: &mut mpsc::UnboundedReceiver<ChatEvent>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let ChatEvent::Notice(n) = ev {
                out.push(n);
            }
        }
        out
    }

    // ── Creation ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_makes_new_session_active_and_persists() {
        let (mut s, p) = store();
        let id = s.create_session().await;
        assert_eq!(s.active_id(), Some(id));
        assert_eq!(s.get(id).unwrap().title, DEFAULT_TITLE);
        assert!(p.snapshot().contains_key(&id));
    }

    #[tokio::test]
    async fn ids_are_strictly_increasing() {
        let (mut s, _) = store();
        let mut prev = s.create_session().await;
        for _ in 0..20 {
            let next = s.create_session().await;
            assert!(next > prev);
            prev = next;
        }
        assert_eq!(s.len(), 21);
    }

    #[tokio::test]
    async fn open_on_empty_storage_creates_one_session() {
        let (mut s, _) = store();
        s.open().await;
        assert_eq!(s.len(), 1);
        assert_one_active(&s);
    }

    #[tokio::test]
    async fn open_activates_newest_stored_session() {
        let mut stored = SessionMap::new();
        stored.insert(SessionId(10), Session { title: "old".into(), messages: vec![Message::user("old")] });
        stored.insert(SessionId(20), Session { title: "new".into(), messages: vec![Message::user("new")] });
        let mut s = SessionStore::new(Arc::new(MemoryPersistence::with_sessions(stored)));
        s.open().await;
        assert_eq!(s.active_id(), Some(SessionId(20)));
        let fresh = s.create_session().await;
        assert!(fresh > SessionId(20));
    }

    // ── Switching / R3 cleanup ────────────────────────────────────────────────

    #[tokio::test]
    async fn switching_away_from_unused_session_discards_it() {
        let (mut s, p) = store();
        let b = s.create_session().await;
        s.append_message(b, Message::user("keep me")).await.unwrap();
        let a = s.create_session().await;

        s.switch_active(b).await;

        assert_eq!(s.active_id(), Some(b));
        assert!(s.list(None).iter().all(|r| r.id != a), "unused session must be gone");
        assert!(!p.snapshot().contains_key(&a), "removal must be persisted");
    }

    #[tokio::test]
    async fn switching_away_from_used_session_keeps_it() {
        let (mut s, _) = store();
        let a = s.create_session().await;
        s.append_message(a, Message::user("hi")).await.unwrap();
        let b = s.create_session().await;
        s.append_message(b, Message::user("there")).await.unwrap();

        s.switch_active(a).await;
        assert_eq!(s.len(), 2);
        assert_eq!(s.active_id(), Some(a));
    }

    #[tokio::test]
    async fn switch_to_unknown_or_active_is_noop() {
        let (mut s, _) = store();
        let a = s.create_session().await;
        s.switch_active(SessionId(1)).await;
        assert_eq!(s.active_id(), Some(a));
        s.switch_active(a).await;
        assert_eq!(s.active_id(), Some(a));
        assert_eq!(s.len(), 1, "switching to itself must not discard the session");
    }

    // ── Appending / titles ────────────────────────────────────────────────────

    #[tokio::test]
    async fn first_message_sets_title_and_notifies() {
        let (mut s, _) = store();
        let (tx, mut rx) = mpsc::unbounded_channel();
        s.set_event_sender(tx);
        let id = s.create_session().await;
        let text = "a".repeat(31);

        s.append_message(id, Message::user(text.clone())).await.unwrap();
        s.append_message(id, Message::assistant("reply", Some(StopReason::EndTurn))).await.unwrap();

        let expected = format!("{}...", "a".repeat(30));
        assert_eq!(s.get(id).unwrap().title, expected);
        assert_eq!(rx.try_recv().unwrap(), ChatEvent::TitleChanged { id, title: expected });
        assert!(rx.try_recv().is_err(), "only the first message renames");
    }

    #[tokio::test]
    async fn short_first_message_is_title_verbatim() {
        let (mut s, _) = store();
        let id = s.create_session().await;
        s.append_message(id, Message::user("Hello there")).await.unwrap();
        assert_eq!(s.get(id).unwrap().title, "Hello there");
    }

    #[tokio::test]
    async fn append_to_unknown_session_fails() {
        let (mut s, _) = store();
        s.create_session().await;
        let err = s.append_message(SessionId(7), Message::user("x")).await.unwrap_err();
        assert_eq!(err, StoreError::UnknownSession(SessionId(7)));
    }

    #[tokio::test]
    async fn every_append_is_persisted() {
        let (mut s, p) = store();
        let id = s.create_session().await;
        s.append_message(id, Message::user("one")).await.unwrap();
        assert_eq!(p.snapshot()[&id].messages.len(), 1);
        s.append_message(id, Message::assistant("two", None)).await.unwrap();
        assert_eq!(p.snapshot()[&id].messages.len(), 2);
    }

    // ── Deletion ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn deleting_active_activates_newest_remaining() {
        let (mut s, _) = store();
        let a = s.create_session().await;
        s.append_message(a, Message::user("a")).await.unwrap();
        let b = s.create_session().await;
        s.append_message(b, Message::user("b")).await.unwrap();
        let c = s.create_session().await;

        s.delete_session(c).await;
        assert_eq!(s.active_id(), Some(b));
        assert_one_active(&s);
    }

    #[tokio::test]
    async fn deleting_last_session_creates_replacement() {
        let (mut s, _) = store();
        let only = s.create_session().await;
        s.delete_session(only).await;
        assert_eq!(s.len(), 1);
        let replacement = s.active_id().unwrap();
        assert_ne!(replacement, only);
        assert!(s.get(replacement).unwrap().is_untouched());
    }

    #[tokio::test]
    async fn deleting_inactive_keeps_active() {
        let (mut s, p) = store();
        let a = s.create_session().await;
        s.append_message(a, Message::user("a")).await.unwrap();
        let b = s.create_session().await;
        s.delete_session(a).await;
        assert_eq!(s.active_id(), Some(b));
        assert!(!p.snapshot().contains_key(&a));
    }

    #[tokio::test]
    async fn deleting_unknown_is_noop() {
        let (mut s, _) = store();
        let a = s.create_session().await;
        s.delete_session(SessionId(3)).await;
        assert_eq!(s.active_id(), Some(a));
        assert_eq!(s.len(), 1);
    }

    #[tokio::test]
    async fn any_operation_sequence_keeps_exactly_one_active() {
        let (mut s, _) = store();
        s.open().await;
        let mut ids = vec![s.active_id().unwrap()];
        // Deterministic pseudo-random walk over create/delete/switch.
        let mut seed: u64 = 0x2545_f491;
        for step in 0..200 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let pick = ids[(seed as usize) % ids.len()];
            match seed % 4 {
                0 => ids.push(s.create_session().await),
                1 => s.delete_session(pick).await,
                2 => s.switch_active(pick).await,
                _ => {
                    if let Some(active) = s.active_id() {
                        s.append_message(active, Message::user(format!("step {step}"))).await.unwrap();
                    }
                }
            }
            ids = s.sessions().keys().copied().collect();
            assert_one_active(&s);
        }
    }

    // ── Listing ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn list_is_newest_first_and_filters_case_insensitively() {
        let (mut s, _) = store();
        let a = s.create_session().await;
        s.append_message(a, Message::user("Tokio runtime question")).await.unwrap();
        let b = s.create_session().await;
        s.append_message(b, Message::user("Serde")).await.unwrap();
        s.append_message(b, Message::assistant("Use #[serde(rename)] with TOKIO", None)).await.unwrap();
        let c = s.create_session().await;
        s.append_message(c, Message::user("unrelated")).await.unwrap();

        let all: Vec<_> = s.list(None).into_iter().map(|r| r.id).collect();
        assert_eq!(all, vec![c, b, a]);

        let hits: Vec<_> = s.list(Some("  tokio ")).into_iter().map(|r| r.id).collect();
        assert_eq!(hits, vec![b, a], "title match and message match both count");

        assert_eq!(s.list(Some("")).len(), 3);
        assert!(s.list(Some("nothing like this")).is_empty());
    }

    // ── Persistence failures ──────────────────────────────────────────────────

    #[tokio::test]
    async fn save_failure_is_a_notice_not_an_error() {
        let mut s = SessionStore::new(Arc::new(FailingPersistence::default()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        s.set_event_sender(tx);

        s.open().await;
        let id = s.active_id().unwrap();
        s.append_message(id, Message::user("still works")).await.unwrap();

        assert_eq!(s.get(id).unwrap().messages.len(), 1);
        let notes = notices(&mut rx);
        assert_eq!(notes.len(), 2, "create and append saves both fail: {notes:?}");
        assert!(notes.iter().all(|n| n.starts_with("Could not save chats")));
    }

    #[tokio::test]
    async fn unreadable_store_is_never_overwritten() {
        let p = Arc::new(FailingPersistence { load_fails: true, ..Default::default() });
        let mut s = SessionStore::new(p.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        s.set_event_sender(tx);

        s.open().await;
        let id = s.active_id().unwrap();
        s.append_message(id, Message::user("kept in memory")).await.unwrap();
        s.create_session().await;

        assert_eq!(s.len(), 2, "in-memory operation continues");
        assert_eq!(p.saves.load(std::sync::atomic::Ordering::SeqCst), 0);
        let notes = notices(&mut rx);
        assert_eq!(notes.len(), 1);
        assert!(notes[0].contains("will not be saved"));
    }

    #[tokio::test]
    async fn corrupt_session_file_is_kept_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let damaged = r#"{"1700000000000": {"title": "precious", "messages": [ {"role": "user""#;
        std::fs::write(&path, damaged).unwrap();

        let mut s = SessionStore::new(Arc::new(JsonFilePersistence::new(&path)));
        s.open().await;
        let id = s.active_id().unwrap();
        s.append_message(id, Message::user("fresh start")).await.unwrap();

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().contains(".corrupt-"))
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(std::fs::read_to_string(&backups[0]).unwrap(), damaged);
        assert!(std::fs::read_to_string(&path).unwrap().contains("fresh start"));
    }

    #[tokio::test]
    async fn reload_round_trips_through_persistence() {
        let (mut s, p) = store();
        let id = s.create_session().await;
        s.append_message(id, Message::user("q")).await.unwrap();
        s.append_message(id, Message::assistant("a", Some(StopReason::MaxTokens))).await.unwrap();

        let mut reopened = SessionStore::new(p.clone());
        reopened.open().await;
        assert_eq!(reopened.sessions(), s.sessions());
        assert_eq!(reopened.active_id(), Some(id));
    }
}
