//! Treecho session service
//!
//! Registry of live sessions keyed by session id, backed by a session store.
//! Each session sits behind its own lock; every mutation of a tree or learner
//! happens under that lock. Saves of one session are serialized by a
//! per-session save guard held from the snapshot through the write, so an
//! older snapshot never lands after a newer one. The session lock itself is
//! never held across an await.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use treecho_common::{ActionItem, ActionOutput, Result, TreechoError};

use crate::domain::action_key::ActionKey;
use crate::domain::session::{ActionExecutor, EchoSession, RecordedAction, SessionSettings};
use crate::domain::summary::{SessionSummary, TurnReport};
use crate::infra::session_store::SessionStore;

/// Shared handle to a live session
pub type SessionHandle = Arc<Mutex<EchoSession>>;

#[derive(Clone)]
struct LiveSession {
    state: SessionHandle,
    /// Orders snapshot-and-write sequences of this session
    save_guard: Arc<tokio::sync::Mutex<()>>,
}

impl LiveSession {
    fn new(session: EchoSession) -> Self {
        Self {
            state: Arc::new(Mutex::new(session)),
            save_guard: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

/// Multi-session front door used by the REST API
pub struct EchoService {
    sessions: DashMap<Uuid, LiveSession>,
    /// Session store (public for REST API access)
    pub store: Arc<dyn SessionStore>,
    settings: SessionSettings,
}

impl EchoService {
    /// Create a service over a store, applying `settings` to new sessions
    pub fn new(store: Arc<dyn SessionStore>, settings: SessionSettings) -> Self {
        Self {
            sessions: DashMap::new(),
            store,
            settings,
        }
    }

    /// Open a session, restoring its persisted document when one exists.
    ///
    /// A missing id opens a fresh session. Unreadable documents are logged
    /// and replaced by an empty session. Opening an already live session
    /// returns it unchanged.
    pub async fn open_session(&self, id: Option<Uuid>) -> Uuid {
        let id = id.unwrap_or_else(Uuid::new_v4);
        if self.sessions.contains_key(&id) {
            return id;
        }

        let document = match self.store.load(&id).await {
            Ok(document) => document,
            Err(e) => {
                warn!(session = %id, "Error loading session document, starting empty: {}", e);
                None
            }
        };
        let restored = document.is_some();

        let session = EchoSession::from_document(id, self.settings.clone(), document.as_ref());
        info!(
            session = %id,
            restored,
            tree_size = session.tree().size(),
            patterns = session.learner().pattern_count(),
            "Session opened"
        );

        self.sessions
            .entry(id)
            .or_insert_with(|| LiveSession::new(session));
        id
    }

    /// Look up a live session.
    ///
    /// Embedders driving their own loop lock the handle only around
    /// `prepare` and `settle`, never across execution.
    pub fn session(&self, id: &Uuid) -> Result<SessionHandle> {
        self.live(id).map(|live| live.state)
    }

    fn live(&self, id: &Uuid) -> Result<LiveSession> {
        self.sessions
            .get(id)
            .map(|s| s.clone())
            .ok_or(TreechoError::SessionNotFound(*id))
    }

    /// Start a turn for the given user input
    pub fn begin_turn(&self, id: &Uuid, user_input: &str) -> Result<Vec<ActionKey>> {
        let handle = self.session(id)?;
        let mut session = handle.lock();
        Ok(session.begin_turn(user_input).to_vec())
    }

    /// Record an action whose outcome is already known
    pub fn record_action(&self, id: &Uuid, item: &ActionItem, success: bool) -> Result<RecordedAction> {
        let handle = self.session(id)?;
        let mut session = handle.lock();
        Ok(session.record(item, success))
    }

    /// Run an item through the session's loop, delegating execution.
    ///
    /// The session is unlocked while the executor runs, so other requests
    /// for the same session are served meanwhile.
    pub async fn execute_action(
        &self,
        id: &Uuid,
        item: &ActionItem,
        executor: &dyn ActionExecutor,
    ) -> Result<(ActionOutput, RecordedAction)> {
        let handle = self.session(id)?;
        let prepared = handle.lock().prepare(item);
        let result = executor.execute(item).await;
        let mut session = handle.lock();
        session.settle(prepared, result)
    }

    /// Close a turn, saving the session when its autosave cadence is reached
    pub async fn end_turn(&self, id: &Uuid) -> Result<TurnReport> {
        let report = {
            let handle = self.session(id)?;
            let session = handle.lock();
            session.end_turn()
        };

        if report.autosave_due {
            if let Err(e) = self.save(id).await {
                warn!(session = %id, "Autosave failed: {}", e);
            }
        }
        Ok(report)
    }

    /// Success estimate for a key sequence
    pub fn predict(&self, id: &Uuid, sequence: &[ActionKey]) -> Result<f64> {
        let handle = self.session(id)?;
        let session = handle.lock();
        Ok(session.predict(sequence))
    }

    /// Change echo settings of a live session
    pub fn configure_echo(
        &self,
        id: &Uuid,
        enabled: Option<bool>,
        threshold: Option<f64>,
    ) -> Result<SessionSummary> {
        let handle = self.session(id)?;
        let mut session = handle.lock();
        if let Some(enabled) = enabled {
            session.set_echo_enabled(enabled);
        }
        if let Some(threshold) = threshold {
            session.set_echo_threshold(threshold);
        }
        Ok(session.summary())
    }

    /// Summary of a live session
    pub fn summary(&self, id: &Uuid) -> Result<SessionSummary> {
        let handle = self.session(id)?;
        let session = handle.lock();
        Ok(session.summary())
    }

    /// Persist a live session
    pub async fn save(&self, id: &Uuid) -> Result<()> {
        let live = self.live(id)?;
        self.persist(id, &live).await
    }

    async fn persist(&self, id: &Uuid, live: &LiveSession) -> Result<()> {
        let _guard = live.save_guard.lock().await;
        let document = live.state.lock().to_document();

        self.store
            .save(id, &document)
            .await
            .map_err(|e| TreechoError::Storage(e.to_string()))?;
        info!(session = %id, "Saved session");
        Ok(())
    }

    /// Drop a session from the registry and save it.
    ///
    /// Requests arriving after removal see `SessionNotFound`. When the final
    /// save fails the session is put back and the error returned.
    pub async fn close_session(&self, id: &Uuid) -> Result<()> {
        let (_, live) = self
            .sessions
            .remove(id)
            .ok_or(TreechoError::SessionNotFound(*id))?;

        if let Err(e) = self.persist(id, &live).await {
            warn!(session = %id, "Final save failed, keeping session open: {}", e);
            self.sessions.insert(*id, live);
            return Err(e);
        }
        info!(session = %id, "Session closed");
        Ok(())
    }

    /// Save every live session, returning how many were saved
    pub async fn save_all(&self) -> usize {
        let ids: Vec<Uuid> = self.sessions.iter().map(|e| *e.key()).collect();
        let mut saved = 0;
        for id in ids {
            match self.save(&id).await {
                Ok(()) => saved += 1,
                Err(e) => warn!(session = %id, "Error saving session: {}", e),
            }
        }
        saved
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use treecho_common::ExecutionError;

    use crate::domain::session::MockActionExecutor;
    use crate::infra::session_store::{FileSessionStore, InMemorySessionStore, StoreError};

    /// Store whose first save stalls
    #[derive(Default)]
    struct StallingStore {
        inner: InMemorySessionStore,
        stalled: AtomicBool,
    }

    #[async_trait]
    impl SessionStore for StallingStore {
        async fn load(&self, id: &Uuid) -> std::result::Result<Option<Value>, StoreError> {
            self.inner.load(id).await
        }

        async fn save(&self, id: &Uuid, document: &Value) -> std::result::Result<(), StoreError> {
            if !self.stalled.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            self.inner.save(id, document).await
        }

        async fn delete(&self, id: &Uuid) -> std::result::Result<(), StoreError> {
            self.inner.delete(id).await
        }

        async fn list(&self) -> std::result::Result<Vec<Uuid>, StoreError> {
            self.inner.list().await
        }
    }

    /// Store that refuses every write
    struct ReadOnlyStore;

    #[async_trait]
    impl SessionStore for ReadOnlyStore {
        async fn load(&self, _id: &Uuid) -> std::result::Result<Option<Value>, StoreError> {
            Ok(None)
        }

        async fn save(&self, _id: &Uuid, _document: &Value) -> std::result::Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
        }

        async fn delete(&self, id: &Uuid) -> std::result::Result<(), StoreError> {
            Err(StoreError::NotFound(*id))
        }

        async fn list(&self) -> std::result::Result<Vec<Uuid>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn service() -> EchoService {
        EchoService::new(Arc::new(InMemorySessionStore::new()), SessionSettings::default())
    }

    #[tokio::test]
    async fn test_open_and_record() {
        let svc = service();
        let id = svc.open_session(None).await;

        svc.begin_turn(&id, "find docs").unwrap();
        svc.record_action(&id, &ActionItem::click(120, 40), true).unwrap();
        svc.record_action(&id, &ActionItem::type_text("tokio"), true).unwrap();

        let summary = svc.summary(&id).unwrap();
        assert_eq!(summary.total_actions, 2);
        assert_eq!(summary.learned_patterns, 1);
        assert_eq!(summary.tree_size, 4);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let svc = service();
        let result = svc.summary(&Uuid::new_v4());
        assert!(matches!(result, Err(TreechoError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_save_and_reopen() {
        let svc = service();
        let id = svc.open_session(None).await;
        svc.record_action(&id, &ActionItem::scroll(1), true).unwrap();
        svc.record_action(&id, &ActionItem::scroll(1), true).unwrap();
        svc.close_session(&id).await.unwrap();
        assert_eq!(svc.session_count(), 0);

        let reopened = svc.open_session(Some(id)).await;
        assert_eq!(reopened, id);
        let summary = svc.summary(&id).unwrap();
        assert_eq!(summary.learned_patterns, 1);
        assert_eq!(summary.total_actions, 0);
        let p = svc
            .predict(&id, &["scroll_down".to_string(), "scroll_down".to_string()])
            .unwrap();
        assert_eq!(p, 1.0);
    }

    #[tokio::test]
    async fn test_corrupt_document_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let id = Uuid::new_v4();
        std::fs::write(store.document_path(&id), "garbage").unwrap();

        let svc = EchoService::new(Arc::new(store), SessionSettings::default());
        svc.open_session(Some(id)).await;

        assert_eq!(svc.summary(&id).unwrap().tree_size, 1);
    }

    #[tokio::test]
    async fn test_end_turn_autosaves() {
        let settings = SessionSettings {
            autosave_every: 2,
            ..SessionSettings::default()
        };
        let store = Arc::new(InMemorySessionStore::new());
        let svc = EchoService::new(store.clone(), settings);
        let id = svc.open_session(None).await;

        svc.record_action(&id, &ActionItem::click(0, 0), true).unwrap();
        svc.end_turn(&id).await.unwrap();
        assert!(store.load(&id).await.unwrap().is_none());

        svc.record_action(&id, &ActionItem::click(0, 0), true).unwrap();
        let report = svc.end_turn(&id).await.unwrap();
        assert!(report.autosave_due);
        assert!(store.load(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_configure_echo() {
        let svc = service();
        let id = svc.open_session(None).await;

        let summary = svc.configure_echo(&id, Some(false), Some(0.9)).unwrap();
        assert!(!summary.echo_enabled);
        assert_eq!(summary.echo_threshold, 0.9);
    }

    #[tokio::test]
    async fn test_save_all() {
        let svc = service();
        svc.open_session(None).await;
        svc.open_session(None).await;

        assert_eq!(svc.save_all().await, 2);
        assert_eq!(svc.store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_overlapping_saves_keep_newest() {
        let store = Arc::new(StallingStore::default());
        let svc = Arc::new(EchoService::new(store.clone(), SessionSettings::default()));
        let id = svc.open_session(None).await;

        let early = tokio::spawn({
            let svc = svc.clone();
            async move { svc.save(&id).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        for _ in 0..2 {
            svc.record_action(&id, &ActionItem::click(0, 0), true).unwrap();
            svc.record_action(&id, &ActionItem::type_text("x"), true).unwrap();
        }
        svc.save(&id).await.unwrap();
        early.await.unwrap().unwrap();

        let persisted = store.load(&id).await.unwrap().unwrap();
        let frequencies = persisted["patterns"]["frequencies"].as_object().unwrap();
        assert_eq!(frequencies.len(), svc.summary(&id).unwrap().learned_patterns);
        assert_eq!(persisted["patterns"]["frequencies"]["click_region_0_0->type_short"], 2);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_actions() {
        let svc = service();
        let id = svc.open_session(None).await;
        svc.close_session(&id).await.unwrap();

        let result = svc.record_action(&id, &ActionItem::click(0, 0), true);
        assert!(matches!(result, Err(TreechoError::SessionNotFound(_))));
        assert!(matches!(svc.close_session(&id).await, Err(TreechoError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_failed_close_keeps_session() {
        let svc = EchoService::new(Arc::new(ReadOnlyStore), SessionSettings::default());
        let id = svc.open_session(None).await;
        svc.record_action(&id, &ActionItem::scroll(1), true).unwrap();

        let result = svc.close_session(&id).await;

        assert!(matches!(result, Err(TreechoError::Storage(_))));
        assert_eq!(svc.session_count(), 1);
        assert_eq!(svc.summary(&id).unwrap().total_actions, 1);
    }

    #[tokio::test]
    async fn test_execute_action() {
        let mut executor = MockActionExecutor::new();
        executor
            .expect_execute()
            .withf(|item| matches!(item, ActionItem::FunctionCall { .. }))
            .returning(|_| Ok(ActionOutput::new(vec![json!({"type": "function_call_output"})])));
        executor
            .expect_execute()
            .withf(|item| matches!(item, ActionItem::ComputerCall(_)))
            .returning(|_| Err(ExecutionError::Timeout { elapsed_ms: 5000 }));

        let svc = service();
        let id = svc.open_session(None).await;
        svc.begin_turn(&id, "lookup").unwrap();

        let (_, recorded) = svc
            .execute_action(&id, &ActionItem::function("search"), &executor)
            .await
            .unwrap();
        assert!(recorded.success);

        let result = svc.execute_action(&id, &ActionItem::click(0, 0), &executor).await;
        assert!(matches!(result, Err(TreechoError::Execution(_))));

        let handle = svc.session(&id).unwrap();
        let session = handle.lock();
        assert_eq!(session.action_history().len(), 2);
        assert_eq!(
            session.learner().outcomes("function_search->click_region_0_0"),
            Some(&[false][..])
        );
    }
}
