//! Per-client review sessions.
//!
//! Each browser gets its own `ReviewSession`, created on first visit and
//! identified by a cookie. A session lives behind a single mutex, shared by
//! the HTTP handlers and (when running) the voice worker, so a render never
//! sees a transition half applied.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use shoplist_core::{transition, AdvancePolicy, Catalog, Event, Outcome, ReviewSession};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// Opaque identifier carried in the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Only ids we could have issued are accepted from cookies.
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(|id| Self(id.to_string()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
}

/// A message to show the shopper once, on the next render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }
}

/// Everything kept for one client.
#[derive(Debug)]
pub struct ClientSession {
    pub review: ReviewSession,
    pub notice: Option<Notice>,
    /// Set while a voice worker is driving this session.
    pub voice_active: bool,
    /// Bumped by every applied event.
    revision: u64,
    last_seen: Instant,
}

impl ClientSession {
    pub fn new(review: ReviewSession) -> Self {
        Self {
            review,
            notice: None,
            voice_active: false,
            revision: 0,
            last_seen: Instant::now(),
        }
    }

    /// Number of events applied so far. Two reads with the same revision saw
    /// the same session.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    fn is_idle(&self, now: Instant, max_idle: Duration) -> bool {
        !self.voice_active && now.saturating_duration_since(self.last_seen) >= max_idle
    }

    /// Run one event through the state machine and keep the result.
    pub fn apply(&mut self, id: &SessionId, event: Event) -> Outcome {
        let result = transition(self.review.clone(), event);
        self.review = result.session;
        self.revision += 1;

        match &result.outcome {
            Outcome::Rejected(err) => {
                warn!("Rejected {} for session {}: {}", event.log_summary(), id, err)
            }
            outcome => info!(
                "Processed {} for session {}: {:?} ({} pending, {} selected)",
                event.log_summary(),
                id,
                outcome,
                self.review.queue().len(),
                self.review.selections().len()
            ),
        }

        result.outcome
    }

    /// Take the pending notice, clearing it.
    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }
}

pub type SharedSession = Arc<Mutex<ClientSession>>;

const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// Thread-safe store of client sessions.
pub struct SessionStore {
    catalog: Catalog,
    policy: AdvancePolicy,
    sessions: RwLock<HashMap<SessionId, SharedSession>>,
}

impl SessionStore {
    pub fn new(catalog: Catalog, policy: AdvancePolicy) -> Self {
        Self {
            catalog,
            policy,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Get the session for `id`, or start a new one.
    ///
    /// Unknown or missing ids get a fresh id; the caller must hand it back
    /// to the client.
    pub async fn get_or_create(&self, id: Option<SessionId>) -> (SessionId, SharedSession) {
        if let Some(id) = id {
            if let Some(session) = self.resume(&id).await {
                return (id, session);
            }
        }

        let id = SessionId::generate();
        let session = Arc::new(Mutex::new(ClientSession::new(ReviewSession::new(
            self.catalog.clone(),
            self.policy,
        ))));
        self.sessions
            .write()
            .await
            .insert(id.clone(), session.clone());
        info!("Started review session {}", id);
        (id, session)
    }

    pub async fn get(&self, id: &SessionId) -> Option<SharedSession> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Get a known session and mark it as in use.
    pub async fn resume(&self, id: &SessionId) -> Option<SharedSession> {
        let session = self.get(id).await?;
        session.lock().await.touch();
        Some(session)
    }

    /// Tear down a session. A running voice worker keeps its own handle and
    /// finishes on the detached session.
    pub async fn remove(&self, id: &SessionId) -> Option<SharedSession> {
        let removed = self.sessions.write().await.remove(id);
        if removed.is_some() {
            info!("Ended review session {}", id);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop sessions untouched for `max_idle`.
    ///
    /// Sessions with a running voice worker, or locked right now, are kept.
    pub async fn evict_idle(&self, now: Instant, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| match session.try_lock() {
            Ok(guard) => !guard.is_idle(now, max_idle),
            Err(_) => true,
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(
                "Evicted {} idle review sessions ({} remaining)",
                evicted,
                sessions.len()
            );
        }
        evicted
    }

    /// Periodically evict idle sessions. Never returns.
    pub async fn eviction_loop(&self, max_idle: Duration) {
        let mut interval = tokio::time::interval(EVICTION_INTERVAL);

        loop {
            interval.tick().await;
            self.evict_idle(Instant::now(), max_idle).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoplist_core::{CatalogEntry, Selection};

    fn store(policy: AdvancePolicy) -> SessionStore {
        SessionStore::new(
            Catalog::new(vec![
                CatalogEntry::new("Milk", 2),
                CatalogEntry::new("Bread", 1),
            ]),
            policy,
        )
    }

    #[tokio::test]
    async fn test_get_or_create_starts_new_session() {
        let store = store(AdvancePolicy::Rotate);

        let (id, session) = store.get_or_create(None).await;

        assert_eq!(store.len().await, 1);
        let session = session.lock().await;
        assert_eq!(session.review.current().map(|e| e.name.as_str()), Some("Milk"));
        assert!(store.get(&id).await.is_some());
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_known_session() {
        let store = store(AdvancePolicy::Rotate);
        let (id, _) = store.get_or_create(None).await;

        let (again, _) = store.get_or_create(Some(id.clone())).await;

        assert_eq!(again, id);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_id_gets_fresh_session() {
        let store = store(AdvancePolicy::Rotate);
        let stale = SessionId::generate();

        let (id, _) = store.get_or_create(Some(stale.clone())).await;

        assert_ne!(id, stale);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let store = store(AdvancePolicy::Consume);
        let (first, _) = store.get_or_create(None).await;
        let (second, second_session) = store.get_or_create(None).await;

        let first_session = store.get(&first).await.unwrap();
        first_session
            .lock()
            .await
            .apply(&first, Event::Confirm { quantity: Some(2) });

        let second_session = second_session.lock().await;
        assert!(second_session.review.selections().is_empty());
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_apply_bumps_revision() {
        let store = store(AdvancePolicy::Consume);
        let (id, session) = store.get_or_create(None).await;
        let mut session = session.lock().await;

        let outcome = session.apply(&id, Event::Confirm { quantity: Some(1) });
        assert_eq!(outcome, Outcome::Confirmed(Selection::new("Milk", 1)));
        assert_eq!(session.revision(), 1);

        session.apply(&id, Event::Confirm { quantity: None });
        assert_eq!(session.revision(), 2);
        assert_eq!(session.review.queue().len(), 1);
    }

    #[tokio::test]
    async fn test_evict_idle_drops_stale_sessions() {
        let store = store(AdvancePolicy::Rotate);
        let (stale, _) = store.get_or_create(None).await;
        let (listening, voice) = store.get_or_create(None).await;
        voice.lock().await.voice_active = true;

        let later = Instant::now() + Duration::from_secs(3600);
        let evicted = store.evict_idle(later, Duration::from_secs(600)).await;

        assert_eq!(evicted, 1);
        assert!(store.get(&stale).await.is_none());
        assert!(store.get(&listening).await.is_some());
    }

    #[tokio::test]
    async fn test_evict_idle_keeps_recent_sessions() {
        let store = store(AdvancePolicy::Rotate);
        let (id, _) = store.get_or_create(None).await;

        let evicted = store
            .evict_idle(Instant::now(), Duration::from_secs(600))
            .await;

        assert_eq!(evicted, 0);
        assert!(store.resume(&id).await.is_some());
    }

    #[tokio::test]
    async fn test_remove_tears_down_session() {
        let store = store(AdvancePolicy::Rotate);
        let (id, _) = store.get_or_create(None).await;

        assert!(store.remove(&id).await.is_some());
        assert!(store.is_empty().await);
        assert!(store.remove(&id).await.is_none());
    }

    #[test]
    fn test_session_id_parse_rejects_garbage() {
        assert!(SessionId::parse("not-a-uuid").is_none());
        let id = SessionId::generate();
        assert_eq!(SessionId::parse(&id.0), Some(id));
    }

    #[test]
    fn test_take_notice_clears_it() {
        let catalog = Catalog::new(vec![CatalogEntry::new("Milk", 2)]);
        let mut session = ClientSession::new(ReviewSession::new(catalog, AdvancePolicy::Rotate));
        session.notice = Some(Notice::success("Sent"));

        assert_eq!(session.take_notice(), Some(Notice::success("Sent")));
        assert_eq!(session.take_notice(), None);
    }
}
