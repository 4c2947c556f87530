//! Per-user session state and the two-page controller.
//!
//! A session is either on the upload page or the results page. Rendering is a
//! function of this state alone; handlers mutate it only through the methods
//! below so the page invariants hold no matter which surface drives them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Page {
    Upload,
    Results,
}

impl Page {
    pub fn as_str(&self) -> &'static str {
        match self {
            Page::Upload => "upload",
            Page::Results => "results",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: i64,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// What we know about the uploaded contract
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentInfo {
    pub file_name: String,
    pub page_count: usize,
    pub skipped_pages: Vec<u32>,
    /// Characters of contract text
    pub chars: usize,
    /// Whether the analysis prompt dropped the tail of the text
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
}

/// One-shot inline message shown on the next render
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("No analysis available yet; analyze a contract first")]
    AnalysisMissing,

    #[error("Action requires the {expected} page, session is on {actual}")]
    WrongPage { expected: &'static str, actual: &'static str },
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub current_page: Page,
    /// Empty until an analysis succeeds
    pub analysis_result: String,
    pub messages: Vec<Message>,
    /// Empty until a document is extracted
    pub contract_text: String,
    pub document: Option<DocumentInfo>,
    #[serde(skip)]
    pub notice: Option<Notice>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            current_page: Page::Upload,
            analysis_result: String::new(),
            messages: Vec::new(),
            contract_text: String::new(),
            document: None,
            notice: None,
        }
    }

    pub fn has_analysis(&self) -> bool {
        !self.analysis_result.is_empty()
    }

    /// upload -> results, only once an analysis is stored
    pub fn view_report(&mut self) -> Result<Page, TransitionError> {
        if !self.has_analysis() {
            return Err(TransitionError::AnalysisMissing);
        }
        self.current_page = Page::Results;
        Ok(self.current_page)
    }

    /// Back to the upload page with a clean slate
    pub fn new_upload(&mut self) -> Page {
        self.current_page = Page::Upload;
        self.analysis_result.clear();
        self.messages.clear();
        self.contract_text.clear();
        self.document = None;
        self.notice = None;
        self.current_page
    }

    /// Fail unless the session is on `page`
    pub fn require_page(&self, page: Page) -> Result<(), TransitionError> {
        if self.current_page == page {
            Ok(())
        } else {
            Err(TransitionError::WrongPage {
                expected: page.as_str(),
                actual: self.current_page.as_str(),
            })
        }
    }

    pub fn push_message(&mut self, role: Role, content: impl Into<String>) -> &Message {
        self.messages.push(Message::new(role, content));
        &self.messages[self.messages.len() - 1]
    }

    pub fn set_notice(&mut self, kind: NoticeKind, text: impl Into<String>) {
        self.notice = Some(Notice { kind, text: text.into() });
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }
}

pub type SharedSession = Arc<Mutex<SessionState>>;

/// Sessions untouched for this long are dropped
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

struct SessionEntry {
    session: SharedSession,
    last_seen: Instant,
}

impl SessionEntry {
    /// A request still holding the session keeps it alive
    fn is_idle(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout && Arc::strong_count(&self.session) == 1
    }
}

/// In-memory sessions keyed by cookie id
///
/// Each session has its own async mutex, held for the full request so turns
/// within one session never overlap. Sessions idle for longer than the
/// store's timeout are expired on lookup and by `prune_idle`.
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Look up `id`, creating a fresh session when it is unknown, expired or absent.
    ///
    /// Unknown ids are never adopted; a new one is minted instead. Returns the
    /// id actually in use and whether it was newly created.
    pub fn get_or_create(&self, id: Option<Uuid>) -> (Uuid, SharedSession, bool) {
        let mut guard = self.sessions.write().unwrap_or_else(|e| e.into_inner());

        if let Some(id) = id {
            let expired = match guard.get_mut(&id) {
                Some(entry) if !entry.is_idle(self.idle_timeout) => {
                    entry.last_seen = Instant::now();
                    return (id, entry.session.clone(), false);
                }
                Some(_) => true,
                None => false,
            };
            if expired {
                guard.remove(&id);
                tracing::debug!("Session {} expired", id);
            }
        }

        let id = Uuid::new_v4();
        let session: SharedSession = Arc::new(Mutex::new(SessionState::new()));
        guard.insert(id, SessionEntry { session: session.clone(), last_seen: Instant::now() });
        tracing::debug!("Created session {}", id);
        (id, session, true)
    }

    pub fn get(&self, id: &Uuid) -> Option<SharedSession> {
        let guard = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        guard.get(id)
            .filter(|entry| !entry.is_idle(self.idle_timeout))
            .map(|entry| entry.session.clone())
    }

    /// Drop idle sessions, returning how many were removed
    pub fn prune_idle(&self) -> usize {
        let mut guard = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let before = guard.len();
        guard.retain(|_, entry| !entry.is_idle(self.idle_timeout));
        before - guard.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzed() -> SessionState {
        let mut session = SessionState::new();
        session.contract_text = "Clause A".to_string();
        session.analysis_result = "SAFETY SCORE: 7".to_string();
        session
    }

    #[test]
    fn test_initial_state() {
        let session = SessionState::new();
        assert_eq!(session.current_page, Page::Upload);
        assert!(session.analysis_result.is_empty());
        assert!(session.messages.is_empty());
        assert!(session.contract_text.is_empty());
    }

    #[test]
    fn test_view_report_requires_analysis() {
        let mut session = SessionState::new();
        assert_eq!(session.view_report(), Err(TransitionError::AnalysisMissing));
        assert_eq!(session.current_page, Page::Upload);
    }

    #[test]
    fn test_view_report_moves_to_results() {
        let mut session = analyzed();
        assert_eq!(session.view_report(), Ok(Page::Results));
        assert_eq!(session.current_page, Page::Results);
    }

    #[test]
    fn test_new_upload_clears_analysis_and_messages_together() {
        let mut session = analyzed();
        session.view_report().unwrap();
        session.push_message(Role::User, "What is the termination clause?");
        session.push_message(Role::Assistant, "Thirty days notice.");

        assert_eq!(session.new_upload(), Page::Upload);
        assert!(session.analysis_result.is_empty());
        assert!(session.messages.is_empty());
        assert!(session.contract_text.is_empty());
        assert!(session.document.is_none());
        // and the report is no longer reachable
        assert_eq!(session.view_report(), Err(TransitionError::AnalysisMissing));
    }

    #[test]
    fn test_require_page() {
        let session = SessionState::new();
        assert!(session.require_page(Page::Upload).is_ok());
        let err = session.require_page(Page::Results).unwrap_err();
        assert_eq!(err.to_string(), "Action requires the results page, session is on upload");
    }

    #[test]
    fn test_notice_is_one_shot() {
        let mut session = SessionState::new();
        session.set_notice(NoticeKind::Error, "AI Error: quota");
        assert_eq!(session.take_notice().map(|n| n.text), Some("AI Error: quota".to_string()));
        assert!(session.take_notice().is_none());
    }

    #[test]
    fn test_store_reuses_known_ids() {
        let store = SessionStore::new();
        let (id, _, created) = store.get_or_create(None);
        assert!(created);
        let (same, _, created) = store.get_or_create(Some(id));
        assert_eq!(same, id);
        assert!(!created);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_mints_new_id_for_unknown_cookie() {
        let store = SessionStore::new();
        let stale = Uuid::new_v4();
        let (id, _, created) = store.get_or_create(Some(stale));
        assert!(created);
        assert_ne!(id, stale);
    }

    #[tokio::test]
    async fn test_store_sessions_are_independent() {
        let store = SessionStore::new();
        let (_, a, _) = store.get_or_create(None);
        let (_, b, _) = store.get_or_create(None);
        a.lock().await.analysis_result = "report".to_string();
        assert!(b.lock().await.analysis_result.is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_expired_id_gets_a_new_session() {
        let store = SessionStore::with_idle_timeout(Duration::from_millis(1));
        let (id, _, _) = store.get_or_create(None);
        std::thread::sleep(Duration::from_millis(10));

        assert!(store.get(&id).is_none());
        let (fresh, session, created) = store.get_or_create(Some(id));
        assert!(created);
        assert_ne!(fresh, id);
        assert_eq!(store.len(), 1);
        assert_eq!(session.try_lock().unwrap().current_page, Page::Upload);
    }

    #[test]
    fn test_lookup_keeps_session_alive() {
        let store = SessionStore::with_idle_timeout(Duration::from_millis(200));
        let (id, _, _) = store.get_or_create(None);
        for _ in 0..3 {
            std::thread::sleep(Duration::from_millis(100));
            let (same, _, created) = store.get_or_create(Some(id));
            assert_eq!(same, id);
            assert!(!created);
        }
    }

    #[test]
    fn test_prune_idle_skips_sessions_in_use() {
        let store = SessionStore::with_idle_timeout(Duration::from_millis(1));
        let (_, _, _) = store.get_or_create(None);
        let (held_id, held, _) = store.get_or_create(None);
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(store.prune_idle(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(&held_id).is_some());

        drop(held);
        assert_eq!(store.prune_idle(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_default_timeout_keeps_fresh_sessions() {
        let store = SessionStore::new();
        store.get_or_create(None);
        assert_eq!(store.prune_idle(), 0);
        assert_eq!(store.idle_timeout(), DEFAULT_IDLE_TIMEOUT);
    }
}
