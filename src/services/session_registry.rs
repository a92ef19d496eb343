use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::chat::SessionMeta;
use crate::services::memory::ConversationMemory;
use crate::services::provider::ChatModel;

pub const WELCOME: &str = "Welcome to LexRAG. I'm your legal research assistant. \
    How can I help you today?";

const NEW_SESSION_TITLE: &str = "New Session";
const TITLE_MAX_CHARS: usize = 50;

struct MetaInner {
    title: String,
    turns: u64,
}

/// One active conversation. Metadata lives behind its own lock so
/// `list()` never waits on an in-flight turn; the memory mutex guard is
/// held for a whole orchestration cycle, which serializes concurrent
/// turns on the same session.
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    meta: RwLock<MetaInner>,
    pub memory: tokio::sync::Mutex<ConversationMemory>,
}

impl Session {
    fn new(id: String, memory: ConversationMemory) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            meta: RwLock::new(MetaInner {
                title: NEW_SESSION_TITLE.to_string(),
                turns: 0,
            }),
            memory: tokio::sync::Mutex::new(memory),
        }
    }

    pub fn meta(&self) -> SessionMeta {
        let meta = self.meta.read();
        SessionMeta {
            id: self.id.clone(),
            title: meta.title.clone(),
            turns: meta.turns,
        }
    }

    pub fn turns(&self) -> u64 {
        self.meta.read().turns
    }

    /// Record a successfully completed turn. The first one also derives
    /// the session title from the query that produced it.
    pub fn complete_turn(&self, query: &str) {
        let mut meta = self.meta.write();
        meta.turns += 1;
        if meta.turns == 1 {
            meta.title = derive_title(query);
        }
    }
}

/// First 50 characters of the query, ellipsis appended iff truncated.
fn derive_title(query: &str) -> String {
    let mut title: String = query.chars().take(TITLE_MAX_CHARS).collect();
    if query.chars().count() > TITLE_MAX_CHARS {
        title.push('…');
    }
    title
}

/// Process-wide table of active sessions. Insertion/lookup/removal are
/// atomic with respect to each other; `list()` preserves creation order.
/// Sessions never survive a process restart.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    order: Mutex<Vec<String>>,
    summarizer: Arc<dyn ChatModel>,
    window_k: usize,
}

impl SessionRegistry {
    pub fn new(summarizer: Arc<dyn ChatModel>, window_k: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            order: Mutex::new(Vec::new()),
            summarizer,
            window_k,
        }
    }

    pub fn create(&self) -> SessionMeta {
        let id = Uuid::new_v4().to_string();

        let mut memory = ConversationMemory::new(self.summarizer.clone(), self.window_k);
        memory.seed(WELCOME);

        let session = Arc::new(Session::new(id.clone(), memory));
        info!("Created session {} at {}", id, session.created_at);

        let mut order = self.order.lock();
        self.sessions.insert(id.clone(), session.clone());
        order.push(id);

        session.meta()
    }

    pub fn list(&self) -> Vec<SessionMeta> {
        let order = self.order.lock();
        order
            .iter()
            .filter_map(|id| self.sessions.get(id).map(|entry| entry.meta()))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Removes the session and releases its memory. An in-flight turn is
    /// not cancelled; it fails at its next registry check.
    pub fn delete(&self, id: &str) -> bool {
        let mut order = self.order.lock();
        let removed = self.sessions.remove(id).is_some();
        if removed {
            order.retain(|existing| existing != id);
            debug!("Deleted session {}", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::ChatMessage;
    use crate::services::memory::Role;

    struct NoopModel;

    #[async_trait::async_trait]
    impl ChatModel for NoopModel {
        async fn generate(&self, _messages: &[ChatMessage]) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Arc::new(NoopModel), 3)
    }

    #[test]
    fn create_seeds_welcome_and_fresh_meta() {
        let registry = registry();
        let meta = registry.create();

        assert_eq!(meta.title, "New Session");
        assert_eq!(meta.turns, 0);

        let session = registry.get(&meta.id).unwrap();
        let memory = session.memory.try_lock().unwrap();
        assert_eq!(memory.window_len(), 1);
        let first = memory.turns().next().unwrap();
        assert_eq!(first.role, Role::Assistant);
        assert_eq!(first.content, WELCOME);
    }

    #[test]
    fn ids_are_unique() {
        let registry = registry();
        let a = registry.create();
        let b = registry.create();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn list_preserves_insertion_order() {
        let registry = registry();
        let ids: Vec<String> = (0..4).map(|_| registry.create().id).collect();
        let listed: Vec<String> = registry.list().into_iter().map(|m| m.id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn delete_is_idempotent_and_reported() {
        let registry = registry();
        let meta = registry.create();

        assert!(registry.delete(&meta.id));
        assert!(!registry.delete(&meta.id));
        assert!(registry.get(&meta.id).is_none());
        assert_eq!(registry.len(), 0);
        assert!(registry.list().is_empty());
    }

    #[test]
    fn first_completed_turn_sets_title_once() {
        let registry = registry();
        let meta = registry.create();
        let session = registry.get(&meta.id).unwrap();

        session.complete_turn("What is the statute of limitations for fraud?");
        assert_eq!(session.turns(), 1);
        assert_eq!(
            session.meta().title,
            "What is the statute of limitations for fraud?"
        );

        session.complete_turn("a different query");
        assert_eq!(session.turns(), 2);
        assert_eq!(
            session.meta().title,
            "What is the statute of limitations for fraud?"
        );
    }

    #[test]
    fn long_titles_truncate_with_ellipsis() {
        let query = "x".repeat(60);
        let title = derive_title(&query);
        assert_eq!(title.chars().count(), 51);
        assert!(title.ends_with('…'));

        let exact = "y".repeat(50);
        assert_eq!(derive_title(&exact), exact);
    }
}
