//! Memory module - persistent conversation history
//!
//! Transports record each turn (the user message and the final assistant
//! answer) through a [`ConversationStore`]. The agent's own working history
//! lives in the agent; the store is the durable copy used for listing,
//! searching and resuming.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::agent::{ChatMessage, Role};
use crate::error::Error;
use crate::Result;

/// One persisted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: u64,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl StoredMessage {
    pub fn into_chat_message(self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content,
        }
    }
}

/// Listing entry for a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

/// Conversation store trait - interface for persistent history
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation; an existing one is left untouched.
    async fn create_conversation(&self, id: &str, title: &str) -> Result<()>;

    /// Append a message with metadata, creating the conversation if needed.
    async fn append_with_metadata(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        metadata: Map<String, Value>,
    ) -> Result<u64>;

    /// Append a message, creating the conversation if needed.
    async fn append_message(&self, conversation_id: &str, role: Role, content: &str) -> Result<u64> {
        self.append_with_metadata(conversation_id, role, content, Map::new())
            .await
    }

    /// Messages of one conversation, oldest first.
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>>;

    /// Most recently updated conversations first.
    async fn list_conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>>;

    /// Remove a conversation and its messages. Returns whether it existed.
    async fn delete_conversation(&self, id: &str) -> Result<bool>;

    /// Case-insensitive substring search over message content, newest first.
    async fn search_messages(&self, query: &str, limit: usize) -> Result<Vec<StoredMessage>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConversationRecord {
    id: String,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Id of the last message appended, orders equal timestamps.
    #[serde(default)]
    last_message: u64,
}

/// The whole store as one serializable document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    conversations: Vec<ConversationRecord>,
    messages: Vec<StoredMessage>,
    next_id: u64,
}

impl StoreState {
    fn create(&mut self, id: &str, title: &str) -> bool {
        if self.conversations.iter().any(|c| c.id == id) {
            return false;
        }
        let now = Utc::now();
        self.conversations.push(ConversationRecord {
            id: id.to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
            last_message: 0,
        });
        true
    }

    fn append(&mut self, conversation_id: &str, role: Role, content: &str, metadata: Map<String, Value>) -> u64 {
        self.create(conversation_id, "");

        self.next_id += 1;
        let id = self.next_id;
        let now = Utc::now();

        self.messages.push(StoredMessage {
            id,
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            timestamp: now,
            metadata,
        });

        if let Some(record) = self.conversations.iter_mut().find(|c| c.id == conversation_id) {
            record.updated_at = now;
            record.last_message = id;
        }
        id
    }

    fn messages_of(&self, conversation_id: &str) -> Vec<StoredMessage> {
        self.messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    fn summaries(&self, limit: usize) -> Vec<ConversationSummary> {
        let mut records: Vec<&ConversationRecord> = self.conversations.iter().collect();
        records.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.last_message.cmp(&a.last_message))
        });

        records
            .into_iter()
            .take(limit)
            .map(|c| ConversationSummary {
                id: c.id.clone(),
                title: c.title.clone(),
                created_at: c.created_at,
                updated_at: c.updated_at,
                message_count: self.messages.iter().filter(|m| m.conversation_id == c.id).count(),
            })
            .collect()
    }

    fn delete(&mut self, id: &str) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        self.messages.retain(|m| m.conversation_id != id);
        self.conversations.len() != before
    }

    fn search(&self, query: &str, limit: usize) -> Vec<StoredMessage> {
        let needle = query.to_lowercase();
        self.messages
            .iter()
            .rev()
            .filter(|m| m.content.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect()
    }
}

/// In-memory store for tests and ephemeral sessions
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn create_conversation(&self, id: &str, title: &str) -> Result<()> {
        self.state.lock().await.create(id, title);
        Ok(())
    }

    async fn append_with_metadata(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        metadata: Map<String, Value>,
    ) -> Result<u64> {
        Ok(self.state.lock().await.append(conversation_id, role, content, metadata))
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        Ok(self.state.lock().await.messages_of(conversation_id))
    }

    async fn list_conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>> {
        Ok(self.state.lock().await.summaries(limit))
    }

    async fn delete_conversation(&self, id: &str) -> Result<bool> {
        Ok(self.state.lock().await.delete(id))
    }

    async fn search_messages(&self, query: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        Ok(self.state.lock().await.search(query, limit))
    }
}

/// File-based store: one JSON document rewritten after every change.
pub struct FileConversationStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl FileConversationStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| Error::Store(format!("Corrupt store {}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => return Err(e.into()),
        };
        info!("Conversation store opened at {}", path.display());

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the state. A change that returns `Some` is
    /// written to disk and only then becomes visible; on a write failure the
    /// store keeps its previous state.
    async fn commit<T>(&self, change: impl FnOnce(&mut StoreState) -> Option<T>) -> Result<Option<T>> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let Some(output) = change(&mut next) else {
            return Ok(None);
        };
        self.persist(&next).await?;
        *state = next;
        Ok(Some(output))
    }

    async fn persist(&self, state: &StoreState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&self.path, content).await?;
        debug!("Persisted {} message(s)", state.messages.len());
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn create_conversation(&self, id: &str, title: &str) -> Result<()> {
        self.commit(|state| state.create(id, title).then_some(())).await?;
        Ok(())
    }

    async fn append_with_metadata(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        metadata: Map<String, Value>,
    ) -> Result<u64> {
        let id = self
            .commit(|state| Some(state.append(conversation_id, role, content, metadata)))
            .await?;
        Ok(id.unwrap_or_default())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        Ok(self.state.lock().await.messages_of(conversation_id))
    }

    async fn list_conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>> {
        Ok(self.state.lock().await.summaries(limit))
    }

    async fn delete_conversation(&self, id: &str) -> Result<bool> {
        let deleted = self.commit(|state| state.delete(id).then_some(())).await?;
        Ok(deleted.is_some())
    }

    async fn search_messages(&self, query: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        Ok(self.state.lock().await.search(query, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_creates_conversation() {
        let store = InMemoryStore::new();

        let first = store.append_message("c1", Role::User, "Hello").await.unwrap();
        let second = store.append_message("c1", Role::Assistant, "Hi!").await.unwrap();
        assert!(second > first);

        let messages = store.list_messages("c1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].content, "Hi!");
        assert!(store.list_messages("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let store = InMemoryStore::new();
        store.create_conversation("c1", "Trip plans").await.unwrap();
        store.create_conversation("c1", "Other title").await.unwrap();

        let list = store.list_conversations(10).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "Trip plans");
        assert_eq!(list[0].message_count, 0);
    }

    #[tokio::test]
    async fn test_list_conversations_by_recent_activity() {
        let store = InMemoryStore::new();
        store.append_message("old", Role::User, "a").await.unwrap();
        store.append_message("new", Role::User, "b").await.unwrap();
        store.append_message("old", Role::User, "c").await.unwrap();

        let list = store.list_conversations(10).await.unwrap();
        let ids: Vec<&str> = list.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "new"]);
        assert_eq!(list[0].message_count, 2);

        assert_eq!(store.list_conversations(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_and_delete() {
        let store = InMemoryStore::new();
        store.append_message("c1", Role::User, "Where is Rust used?").await.unwrap();
        store.append_message("c2", Role::Assistant, "rust is everywhere").await.unwrap();
        store.append_message("c2", Role::User, "thanks").await.unwrap();

        let hits = store.search_messages("RUST", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].conversation_id, "c2");

        assert!(store.delete_conversation("c2").await.unwrap());
        assert!(!store.delete_conversation("c2").await.unwrap());
        assert_eq!(store.search_messages("rust", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data/conversations.json");

        {
            let store = FileConversationStore::open(&path).await.unwrap();
            store.create_conversation("s1", "Session").await.unwrap();
            let mut metadata = Map::new();
            metadata.insert("model".to_string(), json!("llama3.1"));
            store
                .append_with_metadata("s1", Role::User, "remember me", metadata)
                .await
                .unwrap();
        }

        let store = FileConversationStore::open(&path).await.unwrap();
        let messages = store.list_messages("s1").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].metadata["model"], "llama3.1");

        let id = store.append_message("s1", Role::Assistant, "ok").await.unwrap();
        assert_eq!(id, 2);
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("conversations.json");
        std::fs::write(&path, "not json").unwrap();

        let err = FileConversationStore::open(&path).await.err().unwrap();
        assert!(matches!(err, Error::Store(_)));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_store_unchanged() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("data");
        let path = dir.join("conversations.json");
        let store = FileConversationStore::open(&path).await.unwrap();

        // A plain file where the data directory should be makes every write fail.
        std::fs::write(&dir, "in the way").unwrap();

        assert!(store.append_message("s1", Role::User, "lost").await.is_err());
        assert!(store.list_messages("s1").await.unwrap().is_empty());
        assert!(store.list_conversations(10).await.unwrap().is_empty());

        std::fs::remove_file(&dir).unwrap();
        let id = store.append_message("s1", Role::User, "kept").await.unwrap();
        assert_eq!(id, 1);

        let reopened = FileConversationStore::open(&path).await.unwrap();
        let messages = reopened.list_messages("s1").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "kept");
    }
}
