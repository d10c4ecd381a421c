//! Conversation sessions.
//!
//! A `Conversation` is constructed fresh for every inbound message; the
//! serialized record in the store is the only durable state. Each mutation
//! persists the full history with a sliding TTL, so a conversation expires
//! after the retention window of inactivity.
//!
//! Writes are last-write-wins over the whole history: concurrent appends to
//! the same (user, conversation) pair can lose turns. Known gap.

use crate::core::llm::{ChatMessage, MessageContent, Role};
use crate::keys::KeySpace;
use crate::storage::{self, KeyValueStore};
use anyhow::Result;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Default system prompt, loaded once per process from `system_prompt.md`
/// (path overridable via `SYSTEM_PROMPT_PATH`). Immutable after load.
static DEFAULT_SYSTEM_PROMPT: Lazy<String> = Lazy::new(|| {
    let path = std::env::var("SYSTEM_PROMPT_PATH")
        .unwrap_or_else(|_| "system_prompt.md".to_string());

    match std::fs::read_to_string(&path) {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            tracing::warn!(
                "[Session] Could not read system prompt from '{}' ({}), using built-in default",
                path,
                e
            );
            "You are a helpful assistant.".to_string()
        }
    }
});

pub fn default_system_prompt() -> &'static str {
    &DEFAULT_SYSTEM_PROMPT
}

fn initial_history() -> Vec<ChatMessage> {
    vec![ChatMessage::text(Role::System, default_system_prompt())]
}

/// Chat history for one (user, conversation) pair.
pub struct Conversation {
    key: String,
    messages: Vec<ChatMessage>,
    store: Arc<dyn KeyValueStore>,
    ttl_seconds: u64,
}

impl Conversation {
    /// Load the persisted history, or start a fresh one when the record is
    /// absent or undecodable. Store transport failures propagate to the
    /// caller: losing a session must be visible, never silently recovered.
    pub async fn load(
        store: Arc<dyn KeyValueStore>,
        keyspace: &KeySpace,
        user_id: i64,
        conv_id: &str,
        ttl_seconds: u64,
    ) -> Result<Self> {
        let key = keyspace.history(user_id, conv_id);
        let messages = storage::get_json::<Vec<ChatMessage>>(store.as_ref(), &key)
            .await?
            .unwrap_or_else(initial_history);

        tracing::debug!(
            "[Session] Loaded {} messages for '{}'",
            messages.len(),
            key
        );

        Ok(Self {
            key,
            messages,
            store,
            ttl_seconds,
        })
    }

    /// Append a turn and persist the updated history. Durability is exactly
    /// "persisted once this returns"; a crash in between loses the turn.
    pub async fn append(&mut self, role: Role, content: impl Into<MessageContent>) -> Result<()> {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
        });
        self.persist().await
    }

    /// Discard the history and reinitialize to the single system message.
    pub async fn reset(&mut self) -> Result<()> {
        self.messages = initial_history();
        self.persist().await
    }

    /// Current in-memory history; does not re-fetch from the store.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    async fn persist(&self) -> Result<()> {
        storage::set_json(
            self.store.as_ref(),
            &self.key,
            &self.messages,
            Some(self.ttl_seconds),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const TTL: u64 = 86400;

    fn keyspace() -> KeySpace {
        KeySpace::new("monty")
    }

    async fn load(store: Arc<dyn KeyValueStore>, user_id: i64, conv_id: &str) -> Conversation {
        Conversation::load(store, &keyspace(), user_id, conv_id, TTL)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn fresh_conversation_starts_with_system_prompt() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let conv = load(store, 42, "default").await;

        assert_eq!(conv.messages().len(), 1);
        assert_eq!(conv.messages()[0].role, Role::System);
        assert_eq!(
            conv.messages()[0].content.as_text(),
            Some(default_system_prompt())
        );
    }

    #[tokio::test]
    async fn append_persists_and_reloads() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());

        let mut conv = load(store.clone(), 42, "default").await;
        let before = conv.messages().len();
        conv.append(Role::User, "hello").await.unwrap();

        // Simulate the next inbound message constructing a new instance.
        let reloaded = load(store, 42, "default").await;
        assert_eq!(reloaded.messages().len(), before + 1);

        let last = reloaded.messages().last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content.as_text(), Some("hello"));
    }

    #[tokio::test]
    async fn reset_returns_to_single_system_message() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());

        let mut conv = load(store.clone(), 42, "default").await;
        conv.append(Role::User, "one").await.unwrap();
        conv.append(Role::Assistant, "two").await.unwrap();
        conv.reset().await.unwrap();

        assert_eq!(conv.messages().len(), 1);
        assert_eq!(conv.messages()[0].role, Role::System);

        let reloaded = load(store, 42, "default").await;
        assert_eq!(reloaded.messages().len(), 1);
    }

    #[tokio::test]
    async fn undecodable_record_degrades_to_fresh_history() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        store
            .set("monty.42.default", "{corrupt", None)
            .await
            .unwrap();

        let conv = load(store, 42, "default").await;
        assert_eq!(conv.messages().len(), 1);
        assert_eq!(conv.messages()[0].role, Role::System);
    }

    #[tokio::test]
    async fn conversations_are_isolated_by_conv_id() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());

        let mut a = load(store.clone(), 42, "default").await;
        a.append(Role::User, "in a").await.unwrap();

        let b = load(store, 42, "20250101_120000").await;
        assert_eq!(b.messages().len(), 1);
    }

    /// Store wrapper that records the TTL passed to each write.
    struct TtlProbe {
        inner: InMemoryStore,
        ttls: Mutex<Vec<Option<u64>>>,
    }

    #[async_trait]
    impl KeyValueStore for TtlProbe {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<()> {
            self.ttls.lock().unwrap().push(ttl);
            self.inner.set(key, value, ttl).await
        }

        async fn exists(&self, key: &str) -> Result<bool> {
            self.inner.exists(key).await
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn every_persist_carries_the_sliding_ttl() {
        let probe = Arc::new(TtlProbe {
            inner: InMemoryStore::new(),
            ttls: Mutex::new(Vec::new()),
        });
        let store: Arc<dyn KeyValueStore> = probe.clone();

        let mut conv = load(store, 42, "default").await;
        conv.append(Role::User, "hello").await.unwrap();
        conv.append(Role::Assistant, "hi").await.unwrap();
        conv.reset().await.unwrap();

        let ttls = probe.ttls.lock().unwrap();
        assert_eq!(ttls.as_slice(), &[Some(TTL), Some(TTL), Some(TTL)]);
    }
}
