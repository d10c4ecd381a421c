//! Bot facade
//!
//! This module is the boundary a transport adapter talks to: it wires the
//! store, key naming, access gate, and completion client together and
//! exposes the gated per-message operations. Everything is explicitly
//! constructed and passed in; there are no process-wide singletons, so tests
//! substitute fakes through `with_store`.

use crate::config::Settings;
use crate::core::llm::{ChatMessage, CompletionClient, MessageContent, Role, WireLog};
use crate::gate::AccessGate;
use crate::keys::{KeySpace, DEFAULT_CONV_ID};
use crate::session::Conversation;
use crate::storage::{self, KeyValueStore};
use anyhow::Result;
use chrono::Local;
use std::sync::Arc;

/// Result of a gated operation. `Denied` is a no-op from the core's
/// perspective; how (or whether) to tell the user is the adapter's business.
#[derive(Debug, Clone, PartialEq)]
pub enum Gated<T> {
    Allowed(T),
    Denied,
}

impl<T> Gated<T> {
    pub fn is_denied(&self) -> bool {
        matches!(self, Gated::Denied)
    }
}

/// A freshly started conversation thread.
#[derive(Debug, Clone, PartialEq)]
pub struct NewConversation {
    pub conv_id: String,
    pub greeting: String,
}

pub struct Bot {
    settings: Settings,
    store: Arc<dyn KeyValueStore>,
    keyspace: KeySpace,
    gate: AccessGate,
    llm: CompletionClient,
}

impl Bot {
    /// Construct against the configured redis instance, substituting the
    /// in-memory fallback when it is unreachable.
    pub async fn connect(settings: Settings, api_key: String) -> Result<Self> {
        let store = storage::connect(&settings.redis).await;
        Self::with_store(settings, api_key, store)
    }

    /// Construct with an explicit store.
    pub fn with_store(
        settings: Settings,
        api_key: String,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let keyspace = KeySpace::new(settings.bot.name.clone());
        let gate = AccessGate::new(store.clone(), keyspace.clone());

        let mut llm = CompletionClient::new(api_key, settings.llm.clone());
        if settings.logging.log_requests {
            llm = llm.with_wire_log(WireLog::create("logs")?);
        }

        Ok(Self {
            settings,
            store,
            keyspace,
            gate,
            llm,
        })
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    /// Handle a plain text turn: load the history, append the user message,
    /// ask the model, append and persist the reply. Completion failures
    /// propagate unchanged; rendering an apology is the adapter's job.
    pub async fn handle_text(
        &self,
        user_id: i64,
        conv_id: Option<&str>,
        text: &str,
    ) -> Result<Gated<String>> {
        if !self.gate.is_allowed(user_id).await? {
            tracing::info!("[Bot] Denied text message from user {}", user_id);
            return Ok(Gated::Denied);
        }

        let mut conversation = self.conversation(user_id, conv_id).await?;
        conversation.append(Role::User, text).await?;

        let reply = self.llm.chat(conversation.messages(), None, None).await?;
        conversation.append(Role::Assistant, reply.clone()).await?;

        Ok(Gated::Allowed(reply))
    }

    /// Handle an image turn: the adapter has already turned the platform
    /// upload into a publicly fetchable URL and a caption.
    pub async fn handle_image(
        &self,
        user_id: i64,
        conv_id: Option<&str>,
        caption: &str,
        image_url: &str,
    ) -> Result<Gated<String>> {
        if !self.gate.is_allowed(user_id).await? {
            tracing::info!("[Bot] Denied image message from user {}", user_id);
            return Ok(Gated::Denied);
        }

        let mut conversation = self.conversation(user_id, conv_id).await?;
        conversation
            .append(Role::User, MessageContent::image(caption, image_url))
            .await?;

        let reply = self.llm.chat(conversation.messages(), None, None).await?;
        conversation.append(Role::Assistant, reply.clone()).await?;

        Ok(Gated::Allowed(reply))
    }

    /// Mint a fresh conversation thread for a user and build their greeting.
    /// The history record materializes in the store on the first append.
    pub async fn start_conversation(
        &self,
        user_id: i64,
        username: &str,
    ) -> Result<Gated<NewConversation>> {
        if !self.gate.is_allowed(user_id).await? {
            tracing::info!("[Bot] Denied /start from user {}", user_id);
            return Ok(Gated::Denied);
        }

        let conv_id = new_conversation_id();
        tracing::info!(
            "[Bot] Started conversation '{}' for user {}",
            conv_id,
            user_id
        );

        Ok(Gated::Allowed(NewConversation {
            conv_id,
            greeting: self.settings.bot.greeting_for(username),
        }))
    }

    /// Reset a conversation to its initial single-system-message state.
    pub async fn reset(&self, user_id: i64, conv_id: Option<&str>) -> Result<Gated<()>> {
        if !self.gate.is_allowed(user_id).await? {
            tracing::info!("[Bot] Denied reset from user {}", user_id);
            return Ok(Gated::Denied);
        }

        let mut conversation = self.conversation(user_id, conv_id).await?;
        conversation.reset().await?;
        Ok(Gated::Allowed(()))
    }

    /// Read a conversation history without modifying it.
    pub async fn history(
        &self,
        user_id: i64,
        conv_id: Option<&str>,
    ) -> Result<Gated<Vec<ChatMessage>>> {
        if !self.gate.is_allowed(user_id).await? {
            return Ok(Gated::Denied);
        }

        let conversation = self.conversation(user_id, conv_id).await?;
        Ok(Gated::Allowed(conversation.messages().to_vec()))
    }

    async fn conversation(&self, user_id: i64, conv_id: Option<&str>) -> Result<Conversation> {
        Conversation::load(
            self.store.clone(),
            &self.keyspace,
            user_id,
            conv_id.unwrap_or(DEFAULT_CONV_ID),
            self.settings.history.ttl_seconds,
        )
        .await
    }
}

/// Timestamp-derived conversation id, unique to the second, with no key
/// delimiter characters.
fn new_conversation_id() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}
