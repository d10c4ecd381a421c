//! Montybot - chat bot core bridging a messaging platform to hosted LLMs
//!
//! Conversation histories are persisted per (user, conversation) pair in
//! redis (with an in-memory fallback when redis is unreachable at startup),
//! completions go through an OpenRouter-compatible endpoint, and an
//! allow-list gates every conversation action. Platform transports (Telegram
//! in the reference deployment, the bundled CLI here) live outside the core
//! and talk to the [`Bot`] facade.

pub mod api;
pub mod cli;
mod config;
pub mod core;
pub mod gate;
pub mod keys;
pub mod session;
pub mod storage;
pub mod utils;

pub use api::{Bot, Gated, NewConversation};
pub use config::{BotConfig, HistoryConfig, LlmConfig, LoggingConfig, RedisConfig, Settings};
pub use core::llm::{
    ChatMessage, CompletionApiError, CompletionClient, ContentPart, MessageContent, Role,
};
pub use gate::AccessGate;
pub use keys::{KeySpace, DEFAULT_CONV_ID};
pub use session::Conversation;
pub use storage::KeyValueStore;
