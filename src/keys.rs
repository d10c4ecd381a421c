//! Storage key derivation.
//!
//! Keys are `.`-joined and scoped by the bot name so several bots can share
//! one redis database. Derivation is pure and injective as long as `conv_id`
//! never contains the delimiter; the ids this system produces never do.

/// Conversation id used when the adapter does not supply one.
pub const DEFAULT_CONV_ID: &str = "default";

#[derive(Debug, Clone)]
pub struct KeySpace {
    bot_name: String,
}

impl KeySpace {
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
        }
    }

    /// Allow-list entry for a user: `{bot}.{user_id}`.
    pub fn allowlist(&self, user_id: i64) -> String {
        format!("{}.{}", self.bot_name, user_id)
    }

    /// History record for a conversation: `{bot}.{user_id}.{conv_id}`.
    pub fn history(&self, user_id: i64, conv_id: &str) -> String {
        debug_assert!(
            !conv_id.contains('.'),
            "conv_id must not contain the key delimiter"
        );
        format!("{}.{}.{}", self.bot_name, user_id, conv_id)
    }
}
