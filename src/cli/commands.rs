use crate::keys::DEFAULT_CONV_ID;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "montybot")]
#[command(author, version, about = "Chat bot core with redis-backed conversation sessions", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a single message as a user and print the reply
    Chat {
        user_id: i64,

        message: String,

        /// Conversation id to append to
        #[arg(long, default_value = DEFAULT_CONV_ID)]
        conv_id: String,
    },

    /// Start an interactive chat session
    Interactive {
        user_id: i64,

        /// Conversation id to resume
        #[arg(long, default_value = DEFAULT_CONV_ID)]
        conv_id: String,

        /// Mint a fresh conversation thread instead of resuming
        #[arg(short, long)]
        fresh: bool,
    },

    /// Add a user to the allow-list
    Allow { user_id: i64 },

    /// Remove a user from the allow-list
    Revoke { user_id: i64 },

    /// Reset a conversation to its initial state
    Reset {
        user_id: i64,

        #[arg(long, default_value = DEFAULT_CONV_ID)]
        conv_id: String,
    },

    /// Print a stored conversation history
    Show {
        user_id: i64,

        #[arg(long, default_value = DEFAULT_CONV_ID)]
        conv_id: String,
    },
}
