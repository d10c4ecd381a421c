use anyhow::Result;
use clap::Parser;
use montybot::cli::{Cli, Commands};
use montybot::{
    storage, utils, AccessGate, Bot, CompletionApiError, Conversation, Gated, KeySpace,
    MessageContent, Settings,
};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::new()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.clone())),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Chat {
            user_id,
            message,
            conv_id,
        } => handle_chat(settings, user_id, &conv_id, &message).await,
        Commands::Interactive {
            user_id,
            conv_id,
            fresh,
        } => handle_interactive(settings, user_id, conv_id, fresh).await,
        Commands::Allow { user_id } => handle_allow(settings, user_id).await,
        Commands::Revoke { user_id } => handle_revoke(settings, user_id).await,
        Commands::Reset { user_id, conv_id } => handle_reset(settings, user_id, &conv_id).await,
        Commands::Show { user_id, conv_id } => handle_show(settings, user_id, &conv_id).await,
    }
}

async fn handle_chat(settings: Settings, user_id: i64, conv_id: &str, message: &str) -> Result<()> {
    let bot = Bot::connect(settings, Settings::api_key()?).await?;

    match bot.handle_text(user_id, Some(conv_id), message).await {
        Ok(Gated::Allowed(reply)) => println!("\n{}", reply),
        Ok(Gated::Denied) => print_denied(user_id),
        Err(e) => render_failure(&e),
    }
    Ok(())
}

async fn handle_interactive(
    settings: Settings,
    user_id: i64,
    mut conv_id: String,
    fresh: bool,
) -> Result<()> {
    let bot = Bot::connect(settings, Settings::api_key()?).await?;

    utils::print_header("Interactive Mode");

    if fresh {
        match bot
            .start_conversation(user_id, &format!("user {}", user_id))
            .await?
        {
            Gated::Allowed(started) => {
                conv_id = started.conv_id;
                utils::print_success(&started.greeting);
            }
            Gated::Denied => {
                print_denied(user_id);
                return Ok(());
            }
        }
    }

    utils::print_info(&format!("User {} on conversation '{}'", user_id, conv_id));
    utils::print_info("Type your messages (Ctrl+C to exit)\n");

    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin);

    loop {
        utils::print_prompt("You: ");
        let mut input = String::new();
        if reader.read_line(&mut input).await? == 0 {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if input == "/help" {
            println!("Special commands:");
            println!("  /new      - Start a fresh conversation thread");
            println!("  /reset    - Reset the current conversation");
            println!("  /history  - Show the current conversation");
            println!("  /help     - Show this help");
            println!("  Ctrl+C    - Exit\n");
            continue;
        }

        if input == "/new" {
            match bot
                .start_conversation(user_id, &format!("user {}", user_id))
                .await?
            {
                Gated::Allowed(started) => {
                    conv_id = started.conv_id;
                    utils::print_success(&format!("Started fresh conversation '{}'\n", conv_id));
                }
                Gated::Denied => {
                    print_denied(user_id);
                    return Ok(());
                }
            }
            continue;
        }

        if input == "/reset" {
            match bot.reset(user_id, Some(&conv_id)).await {
                Ok(Gated::Allowed(())) => utils::print_success("Conversation reset\n"),
                Ok(Gated::Denied) => {
                    print_denied(user_id);
                    return Ok(());
                }
                Err(e) => render_failure(&e),
            }
            continue;
        }

        if input == "/history" {
            match bot.history(user_id, Some(&conv_id)).await {
                Ok(Gated::Allowed(messages)) => {
                    for message in &messages {
                        print_message(&message.role.to_string(), &message.content);
                    }
                    println!();
                }
                Ok(Gated::Denied) => {
                    print_denied(user_id);
                    return Ok(());
                }
                Err(e) => render_failure(&e),
            }
            continue;
        }

        utils::print_info("Assistant: ");
        match bot.handle_text(user_id, Some(&conv_id), input).await {
            Ok(Gated::Allowed(reply)) => println!("{}\n", reply),
            Ok(Gated::Denied) => {
                print_denied(user_id);
                return Ok(());
            }
            Err(e) => render_failure(&e),
        }
    }

    Ok(())
}

async fn handle_allow(settings: Settings, user_id: i64) -> Result<()> {
    let store = storage::connect(&settings.redis).await;
    let gate = AccessGate::new(store, KeySpace::new(settings.bot.name.clone()));

    gate.allow(user_id).await?;
    utils::print_success(&format!("User {} added to the allow-list", user_id));
    Ok(())
}

async fn handle_revoke(settings: Settings, user_id: i64) -> Result<()> {
    let store = storage::connect(&settings.redis).await;
    let gate = AccessGate::new(store, KeySpace::new(settings.bot.name.clone()));

    gate.revoke(user_id).await?;
    utils::print_success(&format!("User {} removed from the allow-list", user_id));
    Ok(())
}

async fn handle_reset(settings: Settings, user_id: i64, conv_id: &str) -> Result<()> {
    let store = storage::connect(&settings.redis).await;
    let keyspace = KeySpace::new(settings.bot.name.clone());
    let mut conversation = Conversation::load(
        store,
        &keyspace,
        user_id,
        conv_id,
        settings.history.ttl_seconds,
    )
    .await?;

    conversation.reset().await?;
    utils::print_success(&format!(
        "Conversation '{}' for user {} reset",
        conv_id, user_id
    ));
    Ok(())
}

async fn handle_show(settings: Settings, user_id: i64, conv_id: &str) -> Result<()> {
    let store = storage::connect(&settings.redis).await;
    let keyspace = KeySpace::new(settings.bot.name.clone());
    let conversation = Conversation::load(
        store,
        &keyspace,
        user_id,
        conv_id,
        settings.history.ttl_seconds,
    )
    .await?;

    utils::print_header(&format!("User {} / conversation '{}'", user_id, conv_id));
    for message in conversation.messages() {
        print_message(&message.role.to_string(), &message.content);
    }
    Ok(())
}

fn print_message(role: &str, content: &MessageContent) {
    match content {
        MessageContent::Text(text) => println!("{}: {}", role, text),
        MessageContent::Parts(parts) => {
            println!("{}: [structured content, {} parts]", role, parts.len())
        }
    }
}

fn print_denied(user_id: i64) {
    utils::print_error(&format!(
        "Sorry, you are not authorised to use this bot. (user_id={})",
        user_id
    ));
}

/// User-facing failure rendering. Details go to the log only; nothing
/// internal (keys, tokens, backtraces) is shown to the end user.
fn render_failure(e: &anyhow::Error) {
    tracing::error!("Handler error: {:#}", e);

    let model_error = e.chain().any(|cause| {
        cause.downcast_ref::<CompletionApiError>().is_some()
            || cause.downcast_ref::<reqwest::Error>().is_some()
    });

    if model_error {
        utils::print_error("Sorry, there was an error talking to the language model.");
    } else {
        utils::print_error("An internal error occurred.");
    }
}
