use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

use boardchat::agent::{ChatTurn, EchoAgent, run_turn};
use boardchat::config::{Config, load_config};
use boardchat::conversation::{ConversationOptions, ConversationStore};
use boardchat::session::SessionStore;

#[derive(Parser)]
#[command(name = "boardchat")]
#[command(about = "boardchat - workspace chat assistant session manager")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a JSON config file (default: ~/.boardchat/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Display version information
    Version,
    /// Print the effective configuration as JSON
    Config,
    /// Chat locally over stdin, one question per line
    Chat {
        /// User id owning the session
        #[arg(long, default_value = "local")]
        user: String,
        /// Channels the assistant may search
        #[arg(long = "channel", default_value = "general")]
        channels: Vec<String>,
        /// Token budget for the context handed to the agent
        #[arg(long)]
        max_tokens: Option<usize>,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Version) => {
            print_version();
            Ok(())
        }
        Some(Commands::Config) => {
            let config = load_config(cli.config)?;
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
            Ok(())
        }
        Some(Commands::Chat {
            user,
            channels,
            max_tokens,
        }) => {
            let config = load_config(cli.config)?;
            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            runtime.block_on(chat(config, user, channels, max_tokens))
        }
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

async fn chat(
    config: Config,
    user: String,
    channels: Vec<String>,
    max_tokens: Option<usize>,
) -> Result<()> {
    let sessions = SessionStore::new(config.session_store_config());
    let conversations = ConversationStore::new(config.conversation_store_config());
    sessions.initialize().await;
    conversations.initialize().await;

    let max_tokens = max_tokens.unwrap_or(config.memory_max_tokens);
    let session_id = format!("cli_{}", user);
    let mut conversation = conversations
        .create(channels.iter().cloned(), ConversationOptions::default())
        .await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                sessions.clear(&session_id).await;
                conversation = conversations
                    .create(channels.iter().cloned(), ConversationOptions::default())
                    .await;
                println!("(session reset)");
                continue;
            }
            "/stats" => {
                let stats = serde_json::json!({
                    "sessions": sessions.stats().await,
                    "conversations": conversations.stats().await,
                });
                println!("{}", serde_json::to_string_pretty(&stats)?);
                continue;
            }
            _ => {}
        }

        let outcome = run_turn(
            &sessions,
            &conversations,
            &EchoAgent,
            ChatTurn {
                session_id: &session_id,
                user_id: Some(user.as_str()),
                channels: &channels,
                conversation_id: &conversation.id,
                input,
                max_tokens,
            },
        )
        .await?;
        println!("{}", outcome.reply.content);
    }

    let message_count = conversations
        .get(&conversation.id)
        .await
        .map(|c| c.messages.len())
        .unwrap_or(0);
    println!("{} messages in conversation", message_count);

    sessions.dispose().await;
    conversations.dispose().await;
    Ok(())
}

fn print_version() {
    println!("boardchat {}", env!("CARGO_PKG_VERSION"));
}
