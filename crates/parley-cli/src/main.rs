//! Parley CLI - Command line chat client for a streaming sales assistant.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use parley_client::{HttpTransport, StreamClient};
use parley_core::{Author, ConversationId, Message};
use parley_engine::{
    classify, AssistantSettings, ChatEngine, ConversationStore, EngineEvent, FilePersistence,
    SendOutcome,
};

mod config;
mod render;

use config::Config;
use render::Renderer;

/// Parley - chat with a streaming sales assistant
#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Chat with a streaming sales assistant", long_about = None)]
struct Cli {
    /// JSON settings file
    #[arg(long, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Streaming endpoint URL
    #[arg(short, long, env = "PARLEY_ENDPOINT")]
    endpoint: Option<String>,

    /// Conversation scope
    #[arg(short, long, env = "PARLEY_CONVERSATION")]
    conversation: Option<String>,

    /// Directory where conversations are stored
    #[arg(long, env = "PARLEY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log filter, e.g. `info` or `parley_client=debug`
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn overrides(&self) -> AssistantSettings {
        AssistantSettings {
            endpoint: self.endpoint.clone(),
            conversation_id: self.conversation.clone(),
            data_dir: self.data_dir.clone(),
            ..Default::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message and stream the reply
    Send {
        /// Message text
        text: String,
    },

    /// Show the stored conversation
    History {
        /// Print the raw stored JSON
        #[arg(long)]
        json: bool,
    },

    /// Reset the conversation to the welcome message
    Clear,

    /// Show the activity hint a message would produce
    Classify {
        /// Message text
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref(), cli.overrides())?;
    debug!(settings = ?config.settings, "Resolved settings");

    match cli.command {
        Commands::Send { text } => {
            send(&config.settings, &text).await?;
        }
        Commands::History { json } => {
            history(&config.settings, json)?;
        }
        Commands::Clear => {
            clear(&config.settings);
        }
        Commands::Classify { text } => {
            println!("{}", classify(&text).label());
        }
    }

    Ok(())
}

fn store(settings: &AssistantSettings) -> ConversationStore {
    let engine_config = settings.engine_config();
    let persistence = Arc::new(FilePersistence::new(settings.data_dir()));
    ConversationStore::new(persistence, &engine_config.conversation_id)
        .with_limit(engine_config.history_limit)
}

async fn send(settings: &AssistantSettings, text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let transport = HttpTransport::with_timeout(settings.endpoint(), settings.request_timeout())?;
    let client = StreamClient::new(Arc::new(transport));
    let mut engine = ChatEngine::new(client, store(settings), settings.engine_config());

    let printer = tokio::spawn(print_events(engine.subscribe()));

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, cancelling request");
                cancel.cancel();
            }
        })
    };

    let outcome = engine.send_with_cancel(text, cancel).await;
    ctrl_c.abort();

    // Closing the engine's senders lets the printer drain and exit.
    drop(engine);
    let _ = printer.await;

    match outcome? {
        SendOutcome::Completed(_) => {}
        SendOutcome::InBandError { error, .. } => {
            eprintln!("assistant error: {}", error);
        }
        SendOutcome::Fallback { failure, .. } => {
            eprintln!("(offline reply: {})", failure);
        }
        SendOutcome::Cancelled(_) => {
            eprintln!("(cancelled)");
        }
    }

    Ok(())
}

async fn print_events(mut events: mpsc::UnboundedReceiver<EngineEvent>) {
    let mut renderer = Renderer::new();
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();

    while let Some(event) = events.recv().await {
        if let Err(e) = renderer.render(&event, &mut stdout, &mut stderr) {
            warn!(error = %e, "Failed to write reply");
        }
    }

    if let Err(e) = renderer.finish(&mut stdout) {
        warn!(error = %e, "Failed to write reply");
    }
}

fn history(settings: &AssistantSettings, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let messages = store(settings).load();

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    let conversation = settings
        .conversation_id
        .clone()
        .map(ConversationId::from)
        .unwrap_or_default();
    println!("Conversation {} ({} messages):", conversation, messages.len());
    println!("{}", "-".repeat(80));
    for message in &messages {
        print_message(message);
    }

    Ok(())
}

fn print_message(message: &Message) {
    let sender = match message.author {
        Author::User => "you",
        Author::Assistant => "assistant",
    };
    println!(
        "[{}] {}: {}",
        message.created_at.format("%Y-%m-%d %H:%M:%S"),
        sender,
        message.content
    );
}

fn clear(settings: &AssistantSettings) {
    store(settings).clear();
    println!("Conversation cleared.");
}
