//! Coral terminal client

mod cli;
mod render;

use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use coral_core::chat::{drive, BotState, ChatStore, MessageAction, StreamCancellation, StreamEvent};
use coral_core::{ChatClient, ChatRequest, CoralConfig, StreamError};

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    configure_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Chat {
            message,
            conversation,
            tools,
            file_ids,
            json,
        } => {
            let client = build_client(cli.config.as_deref())?;
            run_chat(&client, message, conversation, tools, file_ids, json).await
        }
        Command::Show { conversation } => {
            let client = build_client(cli.config.as_deref())?;
            run_show(&client, &conversation).await
        }
        Command::Table { file, tsv } => run_table(file.as_deref(), if tsv { '\t' } else { ',' }),
    }
}

fn build_client(config_path: Option<&Path>) -> Result<ChatClient> {
    let config = CoralConfig::load(config_path)?;
    ChatClient::from_config(config).context("Failed to build HTTP client")
}

fn configure_logging() {
    let filter = EnvFilter::try_from_env("CORAL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_chat(
    client: &ChatClient,
    message: String,
    conversation: Option<String>,
    tools: Vec<String>,
    file_ids: Vec<String>,
    json: bool,
) -> Result<()> {
    let mut store = ChatStore::new();
    store.reset(conversation.clone());
    store.dispatch(MessageAction::Send {
        text: message.clone(),
        file_ids: file_ids.clone(),
    });

    let mut request = ChatRequest::new(message)
        .conversation(conversation)
        .tools(tools)
        .file_ids(file_ids);
    request.model = client.config().model.clone();
    request.deployment = client.config().deployment.clone();

    let cancellation = StreamCancellation::new();
    let on_interrupt = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping stream");
            on_interrupt.cancel();
        }
    });

    let mut events = client
        .stream_chat(&request, cancellation.begin())
        .await
        .context("Chat request failed")?;

    let mut output = ChatOutput::new(std::io::stdout(), cancellation.clone());
    let result = drive(&mut events, &mut store, |event, store| {
        let line = match event {
            StreamEvent::TextGeneration { text } => Some(text.clone()),
            StreamEvent::ToolCallsGeneration { .. }
            | StreamEvent::SearchQueriesGeneration { .. }
            | StreamEvent::ToolInput { .. }
            | StreamEvent::ToolResult { .. } => store
                .pending()
                .and_then(|bot| bot.tool_events.last())
                .map(|step| format!("{}\n", render::render_tool_event(step))),
            _ => None,
        };
        if let Some(line) = line {
            output.emit(&line);
        }
    })
    .await;

    if let Some(e) = output.error {
        return Err(e).context("Failed to write chat output");
    }
    println!();

    match result {
        Ok(()) | Err(StreamError::Aborted) => {}
        Err(e) => warn!("Stream failed: {}", e),
    }

    if json {
        println!("{}", serde_json::to_string_pretty(store.conversation())?);
        return Ok(());
    }

    let Some(bot) = store.last_bot() else {
        return Ok(());
    };
    match bot.state {
        BotState::Fulfilled => {
            // Text was streamed already; show where it came from
            let rendered = render::render_bot(bot, store.citations());
            if let Some((_, sources)) = rendered.split_once("\n\nSources:") {
                println!("Sources:{}", sources);
            }
            if let Some(id) = &store.conversation().id {
                eprintln!("conversation: {}", id);
            }
            Ok(())
        }
        BotState::Aborted => {
            eprintln!("[stopped]");
            Ok(())
        }
        _ => anyhow::bail!(
            "{}",
            bot.error.clone().unwrap_or_else(|| "response failed".to_string())
        ),
    }
}

/// Streamed chat output. The first failed write stops the exchange, since
/// nobody is reading anymore.
struct ChatOutput<W> {
    out: W,
    cancellation: StreamCancellation,
    error: Option<std::io::Error>,
}

impl<W: Write> ChatOutput<W> {
    fn new(out: W, cancellation: StreamCancellation) -> Self {
        Self {
            out,
            cancellation,
            error: None,
        }
    }

    fn emit(&mut self, text: &str) {
        if self.error.is_some() {
            return;
        }
        let written = self
            .out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush());
        if let Err(e) = written {
            warn!("Failed to write chat output: {}", e);
            self.cancellation.cancel();
            self.error = Some(e);
        }
    }
}

async fn run_show(client: &ChatClient, conversation: &str) -> Result<()> {
    let record = client
        .get_conversation(conversation)
        .await
        .with_context(|| format!("Failed to load conversation {}", conversation))?;

    let mut store = ChatStore::new();
    store.hydrate(&record);

    if !record.title.is_empty() {
        println!("# {}\n", record.title);
    }
    println!(
        "{}",
        render::render_conversation(store.messages(), store.citations())
    );
    Ok(())
}

fn run_table(file: Option<&Path>, delimiter: char) -> Result<()> {
    let markdown = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read stdin")?;
            input
        }
    };

    let tables = render::render_tables(&markdown, delimiter);
    if tables.is_empty() {
        warn!("No well-formed markdown table found");
        eprintln!("no table to export");
        return Ok(());
    }
    for (n, table) in tables.iter().enumerate() {
        if n > 0 {
            println!();
        }
        print!("{}", table);
    }
    Ok(())
}
