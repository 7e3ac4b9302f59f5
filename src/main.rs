//! Chat engine REPL
//!
//! Reads lines from stdin and streams replies to stdout. Lines starting
//! with `/` are commands, see [`HELP`].

use chat_engine::catalog::ModelKind;
use chat_engine::settings::{InMemorySettings, JsonFileSettings, SettingsStore};
use chat_engine::transport::{HttpTransport, LoggingTransport};
use chat_engine::{EngineConfig, MessageId, Session, SessionEvent};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "\
/models               list known models
/model <id>           select a model for this session
/default <id>         select and save as the default model
/edit <id> <text>     replace a user message and regenerate its reply
/undo, /redo          step through history
/clear                drop all messages
/quit                 exit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_engine=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = EngineConfig::from_env();
    let settings_store: Arc<dyn SettingsStore> = match &config.settings_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Using settings file");
            Arc::new(JsonFileSettings::new(path.clone()))
        }
        None => Arc::new(InMemorySettings::default()),
    };
    let transport = LoggingTransport::new(Arc::new(HttpTransport::new(config.request_timeout)?));

    let mut session = Session::builder(Arc::new(transport), settings_store)
        .config(config)
        .build()?;

    let events = BroadcastStream::new(session.subscribe());
    tokio::spawn(async move {
        tokio::pin!(events);
        while let Some(event) = events.next().await {
            match event {
                Ok(SessionEvent::ContentDelta { .. }) => {}
                Ok(event) => tracing::debug!(?event, "Session event"),
                Err(e) => tracing::warn!(error = %e, "Event logger fell behind"),
            }
        }
    });

    let cancel = session.cancel_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !cancel.cancel() {
                std::process::exit(130);
            }
        }
    });

    if session.current_model().is_none() {
        println!("No model selected. Use /models and /model <id>.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('/') {
            if !run_command(&mut session, line).await {
                break;
            }
            continue;
        }
        print_reply(session.reply(line, print_delta).await);
    }

    Ok(())
}

/// Returns `false` when the REPL should exit
async fn run_command(session: &mut Session, line: &str) -> bool {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match command {
        "/quit" => return false,
        "/undo" => report(session.undo(), "undone", "nothing to undo"),
        "/redo" => report(session.redo(), "redone", "nothing to redo"),
        "/clear" => session.clear_messages(),
        "/models" => {
            for model in session.catalog().models() {
                let kind = match model.kind {
                    ModelKind::Text => "",
                    ModelKind::Image => " (image)",
                };
                let marker = if session.current_model() == Some(model.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {} [{}] {}{kind}", model.id, model.provider_id, model.name);
            }
        }
        "/model" => {
            if let Err(e) = session.set_current_model(rest) {
                println!("{e}");
            }
        }
        "/default" => {
            let result = session
                .set_current_model(rest)
                .and_then(|()| session.save_default_model(rest));
            if let Err(e) = result {
                println!("{e}");
            }
        }
        "/edit" => {
            let Some((id, text)) = rest.split_once(' ') else {
                println!("usage: /edit <id> <text>");
                return true;
            };
            match id.parse::<u64>() {
                Ok(id) => print_reply(session.save_edit(MessageId(id), text, print_delta).await),
                Err(_) => println!("not a message id: {id}"),
            }
        }
        _ => println!("{HELP}"),
    }
    true
}

fn report(done: bool, yes: &str, no: &str) {
    println!("{}", if done { yes } else { no });
}

fn print_delta(delta: &str) {
    print!("{delta}");
    let _ = std::io::stdout().flush();
}

fn print_reply(result: Result<chat_engine::Message, chat_engine::SessionError>) {
    match result {
        Ok(message) => println!("\n[{}]", message.id),
        Err(e) => {
            if let Some(text) = e.user_message() {
                println!("\n{text}");
            }
            if let Some(id) = e.message_id() {
                println!("[{id}]");
            }
        }
    }
}
