use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

mod app;
mod completion;
mod config;
mod handler;
mod logging;
mod markdown;
mod models;
mod session;
mod state;
mod tui;
mod ui;

use app::App;
use completion::OpenAICompatClient;
use config::Config;
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "gemini-chat")]
#[command(version, about = "Chat with Gemini models from the terminal")]
struct Cli {
    /// Model to start with, by id (e.g. models/gemini-2.5-flash) or 1-based index
    #[arg(short, long)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available models
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Models) => {
            list_models();
            Ok(())
        }
        None => {
            let model_index = resolve_model(cli.model.as_deref())?;
            let _log_guard = logging::init();
            run_chat(model_index).await
        }
    }
}

fn resolve_model(requested: Option<&str>) -> Result<usize> {
    let Some(key) = requested else {
        return Ok(0);
    };
    models::find(key).ok_or_else(|| {
        let valid: Vec<&str> = models::all().iter().map(|m| m.id).collect();
        anyhow!("Unknown model '{}'. Valid models: {}", key, valid.join(", "))
    })
}

fn list_models() {
    for (i, model) in models::all().iter().enumerate() {
        let default_marker = if i == 0 { " (default)" } else { "" };
        println!("{}. {:<38} {}{}", i + 1, model.id, model.name, default_marker);
    }
}

async fn run_chat(model_index: usize) -> Result<()> {
    let config = Config::from_env();
    match config.api_key_source {
        Some(source) => info!(source, base_url = %config.base_url, "API key loaded"),
        None => warn!("No API key set; requests will fail until API_KEY or GEMINI_API_KEY is provided"),
    }
    let service = Arc::new(OpenAICompatClient::from_config(&config));

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let mut app = App::new(service, events.sender(), model_index);
    info!(model = app.session.model().id, "Chat session started");

    let result = event_loop(&mut terminal, &mut app, &mut events).await;

    // Restore the terminal before surfacing any loop error
    tui::restore()?;
    info!(messages = app.session.transcript().len(), "Chat session ended");
    result
}

async fn event_loop(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event),
            None => break,
        }
    }
    Ok(())
}
