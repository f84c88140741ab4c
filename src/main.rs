use std::sync::Arc;

use anyhow::{Context, Result};
use nexus_core::{
    Config, ControllerOptions, ConversationController, GeminiClient, JsonFileStore,
};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_logging()?;

    let config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "falling back to default config");
        Config::new()
    });

    let api_key = config.resolved_api_key()?;
    let client = Arc::new(GeminiClient::with_endpoint(&config.resolved_endpoint(), &api_key));
    let store = Arc::new(JsonFileStore::new(config.resolved_history_path()?));
    info!(history = %store.path().display(), endpoint = %client.endpoint(), "starting");

    let options = ControllerOptions {
        max_input_chars: config.resolved_max_input_chars(),
    };
    let controller = Arc::new(ConversationController::new(client, store, options).await);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, controller.clone()).await;
    tui::restore()?;

    // Let the last history write land before exiting
    controller.flushed().await;
    info!("stopped");

    result
}

async fn run(terminal: &mut Tui, controller: Arc<ConversationController>) -> Result<()> {
    let mut events = EventHandler::new(controller.subscribe());
    let mut app = App::new(controller);

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(&mut app, event).await?,
            None => break,
        }
    }

    Ok(())
}

/// The terminal belongs to the UI, so logs go to `<data dir>/dev-nexus/nexus.log`
fn init_logging() -> Result<WorkerGuard> {
    let log_dir = Config::data_dir()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("could not create {}", log_dir.display()))?;

    let appender = tracing_appender::rolling::never(&log_dir, "nexus.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}
