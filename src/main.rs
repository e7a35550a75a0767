use anyhow::Result;
use clap::Parser;
use llamachat_core::Config;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod handler;
mod markdown;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "llamachat")]
#[command(about = "Chat with a local Ollama model in the terminal", version)]
struct Cli {
    /// Ollama server URL
    #[arg(long)]
    host: Option<String>,
    /// Model to chat with
    #[arg(short, long)]
    model: Option<String>,
    /// Sampling temperature
    #[arg(short, long)]
    temperature: Option<f32>,
    /// Start with an empty conversation
    #[arg(long)]
    no_greeting: bool,
    /// Write debug logs to the config directory
    #[arg(long)]
    debug: bool,
}

/// Log to a file, since the terminal belongs to the UI.
fn setup_logging() -> Result<WorkerGuard> {
    let directory = Config::config_dir()?;
    std::fs::create_dir_all(&directory)?;

    let file_appender = tracing_appender::rolling::never(&directory, "llamachat.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("llamachat=debug,llamachat_core=debug")),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    info!(directory = %directory.display(), "logging initialized");
    Ok(guard)
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load().unwrap_or_else(|err| {
        warn!(error = %err, "could not load config, using defaults");
        Config::default()
    });

    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if let Some(temperature) = cli.temperature {
        config.temperature = temperature;
    }
    if cli.no_greeting {
        config.greeting = None;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = if cli.debug { Some(setup_logging()?) } else { None };

    let config = load_config(&cli)?;
    info!(host = %config.host, model = %config.model, "starting");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, App::new(config)).await;
    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, mut app: App) -> Result<()> {
    let mut events = EventHandler::new();
    let sender = events.sender();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        let Some(event) = events.next().await else {
            break;
        };
        handler::handle_event(&mut app, event, &sender)?;
    }

    app.shutdown();
    Ok(())
}
