use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use convoy_cli::core::{ChatRole, HistoryItem};
use convoy_cli::transport::{InMemorySessionApi, ReplayDriver, ScriptStep, TranscriptPrinter};
use convoy_cli::ui_backend::{Command, ReconcileService, SessionEvent, UiRenderer};
use convoy_cli::{Config, JsonStateStore};

#[derive(Parser)]
#[command(name = "convoy")]
#[command(
    author,
    version = concat!(env!("CARGO_PKG_VERSION"), env!("CONVOY_VERSION_SUFFIX")),
    about = "Convoy - session activity and transcript reconciliation",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines script through the reducer and print the transcript
    Replay {
        /// Script path, or `-` for stdin
        script: PathBuf,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Also list the messages that would have been sent
        #[arg(long)]
        show_sends: bool,
    },

    /// Run the live service against an in-memory backend for one exchange
    Demo {
        /// Message to send
        #[arg(default_value = "hello")]
        message: String,

        /// Session to select
        #[arg(short, long, default_value = "demo")]
        session: String,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Show or initialize the configuration
    Config {
        /// Print the config file path only
        #[arg(long)]
        path: bool,

        /// Write the default configuration if no file exists
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };
    let config = Config::load_from(&config_path)?;

    // Initialize logging
    let filter = if cli.verbose {
        "convoy_cli=debug,convoy=debug".to_string()
    } else {
        config.logging.filter.clone()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Replay {
            script,
            no_color,
            show_sends,
        } => {
            if no_color {
                colored::control::set_override(false);
            }
            run_replay(&script, &config, show_sends)?;
        }
        Commands::Demo {
            message,
            session,
            no_color,
        } => {
            if no_color {
                colored::control::set_override(false);
            }
            run_demo(&config, &session, &message).await?;
        }
        Commands::Config { path, init } => {
            if path {
                println!("{}", config_path.display());
            } else if init {
                if config_path.exists() {
                    println!("Config already exists at {}", config_path.display());
                } else {
                    Config::default().save_to(&config_path)?;
                    println!("Wrote default config to {}", config_path.display());
                }
            } else {
                print!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

fn run_replay(script: &Path, config: &Config, show_sends: bool) -> Result<()> {
    let steps = if script == Path::new("-") {
        ScriptStep::parse_script(std::io::stdin().lock())?
    } else {
        let file = std::fs::File::open(script)
            .with_context(|| format!("Failed to open {}", script.display()))?;
        ScriptStep::parse_script(BufReader::new(file))?
    };
    tracing::info!(steps = steps.len(), "replaying script");

    let mut driver = ReplayDriver::new(config);
    driver.run_all(steps)?;

    let mut printer = TranscriptPrinter::new(std::io::stdout().lock());
    printer.render(&driver.snapshot())?;
    if show_sends {
        for (token, session_id, text) in driver.sent() {
            println!("sent #{} to {}: {}", token, session_id, text);
        }
    }
    Ok(())
}

async fn run_demo(config: &Config, session: &str, message: &str) -> Result<()> {
    let api = Arc::new(InMemorySessionApi::new(config.client.default_provider.clone()));
    api.append_history(
        session,
        HistoryItem {
            id: "welcome".to_string(),
            role: ChatRole::SessionNote,
            text: format!("Session {} ready", session),
            created_at: None,
            turn_id: None,
            provider_message_id: None,
        },
    );

    let store = Arc::new(JsonStateStore::new(config.state_file()));
    let (service, mut handle) = ReconcileService::new(config, api.clone(), store);
    let task = tokio::spawn(service.run());

    handle.send(Command::select_session(session));
    handle
        .wait_for(|s| s.focused_session.as_deref() == Some(session) && !s.loading)
        .await
        .context("service stopped while loading")?;

    handle.send(Command::SendMessage(message.to_string()));
    handle
        .wait_for(|s| s.activity.is_some())
        .await
        .context("service stopped before the send landed")?;

    api.push_event(
        session,
        SessionEvent::AgentDelta {
            text: format!("Received: {}", message),
            created_at: None,
            turn_id: Some("turn-1".to_string()),
            provider_message_id: None,
            force_split: false,
        },
    );
    api.complete_turn(session, "turn-1");
    let snapshot = handle
        .wait_for(|s| s.activity.is_none() && s.blocks.iter().any(|b| b.role == ChatRole::Agent))
        .await
        .context("service stopped before the reply arrived")?;

    let mut printer = TranscriptPrinter::new(std::io::stdout().lock());
    printer.render(&snapshot)?;

    handle.send(Command::Quit);
    task.await??;
    Ok(())
}
