use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use streamchat::config::Config;
use streamchat::events::{ChatEvent, RejectReason};
use streamchat::logging::{self, LogTarget};
use streamchat::session::{ChatSession, CycleOutcome};
use streamchat::transport::ChatClient;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "streamchat")]
#[command(version)]
#[command(about = "Chat with a streaming backend from the terminal", long_about = None)]
struct Cli {
    /// Backend chat endpoint (overrides config and environment)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one prompt and print the reply as it streams
    Ask { prompt: String },
    /// Show the effective configuration
    Config {
        /// Write the default configuration file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = cli.url {
        config = config.with_backend_url(url)?;
    }

    match cli.command {
        None => {
            streamchat::app::run(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Ask { prompt }) => ask(config, &prompt).await,
        Some(Commands::Config { init }) => {
            show_config(&config, init)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn ask(config: Config, prompt: &str) -> Result<ExitCode> {
    logging::init(&config.log, LogTarget::Stderr)?;

    let mut session = ChatSession::new(ChatClient::new(&config)?);
    let events = session.subscribe();

    let (outcome, printed) = tokio::join!(session.submit(prompt), print_reply(events));
    printed?;

    Ok(match outcome {
        CycleOutcome::Terminated | CycleOutcome::EndOfStream => ExitCode::SUCCESS,
        CycleOutcome::Rejected(_) | CycleOutcome::Failed(_) => ExitCode::FAILURE,
    })
}

/// Stream chunks to stdout and errors to stderr until the cycle finishes.
async fn print_reply(mut events: mpsc::UnboundedReceiver<ChatEvent>) -> Result<()> {
    let mut stdout = std::io::stdout();
    let mut printed_any = false;

    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::ChunkApplied { chunk } => {
                stdout.write_all(chunk.as_bytes())?;
                stdout.flush()?;
                printed_any = true;
            }
            ChatEvent::ErrorOccurred(error) => {
                if printed_any {
                    writeln!(stdout)?;
                    printed_any = false;
                }
                eprintln!("{}", error.user_message());
            }
            ChatEvent::SubmissionRejected { reason } => {
                match reason {
                    RejectReason::EmptyPrompt => eprintln!("Prompt is empty; nothing sent."),
                    RejectReason::ReplyInFlight => eprintln!("A reply is already in flight."),
                }
                break;
            }
            ChatEvent::ReplyFinished => break,
            ChatEvent::MessageCommitted(_) | ChatEvent::ReplyStarted => {}
        }
    }

    if printed_any {
        writeln!(stdout)?;
    }
    Ok(())
}

fn show_config(config: &Config, init: bool) -> Result<()> {
    if init {
        if config.path.exists() {
            println!("Config already exists at {}", config.path.display());
        } else {
            config.save()?;
            println!("Wrote default config to {}", config.path.display());
        }
    }

    let rendered = toml::to_string_pretty(config).context("Failed to render config")?;
    println!("# {}", config.path.display());
    print!("{}", rendered);
    Ok(())
}
