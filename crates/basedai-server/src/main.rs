//! BasedAI
//!
//! Answers questions with a tool-calling language model, either over HTTP
//! (`basedai serve`) or once from the command line (`basedai ask`).

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info};

use basedai_server::error::{Result, ServerError};
use basedai_server::service::log_speak_sink;
use basedai_server::{AppConfig, QueryService, serve};

#[derive(Parser, Debug)]
#[command(name = "basedai", version, about = "Tool-calling assistant service")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "BASEDAI_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve `POST /query` over HTTP
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Answer a single question and exit
    Ask {
        /// The question to ask
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
}

/// Initializes structured logging with tracing.
///
/// Supports two output formats via the `BASEDAI_LOG_FORMAT` environment variable:
/// - `json`: Machine-readable JSON logs
/// - `pretty`: Human-readable formatted logs (default)
///
/// Both formats write to stderr; stdout carries only answers. Log level is
/// controlled via `RUST_LOG`. Records from the `log` facade used
/// by the library crates are forwarded to the same subscriber.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let format = std::env::var("BASEDAI_LOG_FORMAT")
        .unwrap_or_else(|_| "pretty".to_string())
        .to_lowercase();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("basedai_server=info,basedai=info,basedai_tools=info,basedai_client=info")
    });

    match format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

/// Resolves once SIGINT or SIGTERM arrives.
fn shutdown_signal() -> Result<oneshot::Receiver<()>> {
    let mut signals = Signals::new([SIGTERM, SIGINT])?;
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        use futures::stream::StreamExt;
        while let Some(signal) = signals.next().await {
            match signal {
                SIGTERM => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                    break;
                }
                SIGINT => {
                    info!("Received SIGINT, initiating graceful shutdown");
                    break;
                }
                _ => {}
            }
        }
        let _ = tx.send(());
    });

    Ok(rx)
}

async fn run_server(config: &AppConfig, port: Option<u16>) -> Result<()> {
    let service = Arc::new(QueryService::from_config(config, Some(log_speak_sink()))?);
    service.check_model().await?;

    let addr = match port {
        Some(port) => format!("{}:{port}", config.server.host),
        None => config.bind_addr(),
    };
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!("Failed to bind {addr}: {e}");
        ServerError::Io(e)
    })?;

    let shutdown = shutdown_signal()?;
    serve(service, listener, async {
        let _ = shutdown.await;
    })
    .await
}

async fn run_ask(config: &AppConfig, question: &[String]) -> Result<()> {
    let service = QueryService::from_config(config, None)?;
    service.check_model().await?;
    let answer = service.answer(&question.join(" ")).await?;
    println!("{answer}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            if cli.config.is_none() {
                error!("Expected config at: {:?}", AppConfig::config_path());
            }
            return Err(e);
        }
    };
    info!(model = %config.model.model, provider = %config.model.provider, "Loaded configuration");

    match cli.command {
        Command::Serve { port } => run_server(&config, port).await,
        Command::Ask { question } => run_ask(&config, &question).await,
    }
}
