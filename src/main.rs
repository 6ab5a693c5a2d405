//! Claude Relay - Streaming bridge between callers and Claude Code.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use claude_relay::config::{ConfigLoader, RelayConfig};
use claude_relay::display::{self, ConsoleListener};
use claude_relay::executor::{ExecuteRequest, Executor, ExecutorError};
use claude_relay::gate::RequestGate;

#[derive(Parser)]
#[command(
    name = "claude-relay",
    about = "Run Claude Code and relay its progress",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a config file (defaults to .claude-relay.toml, then the user config dir).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single prompt.
    Run {
        /// The instruction for Claude Code.
        prompt: String,
        /// Working directory for the child process.
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Session to continue.
        #[arg(long)]
        resume: Option<String>,
        /// Continue the most recent session.
        #[arg(long = "continue")]
        continue_session: bool,
        /// Show untruncated progress output.
        #[arg(long)]
        raw: bool,
    },
    /// Read prompts from stdin, continuing one session across them.
    Chat {
        /// Working directory for the child process.
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Identity used for rate limiting.
        #[arg(long, default_value = "local")]
        identity: String,
    },
    /// Print the resolved configuration.
    Config,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<RelayConfig, String> {
    let loader = path.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    loader.load_with_env().map_err(|e| e.to_string())
}

async fn run_once(config: RelayConfig, request: ExecuteRequest, raw: bool) -> ExitCode {
    let executor = Executor::new(config.executor);
    let listener = ConsoleListener {
        raw_mode: raw || config.display.raw_mode,
    };

    match executor.execute(&request, Some(&listener)).await {
        Ok(response) => {
            display::print_response(&response, config.display.message_chunk_size);
            if response.is_error {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            display::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

async fn chat(config: RelayConfig, cwd: Option<PathBuf>, identity: &str) -> ExitCode {
    let gate = RequestGate::from_config(&config.gate);
    let executor = Executor::new(config.executor);
    let listener = ConsoleListener {
        raw_mode: config.display.raw_mode,
    };
    let mut session_id: Option<String> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return ExitCode::SUCCESS,
            Err(e) => {
                display::print_error(&format!("Failed to read input: {e}"));
                return ExitCode::FAILURE;
            }
        };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if !gate.check(identity) {
            display::print_error(&format!(
                "Rate limit exceeded: {} requests per {}s",
                gate.limit(),
                gate.window().as_secs()
            ));
            continue;
        }

        let mut request = ExecuteRequest::new(prompt);
        if let Some(dir) = &cwd {
            request = request.working_dir(dir);
        }
        if let Some(id) = session_id.as_deref().filter(|id| !id.is_empty()) {
            request = request.resume(id);
        }

        match executor.execute(&request, Some(&listener)).await {
            Ok(response) => {
                display::print_response(&response, config.display.message_chunk_size);
                if !response.session_id.is_empty() {
                    session_id = Some(response.session_id);
                }
            }
            Err(e @ ExecutorError::Timeout { .. }) => display::print_error(&e.to_string()),
            Err(e) => {
                display::print_error(&e.to_string());
                return ExitCode::FAILURE;
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(cli.config) {
        Ok(config) => config,
        Err(e) => {
            display::print_error(&e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Run {
            prompt,
            cwd,
            resume,
            continue_session,
            raw,
        } => {
            let mut request = ExecuteRequest::new(prompt).continue_session(continue_session);
            if let Some(dir) = cwd {
                request = request.working_dir(dir);
            }
            if let Some(id) = resume {
                request = request.resume(id);
            }
            tracing::info!(
                resume = request.session_id.is_some(),
                continue_session = request.continue_session,
                "Running prompt"
            );
            run_once(config, request, raw).await
        }
        Commands::Chat { cwd, identity } => chat(config, cwd, &identity).await,
        Commands::Config => match toml::to_string_pretty(&config) {
            Ok(text) => {
                print!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                display::print_error(&e.to_string());
                ExitCode::FAILURE
            }
        },
    }
}
