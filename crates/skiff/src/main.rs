#![recursion_limit = "256"]
#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

use clap::{Parser, Subcommand};
use eyre::Context as _;
use std::sync::Arc;

mod aa;
mod account;
mod actions;
mod agent;
mod agentkit;
mod amount;
mod chains;
mod config;
mod dispatcher;
mod doctor;
mod errors;
mod retry;
mod services;

#[derive(Parser, Debug)]
#[command(name = "skiff", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the interactive agent REPL. Reads prompts from stdin until the
    /// literal input "exit".
    Chat {
        /// Act through the remote wallet server instead of a local signer.
        #[arg(long, default_value_t = false)]
        server_wallet: bool,
    },

    /// Print the machine-readable action catalog (names, descriptions and
    /// argument schemas) as JSON.
    Actions,

    /// Print a quick self-diagnostic report (safe to paste; contains no
    /// secrets).
    Doctor {
        /// Emit JSON to stdout (machine-readable).
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn init_logging() {
    // The REPL owns stdout; all diagnostics go to stderr as JSON lines.
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let _ = dotenvy::dotenv();
    init_logging();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Chat { server_wallet } => {
            let config = config::AgentConfig::from_env().context("configuration failed")?;
            let kit = if server_wallet {
                agentkit::Agentkit::with_server_wallet(&config)
                    .context("server wallet configuration failed")?
            } else {
                agentkit::Agentkit::with_local_signer(&config)
                    .context("local signer configuration failed")?
            };
            agent::run_repl(Arc::new(kit), &config.llm)
                .await
                .context("agent repl failed")
        }
        Command::Actions => {
            use std::io::Write as _;
            let catalog = actions::Registry::assemble().catalog_json();
            let s = serde_json::to_string_pretty(&catalog).context("serialize catalog")?;
            writeln!(std::io::stdout().lock(), "{s}").context("write catalog")?;
            Ok(())
        }
        Command::Doctor { json } => doctor::run(json).context("doctor failed"),
    }
}
