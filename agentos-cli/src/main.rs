//! `agentos` — command-line surface for the AgentOS memory and agent
//! runtime: knowledge graph inspection, conflict detection/resolution,
//! agent/skill/tool registries, write-back proposals, self-modification,
//! and task tracking.

mod commands;
mod data_dir;
mod embedder;
mod loader;
mod output;

use clap::{Parser, Subcommand};
use data_dir::DataDir;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

#[derive(Parser, Debug)]
#[command(name = "agentos")]
#[command(about = "Inspect and operate an AgentOS memory/agent runtime instance")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root directory holding `agents/`, `skills/`, `tools/`, `memory/`, `index/`.
    #[arg(long, global = true, value_name = "DIR", default_value = ".agentos")]
    data_dir: PathBuf,

    /// Emit machine-readable JSON instead of plain text.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Knowledge graph inspection and migration.
    #[command(subcommand)]
    Graph(commands::graph::GraphCommand),
    /// Conflict detection, listing, and resolution.
    Conflicts {
        #[command(subcommand)]
        cmd: commands::conflicts::ConflictsCommand,
    },
    /// Agent/skill/tool registries and task matching.
    Agents {
        #[command(subcommand)]
        cmd: commands::agents::AgentsCommand,
    },
    /// Write-back proposal queue, review, and commit.
    Proposals {
        #[command(subcommand)]
        cmd: commands::proposals::ProposalsCommand,
    },
    /// Self-modification proposal lifecycle.
    Selfmod {
        #[command(subcommand)]
        cmd: commands::selfmod::SelfmodCommand,
    },
    /// Task hierarchy and tracking.
    Tasks {
        #[command(subcommand)]
        cmd: commands::tasks::TasksCommand,
    },
    /// Query log and memory health reporting.
    Usage {
        #[command(subcommand)]
        cmd: commands::usage::UsageCommand,
    },
}

/// Logs go to stderr (or `LOG_FILE` if set) so stdout stays reserved for
/// command output; `RUST_LOG` controls the filter, default `warn`.
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    if let Ok(path) = std::env::var("LOG_FILE") {
        if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(&path) {
            let layer = tracing_subscriber::fmt::layer().with_writer(std::sync::Mutex::new(file)).with_ansi(false).with_filter(filter);
            let _ = tracing_subscriber::registry().with(layer).try_init();
            return;
        }
    }
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_filter(filter);
    let _ = tracing_subscriber::registry().with(layer).try_init();
}

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(e) = agentos_config::load_and_apply("agentos", None) {
        tracing::warn!(error = %e, "failed to load agentos config");
    }

    let cli = Cli::parse();
    let dir = DataDir::new(cli.data_dir);

    let result = match cli.command {
        Command::Graph(cmd) => commands::graph::run(&dir, cli.json, cmd),
        Command::Conflicts { cmd } => commands::conflicts::run(&dir, cli.json, cmd),
        Command::Agents { cmd } => commands::agents::run(&dir, cli.json, cmd),
        Command::Proposals { cmd } => commands::proposals::run(&dir, cli.json, cmd).await,
        Command::Selfmod { cmd } => commands::selfmod::run(&dir, cli.json, cmd),
        Command::Tasks { cmd } => commands::tasks::run(&dir, cli.json, cmd),
        Command::Usage { cmd } => commands::usage::run(&dir, cli.json, cmd),
    };

    let exit_code = match result {
        Ok(()) => 0,
        Err(e) => output::report_error(&e, cli.json),
    };
    std::process::exit(exit_code);
}
