//! Mailroute admin CLI.
//!
//! - `routes`: print the routing order and table, optionally testing an address
//! - `queue`: inspect or drain a queue directory
//! - `cleanse`: copy every decodable message from one queue into another

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mailroute::routing::{inspect_router, RouteReport, START_STATE};
use mailroute::{Config, QueueStore};

#[derive(Parser, Debug)]
#[command(name = "mailroute")]
#[command(about = "Inspect mail routes and queues")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the routing order and table
    Routes {
        /// Routes file (default: $ROUTES_FILE or config/routes.toml)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Address to test against the table
        #[arg(short, long, value_name = "ADDR")]
        test: Option<String>,

        /// Conversation state to test in
        #[arg(short, long, default_value = START_STATE)]
        state: String,
    },

    /// Inspect or modify a queue
    Queue {
        /// Queue directory (default: $SPOOL_DIR or run/queue)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        #[command(flatten)]
        action: QueueAction,
    },

    /// Copy every decodable message from IN to OUT
    Cleanse {
        #[arg(value_name = "IN")]
        input: PathBuf,
        #[arg(value_name = "OUT")]
        output: PathBuf,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct QueueAction {
    /// Remove the oldest message and print it
    #[arg(long)]
    pop: bool,

    /// Print one message
    #[arg(long, value_name = "KEY")]
    get: Option<String>,

    /// Delete one message
    #[arg(long, value_name = "KEY")]
    remove: Option<String>,

    /// Delete every message
    #[arg(long)]
    clear: bool,

    /// List message keys, oldest first
    #[arg(long)]
    keys: bool,

    /// Print the number of messages
    #[arg(long)]
    count: bool,
}

fn main() -> Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let mut out = io::stdout().lock();

    match cli.command {
        Command::Routes { file, test, state } => {
            let routes_file = file.unwrap_or(config.routes_file);
            let matched = routes_command(
                &routes_file,
                &config.undeliverable_dir,
                test.as_deref(),
                &state,
                &mut out,
            )?;
            Ok(if matched { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Queue { dir, action } => {
            let dir = dir.unwrap_or(config.spool_dir);
            let store = QueueStore::open(&dir)
                .with_context(|| format!("Failed to open queue {}", dir.display()))?;
            queue_command(&store, action, &mut out)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Cleanse { input, output } => {
            let input = QueueStore::open(&input)
                .with_context(|| format!("Failed to open queue {}", input.display()))?;
            let output = QueueStore::open(&output)
                .with_context(|| format!("Failed to open queue {}", output.display()))?;

            let copied = mailroute::mail::cleanse(&input, &output)?;
            writeln!(
                out,
                "Cleansed {copied} messages from {} into {}",
                input.dir().display(),
                output.dir().display()
            )?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Print the routing report. Returns false when a test address matched
/// nothing. Queue directories named by the routes file are not created.
fn routes_command(
    routes_file: &Path,
    undeliverable_dir: &Path,
    test: Option<&str>,
    state: &str,
    out: &mut impl Write,
) -> Result<bool> {
    let router = inspect_router(routes_file, undeliverable_dir)
        .with_context(|| format!("Failed to load routes from {}", routes_file.display()))?;

    let report = router.report(test.map(|address| (address, state)));
    write!(out, "{report}")?;
    Ok(routes_matched(&report))
}

fn routes_matched(report: &RouteReport) -> bool {
    report.test.as_ref().map_or(true, |t| t.matched())
}

fn queue_command(store: &QueueStore, action: QueueAction, out: &mut impl Write) -> Result<()> {
    if action.pop {
        match store.pop()? {
            Some((key, blob)) => {
                writeln!(out, "KEY: {key}")?;
                out.write_all(&blob)?;
                writeln!(out)?;
            }
            None => writeln!(out, "Queue {} is empty", store.dir().display())?,
        }
    } else if let Some(key) = action.get {
        let blob = store.get(&key)?;
        out.write_all(&blob)?;
    } else if let Some(key) = action.remove {
        store.remove(&key)?;
        writeln!(out, "Removed {key}")?;
    } else if action.clear {
        let removed = store.clear()?;
        writeln!(out, "Cleared {removed} messages from {}", store.dir().display())?;
    } else if action.keys {
        for key in store.keys()? {
            writeln!(out, "{key}")?;
        }
    } else if action.count {
        writeln!(
            out,
            "Queue {} contains {} messages",
            store.dir().display(),
            store.count()?
        )?;
    }

    Ok(())
}
