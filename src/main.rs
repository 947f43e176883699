use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lq::config::QueueConfig;
use lq::error::{EXIT_NOT_READY, EXIT_OK, QueueError};
use lq::follow::{self, FollowOptions};
use lq::scan::{self, PredecessorScanner, Readiness};
use lq::store::{RecordName, RecordStore};
use lq::submit::runner::Runner;
use lq::submit::Sequencer;

#[derive(Parser, Debug)]
#[command(name = "lq")]
#[command(version)]
#[command(about = "A lightweight job queue sequenced through file locks")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Queue a command to run in the background
    Run(RunArgs),

    /// Block until queued jobs have finished
    Wait(WaitArgs),

    /// Check without blocking whether queued jobs have finished
    Test(WaitArgs),

    /// Follow the output of queued jobs until they finish
    Tail(TailArgs),

    /// Internal runner process spawned by `run`
    #[command(hide = true)]
    Exec(ExecArgs),
}

// =============================================================================
// Shared Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct StoreArgs {
    /// Queue directory (created if absent)
    #[arg(long = "dir", env = "LQ_DIR", default_value = ".")]
    dir: PathBuf,
}

// =============================================================================
// Subcommand Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Move records of jobs that exit 0 here
    #[arg(long, env = "LQ_DONE_DIR")]
    done_dir: Option<PathBuf>,

    /// Move records of jobs that fail here
    #[arg(long, env = "LQ_FAIL_DIR")]
    fail_dir: Option<PathBuf>,

    /// Do not print the assigned record name
    #[arg(short, long)]
    quiet: bool,

    /// Delete the record when the job exits 0
    #[arg(short, long)]
    clean: bool,

    /// The command to queue
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    command: Vec<String>,
}

#[derive(Parser, Debug)]
struct WaitArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Specific record names; all queued jobs when omitted
    names: Vec<String>,
}

#[derive(Parser, Debug)]
struct TailArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Emit only the first output line of each record
    #[arg(short, long)]
    quiet: bool,

    /// Skip records whose job is not currently running
    #[arg(long)]
    running_only: bool,

    /// Specific record names; discover from the queue directory when omitted
    names: Vec<String>,
}

#[derive(Parser, Debug)]
struct ExecArgs {
    #[arg(long)]
    dir: PathBuf,

    #[arg(long)]
    record: String,

    #[arg(long)]
    clean: bool,

    #[arg(long)]
    done_dir: Option<PathBuf>,

    #[arg(long)]
    fail_dir: Option<PathBuf>,

    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn open_store(dir: &Path) -> Result<RecordStore, QueueError> {
    RecordStore::open(dir).map_err(|e| QueueError::StoreUnavailable {
        path: dir.to_path_buf(),
        source: e,
    })
}

fn parse_names(raw: &[String]) -> Result<Vec<RecordName>, QueueError> {
    raw.iter()
        .map(|s| {
            RecordName::parse(s)
                .ok_or_else(|| QueueError::Usage(format!("not a record name: {s}")))
        })
        .collect()
}

// =============================================================================
// Command Handlers
// =============================================================================

fn handle_run(args: RunArgs) -> Result<i32, QueueError> {
    let store = open_store(&args.store.dir)?;
    let config = QueueConfig {
        queue_dir: args.store.dir,
        done_dir: args.done_dir,
        fail_dir: args.fail_dir,
        clean: args.clean,
    };

    let name = Sequencer::new(&store, &config).submit(&args.command)?;
    if !args.quiet {
        println!("{name}");
    }
    Ok(EXIT_OK)
}

fn handle_wait(args: WaitArgs) -> Result<i32, QueueError> {
    let store = open_store(&args.store.dir)?;
    if args.names.is_empty() {
        PredecessorScanner::for_horizon(&store).wait()?;
    } else {
        scan::wait_named(&store, &parse_names(&args.names)?)?;
    }
    Ok(EXIT_OK)
}

fn handle_test(args: WaitArgs) -> Result<i32, QueueError> {
    let store = open_store(&args.store.dir)?;
    let readiness = if args.names.is_empty() {
        PredecessorScanner::for_horizon(&store).poll()?
    } else {
        scan::test_named(&store, &parse_names(&args.names)?)?
    };
    match readiness {
        Readiness::Ready => Ok(EXIT_OK),
        Readiness::Blocked(name) => {
            tracing::debug!(record = %name, "still running");
            Ok(EXIT_NOT_READY)
        }
    }
}

fn handle_tail(args: TailArgs) -> Result<i32, QueueError> {
    let store = open_store(&args.store.dir)?;
    let names = if args.names.is_empty() {
        store.list().map_err(QueueError::Io)?
    } else {
        parse_names(&args.names)?
    };

    let opts = FollowOptions {
        quiet: args.quiet,
        running_only: args.running_only,
    };
    let mut watcher = follow::default_watcher();
    let mut out = io::stdout();
    follow::follow(&store, &names, &opts, watcher.as_mut(), &mut out)?;
    Ok(EXIT_OK)
}

fn handle_exec(args: ExecArgs) -> Result<i32, QueueError> {
    let store = open_store(&args.dir)?;
    let name = RecordName::parse(&args.record)
        .ok_or_else(|| QueueError::Usage(format!("not a record name: {}", args.record)))?;
    let config = QueueConfig {
        queue_dir: args.dir,
        done_dir: args.done_dir,
        fail_dir: args.fail_dir,
        clean: args.clean,
    };

    Runner::new(store, config, name, args.command).run()?;
    Ok(EXIT_OK)
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let result = match args.command {
        Commands::Run(args) => handle_run(args),
        Commands::Wait(args) => handle_wait(args),
        Commands::Test(args) => handle_test(args),
        Commands::Tail(args) => handle_tail(args),
        Commands::Exec(args) => handle_exec(args),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("lq: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
