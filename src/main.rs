use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use hashwatch::{
    ChangeRecord, Command, CommandOutcome, DetectionScheduler, Severity, WatchConfig, Watcher,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about = "Watch a folder for changes against a committed baseline")]
struct Args {
    /// Directory to watch
    #[arg(short, long, value_name = "DIR")]
    target: Option<PathBuf>,

    /// JSON config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Background scan interval in milliseconds
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,

    /// Do not snapshot on commit
    #[arg(long, default_value_t = false)]
    no_snapshot: bool,

    /// Increase verbosity
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => WatchConfig::from_json_file(path)?,
        None => WatchConfig::default(),
    };
    if let Some(target) = args.target {
        config.target_dir = target;
    }
    if let Some(ms) = args.interval_ms {
        config.scan_interval_ms = ms;
    }
    if args.no_snapshot {
        config.snapshot_on_commit = false;
    }

    let watcher = Arc::new(Watcher::open(config).await?);
    let scheduler = DetectionScheduler::new(watcher);
    scheduler.start()?;

    println!("Enter commands (commit, status, revert [id], exit):");

    let mut lines = BufReader::new(tokio::io::stdin()).split(b'\n');
    while let Some(line) = lines.next_segment().await? {
        let command = match Command::parse_line(&line) {
            Ok(command) => command,
            Err(_) => {
                println!("Invalid input: not valid UTF-8");
                continue;
            }
        };

        match command.execute(&scheduler).await {
            Ok(CommandOutcome::Exit) => std::process::exit(0),
            Ok(outcome) => present(outcome),
            Err(e) => {
                error!(error = %e, "Command failed");
                println!("An error occurred: {}", e);
            }
        }
    }

    Ok(())
}

fn present(outcome: CommandOutcome) {
    match outcome {
        CommandOutcome::Committed { summary, records } => {
            println!("Baseline updated: {} files.", summary.files);
            if let Some(id) = summary.snapshot {
                println!("Snapshot created: {}", id);
            }
            print_records(&records);
        }
        CommandOutcome::Status(records) => {
            println!("Checking for changes...");
            print_records(&records);
        }
        CommandOutcome::Snapshots(ids) if ids.is_empty() => println!("No snapshots available."),
        CommandOutcome::Snapshots(ids) => {
            println!("Available snapshots:");
            for id in ids {
                println!("  {}", id);
            }
        }
        CommandOutcome::Reverted { id, restored } => {
            println!("Reverted to {} ({} files restored).", id, restored.len());
        }
        CommandOutcome::Unknown(word) => println!("Unknown command: {}", word),
        CommandOutcome::Exit | CommandOutcome::Nothing => {}
    }
}

fn print_records(records: &[ChangeRecord]) {
    for record in records {
        let line = record.to_string();
        let styled = match record.severity() {
            Severity::Info => line.normal(),
            Severity::Notice => line.blue(),
            Severity::Warning => line.green(),
            Severity::Critical => line.red(),
        };
        println!("{}", styled);
    }
}
