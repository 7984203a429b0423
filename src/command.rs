//! Interactive command words and their execution against a scheduler

use std::path::PathBuf;
use std::str::FromStr;

use tracing::debug;

use crate::detector::ChangeRecord;
use crate::error::Result;
use crate::scheduler::DetectionScheduler;
use crate::snapshot::SnapshotId;
use crate::watcher::CommitSummary;

/// A parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Rebuild the manifest (and snapshot), then report status
    Commit,
    /// Manual verbose detection pass
    Status,
    /// Restore a snapshot, or list snapshots when no id is given
    Revert(Option<SnapshotId>),
    /// Terminate immediately
    Exit,
    /// Blank input
    Empty,
    /// Anything else; carries the lowercased command word
    Unknown(String),
}

impl FromStr for Command {
    type Err = std::convert::Infallible;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let line = line.trim();
        let (word, argument) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, Some(rest.trim()).filter(|r| !r.is_empty())),
            None => (line, None),
        };

        Ok(match word.to_lowercase().as_str() {
            "" => Command::Empty,
            "commit" => Command::Commit,
            "status" => Command::Status,
            "revert" => Command::Revert(argument.map(SnapshotId::from)),
            "exit" => Command::Exit,
            other => Command::Unknown(other.to_string()),
        })
    }
}

/// What a command produced, for the caller to present
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Commit finished, followed by a verbose status pass
    Committed {
        summary: CommitSummary,
        records: Vec<ChangeRecord>,
    },
    /// Verbose status records
    Status(Vec<ChangeRecord>),
    /// Available snapshot identifiers
    Snapshots(Vec<SnapshotId>),
    /// Files written back by a revert
    Reverted {
        id: SnapshotId,
        restored: Vec<PathBuf>,
    },
    /// Scheduler terminated; the caller should exit the process
    Exit,
    /// Unrecognized command word; no state was touched
    Unknown(String),
    /// Nothing to do
    Nothing,
}

impl Command {
    /// Parse one raw input line, which may end in `\n` or `\r\n`
    pub fn parse_line(bytes: &[u8]) -> std::result::Result<Self, std::str::Utf8Error> {
        let line = std::str::from_utf8(bytes)?;
        Ok(match line.parse() {
            Ok(command) => command,
            Err(never) => match never {},
        })
    }

    /// Execute against `scheduler`
    pub async fn execute(self, scheduler: &DetectionScheduler) -> Result<CommandOutcome> {
        debug!(command = ?self, "Executing command");
        let watcher = scheduler.watcher();

        match self {
            Command::Commit => {
                let summary = watcher.commit().await?;
                let records = scheduler.trigger_manual().await?;
                Ok(CommandOutcome::Committed { summary, records })
            }
            Command::Status => Ok(CommandOutcome::Status(scheduler.trigger_manual().await?)),
            Command::Revert(None) => Ok(CommandOutcome::Snapshots(watcher.list_snapshots().await?)),
            Command::Revert(Some(id)) => {
                let restored = watcher.revert(&id).await?;
                Ok(CommandOutcome::Reverted { id, restored })
            }
            Command::Exit => {
                scheduler.terminate();
                Ok(CommandOutcome::Exit)
            }
            Command::Unknown(word) => Ok(CommandOutcome::Unknown(word)),
            Command::Empty => Ok(CommandOutcome::Nothing),
        }
    }
}
