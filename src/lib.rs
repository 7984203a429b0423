//! # Hashwatch
//!
//! Directory change watcher - fingerprint a folder, commit a baseline, revert to it.
//!
//! This crate provides:
//! - A from-scratch MD5 content fingerprint
//! - A line-oriented baseline manifest
//! - Added / modified / deleted detection against that baseline
//! - Timestamped snapshots on commit, and destructive revert
//! - A background scan timer serialized with interactive commands
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │               DetectionScheduler                 │
//! │     timer tick (silent)   manual (interactive)   │
//! │              └──────────┬──────────┘             │
//! │                         ▼                        │
//! │  ┌────────────────────────────────────────────┐  │
//! │  │          Watcher (workspace lock)          │  │
//! │  │   run_detection · commit · revert          │  │
//! │  └────────────────────────────────────────────┘  │
//! │       │                 │                │       │
//! │       ▼                 ▼                ▼       │
//! │  ┌──────────┐   ┌──────────────┐  ┌────────────┐ │
//! │  │ Manifest │   │ChangeDetector│  │  Snapshot  │ │
//! │  │  Store   │   │  + Digest    │  │  Manager   │ │
//! │  └──────────┘   └──────────────┘  └────────────┘ │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hashwatch::{DetectionScheduler, WatchConfig, Watcher};
//!
//! let watcher = Arc::new(Watcher::open(WatchConfig::new("./watched")).await?);
//! let scheduler = DetectionScheduler::new(Arc::clone(&watcher));
//! scheduler.start()?;
//!
//! // Record the baseline and snapshot it
//! let summary = watcher.commit().await?;
//!
//! // Verbose pass
//! for record in scheduler.trigger_manual().await? {
//!     println!("{record}");
//! }
//!
//! // Roll back
//! if let Some(id) = summary.snapshot {
//!     watcher.revert(&id).await?;
//! }
//! ```

pub mod command;
pub mod config;
pub mod detector;
pub mod digest;
pub mod error;
pub mod manifest;
pub mod scheduler;
pub mod snapshot;
pub mod watcher;

pub use command::{Command, CommandOutcome};
pub use config::WatchConfig;
pub use detector::{ChangeDetector, ChangeKind, ChangeRecord, ChangeSummary, Severity};
pub use digest::{Digest, DigestAlgorithm, DigestKind, Md5};
pub use error::{Result, WatchError};
pub use manifest::{Manifest, ManifestStore};
pub use scheduler::{DetectionMode, DetectionScheduler, SchedulerState};
pub use snapshot::{Snapshot, SnapshotId, SnapshotManager};
pub use watcher::{CommitSummary, Watcher};
