//! # Activity Timeline
//!
//! Builds one time-ordered event log out of file-system snapshots and the
//! milestones buried in project communication.
//!
//! A run scans a project tree into an aggregated snapshot, mines emails,
//! text notes and documents for deadlines, requirements, deliverables,
//! meetings, decisions and issues, and stores everything as
//! [`TimelineEvent`](models::TimelineEvent)s in SQLite. A correlation pass
//! then links snapshots to milestones that mention files present in the
//! tree, and the result is exported as JSON for a visualizer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐
//! │ TreeScanner │──▶│              │   ┌──────────┐   ┌─────────────┐
//! └─────────────┘   │  TimelineEvt │──▶│  SQLite  │──▶│ Correlation │
//! ┌─────────────┐   │  (sorted)    │   │  store   │   └──────┬──────┘
//! │ Milestones  │──▶│              │   └────┬─────┘          │
//! └─────────────┘   └──────────────┘        ▼                ▼
//! ┌─────────────┐                     ┌──────────┐     ┌──────────┐
//! │   Threads   │────────────────────▶│  threads │     │   JSON   │
//! └─────────────┘                     └──────────┘     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! timeline init
//! timeline run --scan-dir ./project --email-dir ./mail --docs-dir ./docs \
//!     --correlate --output unified_timeline.json
//! timeline threads --email-dir ./mail --output communication_threads.json
//! timeline stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Diagnostic logging setup |
//! | [`models`] | Core data types |
//! | [`fingerprint`] | Content fingerprints and stable identifiers |
//! | [`scanner`] | Directory tree snapshots |
//! | [`message`] | Email and text message parsing |
//! | [`document`] | Document text extraction |
//! | [`milestone`] | Milestone classification |
//! | [`recommend`] | Recommendation phrase matching |
//! | [`threads`] | Conversation grouping |
//! | [`correlate`] | File/milestone correlation |
//! | [`store`] | Storage abstraction and backends |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`pipeline`] | Batch orchestration |
//! | [`export`] | Visualizer JSON |
//! | [`stats`] | Store summary |

pub mod config;
pub mod correlate;
pub mod db;
pub mod document;
pub mod export;
pub mod fingerprint;
pub mod logging;
pub mod message;
pub mod migrate;
pub mod milestone;
pub mod models;
pub mod pipeline;
pub mod recommend;
pub mod scanner;
pub mod stats;
pub mod store;
pub mod threads;
