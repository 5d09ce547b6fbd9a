//! Storage abstraction for the timeline.
//!
//! The [`EventStore`] trait covers everything the pipeline, correlation
//! engine and exporters need from persistence. Two backends exist:
//! [`sqlite::SqliteEventStore`] for the CLI and
//! [`memory::InMemoryEventStore`] for tests.
//!
//! All writes are upserts keyed by natural identifiers, so repeating a
//! run never duplicates rows.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{CommunicationThread, Correlation, EventKind, TimelineEvent};

/// A persisted [`Correlation`] with its row identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCorrelation {
    pub id: i64,
    #[serde(flatten)]
    pub correlation: Correlation,
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_events`](EventStore::upsert_events) | Insert or replace events by id |
/// | [`events`](EventStore::events) | All events, timestamp order |
/// | [`events_of_kind`](EventStore::events_of_kind) | Events of one kind, timestamp order |
/// | [`upsert_correlations`](EventStore::upsert_correlations) | Insert or update by (file, milestone) pair |
/// | [`correlations`](EventStore::correlations) | All correlations, id order |
/// | [`upsert_threads`](EventStore::upsert_threads) | Insert or replace threads by id |
/// | [`threads`](EventStore::threads) | All threads, start date order |
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Returns the number of events written.
    async fn upsert_events(&self, events: &[TimelineEvent]) -> Result<usize>;

    /// Ties on timestamp are broken by event id.
    async fn events(&self) -> Result<Vec<TimelineEvent>>;

    async fn events_of_kind(&self, kind: EventKind) -> Result<Vec<TimelineEvent>>;

    /// An existing pair keeps its id; strength and type are updated.
    async fn upsert_correlations(&self, correlations: &[Correlation]) -> Result<usize>;

    async fn correlations(&self) -> Result<Vec<StoredCorrelation>>;

    async fn upsert_threads(&self, threads: &[CommunicationThread]) -> Result<usize>;

    async fn threads(&self) -> Result<Vec<CommunicationThread>>;
}

/// Sort order shared by both backends.
pub(crate) fn sort_events(events: &mut [TimelineEvent]) {
    events.sort_by(|a, b| {
        a.timestamp
            .total_cmp(&b.timestamp)
            .then_with(|| a.event_id.cmp(&b.event_id))
    });
}
