//! In-memory [`EventStore`] for tests.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Ordering and
//! upsert semantics match the SQLite backend.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CommunicationThread, Correlation, EventKind, TimelineEvent};

use super::{sort_events, EventStore, StoredCorrelation};

pub struct InMemoryEventStore {
    events: RwLock<HashMap<String, TimelineEvent>>,
    correlations: RwLock<Vec<StoredCorrelation>>,
    threads: RwLock<HashMap<String, CommunicationThread>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            correlations: RwLock::new(Vec::new()),
            threads: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn upsert_events(&self, events: &[TimelineEvent]) -> Result<usize> {
        let mut stored = self.events.write().unwrap_or_else(PoisonError::into_inner);
        for event in events {
            stored.insert(event.event_id.clone(), event.clone());
        }
        Ok(events.len())
    }

    async fn events(&self) -> Result<Vec<TimelineEvent>> {
        let stored = self.events.read().unwrap_or_else(PoisonError::into_inner);
        let mut events: Vec<TimelineEvent> = stored.values().cloned().collect();
        sort_events(&mut events);
        Ok(events)
    }

    async fn events_of_kind(&self, kind: EventKind) -> Result<Vec<TimelineEvent>> {
        let mut events = self.events().await?;
        events.retain(|e| e.event_type == kind);
        Ok(events)
    }

    async fn upsert_correlations(&self, correlations: &[Correlation]) -> Result<usize> {
        let mut stored = self
            .correlations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for correlation in correlations {
            let existing = stored.iter_mut().find(|s| {
                s.correlation.file_event_id == correlation.file_event_id
                    && s.correlation.milestone_event_id == correlation.milestone_event_id
            });
            match existing {
                Some(row) => row.correlation = correlation.clone(),
                None => {
                    let id = stored.last().map(|s| s.id + 1).unwrap_or(1);
                    stored.push(StoredCorrelation {
                        id,
                        correlation: correlation.clone(),
                    });
                }
            }
        }
        Ok(correlations.len())
    }

    async fn correlations(&self) -> Result<Vec<StoredCorrelation>> {
        let stored = self.correlations.read().unwrap_or_else(PoisonError::into_inner);
        Ok(stored.clone())
    }

    async fn upsert_threads(&self, threads: &[CommunicationThread]) -> Result<usize> {
        let mut stored = self.threads.write().unwrap_or_else(PoisonError::into_inner);
        for thread in threads {
            stored.insert(thread.thread_id.clone(), thread.clone());
        }
        Ok(threads.len())
    }

    async fn threads(&self) -> Result<Vec<CommunicationThread>> {
        let stored = self.threads.read().unwrap_or_else(PoisonError::into_inner);
        let mut threads: Vec<CommunicationThread> = stored.values().cloned().collect();
        threads.sort_by(|a, b| {
            a.start_date
                .total_cmp(&b.start_date)
                .then_with(|| a.thread_id.cmp(&b.thread_id))
        });
        Ok(threads)
    }
}
