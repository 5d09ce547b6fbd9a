//! JSON exports for the timeline visualizer.
//!
//! Two documents are produced: the unified timeline (events, per-type
//! counts, time range and correlations) and the communication thread list.
//! Field names are consumed by the front end and must not change.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::models::{CommunicationThread, TimelineEvent};
use crate::store::{EventStore, StoredCorrelation};

#[derive(Debug, Serialize)]
pub struct TimelineDocument {
    pub metadata: TimelineMetadata,
    pub events: Vec<TimelineEvent>,
    pub correlations: Vec<StoredCorrelation>,
}

#[derive(Debug, Serialize)]
pub struct TimelineMetadata {
    pub generated_at: String,
    pub total_events: usize,
    pub event_types: BTreeMap<String, usize>,
    pub time_range: TimeRange,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Serialize)]
pub struct ThreadDocument {
    pub threads: Vec<CommunicationThread>,
}

pub async fn build_timeline(store: &dyn EventStore) -> Result<TimelineDocument> {
    let events = store.events().await?;
    let correlations = store.correlations().await?;

    let mut event_types = BTreeMap::new();
    for event in &events {
        *event_types.entry(event.event_type.to_string()).or_insert(0) += 1;
    }

    let time_range = TimeRange {
        start: events.first().map(|e| e.timestamp).unwrap_or(0.0),
        end: events.last().map(|e| e.timestamp).unwrap_or(0.0),
    };

    Ok(TimelineDocument {
        metadata: TimelineMetadata {
            generated_at: chrono::Utc::now().to_rfc3339(),
            total_events: events.len(),
            event_types,
            time_range,
        },
        events,
        correlations,
    })
}

/// Export the unified timeline.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn export_timeline(store: &dyn EventStore, output: Option<&Path>) -> Result<()> {
    let document = build_timeline(store).await?;
    write_json(&document, output)?;

    if let Some(path) = output {
        println!("Unified timeline exported to: {}", path.display());
        println!("Total events: {}", document.metadata.total_events);
        let types: Vec<String> = document
            .metadata
            .event_types
            .iter()
            .map(|(kind, n)| format!("{}={}", kind, n))
            .collect();
        println!("Event types: {}", types.join(", "));
        println!("Correlations: {}", document.correlations.len());
    }
    Ok(())
}

/// Export all stored threads ordered by start date.
pub async fn export_threads(store: &dyn EventStore, output: Option<&Path>) -> Result<()> {
    let threads = store.threads().await?;
    let count = threads.len();
    write_json(&ThreadDocument { threads }, output)?;

    if let Some(path) = output {
        println!(
            "Exported {} communication threads to {}",
            count,
            path.display()
        );
    }
    Ok(())
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => println!("{}", json),
    }
    Ok(())
}
