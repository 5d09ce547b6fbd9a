//! Links `file_scan` events to `milestone` events.
//!
//! A pair is considered when the two timestamps are within the configured
//! window. Its strength grows by a fixed increment for every file the
//! milestone mentions that appears, case-insensitively, inside a name in
//! the scanned tree. Pairs at or below the threshold are dropped.

use std::collections::BTreeSet;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::CorrelationConfig;
use crate::models::{Correlation, EventKind, TimelineEvent, TEMPORAL_FILE_MENTION};
use crate::store::EventStore;

/// Every string stored under a `name` key anywhere in `value`.
///
/// Walks with an explicit stack, so arbitrarily deep trees cannot
/// overflow the call stack.
pub fn collect_names(value: &Value) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut stack = vec![value];

    while let Some(current) = stack.pop() {
        match current {
            Value::Object(map) => {
                if let Some(Value::String(name)) = map.get("name") {
                    names.insert(name.clone());
                }
                stack.extend(map.values());
            }
            Value::Array(items) => stack.extend(items.iter()),
            _ => {}
        }
    }

    names
}

/// Strength contributed by file mentions, capped at 1.0.
pub fn mention_strength(related_files: &[String], names: &BTreeSet<String>, increment: f64) -> f64 {
    let lowered: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
    let hits = related_files
        .iter()
        .filter(|file| {
            let file = file.to_lowercase();
            lowered.iter().any(|name| name.contains(&file))
        })
        .count();
    (hits as f64 * increment).min(1.0)
}

fn related_files(milestone: &TimelineEvent) -> Vec<String> {
    milestone
        .metadata
        .get("related_files")
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Score every (milestone, file scan) pair inside the time window.
pub fn correlate(
    file_events: &[TimelineEvent],
    milestone_events: &[TimelineEvent],
    config: &CorrelationConfig,
) -> Vec<Correlation> {
    let window = config.window_secs();
    // names are extracted once per scan rather than once per pair
    let scans: Vec<(&TimelineEvent, BTreeSet<String>)> = file_events
        .iter()
        .map(|e| (e, collect_names(&e.metadata)))
        .collect();

    let mut correlations = Vec::new();
    for milestone in milestone_events {
        let files = related_files(milestone);
        if files.is_empty() {
            continue;
        }

        for (scan, names) in &scans {
            if (milestone.timestamp - scan.timestamp).abs() > window {
                continue;
            }
            let strength = mention_strength(&files, names, config.increment);
            if strength > config.min_strength {
                correlations.push(Correlation {
                    file_event_id: scan.event_id.clone(),
                    milestone_event_id: milestone.event_id.clone(),
                    strength,
                    correlation_type: TEMPORAL_FILE_MENTION.to_string(),
                });
            }
        }
    }

    correlations
}

/// Read back persisted scans and milestones, correlate, and upsert.
/// Returns the number of correlations written.
pub async fn run_correlation(store: &dyn EventStore, config: &CorrelationConfig) -> Result<usize> {
    let file_events = store.events_of_kind(EventKind::FileScan).await?;
    let milestone_events = store.events_of_kind(EventKind::Milestone).await?;
    debug!(
        "Correlating {} file scans against {} milestones",
        file_events.len(),
        milestone_events.len()
    );

    let correlations = correlate(&file_events, &milestone_events, config);
    let written = store.upsert_correlations(&correlations).await?;
    info!("Stored {} correlations", written);
    Ok(written)
}
