//! Store statistics.
//!
//! A quick summary of what the timeline holds: event counts per type,
//! correlations, threads and the covered time range. Used by
//! `timeline stats`.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::migrate::apply_schema;
use crate::store::sqlite::SqliteEventStore;
use crate::store::EventStore;

#[derive(Debug, Default, PartialEq)]
pub struct TimelineStats {
    pub total_events: usize,
    pub by_type: BTreeMap<String, usize>,
    pub correlations: usize,
    pub threads: usize,
    /// Earliest and latest event timestamps.
    pub range: Option<(f64, f64)>,
}

pub async fn collect_stats(store: &dyn EventStore) -> Result<TimelineStats> {
    let events = store.events().await?;
    let mut by_type = BTreeMap::new();
    for event in &events {
        *by_type.entry(event.event_type.to_string()).or_insert(0) += 1;
    }

    let range = match (events.first(), events.last()) {
        (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
        _ => None,
    };

    Ok(TimelineStats {
        total_events: events.len(),
        by_type,
        correlations: store.correlations().await?.len(),
        threads: store.threads().await?.len(),
        range,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    apply_schema(&pool).await?;
    let store = SqliteEventStore::new(pool);
    let stats = collect_stats(&store).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Timeline Stats");
    println!("==============");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Events:        {}", stats.total_events);
    for (kind, count) in &stats.by_type {
        println!("    {:<18} {:>6}", kind, count);
    }
    println!("  Correlations:  {}", stats.correlations);
    println!("  Threads:       {}", stats.threads);
    if let Some((start, end)) = stats.range {
        println!("  From:          {}", format_ts(start));
        println!("  To:            {}", format_ts(end));
    }
    println!();

    store.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts(ts: f64) -> String {
    chrono::DateTime::from_timestamp(ts.floor() as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
