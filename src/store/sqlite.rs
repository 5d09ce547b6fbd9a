//! SQLite-backed [`EventStore`].
//!
//! Each batch of writes runs inside one transaction. Metadata, participant
//! lists and topics are stored as JSON text.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::models::{CommunicationThread, Correlation, EventKind, TimelineEvent};

use super::{EventStore, StoredCorrelation};

pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn event_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<TimelineEvent> {
    let event_id: String = row.get("event_id");
    let kind: String = row.get("event_type");
    let metadata: String = row.get("metadata");
    Ok(TimelineEvent {
        timestamp: row.get("timestamp"),
        event_type: kind.parse()?,
        metadata: serde_json::from_str(&metadata)
            .with_context(|| format!("corrupt metadata for event {}", event_id))?,
        event_id,
    })
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn upsert_events(&self, events: &[TimelineEvent]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for event in events {
            sqlx::query(
                r#"
                INSERT INTO events (event_id, timestamp, event_type, metadata)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(event_id) DO UPDATE SET
                    timestamp = excluded.timestamp,
                    event_type = excluded.event_type,
                    metadata = excluded.metadata
                "#,
            )
            .bind(&event.event_id)
            .bind(event.timestamp)
            .bind(event.event_type.as_str())
            .bind(serde_json::to_string(&event.metadata)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(events.len())
    }

    async fn events(&self) -> Result<Vec<TimelineEvent>> {
        let rows = sqlx::query(
            "SELECT event_id, timestamp, event_type, metadata FROM events ORDER BY timestamp, event_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }

    async fn events_of_kind(&self, kind: EventKind) -> Result<Vec<TimelineEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, timestamp, event_type, metadata FROM events
            WHERE event_type = ?
            ORDER BY timestamp, event_id
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }

    async fn upsert_correlations(&self, correlations: &[Correlation]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for c in correlations {
            sqlx::query(
                r#"
                INSERT INTO correlations
                    (file_event_id, milestone_event_id, correlation_strength, correlation_type)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(file_event_id, milestone_event_id) DO UPDATE SET
                    correlation_strength = excluded.correlation_strength,
                    correlation_type = excluded.correlation_type
                "#,
            )
            .bind(&c.file_event_id)
            .bind(&c.milestone_event_id)
            .bind(c.strength)
            .bind(&c.correlation_type)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(correlations.len())
    }

    async fn correlations(&self) -> Result<Vec<StoredCorrelation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, file_event_id, milestone_event_id, correlation_strength, correlation_type
            FROM correlations ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| StoredCorrelation {
                id: row.get("id"),
                correlation: Correlation {
                    file_event_id: row.get("file_event_id"),
                    milestone_event_id: row.get("milestone_event_id"),
                    strength: row.get("correlation_strength"),
                    correlation_type: row.get("correlation_type"),
                },
            })
            .collect())
    }

    async fn upsert_threads(&self, threads: &[CommunicationThread]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for t in threads {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO communication_threads
                    (thread_id, subject, participants, start_date, end_date, message_count, key_topics)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&t.thread_id)
            .bind(&t.subject)
            .bind(serde_json::to_string(&t.participants)?)
            .bind(t.start_date)
            .bind(t.end_date)
            .bind(t.message_count as i64)
            .bind(serde_json::to_string(&t.key_topics)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(threads.len())
    }

    async fn threads(&self) -> Result<Vec<CommunicationThread>> {
        let rows = sqlx::query(
            r#"
            SELECT thread_id, subject, participants, start_date, end_date, message_count, key_topics
            FROM communication_threads ORDER BY start_date, thread_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let participants: String = row.get("participants");
                let key_topics: String = row.get("key_topics");
                let message_count: i64 = row.get("message_count");
                Ok(CommunicationThread {
                    thread_id: row.get("thread_id"),
                    subject: row.get("subject"),
                    participants: serde_json::from_str(&participants)?,
                    start_date: row.get("start_date"),
                    end_date: row.get("end_date"),
                    message_count: message_count.max(0) as u64,
                    key_topics: serde_json::from_str(&key_topics)?,
                })
            })
            .collect()
    }
}
