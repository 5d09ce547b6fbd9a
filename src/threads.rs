//! Conversation grouping.
//!
//! Messages are clustered by their normalized subject plus the exact set
//! of participants. A reply that adds a recipient therefore starts a new
//! thread.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use tracing::warn;

use crate::fingerprint::sha256_hex;
use crate::message::{list_message_files, parse_message, ParsedMessage};
use crate::models::CommunicationThread;

const REPLY_PREFIXES: [&str; 3] = ["re:", "fw:", "fwd:"];
const MAX_TOPICS: usize = 5;

/// Lowercase and trim, then strip each reply/forward prefix at most once.
pub fn normalize_subject(subject: &str) -> String {
    let mut subject = subject.trim().to_lowercase();
    for prefix in REPLY_PREFIXES {
        if let Some(rest) = subject.strip_prefix(prefix) {
            subject = rest.trim().to_string();
        }
    }
    subject
}

/// Most frequent whitespace-delimited words; ties keep first-seen order.
pub fn key_topics(subject: &str) -> Vec<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for word in subject.split_whitespace() {
        match counts.iter_mut().find(|(w, _)| *w == word) {
            Some((_, n)) => *n += 1,
            None => counts.push((word, 1)),
        }
    }
    // stable sort keeps first-seen order among equal counts
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(MAX_TOPICS)
        .map(|(w, _)| w.to_string())
        .collect()
}

pub fn thread_id(subject: &str, participants: &[String]) -> String {
    sha256_hex(&format!("{}{}", subject, participants.join(" ")))
}

#[derive(Default)]
struct Group {
    timestamps: Vec<f64>,
}

/// Group already parsed messages. Output is ordered by start date, then
/// thread id, so repeated runs produce identical results.
pub fn group_threads(messages: &[ParsedMessage]) -> Vec<CommunicationThread> {
    let mut groups: HashMap<(String, BTreeSet<String>), Group> = HashMap::new();

    for message in messages {
        let participants: BTreeSet<String> = message
            .participants
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        groups
            .entry((normalize_subject(&message.subject), participants))
            .or_default()
            .timestamps
            .push(message.timestamp);
    }

    let mut threads: Vec<CommunicationThread> = groups
        .into_iter()
        .map(|((subject, participants), group)| {
            let participants: Vec<String> = participants.into_iter().collect();
            let start_date = group.timestamps.iter().copied().fold(f64::INFINITY, f64::min);
            let end_date = group
                .timestamps
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);
            CommunicationThread {
                thread_id: thread_id(&subject, &participants),
                key_topics: key_topics(&subject),
                subject,
                participants,
                start_date,
                end_date,
                message_count: group.timestamps.len() as u64,
            }
        })
        .collect();

    threads.sort_by(|a, b| {
        a.start_date
            .total_cmp(&b.start_date)
            .then_with(|| a.thread_id.cmp(&b.thread_id))
    });
    threads
}

/// Parse every message in `dir` and group the results. A missing directory
/// is logged and yields no threads.
pub fn threads_from_dir(dir: &Path) -> Vec<CommunicationThread> {
    if !dir.is_dir() {
        warn!("Email directory not found: {}", dir.display());
        return Vec::new();
    }

    let mut messages = Vec::new();
    for path in list_message_files(dir) {
        match parse_message(&path) {
            Ok(Some(message)) => messages.push(message),
            Ok(None) => {}
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    group_threads(&messages)
}
