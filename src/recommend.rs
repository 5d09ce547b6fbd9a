//! Literal phrase matching for `recommendation` events.
//!
//! Phrases come from a plain text file, one per line. Each case-insensitive
//! occurrence in a message or document becomes one event carrying the
//! sentence around the match.

use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::json;

use crate::fingerprint::stable_id;
use crate::models::{EventKind, TimelineEvent};

/// Characters that end a sentence when locating match context.
const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];
/// Characters of context kept on each side when no sentence is found.
const FALLBACK_WINDOW_CHARS: usize = 60;

/// Non-blank lines that do not start with `#`, trimmed.
pub fn parse_phrases(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn load_phrases(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read recommendation phrases: {}", path.display()))?;
    Ok(parse_phrases(&content))
}

pub struct PhraseMatcher {
    phrases: Vec<(String, Regex)>,
}

impl PhraseMatcher {
    pub fn new(phrases: &[String]) -> Result<Self> {
        let phrases = phrases
            .iter()
            .map(|phrase| {
                let re = Regex::new(&format!("(?i){}", regex::escape(phrase)))
                    .with_context(|| format!("invalid phrase: {}", phrase))?;
                Ok((phrase.clone(), re))
            })
            .collect::<Result<_>>()?;
        Ok(Self { phrases })
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// One `recommendation` event per phrase occurrence in `text`.
    pub fn find(&self, text: &str, source_id: &str, timestamp: f64) -> Vec<TimelineEvent> {
        let mut events = Vec::new();
        for (phrase, re) in &self.phrases {
            for m in re.find_iter(text) {
                let offset = m.start().to_string();
                events.push(TimelineEvent {
                    event_id: format!(
                        "recommendation_{}",
                        stable_id(&[source_id, phrase, &offset])
                    ),
                    timestamp,
                    event_type: EventKind::Recommendation,
                    metadata: json!({
                        "phrase": phrase,
                        "context": context_around(text, m.start(), m.end()),
                        "source_id": source_id,
                    }),
                });
            }
        }
        events
    }
}

/// The sentence containing `text[start..end]`, terminator included. Falls
/// back to a fixed window when either side has no terminator.
pub fn context_around(text: &str, start: usize, end: usize) -> String {
    let before = text[..start].rfind(SENTENCE_TERMINATORS);
    let after = text[end..].find(SENTENCE_TERMINATORS);

    match (before, after) {
        (Some(b), Some(a)) => text[b + 1..end + a + 1].trim().to_string(),
        _ => {
            let from = text[..start]
                .char_indices()
                .rev()
                .nth(FALLBACK_WINDOW_CHARS - 1)
                .map(|(i, _)| i)
                .unwrap_or(0);
            let to = text[end..]
                .char_indices()
                .nth(FALLBACK_WINDOW_CHARS)
                .map(|(i, _)| end + i)
                .unwrap_or(text.len());
            text[from..to].trim().to_string()
        }
    }
}
