//! Milestone extraction from free text.
//!
//! Classification is deterministic pattern matching. Each category owns an
//! ordered list of regexes that are run case-insensitively, line by line
//! (`.` never crosses a newline), over the subject and body joined by a
//! blank line. Every capture that is still at least `min_capture_chars`
//! long after trimming becomes one [`Milestone`]. Matches from different
//! patterns are not merged; a sentence can yield several candidates and
//! confidence scoring sorts them out downstream.
//!
//! Documents are additionally scanned for structured tags (`TODO:`,
//! `FIXME:`, `DONE:` and friends) which map straight to a category with
//! fixed confidence and priority.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::ExtractionConfig;
use crate::fingerprint::stable_id;
use crate::message::{MessageFormat, ParsedMessage};
use crate::models::{Category, Milestone, Origin, Priority, Status};

const DEADLINE_PATTERNS: &[&str] = &[
    r"due\s+(?:by\s+)?(\w+\s+\d{1,2}(?:th|st|nd|rd)?)",
    r"deadline\s+(?:is\s+)?(\w+\s+\d{1,2})",
    r"needs?\s+to\s+be\s+(?:done|completed|finished)\s+by\s+(\w+\s+\d{1,2})",
    r"submit\s+(?:by\s+)?(\w+\s+\d{1,2})",
];

const REQUIREMENT_PATTERNS: &[&str] = &[
    r"(?:we\s+)?need\s+(?:to\s+)?(.{10,100})",
    r"requirement\s*:\s*(.{10,100})",
    r"must\s+(?:have|include|implement)\s+(.{10,100})",
    r"(?:client|customer)\s+(?:wants|needs|requires)\s+(.{10,100})",
];

const DELIVERABLE_PATTERNS: &[&str] = &[
    r"deliver(?:able)?\s*:\s*(.{10,200})",
    r"(?:will\s+)?provide\s+(.{10,200})",
    r"(?:sending|attaching|submitting)\s+(.{10,200})",
    r"here\s+(?:is|are)\s+(?:the\s+)?(.{10,200})",
    r"completed\s+(.{10,200})",
    r"finished\s+(.{10,200})",
    r"(?:ready|done)\s+(?:with\s+)?(.{10,200})",
];

const MEETING_PATTERNS: &[&str] = &[
    r"meeting\s+(?:on\s+)?(\w+\s+\d{1,2})",
    r"call\s+(?:scheduled\s+)?(?:for\s+)?(\w+\s+\d{1,2})",
    r"let's\s+meet\s+(?:on\s+)?(\w+\s+\d{1,2})",
    r"discussion\s+(?:on\s+)?(\w+\s+\d{1,2})",
];

const DECISION_PATTERNS: &[&str] = &[
    r"(?:we\s+)?(?:decided|agreed)\s+(?:to\s+)?(.{10,100})",
    r"decision\s*:\s*(.{10,100})",
    r"(?:final|approved)\s+(.{10,100})",
    r"go\s+with\s+(.{10,100})",
];

const GENERAL_PATTERNS: &[(Category, &[&str])] = &[
    (Category::Deadline, DEADLINE_PATTERNS),
    (Category::Requirement, REQUIREMENT_PATTERNS),
    (Category::Deliverable, DELIVERABLE_PATTERNS),
    (Category::Meeting, MEETING_PATTERNS),
    (Category::Decision, DECISION_PATTERNS),
];

const STRUCTURED_TAGS: &[(Category, &[&str])] = &[
    (
        Category::Requirement,
        &[r"TODO:\s*(.{10,200})", r"REQUIREMENT:\s*(.{10,200})"],
    ),
    (
        Category::Issue,
        &[r"FIXME:\s*(.{10,200})", r"BUG:\s*(.{10,200})"],
    ),
    (
        Category::Deliverable,
        &[r"DONE:\s*(.{10,200})", r"COMPLETED:\s*(.{10,200})"],
    ),
];

const FILE_REFERENCE_PATTERNS: &[&str] = &[
    r"([a-zA-Z0-9_-]+\.(?:py|js|html|css|json|md|txt|pdf|doc|docx|xlsx|pptx|zip|tar|gz))\b",
    r"(?:file|document|script|module)\s+(?:named\s+)?([a-zA-Z0-9_.-]+)",
    r"([a-zA-Z0-9_/-]+/[a-zA-Z0-9_.-]+)",
    r"(?:folder|directory)\s+([a-zA-Z0-9_/-]+)",
    r"`([^`]+\.[a-zA-Z0-9]+)`",
    r#""([^"]+\.[a-zA-Z0-9]+)""#,
];

const HIGH_PRIORITY_KEYWORDS: &[&str] = &["urgent", "asap", "critical", "immediately", "emergency"];
const MEDIUM_PRIORITY_KEYWORDS: &[&str] = &["important", "priority", "soon", "needed"];
const PROJECT_VOCABULARY: &[&str] = &["project", "deliverable", "requirement"];

const BASE_CONFIDENCE: f64 = 0.5;
const DATED_BONUS: f64 = 0.3;
const VOCABULARY_BONUS: f64 = 0.2;
const SHORT_SPAN_PENALTY: f64 = 0.2;
const SHORT_SPAN_CHARS: usize = 20;
const STRUCTURED_CONFIDENCE: f64 = 0.8;

/// Everything the extractor needs to know about one piece of text.
#[derive(Debug, Clone, Copy)]
pub struct TextSource<'a> {
    /// Text that patterns run over (subject and body already joined).
    pub text: &'a str,
    pub timestamp: f64,
    pub participants: &'a [String],
    /// Path or message id the text came from.
    pub source_id: &'a str,
    pub origin: Origin,
}

struct CategoryPatterns {
    category: Category,
    patterns: Vec<Regex>,
}

pub struct MilestoneExtractor {
    general: Vec<CategoryPatterns>,
    structured: Vec<CategoryPatterns>,
    file_refs: Vec<Regex>,
    title_max_chars: usize,
    min_capture_chars: usize,
}

impl MilestoneExtractor {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        Ok(Self {
            general: compile_categories(GENERAL_PATTERNS)?,
            structured: compile_categories(STRUCTURED_TAGS)?,
            file_refs: FILE_REFERENCE_PATTERNS
                .iter()
                .map(|p| compile(p))
                .collect::<Result<_>>()?,
            title_max_chars: config.title_max_chars,
            min_capture_chars: config.min_capture_chars,
        })
    }

    /// Run the general category patterns over `source.text`.
    pub fn extract(&self, source: &TextSource<'_>) -> Vec<Milestone> {
        if source.text.trim().is_empty() {
            return Vec::new();
        }

        let related_files = self.file_references(source.text);
        let mut milestones = Vec::new();

        for set in &self.general {
            for pattern in &set.patterns {
                for caps in pattern.captures_iter(source.text) {
                    let Some(span) = caps.get(1).or_else(|| caps.get(0)) else {
                        continue;
                    };
                    let span = span.as_str().trim();
                    if span.chars().count() < self.min_capture_chars {
                        continue;
                    }

                    milestones.push(Milestone {
                        id: milestone_id(source.origin, source.source_id, span),
                        timestamp: source.timestamp,
                        title: title_for(set.category, span, self.title_max_chars),
                        description: span.to_string(),
                        category: set.category,
                        priority: priority_for(source.text, span),
                        participants: source.participants.to_vec(),
                        origin: source.origin,
                        origin_id: source.source_id.to_string(),
                        status: Status::Pending,
                        related_files: related_files.clone(),
                        confidence: confidence_for(set.category, span, source.text),
                    });
                }
            }
        }

        milestones
    }

    /// Scan for structured tags. Each hit gets medium priority and a
    /// fixed confidence regardless of context.
    pub fn extract_structured(&self, text: &str, source_id: &str, timestamp: f64) -> Vec<Milestone> {
        let related_files = self.file_references(text);
        let mut milestones = Vec::new();

        for set in &self.structured {
            for pattern in &set.patterns {
                for caps in pattern.captures_iter(text) {
                    let Some(span) = caps.get(1) else {
                        continue;
                    };
                    let span = span.as_str().trim();
                    if span.chars().count() < self.min_capture_chars {
                        continue;
                    }

                    milestones.push(Milestone {
                        id: milestone_id(Origin::Document, source_id, span),
                        timestamp,
                        title: title_for(set.category, span, self.title_max_chars),
                        description: span.to_string(),
                        category: set.category,
                        priority: Priority::Medium,
                        participants: Vec::new(),
                        origin: Origin::Document,
                        origin_id: source_id.to_string(),
                        status: Status::Pending,
                        related_files: related_files.clone(),
                        confidence: STRUCTURED_CONFIDENCE,
                    });
                }
            }
        }

        milestones
    }

    /// Milestones from a parsed email. `.eml` messages without a body yield
    /// none; plain-text notes are scanned as long as the subject or body
    /// has content.
    pub fn extract_message(&self, message: &ParsedMessage) -> Vec<Milestone> {
        if message.format == MessageFormat::Eml && message.body.trim().is_empty() {
            return Vec::new();
        }
        let text = message.full_text();
        self.extract(&TextSource {
            text: &text,
            timestamp: message.timestamp,
            participants: &message.participants,
            source_id: &message.source_id,
            origin: Origin::Email,
        })
    }

    /// Milestones from a free-form document: general patterns plus
    /// structured tags.
    pub fn extract_document(&self, text: &str, source_id: &str, timestamp: f64) -> Vec<Milestone> {
        let mut milestones = self.extract(&TextSource {
            text,
            timestamp,
            participants: &[],
            source_id,
            origin: Origin::Document,
        });
        milestones.extend(self.extract_structured(text, source_id, timestamp));
        milestones
    }

    /// File names and paths mentioned in `text`, deduplicated and sorted.
    pub fn file_references(&self, text: &str) -> Vec<String> {
        let mut found = BTreeSet::new();
        for pattern in &self.file_refs {
            for caps in pattern.captures_iter(text) {
                if let Some(m) = caps.get(1) {
                    found.insert(m.as_str().to_string());
                }
            }
        }
        found.into_iter().collect()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("(?im){}", pattern))
        .with_context(|| format!("invalid milestone pattern: {}", pattern))
}

fn compile_categories(table: &[(Category, &[&str])]) -> Result<Vec<CategoryPatterns>> {
    table
        .iter()
        .map(|(category, patterns)| {
            Ok(CategoryPatterns {
                category: *category,
                patterns: patterns.iter().map(|p| compile(p)).collect::<Result<_>>()?,
            })
        })
        .collect()
}

fn milestone_id(origin: Origin, source_id: &str, span: &str) -> String {
    format!("{}_{}", origin.id_prefix(), stable_id(&[source_id, span]))
}

/// High if any urgent keyword appears in the text or span, else medium
/// for softer keywords, else low.
pub fn priority_for(text: &str, span: &str) -> Priority {
    let combined = format!("{} {}", text, span).to_lowercase();
    if HIGH_PRIORITY_KEYWORDS.iter().any(|k| combined.contains(k)) {
        Priority::High
    } else if MEDIUM_PRIORITY_KEYWORDS.iter().any(|k| combined.contains(k)) {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// Confidence in [0.0, 1.0] for a general-pattern match.
pub fn confidence_for(category: Category, span: &str, text: &str) -> f64 {
    let mut confidence = BASE_CONFIDENCE;

    let dated = matches!(category, Category::Deadline | Category::Meeting);
    if dated && span.chars().any(|c| c.is_ascii_digit()) {
        confidence += DATED_BONUS;
    }

    let lower = text.to_lowercase();
    if PROJECT_VOCABULARY.iter().any(|w| lower.contains(w)) {
        confidence += VOCABULARY_BONUS;
    }

    if span.chars().count() < SHORT_SPAN_CHARS {
        confidence -= SHORT_SPAN_PENALTY;
    }

    confidence.clamp(0.0, 1.0)
}

/// Category symbol followed by the span cut to `max_chars`.
pub fn title_for(category: Category, span: &str, max_chars: usize) -> String {
    let head: String = span.chars().take(max_chars).collect();
    let mut title = head.trim().to_string();
    if span.chars().count() > max_chars {
        title.push_str("...");
    }
    format!("{} {}", category.symbol(), title)
}
