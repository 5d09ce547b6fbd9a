//! Batch orchestration.
//!
//! A run is strictly sequential: scan the tree, mine the message and
//! document directories, sort everything by timestamp, persist, then
//! optionally correlate and export. Only a bad scan root or a storage
//! failure aborts the run; unreadable messages and documents are logged
//! and skipped.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::correlate::run_correlation;
use crate::db;
use crate::document::{list_document_files, read_document};
use crate::export::{export_threads, export_timeline};
use crate::message::{list_message_files, parse_message, MessageError};
use crate::migrate::apply_schema;
use crate::milestone::MilestoneExtractor;
use crate::models::TimelineEvent;
use crate::recommend::{load_phrases, PhraseMatcher};
use crate::scanner::TreeScanner;
use crate::store::sqlite::SqliteEventStore;
use crate::store::EventStore;
use crate::threads::threads_from_dir;

/// Inputs of `timeline run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub scan_dir: Option<PathBuf>,
    pub email_dir: Option<PathBuf>,
    pub docs_dir: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub correlate: bool,
    /// Overrides `[recommendations].phrases_file`.
    pub recommendations: Option<PathBuf>,
}

impl RunOptions {
    pub fn has_inputs(&self) -> bool {
        self.scan_dir.is_some() || self.email_dir.is_some() || self.docs_dir.is_some()
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunReport {
    pub file_scans: usize,
    pub email_milestones: usize,
    pub document_milestones: usize,
    pub recommendations: usize,
    pub skipped: usize,
    pub stored: usize,
    pub correlations: Option<usize>,
}

/// Everything needed to turn input directories into events.
pub struct Collector {
    scanner: TreeScanner,
    extractor: MilestoneExtractor,
    phrases: Option<PhraseMatcher>,
}

impl Collector {
    pub fn new(config: &Config, phrases_file: Option<&Path>) -> Result<Self> {
        let phrases_file = phrases_file.or(config.recommendations.phrases_file.as_deref());
        let phrases = match phrases_file {
            Some(path) => {
                let phrases = load_phrases(path)?;
                info!("Loaded {} recommendation phrases", phrases.len());
                Some(PhraseMatcher::new(&phrases)?).filter(|m| !m.is_empty())
            }
            None => None,
        };

        Ok(Self {
            scanner: TreeScanner::from_config(&config.scanner)?,
            extractor: MilestoneExtractor::new(&config.extraction)?,
            phrases,
        })
    }

    pub fn scan(&self, root: &Path, report: &mut RunReport) -> Result<TimelineEvent> {
        let event = self
            .scanner
            .scan_event(root)
            .with_context(|| format!("Failed to scan {}", root.display()))?;
        report.file_scans += 1;
        Ok(event)
    }

    pub fn emails(&self, dir: &Path, report: &mut RunReport) -> Result<Vec<TimelineEvent>> {
        if !dir.is_dir() {
            warn!("Email directory not found: {}", dir.display());
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        for path in list_message_files(dir) {
            let message = match parse_message(&path) {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(MessageError::UnsupportedFormat(p)) => {
                    info!("No decoder for {}, skipping", p.display());
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    report.skipped += 1;
                    continue;
                }
            };

            for milestone in self.extractor.extract_message(&message) {
                events.push(TimelineEvent::from_milestone(&milestone)?);
                report.email_milestones += 1;
            }
            events.extend(self.recommendations(
                &message.full_text(),
                &message.source_id,
                message.timestamp,
                report,
            ));
        }
        Ok(events)
    }

    pub fn documents(&self, dir: &Path, report: &mut RunReport) -> Result<Vec<TimelineEvent>> {
        if !dir.is_dir() {
            warn!("Document directory not found: {}", dir.display());
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        for path in list_document_files(dir) {
            let doc = match read_document(&path) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    report.skipped += 1;
                    continue;
                }
            };

            for milestone in self
                .extractor
                .extract_document(&doc.text, &doc.source_id, doc.modified)
            {
                events.push(TimelineEvent::from_milestone(&milestone)?);
                report.document_milestones += 1;
            }
            events.extend(self.recommendations(&doc.text, &doc.source_id, doc.modified, report));
        }
        Ok(events)
    }

    fn recommendations(
        &self,
        text: &str,
        source_id: &str,
        timestamp: f64,
        report: &mut RunReport,
    ) -> Vec<TimelineEvent> {
        let Some(matcher) = &self.phrases else {
            return Vec::new();
        };
        let found = matcher.find(text, source_id, timestamp);
        report.recommendations += found.len();
        found
    }

    /// Gather every event for `options`, sorted by timestamp.
    pub fn collect(&self, options: &RunOptions, report: &mut RunReport) -> Result<Vec<TimelineEvent>> {
        let mut events = Vec::new();
        if let Some(dir) = &options.scan_dir {
            events.push(self.scan(dir, report)?);
        }
        if let Some(dir) = &options.email_dir {
            events.extend(self.emails(dir, report)?);
        }
        if let Some(dir) = &options.docs_dir {
            events.extend(self.documents(dir, report)?);
        }
        events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Ok(events)
    }
}

/// Collect, persist, and optionally correlate and export.
pub async fn run_pipeline(
    store: &dyn EventStore,
    config: &Config,
    options: &RunOptions,
) -> Result<RunReport> {
    let collector = Collector::new(config, options.recommendations.as_deref())?;
    let mut report = RunReport::default();

    let events = collector.collect(options, &mut report)?;
    report.stored = store.upsert_events(&events).await?;
    info!("Stored {} events", report.stored);

    if options.correlate {
        report.correlations = Some(run_correlation(store, &config.correlation).await?);
    }
    if let Some(output) = &options.output {
        export_timeline(store, Some(output)).await?;
    }
    Ok(report)
}

async fn open_store(config: &Config) -> Result<SqliteEventStore> {
    let pool = db::connect(&config.db.path).await?;
    apply_schema(&pool).await?;
    Ok(SqliteEventStore::new(pool))
}

/// `timeline run`
pub async fn run(config: &Config, options: &RunOptions) -> Result<()> {
    if !options.has_inputs() {
        println!("Nothing to do: pass --scan-dir, --email-dir or --docs-dir.");
        return Ok(());
    }

    let store = open_store(config).await?;
    let report = run_pipeline(&store, config, options).await?;
    store.close().await;

    println!("run");
    println!("  file scans: {}", report.file_scans);
    println!("  email milestones: {}", report.email_milestones);
    println!("  document milestones: {}", report.document_milestones);
    println!("  recommendations: {}", report.recommendations);
    println!("  skipped files: {}", report.skipped);
    println!("  events stored: {}", report.stored);
    if let Some(n) = report.correlations {
        println!("  correlations: {}", n);
    }
    println!("ok");
    Ok(())
}

/// `timeline correlate`
pub async fn correlate(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let written = run_correlation(&store, &config.correlation).await?;
    store.close().await;
    println!("Analyzed and stored {} correlations", written);
    Ok(())
}

/// `timeline export`
pub async fn export(config: &Config, output: Option<&Path>) -> Result<()> {
    let store = open_store(config).await?;
    export_timeline(&store, output).await?;
    store.close().await;
    Ok(())
}

/// `timeline threads`
pub async fn threads(config: &Config, email_dir: &Path, output: Option<&Path>) -> Result<()> {
    let threads = threads_from_dir(email_dir);
    let store = open_store(config).await?;
    store.upsert_threads(&threads).await?;
    info!("Stored {} communication threads", threads.len());
    export_threads(&store, output).await?;
    store.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventKind;
    use crate::store::memory::InMemoryEventStore;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("project");
        fs::create_dir_all(project.join("docs")).unwrap();
        fs::write(project.join("docs/report.docx"), b"fake").unwrap();
        fs::write(project.join("main.py"), "print('hi')").unwrap();

        let emails = tmp.path().join("emails");
        fs::create_dir(&emails).unwrap();
        fs::write(
            emails.join("kickoff.txt"),
            format!(
                "Subject: Kickoff\nFrom: alice@example.com\nDate: {}\n\n\
                 The Report.docx is due by March 5th. We should add charts.\n",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
            ),
        )
        .unwrap();
        fs::write(emails.join("legacy.msg"), b"\xd0\xcf").unwrap();

        let docs = tmp.path().join("docs");
        fs::create_dir(&docs).unwrap();
        fs::write(docs.join("plan.md"), "TODO: write the onboarding guide for users\n").unwrap();
        tmp
    }

    fn options(tmp: &TempDir) -> RunOptions {
        RunOptions {
            scan_dir: Some(tmp.path().join("project")),
            email_dir: Some(tmp.path().join("emails")),
            docs_dir: Some(tmp.path().join("docs")),
            correlate: true,
            ..RunOptions::default()
        }
    }

    #[test]
    fn no_inputs_means_nothing_to_do() {
        assert!(!RunOptions::default().has_inputs());
        assert!(RunOptions {
            docs_dir: Some(PathBuf::from("d")),
            ..RunOptions::default()
        }
        .has_inputs());
    }

    #[tokio::test]
    async fn full_run_stores_sorted_events_and_correlates() {
        let tmp = fixture();
        let store = InMemoryEventStore::new();
        let report = run_pipeline(&store, &Config::default(), &options(&tmp))
            .await
            .unwrap();

        assert_eq!(report.file_scans, 1);
        assert!(report.email_milestones >= 1);
        assert!(report.document_milestones >= 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.recommendations, 0);
        assert_eq!(report.correlations, Some(1));

        let events = store.events().await.unwrap();
        assert_eq!(events.len(), report.stored);
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(
            store.events_of_kind(EventKind::FileScan).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn rerun_does_not_duplicate_milestones() {
        let tmp = fixture();
        let store = InMemoryEventStore::new();
        let opts = RunOptions {
            scan_dir: None,
            ..options(&tmp)
        };
        run_pipeline(&store, &Config::default(), &opts).await.unwrap();
        let first = store.events().await.unwrap().len();
        run_pipeline(&store, &Config::default(), &opts).await.unwrap();
        assert_eq!(store.events().await.unwrap().len(), first);
    }

    #[tokio::test]
    async fn recommendations_follow_phrase_file() {
        let tmp = fixture();
        let phrases = tmp.path().join("phrases.txt");
        fs::write(&phrases, "# ideas\nwe should\n").unwrap();

        let store = InMemoryEventStore::new();
        let opts = RunOptions {
            recommendations: Some(phrases),
            ..options(&tmp)
        };
        let report = run_pipeline(&store, &Config::default(), &opts).await.unwrap();
        assert_eq!(report.recommendations, 1);

        let recs = store
            .events_of_kind(EventKind::Recommendation)
            .await
            .unwrap();
        assert_eq!(recs[0].metadata["context"], "We should add charts.");
    }

    #[tokio::test]
    async fn missing_scan_root_is_fatal_but_missing_mail_is_not() {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryEventStore::new();

        let bad_root = RunOptions {
            scan_dir: Some(tmp.path().join("nope")),
            ..RunOptions::default()
        };
        assert!(run_pipeline(&store, &Config::default(), &bad_root)
            .await
            .is_err());

        let bad_mail = RunOptions {
            email_dir: Some(tmp.path().join("nope")),
            ..RunOptions::default()
        };
        let report = run_pipeline(&store, &Config::default(), &bad_mail)
            .await
            .unwrap();
        assert_eq!(report.stored, 0);
    }
}
