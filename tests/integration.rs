use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

fn timeline_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_timeline"))
}

/// Project tree, mail folder, docs folder and a config pointing the
/// database into the temp dir.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let project = root.join("project");
    fs::create_dir_all(project.join("reports")).unwrap();
    fs::write(project.join("reports/Report.docx"), b"not really a docx").unwrap();
    fs::write(project.join("README.md"), "# Project\n").unwrap();
    fs::write(project.join("cache.pyc"), b"\0\0").unwrap();

    let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let mail = root.join("mail");
    fs::create_dir_all(&mail).unwrap();
    fs::write(
        mail.join("01-kickoff.txt"),
        format!(
            "Subject: Kickoff\nFrom: alice@example.com\nTo: bob@example.com\nDate: {}\n\n\
             The report.docx is due by March 5th. This is urgent.\n",
            now
        ),
    )
    .unwrap();
    fs::write(
        mail.join("02-reply.txt"),
        format!(
            "Subject: Re: Kickoff\nFrom: bob@example.com\nTo: alice@example.com\nDate: {}\n\n\
             Thanks, we should review the outline first.\n",
            now
        ),
    )
    .unwrap();

    let docs = root.join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("plan.md"),
        "# Plan\nTODO: publish the onboarding checklist\nFIXME: broken link in the intro page\n",
    )
    .unwrap();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_path = config_dir.join("timeline.toml");
    fs::write(
        &config_path,
        format!("[db]\npath = \"{}/data/timeline.sqlite\"\n", root.display()),
    )
    .unwrap();

    (tmp, config_path)
}

fn run_timeline(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = timeline_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run timeline binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_timeline(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, success) = run_timeline(&config_path, &["init"]);
    assert!(success, "second init failed");
}

#[test]
fn test_run_without_inputs_is_a_no_op() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_timeline(&config_path, &["run"]);
    assert!(success);
    assert!(stdout.contains("Nothing to do"));
}

#[test]
fn test_full_run_exports_timeline() {
    let (tmp, config_path) = setup_test_env();
    let root = tmp.path();
    let output = root.join("out/unified_timeline.json");

    let (stdout, stderr, success) = run_timeline(
        &config_path,
        &[
            "run",
            "--scan-dir",
            &path_arg(&root.join("project")),
            "--email-dir",
            &path_arg(&root.join("mail")),
            "--docs-dir",
            &path_arg(&root.join("docs")),
            "--correlate",
            "--output",
            &path_arg(&output),
        ],
    );
    assert!(success, "run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("file scans: 1"));
    assert!(stdout.contains("correlations: 1"));
    assert!(stdout.contains("ok"));

    let doc = read_json(&output);
    let events = doc["events"].as_array().unwrap();
    assert_eq!(doc["metadata"]["total_events"], events.len());
    assert_eq!(doc["metadata"]["event_types"]["file_scan"], 1);

    let scan = events
        .iter()
        .find(|e| e["event_type"] == "file_scan")
        .unwrap();
    // cache.pyc is ignored by the default glob rules
    assert_eq!(scan["metadata"]["file_count"], 2);
    assert!(scan["event_id"].as_str().unwrap().starts_with("filescan_"));

    let deadline = events
        .iter()
        .find(|e| e["metadata"]["category"] == "deadline")
        .expect("deadline milestone");
    assert_eq!(deadline["metadata"]["priority"], "high");
    assert_eq!(deadline["metadata"]["status"], "pending");
    assert_eq!(deadline["metadata"]["related_files"][0], "report.docx");

    let structured: Vec<&Value> = events
        .iter()
        .filter(|e| e["metadata"]["confidence"] == 0.8)
        .collect();
    assert_eq!(structured.len(), 2);

    let corr = &doc["correlations"][0];
    assert_eq!(corr["file_event_id"], scan["event_id"]);
    assert_eq!(corr["milestone_event_id"], deadline["event_id"]);
    assert_eq!(corr["correlation_type"], "temporal_file_mention");
    assert!(corr["correlation_strength"].as_f64().unwrap() >= 0.5);

    let timestamps: Vec<f64> = events
        .iter()
        .map(|e| e["timestamp"].as_f64().unwrap())
        .collect();
    assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_rerun_is_idempotent() {
    let (tmp, config_path) = setup_test_env();
    let mail = path_arg(&tmp.path().join("mail"));
    let docs = path_arg(&tmp.path().join("docs"));
    let args = ["run", "--email-dir", &mail, "--docs-dir", &docs];

    run_timeline(&config_path, &args);
    let first = tmp.path().join("first.json");
    run_timeline(&config_path, &["export", "--output", &path_arg(&first)]);

    run_timeline(&config_path, &args);
    let second = tmp.path().join("second.json");
    run_timeline(&config_path, &["export", "--output", &path_arg(&second)]);

    assert_eq!(
        read_json(&first)["metadata"]["total_events"],
        read_json(&second)["metadata"]["total_events"]
    );
}

#[test]
fn test_correlate_command_is_idempotent() {
    let (tmp, config_path) = setup_test_env();
    let root = tmp.path();
    run_timeline(
        &config_path,
        &[
            "run",
            "--scan-dir",
            &path_arg(&root.join("project")),
            "--email-dir",
            &path_arg(&root.join("mail")),
        ],
    );

    for _ in 0..2 {
        let (stdout, _, success) = run_timeline(&config_path, &["correlate"]);
        assert!(success);
        assert!(stdout.contains("stored 1 correlations"));
    }

    let output = root.join("timeline.json");
    run_timeline(&config_path, &["export", "--output", &path_arg(&output)]);
    assert_eq!(read_json(&output)["correlations"].as_array().unwrap().len(), 1);
}

#[test]
fn test_recommendations_from_phrase_file() {
    let (tmp, config_path) = setup_test_env();
    let phrases = tmp.path().join("phrases.txt");
    fs::write(&phrases, "# suggestions\nwe should\n").unwrap();
    let output = tmp.path().join("timeline.json");

    let (_, stderr, success) = run_timeline(
        &config_path,
        &[
            "run",
            "--email-dir",
            &path_arg(&tmp.path().join("mail")),
            "--recommendations",
            &path_arg(&phrases),
            "--output",
            &path_arg(&output),
        ],
    );
    assert!(success, "run failed: {}", stderr);

    let doc = read_json(&output);
    let recs: Vec<&Value> = doc["events"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["event_type"] == "recommendation")
        .collect();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0]["metadata"]["phrase"], "we should");
    // no terminator before the match, so the context is the surrounding window
    let context = recs[0]["metadata"]["context"].as_str().unwrap();
    assert!(context.contains("Thanks, we should review the outline first."));
}

#[test]
fn test_threads_export() {
    let (tmp, config_path) = setup_test_env();
    let output = tmp.path().join("threads.json");

    let (stdout, stderr, success) = run_timeline(
        &config_path,
        &[
            "threads",
            "--email-dir",
            &path_arg(&tmp.path().join("mail")),
            "--output",
            &path_arg(&output),
        ],
    );
    assert!(success, "threads failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Exported 1 communication threads"));

    let doc = read_json(&output);
    let thread = &doc["threads"][0];
    assert_eq!(thread["subject"], "kickoff");
    assert_eq!(thread["message_count"], 2);
    assert_eq!(thread["participants"].as_array().unwrap().len(), 2);
    assert_eq!(thread["key_topics"][0], "kickoff");
}

#[test]
fn test_missing_scan_root_fails() {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_timeline(
        &config_path,
        &["run", "--scan-dir", &path_arg(&tmp.path().join("nope"))],
    );
    assert!(!success);
    assert!(stderr.contains("nope"), "stderr: {}", stderr);
}

#[test]
fn test_db_flag_overrides_config() {
    let (tmp, config_path) = setup_test_env();
    let db = tmp.path().join("elsewhere/override.sqlite");

    let (_, _, success) = run_timeline(&config_path, &["--db", &path_arg(&db), "init"]);
    assert!(success);
    assert!(db.exists());
}

#[test]
fn test_stats_after_run() {
    let (tmp, config_path) = setup_test_env();
    run_timeline(
        &config_path,
        &["run", "--docs-dir", &path_arg(&tmp.path().join("docs"))],
    );

    let (stdout, _, success) = run_timeline(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("milestone"));
    assert!(stdout.contains("Correlations:  0"));
}
