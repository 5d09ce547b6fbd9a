//! Recursive file-tree scanner.
//!
//! Walks a directory depth-first and produces a [`FolderNode`] whose sizes
//! and file counts are aggregated bottom-up. Child order never depends on
//! the order the OS lists entries in: files come first, then folders,
//! each sorted case-insensitively by name.
//!
//! Only the root is allowed to fail the scan. Any file or subdirectory
//! that cannot be read is logged and contributes nothing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use anyhow::Result;
use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::ScannerConfig;
use crate::fingerprint::{file_fingerprint, stable_id};
use crate::models::{EventKind, FileNode, FolderNode, TimelineEvent, TreeNode};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("directory does not exist: {0}")]
    RootNotFound(PathBuf),
    #[error("path is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("cannot read directory {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusion rules applied to every entry below the scan root.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    names: Vec<String>,
    globs: GlobSet,
}

impl IgnoreRules {
    /// `names` match an entry whose name equals the string or whose path
    /// relative to the root contains it. `globs` are wildcard patterns
    /// (`*.pyc`) matched against the entry name.
    pub fn new(names: &[String], globs: &[String]) -> Result<Self> {
        Ok(Self {
            names: names.to_vec(),
            globs: build_globset(globs)?,
        })
    }

    pub fn from_config(config: &ScannerConfig) -> Result<Self> {
        Self::new(&config.ignore_names, &config.ignore_globs)
    }

    /// Rules that ignore nothing.
    pub fn none() -> Self {
        Self {
            names: Vec::new(),
            globs: GlobSet::empty(),
        }
    }

    pub fn is_ignored(&self, name: &str, relative_path: &str) -> bool {
        if self.globs.is_match(name) {
            return true;
        }
        self.names
            .iter()
            .any(|pattern| name == pattern || relative_path.contains(pattern.as_str()))
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

pub struct TreeScanner {
    rules: IgnoreRules,
    follow_symlinks: bool,
    max_depth: usize,
}

impl TreeScanner {
    pub fn new(rules: IgnoreRules) -> Self {
        Self {
            rules,
            follow_symlinks: false,
            max_depth: 256,
        }
    }

    pub fn from_config(config: &ScannerConfig) -> Result<Self> {
        Ok(Self::new(IgnoreRules::from_config(config)?)
            .follow_symlinks(config.follow_symlinks)
            .max_depth(config.max_depth))
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Directories nested deeper than `depth` are skipped.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Scan `root` into a single aggregated hierarchy.
    pub fn scan(&self, root: &Path) -> Result<FolderNode, ScanError> {
        if !root.exists() {
            return Err(ScanError::RootNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }
        let root = root
            .canonicalize()
            .map_err(|source| ScanError::Unreadable {
                path: root.to_path_buf(),
                source,
            })?;

        let mut branch = vec![root.clone()];
        self.scan_folder(&root, &root, 0, &mut branch)
            .map_err(|source| ScanError::Unreadable {
                path: root.clone(),
                source,
            })
    }

    /// Scan `root` and wrap the result in a `file_scan` timeline event
    /// stamped with the scan start time.
    pub fn scan_event(&self, root: &Path) -> Result<TimelineEvent> {
        let started_at = Utc::now();
        let clock = Instant::now();
        info!(root = %root.display(), "scanning directory");

        let tree = self.scan(root)?;
        let scan_duration = clock.elapsed().as_secs_f64();
        let root_path = root
            .canonicalize()
            .unwrap_or_else(|_| root.to_path_buf())
            .to_string_lossy()
            .into_owned();

        info!(
            files = tree.file_count,
            bytes = tree.size,
            secs = scan_duration,
            "directory scan completed"
        );

        let metadata = json!({
            "root_path": root_path,
            "scan_duration": scan_duration,
            "scan_timestamp": started_at.to_rfc3339(),
            "file_count": tree.file_count,
            "total_size": tree.size,
            "tree_structure": tree,
        });

        Ok(TimelineEvent {
            event_id: format!(
                "filescan_{}_{}",
                started_at.timestamp(),
                stable_id(&[&root_path])
            ),
            timestamp: started_at.timestamp_millis() as f64 / 1000.0,
            event_type: EventKind::FileScan,
            metadata,
        })
    }

    /// `branch` holds the canonical paths of the directories currently
    /// being scanned, root first. Followed symlinks that point back into
    /// it are skipped.
    fn scan_folder(
        &self,
        root: &Path,
        dir: &Path,
        depth: usize,
        branch: &mut Vec<PathBuf>,
    ) -> io::Result<FolderNode> {
        let mut files: Vec<FileNode> = Vec::new();
        let mut folders: Vec<FolderNode> = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = relative_path(root, &path);

            if self.rules.is_ignored(&name, &relative) {
                continue;
            }

            let Some((is_file, is_dir)) = self.classify(&entry) else {
                continue;
            };

            if is_file {
                match file_node(&path, name, relative, depth + 1) {
                    Ok(node) => files.push(node),
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping file"),
                }
            } else if is_dir {
                if depth + 1 > self.max_depth {
                    warn!(path = %path.display(), max_depth = self.max_depth, "directory too deep, skipping");
                    continue;
                }
                let canonical = if self.follow_symlinks {
                    match path.canonicalize() {
                        Ok(canonical) => Some(canonical),
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "cannot resolve directory");
                            continue;
                        }
                    }
                } else {
                    None
                };
                if let Some(canonical) = &canonical {
                    if branch.contains(canonical) {
                        warn!(path = %path.display(), target = %canonical.display(), "symlink cycle, skipping");
                        continue;
                    }
                    branch.push(canonical.clone());
                }
                let scanned = self.scan_folder(root, &path, depth + 1, branch);
                if canonical.is_some() {
                    branch.pop();
                }
                match scanned {
                    Ok(node) => folders.push(node),
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping directory"),
                }
            }
        }

        files.sort_by(|a, b| order_key(&a.name).cmp(&order_key(&b.name)));
        folders.sort_by(|a, b| order_key(&a.name).cmp(&order_key(&b.name)));

        let size = files.iter().map(|f| f.size).sum::<u64>()
            + folders.iter().map(|f| f.size).sum::<u64>();
        let file_count = files.len() as u64 + folders.iter().map(|f| f.file_count).sum::<u64>();

        let children = files
            .into_iter()
            .map(TreeNode::File)
            .chain(folders.into_iter().map(TreeNode::Folder))
            .collect();

        let meta = fs::metadata(dir)?;
        let (name, path) = if depth == 0 {
            ("root".to_string(), String::new())
        } else {
            (
                dir.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                relative_path(root, dir),
            )
        };

        Ok(FolderNode {
            name,
            path,
            size,
            file_count,
            created: epoch_secs(meta.created().or_else(|_| meta.modified())),
            modified: epoch_secs(meta.modified()),
            depth,
            children,
        })
    }

    /// Resolve whether an entry is a file or a directory, following
    /// symlinks only when configured to.
    fn classify(&self, entry: &fs::DirEntry) -> Option<(bool, bool)> {
        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "cannot stat entry");
                return None;
            }
        };
        if !file_type.is_symlink() {
            return Some((file_type.is_file(), file_type.is_dir()));
        }
        if !self.follow_symlinks {
            debug!(path = %entry.path().display(), "not following symlink");
            return None;
        }
        match fs::metadata(entry.path()) {
            Ok(meta) => Some((meta.is_file(), meta.is_dir())),
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "dangling symlink");
                None
            }
        }
    }
}

fn file_node(path: &Path, name: String, relative: String, depth: usize) -> io::Result<FileNode> {
    let meta = fs::metadata(path)?;
    Ok(FileNode {
        name,
        path: relative,
        size: meta.len(),
        file_hash: file_fingerprint(path),
        mime_type: mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string(),
        created: epoch_secs(meta.created().or_else(|_| meta.modified())),
        modified: epoch_secs(meta.modified()),
        depth,
    })
}

fn order_key(name: &str) -> (String, &str) {
    (name.to_lowercase(), name)
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

fn epoch_secs(time: io::Result<SystemTime>) -> f64 {
    time.ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::UNKNOWN_FINGERPRINT;
    use tempfile::TempDir;

    fn default_scanner() -> TreeScanner {
        TreeScanner::from_config(&ScannerConfig::default()).unwrap()
    }

    fn write(root: &Path, rel: &str, contents: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn names(folder: &FolderNode) -> Vec<(&str, bool)> {
        folder
            .children
            .iter()
            .map(|c| (c.name(), c.is_file()))
            .collect()
    }

    fn count_files(folder: &FolderNode) -> (u64, u64) {
        let mut count = 0;
        let mut size = 0;
        for child in &folder.children {
            match child {
                TreeNode::File(f) => {
                    count += 1;
                    size += f.size;
                }
                TreeNode::Folder(f) => {
                    let (c, s) = count_files(f);
                    count += c;
                    size += s;
                }
            }
        }
        (count, size)
    }

    #[test]
    fn aggregates_sizes_and_counts_over_subtree() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.txt", b"12345");
        write(tmp.path(), "docs/b.md", b"123");
        write(tmp.path(), "docs/deep/c.md", b"1234567");
        fs::create_dir_all(tmp.path().join("empty")).unwrap();

        let tree = default_scanner().scan(tmp.path()).unwrap();
        assert_eq!(tree.name, "root");
        assert_eq!(tree.path, "");
        assert_eq!(tree.depth, 0);
        assert_eq!(tree.file_count, 3);
        assert_eq!(tree.size, 15);
        assert_eq!(count_files(&tree), (3, 15));

        let TreeNode::Folder(docs) = &tree.children[1] else {
            panic!("expected docs folder");
        };
        assert_eq!(docs.name, "docs");
        assert_eq!(docs.path, "docs");
        assert_eq!(docs.depth, 1);
        assert_eq!(docs.file_count, 2);
        assert_eq!(docs.size, 10);

        let TreeNode::Folder(deep) = &docs.children[1] else {
            panic!("expected deep folder");
        };
        let TreeNode::File(c) = &deep.children[0] else {
            panic!("expected c.md");
        };
        assert_eq!(c.depth, 3);
        assert_eq!(c.path, Path::new("docs").join("deep").join("c.md").to_string_lossy());
    }

    #[test]
    fn files_before_folders_case_insensitive() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "zeta.txt", b"z");
        write(tmp.path(), "Alpha.txt", b"a");
        write(tmp.path(), "beta.txt", b"b");
        write(tmp.path(), "Omega/x.txt", b"x");
        write(tmp.path(), "alpha/y.txt", b"y");
        write(tmp.path(), "Charlie/z.txt", b"z");

        let tree = default_scanner().scan(tmp.path()).unwrap();
        assert_eq!(
            names(&tree),
            vec![
                ("Alpha.txt", true),
                ("beta.txt", true),
                ("zeta.txt", true),
                ("alpha", false),
                ("Charlie", false),
                ("Omega", false),
            ]
        );
    }

    #[test]
    fn ignored_paths_do_not_count() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/main.py", b"print()");
        write(tmp.path(), "src/main.pyc", b"0000000000");
        write(tmp.path(), "node_modules/lib/index.js", b"0000000000");
        write(tmp.path(), "src/.git/HEAD", b"0000000000");
        write(tmp.path(), "app/timeline.db", b"0000000000");

        let tree = default_scanner().scan(tmp.path()).unwrap();
        assert_eq!(tree.file_count, 1);
        assert_eq!(tree.size, 7);
        assert!(!names(&tree).iter().any(|(n, _)| *n == "node_modules"));
        // `app` is kept as an empty folder.
        assert!(names(&tree).contains(&("app", false)));
    }

    #[test]
    fn custom_rules_are_honoured() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "target/debug/bin", b"0000");
        write(tmp.path(), "keep.rs", b"fn");
        write(tmp.path(), "skip.log", b"log");

        let rules = IgnoreRules::new(&["target".to_string()], &["*.log".to_string()]).unwrap();
        let tree = TreeScanner::new(rules).scan(tmp.path()).unwrap();
        assert_eq!(names(&tree), vec![("keep.rs", true)]);

        let everything = TreeScanner::new(IgnoreRules::none())
            .scan(tmp.path())
            .unwrap();
        assert_eq!(everything.file_count, 3);
    }

    #[test]
    fn identical_files_share_fingerprint() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "one.txt", b"same bytes");
        write(tmp.path(), "two.txt", b"same bytes");
        write(tmp.path(), "three.txt", b"same bytez");

        let tree = default_scanner().scan(tmp.path()).unwrap();
        let hashes: Vec<&str> = tree
            .children
            .iter()
            .map(|c| match c {
                TreeNode::File(f) => f.file_hash.as_str(),
                TreeNode::Folder(_) => unreachable!(),
            })
            .collect();
        // one, three, two
        assert_eq!(hashes[0], hashes[2]);
        assert_ne!(hashes[0], hashes[1]);
        assert!(hashes.iter().all(|h| *h != UNKNOWN_FINGERPRINT));
    }

    #[test]
    fn missing_root_is_hard_error() {
        let tmp = TempDir::new().unwrap();
        let err = default_scanner()
            .scan(&tmp.path().join("missing"))
            .unwrap_err();
        assert!(matches!(err, ScanError::RootNotFound(_)));

        write(tmp.path(), "plain.txt", b"x");
        let err = default_scanner()
            .scan(&tmp.path().join("plain.txt"))
            .unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory(_)));
    }

    #[test]
    fn max_depth_bounds_the_walk() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a/b/c/leaf.txt", b"leaf");
        write(tmp.path(), "a/top.txt", b"top");

        let tree = default_scanner().max_depth(2).scan(tmp.path()).unwrap();
        // `c` sits at depth 3 and is skipped.
        assert_eq!(tree.file_count, 1);
    }

    #[cfg(unix)]
    #[test]
    fn self_referencing_symlinks_are_not_rewalked() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "data/a.txt", b"abc");
        let data = tmp.path().join("data");
        std::os::unix::fs::symlink(&data, data.join("loop1")).unwrap();
        std::os::unix::fs::symlink(&data, data.join("loop2")).unwrap();
        std::os::unix::fs::symlink(tmp.path(), data.join("up")).unwrap();

        let tree = default_scanner()
            .follow_symlinks(true)
            .scan(tmp.path())
            .unwrap();
        assert_eq!(tree.file_count, 1);
        assert_eq!(tree.size, 3);
        let TreeNode::Folder(data) = &tree.children[0] else {
            panic!("expected data folder");
        };
        assert!(data.children.iter().all(|c| matches!(c, TreeNode::File(_))));
    }

    #[test]
    fn scan_event_wraps_tree() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "report.docx", b"docx");
        write(tmp.path(), "notes.zzunknown", b"?");

        let event = default_scanner().scan_event(tmp.path()).unwrap();
        assert_eq!(event.event_type, EventKind::FileScan);
        assert!(event.event_id.starts_with("filescan_"));
        assert_eq!(event.metadata["file_count"], 2);
        assert_eq!(event.metadata["total_size"], 5);
        let children = &event.metadata["tree_structure"]["children"];
        assert_eq!(children[0]["data"]["name"], "notes.zzunknown");
        assert_eq!(children[0]["data"]["mime_type"], "application/octet-stream");
        assert_eq!(children[1]["data"]["name"], "report.docx");
        assert_eq!(
            children[1]["data"]["mime_type"],
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
    }
}
