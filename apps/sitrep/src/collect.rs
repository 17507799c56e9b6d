//! # Signal Collectors
//!
//! Async probes for version control, filesystem inventory, and build output,
//! plus the build-verification trigger.
//!
//! Collectors never raise into the engine: a probe that fails, times out, or
//! finds nothing to probe returns an Unavailable signal and the engine
//! degrades the report instead of aborting it.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use sitrep_core::engine::{BuildTrigger, BuildVerdict};
use sitrep_core::signal::{classify_inventory, BuildSnapshot, ComponentSignal, VcsState};

use crate::config::{ComponentSpec, ProjectConfig, BUILD_SIGNAL, VCS_SIGNAL};

/// Directories skipped during filesystem inventory.
const IGNORE_DIRS: &[&str] = &[
    ".git",
    ".sitrep",
    "target",
    "node_modules",
    "build",
    ".build",
    "DerivedData",
    ".idea",
    ".vscode",
];

/// Poll interval while waiting for a verification build.
const BUILD_POLL_INTERVAL: Duration = Duration::from_millis(50);

// =============================================================================
// GATHERING
// =============================================================================

/// Run every configured collector under a per-collector timeout and return
/// one signal each, components first, then version control, then build.
pub async fn gather_signals(root: &Path, config: &ProjectConfig) -> Vec<ComponentSignal> {
    let timeout = Duration::from_millis(config.collector_timeout_ms);

    let mut signals = Vec::with_capacity(config.components.len() + 2);
    for spec in &config.components {
        signals.push(with_timeout(timeout, &spec.name, collect_inventory(root, spec)).await);
    }

    let (vcs, build) = tokio::join!(
        with_timeout(timeout, VCS_SIGNAL, collect_vcs(root)),
        with_timeout(timeout, BUILD_SIGNAL, collect_build(root, &config.build_logs)),
    );
    signals.push(vcs);
    signals.push(build);
    signals
}

async fn with_timeout(
    timeout: Duration,
    name: &str,
    probe: impl Future<Output = ComponentSignal>,
) -> ComponentSignal {
    match tokio::time::timeout(timeout, probe).await {
        Ok(signal) => signal,
        Err(_) => ComponentSignal::unavailable(name, "collector timed out"),
    }
}

// =============================================================================
// VERSION CONTROL
// =============================================================================

/// Probe git state; Unavailable when `root` is not a repository or git
/// itself cannot run.
pub async fn collect_vcs(root: &Path) -> ComponentSignal {
    let Some(branch) = git(root, &["branch", "--show-current"]).await else {
        return ComponentSignal::unavailable(VCS_SIGNAL, "not a git repository");
    };
    let Some(porcelain) = git(root, &["status", "--porcelain"]).await else {
        return ComponentSignal::unavailable(VCS_SIGNAL, "git status failed");
    };

    let untracked_count = porcelain.lines().filter(|l| l.starts_with("??")).count() as u64;
    let state = VcsState {
        branch: if branch.is_empty() { "(detached)".to_string() } else { branch },
        clean: porcelain.trim().is_empty(),
        untracked_count,
        last_commit_summary: git(root, &["log", "-1", "--pretty=%s"])
            .await
            .unwrap_or_else(|| "no commits yet".to_string()),
    };
    state.to_signal(VCS_SIGNAL)
}

async fn git(root: &Path, args: &[&str]) -> Option<String> {
    let output = tokio::process::Command::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

// =============================================================================
// BUILD OUTPUT
// =============================================================================

/// Read the newest configured build log and classify its diagnostics;
/// Unavailable when no log exists (a never-run build is not a failed one).
pub async fn collect_build(root: &Path, candidates: &[PathBuf]) -> ComponentSignal {
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for candidate in candidates {
        let path = root.join(candidate);
        let Ok(meta) = tokio::fs::metadata(&path).await else {
            continue;
        };
        let Ok(modified) = meta.modified() else {
            continue;
        };
        if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }

    let Some((_, path)) = newest else {
        return ComponentSignal::unavailable(BUILD_SIGNAL, "no build log found");
    };
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => parse_build_log(&content).to_signal(BUILD_SIGNAL),
        Err(err) => {
            ComponentSignal::unavailable(BUILD_SIGNAL, format!("unreadable build log: {err}"))
        }
    }
}

/// Split a build log into error and warning lines.
#[must_use]
pub fn parse_build_log(content: &str) -> BuildSnapshot {
    let mut snapshot = BuildSnapshot::default();
    for line in content.lines() {
        let lowered = line.to_lowercase();
        if lowered.contains("error:") {
            snapshot.errors.push(line.trim().to_string());
        } else if lowered.contains("warning:") {
            snapshot.warnings.push(line.trim().to_string());
        }
    }
    snapshot
}

// =============================================================================
// FILESYSTEM INVENTORY
// =============================================================================

/// Count a component's matching files and classify its completeness.
pub async fn collect_inventory(root: &Path, spec: &ComponentSpec) -> ComponentSignal {
    let dir = root.join(&spec.path);
    let extensions = spec.extensions.clone();
    let found = tokio::task::spawn_blocking(move || count_files(&dir, &extensions)).await;

    match found {
        Ok(found) => {
            let detail = format!("{found} file(s) under {}", spec.path.display());
            classify_inventory(&spec.name, found, spec.expected_files, detail)
        }
        Err(_) => ComponentSignal::unavailable(&spec.name, "inventory walk panicked"),
    }
}

/// Recursively count files with a matching extension, skipping noise
/// directories. Symlinks are never followed, so a link cycle cannot
/// recurse forever. A missing directory counts as zero.
fn count_files(dir: &Path, extensions: &[String]) -> u64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };

    let mut count = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if entry.file_type().is_ok_and(|t| t.is_symlink()) {
            continue;
        }
        if path.is_dir() {
            let skip = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| IGNORE_DIRS.contains(&n));
            if !skip {
                count += count_files(&path, extensions);
            }
        } else if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
                count += 1;
            }
        }
    }
    count
}

// =============================================================================
// BUILD TRIGGER
// =============================================================================

/// Runs the configured verification command with a bounded wait.
///
/// Synchronous by contract (the engine is sync); callers on the async side
/// wrap [`Engine::apply_fix`] in `spawn_blocking`.
///
/// [`Engine::apply_fix`]: sitrep_core::Engine::apply_fix
#[derive(Debug, Clone)]
pub struct CommandTrigger {
    pub command: String,
    pub timeout: Duration,
    pub root: PathBuf,
}

impl CommandTrigger {
    /// Build a trigger from config; `None` when no verify command is set.
    #[must_use]
    pub fn from_config(config: &ProjectConfig, root: &Path) -> Option<Self> {
        config.verify_command.as_ref().map(|command| Self {
            command: command.clone(),
            timeout: Duration::from_millis(config.verify_timeout_ms),
            root: root.to_path_buf(),
        })
    }
}

impl BuildTrigger for CommandTrigger {
    fn run_build(&self) -> BuildVerdict {
        let child = std::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        let Ok(mut child) = child else {
            return BuildVerdict::Unavailable;
        };

        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    return if status.success() {
                        BuildVerdict::Passed
                    } else {
                        BuildVerdict::Failed
                    };
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return BuildVerdict::Unavailable;
                    }
                    std::thread::sleep(BUILD_POLL_INTERVAL);
                }
                Err(_) => return BuildVerdict::Unavailable,
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use sitrep_core::ComponentStatus;

    #[test]
    fn parse_build_log_splits_errors_and_warnings() {
        let log = "compiling...\n\
                   main.swift:3: error: cannot find type 'Foo'\n\
                   util.swift:9: warning: unused variable\n\
                   done\n";
        let snapshot = parse_build_log(log);
        assert_eq!(snapshot.errors.len(), 1);
        assert_eq!(snapshot.warnings.len(), 1);
    }

    #[test]
    fn count_files_skips_ignored_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/.git")).unwrap();
        std::fs::write(dir.path().join("src/a.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/b.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/notes.txt"), "").unwrap();
        std::fs::write(dir.path().join("src/.git/c.rs"), "").unwrap();

        let count = count_files(&dir.path().join("src"), &["rs".to_string()]);
        assert_eq!(count, 2);
    }

    #[cfg(unix)]
    #[test]
    fn count_files_does_not_follow_symlink_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("a.rs"), "").unwrap();
        // A self-referential link must not recurse, and a linked file must
        // not be double-counted.
        std::os::unix::fs::symlink(&src, src.join("loop")).unwrap();
        std::os::unix::fs::symlink(src.join("a.rs"), src.join("alias.rs")).unwrap();

        let count = count_files(&src, &["rs".to_string()]);
        assert_eq!(count, 1);
    }

    #[test]
    fn count_files_missing_dir_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(count_files(&dir.path().join("nope"), &["rs".to_string()]), 0);
    }

    #[tokio::test]
    async fn inventory_classifies_missing_component() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ComponentSpec {
            name: "sources".to_string(),
            weight: 1.0,
            path: PathBuf::from("src"),
            extensions: vec!["rs".to_string()],
            expected_files: 3,
        };
        let signal = collect_inventory(dir.path(), &spec).await;
        assert_eq!(signal.status, ComponentStatus::Missing);
    }

    #[tokio::test]
    async fn vcs_outside_a_repo_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let signal = collect_vcs(dir.path()).await;
        assert_eq!(signal.status, ComponentStatus::Unavailable);
    }

    #[tokio::test]
    async fn build_without_log_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let signal = collect_build(dir.path(), &[PathBuf::from("build.log")]).await;
        assert_eq!(signal.status, ComponentStatus::Unavailable);
    }

    #[tokio::test]
    async fn build_with_failing_log_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("build.log"), "x.rs:1: error: nope\n").unwrap();
        let signal = collect_build(dir.path(), &[PathBuf::from("build.log")]).await;
        assert_eq!(signal.status, ComponentStatus::Missing);
    }

    #[test]
    fn trigger_reports_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let passing = CommandTrigger {
            command: "true".to_string(),
            timeout: Duration::from_secs(5),
            root: dir.path().to_path_buf(),
        };
        assert_eq!(passing.run_build(), BuildVerdict::Passed);

        let failing = CommandTrigger {
            command: "false".to_string(),
            timeout: Duration::from_secs(5),
            root: dir.path().to_path_buf(),
        };
        assert_eq!(failing.run_build(), BuildVerdict::Failed);
    }

    #[test]
    fn trigger_timeout_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let slow = CommandTrigger {
            command: "sleep 5".to_string(),
            timeout: Duration::from_millis(100),
            root: dir.path().to_path_buf(),
        };
        assert_eq!(slow.run_build(), BuildVerdict::Unavailable);
    }
}
