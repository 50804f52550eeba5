//! `cargo test` as the external runner.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

use super::group::spawn_in_group;
use super::{RecordStatus, TestLocator, TestRecord, TestReport, TestRunner, WorkingCopy};
use crate::error::{Error, Result};

/// Which test harness of a package holds a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelector {
    Lib,
    Bin(String),
    Test(String),
    Bins,
    /// Anything else (benches, build scripts); no selector flag.
    All,
}

impl TargetSelector {
    fn args(&self) -> Vec<String> {
        match self {
            Self::Lib => vec!["--lib".to_string()],
            Self::Bin(name) => vec!["--bin".to_string(), name.clone()],
            Self::Test(name) => vec!["--test".to_string(), name.clone()],
            Self::Bins => vec!["--bins".to_string()],
            Self::All => Vec::new(),
        }
    }
}

/// Runs one test with `cargo test` and reads libtest's `--logfile`.
#[derive(Debug, Clone)]
pub struct CargoRunner {
    pub timeout: Duration,
    /// Extra arguments placed before `--`, e.g. `--features`.
    pub cargo_args: Vec<String>,
}

impl Default for CargoRunner {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300), // 5 minutes
            cargo_args: Vec::new(),
        }
    }
}

impl TestRunner for CargoRunner {
    async fn run(&self, locator: &TestLocator, copy: &WorkingCopy) -> Result<TestReport> {
        let unit = copy.resolve(&locator.unit);
        let (manifest, selector) = locate_target(copy.project(), &unit);
        let report = copy.next_report_path("log");

        let mut command = Command::new("cargo");
        command
            .arg("test")
            .arg("--manifest-path")
            .arg(&manifest)
            .args(selector.args())
            .args(&self.cargo_args)
            .arg("--")
            .arg(&locator.name)
            .arg("--test-threads=1") // Deterministic ordering
            .arg("--logfile")
            .arg(&report)
            .current_dir(copy.project())
            .env("CARGO_TARGET_DIR", copy.target_dir())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let start = Instant::now();
        let (child, _group) = spawn_in_group(&mut command)
            .map_err(|e| Error::Runner(format!("failed to spawn cargo test: {e}")))?;
        let result = tokio::time::timeout(self.timeout, child.wait_with_output()).await;

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(Error::Runner(format!("failed to run cargo test: {e}"))),
            Err(_) => {
                tracing::warn!("{} timed out after {:?}", locator, self.timeout);
                return Ok(TestReport::default());
            }
        };

        tracing::debug!(
            "cargo test {} finished in {}ms ({})",
            locator,
            start.elapsed().as_millis(),
            output.status
        );

        match tokio::fs::read_to_string(&report).await {
            Ok(log) => Ok(parse_libtest_log(&log)),
            Err(_) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if is_compile_error(&stderr) {
                    tracing::debug!("{} did not compile", locator);
                    Ok(TestReport::default())
                } else {
                    let preview: String = stderr.lines().take(10).collect::<Vec<_>>().join("\n");
                    Err(Error::Runner(format!(
                        "cargo test exited with {} and wrote no report:\n{}",
                        output.status, preview
                    )))
                }
            }
        }
    }
}

fn is_compile_error(stderr: &str) -> bool {
    stderr.contains("error[E") || stderr.contains("could not compile")
}

/// Parse libtest's log file: one `STATUS NAME` entry per finished test.
///
/// A `failed: <message>` entry may span several lines; its name ends the last
/// one. Lines that open no entry continue the previous one.
pub fn parse_libtest_log(log: &str) -> TestReport {
    let mut records: Vec<TestRecord> = Vec::new();
    for line in log.lines() {
        let line = line.trim();
        let Some(name) = line.split_whitespace().last() else {
            continue;
        };
        let word = line
            .split(|c: char| c.is_whitespace() || c == ':')
            .next()
            .unwrap_or_default();
        let status = match word {
            "ok" => RecordStatus::Passed,
            "failed" => RecordStatus::Failed,
            "ignored" | "bench" => RecordStatus::Other,
            _ => {
                if let Some(last) = records.last_mut() {
                    last.id = name.to_string();
                }
                continue;
            }
        };
        records.push(TestRecord {
            id: name.to_string(),
            status,
        });
    }
    TestReport { records }
}

/// Find the manifest owning `unit` and the cargo target that compiles it.
pub fn locate_target(project: &Path, unit: &Path) -> (PathBuf, TargetSelector) {
    let package = unit
        .ancestors()
        .skip(1)
        .take_while(|dir| dir.starts_with(project))
        .find(|dir| dir.join("Cargo.toml").is_file())
        .unwrap_or(project);

    let manifest = package.join("Cargo.toml");
    let relative = unit.strip_prefix(package).unwrap_or(unit);
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    let parts: Vec<&str> = parts.iter().map(String::as_str).collect();

    let selector = match parts.as_slice() {
        ["tests", file] => Some(TargetSelector::Test(stem(file))),
        ["tests", dir, "main.rs"] => Some(TargetSelector::Test(dir.to_string())),
        ["src", "bin", file] => Some(TargetSelector::Bin(stem(file))),
        ["src", "bin", dir, "main.rs"] => Some(TargetSelector::Bin(dir.to_string())),
        ["src", "main.rs"] => Some(TargetSelector::Bins),
        ["src", ..] if package.join("src/lib.rs").is_file() => Some(TargetSelector::Lib),
        ["src", ..] => Some(TargetSelector::Bins),
        _ => None,
    };

    (manifest, selector.unwrap_or(TargetSelector::All))
}

fn stem(file: &str) -> String {
    file.strip_suffix(".rs").unwrap_or(file).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // =========================================================================
    // parse_libtest_log tests
    // =========================================================================

    #[test]
    fn test_parse_libtest_log() {
        let log = "ok tests::prop_sorted\nfailed tests::prop_len\nignored tests::slow\n";
        let report = parse_libtest_log(log);
        assert_eq!(report.records.len(), 3);
        assert_eq!(report.records[0].id, "tests::prop_sorted");
        assert_eq!(report.records[0].status, RecordStatus::Passed);
        assert_eq!(report.records[1].status, RecordStatus::Failed);
        assert_eq!(report.records[2].status, RecordStatus::Other);
    }

    #[test]
    fn test_parse_libtest_log_timed_failure() {
        let report = parse_libtest_log("failed (time) prop_slow\n");
        assert_eq!(report.records[0].id, "prop_slow");
        assert_eq!(report.records[0].status, RecordStatus::Failed);
    }

    #[test]
    fn test_parse_libtest_log_multiline_failure() {
        let log = "ok tests::before\n\
failed: panic did not contain expected string\n\
      panic message: `\"abc\"`,\n\
 expected substring: `\"xyz\"` tests::wrong_panic\n\
ok tests::after\n";
        let report = parse_libtest_log(log);
        let ids: Vec<&str> = report.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["tests::before", "tests::wrong_panic", "tests::after"]);
        assert_eq!(report.records[1].status, RecordStatus::Failed);
    }

    #[test]
    fn test_parse_libtest_log_single_line_message() {
        let report = parse_libtest_log("failed: assertion failed tests::prop_len\n");
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].id, "tests::prop_len");
        assert_eq!(report.records[0].status, RecordStatus::Failed);
    }

    #[test]
    fn test_parse_libtest_log_empty() {
        assert!(parse_libtest_log("").records.is_empty());
        assert!(parse_libtest_log("\n\n").records.is_empty());
    }

    #[test]
    fn test_compile_error_detection() {
        assert!(is_compile_error("error[E0308]: mismatched types"));
        assert!(is_compile_error("error: could not compile `demo`"));
        assert!(!is_compile_error("test result: FAILED. 0 passed; 1 failed"));
    }

    // =========================================================================
    // locate_target tests
    // =========================================================================

    fn package(files: &[&str]) -> TempDir {
        let temp = TempDir::new().unwrap();
        for rel in files {
            let path = temp.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "").unwrap();
        }
        temp
    }

    #[test]
    fn test_locate_integration_test() {
        let temp = package(&["Cargo.toml", "src/lib.rs", "tests/props.rs"]);
        let (manifest, selector) = locate_target(temp.path(), &temp.path().join("tests/props.rs"));
        assert_eq!(manifest, temp.path().join("Cargo.toml"));
        assert_eq!(selector, TargetSelector::Test("props".to_string()));
    }

    #[test]
    fn test_locate_library_module() {
        let temp = package(&["Cargo.toml", "src/lib.rs", "src/math/mod.rs"]);
        let (_, selector) = locate_target(temp.path(), &temp.path().join("src/math/mod.rs"));
        assert_eq!(selector, TargetSelector::Lib);
    }

    #[test]
    fn test_locate_binaries() {
        let temp = package(&["Cargo.toml", "src/main.rs", "src/cli.rs", "src/bin/tool.rs"]);
        let (_, main) = locate_target(temp.path(), &temp.path().join("src/main.rs"));
        let (_, module) = locate_target(temp.path(), &temp.path().join("src/cli.rs"));
        let (_, tool) = locate_target(temp.path(), &temp.path().join("src/bin/tool.rs"));
        assert_eq!(main, TargetSelector::Bins);
        assert_eq!(module, TargetSelector::Bins);
        assert_eq!(tool, TargetSelector::Bin("tool".to_string()));
    }

    #[test]
    fn test_locate_workspace_member() {
        let temp = package(&["Cargo.toml", "crates/core/Cargo.toml", "crates/core/src/lib.rs"]);
        let unit = temp.path().join("crates/core/src/lib.rs");
        let (manifest, selector) = locate_target(temp.path(), &unit);
        assert_eq!(manifest, temp.path().join("crates/core/Cargo.toml"));
        assert_eq!(selector, TargetSelector::Lib);
    }

    #[test]
    fn test_selector_args() {
        assert_eq!(TargetSelector::Lib.args(), vec!["--lib"]);
        assert_eq!(
            TargetSelector::Test("props".into()).args(),
            vec!["--test", "props"]
        );
        assert!(TargetSelector::All.args().is_empty());
    }
}
