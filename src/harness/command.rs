//! A user-configured shell command as the external runner.

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Deserialize;

use super::group::spawn_in_group;
use super::{RecordStatus, TestLocator, TestRecord, TestReport, TestRunner, WorkingCopy};
use crate::error::{Error, Result};

/// Runs a command template via `sh -c` and reads the JSON report it writes.
///
/// Placeholders: `{locator}`, `{unit}`, `{name}` and `{report}`.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    pub template: String,
    pub timeout: Duration,
}

impl CommandRunner {
    pub fn new(template: impl Into<String>, timeout: Duration) -> Self {
        Self {
            template: template.into(),
            timeout,
        }
    }

    fn render(&self, locator: &TestLocator, report: &std::path::Path) -> String {
        self.template
            .replace("{locator}", &locator.to_string())
            .replace("{unit}", &locator.unit.to_string_lossy())
            .replace("{name}", &locator.name)
            .replace("{report}", &report.to_string_lossy())
    }
}

impl TestRunner for CommandRunner {
    async fn run(&self, locator: &TestLocator, copy: &WorkingCopy) -> Result<TestReport> {
        let report = copy.next_report_path("json");
        let command = self.render(locator, &report);

        let start = Instant::now();
        let mut shell = tokio::process::Command::new("sh");
        shell
            .arg("-c")
            .arg(&command)
            .current_dir(copy.project())
            .env("CARGO_TARGET_DIR", copy.target_dir())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let (child, _group) = spawn_in_group(&mut shell)
            .map_err(|e| Error::Runner(format!("failed to spawn `{command}`: {e}")))?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output()).await;
        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(Error::Runner(format!("command execution error: {e}"))),
            Err(_) => {
                tracing::warn!(
                    "Command timed out after {} seconds: {}",
                    self.timeout.as_secs(),
                    command
                );
                return Ok(TestReport::default());
            }
        };

        tracing::debug!(
            "`{}` finished in {}ms ({})",
            command,
            start.elapsed().as_millis(),
            output.status
        );

        let text = tokio::fs::read_to_string(&report).await.map_err(|e| {
            Error::Runner(format!(
                "`{}` exited with {} and wrote no report: {}",
                command, output.status, e
            ))
        })?;
        parse_json_report(&text)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonReport {
    Flat(Vec<JsonRecord>),
    Nested { tests: Vec<JsonRecord> },
}

#[derive(Debug, Deserialize)]
struct JsonRecord {
    #[serde(alias = "nodeid")]
    id: String,
    outcome: String,
}

/// Parse a JSON report: either a bare record list or `{"tests": [...]}`.
pub fn parse_json_report(text: &str) -> Result<TestReport> {
    let report: JsonReport = serde_json::from_str(text)
        .map_err(|e| Error::Runner(format!("malformed test report: {e}")))?;
    let records = match report {
        JsonReport::Flat(records) | JsonReport::Nested { tests: records } => records,
    };
    Ok(TestReport {
        records: records
            .into_iter()
            .map(|record| TestRecord {
                id: record.id,
                status: match record.outcome.as_str() {
                    "passed" | "ok" => RecordStatus::Passed,
                    "failed" | "error" => RecordStatus::Failed,
                    _ => RecordStatus::Other,
                },
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn locator() -> TestLocator {
        TestLocator::new(PathBuf::from("tests/props.rs"), "prop_sorted".to_string())
    }

    #[test]
    fn test_render_placeholders() {
        let runner = CommandRunner::new(
            "run --unit {unit} --name {name} --id {locator} --out {report}",
            Duration::from_secs(5),
        );
        let rendered = runner.render(&locator(), Path::new("/tmp/r.json"));
        assert_eq!(
            rendered,
            "run --unit tests/props.rs --name prop_sorted --id tests/props.rs::prop_sorted --out /tmp/r.json"
        );
    }

    #[test]
    fn test_parse_flat_report() {
        let report = parse_json_report(
            r#"[{"id": "tests/props.rs::prop_sorted", "outcome": "passed"},
                {"id": "tests/props.rs::prop_len", "outcome": "failed"}]"#,
        )
        .unwrap();
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].status, RecordStatus::Passed);
        assert_eq!(report.records[1].status, RecordStatus::Failed);
    }

    #[test]
    fn test_parse_nested_report() {
        let report = parse_json_report(
            r#"{"summary": {}, "tests": [{"nodeid": "a::b", "outcome": "error"},
                                         {"nodeid": "a::c", "outcome": "skipped"}]}"#,
        )
        .unwrap();
        assert_eq!(report.records[0].id, "a::b");
        assert_eq!(report.records[0].status, RecordStatus::Failed);
        assert_eq!(report.records[1].status, RecordStatus::Other);
    }

    #[test]
    fn test_parse_malformed_report() {
        let err = parse_json_report("not json").unwrap_err();
        assert!(matches!(err, Error::Runner(_)));
    }

    #[tokio::test]
    async fn test_run_reads_written_report() {
        let original = tempfile::TempDir::new().unwrap();
        std::fs::write(original.path().join("lib.rs"), "fn a() {}\n").unwrap();
        let copy = WorkingCopy::create(original.path()).await.unwrap();

        let runner = CommandRunner::new(
            r#"printf '[{"id": "%s", "outcome": "failed"}]' '{locator}' > '{report}'"#,
            Duration::from_secs(30),
        );
        let report = runner.run(&locator(), &copy).await.unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].id, "tests/props.rs::prop_sorted");
        assert_eq!(report.records[0].status, RecordStatus::Failed);
    }

    #[tokio::test]
    async fn test_run_without_report_is_an_error() {
        let original = tempfile::TempDir::new().unwrap();
        std::fs::write(original.path().join("lib.rs"), "fn a() {}\n").unwrap();
        let copy = WorkingCopy::create(original.path()).await.unwrap();

        let runner = CommandRunner::new("exit 3", Duration::from_secs(30));
        let err = runner.run(&locator(), &copy).await.unwrap_err();
        assert!(matches!(err, Error::Runner(_)));
    }

    #[tokio::test]
    async fn test_timeout_yields_no_records() {
        let original = tempfile::TempDir::new().unwrap();
        std::fs::write(original.path().join("lib.rs"), "fn a() {}\n").unwrap();
        let copy = WorkingCopy::create(original.path()).await.unwrap();

        let runner = CommandRunner::new("sleep 5", Duration::from_millis(100));
        let report = runner.run(&locator(), &copy).await.unwrap();
        assert!(report.records.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_nested_commands() {
        let original = tempfile::TempDir::new().unwrap();
        std::fs::write(original.path().join("lib.rs"), "fn a() {}\n").unwrap();
        let copy = WorkingCopy::create(original.path()).await.unwrap();
        let marker = original.path().join("finished");

        let runner = CommandRunner::new(
            format!("sh -c 'sleep 1; touch {}'; true", marker.display()),
            Duration::from_millis(200),
        );
        let report = runner.run(&locator(), &copy).await.unwrap();
        assert!(report.records.is_empty());
        drop(copy);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }
}
