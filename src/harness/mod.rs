//! Mutation-testing harness.
//!
//! Handles swapping definitions into a working copy, running one test via an
//! external runner, restoring pristine sources and aggregating a kill ratio.

pub mod cargo;
pub mod command;
pub mod group;
pub mod swap;
pub mod workcopy;

pub use cargo::CargoRunner;
pub use command::CommandRunner;
pub use swap::{swap_definitions, Definitions, SwapGuard};
pub use workcopy::WorkingCopy;

use std::future::Future;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mutation::Mutant;

/// A test's address: unit path relative to the project root plus its name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TestLocator {
    pub unit: PathBuf,
    pub name: String,
}

impl TestLocator {
    pub fn new(unit: PathBuf, name: String) -> Self {
        Self { unit, name }
    }

    /// Whether a runner record identifies this test.
    pub fn matches(&self, id: &str) -> bool {
        id == self.name || id.ends_with(&format!("::{}", self.name))
    }
}

impl std::fmt::Display for TestLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.unit.display(), self.name)
    }
}

/// Result of running one test against one code variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestOutcome {
    Passed,
    /// The test failed or errored - the variant was caught
    Failed,
    /// The runner reported nothing for the test (compile error, timeout, filtered out)
    NotCollected,
}

impl std::fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::NotCollected => write!(f, "not-collected"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Passed,
    Failed,
    Other,
}

/// One entry of a runner's structured report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRecord {
    pub id: String,
    pub status: RecordStatus,
}

#[derive(Debug, Clone, Default)]
pub struct TestReport {
    pub records: Vec<TestRecord>,
}

impl TestReport {
    /// Reduce the records for `locator` to a single outcome.
    pub fn outcome_for(&self, locator: &TestLocator) -> TestOutcome {
        let mut matching = self
            .records
            .iter()
            .filter(|record| locator.matches(&record.id))
            .peekable();

        if matching.peek().is_none() {
            return TestOutcome::NotCollected;
        }
        if matching.any(|record| record.status == RecordStatus::Failed) {
            TestOutcome::Failed
        } else {
            TestOutcome::Passed
        }
    }
}

/// The external process that executes a single test.
pub trait TestRunner: Send + Sync {
    /// Run `locator` inside `copy`. A timeout or a build failure yields an
    /// empty report; an `Err` means the runner itself broke.
    fn run(
        &self,
        locator: &TestLocator,
        copy: &WorkingCopy,
    ) -> impl Future<Output = Result<TestReport>> + Send;
}

/// The runner picked from configuration.
#[derive(Debug, Clone)]
pub enum Runner {
    Cargo(CargoRunner),
    Command(CommandRunner),
}

impl TestRunner for Runner {
    async fn run(&self, locator: &TestLocator, copy: &WorkingCopy) -> Result<TestReport> {
        match self {
            Self::Cargo(runner) => runner.run(locator, copy).await,
            Self::Command(runner) => runner.run(locator, copy).await,
        }
    }
}

/// How mutants the runner never reported on enter the kill ratio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotCollectedPolicy {
    /// Left out of the denominator.
    #[default]
    Exclude,
    /// Counted as surviving mutants.
    #[serde(alias = "survivor")]
    CountAsSurvivor,
}

/// Outcome of scoring one test against a mutant batch.
#[derive(Debug, Clone, Default)]
pub struct ScoreCard {
    /// Mutants the test did not detect.
    pub passed: Vec<Mutant>,
    /// Mutants the test killed.
    pub failed: Vec<Mutant>,
    pub not_collected: Vec<Mutant>,
    pub kill_ratio: f64,
}

impl ScoreCard {
    fn record(&mut self, mutant: &Mutant, outcome: TestOutcome) {
        match outcome {
            TestOutcome::Passed => self.passed.push(mutant.clone()),
            TestOutcome::Failed => self.failed.push(mutant.clone()),
            TestOutcome::NotCollected => self.not_collected.push(mutant.clone()),
        }
    }

    fn finish(mut self, policy: NotCollectedPolicy) -> Self {
        let killed = self.failed.len();
        let mut counted = killed + self.passed.len();
        if policy == NotCollectedPolicy::CountAsSurvivor {
            counted += self.not_collected.len();
        }
        self.kill_ratio = kill_ratio(killed, counted);
        self
    }
}

/// `killed / counted`, or 0.0 when nothing was counted.
pub fn kill_ratio(killed: usize, counted: usize) -> f64 {
    if counted == 0 {
        0.0
    } else {
        killed as f64 / counted as f64
    }
}

/// Runs trials against one working copy, strictly one at a time.
pub struct Harness<'a, R: TestRunner> {
    runner: &'a R,
    copy: &'a WorkingCopy,
    policy: NotCollectedPolicy,
}

impl<'a, R: TestRunner> Harness<'a, R> {
    pub fn new(runner: &'a R, copy: &'a WorkingCopy, policy: NotCollectedPolicy) -> Self {
        Self {
            runner,
            copy,
            policy,
        }
    }

    pub fn copy(&self) -> &WorkingCopy {
        self.copy
    }

    /// Run one test in the copy as it currently is.
    pub async fn run_single(&self, locator: &TestLocator) -> Result<TestOutcome> {
        let report = self.runner.run(locator, self.copy).await?;
        let outcome = report.outcome_for(locator);
        tracing::debug!("{} -> {}", locator, outcome);
        Ok(outcome)
    }

    /// Confirm the unmutated test passes.
    pub async fn check_baseline(&self, locator: &TestLocator) -> Result<()> {
        match self.run_single(locator).await? {
            TestOutcome::Passed => Ok(()),
            TestOutcome::NotCollected => Err(Error::TestNotFound(locator.name.clone())),
            outcome => Err(Error::BaselineFailed {
                test: locator.name.clone(),
                outcome,
            }),
        }
    }

    /// Swap `definitions` in, run the test, swap the pristine sources back.
    /// Restoration happens whether or not the run succeeded.
    pub async fn run_with(
        &self,
        locator: &TestLocator,
        definitions: &Definitions,
    ) -> Result<TestOutcome> {
        let guard = swap_definitions(self.copy.sources(), definitions).await?;
        let outcome = self.run_single(locator).await;
        guard.restore().await?;
        outcome
    }

    /// Baseline check followed by [`Harness::score_mutants`].
    pub async fn score(&self, locator: &TestLocator, batch: &[Mutant]) -> Result<ScoreCard> {
        self.check_baseline(locator).await?;
        self.score_mutants(locator, batch).await
    }

    /// Partition `batch` by the test's outcome against each mutant.
    pub async fn score_mutants(&self, locator: &TestLocator, batch: &[Mutant]) -> Result<ScoreCard> {
        let mut card = ScoreCard::default();

        for mutant in batch {
            let definitions = Definitions::parse(&format!("<mutant {}>", mutant.id), &mutant.code)?;
            let outcome = self.run_with(locator, &definitions).await?;
            tracing::debug!("Mutant {} -> {}", mutant.id, outcome);
            card.record(mutant, outcome);
        }

        let card = card.finish(self.policy);
        tracing::info!(
            "{}: {} killed, {} survived, {} not collected ({:.0}%)",
            locator.name,
            card.failed.len(),
            card.passed.len(),
            card.not_collected.len(),
            card.kill_ratio * 100.0
        );
        Ok(card)
    }

    /// Score with `installed` in place of the project's own definitions,
    /// typically a revised test body.
    pub async fn score_mutants_with(
        &self,
        locator: &TestLocator,
        installed: &Definitions,
        batch: &[Mutant],
    ) -> Result<ScoreCard> {
        let guard = swap_definitions(self.copy.sources(), installed).await?;
        let card = self.score_mutants(locator, batch).await;
        guard.restore().await?;
        card
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedRunner;
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    const LIB: &str = "pub fn double(x: u32) -> u32 {\n    x * 2\n}\n";

    fn locator() -> TestLocator {
        TestLocator::new(PathBuf::from("src/lib.rs"), "prop_double".to_string())
    }

    async fn copy_of(lib: &str) -> (TempDir, WorkingCopy) {
        let original = TempDir::new().unwrap();
        std::fs::create_dir_all(original.path().join("src")).unwrap();
        std::fs::write(original.path().join("src/lib.rs"), lib).unwrap();
        let copy = WorkingCopy::create(original.path()).await.unwrap();
        (original, copy)
    }

    fn mutants(bodies: &[&str]) -> Vec<Mutant> {
        bodies
            .iter()
            .map(|body| Mutant::new(format!("pub fn double(x: u32) -> u32 {{ {body} }}")))
            .collect()
    }

    /// The test catches anything but `* 2` and `+ x`-style doubling.
    fn judge(sources: &str) -> TestOutcome {
        if sources.contains("x * 2") || sources.contains("x + x") {
            TestOutcome::Passed
        } else if sources.contains("x << 1") {
            TestOutcome::NotCollected
        } else {
            TestOutcome::Failed
        }
    }

    // =========================================================================
    // Locators and reports
    // =========================================================================

    #[test]
    fn test_locator_display_and_matching() {
        let locator = locator();
        assert_eq!(locator.to_string(), "src/lib.rs::prop_double");
        assert!(locator.matches("prop_double"));
        assert!(locator.matches("tests::prop_double"));
        assert!(locator.matches("src/lib.rs::prop_double"));
        assert!(!locator.matches("tests::prop_double_twice"));
        assert!(!locator.matches("xprop_double"));
    }

    #[test]
    fn test_outcome_for() {
        let locator = locator();
        let record = |id: &str, status| TestRecord {
            id: id.to_string(),
            status,
        };

        let empty = TestReport::default();
        assert_eq!(empty.outcome_for(&locator), TestOutcome::NotCollected);

        let other_only = TestReport {
            records: vec![record("tests::other", RecordStatus::Failed)],
        };
        assert_eq!(other_only.outcome_for(&locator), TestOutcome::NotCollected);

        let failed = TestReport {
            records: vec![record("tests::prop_double", RecordStatus::Failed)],
        };
        assert_eq!(failed.outcome_for(&locator), TestOutcome::Failed);

        let ignored = TestReport {
            records: vec![record("tests::prop_double", RecordStatus::Other)],
        };
        assert_eq!(ignored.outcome_for(&locator), TestOutcome::Passed);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(TestOutcome::Passed.to_string(), "passed");
        assert_eq!(TestOutcome::Failed.to_string(), "failed");
        assert_eq!(TestOutcome::NotCollected.to_string(), "not-collected");
    }

    #[test]
    fn test_kill_ratio_empty_denominator() {
        assert_eq!(kill_ratio(0, 0), 0.0);
        assert_eq!(kill_ratio(9, 10), 0.9);
    }

    // =========================================================================
    // Scoring
    // =========================================================================

    #[tokio::test]
    async fn test_score_partitions_batch() {
        let (_original, copy) = copy_of(LIB).await;
        let runner = ScriptedRunner::new(judge);
        let harness = Harness::new(&runner, &copy, NotCollectedPolicy::Exclude);

        let batch = mutants(&["x + x", "x * 3", "x - 2", "x << 1"]);
        let card = harness.score(&locator(), &batch).await.unwrap();

        assert_eq!(card.passed.len(), 1);
        assert_eq!(card.failed.len(), 2);
        assert_eq!(card.not_collected.len(), 1);
        assert!((card.kill_ratio - 2.0 / 3.0).abs() < 1e-9);
        // baseline + one run per mutant
        assert_eq!(runner.runs(), 5);
    }

    #[tokio::test]
    async fn test_count_as_survivor_policy() {
        let (_original, copy) = copy_of(LIB).await;
        let runner = ScriptedRunner::new(judge);
        let harness = Harness::new(&runner, &copy, NotCollectedPolicy::CountAsSurvivor);

        let batch = mutants(&["x + x", "x * 3", "x - 2", "x << 1"]);
        let card = harness.score(&locator(), &batch).await.unwrap();
        assert!((card.kill_ratio - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_score_is_leak_free() {
        let (_original, copy) = copy_of(LIB).await;
        let runner = ScriptedRunner::new(judge);
        let harness = Harness::new(&runner, &copy, NotCollectedPolicy::Exclude);

        let batch = mutants(&["x * 3", "x + x", "x / 2"]);
        let first = harness.score(&locator(), &batch).await.unwrap();
        let second = harness.score(&locator(), &batch).await.unwrap();

        assert_eq!(first.kill_ratio, second.kill_ratio);
        let lib = std::fs::read_to_string(copy.resolve(Path::new("src/lib.rs"))).unwrap();
        assert_eq!(lib, LIB);
    }

    #[tokio::test]
    async fn test_baseline_failure_aborts_before_mutants() {
        let (_original, copy) = copy_of("pub fn double(x: u32) -> u32 {\n    x * 4\n}\n").await;
        let runner = ScriptedRunner::new(judge);
        let harness = Harness::new(&runner, &copy, NotCollectedPolicy::Exclude);

        let err = harness
            .score(&locator(), &mutants(&["x * 3"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::BaselineFailed {
                outcome: TestOutcome::Failed,
                ..
            }
        ));
        assert_eq!(runner.runs(), 1);
    }

    #[tokio::test]
    async fn test_uncollected_baseline_is_test_not_found() {
        let (_original, copy) = copy_of(LIB).await;
        let runner = ScriptedRunner::new(|_| TestOutcome::NotCollected);
        let harness = Harness::new(&runner, &copy, NotCollectedPolicy::Exclude);

        let err = harness.check_baseline(&locator()).await.unwrap_err();
        assert!(matches!(err, Error::TestNotFound(name) if name == "prop_double"));
    }

    #[tokio::test]
    async fn test_restore_after_runner_error() {
        struct Broken;
        impl TestRunner for Broken {
            async fn run(&self, _: &TestLocator, _: &WorkingCopy) -> Result<TestReport> {
                Err(Error::Runner("crashed without a report".to_string()))
            }
        }

        let (_original, copy) = copy_of(LIB).await;
        let harness = Harness::new(&Broken, &copy, NotCollectedPolicy::Exclude);
        let err = harness
            .score_mutants(&locator(), &mutants(&["x * 3"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Runner(_)));

        let lib = std::fs::read_to_string(copy.resolve(Path::new("src/lib.rs"))).unwrap();
        assert_eq!(lib, LIB);
    }

    #[tokio::test]
    async fn test_empty_batch_scores_zero() {
        let (_original, copy) = copy_of(LIB).await;
        let runner = ScriptedRunner::new(judge);
        let harness = Harness::new(&runner, &copy, NotCollectedPolicy::Exclude);

        let card = harness.score(&locator(), &[]).await.unwrap();
        assert_eq!(card.kill_ratio, 0.0);
    }
}
