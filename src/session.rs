//! Entry operations.
//!
//! A [`Session`] owns the injected oracle, the test runner and the random
//! source. Every operation clones the project into a fresh working copy that
//! is removed when the operation returns, whichever way it returns.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::config::RefineConfig;
use crate::error::Result;
use crate::extract::{DependencyClosure, FunctionDef, ProjectIndex};
use crate::harness::{Harness, NotCollectedPolicy, TestRunner, WorkingCopy};
use crate::mutation::{generate_mutants, sample_batch, Mutant};
use crate::oracle::Oracle;
use crate::refine::{Protocol, RefineOptions, RefineOutcome, Refiner};
use crate::repo_config::RepoConfig;

/// Knobs shared by every operation of a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub mutant_count: usize,
    pub max_depth: usize,
    pub max_iters: usize,
    pub attempts_per_mutant: usize,
    pub not_collected: NotCollectedPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&RefineConfig::default())
    }
}

impl From<&RefineConfig> for SessionOptions {
    fn from(config: &RefineConfig) -> Self {
        Self {
            mutant_count: config.mutant_count,
            max_depth: config.max_depth,
            max_iters: config.max_iters,
            attempts_per_mutant: config.attempts_per_mutant,
            not_collected: config.not_collected,
        }
    }
}

/// One row of an analysis.
#[derive(Debug, Clone, Serialize)]
pub struct TestScore {
    pub name: String,
    pub unit: PathBuf,
    pub kill_ratio: f64,
    pub killed: usize,
    pub survived: usize,
    pub not_collected: usize,
}

pub struct Session<O, R> {
    oracle: O,
    runner: R,
    options: SessionOptions,
    rng: StdRng,
}

impl<O: Oracle, R: TestRunner> Session<O, R> {
    /// Without a seed, mutant generation and sampling are not reproducible.
    pub fn new(oracle: O, runner: R, options: SessionOptions, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            oracle,
            runner,
            options,
            rng,
        }
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Names of every property test in the project.
    pub fn list_tests(&self, repo: &Path) -> Result<Vec<String>> {
        let index = load_index(repo)?;
        Ok(index
            .find_property_tests()
            .into_iter()
            .map(|test| test.name.clone())
            .collect())
    }

    /// Revise `name` until it kills at least `threshold` of its mutants.
    pub async fn tighten(&mut self, repo: &Path, name: &str, threshold: f64) -> Result<RefineOutcome> {
        self.refine(Protocol::Tighten, repo, name, threshold).await
    }

    /// Revise `name` until it kills at most `threshold` of its mutants.
    pub async fn generalize(
        &mut self,
        repo: &Path,
        name: &str,
        threshold: f64,
    ) -> Result<RefineOutcome> {
        self.refine(Protocol::Generalize, repo, name, threshold).await
    }

    async fn refine(
        &mut self,
        protocol: Protocol,
        repo: &Path,
        name: &str,
        threshold: f64,
    ) -> Result<RefineOutcome> {
        let index = load_index(repo)?;
        let test = index.find_property_test(name)?;
        let closure = index.compute_dependency_closure(test);
        let batch = self.mutant_batch(&closure);

        let copy = WorkingCopy::create(repo).await?;
        let harness = Harness::new(&self.runner, &copy, self.options.not_collected);
        let refiner = Refiner::new(
            &self.oracle,
            &harness,
            RefineOptions {
                threshold,
                max_iters: self.options.max_iters,
                attempts_per_mutant: self.options.attempts_per_mutant,
            },
        );

        tracing::info!(
            "{} {} ({} mutant(s), threshold {:.2})",
            protocol,
            test.locator(),
            batch.len(),
            threshold
        );
        refiner.run(protocol, &closure, &batch, &mut self.rng).await
    }

    /// Kill ratio of one test.
    pub async fn analyze_one(&mut self, repo: &Path, name: &str) -> Result<TestScore> {
        let index = load_index(repo)?;
        let test = index.find_property_test(name)?;
        let copy = WorkingCopy::create(repo).await?;
        self.score_test(&index, test, &copy).await
    }

    /// Kill ratio of every property test, sharing one working copy.
    ///
    /// Tests that are missing from the runner's report, fail unmutated or
    /// cannot be parsed are skipped; any other error ends the batch.
    pub async fn analyze_all(&mut self, repo: &Path) -> Result<Vec<TestScore>> {
        let index = load_index(repo)?;
        let tests = index.find_property_tests();
        tracing::info!("Analyzing {} property test(s)", tests.len());

        let copy = WorkingCopy::create(repo).await?;
        let mut scores = Vec::new();

        for test in tests {
            match self.score_test(&index, test, &copy).await {
                Ok(score) => scores.push(score),
                Err(e) if e.is_test_scoped() => {
                    tracing::warn!("Skipping {}: {}", test.name, e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(scores)
    }

    async fn score_test(
        &mut self,
        index: &ProjectIndex,
        test: &FunctionDef,
        copy: &WorkingCopy,
    ) -> Result<TestScore> {
        let locator = test.locator();
        let closure = index.compute_dependency_closure(test);
        let batch = self.mutant_batch(&closure);

        let harness = Harness::new(&self.runner, copy, self.options.not_collected);
        let card = harness.score(&locator, &batch).await?;

        Ok(TestScore {
            name: locator.name,
            unit: locator.unit,
            kill_ratio: card.kill_ratio,
            killed: card.failed.len(),
            survived: card.passed.len(),
            not_collected: card.not_collected.len(),
        })
    }

    fn mutant_batch(&mut self, closure: &DependencyClosure) -> Vec<Mutant> {
        if closure.definitions.is_empty() {
            tracing::warn!(
                "{} calls no project functions; nothing to mutate",
                closure.test.name
            );
            return Vec::new();
        }
        if closure.requires_external {
            tracing::debug!("{} depends on external crates", closure.test.name);
        }

        let mutants = generate_mutants(
            &closure.code(),
            self.options.mutant_count,
            self.options.max_depth,
            &mut self.rng,
        );
        let batch = sample_batch(&mutants, self.options.mutant_count, &mut self.rng);
        tracing::debug!(
            "Sampled {} of {} mutant(s) for {}",
            batch.len(),
            mutants.len(),
            closure.test.name
        );
        batch
    }
}

fn load_index(repo: &Path) -> Result<ProjectIndex> {
    let options = RepoConfig::load_or_default(repo).extract_options();
    ProjectIndex::load(repo, &options)
}
