//! The refinement loop.
//!
//! Tightening and generalizing share one state machine. They differ only in
//! which side of the mutant partition blocks the threshold and which way the
//! kill ratio has to move.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use syn::ItemFn;

use crate::error::Result;
use crate::extract::DependencyClosure;
use crate::harness::{Definitions, Harness, ScoreCard, TestLocator, TestOutcome, TestRunner};
use crate::mutation::Mutant;
use crate::oracle::prompts::{extract_code_block, generalize_prompt, tighten_prompt};
use crate::oracle::Oracle;
use crate::source::{function_items, render_fn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Raise the kill ratio to at least the threshold.
    Tighten,
    /// Lower the kill ratio to at most the threshold.
    Generalize,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tighten => write!(f, "tighten"),
            Protocol::Generalize => write!(f, "generalize"),
        }
    }
}

impl Protocol {
    pub fn satisfied(self, kill_ratio: f64, threshold: f64) -> bool {
        match self {
            Protocol::Tighten => kill_ratio >= threshold,
            Protocol::Generalize => kill_ratio <= threshold,
        }
    }

    /// Mutants standing between the current test and the threshold.
    fn blocking(self, card: &ScoreCard) -> &[Mutant] {
        match self {
            Protocol::Tighten => &card.passed,
            Protocol::Generalize => &card.failed,
        }
    }

    fn prompt(self, code: &str, test: &str, mutant: &str) -> String {
        match self {
            Protocol::Tighten => tighten_prompt(code, test, mutant),
            Protocol::Generalize => generalize_prompt(code, test, mutant),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RefineOptions {
    pub threshold: f64,
    /// Outer iterations; each samples one blocking mutant.
    pub max_iters: usize,
    /// Oracle proposals per sampled mutant.
    pub attempts_per_mutant: usize,
}

/// A test body that meets its threshold.
#[derive(Debug, Clone, Serialize)]
pub struct RefinedTest {
    pub name: String,
    pub body: String,
    pub kill_ratio: f64,
    /// False when the original test already met the threshold.
    pub revised: bool,
    pub oracle_calls: usize,
}

#[derive(Debug, Clone)]
pub enum RefineOutcome {
    Converged(RefinedTest),
    /// The budget ran out; the caller keeps its original test.
    Exhausted {
        kill_ratio: f64,
        oracle_calls: usize,
    },
}

impl RefineOutcome {
    pub fn oracle_calls(&self) -> usize {
        match self {
            RefineOutcome::Converged(test) => test.oracle_calls,
            RefineOutcome::Exhausted { oracle_calls, .. } => *oracle_calls,
        }
    }
}

/// Why a proposed revision was not accepted.
#[derive(Debug, Clone, PartialEq)]
enum RejectReason {
    NoCodeBlock,
    Unparsable(String),
    NameMismatch,
    Unprintable,
    Regression(TestOutcome),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::NoCodeBlock => write!(f, "response had no code block"),
            RejectReason::Unparsable(e) => write!(f, "candidate does not parse: {}", e),
            RejectReason::NameMismatch => write!(f, "candidate renames the test"),
            RejectReason::Unprintable => write!(f, "candidate cannot be printed back"),
            RejectReason::Regression(outcome) => {
                write!(f, "candidate is {} on the unmutated project", outcome)
            }
        }
    }
}

enum State {
    /// Start an outer iteration.
    Sampling,
    Proposing { mutant: Mutant, attempt: usize },
    Validating { mutant: Mutant, attempt: usize, candidate: String },
    Rescoring { candidate: ItemFn, text: String },
    Done,
    Failed,
}

pub struct Refiner<'a, O, R: TestRunner> {
    oracle: &'a O,
    harness: &'a Harness<'a, R>,
    options: RefineOptions,
}

impl<'a, O: Oracle, R: TestRunner> Refiner<'a, O, R> {
    pub fn new(oracle: &'a O, harness: &'a Harness<'a, R>, options: RefineOptions) -> Self {
        Self {
            oracle,
            harness,
            options,
        }
    }

    /// Score the test against `batch`, then revise it until the protocol's
    /// threshold holds or the iteration budget is spent.
    ///
    /// The batch is never regenerated. Baseline failures and oracle exhaustion
    /// are errors; running out of iterations is not.
    pub async fn run<G: Rng + ?Sized>(
        &self,
        protocol: Protocol,
        closure: &DependencyClosure,
        batch: &[Mutant],
        rng: &mut G,
    ) -> Result<RefineOutcome> {
        let locator = closure.test.locator();
        let code = closure.code();

        let mut card = self.harness.score(&locator, batch).await?;
        let mut current = closure.test.source().to_string();
        let mut revised = false;
        let mut oracle_calls = 0;
        let mut iters_left = self.options.max_iters;

        tracing::info!(
            "{} {}: baseline kill ratio {:.2} (threshold {:.2})",
            protocol,
            locator.name,
            card.kill_ratio,
            self.options.threshold
        );

        let mut state = if protocol.satisfied(card.kill_ratio, self.options.threshold) {
            State::Done
        } else {
            State::Sampling
        };

        loop {
            state = match state {
                State::Sampling => {
                    if iters_left == 0 {
                        State::Failed
                    } else {
                        iters_left -= 1;
                        match protocol.blocking(&card).choose(rng) {
                            Some(mutant) => State::Proposing {
                                mutant: mutant.clone(),
                                attempt: 1,
                            },
                            None => {
                                tracing::warn!(
                                    "{}: no blocking mutants to sample from",
                                    locator.name
                                );
                                State::Failed
                            }
                        }
                    }
                }

                State::Proposing { mutant, attempt } => {
                    if attempt > self.options.attempts_per_mutant {
                        tracing::info!(
                            "Abandoning mutant {} after {} attempt(s); {} iteration(s) left",
                            mutant.id,
                            self.options.attempts_per_mutant,
                            iters_left
                        );
                        State::Sampling
                    } else {
                        let prompt = protocol.prompt(&code, &current, &mutant.code);
                        oracle_calls += 1;
                        let response = self.oracle.complete(&prompt).await?;
                        match extract_code_block(&response) {
                            Some(candidate) => State::Validating {
                                mutant,
                                attempt,
                                candidate,
                            },
                            None => {
                                tracing::warn!(
                                    "Rejected candidate for mutant {} (attempt {}): {}",
                                    mutant.id,
                                    attempt,
                                    RejectReason::NoCodeBlock
                                );
                                State::Proposing {
                                    mutant,
                                    attempt: attempt + 1,
                                }
                            }
                        }
                    }
                }

                State::Validating {
                    mutant,
                    attempt,
                    candidate,
                } => match self.validate(&locator, &closure.test.item, &candidate).await? {
                    Ok((item, text)) => State::Rescoring {
                        candidate: item,
                        text,
                    },
                    Err(reason) => {
                        tracing::warn!(
                            "Rejected candidate for mutant {} (attempt {}): {}",
                            mutant.id,
                            attempt,
                            reason
                        );
                        State::Proposing {
                            mutant,
                            attempt: attempt + 1,
                        }
                    }
                },

                State::Rescoring { candidate, text } => {
                    let installed = Definitions::from_items([candidate]);
                    card = self
                        .harness
                        .score_mutants_with(&locator, &installed, batch)
                        .await?;
                    current = text;
                    revised = true;

                    tracing::info!(
                        "{}: accepted revision, kill ratio now {:.2}",
                        locator.name,
                        card.kill_ratio
                    );

                    if protocol.satisfied(card.kill_ratio, self.options.threshold) {
                        State::Done
                    } else {
                        State::Sampling
                    }
                }

                State::Done => {
                    return Ok(RefineOutcome::Converged(RefinedTest {
                        name: locator.name.clone(),
                        body: current,
                        kill_ratio: card.kill_ratio,
                        revised,
                        oracle_calls,
                    }));
                }

                State::Failed => {
                    tracing::info!(
                        "{}: iteration budget exhausted at kill ratio {:.2}",
                        locator.name,
                        card.kill_ratio
                    );
                    return Ok(RefineOutcome::Exhausted {
                        kill_ratio: card.kill_ratio,
                        oracle_calls,
                    });
                }
            };
        }
    }

    /// Check a candidate against the pristine project. The outer `Result`
    /// carries infrastructure failures; the inner one the verdict.
    async fn validate(
        &self,
        locator: &TestLocator,
        original: &ItemFn,
        candidate: &str,
    ) -> Result<std::result::Result<(ItemFn, String), RejectReason>> {
        let file = match syn::parse_file(candidate) {
            Ok(file) => file,
            Err(e) => return Ok(Err(RejectReason::Unparsable(e.to_string()))),
        };

        let Some(mut item) = function_items(&file)
            .into_iter()
            .find(|item| item.sig.ident == locator.name)
        else {
            return Ok(Err(RejectReason::NameMismatch));
        };

        // Replies often drop the test attribute along with the surrounding module.
        if item.attrs.is_empty() {
            item.attrs = original.attrs.clone();
        }

        let Some(text) = render_fn(&item) else {
            return Ok(Err(RejectReason::Unprintable));
        };

        let installed = Definitions::from_items([item.clone()]);
        match self.harness.run_with(locator, &installed).await? {
            TestOutcome::Passed => Ok(Ok((item, text))),
            outcome => Ok(Err(RejectReason::Regression(outcome))),
        }
    }
}
