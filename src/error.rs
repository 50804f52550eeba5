//! Error taxonomy shared by the extractor, harness and refiner.

use std::path::PathBuf;

use crate::harness::TestOutcome;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A source unit could not be parsed.
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: syn::Error,
    },

    /// The test is unknown to the extractor, or the runner produced no record for it.
    #[error("property test `{0}` was not found")]
    TestNotFound(String),

    /// The unmutated test does not pass, so mutation trials are meaningless.
    #[error("baseline run of `{test}` did not pass ({outcome})")]
    BaselineFailed { test: String, outcome: TestOutcome },

    /// The oracle transport kept failing after its retry budget.
    #[error("oracle request failed after {attempts} attempt(s): {last}")]
    OracleExhausted { attempts: usize, last: String },

    /// The test runner could not be started or left no report behind.
    #[error("test runner failed: {0}")]
    Runner(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors that only abort the session for the current test; a batch moves on.
    pub fn is_test_scoped(&self) -> bool {
        matches!(
            self,
            Error::TestNotFound(_) | Error::BaselineFailed { .. } | Error::Parse { .. }
        )
    }
}
