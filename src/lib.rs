//! Mutation-guided refinement of property-based tests.
//!
//! A test is scored by how many random mutants of the code it exercises it
//! kills. [`session::Session`] then asks a text-generation oracle for
//! revisions until that kill ratio crosses a threshold.

pub mod config;
pub mod error;
pub mod extract;
pub mod harness;
pub mod mutation;
pub mod oracle;
pub mod refine;
pub mod repo_config;
pub mod session;
pub mod source;

pub use error::{Error, Result};
