//! Mutation-guided test generation.
//!
//! A language model writes a test suite for a source file, a mutation-testing
//! tool measures it, and the surviving mutants drive the next round of
//! generation until the suite reaches a target mutation score.

pub mod analysis;
pub mod collaborators;
pub mod config;
pub mod entities;
pub mod error;
pub mod feedback;
pub mod generation;
pub mod language;
pub mod usecases;

pub use error::{Error, Result};
