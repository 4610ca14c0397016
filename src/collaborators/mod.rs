//! Contracts for the external collaborators the core consumes, plus the
//! default adapters the binary wires in.
//!
//! The core only ever sees the traits. Adapter errors are opaque
//! (`anyhow::Error`); services attach context when they surface them.

mod command;
mod fs_storage;
mod ollama;

pub use command::{parse_stryker_report, CommandMutationTester};
pub use fs_storage::FsStorage;
pub use ollama::{extract_code_block, OllamaClient, OllamaModel};

pub use crate::entities::{MutantRecord, MutationRunOutcome};

use crate::entities::{ComplexityMetrics, MutationResult};
use crate::language::Language;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything the language model gets to know about the file besides its code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationContext {
    pub file_name: String,
    pub language: Language,
    pub test_framework: String,
    pub complexity: ComplexityMetrics,
    pub function_signatures: Vec<String>,
    /// Tests that already exist for this file, if any.
    pub existing_tests: Option<String>,
    /// Free-form context supplied by the caller.
    pub extra: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostOptions {
    /// Improvement rounds to budget for on top of the initial generation.
    pub improvement_rounds: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub tokens: u64,
    pub cost: f64,
}

/// Produces and revises test source text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate_tests(
        &self,
        source_code: &str,
        file_name: &str,
        context: &GenerationContext,
    ) -> Result<String>;

    async fn improve_tests(
        &self,
        source_code: &str,
        existing_tests: &str,
        survived_mutants: &[MutantRecord],
    ) -> Result<String>;

    async fn estimate_cost(&self, input: &str, options: &CostOptions) -> Result<CostEstimate>;

    async fn is_healthy(&self) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationRunOptions {
    /// Loop iteration the run belongs to (0 outside the loop).
    pub iteration: u32,
    pub timeout_seconds: u64,
}

impl Default for MutationRunOptions {
    fn default() -> Self {
        Self {
            iteration: 0,
            timeout_seconds: 300,
        }
    }
}

/// Measures a test suite against synthetic defects in the source.
#[async_trait]
pub trait MutationTester: Send + Sync {
    async fn run_mutation_tests(
        &self,
        source_path: &Path,
        test_path: &Path,
        options: &MutationRunOptions,
    ) -> Result<MutationRunOutcome>;

    /// Write the tool's own report for a completed result, if it has one.
    async fn write_report(&self, _result: &MutationResult) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageInfo {
    pub backend: String,
    pub root: Option<PathBuf>,
}

/// Reads and persists text files.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn read_file(&self, path: &Path) -> Result<String>;

    async fn save_file(&self, path: &Path, content: &str) -> Result<()>;

    async fn info(&self) -> Result<StorageInfo>;
}
