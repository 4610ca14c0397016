use crate::generation::MergeStrategy;
use crate::language::Language;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One improvement applied to a test file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementRecord {
    /// Loop iteration that produced the improvement.
    pub iteration: u32,
    pub mutants_targeted: usize,
    pub test_cases_added: usize,
    /// How the new text was merged into the suite.
    pub merged_by: MergeStrategy,
    pub recorded_at: DateTime<Utc>,
}

/// Bookkeeping about how a test file evolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    /// Iteration of the most recent improvement (0 before any).
    pub iterations: u32,
    pub last_improvement: Option<ImprovementRecord>,
    /// Append-only.
    pub improvement_history: Vec<ImprovementRecord>,
}

/// A generated test suite for one source file.
///
/// `version` starts at 1 and grows by exactly one per [`TestFile::update_content`],
/// which also appends exactly one history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestFile {
    path: PathBuf,
    content: String,
    /// The source file this suite exercises (identity only).
    source_path: PathBuf,
    language: Language,
    version: u32,
    created_at: DateTime<Utc>,
    metadata: GenerationMetadata,
}

impl TestFile {
    pub fn new(
        path: impl Into<PathBuf>,
        content: impl Into<String>,
        source_path: impl Into<PathBuf>,
        language: Language,
    ) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            source_path: source_path.into(),
            language,
            version: 1,
            created_at: Utc::now(),
            metadata: GenerationMetadata::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn metadata(&self) -> &GenerationMetadata {
        &self.metadata
    }

    /// Replace the content and record the improvement that produced it.
    pub fn update_content(&mut self, content: impl Into<String>, record: ImprovementRecord) {
        self.content = content.into();
        self.version += 1;
        self.metadata.iterations = record.iteration;
        self.metadata.last_improvement = Some(record.clone());
        self.metadata.improvement_history.push(record);
    }

    pub fn test_names(&self) -> Vec<String> {
        self.language.syntax().extract_test_names(&self.content)
    }

    pub fn test_count(&self) -> usize {
        self.test_names().len()
    }

    pub fn assertion_count(&self) -> usize {
        let syntax = self.language.syntax();
        syntax.count(&syntax.assertion, &self.content)
    }
}
