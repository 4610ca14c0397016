use crate::error::{Error, Result};
use crate::language::Language;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Compute a SHA256 hash of the content
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Coarse bucket for [`SourceFile::complexity_score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

/// Snapshot of the derived metrics, handed to the language model as context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityMetrics {
    pub lines: usize,
    pub functions: usize,
    pub classes: usize,
    pub conditionals: usize,
    pub score: f64,
    pub level: ComplexityLevel,
}

/// The module under test.
///
/// Size and hash always describe the current content; the only way to change
/// the content is [`SourceFile::update_content`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    path: PathBuf,
    content: String,
    language: Language,
    size: usize,
    line_count: usize,
    content_hash: String,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl SourceFile {
    /// Create a source file, detecting the language from the extension.
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let language = Language::from_path(&path).ok_or_else(|| {
            Error::Validation(format!("unsupported source language: {}", path.display()))
        })?;
        Ok(Self::with_language(path, content, language))
    }

    /// Create a source file with an explicit language.
    pub fn with_language(
        path: impl Into<PathBuf>,
        content: impl Into<String>,
        language: Language,
    ) -> Self {
        let content = content.into();
        let now = Utc::now();
        Self {
            path: path.into(),
            size: content.len(),
            line_count: count_lines(&content),
            content_hash: compute_hash(&content),
            content,
            language,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without directories, used in prompts and logs.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    /// Replace the content, recomputing size, line count and hash together.
    pub fn update_content(&mut self, content: impl Into<String>) {
        let content = content.into();
        self.size = content.len();
        self.line_count = count_lines(&content);
        self.content_hash = compute_hash(&content);
        self.content = content;
        self.modified_at = Utc::now();
    }

    pub fn function_count(&self) -> usize {
        let syntax = self.language.syntax();
        syntax.count(&syntax.function, &self.content)
    }

    pub fn class_count(&self) -> usize {
        let syntax = self.language.syntax();
        syntax.count(&syntax.class, &self.content)
    }

    pub fn conditional_count(&self) -> usize {
        let syntax = self.language.syntax();
        syntax.count(&syntax.conditional, &self.content)
    }

    /// `ln(1 + functions + classes + conditionals) * 10`, two decimals.
    pub fn complexity_score(&self) -> f64 {
        let units = 1 + self.function_count() + self.class_count() + self.conditional_count();
        ((units as f64).ln() * 10.0 * 100.0).round() / 100.0
    }

    pub fn complexity_level(&self) -> ComplexityLevel {
        level_for(self.complexity_score())
    }

    pub fn complexity_metrics(&self) -> ComplexityMetrics {
        let score = self.complexity_score();
        ComplexityMetrics {
            lines: self.line_count,
            functions: self.function_count(),
            classes: self.class_count(),
            conditionals: self.conditional_count(),
            score,
            level: level_for(score),
        }
    }

    /// Declaration lines of every function, trimmed.
    pub fn function_signatures(&self) -> Vec<String> {
        self.language
            .syntax()
            .signature
            .find_iter(&self.content)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn count_lines(content: &str) -> usize {
    content.lines().count()
}

fn level_for(score: f64) -> ComplexityLevel {
    if score < 15.0 {
        ComplexityLevel::Low
    } else if score < 30.0 {
        ComplexityLevel::Medium
    } else {
        ComplexityLevel::High
    }
}
