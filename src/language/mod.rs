//! Language abstraction layer for multi-language support.
//!
//! Nothing here parses source code. Each language carries a small table of
//! textual patterns that the entities and services use for coarse metrics,
//! structural validation of generated tests, and best-effort merging.

mod syntax;

use anyhow::Result;
use std::path::{Path, PathBuf};

pub use syntax::{GroupingSyntax, LanguageSyntax};

/// Supported programming languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    JavaScript,
    TypeScript,
    Rust,
    Python,
}

impl Language {
    /// All supported languages, in detection order.
    pub const ALL: [Language; 4] = [
        Language::JavaScript,
        Language::TypeScript,
        Language::Rust,
        Language::Python,
    ];

    /// Detect the language of a file from its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::ALL
            .into_iter()
            .find(|lang| lang.file_extensions().contains(&ext))
    }

    /// Human-readable name for the language.
    pub fn name(&self) -> &'static str {
        match self {
            Language::JavaScript => "JavaScript",
            Language::TypeScript => "TypeScript",
            Language::Rust => "Rust",
            Language::Python => "Python",
        }
    }

    /// File extensions for this language.
    pub fn file_extensions(&self) -> &'static [&'static str] {
        match self {
            Language::JavaScript => &["js", "jsx", "mjs", "cjs"],
            Language::TypeScript => &["ts", "tsx", "mts", "cts"],
            Language::Rust => &["rs"],
            Language::Python => &["py"],
        }
    }

    /// Name of the test framework the generated suites are written for.
    pub fn test_framework(&self) -> &'static str {
        match self {
            Language::JavaScript | Language::TypeScript => "jest",
            Language::Rust => "cargo test",
            Language::Python => "pytest",
        }
    }

    /// Markdown code fence tag for prompts.
    pub fn fence_tag(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Rust => "rust",
            Language::Python => "python",
        }
    }

    /// Textual patterns for this language.
    pub fn syntax(&self) -> &'static LanguageSyntax {
        match self {
            Language::JavaScript | Language::TypeScript => &*syntax::JAVASCRIPT,
            Language::Rust => &*syntax::RUST,
            Language::Python => &*syntax::PYTHON,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Directories never scanned for source files.
const SKIP_DIRECTORIES: &[&str] = &[
    "target",
    "node_modules",
    "dist",
    "build",
    "coverage",
    "__pycache__",
    "venv",
];

/// Find all source files of any supported language below `dir`.
///
/// Hidden directories and build output are skipped. The root itself is never
/// filtered, so temp directories starting with `.` still work.
pub fn find_source_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if !dir.is_dir() {
        return Ok(files);
    }

    let root_dir = dir.to_path_buf();

    for entry in walkdir::WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.path() == root_dir {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !SKIP_DIRECTORIES.contains(&name.as_ref())
        })
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() && Language::from_path(path).is_some() {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}
