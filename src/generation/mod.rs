//! Test generation: initial suites, mutant-driven improvements and cost estimates.

mod merge;

pub use merge::{merge_tests, MergeOutcome, MergeStrategy};

use crate::collaborators::{
    CostEstimate, CostOptions, GenerationContext, LanguageModel, MutantRecord, Storage,
};
use crate::entities::{ComplexityMetrics, ImprovementRecord, SourceFile, TestFile};
use crate::error::{Collaborator, Error, Result};
use crate::language::Language;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where generated suites go and how improvements are merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub test_dir: PathBuf,
    pub merge_strategy: MergeStrategy,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            test_dir: PathBuf::from("tests"),
            merge_strategy: MergeStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Tests that already exist for the file, shown to the model.
    pub existing_tests: Option<String>,
    /// Free-form context passed through to the model.
    pub extra_context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct ImproveOptions {
    /// Loop iteration this improvement belongs to.
    pub iteration: u32,
    /// Append instead of splicing, whatever the configured strategy.
    pub force_append: bool,
}

/// What one improvement changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementSummary {
    pub mutants_targeted: usize,
    pub new_test_cases: usize,
    /// Test file version after the improvement.
    pub version: u32,
    pub merged_by: MergeStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationCostEstimate {
    pub file_name: String,
    pub tokens: u64,
    pub cost: f64,
    pub complexity: ComplexityMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityStatus {
    pub healthy: bool,
    pub detail: Option<String>,
}

/// Health of each collaborator, checked independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityReport {
    pub language_model: CapabilityStatus,
    pub storage: CapabilityStatus,
}

impl CapabilityReport {
    pub fn all_healthy(&self) -> bool {
        self.language_model.healthy && self.storage.healthy
    }
}

/// Path of the suite for `source_path`: `<test_dir>/<stem>.test.<ext>`.
///
/// Only the last extension is replaced, so `a.service.ts` becomes
/// `a.service.test.ts`.
pub fn test_path_for(source_path: &Path, test_dir: &Path) -> PathBuf {
    let stem = source_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match source_path.extension() {
        Some(ext) => format!("{}.test.{}", stem, ext.to_string_lossy()),
        None => format!("{stem}.test"),
    };
    test_dir.join(name)
}

/// Structural sanity check of a test suite. Returns the extracted test names.
pub fn validate_generated_tests(content: &str, language: Language) -> Result<Vec<String>> {
    let syntax = language.syntax();

    if !syntax.group_marker.is_match(content) {
        return Err(Error::Validation(format!(
            "generated {language} tests contain no test group"
        )));
    }
    if !syntax.test_marker.is_match(content) {
        return Err(Error::Validation(format!(
            "generated {language} tests contain no test cases"
        )));
    }
    if !syntax.assertion.is_match(content) {
        return Err(Error::Validation(format!(
            "generated {language} tests contain no assertions"
        )));
    }

    let names = syntax.extract_test_names(content);
    if names.is_empty() {
        return Err(Error::Validation(format!(
            "no test names could be extracted from generated {language} tests"
        )));
    }
    Ok(names)
}

/// An improvement reply must carry at least one named test case of its own.
fn check_improvement_reply(reply: &str, language: Language) -> Result<()> {
    let syntax = language.syntax();
    if !syntax.test_marker.is_match(reply) || syntax.extract_test_names(reply).is_empty() {
        return Err(Error::Validation(format!(
            "improvement reply contains no {language} test cases"
        )));
    }
    Ok(())
}

/// Drives the language model and persists what it produces.
pub struct TestGenerationService {
    model: Arc<dyn LanguageModel>,
    storage: Arc<dyn Storage>,
    settings: GenerationSettings,
}

impl TestGenerationService {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        storage: Arc<dyn Storage>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            model,
            storage,
            settings,
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn test_path(&self, source: &SourceFile) -> PathBuf {
        test_path_for(source.path(), &self.settings.test_dir)
    }

    fn context_for(&self, source: &SourceFile, options: &GenerateOptions) -> GenerationContext {
        GenerationContext {
            file_name: source.file_name(),
            language: source.language(),
            test_framework: source.language().test_framework().to_string(),
            complexity: source.complexity_metrics(),
            function_signatures: source.function_signatures(),
            existing_tests: options.existing_tests.clone(),
            extra: options.extra_context.clone(),
        }
    }

    /// Generate, validate and persist a first suite for `source`.
    pub async fn generate_initial_tests(
        &self,
        source: &SourceFile,
        options: &GenerateOptions,
    ) -> Result<TestFile> {
        let file_name = source.file_name();
        tracing::info!("Generating tests for {}", file_name);

        let context = self.context_for(source, options);
        let content = self
            .model
            .generate_tests(source.content(), &file_name, &context)
            .await
            .map_err(|e| {
                tracing::error!("Test generation failed for {}: {:#}", file_name, e);
                Error::collaborator(
                    Collaborator::LanguageModel,
                    format!("generating tests for {file_name}"),
                    e,
                )
            })?;

        let names = validate_generated_tests(&content, source.language())?;

        let test_path = self.test_path(source);
        self.storage
            .save_file(&test_path, &content)
            .await
            .map_err(|e| {
                Error::collaborator(
                    Collaborator::Storage,
                    format!("saving {}", test_path.display()),
                    e,
                )
            })?;

        tracing::info!(
            "Generated {} test cases for {} at {}",
            names.len(),
            file_name,
            test_path.display()
        );

        Ok(TestFile::new(
            test_path,
            content,
            source.path(),
            source.language(),
        ))
    }

    /// Ask for tests that kill `mutants`, merge them into `test_file` and persist.
    ///
    /// On any error `test_file` is left as it was.
    pub async fn improve_tests(
        &self,
        source: &SourceFile,
        test_file: &mut TestFile,
        mutants: &[MutantRecord],
        options: &ImproveOptions,
    ) -> Result<ImprovementSummary> {
        let file_name = source.file_name();
        tracing::info!(
            "Improving tests for {} against {} mutants (iteration {})",
            file_name,
            mutants.len(),
            options.iteration
        );

        let new_tests = self
            .model
            .improve_tests(source.content(), test_file.content(), mutants)
            .await
            .map_err(|e| {
                Error::collaborator(
                    Collaborator::LanguageModel,
                    format!(
                        "improving tests for {file_name} (iteration {})",
                        options.iteration
                    ),
                    e,
                )
            })?;

        check_improvement_reply(&new_tests, test_file.language())?;

        let strategy = if options.force_append {
            MergeStrategy::Append
        } else {
            self.settings.merge_strategy
        };
        let merged = merge_tests(test_file.content(), &new_tests, test_file.language(), strategy);
        let names = validate_generated_tests(&merged.content, test_file.language())?;
        let added = names.len().saturating_sub(test_file.test_count());

        self.storage
            .save_file(test_file.path(), &merged.content)
            .await
            .map_err(|e| {
                Error::collaborator(
                    Collaborator::Storage,
                    format!("saving {}", test_file.path().display()),
                    e,
                )
            })?;

        test_file.update_content(
            merged.content,
            ImprovementRecord {
                iteration: options.iteration,
                mutants_targeted: mutants.len(),
                test_cases_added: added,
                merged_by: merged.applied,
                recorded_at: Utc::now(),
            },
        );

        tracing::debug!(
            "Merged {} new test cases into {} by {}",
            added,
            test_file.path().display(),
            merged.applied
        );

        Ok(ImprovementSummary {
            mutants_targeted: mutants.len(),
            new_test_cases: added,
            version: test_file.version(),
            merged_by: merged.applied,
        })
    }

    pub async fn estimate_generation_cost(
        &self,
        source: &SourceFile,
        options: &CostOptions,
    ) -> Result<GenerationCostEstimate> {
        let file_name = source.file_name();
        let CostEstimate { tokens, cost } = self
            .model
            .estimate_cost(source.content(), options)
            .await
            .map_err(|e| {
                Error::collaborator(
                    Collaborator::LanguageModel,
                    format!("estimating cost for {file_name}"),
                    e,
                )
            })?;

        Ok(GenerationCostEstimate {
            file_name,
            tokens,
            cost,
            complexity: source.complexity_metrics(),
        })
    }

    pub async fn validate_capabilities(&self) -> CapabilityReport {
        let language_model = if self.model.is_healthy().await {
            CapabilityStatus {
                healthy: true,
                detail: None,
            }
        } else {
            CapabilityStatus {
                healthy: false,
                detail: Some("language model is not reachable".to_string()),
            }
        };

        let storage = match self.storage.info().await {
            Ok(info) => CapabilityStatus {
                healthy: true,
                detail: Some(match info.root {
                    Some(root) => format!("{} at {}", info.backend, root.display()),
                    None => info.backend,
                }),
            },
            Err(e) => CapabilityStatus {
                healthy: false,
                detail: Some(format!("{e:#}")),
            },
        };

        CapabilityReport {
            language_model,
            storage,
        }
    }
}
