//! Entry points that sequence the services for one file or many.

use crate::analysis::Recommendation;
use crate::collaborators::Storage;
use crate::config::BatchConfig;
use crate::entities::{FileRecord, GenerationSession, SourceFile, TestFile};
use crate::error::{Collaborator, Error, Result};
use crate::feedback::{
    analyze_performance, optimization_suggestions, FeedbackLoopService, LoopOptions, LoopOutcome,
    PerformanceAnalysis,
};
use crate::language::find_source_files;
use futures::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

async fn load_source(storage: &dyn Storage, path: &Path) -> Result<SourceFile> {
    let content = storage.read_file(path).await.map_err(|e| {
        Error::collaborator(
            Collaborator::Storage,
            format!("reading {}", path.display()),
            e,
        )
    })?;
    SourceFile::new(path, content)
}

/// Source files below `dir` that `batch` accepts.
///
/// A relative `dir` is taken from `storage_root`, and the returned paths are
/// relative to `storage_root` wherever possible, so storage reads them back
/// from the same place they were found.
pub fn discover_sources(
    storage_root: &Path,
    dir: &Path,
    batch: &BatchConfig,
) -> Result<Vec<PathBuf>> {
    let scan_root = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        storage_root.join(dir)
    };
    let files = find_source_files(&scan_root).map_err(|e| {
        Error::collaborator(
            Collaborator::Storage,
            format!("scanning {}", scan_root.display()),
            e,
        )
    })?;

    Ok(files
        .into_iter()
        .filter(|path| {
            let relative = path.strip_prefix(&scan_root).unwrap_or(path);
            batch.accepts(&relative.to_string_lossy())
        })
        .map(|path| {
            let relative = path.strip_prefix(storage_root).map(Path::to_path_buf);
            relative.unwrap_or(path)
        })
        .collect())
}

/// Generate and refine tests for a single source file.
pub struct GenerateTests {
    feedback: Arc<FeedbackLoopService>,
    storage: Arc<dyn Storage>,
}

impl GenerateTests {
    pub fn new(feedback: Arc<FeedbackLoopService>, storage: Arc<dyn Storage>) -> Self {
        Self { feedback, storage }
    }

    pub async fn execute(&self, source_path: &Path, options: &LoopOptions) -> Result<LoopOutcome> {
        options.settings.validate()?;
        let source = load_source(self.storage.as_ref(), source_path).await?;
        self.feedback.run(&source, options).await
    }
}

/// Refine a test file that already exists.
pub struct ImproveTests {
    feedback: Arc<FeedbackLoopService>,
    storage: Arc<dyn Storage>,
}

impl ImproveTests {
    pub fn new(feedback: Arc<FeedbackLoopService>, storage: Arc<dyn Storage>) -> Self {
        Self { feedback, storage }
    }

    pub async fn execute(
        &self,
        source_path: &Path,
        test_path: &Path,
        options: &LoopOptions,
    ) -> Result<LoopOutcome> {
        options.settings.validate()?;
        let source = load_source(self.storage.as_ref(), source_path).await?;
        let content = self.storage.read_file(test_path).await.map_err(|e| {
            Error::collaborator(
                Collaborator::Storage,
                format!("reading {}", test_path.display()),
                e,
            )
        })?;
        let test_file = TestFile::new(
            test_path,
            content,
            source_path,
            source.language(),
        );
        self.feedback.refine(&source, test_file, options).await
    }
}

/// Everything a batch run produced.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub session: GenerationSession,
    pub outcomes: Vec<LoopOutcome>,
    pub performance: Option<PerformanceAnalysis>,
    pub suggestions: Vec<Recommendation>,
}

/// Runs the loop over many files, `concurrency` at a time.
///
/// A file that fails never aborts its siblings; it becomes an unsuccessful
/// [`FileRecord`] on the session.
pub struct BatchProcess {
    feedback: Arc<FeedbackLoopService>,
    storage: Arc<dyn Storage>,
    concurrency: usize,
}

impl BatchProcess {
    pub fn new(
        feedback: Arc<FeedbackLoopService>,
        storage: Arc<dyn Storage>,
        concurrency: usize,
    ) -> Self {
        Self {
            feedback,
            storage,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn execute(&self, paths: &[PathBuf], options: &LoopOptions) -> Result<BatchReport> {
        options.settings.validate()?;

        let mut session = GenerationSession::new(serde_json::json!({
            "target_mutation_score": options.settings.target_mutation_score,
            "max_iterations": options.settings.max_iterations,
            "concurrency": self.concurrency,
            "force_append": options.force_append,
        }));
        tracing::info!(
            "Starting session {} for {} files ({} at a time)",
            session.id(),
            paths.len(),
            self.concurrency
        );

        let mut outcomes = Vec::new();
        for path in paths {
            session.add_source_file(path)?;
        }

        for (index, chunk) in paths.chunks(self.concurrency).enumerate() {
            tracing::debug!("Processing batch {} ({} files)", index + 1, chunk.len());
            let settled = join_all(chunk.iter().map(|path| self.process_file(path, options))).await;

            for (record, outcome) in settled {
                session.record_result(record)?;
                if let Some(outcome) = outcome {
                    outcomes.push(outcome);
                }
            }
        }

        session.complete()?;
        let summary = session.summary();
        tracing::info!(
            "Session {} finished: {}/{} files succeeded, {} reached target",
            summary.id,
            summary.succeeded,
            summary.files,
            summary.targets_reached
        );

        let performance = analyze_performance(&outcomes);
        let suggestions = performance
            .as_ref()
            .map(optimization_suggestions)
            .unwrap_or_default();

        Ok(BatchReport {
            session,
            outcomes,
            performance,
            suggestions,
        })
    }

    async fn process_file(
        &self,
        path: &Path,
        options: &LoopOptions,
    ) -> (FileRecord, Option<LoopOutcome>) {
        let source = match load_source(self.storage.as_ref(), path).await {
            Ok(source) => source,
            Err(e) => {
                tracing::error!("Skipping {}: {}", path.display(), e);
                return (failed_record(path, &e, None), None);
            }
        };

        match self.feedback.run(&source, options).await {
            Ok(outcome) => {
                let record = FileRecord {
                    source_path: path.to_path_buf(),
                    success: true,
                    error: None,
                    test_path: Some(outcome.test_file.path().to_path_buf()),
                    final_score: outcome.final_score,
                    target_reached: outcome.target_reached,
                    iterations: outcome.total_iterations,
                };
                (record, Some(outcome))
            }
            Err(e) => {
                tracing::error!("Refinement failed for {}: {}", path.display(), e);
                let test_path = self.feedback.generator().test_path(&source);
                // Report the suite only if something was actually written.
                let artifact = self
                    .storage
                    .read_file(&test_path)
                    .await
                    .ok()
                    .map(|_| test_path);
                (failed_record(path, &e, artifact), None)
            }
        }
    }
}

fn failed_record(path: &Path, error: &Error, test_path: Option<PathBuf>) -> FileRecord {
    FileRecord {
        source_path: path.to_path_buf(),
        success: false,
        error: Some(error.to_string()),
        test_path,
        final_score: None,
        target_reached: false,
        iterations: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::{outcome, ScriptedTester};
    use crate::analysis::{AnalysisSettings, MutationAnalysisService};
    use crate::entities::SessionStatus;
    use crate::feedback::LoopSettings;
    use crate::generation::tests::{MemoryStorage, ScriptedModel, DIVIDE, DIVIDE_TESTS, ZERO_TESTS};
    use crate::generation::{GenerationSettings, TestGenerationService};

    #[test]
    fn test_discover_sources_relative_to_storage_root() {
        let root = tempfile::tempdir().unwrap();
        let src = root.path().join("src");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::create_dir_all(src.join("node_modules")).unwrap();
        std::fs::write(src.join("math.js"), DIVIDE).unwrap();
        std::fs::write(src.join("nested").join("calc.py"), "def f():\n    pass\n").unwrap();
        std::fs::write(src.join("node_modules").join("dep.js"), "").unwrap();
        std::fs::write(src.join("notes.txt"), "").unwrap();

        let batch = BatchConfig {
            include: vec!["**/*".to_string()],
            exclude: vec!["nested/**".to_string()],
        };
        let found = discover_sources(root.path(), Path::new("src"), &batch).unwrap();
        assert_eq!(found, vec![PathBuf::from("src/math.js")]);

        // Same files whether the directory is given relative or absolute.
        let absolute = discover_sources(root.path(), &src, &batch).unwrap();
        assert_eq!(absolute, found);
    }

    #[test]
    fn test_discover_sources_outside_root_stay_absolute() {
        let root = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        std::fs::write(elsewhere.path().join("math.js"), DIVIDE).unwrap();

        let batch = BatchConfig {
            include: vec!["**/*".to_string()],
            exclude: Vec::new(),
        };
        let found = discover_sources(root.path(), elsewhere.path(), &batch).unwrap();
        assert_eq!(found, vec![elsewhere.path().join("math.js")]);
    }

    fn wire(
        model: ScriptedModel,
        tester: Arc<ScriptedTester>,
        storage: Arc<MemoryStorage>,
    ) -> Arc<FeedbackLoopService> {
        let generator =
            TestGenerationService::new(Arc::new(model), storage, GenerationSettings::default());
        let analyzer = MutationAnalysisService::new(tester, AnalysisSettings::default());
        Arc::new(FeedbackLoopService::new(generator, analyzer))
    }

    fn storage_with(files: &[(&str, &str)]) -> Arc<MemoryStorage> {
        let storage = MemoryStorage::default();
        for (path, content) in files {
            storage
                .files
                .lock()
                .unwrap()
                .insert(PathBuf::from(path), content.to_string());
        }
        Arc::new(storage)
    }

    fn options() -> LoopOptions {
        LoopOptions {
            settings: LoopSettings {
                target_mutation_score: 80.0,
                max_iterations: 3,
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_generate_tests_loads_source_and_runs_loop() {
        let storage = storage_with(&[("src/math.js", DIVIDE)]);
        let tester = Arc::new(ScriptedTester::new(vec![Ok(outcome(4, 0))]));
        let feedback = wire(ScriptedModel::new(DIVIDE_TESTS), tester, storage.clone());

        let outcome = GenerateTests::new(feedback, storage.clone())
            .execute(Path::new("src/math.js"), &options())
            .await
            .unwrap();

        assert!(outcome.target_reached);
        assert_eq!(storage.get("tests/math.test.js").as_deref(), Some(DIVIDE_TESTS));
    }

    #[tokio::test]
    async fn test_generate_tests_missing_source() {
        let storage = storage_with(&[]);
        let tester = Arc::new(ScriptedTester::default());
        let feedback = wire(ScriptedModel::new(DIVIDE_TESTS), tester, storage.clone());

        let err = GenerateTests::new(feedback, storage)
            .execute(Path::new("src/missing.js"), &options())
            .await
            .unwrap_err();
        assert!(err.is_collaborator());
    }

    #[tokio::test]
    async fn test_improve_tests_refines_existing_suite() {
        let storage = storage_with(&[
            ("src/math.js", DIVIDE),
            ("tests/math.test.js", DIVIDE_TESTS),
        ]);
        let tester = Arc::new(ScriptedTester::new(vec![Ok(outcome(3, 1)), Ok(outcome(4, 0))]));
        let model = ScriptedModel::new(DIVIDE_TESTS).then_improve(Ok(ZERO_TESTS.to_string()));
        let feedback = wire(model, tester, storage.clone());

        let outcome = ImproveTests::new(feedback, storage.clone())
            .execute(
                Path::new("src/math.js"),
                Path::new("tests/math.test.js"),
                &options(),
            )
            .await
            .unwrap();

        assert!(outcome.target_reached);
        assert_eq!(outcome.total_iterations, 2);
        assert_eq!(outcome.test_file.version(), 2);
        // Initial generation is skipped for an existing suite.
        assert_eq!(*storage.saves.lock().unwrap(), 1);
        assert!(storage
            .get("tests/math.test.js")
            .unwrap()
            .contains("throws on zero"));
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let storage = storage_with(&[
            ("src/math.js", DIVIDE),
            ("notes.txt", "not code"),
        ]);
        let tester = Arc::new(ScriptedTester::new(vec![Ok(outcome(4, 0))]));
        let feedback = wire(ScriptedModel::new(DIVIDE_TESTS), tester, storage.clone());
        let batch = BatchProcess::new(feedback, storage, 2);

        let paths = vec![
            PathBuf::from("src/math.js"),
            PathBuf::from("notes.txt"),
            PathBuf::from("src/gone.js"),
        ];
        let report = batch.execute(&paths, &options()).await.unwrap();

        let summary = report.session.summary();
        assert_eq!(summary.status, SessionStatus::Completed);
        assert_eq!(summary.files, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.targets_reached, 1);
        assert_eq!(summary.errors, 2);

        let records = report.session.results();
        assert!(records[0].success);
        assert_eq!(records[0].test_path.as_deref(), Some(Path::new("tests/math.test.js")));
        assert!(records[1].error.as_ref().unwrap().contains("unsupported"));
        assert!(records[2].test_path.is_none());

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.performance.as_ref().unwrap().runs, 1);
        assert!(!report.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_batch_records_partial_artifact() {
        let storage = storage_with(&[
            ("src/math.js", DIVIDE),
            ("tests/math.test.js", DIVIDE_TESTS),
        ]);
        let tester = Arc::new(ScriptedTester::default());
        let feedback = wire(ScriptedModel::new("garbage"), tester, storage.clone());

        let report = BatchProcess::new(feedback, storage, 3)
            .execute(&[PathBuf::from("src/math.js")], &options())
            .await
            .unwrap();

        let record = &report.session.results()[0];
        assert!(!record.success);
        assert_eq!(record.test_path.as_deref(), Some(Path::new("tests/math.test.js")));
        assert!(report.performance.is_none());
        assert!(report.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_batch_rejects_invalid_settings() {
        let storage = storage_with(&[("src/math.js", DIVIDE)]);
        let tester = Arc::new(ScriptedTester::default());
        let feedback = wire(ScriptedModel::new(DIVIDE_TESTS), tester.clone(), storage.clone());
        let mut bad = options();
        bad.settings.max_iterations = 0;

        let err = BatchProcess::new(feedback, storage, 3)
            .execute(&[PathBuf::from("src/math.js")], &bad)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(tester.call_count(), 0);
    }
}
