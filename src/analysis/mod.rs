//! Mutation analysis: runs the mutation tester and turns its outcome into
//! diagnostics the generator and the user can act on.

use crate::collaborators::{MutantRecord, MutationRunOptions, MutationTester};
use crate::entities::{MutationResult, Position, SourceFile, TestFile};
use crate::error::{Collaborator, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Below this score every recommendation list starts with a call for more tests.
const LOW_SCORE_THRESHOLD: f64 = 50.0;
/// More survivors than this suggests missing edge cases.
const MANY_SURVIVORS: usize = 10;
/// Score gain that counts as a significant improvement between two runs.
pub const SIGNIFICANT_IMPROVEMENT: f64 = 5.0;

/// Ordered most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Critical => write!(f, "critical"),
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub category: String,
    pub message: String,
}

impl Recommendation {
    pub fn new(priority: Priority, category: &str, message: impl Into<String>) -> Self {
        Self {
            priority,
            category: category.to_string(),
            message: message.into(),
        }
    }
}

/// A mutator label whose mutants the suite tends to miss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblematicMutator {
    pub mutator_name: String,
    pub total: usize,
    pub survived: usize,
    /// `survived / total`, in `[0, 1]`.
    pub survival_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapSeverity {
    High,
    Medium,
}

/// Surviving mutants that share a start position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub position: Position,
    pub mutants: Vec<MutantRecord>,
    pub severity: GapSeverity,
}

/// A completed result plus everything derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationAnalysis {
    pub result: MutationResult,
    pub problematic_mutators: Vec<ProblematicMutator>,
    pub coverage_gaps: Vec<CoverageGap>,
    pub recommendations: Vec<Recommendation>,
    /// Report written by the mutation tester, if one was requested and produced.
    pub report_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub score_progression: Vec<f64>,
    pub best_score: f64,
    pub worst_score: f64,
    pub average_score: f64,
    /// Last score minus first score.
    pub net_improvement: f64,
    /// Mutators in the top problematic set of at least half the results.
    pub persistent_mutators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultComparison {
    pub score_delta: f64,
    pub newly_killed: i64,
    /// Negative when fewer mutants survive than before.
    pub newly_survived: i64,
    pub significant_improvement: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// How many problematic mutators to keep.
    pub top_mutators: usize,
    /// Ask the mutation tester to write its own report after each run.
    pub write_report: bool,
    /// Passed on to the mutation tester with every run.
    pub timeout_seconds: u64,
}

impl AnalysisSettings {
    pub fn run_options(&self, iteration: u32) -> MutationRunOptions {
        MutationRunOptions {
            iteration,
            timeout_seconds: self.timeout_seconds,
        }
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            top_mutators: 5,
            write_report: false,
            timeout_seconds: 300,
        }
    }
}

/// Group every mutant by mutator label and rank labels by survival rate.
///
/// Labels without survivors are dropped. Equal rates keep first-seen order.
pub fn problematic_mutators(result: &MutationResult, top_n: usize) -> Vec<ProblematicMutator> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();

    for mutant in result.all_mutants() {
        let name = mutant.mutator_name.as_str();
        let entry = counts.entry(name).or_insert_with(|| {
            order.push(name);
            (0, 0)
        });
        entry.0 += 1;
        if mutant.status == crate::entities::MutantStatus::Survived {
            entry.1 += 1;
        }
    }

    let mut mutators: Vec<ProblematicMutator> = order
        .into_iter()
        .filter_map(|name| {
            let (total, survived) = counts[name];
            (survived > 0).then(|| ProblematicMutator {
                mutator_name: name.to_string(),
                total,
                survived,
                survival_rate: survived as f64 / total as f64,
            })
        })
        .collect();

    // sort_by is stable
    mutators.sort_by(|a, b| b.survival_rate.total_cmp(&a.survival_rate));
    mutators.truncate(top_n);
    mutators
}

/// Group surviving mutants by start position, largest groups first.
pub fn coverage_gaps(result: &MutationResult) -> Vec<CoverageGap> {
    let mut gaps: Vec<CoverageGap> = Vec::new();
    let mut index: HashMap<Position, usize> = HashMap::new();

    for mutant in result.survived() {
        let position = mutant.location.start;
        match index.get(&position) {
            Some(&i) => gaps[i].mutants.push(mutant.clone()),
            None => {
                index.insert(position, gaps.len());
                gaps.push(CoverageGap {
                    position,
                    mutants: vec![mutant.clone()],
                    severity: GapSeverity::Medium,
                });
            }
        }
    }

    for gap in &mut gaps {
        if gap.mutants.len() > 1 {
            gap.severity = GapSeverity::High;
        }
    }
    gaps.sort_by(|a, b| b.mutants.len().cmp(&a.mutants.len()));
    gaps
}

/// Rule-based advice for a completed result, most urgent first.
pub fn recommendations(
    result: &MutationResult,
    problematic: &[ProblematicMutator],
) -> Vec<Recommendation> {
    let score = result.mutation_score().unwrap_or(0.0);
    let mut recs = Vec::new();

    if score < LOW_SCORE_THRESHOLD {
        recs.push(Recommendation::new(
            Priority::Critical,
            "coverage",
            format!(
                "Mutation score is {score:.1}%; add comprehensive test cases for the main code paths"
            ),
        ));
    }

    let survived = result.survived().len();
    if survived > MANY_SURVIVORS {
        recs.push(Recommendation::new(
            Priority::High,
            "edge_cases",
            format!("{survived} mutants survived; focus on edge cases and boundary values"),
        ));
    }

    let uncovered = result.no_coverage().len();
    if uncovered > 0 {
        recs.push(Recommendation::new(
            Priority::High,
            "no_coverage",
            format!("{uncovered} mutants are not reached by any test; improve code coverage"),
        ));
    }

    if let Some(top) = problematic.first() {
        recs.push(Recommendation::new(
            Priority::Medium,
            "mutator",
            format!(
                "{} mutations survive most often ({} of {}); add tests targeting them",
                top.mutator_name, top.survived, top.total
            ),
        ));
    }

    recs.sort_by_key(|r| r.priority);
    recs
}

/// Score history over an ordered list of results for one file.
///
/// Pending results are ignored; `None` when nothing is completed.
pub fn analyze_trends(results: &[MutationResult], top_n: usize) -> Option<TrendAnalysis> {
    let completed: Vec<&MutationResult> = results.iter().filter(|r| r.is_completed()).collect();
    if completed.is_empty() {
        return None;
    }

    let scores: Vec<f64> = completed
        .iter()
        .filter_map(|r| r.mutation_score())
        .collect();
    let best_score = scores.iter().copied().fold(f64::MIN, f64::max);
    let worst_score = scores.iter().copied().fold(f64::MAX, f64::min);
    let average_score = scores.iter().sum::<f64>() / scores.len() as f64;
    let net_improvement = scores[scores.len() - 1] - scores[0];

    let mut order: Vec<String> = Vec::new();
    let mut appearances: HashMap<String, usize> = HashMap::new();
    for result in &completed {
        for mutator in problematic_mutators(result, top_n) {
            let count = appearances.entry(mutator.mutator_name.clone()).or_insert(0);
            if *count == 0 {
                order.push(mutator.mutator_name);
            }
            *count += 1;
        }
    }
    let persistent_mutators = order
        .into_iter()
        .filter(|name| appearances[name] * 2 >= completed.len())
        .collect();

    Some(TrendAnalysis {
        score_progression: scores,
        best_score,
        worst_score,
        average_score,
        net_improvement,
        persistent_mutators,
    })
}

pub fn compare_results(current: &MutationResult, previous: &MutationResult) -> ResultComparison {
    let score_delta =
        current.mutation_score().unwrap_or(0.0) - previous.mutation_score().unwrap_or(0.0);
    ResultComparison {
        score_delta,
        newly_killed: current.killed().len() as i64 - previous.killed().len() as i64,
        newly_survived: current.survived().len() as i64 - previous.survived().len() as i64,
        significant_improvement: score_delta >= SIGNIFICANT_IMPROVEMENT,
    }
}

/// Runs mutation testing for a source/test pair and derives diagnostics.
pub struct MutationAnalysisService {
    tester: Arc<dyn MutationTester>,
    settings: AnalysisSettings,
}

impl MutationAnalysisService {
    pub fn new(tester: Arc<dyn MutationTester>, settings: AnalysisSettings) -> Self {
        Self { tester, settings }
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub async fn run_mutation_analysis(
        &self,
        source: &SourceFile,
        test_file: &TestFile,
        options: &MutationRunOptions,
    ) -> Result<MutationAnalysis> {
        let file_name = source.file_name();
        tracing::info!(
            "Running mutation analysis for {} against {}",
            file_name,
            test_file.path().display()
        );

        let started = Instant::now();
        let outcome = self
            .tester
            .run_mutation_tests(source.path(), test_file.path(), options)
            .await
            .map_err(|e| {
                tracing::error!("Mutation testing failed for {}: {:#}", file_name, e);
                Error::collaborator(
                    Collaborator::MutationTesting,
                    format!(
                        "running mutation tests for {file_name} (iteration {})",
                        options.iteration
                    ),
                    e,
                )
            })?;

        let mut result = MutationResult::new(source.path(), test_file.path());
        result.set_results(outcome, started.elapsed())?;

        let problematic = problematic_mutators(&result, self.settings.top_mutators);
        let gaps = coverage_gaps(&result);
        let recs = recommendations(&result, &problematic);

        let report_path = if self.settings.write_report {
            match self.tester.write_report(&result).await {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("Could not write mutation report for {}: {:#}", file_name, e);
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            "Mutation score for {}: {:.1}% ({} killed, {} survived, {} without coverage)",
            file_name,
            result.mutation_score().unwrap_or(0.0),
            result.killed().len(),
            result.survived().len(),
            result.no_coverage().len()
        );

        Ok(MutationAnalysis {
            result,
            problematic_mutators: problematic,
            coverage_gaps: gaps,
            recommendations: recs,
            report_path,
        })
    }

    pub fn analyze_trends(&self, results: &[MutationResult]) -> Option<TrendAnalysis> {
        analyze_trends(results, self.settings.top_mutators)
    }

    pub fn compare_results(
        &self,
        current: &MutationResult,
        previous: &MutationResult,
    ) -> ResultComparison {
        compare_results(current, previous)
    }

    pub async fn is_healthy(&self) -> bool {
        self.tester.is_healthy().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::collaborators::MutationRunOutcome;
    use crate::entities::MutantStatus;
    use crate::language::Language;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mutation tester that replays scripted outcomes.
    #[derive(Default)]
    pub(crate) struct ScriptedTester {
        pub outcomes: Mutex<VecDeque<anyhow::Result<MutationRunOutcome>>>,
        pub calls: Mutex<Vec<MutationRunOptions>>,
        pub reports: Mutex<usize>,
    }

    impl ScriptedTester {
        pub(crate) fn new(outcomes: Vec<anyhow::Result<MutationRunOutcome>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                ..Default::default()
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MutationTester for ScriptedTester {
        async fn run_mutation_tests(
            &self,
            _source_path: &Path,
            _test_path: &Path,
            options: &MutationRunOptions,
        ) -> anyhow::Result<MutationRunOutcome> {
            self.calls.lock().unwrap().push(options.clone());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted outcome")))
        }

        async fn write_report(&self, result: &MutationResult) -> anyhow::Result<Option<PathBuf>> {
            *self.reports.lock().unwrap() += 1;
            Ok(Some(PathBuf::from(format!("reports/{}.json", result.id()))))
        }
    }

    pub(crate) fn mutant(name: &str, line: usize, column: usize, status: MutantStatus) -> MutantRecord {
        MutantRecord::new(name, line, column, "x", status)
    }

    /// An outcome with `killed` killed and `survived` survived mutants.
    pub(crate) fn outcome(killed: usize, survived: usize) -> MutationRunOutcome {
        let mutants = (0..killed)
            .map(|i| mutant("ArithmeticOperator", i + 1, 1, MutantStatus::Killed))
            .chain((0..survived).map(|i| mutant("EqualityOperator", 100 + i, 3, MutantStatus::Survived)));
        MutationRunOutcome::from_mutants(mutants)
    }

    fn completed(outcome: MutationRunOutcome) -> MutationResult {
        let mut result = MutationResult::new("src/math.js", "tests/math.test.js");
        result.set_results(outcome, Duration::from_millis(10)).unwrap();
        result
    }

    fn files() -> (SourceFile, TestFile) {
        let source = SourceFile::new("src/math.js", "export function f() {}").unwrap();
        let test = TestFile::new(
            "tests/math.test.js",
            "describe('f', () => { test('f', () => { expect(f()).toBe(undefined); }); });",
            "src/math.js",
            Language::JavaScript,
        );
        (source, test)
    }

    #[test]
    fn test_problematic_mutators_ranked_by_survival_rate() {
        let result = completed(MutationRunOutcome::from_mutants(vec![
            mutant("ArithmeticOperator", 1, 1, MutantStatus::Survived),
            mutant("ArithmeticOperator", 2, 1, MutantStatus::Killed),
            mutant("BooleanLiteral", 3, 1, MutantStatus::Killed),
            mutant("EqualityOperator", 4, 1, MutantStatus::Survived),
            mutant("ConditionalExpression", 5, 1, MutantStatus::Survived),
            mutant("ConditionalExpression", 6, 1, MutantStatus::Survived),
        ]));

        let ranked = problematic_mutators(&result, 5);
        let names: Vec<&str> = ranked.iter().map(|m| m.mutator_name.as_str()).collect();
        // EqualityOperator and ConditionalExpression tie at 1.0; first seen wins.
        assert_eq!(names, vec!["EqualityOperator", "ConditionalExpression", "ArithmeticOperator"]);
        assert_eq!(ranked[2].survival_rate, 0.5);
        assert_eq!(ranked[1].total, 2);

        assert_eq!(problematic_mutators(&result, 1).len(), 1);
    }

    #[test]
    fn test_coverage_gaps_grouped_by_start_position() {
        let result = completed(MutationRunOutcome::from_mutants(vec![
            mutant("A", 2, 7, MutantStatus::Survived),
            mutant("B", 9, 1, MutantStatus::Survived),
            mutant("C", 9, 1, MutantStatus::Survived),
            mutant("D", 9, 1, MutantStatus::Killed),
        ]));

        let gaps = coverage_gaps(&result);
        assert_eq!(gaps.len(), 2);
        assert_eq!(gaps[0].position, Position { line: 9, column: 1 });
        assert_eq!(gaps[0].mutants.len(), 2);
        assert_eq!(gaps[0].severity, GapSeverity::High);
        assert_eq!(gaps[1].severity, GapSeverity::Medium);
    }

    #[test]
    fn test_recommendations_accumulate_in_priority_order() {
        let mut mutants: Vec<MutantRecord> = (0..12)
            .map(|i| mutant("EqualityOperator", i + 1, 1, MutantStatus::Survived))
            .collect();
        mutants.push(mutant("BlockStatement", 40, 1, MutantStatus::NoCoverage));
        let result = completed(MutationRunOutcome::from_mutants(mutants));
        let problematic = problematic_mutators(&result, 5);

        let recs = recommendations(&result, &problematic);
        let priorities: Vec<Priority> = recs.iter().map(|r| r.priority).collect();
        assert_eq!(
            priorities,
            vec![Priority::Critical, Priority::High, Priority::High, Priority::Medium]
        );
        assert_eq!(recs[1].category, "edge_cases");
        assert_eq!(recs[2].category, "no_coverage");
        assert!(recs[3].message.contains("EqualityOperator"));
    }

    #[test]
    fn test_recommendations_empty_for_clean_result() {
        let result = completed(outcome(10, 0));
        assert!(recommendations(&result, &problematic_mutators(&result, 5)).is_empty());
    }

    #[test]
    fn test_analyze_trends() {
        let results = vec![
            completed(outcome(6, 4)),
            completed(outcome(8, 2)),
            completed(outcome(7, 3)),
            MutationResult::new("src/math.js", "tests/math.test.js"),
        ];

        let trends = analyze_trends(&results, 5).unwrap();
        assert_eq!(trends.score_progression, vec![60.0, 80.0, 70.0]);
        assert_eq!(trends.best_score, 80.0);
        assert_eq!(trends.worst_score, 60.0);
        assert!((trends.average_score - 70.0).abs() < 1e-9);
        assert!((trends.net_improvement - 10.0).abs() < 1e-9);
        assert_eq!(trends.persistent_mutators, vec!["EqualityOperator"]);

        assert!(analyze_trends(&[], 5).is_none());
    }

    #[test]
    fn test_compare_results() {
        let previous = completed(outcome(6, 4));
        let current = completed(outcome(9, 1));
        let comparison = compare_results(&current, &previous);
        assert!((comparison.score_delta - 30.0).abs() < 1e-9);
        assert_eq!(comparison.newly_killed, 3);
        assert_eq!(comparison.newly_survived, -3);
        assert!(comparison.significant_improvement);

        let flat = compare_results(&previous, &previous);
        assert!(!flat.significant_improvement);
    }

    #[tokio::test]
    async fn test_run_mutation_analysis_wraps_outcome() {
        let tester = Arc::new(ScriptedTester::new(vec![Ok(outcome(3, 1))]));
        let service = MutationAnalysisService::new(tester.clone(), AnalysisSettings::default());
        let (source, test) = files();

        let analysis = service
            .run_mutation_analysis(&source, &test, &MutationRunOptions::default())
            .await
            .unwrap();

        assert!(analysis.result.is_completed());
        assert_eq!(analysis.result.mutation_score(), Some(75.0));
        assert_eq!(analysis.result.total_mutants(), 4);
        assert_eq!(analysis.problematic_mutators.len(), 1);
        assert_eq!(analysis.coverage_gaps.len(), 1);
        assert_eq!(analysis.recommendations.len(), 1);
        assert!(analysis.report_path.is_none());
        assert_eq!(*tester.reports.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_mutation_analysis_writes_report_when_asked() {
        let tester = Arc::new(ScriptedTester::new(vec![Ok(outcome(1, 0))]));
        let settings = AnalysisSettings {
            write_report: true,
            ..Default::default()
        };
        let service = MutationAnalysisService::new(tester.clone(), settings);
        let (source, test) = files();

        let analysis = service
            .run_mutation_analysis(&source, &test, &MutationRunOptions::default())
            .await
            .unwrap();
        assert!(analysis.report_path.is_some());
        assert_eq!(*tester.reports.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_run_mutation_analysis_propagates_failure() {
        let tester = Arc::new(ScriptedTester::new(vec![Err(anyhow::anyhow!("stryker crashed"))]));
        let service = MutationAnalysisService::new(tester, AnalysisSettings::default());
        let (source, test) = files();

        let err = service
            .run_mutation_analysis(
                &source,
                &test,
                &MutationRunOptions {
                    iteration: 2,
                    timeout_seconds: 60,
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_collaborator());
        assert!(err.to_string().contains("iteration 2"));
    }
}
