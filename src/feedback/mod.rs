//! The refinement loop: measure, improve, repeat until the suite is good
//! enough or the iteration budget runs out.

use crate::analysis::{MutationAnalysis, MutationAnalysisService, Priority, Recommendation};
use crate::config::MAX_ITERATIONS_LIMIT;
use crate::entities::{MutationResult, SourceFile, TestFile};
use crate::error::{Error, Result};
use crate::generation::{GenerateOptions, ImproveOptions, ImprovementSummary, TestGenerationService};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Success rate below which the loop is considered unreliable.
const RELIABLE_SUCCESS_RATE: f64 = 0.8;
const EFFICIENT_AVERAGE_ITERATIONS: f64 = 4.0;
const ACCEPTABLE_AVERAGE_SCORE: f64 = 60.0;

/// Stopping bounds for one loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopSettings {
    pub target_mutation_score: f64,
    pub max_iterations: u32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            target_mutation_score: 80.0,
            max_iterations: 5,
        }
    }
}

impl LoopSettings {
    pub fn validate(&self) -> Result<()> {
        let target = self.target_mutation_score;
        if target.is_nan() || !(0.0..=100.0).contains(&target) {
            return Err(Error::Configuration(format!(
                "target mutation score must be within 0-100, got {target}"
            )));
        }
        if self.max_iterations == 0 || self.max_iterations > MAX_ITERATIONS_LIMIT {
            return Err(Error::Configuration(format!(
                "max iterations must be within 1-{MAX_ITERATIONS_LIMIT}, got {}",
                self.max_iterations
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoopOptions {
    pub settings: LoopSettings,
    /// Used for the initial generation in [`FeedbackLoopService::run`].
    pub generate: GenerateOptions,
    /// Append improvements instead of splicing them.
    pub force_append: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetReached,
    /// The score is below target but nothing is left to target.
    NoActionableMutants,
    IterationBudgetExhausted,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::TargetReached => write!(f, "target reached"),
            StopReason::NoActionableMutants => write!(f, "no actionable mutants"),
            StopReason::IterationBudgetExhausted => write!(f, "iteration budget exhausted"),
        }
    }
}

/// Telemetry for one pass through the loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    /// Absent when the analysis failed.
    pub result: Option<MutationResult>,
    pub improvement: Option<ImprovementSummary>,
    /// Analysis or improvement failure tolerated in this iteration.
    pub error: Option<String>,
    pub duration: Duration,
}

impl IterationRecord {
    fn new(iteration: u32) -> Self {
        Self {
            iteration,
            result: None,
            improvement: None,
            error: None,
            duration: Duration::ZERO,
        }
    }

    pub fn mutation_score(&self) -> Option<f64> {
        self.result.as_ref().and_then(|r| r.mutation_score())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Efficiency {
    /// Score points gained per iteration run.
    pub points_per_iteration: f64,
    /// Wall-clock seconds per point gained; `None` without a gain.
    pub seconds_per_point: Option<f64>,
}

/// Derived from the recorded iterations; nothing is re-measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnalysis {
    pub score_progression: Vec<f64>,
    pub average_improvement: f64,
    pub diminishing_returns: bool,
    pub efficiency: Efficiency,
    /// Only filled when the target was missed.
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopOutcome {
    pub source_path: PathBuf,
    /// Best-effort final suite.
    pub test_file: TestFile,
    pub target_reached: bool,
    pub stop_reason: StopReason,
    pub total_iterations: u32,
    pub iterations: Vec<IterationRecord>,
    pub final_score: Option<f64>,
    pub total_duration: Duration,
    pub analysis: FinalAnalysis,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceBuckets {
    /// Target reached within two iterations.
    pub fast: usize,
    pub moderate: usize,
    /// Target reached after four or more iterations.
    pub slow: usize,
    pub non_convergent: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAnalysis {
    pub runs: usize,
    /// Fraction of runs that reached their target, in `[0, 1]`.
    pub success_rate: f64,
    pub average_iterations: f64,
    pub average_final_score: f64,
    pub convergence: ConvergenceBuckets,
}

/// True when most consecutive score gains are smaller than the one before.
pub fn has_diminishing_returns(scores: &[f64]) -> bool {
    if scores.len() < 3 {
        return false;
    }
    let deltas: Vec<f64> = scores.windows(2).map(|w| w[1] - w[0]).collect();
    let pairs = deltas.len() - 1;
    let decreasing = deltas.windows(2).filter(|d| d[1] < d[0]).count();
    decreasing * 2 > pairs
}

fn final_analysis(
    iterations: &[IterationRecord],
    total_duration: Duration,
    target_reached: bool,
    last_analysis: Option<&MutationAnalysis>,
) -> FinalAnalysis {
    let scores: Vec<f64> = iterations.iter().filter_map(|i| i.mutation_score()).collect();

    let gain = match (scores.first(), scores.last()) {
        (Some(first), Some(last)) => last - first,
        _ => 0.0,
    };
    let average_improvement = if scores.len() > 1 {
        gain / (scores.len() - 1) as f64
    } else {
        0.0
    };
    let points_per_iteration = if iterations.is_empty() {
        0.0
    } else {
        gain / iterations.len() as f64
    };
    let seconds_per_point = (gain > 0.0).then(|| total_duration.as_secs_f64() / gain);

    let recommendations = match (target_reached, last_analysis) {
        (false, Some(analysis)) => analysis.recommendations.clone(),
        _ => Vec::new(),
    };

    FinalAnalysis {
        diminishing_returns: has_diminishing_returns(&scores),
        score_progression: scores,
        average_improvement,
        efficiency: Efficiency {
            points_per_iteration,
            seconds_per_point,
        },
        recommendations,
    }
}

/// Aggregate statistics over many finished loops. `None` for an empty slice.
pub fn analyze_performance(outcomes: &[LoopOutcome]) -> Option<PerformanceAnalysis> {
    if outcomes.is_empty() {
        return None;
    }
    let runs = outcomes.len();

    let mut convergence = ConvergenceBuckets::default();
    for outcome in outcomes {
        match (outcome.target_reached, outcome.total_iterations) {
            (true, 0..=2) => convergence.fast += 1,
            (true, 3) => convergence.moderate += 1,
            (true, _) => convergence.slow += 1,
            (false, _) => convergence.non_convergent += 1,
        }
    }

    let reached = outcomes.iter().filter(|o| o.target_reached).count();
    let total_iterations: u32 = outcomes.iter().map(|o| o.total_iterations).sum();
    let scores: Vec<f64> = outcomes.iter().filter_map(|o| o.final_score).collect();
    let average_final_score = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };

    Some(PerformanceAnalysis {
        runs,
        success_rate: reached as f64 / runs as f64,
        average_iterations: f64::from(total_iterations) / runs as f64,
        average_final_score,
        convergence,
    })
}

/// Tuning advice for the loop settings, most urgent first.
pub fn optimization_suggestions(performance: &PerformanceAnalysis) -> Vec<Recommendation> {
    let mut suggestions = Vec::new();

    if performance.success_rate < RELIABLE_SUCCESS_RATE {
        suggestions.push(Recommendation::new(
            Priority::High,
            "reliability",
            format!(
                "Only {:.0}% of runs reached the target; raise max_iterations or check the language model output",
                performance.success_rate * 100.0
            ),
        ));
    }
    if performance.convergence.non_convergent * 2 > performance.runs {
        suggestions.push(Recommendation::new(
            Priority::High,
            "target",
            "Most runs never converge; consider lowering target_mutation_score",
        ));
    }
    if performance.average_iterations > EFFICIENT_AVERAGE_ITERATIONS {
        suggestions.push(Recommendation::new(
            Priority::Medium,
            "efficiency",
            format!(
                "Runs take {:.1} iterations on average; richer initial generation context may help",
                performance.average_iterations
            ),
        ));
    }
    if performance.average_final_score < ACCEPTABLE_AVERAGE_SCORE {
        suggestions.push(Recommendation::new(
            Priority::Medium,
            "quality",
            format!(
                "Average final score is {:.1}%; review the generated tests manually",
                performance.average_final_score
            ),
        ));
    }
    if suggestions.is_empty() {
        suggestions.push(Recommendation::new(
            Priority::Low,
            "tuning",
            "Loop settings look well tuned",
        ));
    }

    suggestions.sort_by_key(|s| s.priority);
    suggestions
}

/// Alternates mutation analysis and test improvement for one source file.
pub struct FeedbackLoopService {
    generator: TestGenerationService,
    analyzer: MutationAnalysisService,
}

impl FeedbackLoopService {
    pub fn new(generator: TestGenerationService, analyzer: MutationAnalysisService) -> Self {
        Self {
            generator,
            analyzer,
        }
    }

    pub fn generator(&self) -> &TestGenerationService {
        &self.generator
    }

    pub fn analyzer(&self) -> &MutationAnalysisService {
        &self.analyzer
    }

    /// Generate a first suite for `source`, then refine it.
    ///
    /// Invalid settings are rejected before any collaborator is called, and a
    /// failed initial generation fails the whole run.
    pub async fn run(&self, source: &SourceFile, options: &LoopOptions) -> Result<LoopOutcome> {
        options.settings.validate()?;
        let test_file = self
            .generator
            .generate_initial_tests(source, &options.generate)
            .await?;
        self.refine(source, test_file, options).await
    }

    /// Refine an existing suite until a stop condition holds.
    ///
    /// Performs at most `max_iterations` analyses. Failures inside an
    /// iteration are recorded on it and the loop carries on.
    pub async fn refine(
        &self,
        source: &SourceFile,
        mut test_file: TestFile,
        options: &LoopOptions,
    ) -> Result<LoopOutcome> {
        options.settings.validate()?;
        let LoopSettings {
            target_mutation_score: target,
            max_iterations,
        } = options.settings;
        let file_name = source.file_name();
        let started = Instant::now();

        let mut iterations: Vec<IterationRecord> = Vec::new();
        let mut last_analysis: Option<MutationAnalysis> = None;
        let mut stop_reason = StopReason::IterationBudgetExhausted;

        for k in 1..=max_iterations {
            let iteration_started = Instant::now();
            let mut record = IterationRecord::new(k);

            let analysis = match self
                .analyzer
                .run_mutation_analysis(source, &test_file, &self.analyzer.settings().run_options(k))
                .await
            {
                Ok(analysis) => analysis,
                Err(e) => {
                    tracing::warn!("Iteration {} analysis failed for {}: {}", k, file_name, e);
                    record.error = Some(e.to_string());
                    record.duration = iteration_started.elapsed();
                    iterations.push(record);
                    continue;
                }
            };

            let score = analysis.result.mutation_score().unwrap_or(0.0);
            tracing::info!(
                "Iteration {}/{} for {}: {:.1}% (target {:.1}%)",
                k,
                max_iterations,
                file_name,
                score,
                target
            );
            record.result = Some(analysis.result.clone());

            if analysis.result.has_reached_target(target) {
                stop_reason = StopReason::TargetReached;
            } else {
                let actionable = analysis.result.actionable_mutants();
                if actionable.is_empty() {
                    stop_reason = StopReason::NoActionableMutants;
                } else {
                    let improve = ImproveOptions {
                        iteration: k,
                        force_append: options.force_append,
                    };
                    match self
                        .generator
                        .improve_tests(source, &mut test_file, &actionable, &improve)
                        .await
                    {
                        Ok(summary) => record.improvement = Some(summary),
                        Err(e) => {
                            tracing::warn!(
                                "Iteration {} improvement failed for {}: {}",
                                k,
                                file_name,
                                e
                            );
                            record.error = Some(e.to_string());
                        }
                    }
                }
            }

            record.duration = iteration_started.elapsed();
            iterations.push(record);
            last_analysis = Some(analysis);

            if stop_reason != StopReason::IterationBudgetExhausted {
                break;
            }
        }

        let total_duration = started.elapsed();
        let target_reached = stop_reason == StopReason::TargetReached;
        let final_score = iterations.iter().rev().find_map(|i| i.mutation_score());
        let analysis = final_analysis(
            &iterations,
            total_duration,
            target_reached,
            last_analysis.as_ref(),
        );

        tracing::info!(
            "Finished {} after {} iterations: {} (final score {})",
            file_name,
            iterations.len(),
            stop_reason,
            final_score
                .map(|s| format!("{s:.1}%"))
                .unwrap_or_else(|| "n/a".to_string())
        );

        Ok(LoopOutcome {
            source_path: source.path().to_path_buf(),
            test_file,
            target_reached,
            stop_reason,
            total_iterations: iterations.len() as u32,
            iterations,
            final_score,
            total_duration,
            analysis,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analysis::tests::{mutant, outcome, ScriptedTester};
    use crate::analysis::AnalysisSettings;
    use crate::collaborators::MutationRunOutcome;
    use crate::entities::MutantStatus;
    use crate::generation::tests::{MemoryStorage, ScriptedModel, DIVIDE, DIVIDE_TESTS, ZERO_TESTS};
    use crate::generation::GenerationSettings;
    use std::sync::Arc;

    pub(crate) fn service(
        model: ScriptedModel,
        tester: Arc<ScriptedTester>,
    ) -> (FeedbackLoopService, Arc<ScriptedModel>, Arc<MemoryStorage>) {
        let model = Arc::new(model);
        let storage = Arc::new(MemoryStorage::default());
        let generator =
            TestGenerationService::new(model.clone(), storage.clone(), GenerationSettings::default());
        let analyzer = MutationAnalysisService::new(tester, AnalysisSettings::default());
        (FeedbackLoopService::new(generator, analyzer), model, storage)
    }

    fn options(target: f64, max_iterations: u32) -> LoopOptions {
        LoopOptions {
            settings: LoopSettings {
                target_mutation_score: target,
                max_iterations,
            },
            ..Default::default()
        }
    }

    fn divide_source() -> SourceFile {
        SourceFile::new("src/math.js", DIVIDE).unwrap()
    }

    #[test]
    fn test_loop_settings_validate() {
        assert!(LoopSettings::default().validate().is_ok());
        for (target, max) in [(-1.0, 5), (100.1, 5), (f64::NAN, 5), (80.0, 0), (80.0, 51)] {
            let settings = LoopSettings {
                target_mutation_score: target,
                max_iterations: max,
            };
            assert!(
                matches!(settings.validate(), Err(Error::Configuration(_))),
                "{target} / {max}"
            );
        }
        let edge = LoopSettings {
            target_mutation_score: 100.0,
            max_iterations: MAX_ITERATIONS_LIMIT,
        };
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn test_has_diminishing_returns() {
        assert!(!has_diminishing_returns(&[10.0, 50.0]));
        assert!(has_diminishing_returns(&[40.0, 60.0, 70.0, 75.0]));
        assert!(!has_diminishing_returns(&[40.0, 45.0, 55.0, 70.0]));
        // One decreasing pair of two is not a majority.
        assert!(!has_diminishing_returns(&[40.0, 60.0, 65.0, 80.0]));
    }

    #[tokio::test]
    async fn test_divide_scenario_reaches_target_on_second_iteration() {
        let first = MutationRunOutcome::from_mutants(vec![
            mutant("ArithmeticOperator", 5, 10, MutantStatus::Killed),
            mutant("StringLiteral", 3, 20, MutantStatus::Killed),
            mutant("BlockStatement", 2, 16, MutantStatus::Killed),
            mutant("EqualityOperator", 2, 7, MutantStatus::Survived),
            mutant("ConditionalExpression", 2, 7, MutantStatus::NoCoverage),
        ]);
        assert_eq!(first.mutation_score, 60.0);
        let tester = Arc::new(ScriptedTester::new(vec![Ok(first), Ok(outcome(5, 0))]));
        let model = ScriptedModel::new(DIVIDE_TESTS).then_improve(Ok(ZERO_TESTS.to_string()));
        let (service, model, _) = service(model, tester.clone());

        let result = service
            .run(&divide_source(), &options(80.0, 5))
            .await
            .unwrap();

        assert!(result.target_reached);
        assert_eq!(result.stop_reason, StopReason::TargetReached);
        assert_eq!(result.total_iterations, 2);
        assert_eq!(tester.call_count(), 2);
        assert_eq!(result.final_score, Some(100.0));
        assert_eq!(result.test_file.version(), 2);
        assert_eq!(result.test_file.test_names(), vec!["divides", "throws on zero"]);

        let targeted = model.improve_calls.lock().unwrap();
        assert_eq!(targeted.len(), 1);
        assert_eq!(targeted[0][0].mutator_name, "EqualityOperator");
        assert_eq!(targeted[0].len(), 2);

        let first = &result.iterations[0];
        assert_eq!(first.mutation_score(), Some(60.0));
        assert_eq!(first.improvement.as_ref().unwrap().version, 2);
        assert!(result.iterations[1].improvement.is_none());

        assert_eq!(result.analysis.score_progression, vec![60.0, 100.0]);
        assert_eq!(result.analysis.average_improvement, 40.0);
        assert_eq!(result.analysis.efficiency.points_per_iteration, 20.0);
        assert!(result.analysis.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_target_exhausts_budget_with_recommendations() {
        let tester = Arc::new(ScriptedTester::new(vec![
            Ok(outcome(7, 3)),
            Ok(outcome(7, 3)),
            Ok(outcome(7, 3)),
        ]));
        let model = ScriptedModel::new(DIVIDE_TESTS)
            .then_improve(Ok(ZERO_TESTS.to_string()))
            .then_improve(Ok(ZERO_TESTS.to_string()))
            .then_improve(Ok(ZERO_TESTS.to_string()));
        let (service, _, _) = service(model, tester.clone());

        let result = service
            .run(&divide_source(), &options(95.0, 3))
            .await
            .unwrap();

        assert!(!result.target_reached);
        assert_eq!(result.stop_reason, StopReason::IterationBudgetExhausted);
        assert_eq!(result.total_iterations, 3);
        assert_eq!(tester.call_count(), 3);
        assert_eq!(result.test_file.version(), 4);
        assert!(!result.analysis.recommendations.is_empty());
        assert!(!result.analysis.diminishing_returns);
        assert!(result.analysis.efficiency.seconds_per_point.is_none());
    }

    #[tokio::test]
    async fn test_perfect_first_analysis_stops_immediately() {
        let tester = Arc::new(ScriptedTester::new(vec![Ok(outcome(4, 0))]));
        let (service, model, _) = service(ScriptedModel::new(DIVIDE_TESTS), tester.clone());

        let result = service
            .run(&divide_source(), &options(100.0, 5))
            .await
            .unwrap();

        assert!(result.target_reached);
        assert_eq!(result.total_iterations, 1);
        assert_eq!(tester.call_count(), 1);
        assert!(model.improve_calls.lock().unwrap().is_empty());
        assert_eq!(result.test_file.version(), 1);
    }

    #[tokio::test]
    async fn test_timeouts_alone_are_not_actionable() {
        let only_timeouts = MutationRunOutcome::from_mutants(vec![
            mutant("ArithmeticOperator", 1, 1, MutantStatus::Killed),
            mutant("UpdateOperator", 2, 1, MutantStatus::Timeout),
        ]);
        let tester = Arc::new(ScriptedTester::new(vec![Ok(MutationRunOutcome {
            mutation_score: 70.0,
            ..only_timeouts
        })]));
        let (service, model, _) = service(ScriptedModel::new(DIVIDE_TESTS), tester.clone());

        let result = service
            .run(&divide_source(), &options(80.0, 5))
            .await
            .unwrap();

        assert!(!result.target_reached);
        assert_eq!(result.stop_reason, StopReason::NoActionableMutants);
        assert_eq!(result.total_iterations, 1);
        assert!(model.improve_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_improvement_failures_are_tolerated() {
        let tester = Arc::new(ScriptedTester::new(
            (0..4).map(|_| Ok(outcome(1, 1))).collect(),
        ));
        // Only the first improvement is scripted; later calls fail as well.
        let model =
            ScriptedModel::new(DIVIDE_TESTS).then_improve(Err(anyhow::anyhow!("rate limited")));
        let (service, model, storage) = service(model, tester.clone());

        let result = service
            .run(&divide_source(), &options(80.0, 4))
            .await
            .unwrap();

        // Never more analyses than the budget allows.
        assert_eq!(tester.call_count(), 4);
        assert_eq!(result.total_iterations, 4);
        assert_eq!(result.stop_reason, StopReason::IterationBudgetExhausted);
        assert_eq!(model.improve_calls.lock().unwrap().len(), 4);
        assert!(result.iterations.iter().all(|i| i.error.is_some()));
        assert!(result.iterations[0].error.as_ref().unwrap().contains("rate limited"));
        assert!(result.iterations[0].error.as_ref().unwrap().contains("iteration 1"));
        assert_eq!(result.test_file.version(), 1);
        assert_eq!(*storage.saves.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_analysis_failure_is_recorded_and_loop_continues() {
        let tester = Arc::new(ScriptedTester::new(vec![
            Err(anyhow::anyhow!("stryker crashed")),
            Ok(outcome(3, 0)),
        ]));
        let (service, _, _) = service(ScriptedModel::new(DIVIDE_TESTS), tester.clone());

        let result = service
            .run(&divide_source(), &options(80.0, 5))
            .await
            .unwrap();

        assert!(result.target_reached);
        assert_eq!(result.total_iterations, 2);
        assert!(result.iterations[0].result.is_none());
        assert!(result.iterations[0].error.as_ref().unwrap().contains("stryker crashed"));
        assert_eq!(result.analysis.score_progression, vec![100.0]);
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected_before_any_call() {
        let tester = Arc::new(ScriptedTester::default());
        let (service, model, storage) = service(ScriptedModel::new(DIVIDE_TESTS), tester.clone());

        let err = service
            .run(&divide_source(), &options(150.0, 5))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(tester.call_count(), 0);
        assert_eq!(model.generate.lock().unwrap().len(), 1);
        assert_eq!(*storage.saves.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_initial_generation_failure_is_fatal() {
        let tester = Arc::new(ScriptedTester::default());
        let (service, _, _) = service(ScriptedModel::new("not a test suite"), tester.clone());

        let err = service
            .run(&divide_source(), &options(80.0, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(tester.call_count(), 0);
    }

    fn finished(target_reached: bool, iterations: u32, score: f64) -> LoopOutcome {
        LoopOutcome {
            source_path: PathBuf::from("src/math.js"),
            test_file: TestFile::new(
                "tests/math.test.js",
                DIVIDE_TESTS,
                "src/math.js",
                crate::language::Language::JavaScript,
            ),
            target_reached,
            stop_reason: if target_reached {
                StopReason::TargetReached
            } else {
                StopReason::IterationBudgetExhausted
            },
            total_iterations: iterations,
            iterations: Vec::new(),
            final_score: Some(score),
            total_duration: Duration::from_secs(1),
            analysis: FinalAnalysis {
                score_progression: vec![score],
                average_improvement: 0.0,
                diminishing_returns: false,
                efficiency: Efficiency {
                    points_per_iteration: 0.0,
                    seconds_per_point: None,
                },
                recommendations: Vec::new(),
            },
        }
    }

    #[test]
    fn test_analyze_performance_buckets() {
        let outcomes = vec![
            finished(true, 1, 90.0),
            finished(true, 3, 85.0),
            finished(true, 5, 80.0),
            finished(false, 5, 45.0),
        ];
        let performance = analyze_performance(&outcomes).unwrap();
        assert_eq!(performance.runs, 4);
        assert_eq!(performance.success_rate, 0.75);
        assert_eq!(performance.average_iterations, 3.5);
        assert_eq!(performance.average_final_score, 75.0);
        assert_eq!(
            performance.convergence,
            ConvergenceBuckets {
                fast: 1,
                moderate: 1,
                slow: 1,
                non_convergent: 1
            }
        );
        assert!(analyze_performance(&[]).is_none());
    }

    #[test]
    fn test_optimization_suggestions() {
        let struggling = analyze_performance(&[
            finished(false, 5, 40.0),
            finished(false, 5, 50.0),
            finished(true, 5, 80.0),
        ])
        .unwrap();
        let suggestions = optimization_suggestions(&struggling);
        let categories: Vec<&str> = suggestions.iter().map(|s| s.category.as_str()).collect();
        assert_eq!(categories, vec!["reliability", "target", "efficiency", "quality"]);
        assert_eq!(suggestions[0].priority, Priority::High);
        assert_eq!(suggestions[3].priority, Priority::Medium);

        let healthy = analyze_performance(&[finished(true, 1, 95.0), finished(true, 2, 90.0)]).unwrap();
        let suggestions = optimization_suggestions(&healthy);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].priority, Priority::Low);
    }
}
