use super::mutant::{MutantRecord, MutantStatus};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Raw outcome of one mutation-testing run, as returned by the collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationRunOutcome {
    /// Percentage in `[0, 100]`.
    pub mutation_score: f64,
    pub total_mutants: usize,
    pub killed: Vec<MutantRecord>,
    pub survived: Vec<MutantRecord>,
    pub timed_out: Vec<MutantRecord>,
    pub no_coverage: Vec<MutantRecord>,
}

impl MutationRunOutcome {
    /// Sort a flat list of mutants into buckets and compute the score.
    ///
    /// Timed-out mutants count as detected.
    pub fn from_mutants(mutants: impl IntoIterator<Item = MutantRecord>) -> Self {
        let mut outcome = Self::default();
        for mutant in mutants {
            match mutant.status {
                MutantStatus::Killed => outcome.killed.push(mutant),
                MutantStatus::Survived => outcome.survived.push(mutant),
                MutantStatus::Timeout => outcome.timed_out.push(mutant),
                MutantStatus::NoCoverage => outcome.no_coverage.push(mutant),
            }
        }
        outcome.total_mutants = outcome.killed.len()
            + outcome.survived.len()
            + outcome.timed_out.len()
            + outcome.no_coverage.len();
        outcome.mutation_score = if outcome.total_mutants == 0 {
            0.0
        } else {
            let detected = outcome.killed.len() + outcome.timed_out.len();
            detected as f64 / outcome.total_mutants as f64 * 100.0
        };
        outcome
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreCategory {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl ScoreCategory {
    pub fn for_score(score: f64) -> Self {
        if score >= 90.0 {
            ScoreCategory::Excellent
        } else if score >= 75.0 {
            ScoreCategory::Good
        } else if score >= 50.0 {
            ScoreCategory::Fair
        } else {
            ScoreCategory::Poor
        }
    }
}

impl std::fmt::Display for ScoreCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreCategory::Excellent => write!(f, "excellent"),
            ScoreCategory::Good => write!(f, "good"),
            ScoreCategory::Fair => write!(f, "fair"),
            ScoreCategory::Poor => write!(f, "poor"),
        }
    }
}

/// One mutation-analysis outcome for a source/test pair.
///
/// Created pending, filled exactly once by [`MutationResult::set_results`],
/// read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationResult {
    id: String,
    source_path: PathBuf,
    test_path: PathBuf,
    status: ResultStatus,
    mutation_score: f64,
    total_mutants: usize,
    killed: Vec<MutantRecord>,
    survived: Vec<MutantRecord>,
    timed_out: Vec<MutantRecord>,
    no_coverage: Vec<MutantRecord>,
    execution_time: Duration,
    created_at: DateTime<Utc>,
}

fn generate_id(now: DateTime<Utc>) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("mr-{}-{}", now.timestamp_millis(), &random[..8])
}

impl MutationResult {
    pub fn new(source_path: impl Into<PathBuf>, test_path: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(now),
            source_path: source_path.into(),
            test_path: test_path.into(),
            status: ResultStatus::Pending,
            mutation_score: 0.0,
            total_mutants: 0,
            killed: Vec::new(),
            survived: Vec::new(),
            timed_out: Vec::new(),
            no_coverage: Vec::new(),
            execution_time: Duration::ZERO,
            created_at: now,
        }
    }

    /// Fill in the outcome and mark the result completed.
    ///
    /// The total is always the bucket sum; a disagreeing collaborator total is
    /// logged and ignored. The score is clamped to `[0, 100]`.
    pub fn set_results(&mut self, outcome: MutationRunOutcome, execution_time: Duration) -> Result<()> {
        if self.status == ResultStatus::Completed {
            return Err(Error::InvalidState(format!(
                "mutation result {} is already completed",
                self.id
            )));
        }

        let bucket_total = outcome.killed.len()
            + outcome.survived.len()
            + outcome.timed_out.len()
            + outcome.no_coverage.len();
        if bucket_total != outcome.total_mutants {
            tracing::warn!(
                "Mutant total {} disagrees with bucket sum {} for {}; using bucket sum",
                outcome.total_mutants,
                bucket_total,
                self.source_path.display()
            );
        }

        let score = if outcome.mutation_score.is_finite() {
            outcome.mutation_score.clamp(0.0, 100.0)
        } else {
            0.0
        };

        self.mutation_score = score;
        self.total_mutants = bucket_total;
        self.killed = outcome.killed;
        self.survived = outcome.survived;
        self.timed_out = outcome.timed_out;
        self.no_coverage = outcome.no_coverage;
        self.execution_time = execution_time;
        self.status = ResultStatus::Completed;
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn test_path(&self) -> &Path {
        &self.test_path
    }

    pub fn status(&self) -> ResultStatus {
        self.status
    }

    pub fn is_completed(&self) -> bool {
        self.status == ResultStatus::Completed
    }

    /// `None` until the result is completed.
    pub fn mutation_score(&self) -> Option<f64> {
        self.is_completed().then_some(self.mutation_score)
    }

    pub fn total_mutants(&self) -> usize {
        self.total_mutants
    }

    pub fn killed(&self) -> &[MutantRecord] {
        &self.killed
    }

    pub fn survived(&self) -> &[MutantRecord] {
        &self.survived
    }

    pub fn timed_out(&self) -> &[MutantRecord] {
        &self.timed_out
    }

    pub fn no_coverage(&self) -> &[MutantRecord] {
        &self.no_coverage
    }

    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Iterate every mutant across all buckets.
    pub fn all_mutants(&self) -> impl Iterator<Item = &MutantRecord> {
        self.killed
            .iter()
            .chain(&self.survived)
            .chain(&self.timed_out)
            .chain(&self.no_coverage)
    }

    /// Mutants the next improvement should target: survived, then uncovered.
    pub fn actionable_mutants(&self) -> Vec<MutantRecord> {
        self.survived
            .iter()
            .chain(&self.no_coverage)
            .cloned()
            .collect()
    }

    /// Inclusive: a score equal to the target counts as reached.
    pub fn has_reached_target(&self, target: f64) -> bool {
        self.mutation_score()
            .is_some_and(|score| score >= target)
    }

    pub fn score_category(&self) -> Option<ScoreCategory> {
        self.mutation_score().map(ScoreCategory::for_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mutant(name: &str, line: usize, status: MutantStatus) -> MutantRecord {
        MutantRecord::new(name, line, 1, "x", status)
    }

    fn outcome(killed: usize, survived: usize, timed_out: usize, no_cov: usize) -> MutationRunOutcome {
        let mut mutants = Vec::new();
        mutants.extend((0..killed).map(|i| mutant("Arithmetic", i, MutantStatus::Killed)));
        mutants.extend((0..survived).map(|i| mutant("Conditional", i, MutantStatus::Survived)));
        mutants.extend((0..timed_out).map(|i| mutant("Loop", i, MutantStatus::Timeout)));
        mutants.extend((0..no_cov).map(|i| mutant("Block", i, MutantStatus::NoCoverage)));
        MutationRunOutcome::from_mutants(mutants)
    }

    #[test]
    fn test_from_mutants_scores_timeouts_as_detected() {
        let o = outcome(6, 2, 1, 1);
        assert_eq!(o.total_mutants, 10);
        assert_eq!(o.mutation_score, 70.0);
        assert_eq!(MutationRunOutcome::from_mutants(Vec::new()).mutation_score, 0.0);
    }

    #[test]
    fn test_pending_result_has_no_score() {
        let result = MutationResult::new("src/math.js", "tests/math.test.js");
        assert_eq!(result.status(), ResultStatus::Pending);
        assert_eq!(result.mutation_score(), None);
        assert!(!result.has_reached_target(0.0));
        assert!(result.id().starts_with("mr-"));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = MutationResult::new("a.js", "a.test.js");
        let b = MutationResult::new("a.js", "a.test.js");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_set_results_partitions_buckets() {
        let mut result = MutationResult::new("src/math.js", "tests/math.test.js");
        result
            .set_results(outcome(5, 3, 1, 2), Duration::from_millis(1200))
            .unwrap();
        assert!(result.is_completed());
        assert_eq!(
            result.killed().len()
                + result.survived().len()
                + result.timed_out().len()
                + result.no_coverage().len(),
            result.total_mutants()
        );
        assert_eq!(result.all_mutants().count(), 11);
        assert_eq!(result.execution_time(), Duration::from_millis(1200));
    }

    #[test]
    fn test_set_results_uses_bucket_sum_over_reported_total() {
        let mut raw = outcome(2, 1, 0, 0);
        raw.total_mutants = 99;
        let mut result = MutationResult::new("a.js", "a.test.js");
        result.set_results(raw, Duration::ZERO).unwrap();
        assert_eq!(result.total_mutants(), 3);
    }

    #[test]
    fn test_set_results_only_once() {
        let mut result = MutationResult::new("a.js", "a.test.js");
        result.set_results(outcome(1, 0, 0, 0), Duration::ZERO).unwrap();
        let err = result
            .set_results(outcome(0, 1, 0, 0), Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(result.killed().len(), 1);
    }

    #[test]
    fn test_score_is_clamped() {
        let mut raw = outcome(1, 0, 0, 0);
        raw.mutation_score = 140.0;
        let mut result = MutationResult::new("a.js", "a.test.js");
        result.set_results(raw, Duration::ZERO).unwrap();
        assert_eq!(result.mutation_score(), Some(100.0));
    }

    #[test]
    fn test_has_reached_target_is_inclusive_and_pure() {
        let mut raw = outcome(4, 1, 0, 0);
        raw.mutation_score = 80.0;
        let mut result = MutationResult::new("a.js", "a.test.js");
        result.set_results(raw, Duration::ZERO).unwrap();
        assert!(result.has_reached_target(80.0));
        assert!(result.has_reached_target(80.0));
        assert!(result.has_reached_target(79.9));
        assert!(!result.has_reached_target(80.1));
    }

    #[test]
    fn test_actionable_mutants_include_no_coverage() {
        let mut result = MutationResult::new("a.js", "a.test.js");
        result.set_results(outcome(3, 2, 1, 1), Duration::ZERO).unwrap();
        let actionable = result.actionable_mutants();
        assert_eq!(actionable.len(), 3);
        assert_eq!(actionable[0].status, MutantStatus::Survived);
        assert_eq!(actionable[2].status, MutantStatus::NoCoverage);
    }

    #[test]
    fn test_score_category() {
        assert_eq!(ScoreCategory::for_score(95.0), ScoreCategory::Excellent);
        assert_eq!(ScoreCategory::for_score(90.0), ScoreCategory::Excellent);
        assert_eq!(ScoreCategory::for_score(75.0), ScoreCategory::Good);
        assert_eq!(ScoreCategory::for_score(50.0), ScoreCategory::Fair);
        assert_eq!(ScoreCategory::for_score(49.9), ScoreCategory::Poor);
        assert_eq!(ScoreCategory::Good.to_string(), "good");
    }
}
