use serde::{Deserialize, Serialize};

/// A line/column position in the source under test (1-indexed lines).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub start: Position,
    pub end: Position,
}

/// Outcome of a single mutant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutantStatus {
    /// A test failed - mutation was caught
    Killed,
    /// All tests passed - mutation was NOT caught
    Survived,
    /// Tests took too long
    Timeout,
    /// No test executes the mutated code
    NoCoverage,
}

impl std::fmt::Display for MutantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Killed => write!(f, "killed"),
            Self::Survived => write!(f, "survived"),
            Self::Timeout => write!(f, "timeout"),
            Self::NoCoverage => write!(f, "no_coverage"),
        }
    }
}

/// One synthetic defect as reported by the mutation-testing collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutantRecord {
    /// Mutator label, e.g. `ArithmeticOperator`.
    pub mutator_name: String,
    pub location: Location,
    pub replacement: String,
    pub status: MutantStatus,
}

impl MutantRecord {
    pub fn new(
        mutator_name: impl Into<String>,
        line: usize,
        column: usize,
        replacement: impl Into<String>,
        status: MutantStatus,
    ) -> Self {
        let replacement = replacement.into();
        let end_column = column + replacement.chars().count().max(1);
        Self {
            mutator_name: mutator_name.into(),
            location: Location {
                start: Position { line, column },
                end: Position {
                    line,
                    column: end_column,
                },
            },
            replacement,
            status,
        }
    }

    /// `line:column` of the start position.
    pub fn position_label(&self) -> String {
        format!(
            "{}:{}",
            self.location.start.line, self.location.start.column
        )
    }
}
