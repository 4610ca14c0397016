//! Value objects shared by the services: the module under test, its generated
//! suite, one mutation-analysis outcome, and the run-wide session record.

mod mutant;
mod mutation_result;
mod session;
mod source_file;
mod test_file;

pub use mutant::{Location, MutantRecord, MutantStatus, Position};
pub use mutation_result::{MutationResult, MutationRunOutcome, ResultStatus, ScoreCategory};
pub use session::{FileRecord, GenerationSession, SessionError, SessionStatus, SessionSummary};
pub use source_file::{compute_hash, ComplexityLevel, ComplexityMetrics, SourceFile};
pub use test_file::{GenerationMetadata, ImprovementRecord, TestFile};
