//! Error taxonomy for the refinement core.

use thiserror::Error;

/// Which external collaborator a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    LanguageModel,
    MutationTesting,
    Storage,
}

impl std::fmt::Display for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Collaborator::LanguageModel => write!(f, "language model"),
            Collaborator::MutationTesting => write!(f, "mutation testing"),
            Collaborator::Storage => write!(f, "storage"),
        }
    }
}

/// Errors raised by entities and services.
#[derive(Debug, Error)]
pub enum Error {
    /// Generated test text failed the structural checks.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A collaborator call failed. `context` names the file and step.
    #[error("{collaborator} call failed while {context}: {source}")]
    Collaborator {
        collaborator: Collaborator,
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// Score or iteration bounds are unusable.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// An entity was asked to do something its lifecycle forbids.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Wrap an opaque collaborator failure with context.
    pub fn collaborator(
        collaborator: Collaborator,
        context: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        Error::Collaborator {
            collaborator,
            context: context.into(),
            source: source.into(),
        }
    }

    /// True for failures that came from outside the core.
    pub fn is_collaborator(&self) -> bool {
        matches!(self, Error::Collaborator { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
