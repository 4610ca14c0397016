use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Started,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Started => write!(f, "started"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-file outcome recorded on the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub source_path: PathBuf,
    pub success: bool,
    pub error: Option<String>,
    /// Whatever test artifact exists, even for failed files.
    pub test_path: Option<PathBuf>,
    pub final_score: Option<f64>,
    pub target_reached: bool,
    pub iterations: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionError {
    pub source_path: Option<PathBuf>,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub status: SessionStatus,
    pub files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub targets_reached: usize,
    pub average_final_score: Option<f64>,
    pub total_iterations: u32,
    pub errors: usize,
    pub duration_ms: Option<i64>,
}

/// Aggregate record of one run over one or more source files.
///
/// `ended_at` is set exactly once by [`GenerationSession::complete`],
/// [`GenerationSession::fail`] or [`GenerationSession::cancel`]; after that the
/// session is frozen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSession {
    id: Uuid,
    config: serde_json::Value,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    status: SessionStatus,
    source_files: Vec<PathBuf>,
    results: Vec<FileRecord>,
    errors: Vec<SessionError>,
    total_iterations: u32,
}

impl GenerationSession {
    pub fn new(config: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            started_at: Utc::now(),
            ended_at: None,
            status: SessionStatus::Started,
            source_files: Vec::new(),
            results: Vec::new(),
            errors: Vec::new(),
            total_iterations: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &serde_json::Value {
        &self.config
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn source_files(&self) -> &[PathBuf] {
        &self.source_files
    }

    pub fn results(&self) -> &[FileRecord] {
        &self.results
    }

    pub fn errors(&self) -> &[SessionError] {
        &self.errors
    }

    pub fn total_iterations(&self) -> u32 {
        self.total_iterations
    }

    pub fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_finished() {
            return Err(Error::InvalidState(format!(
                "session {} is already {}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    pub fn add_source_file(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        self.ensure_open()?;
        self.source_files.push(path.into());
        Ok(())
    }

    /// Record a file outcome; failed files also land in the error list.
    pub fn record_result(&mut self, record: FileRecord) -> Result<()> {
        self.ensure_open()?;
        self.total_iterations += record.iterations;
        if let Some(message) = record.error.clone().filter(|_| !record.success) {
            self.errors.push(SessionError {
                source_path: Some(record.source_path.clone()),
                message,
                at: Utc::now(),
            });
        }
        self.results.push(record);
        Ok(())
    }

    pub fn record_error(&mut self, source_path: Option<PathBuf>, message: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        self.errors.push(SessionError {
            source_path,
            message: message.into(),
            at: Utc::now(),
        });
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        self.finish(SessionStatus::Completed)
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.record_error(None, message)?;
        self.finish(SessionStatus::Failed)
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.finish(SessionStatus::Cancelled)
    }

    fn finish(&mut self, status: SessionStatus) -> Result<()> {
        self.ensure_open()?;
        self.status = status;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    pub fn summary(&self) -> SessionSummary {
        let scores: Vec<f64> = self.results.iter().filter_map(|r| r.final_score).collect();
        let average_final_score =
            (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64);

        SessionSummary {
            id: self.id,
            status: self.status,
            files: self.results.len(),
            succeeded: self.results.iter().filter(|r| r.success).count(),
            failed: self.results.iter().filter(|r| !r.success).count(),
            targets_reached: self.results.iter().filter(|r| r.target_reached).count(),
            average_final_score,
            total_iterations: self.total_iterations,
            errors: self.errors.len(),
            duration_ms: self
                .ended_at
                .map(|end| (end - self.started_at).num_milliseconds()),
        }
    }
}
