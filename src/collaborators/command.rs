//! Mutation tester that shells out to an external tool (e.g. StrykerJS,
//! mutmut or cargo-mutants with a JSON reporter) and reads back a
//! mutation-testing-report JSON file.

use super::{MutationRunOptions, MutationTester};
use crate::entities::{Location, MutantRecord, MutantStatus, MutationResult, MutationRunOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// A finished run of the mutation tool.
#[derive(Debug)]
struct ToolRun {
    /// `None` when the process was ended by a signal.
    exit_code: Option<i32>,
    /// stdout followed by stderr.
    output: String,
    elapsed: Duration,
}

impl ToolRun {
    fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Run `command` through `sh -c` in `working_dir`.
///
/// A non-zero exit is still a finished run; failing to start, failing to
/// collect output and exceeding `timeout_seconds` are errors.
async fn run_tool(working_dir: &Path, command: &str, timeout_seconds: u64) -> Result<ToolRun> {
    use std::process::Stdio;

    let started = Instant::now();
    let child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to start mutation command in {:?}", working_dir))?;

    let output = tokio::time::timeout(
        Duration::from_secs(timeout_seconds),
        child.wait_with_output(),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Mutation command timed out after {timeout_seconds} seconds"))?
    .context("Failed to collect mutation command output")?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(ToolRun {
        exit_code: output.status.code(),
        output: combined,
        elapsed: started.elapsed(),
    })
}

/// Keep the last `max_len` bytes of tool output for error messages.
fn tail(output: &str, max_len: usize) -> &str {
    if output.len() <= max_len {
        return output;
    }
    let mut start = output.len() - max_len;
    while !output.is_char_boundary(start) {
        start += 1;
    }
    &output[start..]
}

#[derive(Debug, Deserialize)]
struct ReportFile {
    #[serde(default)]
    files: BTreeMap<String, ReportSourceFile>,
}

#[derive(Debug, Deserialize)]
struct ReportSourceFile {
    #[serde(default)]
    mutants: Vec<ReportMutant>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportMutant {
    mutator_name: String,
    #[serde(default)]
    replacement: Option<String>,
    location: Location,
    status: String,
}

fn map_status(status: &str) -> Option<MutantStatus> {
    match status {
        "Killed" => Some(MutantStatus::Killed),
        "Survived" => Some(MutantStatus::Survived),
        "Timeout" => Some(MutantStatus::Timeout),
        "NoCoverage" => Some(MutantStatus::NoCoverage),
        // CompileError, RuntimeError, Ignored, Pending say nothing about the tests.
        _ => None,
    }
}

/// Parse a mutation-testing-report JSON document into a run outcome.
///
/// Only files whose report key ends with `source_path`'s file name are used;
/// if none match, every file in the report is used.
pub fn parse_stryker_report(json: &str, source_path: &Path) -> Result<MutationRunOutcome> {
    let report: ReportFile =
        serde_json::from_str(json).context("Failed to parse mutation report")?;

    let file_name = source_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let matching: Vec<&ReportSourceFile> = report
        .files
        .iter()
        .filter(|(key, _)| !file_name.is_empty() && key.ends_with(&file_name))
        .map(|(_, file)| file)
        .collect();
    let files: Vec<&ReportSourceFile> = if matching.is_empty() {
        report.files.values().collect()
    } else {
        matching
    };

    let mutants = files.into_iter().flat_map(|f| &f.mutants).filter_map(|m| {
        let status = map_status(&m.status)?;
        Some(MutantRecord {
            mutator_name: m.mutator_name.clone(),
            location: m.location,
            replacement: m.replacement.clone().unwrap_or_default(),
            status,
        })
    });

    Ok(MutationRunOutcome::from_mutants(mutants))
}

/// Runs a configured shell command and parses the report it writes.
///
/// `{source}` and `{test}` in the command are replaced with the paths under
/// test.
pub struct CommandMutationTester {
    command: String,
    report_path: PathBuf,
    working_dir: PathBuf,
}

impl CommandMutationTester {
    pub fn new(
        command: impl Into<String>,
        report_path: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            command: command.into(),
            report_path: report_path.into(),
            working_dir: working_dir.into(),
        }
    }

    fn render_command(&self, source_path: &Path, test_path: &Path) -> String {
        self.command
            .replace("{source}", &source_path.to_string_lossy())
            .replace("{test}", &test_path.to_string_lossy())
    }

    fn report_location(&self) -> PathBuf {
        if self.report_path.is_absolute() {
            self.report_path.clone()
        } else {
            self.working_dir.join(&self.report_path)
        }
    }
}

#[async_trait]
impl MutationTester for CommandMutationTester {
    async fn run_mutation_tests(
        &self,
        source_path: &Path,
        test_path: &Path,
        options: &MutationRunOptions,
    ) -> Result<MutationRunOutcome> {
        let report_path = self.report_location();

        // A report left over from the previous iteration must not be re-read.
        if tokio::fs::try_exists(&report_path).await.unwrap_or(false) {
            tokio::fs::remove_file(&report_path)
                .await
                .with_context(|| format!("Failed to remove stale report {:?}", report_path))?;
        }

        let command = self.render_command(source_path, test_path);
        tracing::debug!("Running mutation command: {}", command);

        let run = run_tool(&self.working_dir, &command, options.timeout_seconds).await?;

        let report_exists = tokio::fs::try_exists(&report_path).await.unwrap_or(false);
        if !run.succeeded() {
            if !report_exists {
                anyhow::bail!(
                    "Mutation command failed with exit code {} after {:?}: {}",
                    run.exit_code
                        .map_or_else(|| "none".to_string(), |c| c.to_string()),
                    run.elapsed,
                    tail(&run.output, 2000)
                );
            }
            // Tools commonly exit non-zero when the score is under their own threshold.
            tracing::warn!(
                "Mutation command exited with {:?} but produced a report; using it",
                run.exit_code
            );
        }

        let json = tokio::fs::read_to_string(&report_path)
            .await
            .with_context(|| format!("Failed to read mutation report {:?}", report_path))?;

        let outcome = parse_stryker_report(&json, source_path)?;
        tracing::debug!(
            "Mutation run for {} finished in {:?}: {} mutants",
            source_path.display(),
            run.elapsed,
            outcome.total_mutants
        );
        Ok(outcome)
    }

    async fn write_report(&self, result: &MutationResult) -> Result<Option<PathBuf>> {
        let report_path = self.report_location();
        if !tokio::fs::try_exists(&report_path).await.unwrap_or(false) {
            return Ok(None);
        }
        let archived = report_path.with_file_name(format!("mutation-report-{}.json", result.id()));
        tokio::fs::copy(&report_path, &archived)
            .await
            .with_context(|| format!("Failed to archive mutation report to {:?}", archived))?;
        Ok(Some(archived))
    }

    async fn is_healthy(&self) -> bool {
        self.working_dir.is_dir() && !self.command.trim().is_empty()
    }
}
