use crate::analysis::AnalysisSettings;
use crate::error::Error;
use crate::feedback::LoopSettings;
use crate::generation::{GenerationSettings, MergeStrategy};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Ollama endpoints
    #[serde(default)]
    pub endpoints: Vec<OllamaEndpoint>,

    /// Language model pricing
    #[serde(default)]
    pub model: ModelConfig,

    /// Stopping conditions and batch fan-out
    #[serde(default)]
    pub refinement: RefinementConfig,

    /// Where and how generated tests are written
    #[serde(default)]
    pub generation: GenerationConfig,

    /// External mutation-testing tool
    #[serde(default)]
    pub mutation: MutationConfig,

    /// File selection for directory scans
    #[serde(default)]
    pub batch: BatchConfig,

    /// Storage root for sources and generated tests
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// An Ollama endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaEndpoint {
    /// Display name for this endpoint
    pub name: String,

    /// Ollama API URL
    pub url: String,

    /// Model to use for generation
    pub model: String,

    /// Whether this endpoint is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Price per 1000 tokens; local models cost nothing.
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementConfig {
    /// Mutation score (0-100) at which the loop stops
    #[serde(default = "default_target_score")]
    pub target_mutation_score: f64,

    /// Upper bound on mutation analyses per file
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Files refined at the same time in batch mode
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Directory generated test files are written to
    #[serde(default = "default_test_dir")]
    pub test_dir: PathBuf,

    /// How improved tests are merged into the existing suite
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Shell command; `{source}` and `{test}` are substituted
    #[serde(default = "default_mutation_command")]
    pub command: String,

    /// JSON report the command writes (mutation-testing-report schema)
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,

    /// Timeout in seconds for one mutation run
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// How many problematic mutators to report
    #[serde(default = "default_top_mutators")]
    pub top_mutators: usize,

    /// Archive the tool's report after every analysis
    #[serde(default)]
    pub write_report: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Globs a scanned file must match (relative to the scan root)
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    /// Globs that remove files from a scan
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_target_score() -> f64 {
    80.0
}

fn default_max_iterations() -> u32 {
    5
}

fn default_concurrency() -> usize {
    3
}

fn default_test_dir() -> PathBuf {
    PathBuf::from("tests")
}

fn default_mutation_command() -> String {
    "npx stryker run --mutate {source} --reporters json".to_string()
}

fn default_report_path() -> PathBuf {
    PathBuf::from("reports/mutation/mutation.json")
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

fn default_top_mutators() -> usize {
    5
}

fn default_include() -> Vec<String> {
    vec!["**/*".to_string()]
}

fn default_exclude() -> Vec<String> {
    vec![
        "**/*.test.*".to_string(),
        "**/*.spec.*".to_string(),
        "**/test_*.py".to_string(),
        "tests/**".to_string(),
    ]
}

/// Upper bound for `refinement.max_iterations`.
pub const MAX_ITERATIONS_LIMIT: u32 = 50;

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            target_mutation_score: default_target_score(),
            max_iterations: default_max_iterations(),
            concurrency: default_concurrency(),
        }
    }
}

impl RefinementConfig {
    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            target_mutation_score: self.target_mutation_score,
            max_iterations: self.max_iterations,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            test_dir: default_test_dir(),
            merge_strategy: MergeStrategy::default(),
        }
    }
}

impl GenerationConfig {
    pub fn settings(&self) -> GenerationSettings {
        GenerationSettings {
            test_dir: self.test_dir.clone(),
            merge_strategy: self.merge_strategy,
        }
    }
}

impl MutationConfig {
    pub fn analysis_settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            top_mutators: self.top_mutators,
            write_report: self.write_report,
            timeout_seconds: self.timeout_seconds,
        }
    }
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            command: default_mutation_command(),
            report_path: default_report_path(),
            timeout_seconds: default_timeout(),
            top_mutators: default_top_mutators(),
            write_report: false,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: default_exclude(),
        }
    }
}

impl BatchConfig {
    /// Whether a path relative to the scan root should be processed.
    pub fn accepts(&self, relative_path: &str) -> bool {
        self.include
            .iter()
            .any(|g| glob_match::glob_match(g, relative_path))
            && !self
                .exclude
                .iter()
                .any(|g| glob_match::glob_match(g, relative_path))
    }
}

impl Config {
    /// Load configuration from file, or create default if not found
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(Self::default_config_path);

        let config = if let Some(ref path) = config_path {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {:?}", path))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config from {:?}", path))?
            } else {
                Config::default()
            }
        } else {
            Config::default()
        };

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = path
            .map(PathBuf::from)
            .or_else(Self::default_config_path)
            .context("No config path available")?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config to {:?}", config_path))?;

        Ok(())
    }

    /// Reject settings the services cannot work with.
    pub fn validate(&self) -> crate::error::Result<()> {
        self.refinement.loop_settings().validate()?;
        if self.refinement.concurrency == 0 {
            return Err(Error::Configuration(
                "refinement.concurrency must be at least 1".to_string(),
            ));
        }
        if self.mutation.command.trim().is_empty() {
            return Err(Error::Configuration(
                "mutation.command must not be empty".to_string(),
            ));
        }
        if self.mutation.timeout_seconds == 0 {
            return Err(Error::Configuration(
                "mutation.timeout_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "mutaforge", "mutaforge")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Storage root; the working directory unless configured.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}
