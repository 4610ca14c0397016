use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use mutaforge::analysis::{MutationAnalysisService, Recommendation};
use mutaforge::collaborators::{
    CommandMutationTester, CostOptions, FsStorage, OllamaModel, Storage,
};
use mutaforge::config::Config;
use mutaforge::entities::SourceFile;
use mutaforge::feedback::{FeedbackLoopService, LoopOptions, LoopOutcome};
use mutaforge::generation::TestGenerationService;
use mutaforge::usecases::{discover_sources, BatchProcess, BatchReport, ImproveTests};

#[derive(Parser)]
#[command(name = "mutaforge")]
#[command(version)]
#[command(about = "Generate unit tests and refine them until they kill the mutants")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Override the target mutation score
    #[arg(long, global = true)]
    target: Option<f64>,

    /// Override the iteration budget
    #[arg(long, global = true)]
    max_iterations: Option<u32>,

    /// Append improvements instead of splicing them into the existing suite
    #[arg(long, global = true)]
    force_append: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and refine tests for the given source files
    Run {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Find source files below a directory and process them all
    Scan { dir: PathBuf },
    /// Refine an existing test file
    Improve { source: PathBuf, test: PathBuf },
    /// Estimate the language model cost for a file
    Estimate {
        file: PathBuf,
        /// Improvement rounds to budget for
        #[arg(long, default_value_t = 3)]
        rounds: u32,
    },
    /// Check that the collaborators are reachable
    Check,
}

struct App {
    config: Config,
    storage: Arc<dyn Storage>,
    feedback: Arc<FeedbackLoopService>,
}

impl App {
    fn new(config: Config) -> Self {
        let data_dir = config.data_dir();
        let storage: Arc<dyn Storage> = Arc::new(FsStorage::new(&data_dir));
        let model = Arc::new(OllamaModel::new(
            &config.endpoints,
            config.model.cost_per_1k_tokens,
        ));
        let tester = Arc::new(CommandMutationTester::new(
            config.mutation.command.clone(),
            config.mutation.report_path.clone(),
            &data_dir,
        ));

        let generator =
            TestGenerationService::new(model, storage.clone(), config.generation.settings());
        let analyzer = MutationAnalysisService::new(tester, config.mutation.analysis_settings());
        let feedback = Arc::new(FeedbackLoopService::new(generator, analyzer));

        Self {
            config,
            storage,
            feedback,
        }
    }

    fn batch(&self) -> BatchProcess {
        BatchProcess::new(
            self.feedback.clone(),
            self.storage.clone(),
            self.config.refinement.concurrency,
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(target) = cli.target {
        config.refinement.target_mutation_score = target;
    }
    if let Some(max_iterations) = cli.max_iterations {
        config.refinement.max_iterations = max_iterations;
    }

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.general.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().or_else(Config::default_config_path);
    tracing::debug!(
        "Config path: {}",
        config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none, using defaults)".to_string())
    );

    config.validate()?;
    tracing::debug!("Data directory: {}", config.data_dir().display());

    let options = LoopOptions {
        settings: config.refinement.loop_settings(),
        force_append: cli.force_append,
        ..Default::default()
    };
    let app = App::new(config);

    match cli.command {
        Commands::Run { files } => {
            let report = app.batch().execute(&files, &options).await?;
            print_batch(&report, cli.json)?;
        }
        Commands::Scan { dir } => {
            let files = discover_sources(&app.config.data_dir(), &dir, &app.config.batch)?;
            if files.is_empty() {
                tracing::warn!("No source files found under {}", dir.display());
            }
            let report = app.batch().execute(&files, &options).await?;
            print_batch(&report, cli.json)?;
        }
        Commands::Improve { source, test } => {
            let outcome = ImproveTests::new(app.feedback.clone(), app.storage.clone())
                .execute(&source, &test, &options)
                .await?;
            print_outcome(&outcome, cli.json)?;
        }
        Commands::Estimate { file, rounds } => {
            let content = app
                .storage
                .read_file(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let source = SourceFile::new(&file, content)?;
            let estimate = app
                .feedback
                .generator()
                .estimate_generation_cost(
                    &source,
                    &CostOptions {
                        improvement_rounds: rounds,
                    },
                )
                .await?;
            if cli.json {
                print_json(&estimate)?;
            } else {
                println!(
                    "{}: ~{} tokens, cost {:.4} (complexity {:.2}, {:?})",
                    estimate.file_name,
                    estimate.tokens,
                    estimate.cost,
                    estimate.complexity.score,
                    estimate.complexity.level
                );
            }
        }
        Commands::Check => {
            let report = app.feedback.generator().validate_capabilities().await;
            let mutation_tool = app.feedback.analyzer().is_healthy().await;
            if cli.json {
                print_json(&serde_json::json!({
                    "capabilities": report,
                    "mutation_testing": mutation_tool,
                }))?;
            } else {
                print_status("language model", report.language_model.healthy, report.language_model.detail.as_deref());
                print_status("storage", report.storage.healthy, report.storage.detail.as_deref());
                print_status("mutation testing", mutation_tool, None);
            }
            if !(report.all_healthy() && mutation_tool) {
                anyhow::bail!("Some collaborators are unavailable");
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_status(name: &str, healthy: bool, detail: Option<&str>) {
    let mark = if healthy { "ok" } else { "unavailable" };
    match detail {
        Some(detail) => println!("{name:<18} {mark} ({detail})"),
        None => println!("{name:<18} {mark}"),
    }
}

fn print_recommendations(recommendations: &[Recommendation]) {
    for rec in recommendations {
        println!("  [{}] {}", rec.priority, rec.message);
    }
}

fn print_outcome(outcome: &LoopOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(outcome);
    }
    println!(
        "{} -> {}: {} after {} iterations, final score {}",
        outcome.source_path.display(),
        outcome.test_file.path().display(),
        outcome.stop_reason,
        outcome.total_iterations,
        outcome
            .final_score
            .map(|s| format!("{s:.1}%"))
            .unwrap_or_else(|| "n/a".to_string())
    );
    print_recommendations(&outcome.analysis.recommendations);
    Ok(())
}

fn print_batch(report: &BatchReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }

    for record in report.session.results() {
        match (&record.error, record.final_score) {
            (Some(error), _) => println!("FAIL {}: {}", record.source_path.display(), error),
            (None, score) => println!(
                "{} {}: {} iterations, score {}",
                if record.target_reached { "OK  " } else { "MISS" },
                record.source_path.display(),
                record.iterations,
                score
                    .map(|s| format!("{s:.1}%"))
                    .unwrap_or_else(|| "n/a".to_string())
            ),
        }
    }

    let summary = report.session.summary();
    println!(
        "\n{} files, {} succeeded, {} failed, {} reached target, {} iterations",
        summary.files, summary.succeeded, summary.failed, summary.targets_reached, summary.total_iterations
    );
    if let Some(average) = summary.average_final_score {
        println!("Average final score: {average:.1}%");
    }
    if !report.suggestions.is_empty() {
        println!("Suggestions:");
        print_recommendations(&report.suggestions);
    }
    Ok(())
}
