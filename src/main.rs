mod config;
mod language;
mod mutation;
mod project;
mod report;
mod runner;
#[cfg(all(test, unix))]
mod test_support;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::Config;
use crate::language::JavaLanguage;
use crate::mutation::batch::{load_batches, MutantSet};
use crate::mutation::{
    classify, summarize, summarize_expected, MutationSummary, Pipeline, ScorePolicy,
};
use crate::project::Project;
use crate::report::{RunDetail, RunListing, SummaryReport};
use crate::runner::{BatchReport, MutationRunner, RunnerOptions};

#[derive(Parser)]
#[command(name = "mutarium")]
#[command(version)]
#[command(about = "Mutation testing for Java projects: run generated mutants against a fixed test suite")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a project from a source tree and a test tree
    Init {
        name: String,
        /// Directory of the code under test
        #[arg(long)]
        source: PathBuf,
        /// Directory of the test suite
        #[arg(long)]
        tests: PathBuf,
    },
    /// List projects
    List,
    /// Run and store the baseline
    Baseline { name: String },
    /// Run the baseline and a batch of mutants
    Run {
        name: String,
        /// Mutation batch file produced by the generator
        #[arg(long)]
        mutants: PathBuf,
        /// Number of concurrent mutant runs (overrides the config)
        #[arg(long)]
        workers: Option<usize>,
        /// Reuse the stored baseline instead of running it again
        #[arg(long)]
        skip_baseline: bool,
        /// Only run mutants whose file path matches this glob
        #[arg(long)]
        filter: Option<String>,
        /// Remove workspaces left by earlier runs first
        #[arg(long)]
        clean: bool,
    },
    /// Print the summary document as JSON
    Summary {
        name: String,
        /// Count every mutant of this batch, including those without a stored run
        #[arg(long)]
        mutants: Option<PathBuf>,
        /// Write the document to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print a human-readable mutation report
    Report {
        name: String,
        #[arg(long)]
        mutants: Option<PathBuf>,
    },
    /// List stored runs, or show the test outcomes of one run
    Results {
        name: String,
        #[arg(long)]
        run: Option<String>,
    },
    /// Show the effective configuration
    Config {
        /// Save it to the configuration file
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.clone().or_else(Config::default_config_path);
    let config = Config::load(cli.config.as_deref())?;

    // Initialize logging; RUST_LOG takes precedence over the config file
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    tracing::debug!(
        "Config path: {}",
        config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none, using defaults)".to_string())
    );
    tracing::debug!("Data directory: {}", config.data_dir().display());

    let projects_dir = config.projects_dir();

    match cli.command {
        Commands::Init {
            name,
            source,
            tests,
        } => {
            let project = Project::init(&projects_dir, &name, &source, &tests)?;
            println!("Created project '{}' at {}", name, project.root.display());
        }
        Commands::List => {
            for name in Project::list(&projects_dir)? {
                println!("{}", name);
            }
        }
        Commands::Baseline { name } => {
            let project = Project::open(&projects_dir, &name)?;
            let runner = build_runner(&config, &project, None);
            stop_on_ctrl_c(&runner);

            let baseline = runner.run_baseline().await?;
            println!(
                "{}",
                RunDetail {
                    run_id: mutation::BASELINE_RUN_ID,
                    run: &baseline,
                }
            );
        }
        Commands::Run {
            name,
            mutants,
            workers,
            skip_baseline,
            filter,
            clean,
        } => {
            let project = Project::open(&projects_dir, &name)?;
            if clean {
                project.reset_workspaces()?;
            }

            let mut set = load_mutants(&config, &project, &mutants)?;
            if let Some(pattern) = filter {
                set.retain_matching(&pattern);
                tracing::info!("{} mutants match '{}'", set.len(), pattern);
            }
            if set.is_empty() {
                tracing::warn!("No mutants to run");
            }
            let ids = set.ids();

            let runner = build_runner(&config, &project, workers);
            stop_on_ctrl_c(&runner);

            let report = if skip_baseline {
                runner.run_mutants(set).await?
            } else {
                let (_, report) = runner.run_all(set).await?;
                report
            };

            if runner.handle().is_stopped() {
                print_batch_report(&report);
                anyhow::bail!("Run cancelled before all mutants finished");
            }

            let summary = load_summary(&config, &project, Some(&ids))?;
            print_batch_report(&report);
            println!();
            print!(
                "{}",
                SummaryReport {
                    project: &project.name,
                    summary: &summary,
                }
            );
        }
        Commands::Summary {
            name,
            mutants,
            output,
        } => {
            let project = Project::open(&projects_dir, &name)?;
            let ids = mutants
                .map(|path| load_mutants(&config, &project, &path).map(|set| set.ids()))
                .transpose()?;
            let summary = load_summary(&config, &project, ids.as_deref())?;
            let json =
                serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?;

            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    tracing::info!("Summary written to {}", path.display());
                }
                None => println!("{}", json),
            }
        }
        Commands::Report { name, mutants } => {
            let project = Project::open(&projects_dir, &name)?;
            let ids = mutants
                .map(|path| load_mutants(&config, &project, &path).map(|set| set.ids()))
                .transpose()?;
            let summary = load_summary(&config, &project, ids.as_deref())?;
            print!(
                "{}",
                SummaryReport {
                    project: &project.name,
                    summary: &summary,
                }
            );
        }
        Commands::Results { name, run } => {
            let project = Project::open(&projects_dir, &name)?;
            let store = project.store();
            match run {
                Some(run_id) => {
                    let result = store
                        .load(&run_id)?
                        .with_context(|| format!("No stored run '{}'", run_id))?;
                    print!(
                        "{}",
                        RunDetail {
                            run_id: &run_id,
                            run: &result,
                        }
                    );
                    if run_id != mutation::BASELINE_RUN_ID {
                        match classify(&run_id, &store.load_all()?) {
                            Ok(status) => println!("\nStatus: {}", status),
                            Err(e) => tracing::warn!("Cannot classify {}: {}", run_id, e),
                        }
                    }
                }
                None => print!("{}", RunListing(&store.load_all()?)),
            }
        }
        Commands::Config { write } => {
            if write {
                config.save(cli.config.as_deref())?;
                if let Some(path) = &config_path {
                    println!("Configuration written to {}", path.display());
                }
            } else {
                print!(
                    "{}",
                    toml::to_string_pretty(&config).context("Failed to serialize config")?
                );
            }
        }
    }

    Ok(())
}

fn build_runner(config: &Config, project: &Project, workers: Option<usize>) -> MutationRunner {
    let pipeline = Pipeline::new(
        config.toolchain.clone(),
        config.execution.max_error_bytes,
        project.store(),
    );
    let options = RunnerOptions {
        workers: workers.unwrap_or_else(|| config.execution.effective_workers()),
        keep_workspaces: config.execution.keep_workspaces,
    };
    MutationRunner::new(pipeline, project.workspaces(), project.test_dir(), options)
}

fn stop_on_ctrl_c(runner: &MutationRunner) {
    let handle = runner.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.stop();
        }
    });
}

fn load_mutants(config: &Config, project: &Project, path: &Path) -> Result<MutantSet> {
    let language = JavaLanguage::new(
        config.toolchain.source_extension.clone(),
        config.toolchain.test_suffix.clone(),
    );
    let set = load_batches(path, &project.source_dir(), &language)
        .with_context(|| format!("Failed to load mutants from {}", path.display()))?;
    tracing::info!("Loaded {} mutants from {}", set.len(), path.display());
    Ok(set)
}

fn load_summary(
    config: &Config,
    project: &Project,
    mutant_ids: Option<&[String]>,
) -> Result<MutationSummary> {
    let runs = project.store().load_all()?;
    let policy = ScorePolicy {
        trivial_counts_as_killed: config.scoring.trivial_counts_as_killed,
    };
    let summary = match mutant_ids {
        Some(ids) => summarize_expected(&runs, ids, policy),
        None => summarize(&runs, policy),
    };
    summary.with_context(|| format!("Cannot summarize project '{}'", project.name))
}

fn print_batch_report(report: &BatchReport) {
    println!(
        "Executed {} mutants ({} without workspace, {} cancelled)",
        report.executed, report.workspace_failures, report.cancelled
    );
}
