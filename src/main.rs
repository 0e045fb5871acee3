use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rimutate::ast::load_units;
use rimutate::ast::printer::SourcePrinter;
use rimutate::config::Config;
use rimutate::coverage::CoverageIndex;
use rimutate::engine::{Engine, MutationRun};
use rimutate::mutation::operator::ConstantTable;
use rimutate::mutation::registry::BUILTIN_OPERATORS;
use rimutate::mutation::MutantOutcome;
use rimutate::runner::command::CommandRunner;

#[derive(Parser)]
#[command(name = "rimutate")]
#[command(version)]
#[command(about = "A coverage-guided mutation testing engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project root; `rimutate.toml` here is used when no config is given
    #[arg(short, long, global = true, default_value = ".")]
    project_root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Mutate the given units and run the covering tests against each mutant
    Run {
        /// Directory of syntax tree files (`*.json`) produced by the parser
        #[arg(short, long)]
        units: PathBuf,

        /// Per-line coverage report
        #[arg(long)]
        coverage: PathBuf,

        /// Write the full JSON report here
        #[arg(short, long)]
        report: Option<PathBuf>,
    },
    /// List mutation operators and whether they are enabled
    Operators,
    /// Write a default `rimutate.toml` into the project root
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        let path = Config::init(&cli.project_root)?;
        println!("Wrote {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::discover(cli.config.as_deref(), &cli.project_root)?;

    // Initialize logging; RUST_LOG overrides the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let engine = Engine::new(config, ConstantTable::with_defaults())?;

    match cli.command {
        Commands::Init => Ok(ExitCode::SUCCESS),
        Commands::Operators => {
            let enabled = engine.registry().ids();
            for id in BUILTIN_OPERATORS {
                let state = if enabled.contains(id) { "enabled" } else { "disabled" };
                println!("{:<24}{}", id, state);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            units,
            coverage,
            report,
        } => {
            let units = load_units(&units, &cli.project_root)?;
            let coverage = CoverageIndex::load(&coverage)?;
            tracing::info!(
                units = units.len(),
                covered_files = coverage.file_count(),
                "Inputs loaded"
            );

            let abort = Arc::new(AtomicBool::new(false));
            {
                let abort = abort.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("Interrupted; finishing running mutants");
                        abort.store(true, Ordering::SeqCst);
                    }
                });
            }

            let runner = Arc::new(CommandRunner::from_config(&engine.config().runner));
            let run = engine
                .run(
                    &units,
                    &coverage,
                    &SourcePrinter,
                    runner,
                    &cli.project_root,
                    abort,
                )
                .await?;

            if let Some(path) = report {
                let json = serde_json::to_string_pretty(&run).context("Failed to serialize report")?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write report to {:?}", path))?;
                tracing::info!("Report written to {}", path.display());
            }

            print_summary(&run);

            let unmet = run.metrics.unmet(&engine.config().thresholds);
            for message in &unmet {
                tracing::error!("{}", message);
            }
            if run.aborted || !unmet.is_empty() {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

fn print_summary(run: &MutationRun) {
    for result in &run.results {
        if result.outcome == MutantOutcome::Escaped {
            let location = &result.mutation.location;
            println!(
                "Escaped: {}:{} [{}] {}",
                location.file.display(),
                location.start_line,
                result.mutation.operator,
                result.mutation.description
            );
            print!("{}", result.diff);
        }
    }

    let totals = &run.score.totals;
    println!();
    println!(
        "{} mutants: {} killed, {} escaped, {} timed out, {} errors, {} not covered, {} ignored",
        totals.total(),
        totals.killed,
        totals.escaped,
        totals.timed_out,
        totals.error,
        totals.not_covered,
        totals.ignored
    );
    if run.duplicates > 0 {
        println!("{} duplicate mutants reused an earlier result", run.duplicates);
    }
    println!(
        "MSI: {:.2}%  Covered MSI: {:.2}%  Coverage: {:.2}%",
        run.metrics.msi, run.metrics.covered_msi, run.metrics.coverage_rate
    );
    if run.aborted {
        println!("Run was interrupted; results are incomplete");
    }
}
