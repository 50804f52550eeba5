use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use proptune::config::Config;
use proptune::harness::{CargoRunner, CommandRunner, Runner};
use proptune::oracle::{NoOracle, Oracle, OracleClient};
use proptune::refine::RefineOutcome;
use proptune::repo_config::RepoConfig;
use proptune::session::{Session, SessionOptions, TestScore};

#[derive(Parser)]
#[command(name = "proptune")]
#[command(version)]
#[command(about = "Tighten or loosen property-based tests against random mutants")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Seed for mutant generation and sampling
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Revise a test until it kills enough mutants
    Tighten(RefineArgs),
    /// Revise a test until it lets enough mutants through
    Generalize(RefineArgs),
    /// Score every property test in a project
    Analyze {
        repo: PathBuf,
        #[arg(long)]
        mutants: Option<usize>,
        /// Print a JSON array instead of text
        #[arg(long)]
        json: bool,
    },
    /// Score one property test
    Score {
        repo: PathBuf,
        test: String,
        #[arg(long)]
        mutants: Option<usize>,
    },
    /// List the property tests of a project
    List { repo: PathBuf },
}

#[derive(Args)]
struct RefineArgs {
    repo: PathBuf,
    test: String,
    /// Target kill ratio; defaults to the configured threshold
    #[arg(long)]
    threshold: Option<f64>,
    #[arg(long)]
    mutants: Option<usize>,
    #[arg(long)]
    max_iters: Option<usize>,
    /// Write the accepted test here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    // Initialize logging
    let level = if cli.verbose {
        "debug"
    } else {
        config.general.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let seed = cli.seed.or(config.general.seed);
    let mut options = SessionOptions::from(&config.refine);

    match cli.command {
        Commands::Tighten(args) => {
            let threshold = args.threshold.unwrap_or(config.refine.tighten_threshold);
            check_threshold(threshold)?;
            apply_overrides(&mut options, args.mutants, args.max_iters);
            let mut session = refine_session(&config, &args.repo, options, seed)?;
            let outcome = session
                .tighten(&args.repo, &args.test, threshold)
                .await
                .with_context(|| format!("Failed to tighten {}", args.test))?;
            report_refinement(outcome, args.output.as_deref())
        }
        Commands::Generalize(args) => {
            let threshold = args
                .threshold
                .unwrap_or(config.refine.generalize_threshold);
            check_threshold(threshold)?;
            apply_overrides(&mut options, args.mutants, args.max_iters);
            let mut session = refine_session(&config, &args.repo, options, seed)?;
            let outcome = session
                .generalize(&args.repo, &args.test, threshold)
                .await
                .with_context(|| format!("Failed to generalize {}", args.test))?;
            report_refinement(outcome, args.output.as_deref())
        }
        Commands::Analyze {
            repo,
            mutants,
            json,
        } => {
            apply_overrides(&mut options, mutants, None);
            let mut session = build_session(NoOracle, &config, &repo, options, seed);
            let scores = session
                .analyze_all(&repo)
                .await
                .with_context(|| format!("Failed to analyze {}", repo.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&scores)?);
            } else {
                for score in &scores {
                    print_score(score);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Score {
            repo,
            test,
            mutants,
        } => {
            apply_overrides(&mut options, mutants, None);
            let mut session = build_session(NoOracle, &config, &repo, options, seed);
            let score = session
                .analyze_one(&repo, &test)
                .await
                .with_context(|| format!("Failed to score {}", test))?;
            print_score(&score);
            Ok(ExitCode::SUCCESS)
        }
        Commands::List { repo } => {
            let session = build_session(NoOracle, &config, &repo, options, seed);
            for name in session.list_tests(&repo)? {
                println!("{}", name);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn check_threshold(threshold: f64) -> anyhow::Result<()> {
    anyhow::ensure!(
        (0.0..=1.0).contains(&threshold),
        "threshold must be between 0 and 1, got {}",
        threshold
    );
    Ok(())
}

fn apply_overrides(options: &mut SessionOptions, mutants: Option<usize>, max_iters: Option<usize>) {
    if let Some(count) = mutants {
        options.mutant_count = count.max(1);
    }
    if let Some(iters) = max_iters {
        options.max_iters = iters;
    }
}

fn refine_session(
    config: &Config,
    repo: &Path,
    options: SessionOptions,
    seed: Option<u64>,
) -> anyhow::Result<Session<OracleClient, Runner>> {
    let oracle =
        OracleClient::from_config(&config.oracle).context("Failed to set up the oracle")?;
    Ok(build_session(oracle, config, repo, options, seed))
}

fn build_session<O: Oracle>(
    oracle: O,
    config: &Config,
    repo: &Path,
    options: SessionOptions,
    seed: Option<u64>,
) -> Session<O, Runner> {
    let runner = build_runner(config, &RepoConfig::load_or_default(repo));
    Session::new(oracle, runner, options, seed)
}

/// A repo-level `test_command` replaces `cargo test`.
fn build_runner(config: &Config, repo: &RepoConfig) -> Runner {
    let timeout = Duration::from_secs(
        repo.timeout_seconds
            .unwrap_or(config.runner.timeout_seconds),
    );
    match &repo.test_command {
        Some(template) => {
            tracing::debug!("Using test command: {}", template);
            Runner::Command(CommandRunner::new(template.clone(), timeout))
        }
        None => Runner::Cargo(CargoRunner {
            timeout,
            cargo_args: config.runner.cargo_args.clone(),
        }),
    }
}

fn print_score(score: &TestScore) {
    println!(
        "{} at {} scored {:.0}%",
        score.name,
        score.unit.display(),
        score.kill_ratio * 100.0
    );
}

fn report_refinement(outcome: RefineOutcome, output: Option<&Path>) -> anyhow::Result<ExitCode> {
    match outcome {
        RefineOutcome::Converged(test) => {
            if !test.revised {
                tracing::info!(
                    "{} already meets the threshold ({:.0}%)",
                    test.name,
                    test.kill_ratio * 100.0
                );
            }
            match output {
                Some(path) => {
                    std::fs::write(path, &test.body)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    tracing::info!("Wrote {} to {}", test.name, path.display());
                }
                None => print!("{}", test.body),
            }
            Ok(ExitCode::SUCCESS)
        }
        RefineOutcome::Exhausted {
            kill_ratio,
            oracle_calls,
        } => {
            eprintln!(
                "No revision met the threshold after {} oracle call(s); kill ratio stays at {:.0}%. Keeping the original test.",
                oracle_calls,
                kill_ratio * 100.0
            );
            Ok(ExitCode::from(2))
        }
    }
}
