use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use allure_report::executor::{self, ProcessEnv};
use allure_report::{Executor, FlightMode, ReportConfig, Reporter};

#[derive(Parser)]
#[command(
    name = "allure-report",
    about = "Concurrent Allure report aggregation for BDD test runs",
    version,
    long_about = None
)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an Allure results directory from a JSON-lines event feed
    Replay {
        /// Feed file, or `-` for stdin
        feed: String,

        /// Results directory (overrides config and ALLURE_RESULTS_PATH)
        #[arg(long)]
        results_dir: Option<PathBuf>,

        /// Suite name used for the container and `suite` label
        #[arg(long)]
        suite: Option<String>,

        /// Treat scenarios as strictly sequential
        #[arg(long)]
        single_flight: bool,

        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the executor metadata the environment would produce
    Executor {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Replay {
            feed,
            results_dir,
            suite,
            single_flight,
            config,
        } => {
            let mut cfg = ReportConfig::resolve(config.as_deref())?;
            if let Some(dir) = results_dir {
                cfg.results_path = dir;
            }
            if let Some(suite) = suite {
                cfg.suite = suite;
            }
            if single_flight {
                cfg.mode = FlightMode::Single;
            }
            let cfg = cfg.normalized();

            tracing::info!(%feed, results = %cfg.results_path.display(), "Replaying event feed");

            let summary = tokio::task::spawn_blocking(move || -> Result<_> {
                let reporter = Reporter::new(cfg);
                let summary = if feed == "-" {
                    let stdin = std::io::stdin();
                    allure_report::replay(&reporter, stdin.lock(), &ProcessEnv)?
                } else {
                    let file = std::fs::File::open(&feed)
                        .with_context(|| format!("failed to open feed {feed}"))?;
                    allure_report::replay(&reporter, BufReader::new(file), &ProcessEnv)?
                };
                Ok(summary)
            })
            .await??;

            match summary {
                Some(summary) => {
                    println!("Container: {}", summary.container_id);
                    println!("Results:   {}", summary.results);
                    println!("Executor:  {}", if summary.executor_written { "written" } else { "-" });
                    println!(
                        "Env props: {}",
                        if summary.environment_written { "written" } else { "-" }
                    );
                    if !summary.dropped.is_empty() {
                        println!("Unfinished scenarios (not persisted):");
                        for id in &summary.dropped {
                            println!(" - {}", id);
                        }
                    }
                }
                None => {
                    tracing::warn!("feed ended without run_ended; container not written");
                }
            }
        }
        Commands::Executor { json } => {
            let exec = executor::populate_executor(Executor::default(), &ProcessEnv);
            if json {
                println!("{}", serde_json::to_string_pretty(&exec)?);
            } else if exec.name.is_empty() {
                println!("No executor configured (set {}).", executor::EXECUTOR_NAME);
            } else {
                println!("{:<12} : {}", "Name", exec.name);
                println!("{:<12} : {}", "Type", exec.executor_type);
                println!("{:<12} : {}", "URL", exec.url);
                println!("{:<12} : {}", "Build order", exec.build_order);
                println!("{:<12} : {}", "Build name", exec.build_name);
                println!("{:<12} : {}", "Build URL", exec.build_url);
                println!("{:<12} : {}", "Report name", exec.report_name);
                println!("{:<12} : {}", "Report URL", exec.report_url);
            }
        }
    }

    Ok(())
}
