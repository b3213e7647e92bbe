//! folio CLI
//!
//! Local execution entry point: validate crawl plans and run them against
//! live sites, writing the assembled book as JSON.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use folio::{
    error::{AppError, Result},
    fetch::{FetchConfig, HttpFetcher},
    models::Plan,
    planner::QueryPlan,
};

/// folio - declarative page crawler
#[derive(Parser, Debug)]
#[command(name = "folio", version, about = "Plan-driven page crawler")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a plan and write the resulting book as JSON
    Run {
        /// Path to the plan file (.toml or .json)
        plan: PathBuf,

        /// Plan parameter, KEY=VALUE (repeatable)
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Output file (default: <title>.json next to the plan)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse and validate a plan file without fetching anything
    Check {
        /// Path to the plan file (.toml or .json)
        plan: PathBuf,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Split repeated `KEY=VALUE` arguments into a parameter map.
fn parse_params(raw: &[String]) -> Result<HashMap<String, String>> {
    let mut params = HashMap::new();
    for entry in raw {
        let Some((key, value)) = entry.split_once('=') else {
            return Err(AppError::validation(format!(
                "invalid parameter \"{entry}\", expected KEY=VALUE"
            )));
        };
        params.insert(key.trim().to_string(), value.to_string());
    }
    Ok(params)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Run {
            plan,
            params,
            output,
        } => {
            let parsed = Plan::load(&plan)?;
            log::info!("Loaded plan \"{}\" from {}", parsed.title, plan.display());

            let fetch_config = FetchConfig::default().for_plan(&parsed);
            let fetcher = Arc::new(HttpFetcher::new(&fetch_config)?);

            let mut engine = QueryPlan::new(parsed, fetcher);
            engine.bind(parse_params(&params)?)?;

            let mut failures = 0usize;
            let mut on_target = |url: &str, error: Option<&AppError>| {
                if let Some(error) = error {
                    failures += 1;
                    log::warn!("candidate failed: {url}: {error}");
                }
            };
            let book = engine.run(Some(&mut on_target)).await?;

            log::info!(
                "Collected {} pages in {} chapters ({} failed candidates)",
                book.page_count(),
                book.chapters.len(),
                failures
            );

            let output = output.unwrap_or_else(|| {
                plan.with_file_name(format!("{}.json", book.title))
            });
            let json = serde_json::to_string_pretty(&book)?;
            std::fs::write(&output, json)?;
            log::info!("Book saved to {}", output.display());
        }

        Command::Check { plan } => {
            log::info!("Validating {}", plan.display());
            let parsed = Plan::load(&plan)?;
            log::info!(
                "✓ Plan OK: \"{}\", {} target(s){}",
                parsed.title,
                parsed.targets.len(),
                if parsed.iterate.is_some() {
                    ", iterating"
                } else {
                    ""
                }
            );
        }
    }

    Ok(())
}
