mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use portfolio_optimizer_core::{ErrorCategory, OptimizerError};

use commands::estimate::EstimateArgs;
use commands::optimize::OptimizeArgs;
use commands::sectors::SectorsArgs;

const DEFAULT_LOG_FILTER: &str = "popt=warn,portfolio_optimizer_core=warn";
const VERBOSE_LOG_FILTER: &str = "popt=debug,portfolio_optimizer_core=debug";

/// Sector-constrained mean-variance portfolio optimization
#[derive(Parser)]
#[command(
    name = "popt",
    version,
    about = "Sector-constrained mean-variance portfolio optimization",
    long_about = "Estimates annualised returns and covariance from daily closing prices and \
                  solves for long-only allocations under per-asset and per-sector bounds. \
                  Supports maximum Sharpe, minimum volatility, target return and target risk \
                  objectives, plus an efficient-frontier sweep."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log solver progress to stderr (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimise a portfolio request against a price file
    Optimize(OptimizeArgs),
    /// Print annualised expected returns, volatilities and covariance
    Estimate(EstimateArgs),
    /// Print the ticker -> sector classification
    Sectors(SectorsArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            VERBOSE_LOG_FILTER
        } else {
            DEFAULT_LOG_FILTER
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn hint(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::NoData => {
            "check the tickers against the price file and widen the date range"
        }
        ErrorCategory::InfeasibleConstraints => {
            "relax the asset or sector bounds, or pick a reachable target"
        }
        ErrorCategory::NumericalBreakdown => {
            "the covariance estimate is degenerate; use a longer window or drop flat series"
        }
        ErrorCategory::InvalidRequest => "fix the request document and retry",
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Optimize(args) => commands::optimize::run_optimize(args),
        Commands::Estimate(args) => commands::estimate::run_estimate(args),
        Commands::Sectors(args) => commands::sectors::run_sectors(args),
        Commands::Version => {
            println!("popt {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            if let Some(err) = e.downcast_ref::<OptimizerError>() {
                eprintln!("{}: {}", "hint".yellow(), hint(err.category()));
            }
            process::exit(1);
        }
    }
}
