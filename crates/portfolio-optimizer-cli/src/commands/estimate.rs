use chrono::NaiveDate;
use clap::Args;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;

use portfolio_optimizer_core::data::{InMemoryPriceProvider, PriceProvider, RangePreset};
use portfolio_optimizer_core::estimation::estimate_statistics;
use portfolio_optimizer_core::{with_metadata, TRADING_DAYS_PER_YEAR};

use crate::commands::optimize::resolve_window;
use crate::input;

/// Fewer aligned returns than this get a warning.
const SHORT_SAMPLE: usize = 60;

#[derive(Args)]
pub struct EstimateArgs {
    /// Wide closing-price CSV: date,TICKER1,TICKER2,...
    #[arg(long)]
    pub prices: String,

    /// Comma-separated tickers to estimate (default: every column)
    #[arg(long, value_delimiter = ',')]
    pub tickers: Option<Vec<String>>,

    #[arg(long)]
    pub start: Option<NaiveDate>,

    #[arg(long)]
    pub end: Option<NaiveDate>,

    #[arg(long, conflicts_with_all = ["start", "end"])]
    pub range: Option<RangePreset>,
}

#[derive(Debug, Serialize)]
struct AssetEstimate {
    ticker: String,
    expected_return: f64,
    volatility: f64,
}

#[derive(Debug, Serialize)]
struct EstimateOutput {
    assets: Vec<AssetEstimate>,
    covariance: Vec<Vec<f64>>,
    correlation: Vec<Vec<f64>>,
    observations: usize,
}

pub fn run_estimate(args: EstimateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let series = input::prices::read_prices_csv(&args.prices)?;
    let window = resolve_window(&series, args.start, args.end, args.range)?;
    let tickers = args
        .tickers
        .unwrap_or_else(|| series.tickers().to_vec());
    let provider = InMemoryPriceProvider::new(series);

    let est = estimate_statistics(&provider.closing_prices(&tickers, &window)?)?;

    let mut warnings = Vec::new();
    if est.observations < SHORT_SAMPLE {
        warnings.push(format!(
            "Only {} aligned daily returns; estimates are noisy",
            est.observations
        ));
    }

    let output = EstimateOutput {
        assets: (0..est.len())
            .map(|i| AssetEstimate {
                ticker: est.tickers[i].clone(),
                expected_return: est.expected_returns[i],
                volatility: est.asset_volatility(i),
            })
            .collect(),
        correlation: est.correlation_matrix(),
        covariance: est.covariance,
        observations: est.observations,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    let result = with_metadata(
        "Annualised sample mean and covariance of simple daily returns",
        &serde_json::json!({
            "annualization_factor": TRADING_DAYS_PER_YEAR,
            "window_start": window.start,
            "window_end_exclusive": window.end,
        }),
        warnings,
        elapsed,
        output,
    );
    Ok(serde_json::to_value(result)?)
}
