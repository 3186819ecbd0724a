use chrono::{Days, NaiveDate};
use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use portfolio_optimizer_core::data::{DateRange, InMemoryPriceProvider, RangePreset};
use portfolio_optimizer_core::estimation::PriceSeries;
use portfolio_optimizer_core::optimization::FrontierSpec;
use portfolio_optimizer_core::{optimize_from_prices, PortfolioRequest};

use crate::commands::sectors::load_sector_table;
use crate::input;

#[derive(Args)]
pub struct OptimizeArgs {
    /// Request document (JSON or YAML); read from stdin when omitted
    #[arg(long)]
    pub input: Option<String>,

    /// Wide closing-price CSV: date,TICKER1,TICKER2,...
    #[arg(long)]
    pub prices: String,

    /// First date of the estimation window (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// End of the estimation window, exclusive (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Trailing window ending after the last price row: 6m, 1y, 2y or 5y
    #[arg(long, conflicts_with_all = ["start", "end"])]
    pub range: Option<RangePreset>,

    /// Also sweep the efficient frontier (0% to 60%, 500 targets unless the request says otherwise)
    #[arg(long)]
    pub frontier: bool,

    /// Number of frontier targets; implies --frontier
    #[arg(long)]
    pub frontier_points: Option<usize>,

    /// Annual risk-free rate in percent, overriding the request
    #[arg(long, allow_hyphen_values = true)]
    pub risk_free_rate: Option<Decimal>,

    /// Solver iteration cap, overriding the request
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Ticker -> sector map (JSON or YAML); defaults to the Nifty 50 table
    #[arg(long)]
    pub sectors: Option<String>,
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request: PortfolioRequest = if let Some(ref path) = args.input {
        input::file::read_document(path)?
    } else if let Some(req) = input::stdin::read_stdin()? {
        req
    } else {
        return Err("--input <request.json> or stdin required for optimize".into());
    };
    apply_overrides(&mut request, &args);

    let series = input::prices::read_prices_csv(&args.prices)?;
    let window = resolve_window(&series, args.start, args.end, args.range)?;
    let provider = InMemoryPriceProvider::new(series);
    let sectors = load_sector_table(args.sectors.as_deref())?;

    tracing::info!(
        assets = request.assets.len(),
        method = ?request.method,
        window = %window,
        "optimizing portfolio"
    );
    let result = optimize_from_prices(&request, &provider, &window, &sectors)?;
    Ok(serde_json::to_value(result)?)
}

fn apply_overrides(request: &mut PortfolioRequest, args: &OptimizeArgs) {
    if let Some(rate) = args.risk_free_rate {
        request.risk_free_rate_pct = rate;
    }
    if let Some(cap) = args.max_iterations {
        request.settings.max_iterations = cap;
    }
    if args.frontier || args.frontier_points.is_some() {
        let mut spec = request.frontier.unwrap_or_default();
        if let Some(points) = args.frontier_points {
            spec.points = points;
        }
        request.frontier = Some(spec);
    }
}

/// Estimation window from the flags. Without an explicit end the window
/// closes the day after the last price row; without a start it opens at the
/// first row.
pub fn resolve_window(
    series: &PriceSeries,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    range: Option<RangePreset>,
) -> Result<DateRange, Box<dyn std::error::Error>> {
    let (Some(first), Some(last)) = (series.dates().first(), series.dates().last()) else {
        return Err("price file has no rows".into());
    };
    let end = match end {
        Some(end) => end,
        None => last
            .checked_add_days(Days::new(1))
            .ok_or("last price date is out of range")?,
    };
    let window = match range {
        Some(preset) => preset.resolve(end)?,
        None => DateRange::new(start.unwrap_or(*first), end)?,
    };
    Ok(window)
}
