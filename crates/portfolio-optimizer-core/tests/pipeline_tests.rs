use chrono::{Days, NaiveDate};
use portfolio_optimizer_core::data::{
    nifty50, DateRange, InMemoryPriceProvider, PriceProvider, RangePreset, SectorProvider,
};
use portfolio_optimizer_core::estimation::{estimate_statistics, PriceSeries};
use portfolio_optimizer_core::request::{AssetSpec, Method, SectorBoundSpec};
use portfolio_optimizer_core::{optimize_from_prices, ErrorCategory, OptimizerError, PortfolioRequest};
use rust_decimal_macros::dec;

// ===========================================================================
// Price pipeline: provider -> estimator -> optimizer
// ===========================================================================

const TICKERS: [&str; 4] = ["INFY.NS", "TCS.NS", "HDFCBANK.NS", "ITC.NS"];

fn day(offset: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .checked_add_days(Days::new(offset))
        .unwrap()
}

/// Deterministic wiggly price paths with distinct drifts.
fn synthetic_series(rows: usize) -> PriceSeries {
    let tickers: Vec<String> = TICKERS.iter().map(|t| t.to_string()).collect();
    let mut closes = Vec::with_capacity(rows);
    let mut level = [100.0, 250.0, 80.0, 40.0];
    for t in 0..rows {
        if t > 0 {
            for (j, p) in level.iter_mut().enumerate() {
                let drift = 0.0002 * (j as f64 + 1.0);
                let shock = 0.012 * ((t as f64) * (0.37 + 0.21 * j as f64) + j as f64).sin();
                *p *= 1.0 + drift + shock;
            }
        }
        closes.push(level.iter().map(|p| Some(*p)).collect());
    }
    let dates = (0..rows as u64).map(day).collect();
    PriceSeries::new(tickers, dates, closes).unwrap()
}

fn request(method: Method) -> PortfolioRequest {
    PortfolioRequest::new(TICKERS.iter().map(|t| AssetSpec::new(*t)).collect(), method)
}

fn full_range() -> DateRange {
    DateRange::new(day(0), day(400)).unwrap()
}

// ---------------------------------------------------------------------------
// Estimation through the provider
// ---------------------------------------------------------------------------

#[test]
fn test_provider_window_feeds_estimator() {
    let provider = InMemoryPriceProvider::new(synthetic_series(300));
    let tickers: Vec<String> = TICKERS.iter().map(|t| t.to_string()).collect();
    let window = provider
        .closing_prices(&tickers, &DateRange::new(day(100), day(200)).unwrap())
        .unwrap();
    assert_eq!(window.len(), 100);

    let est = estimate_statistics(&window).unwrap();
    assert_eq!(est.observations, 99);
    for i in 0..est.len() {
        assert!(est.covariance[i][i] > 0.0);
        for j in 0..est.len() {
            assert!((est.covariance[i][j] - est.covariance[j][i]).abs() < 1e-15);
        }
    }
}

#[test]
fn test_preset_window_from_today() {
    let provider = InMemoryPriceProvider::new(synthetic_series(400));
    let range = RangePreset::SixMonths.resolve(day(399)).unwrap();
    let tickers: Vec<String> = TICKERS.iter().map(|t| t.to_string()).collect();
    let window = provider.closing_prices(&tickers, &range).unwrap();
    assert_eq!(window.len(), 180);
}

// ---------------------------------------------------------------------------
// Full optimisation
// ---------------------------------------------------------------------------

#[test]
fn test_nifty_sectors_drive_constraints() {
    let provider = InMemoryPriceProvider::new(synthetic_series(250));
    let table = nifty50::sector_table();
    let mut req = request(Method::MaxSharpe);
    req.sector_bounds.insert(
        "Technology".into(),
        SectorBoundSpec {
            min_pct: dec!(20),
            max_pct: dec!(40),
        },
    );

    let out = optimize_from_prices(&req, &provider, &full_range(), &table).unwrap();
    let tech = out.result.sector_allocation["Technology"];
    assert!((0.20 - 1e-6..=0.40 + 1e-6).contains(&tech), "Technology at {}", tech);
    assert_eq!(out.result.diagnostics.observations, 249);
    assert_eq!(out.result.weights[3].sector, table.sector_of("ITC.NS").unwrap());
}

#[test]
fn test_every_method_runs_on_real_shaped_data() {
    let provider = InMemoryPriceProvider::new(synthetic_series(250));
    let table = nifty50::sector_table();
    for method in [Method::MaxSharpe, Method::MinVolatility] {
        let out = optimize_from_prices(&request(method), &provider, &full_range(), &table).unwrap();
        let total: f64 = out.result.weights.iter().map(|w| w.weight).sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert!(out.result.weights.iter().all(|w| w.weight >= -1e-9));
    }
}

// ---------------------------------------------------------------------------
// Data failures
// ---------------------------------------------------------------------------

#[test]
fn test_unknown_ticker_is_no_data() {
    let provider = InMemoryPriceProvider::new(synthetic_series(50));
    let mut req = request(Method::MinVolatility);
    req.assets.push(AssetSpec::new("NOPE.NS"));
    let err = optimize_from_prices(&req, &provider, &full_range(), &nifty50::sector_table())
        .unwrap_err();
    assert!(matches!(err, OptimizerError::InsufficientData(ref msg) if msg.contains("NOPE.NS")));
    assert_eq!(err.category(), ErrorCategory::NoData);
}

#[test]
fn test_two_price_rows_are_not_enough() {
    let provider = InMemoryPriceProvider::new(synthetic_series(2));
    let err = optimize_from_prices(
        &request(Method::MinVolatility),
        &provider,
        &full_range(),
        &nifty50::sector_table(),
    )
    .unwrap_err();
    assert!(matches!(err, OptimizerError::InsufficientData(_)));
}

#[test]
fn test_missing_rows_dropped_before_estimating() {
    let full = synthetic_series(40);
    let mut rows: Vec<Vec<Option<f64>>> = full.rows().to_vec();
    rows[10][1] = None;
    rows[20][3] = None;
    let gappy = PriceSeries::new(full.tickers().to_vec(), full.dates().to_vec(), rows).unwrap();
    let est = estimate_statistics(&gappy).unwrap();
    // 38 aligned rows -> 37 returns
    assert_eq!(est.observations, 37);
}
