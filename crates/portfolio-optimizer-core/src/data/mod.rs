//! Market-data collaborators: where prices and sector labels come from.
//!
//! The engine never fetches anything itself. Callers hand it a
//! [`PriceProvider`] and a [`SectorProvider`]; the in-memory implementations
//! here cover files loaded up front and static reference tables.

pub mod dates;
#[cfg(feature = "nifty50")]
pub mod nifty50;

use std::collections::BTreeMap;

use crate::estimation::PriceSeries;
use crate::optimization::constraints::UNKNOWN_SECTOR;
use crate::OptimizerResult;

pub use dates::{DateRange, RangePreset};

/// Source of daily closing prices.
pub trait PriceProvider {
    /// Closing prices for `tickers` within `range`, columns in the order
    /// requested. Tickers without data come back as all-missing columns.
    fn closing_prices(&self, tickers: &[String], range: &DateRange) -> OptimizerResult<PriceSeries>;
}

/// Source of sector classifications.
pub trait SectorProvider {
    fn sector_of(&self, ticker: &str) -> Option<String>;

    /// Sector per ticker, falling back to `"Unknown"`.
    fn sectors_for(&self, tickers: &[String]) -> Vec<String> {
        tickers
            .iter()
            .map(|t| self.sector_of(t).unwrap_or_else(|| UNKNOWN_SECTOR.to_string()))
            .collect()
    }
}

/// Serves prices from a series already held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryPriceProvider {
    series: PriceSeries,
}

impl InMemoryPriceProvider {
    pub fn new(series: PriceSeries) -> Self {
        Self { series }
    }

    pub fn series(&self) -> &PriceSeries {
        &self.series
    }
}

impl PriceProvider for InMemoryPriceProvider {
    fn closing_prices(&self, tickers: &[String], range: &DateRange) -> OptimizerResult<PriceSeries> {
        let window = self.series.between(range.start, range.end).select(tickers);
        tracing::debug!(
            tickers = tickers.len(),
            rows = window.len(),
            range = %range,
            "served prices from memory"
        );
        Ok(window)
    }
}

/// Ticker -> sector lookup backed by a map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticSectorTable {
    sectors: BTreeMap<String, String>,
}

impl StaticSectorTable {
    pub fn new(sectors: BTreeMap<String, String>) -> Self {
        Self { sectors }
    }

    /// Build from `sector -> [ticker]` lists.
    pub fn from_groups<'a, I, T>(groups: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, T)>,
        T: IntoIterator<Item = &'a str>,
    {
        let sectors = groups
            .into_iter()
            .flat_map(|(sector, tickers)| {
                tickers
                    .into_iter()
                    .map(move |t| (t.to_string(), sector.to_string()))
            })
            .collect();
        Self { sectors }
    }

    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    /// `(ticker, sector)` pairs in ticker order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.sectors.iter().map(|(t, s)| (t.as_str(), s.as_str()))
    }
}

impl SectorProvider for StaticSectorTable {
    fn sector_of(&self, ticker: &str) -> Option<String> {
        self.sectors.get(ticker).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn provider() -> InMemoryPriceProvider {
        let series = PriceSeries::new(
            vec!["AAA".into(), "BBB".into()],
            vec![d(1), d(4), d(5), d(6)],
            vec![
                vec![Some(10.0), Some(20.0)],
                vec![Some(10.5), None],
                vec![Some(10.2), Some(20.4)],
                vec![Some(10.8), Some(20.1)],
            ],
        )
        .unwrap();
        InMemoryPriceProvider::new(series)
    }

    #[test]
    fn test_window_is_half_open_and_reordered() {
        let range = DateRange::new(d(4), d(6)).unwrap();
        let out = provider()
            .closing_prices(&["BBB".into(), "AAA".into()], &range)
            .unwrap();
        assert_eq!(out.dates(), &[d(4), d(5)]);
        assert_eq!(out.tickers(), &["BBB".to_string(), "AAA".to_string()]);
        assert_eq!(out.rows()[1], vec![Some(20.4), Some(10.2)]);
    }

    #[test]
    fn test_unknown_ticker_is_all_missing() {
        let range = DateRange::new(d(1), d(7)).unwrap();
        let out = provider()
            .closing_prices(&["AAA".into(), "ZZZ".into()], &range)
            .unwrap();
        assert_eq!(out.empty_columns(), vec!["ZZZ"]);
    }

    #[test]
    fn test_sector_table_falls_back_to_unknown() {
        let table = StaticSectorTable::from_groups([("Tech", vec!["AAA"]), ("Banks", vec!["BBB"])]);
        assert_eq!(table.sector_of("AAA").as_deref(), Some("Tech"));
        assert_eq!(
            table.sectors_for(&["BBB".into(), "CCC".into()]),
            vec!["Banks".to_string(), UNKNOWN_SECTOR.to_string()]
        );
    }
}
