use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::OptimizerError;
use crate::OptimizerResult;

/// Closing prices keyed by (date, ticker).
///
/// Rows are dates in strictly increasing order; each row carries one cell per
/// ticker. A `None` cell is a missing observation (non-trading day, listing
/// gap, unknown ticker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPriceSeries")]
pub struct PriceSeries {
    tickers: Vec<String>,
    dates: Vec<NaiveDate>,
    closes: Vec<Vec<Option<f64>>>,
}

#[derive(Deserialize)]
struct RawPriceSeries {
    tickers: Vec<String>,
    dates: Vec<NaiveDate>,
    closes: Vec<Vec<Option<f64>>>,
}

impl TryFrom<RawPriceSeries> for PriceSeries {
    type Error = OptimizerError;

    fn try_from(raw: RawPriceSeries) -> Result<Self, Self::Error> {
        PriceSeries::new(raw.tickers, raw.dates, raw.closes)
    }
}

impl PriceSeries {
    pub fn new(
        tickers: Vec<String>,
        dates: Vec<NaiveDate>,
        closes: Vec<Vec<Option<f64>>>,
    ) -> OptimizerResult<Self> {
        if dates.len() != closes.len() {
            return Err(OptimizerError::InvalidInput {
                field: "closes".into(),
                reason: format!("Expected {} rows but got {}", dates.len(), closes.len()),
            });
        }

        for (i, row) in closes.iter().enumerate() {
            if row.len() != tickers.len() {
                return Err(OptimizerError::InvalidInput {
                    field: format!("closes[{}]", i),
                    reason: format!(
                        "Row has {} prices, expected {}",
                        row.len(),
                        tickers.len()
                    ),
                });
            }
            for (j, cell) in row.iter().enumerate() {
                if let Some(p) = cell {
                    if !p.is_finite() || *p <= 0.0 {
                        return Err(OptimizerError::InvalidInput {
                            field: format!("closes[{}][{}]", i, tickers[j]),
                            reason: format!("Price must be positive and finite, got {}", p),
                        });
                    }
                }
            }
        }

        if let Some(pos) = dates.windows(2).position(|w| w[1] <= w[0]) {
            return Err(OptimizerError::DateError(format!(
                "Dates must be strictly increasing: {} is followed by {}",
                dates[pos],
                dates[pos + 1]
            )));
        }

        Ok(Self {
            tickers,
            dates,
            closes,
        })
    }

    /// Build a series from `(date, ticker, close)` observations. Dates are
    /// sorted; cells without an observation stay missing.
    pub fn from_observations(
        tickers: Vec<String>,
        observations: &[(NaiveDate, String, f64)],
    ) -> OptimizerResult<Self> {
        let mut dates: Vec<NaiveDate> = observations.iter().map(|(d, _, _)| *d).collect();
        dates.sort();
        dates.dedup();

        let mut closes = vec![vec![None; tickers.len()]; dates.len()];
        for (date, ticker, close) in observations {
            let Some(col) = tickers.iter().position(|t| t == ticker) else {
                continue;
            };
            if let Ok(row) = dates.binary_search(date) {
                closes[row][col] = Some(*close);
            }
        }

        Self::new(tickers, dates, closes)
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn rows(&self) -> &[Vec<Option<f64>>] {
        &self.closes
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Tickers whose column has no observation at all.
    pub fn empty_columns(&self) -> Vec<&str> {
        (0..self.tickers.len())
            .filter(|&j| self.closes.iter().all(|row| row[j].is_none()))
            .map(|j| self.tickers[j].as_str())
            .collect()
    }

    /// Keep only the dates on which every ticker traded.
    pub fn aligned(&self) -> PriceSeries {
        let (dates, closes): (Vec<NaiveDate>, Vec<Vec<Option<f64>>>) = self
            .dates
            .iter()
            .zip(self.closes.iter())
            .filter(|(_, row)| row.iter().all(Option::is_some))
            .map(|(d, row)| (*d, row.clone()))
            .unzip();

        PriceSeries {
            tickers: self.tickers.clone(),
            dates,
            closes,
        }
    }

    /// Project onto `tickers` in the given order. Tickers the series does not
    /// carry become all-missing columns.
    pub fn select(&self, tickers: &[String]) -> PriceSeries {
        let cols: Vec<Option<usize>> = tickers
            .iter()
            .map(|t| self.tickers.iter().position(|own| own == t))
            .collect();

        let closes = self
            .closes
            .iter()
            .map(|row| cols.iter().map(|c| c.and_then(|j| row[j])).collect())
            .collect();

        PriceSeries {
            tickers: tickers.to_vec(),
            dates: self.dates.clone(),
            closes,
        }
    }

    /// Rows with `start <= date < end`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> PriceSeries {
        let (dates, closes): (Vec<NaiveDate>, Vec<Vec<Option<f64>>>) = self
            .dates
            .iter()
            .zip(self.closes.iter())
            .filter(|(d, _)| **d >= start && **d < end)
            .map(|(d, row)| (*d, row.clone()))
            .unzip();

        PriceSeries {
            tickers: self.tickers.clone(),
            dates,
            closes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn sample() -> PriceSeries {
        PriceSeries::new(
            vec!["AAA".into(), "BBB".into()],
            vec![d(2), d(3), d(4), d(5)],
            vec![
                vec![Some(10.0), Some(20.0)],
                vec![Some(11.0), None],
                vec![Some(12.0), Some(21.0)],
                vec![None, Some(22.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_aligned_drops_partial_rows() {
        let aligned = sample().aligned();
        assert_eq!(aligned.dates(), &[d(2), d(4)]);
        assert_eq!(aligned.rows()[1], vec![Some(12.0), Some(21.0)]);
    }

    #[test]
    fn test_rejects_unordered_dates() {
        let err = PriceSeries::new(
            vec!["AAA".into()],
            vec![d(3), d(2)],
            vec![vec![Some(1.0)], vec![Some(1.0)]],
        )
        .unwrap_err();
        assert!(matches!(err, OptimizerError::DateError(_)));
    }

    #[test]
    fn test_rejects_non_positive_price() {
        let err = PriceSeries::new(vec!["AAA".into()], vec![d(2)], vec![vec![Some(0.0)]]);
        assert!(matches!(err, Err(OptimizerError::InvalidInput { .. })));
    }

    #[test]
    fn test_select_unknown_ticker_is_empty_column() {
        let sel = sample().select(&["BBB".to_string(), "ZZZ".to_string()]);
        assert_eq!(sel.tickers(), &["BBB".to_string(), "ZZZ".to_string()]);
        assert_eq!(sel.empty_columns(), vec!["ZZZ"]);
        assert_eq!(sel.rows()[0], vec![Some(20.0), None]);
    }

    #[test]
    fn test_between_is_half_open() {
        let sub = sample().between(d(3), d(5));
        assert_eq!(sub.dates(), &[d(3), d(4)]);
    }

    #[test]
    fn test_from_observations_sorts_dates() {
        let obs = vec![
            (d(4), "AAA".to_string(), 12.0),
            (d(2), "AAA".to_string(), 10.0),
            (d(2), "BBB".to_string(), 20.0),
        ];
        let series =
            PriceSeries::from_observations(vec!["AAA".into(), "BBB".into()], &obs).unwrap();
        assert_eq!(series.dates(), &[d(2), d(4)]);
        assert_eq!(series.rows()[1], vec![Some(12.0), None]);
    }
}
