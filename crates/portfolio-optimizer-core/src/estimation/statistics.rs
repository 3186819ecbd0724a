use serde::{Deserialize, Serialize};

use crate::error::OptimizerError;
use crate::estimation::series::PriceSeries;
use crate::types::TRADING_DAYS_PER_YEAR;
use crate::OptimizerResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Annualised expected returns and covariance estimated from one aligned
/// return sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEstimates {
    /// Asset identifiers, in the order of every vector and matrix below.
    pub tickers: Vec<String>,
    /// Annualised mean simple return per asset.
    pub expected_returns: Vec<f64>,
    /// N x N annualised sample covariance.
    pub covariance: Vec<Vec<f64>>,
    /// Number of daily returns the estimates were computed from.
    pub observations: usize,
}

impl MarketEstimates {
    /// Wrap externally supplied estimates, checking dimensions and symmetry.
    pub fn new(
        tickers: Vec<String>,
        expected_returns: Vec<f64>,
        covariance: Vec<Vec<f64>>,
    ) -> OptimizerResult<Self> {
        let n = tickers.len();
        if n == 0 {
            return Err(OptimizerError::InsufficientData(
                "At least one asset required".into(),
            ));
        }
        if expected_returns.len() != n {
            return Err(OptimizerError::InvalidInput {
                field: "expected_returns".into(),
                reason: format!("Expected {} returns but got {}", n, expected_returns.len()),
            });
        }
        validate_covariance_matrix(&covariance, n)?;
        if expected_returns.iter().any(|r| !r.is_finite()) {
            return Err(OptimizerError::NumericalInstability {
                context: "expected_returns contains a non-finite value".into(),
            });
        }

        Ok(Self {
            tickers,
            expected_returns,
            covariance,
            observations: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    /// Annualised volatility of asset `i` on its own.
    pub fn asset_volatility(&self, i: usize) -> f64 {
        self.covariance[i][i].max(0.0).sqrt()
    }

    pub fn correlation_matrix(&self) -> Vec<Vec<f64>> {
        let n = self.len();
        let vols: Vec<f64> = (0..n).map(|i| self.asset_volatility(i)).collect();
        (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        if i == j {
                            1.0
                        } else if vols[i] == 0.0 || vols[j] == 0.0 {
                            0.0
                        } else {
                            self.covariance[i][j] / (vols[i] * vols[j])
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Estimate annualised expected returns and covariance from closing prices.
///
/// Rows where any ticker is missing are dropped first, so both estimates
/// come from the same simultaneously-aligned return sample.
pub fn estimate_statistics(prices: &PriceSeries) -> OptimizerResult<MarketEstimates> {
    if prices.tickers().is_empty() {
        return Err(OptimizerError::InsufficientData(
            "Price series has no tickers".into(),
        ));
    }

    let missing = prices.empty_columns();
    if !missing.is_empty() {
        return Err(OptimizerError::InsufficientData(format!(
            "No price data for: {}",
            missing.join(", ")
        )));
    }

    let aligned = prices.aligned();
    let returns = simple_returns(&aligned);
    if returns.len() < 2 {
        return Err(OptimizerError::InsufficientData(format!(
            "Need at least 2 aligned daily returns, got {} ({} aligned of {} price rows)",
            returns.len(),
            aligned.len(),
            prices.len()
        )));
    }

    let n = prices.tickers().len();
    let m = returns.len() as f64;

    let mean: Vec<f64> = (0..n)
        .map(|j| returns.iter().map(|r| r[j]).sum::<f64>() / m)
        .collect();

    let mut covariance = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let s: f64 = returns
                .iter()
                .map(|r| (r[i] - mean[i]) * (r[j] - mean[j]))
                .sum();
            let c = s / (m - 1.0) * TRADING_DAYS_PER_YEAR;
            covariance[i][j] = c;
            covariance[j][i] = c;
        }
    }

    let expected_returns: Vec<f64> = mean.iter().map(|r| r * TRADING_DAYS_PER_YEAR).collect();

    tracing::debug!(
        assets = n,
        observations = returns.len(),
        dropped_rows = prices.len() - aligned.len(),
        "estimated market statistics"
    );

    Ok(MarketEstimates {
        tickers: prices.tickers().to_vec(),
        expected_returns,
        covariance,
        observations: returns.len(),
    })
}

/// Period-over-period simple returns of a fully aligned series. The first
/// row has no predecessor and yields no return.
fn simple_returns(aligned: &PriceSeries) -> Vec<Vec<f64>> {
    aligned
        .rows()
        .windows(2)
        .map(|pair| {
            pair[0]
                .iter()
                .zip(pair[1].iter())
                .map(|(prev, cur)| match (prev, cur) {
                    (Some(p0), Some(p1)) => (p1 - p0) / p0,
                    _ => f64::NAN,
                })
                .collect()
        })
        .collect()
}

#[allow(clippy::needless_range_loop)]
pub(crate) fn validate_covariance_matrix(cov: &[Vec<f64>], n: usize) -> OptimizerResult<()> {
    if cov.len() != n {
        return Err(OptimizerError::InvalidInput {
            field: "covariance".into(),
            reason: format!("Expected {}x{} matrix but got {} rows", n, n, cov.len()),
        });
    }
    for (i, row) in cov.iter().enumerate() {
        if row.len() != n {
            return Err(OptimizerError::InvalidInput {
                field: "covariance".into(),
                reason: format!("Row {} has {} columns, expected {}", i, row.len(), n),
            });
        }
        if row.iter().any(|c| !c.is_finite()) {
            return Err(OptimizerError::NumericalInstability {
                context: format!("covariance row {} contains a non-finite value", i),
            });
        }
        if row[i] < 0.0 {
            return Err(OptimizerError::InvalidInput {
                field: "covariance".into(),
                reason: format!("Negative variance on diagonal [{},{}]", i, i),
            });
        }
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let scale = cov[i][j].abs().max(cov[j][i].abs()).max(1.0);
            if (cov[i][j] - cov[j][i]).abs() > 1e-9 * scale {
                return Err(OptimizerError::InvalidInput {
                    field: "covariance".into(),
                    reason: format!(
                        "Not symmetric: [{},{}]={} != [{},{}]={}",
                        i, j, cov[i][j], j, i, cov[j][i]
                    ),
                });
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn series(closes: Vec<Vec<Option<f64>>>) -> PriceSeries {
        let dates = (0..closes.len()).map(|i| d(i as u32 + 1)).collect();
        PriceSeries::new(vec!["AAA".into(), "BBB".into()], dates, closes).unwrap()
    }

    // ------------------------------------------------------------------
    // 1. Mean and covariance on a hand-computed sample
    // ------------------------------------------------------------------
    #[test]
    fn test_hand_computed_estimates() {
        // AAA returns: +10%, -10%; BBB returns: +5%, +5%
        let prices = series(vec![
            vec![Some(100.0), Some(100.0)],
            vec![Some(110.0), Some(105.0)],
            vec![Some(99.0), Some(110.25)],
        ]);
        let est = estimate_statistics(&prices).unwrap();

        assert_eq!(est.observations, 2);
        assert!(est.expected_returns[0].abs() < 1e-12);
        assert!((est.expected_returns[1] - 0.05 * 252.0).abs() < 1e-9);

        // Sample variance of [0.1, -0.1] = 0.02
        assert!((est.covariance[0][0] - 0.02 * 252.0).abs() < 1e-9);
        assert!(est.covariance[1][1].abs() < 1e-12);
        assert!(est.covariance[0][1].abs() < 1e-12);
    }

    // ------------------------------------------------------------------
    // 2. Gaps are dropped across all tickers
    // ------------------------------------------------------------------
    #[test]
    fn test_gap_rows_excluded_for_every_ticker() {
        let with_gap = series(vec![
            vec![Some(100.0), Some(50.0)],
            vec![Some(300.0), None],
            vec![Some(102.0), Some(51.0)],
            vec![Some(101.0), Some(52.0)],
        ]);
        let without = series(vec![
            vec![Some(100.0), Some(50.0)],
            vec![Some(102.0), Some(51.0)],
            vec![Some(101.0), Some(52.0)],
        ]);
        let a = estimate_statistics(&with_gap).unwrap();
        let b = estimate_statistics(&without).unwrap();
        assert_eq!(a.expected_returns, b.expected_returns);
        assert_eq!(a.covariance, b.covariance);
    }

    // ------------------------------------------------------------------
    // 3. Insufficient data
    // ------------------------------------------------------------------
    #[test]
    fn test_all_missing_column_rejected() {
        let prices = series(vec![
            vec![Some(100.0), None],
            vec![Some(101.0), None],
            vec![Some(102.0), None],
        ]);
        let err = estimate_statistics(&prices).unwrap_err();
        match err {
            OptimizerError::InsufficientData(msg) => assert!(msg.contains("BBB")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_too_few_aligned_rows() {
        let prices = series(vec![
            vec![Some(100.0), Some(10.0)],
            vec![Some(101.0), None],
            vec![Some(102.0), Some(11.0)],
        ]);
        assert!(matches!(
            estimate_statistics(&prices),
            Err(OptimizerError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_empty_series_is_insufficient() {
        let prices = PriceSeries::new(vec!["AAA".into()], vec![], vec![]).unwrap();
        assert!(matches!(
            estimate_statistics(&prices),
            Err(OptimizerError::InsufficientData(_))
        ));
    }

    // ------------------------------------------------------------------
    // 4. Supplied estimates are validated
    // ------------------------------------------------------------------
    #[test]
    fn test_asymmetric_covariance_rejected() {
        let err = MarketEstimates::new(
            vec!["A".into(), "B".into()],
            vec![0.1, 0.2],
            vec![vec![0.04, 0.01], vec![0.02, 0.09]],
        );
        assert!(matches!(err, Err(OptimizerError::InvalidInput { .. })));
    }

    #[test]
    fn test_correlation_matrix() {
        let est = MarketEstimates::new(
            vec!["A".into(), "B".into()],
            vec![0.1, 0.2],
            vec![vec![0.04, 0.012], vec![0.012, 0.09]],
        )
        .unwrap();
        let corr = est.correlation_matrix();
        assert!((corr[0][1] - 0.2).abs() < 1e-12);
        assert!((est.asset_volatility(1) - 0.3).abs() < 1e-12);
    }
}
