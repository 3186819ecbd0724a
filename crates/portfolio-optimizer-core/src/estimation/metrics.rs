use std::collections::BTreeMap;

use crate::error::OptimizerError;
use crate::linalg::{dot, mat_vec};
use crate::optimization::constraints::SectorGrouping;
use crate::OptimizerResult;

/// Radicands between this and zero are treated as round-off and clamped.
const VARIANCE_ROUNDOFF: f64 = 1e-12;

/// Expected portfolio return: `w · mu`.
pub fn portfolio_return(weights: &[f64], expected_returns: &[f64]) -> f64 {
    dot(weights, expected_returns)
}

/// Portfolio variance: `wᵀ Σ w`.
pub fn portfolio_variance(weights: &[f64], covariance: &[Vec<f64>]) -> f64 {
    dot(weights, &mat_vec(covariance, weights))
}

/// Portfolio volatility: `sqrt(wᵀ Σ w)`.
///
/// A clearly negative radicand means the covariance is not positive
/// semidefinite or the arithmetic broke down; that is reported instead of
/// returning NaN.
pub fn portfolio_volatility(weights: &[f64], covariance: &[Vec<f64>]) -> OptimizerResult<f64> {
    let var = portfolio_variance(weights, covariance);
    if !var.is_finite() || var < -VARIANCE_ROUNDOFF {
        return Err(OptimizerError::NumericalInstability {
            context: format!("portfolio_volatility: variance {} is not a valid radicand", var),
        });
    }
    Ok(var.max(0.0).sqrt())
}

/// Sharpe ratio: `(w·mu - rf) / sqrt(wᵀ Σ w)`.
pub fn sharpe_ratio(
    weights: &[f64],
    expected_returns: &[f64],
    covariance: &[Vec<f64>],
    risk_free_rate: f64,
) -> OptimizerResult<f64> {
    let vol = portfolio_volatility(weights, covariance)?;
    if vol == 0.0 {
        return Err(OptimizerError::DivisionByZero {
            context: "sharpe_ratio: portfolio volatility is zero".into(),
        });
    }
    Ok((portfolio_return(weights, expected_returns) - risk_free_rate) / vol)
}

/// Gradient of the volatility: `Σw / vol`. Zero at zero volatility, where
/// the function is not differentiable.
pub fn volatility_gradient(weights: &[f64], covariance: &[Vec<f64>], vol: f64) -> Vec<f64> {
    if vol == 0.0 {
        return vec![0.0; weights.len()];
    }
    mat_vec(covariance, weights)
        .into_iter()
        .map(|v| v / vol)
        .collect()
}

/// Aggregate weight per sector.
pub fn sector_allocation(weights: &[f64], grouping: &SectorGrouping) -> BTreeMap<String, f64> {
    grouping
        .iter()
        .map(|(sector, indices)| {
            let total: f64 = indices.iter().filter_map(|&i| weights.get(i)).sum();
            (sector.clone(), total)
        })
        .collect()
}

/// Per-asset contribution to volatility: `w_i (Σw)_i / vol`. Sums to vol.
pub fn risk_contributions(weights: &[f64], covariance: &[Vec<f64>], vol: f64) -> Vec<f64> {
    if vol == 0.0 {
        return vec![0.0; weights.len()];
    }
    mat_vec(covariance, weights)
        .iter()
        .zip(weights.iter())
        .map(|(sw, w)| w * sw / vol)
        .collect()
}

/// Herfindahl-Hirschman index of the weights.
pub fn herfindahl_index(weights: &[f64]) -> f64 {
    weights.iter().map(|w| w * w).sum()
}

/// Weighted average of standalone volatilities over portfolio volatility.
pub fn diversification_ratio(weights: &[f64], covariance: &[Vec<f64>], vol: f64) -> f64 {
    if vol == 0.0 {
        return 1.0;
    }
    let weighted: f64 = weights
        .iter()
        .enumerate()
        .map(|(i, w)| w * covariance[i][i].max(0.0).sqrt())
        .sum();
    weighted / vol
}
