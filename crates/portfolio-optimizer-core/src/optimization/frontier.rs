use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::OptimizerError;
use crate::optimization::driver::{optimize, OptimizationProblem};
use crate::optimization::objectives::Objective;
use crate::OptimizerResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Evenly spaced grid of target returns, endpoints included.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrontierSpec {
    #[serde(default)]
    pub min_return: f64,
    #[serde(default = "default_max_return")]
    pub max_return: f64,
    #[serde(default = "default_points")]
    pub points: usize,
}

fn default_max_return() -> f64 {
    0.60
}

fn default_points() -> usize {
    500
}

impl Default for FrontierSpec {
    fn default() -> Self {
        Self {
            min_return: 0.0,
            max_return: default_max_return(),
            points: default_points(),
        }
    }
}

impl FrontierSpec {
    pub fn validate(&self) -> OptimizerResult<()> {
        if !self.min_return.is_finite() || !self.max_return.is_finite() {
            return Err(OptimizerError::InvalidInput {
                field: "frontier".into(),
                reason: "Return range must be finite".into(),
            });
        }
        if self.min_return > self.max_return {
            return Err(OptimizerError::InvalidInput {
                field: "frontier.min_return".into(),
                reason: format!(
                    "min_return {} > max_return {}",
                    self.min_return, self.max_return
                ),
            });
        }
        if self.points == 0 {
            return Err(OptimizerError::InvalidInput {
                field: "frontier.points".into(),
                reason: "At least one point required".into(),
            });
        }
        Ok(())
    }

    /// The target returns, ascending.
    pub fn targets(&self) -> Vec<f64> {
        if self.points == 1 {
            return vec![self.min_return];
        }
        let step = (self.max_return - self.min_return) / (self.points - 1) as f64;
        (0..self.points)
            .map(|i| self.min_return + step * i as f64)
            .collect()
    }
}

/// A successful target-return solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub target_return: f64,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: Option<f64>,
    pub weights: Vec<f64>,
    pub converged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficientFrontier {
    /// Successful points in target order.
    pub points: Vec<FrontierPoint>,
    /// Number of targets that failed and were left out.
    pub skipped: usize,
    /// Highest Sharpe ratio among `points`.
    pub max_sharpe: Option<FrontierPoint>,
    /// Lowest volatility among `points`.
    pub min_volatility: Option<FrontierPoint>,
}

impl EfficientFrontier {
    fn from_points(points: Vec<FrontierPoint>, requested: usize) -> Self {
        let skipped = requested.saturating_sub(points.len());
        let max_sharpe = points
            .iter()
            .filter(|p| p.sharpe_ratio.is_some())
            .max_by(|a, b| {
                let (sa, sb) = (a.sharpe_ratio.unwrap_or(f64::MIN), b.sharpe_ratio.unwrap_or(f64::MIN));
                sa.total_cmp(&sb)
            })
            .cloned();
        let min_volatility = points
            .iter()
            .min_by(|a, b| a.volatility.total_cmp(&b.volatility))
            .cloned();
        Self {
            points,
            skipped,
            max_sharpe,
            min_volatility,
        }
    }

    /// Points on the upper branch: return at or above the minimum-volatility
    /// point's return.
    pub fn efficient_branch(&self) -> Vec<&FrontierPoint> {
        let floor = match &self.min_volatility {
            Some(p) => p.expected_return,
            None => return Vec::new(),
        };
        self.points
            .iter()
            .filter(|p| p.expected_return >= floor - 1e-9)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Sweep the grid described by `spec`.
pub fn compute_frontier(
    problem: &OptimizationProblem,
    spec: &FrontierSpec,
) -> OptimizerResult<EfficientFrontier> {
    spec.validate()?;
    let targets = spec.targets();
    let points = sweep_target_returns(problem, &targets);
    let frontier = EfficientFrontier::from_points(points, targets.len());
    tracing::info!(
        requested = targets.len(),
        solved = frontier.points.len(),
        skipped = frontier.skipped,
        "frontier sweep finished"
    );
    Ok(frontier)
}

/// Solve one independent Target Return problem per target. The problem's
/// own objective is replaced. Failed targets are skipped; the rest keep
/// their order.
pub fn sweep_target_returns(problem: &OptimizationProblem, targets: &[f64]) -> Vec<FrontierPoint> {
    #[cfg(feature = "parallel")]
    let iter = targets.par_iter();
    #[cfg(not(feature = "parallel"))]
    let iter = targets.iter();

    iter.filter_map(|&target| solve_point(problem, target)).collect()
}

fn solve_point(problem: &OptimizationProblem, target: f64) -> Option<FrontierPoint> {
    let point_problem = OptimizationProblem {
        objective: Objective::TargetReturn {
            target_return: target,
        },
        ..problem.clone()
    };
    match optimize(&point_problem) {
        Ok(p) => Some(FrontierPoint {
            target_return: target,
            expected_return: p.expected_return,
            volatility: p.volatility,
            sharpe_ratio: p.sharpe_ratio,
            weights: p.weight_vector(),
            converged: p.converged,
        }),
        Err(e) => {
            tracing::debug!(target, error = %e, "frontier point skipped");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
