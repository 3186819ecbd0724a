use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::OptimizerError;
use crate::estimation::metrics::{
    diversification_ratio, herfindahl_index, portfolio_return, portfolio_volatility,
    risk_contributions, sector_allocation,
};
use crate::estimation::MarketEstimates;
use crate::optimization::constraints::{ConstraintSet, SectorGrouping, WeightBound};
use crate::optimization::objectives::Objective;
use crate::optimization::solver::{minimize, SolverSettings};
use crate::OptimizerResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One fully specified allocation problem. Built fresh for every solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationProblem {
    pub estimates: MarketEstimates,
    pub constraints: ConstraintSet,
    /// Every asset's sector, used for reporting allocations. May cover more
    /// sectors than are actually constrained.
    pub sector_grouping: SectorGrouping,
    pub objective: Objective,
    /// Rate used to report the Sharpe ratio, whatever the objective.
    pub risk_free_rate: f64,
    pub settings: SolverSettings,
}

/// Ticker-labelled weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledWeight {
    pub ticker: String,
    pub weight: f64,
    /// Share of portfolio volatility attributable to this asset.
    pub risk_contribution: f64,
}

/// Solver result materialised against the problem's tickers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedPortfolio {
    pub objective: String,
    pub weights: Vec<LabeledWeight>,
    pub expected_return: f64,
    pub volatility: f64,
    /// `None` when the portfolio has zero volatility.
    pub sharpe_ratio: Option<f64>,
    pub sector_allocation: BTreeMap<String, f64>,
    pub hhi_concentration: f64,
    pub diversification_ratio: f64,
    pub iterations: u32,
    pub converged: bool,
    pub max_violation: f64,
}

impl OptimizedPortfolio {
    pub fn weight_vector(&self) -> Vec<f64> {
        self.weights.iter().map(|w| w.weight).collect()
    }

    pub fn weight_of(&self, ticker: &str) -> Option<f64> {
        self.weights
            .iter()
            .find(|w| w.ticker == ticker)
            .map(|w| w.weight)
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Solve one allocation problem from the uniform start.
///
/// Reaching the iteration cap is reported through `converged == false`, not
/// as an error.
pub fn optimize(problem: &OptimizationProblem) -> OptimizerResult<OptimizedPortfolio> {
    let est = &problem.estimates;
    let n = est.len();
    if problem.constraints.num_assets() != n {
        return Err(OptimizerError::InvalidInput {
            field: "constraints.bounds".into(),
            reason: format!(
                "Expected {} asset bounds but got {}",
                n,
                problem.constraints.num_assets()
            ),
        });
    }

    let x0 = uniform_start(&problem.constraints.bounds);
    let mut constraints = problem.constraints.constraints.clone();
    constraints.extend(problem.objective.extra_constraint(est));

    let objective = problem.objective.bind(est);
    let outcome = minimize(
        &objective,
        &constraints,
        &problem.constraints.bounds,
        &x0,
        &problem.settings,
    )?;

    if outcome.converged {
        tracing::info!(
            objective = problem.objective.name(),
            iterations = outcome.iterations,
            "optimization converged"
        );
    } else {
        tracing::warn!(
            objective = problem.objective.name(),
            iterations = outcome.iterations,
            max_violation = outcome.max_violation,
            "optimization did not converge, returning best iterate"
        );
    }

    materialize(problem, &outcome.x, outcome.iterations, outcome.converged, outcome.max_violation)
}

/// `1/n` clipped into each asset's bounds.
pub fn uniform_start(bounds: &[WeightBound]) -> Vec<f64> {
    let equal = 1.0 / bounds.len().max(1) as f64;
    bounds.iter().map(|b| b.clamp(equal)).collect()
}

fn materialize(
    problem: &OptimizationProblem,
    w: &[f64],
    iterations: u32,
    converged: bool,
    max_violation: f64,
) -> OptimizerResult<OptimizedPortfolio> {
    let est = &problem.estimates;
    let expected_return = portfolio_return(w, &est.expected_returns);
    let volatility = portfolio_volatility(w, &est.covariance)?;
    let sharpe_ratio = if volatility > 0.0 {
        Some((expected_return - problem.risk_free_rate) / volatility)
    } else {
        None
    };
    let contributions = risk_contributions(w, &est.covariance, volatility);

    let weights = est
        .tickers
        .iter()
        .zip(w.iter())
        .zip(contributions.iter())
        .map(|((ticker, &weight), &risk_contribution)| LabeledWeight {
            ticker: ticker.clone(),
            weight,
            risk_contribution,
        })
        .collect();

    Ok(OptimizedPortfolio {
        objective: problem.objective.name().to_string(),
        weights,
        expected_return,
        volatility,
        sharpe_ratio,
        sector_allocation: sector_allocation(w, &problem.sector_grouping),
        hhi_concentration: herfindahl_index(w),
        diversification_ratio: diversification_ratio(w, &est.covariance, volatility),
        iterations,
        converged,
        max_violation,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::constraints::{build_constraints, group_by_sector};

    fn estimates() -> MarketEstimates {
        MarketEstimates::new(
            vec!["A".into(), "B".into(), "C".into()],
            vec![0.12, 0.07, 0.15],
            vec![
                vec![0.04, 0.006, 0.012],
                vec![0.006, 0.0225, 0.009],
                vec![0.012, 0.009, 0.0625],
            ],
        )
        .unwrap()
    }

    fn problem(objective: Objective) -> OptimizationProblem {
        let grouping = group_by_sector(&["Tech", "Banks", "Tech"]);
        OptimizationProblem {
            estimates: estimates(),
            constraints: build_constraints(&[WeightBound::FULL; 3], Some(&grouping), &BTreeMap::new())
                .unwrap(),
            sector_grouping: grouping,
            objective,
            risk_free_rate: 0.05,
            settings: SolverSettings::default(),
        }
    }

    // ------------------------------------------------------------------
    // 1. Starting point
    // ------------------------------------------------------------------
    #[test]
    fn test_uniform_start_clipped() {
        let x0 = uniform_start(&[
            WeightBound::new(0.0, 0.1),
            WeightBound::new(0.5, 1.0),
            WeightBound::FULL,
        ]);
        assert_eq!(x0, vec![0.1, 0.5, 1.0 / 3.0]);
    }

    // ------------------------------------------------------------------
    // 2. Materialised result
    // ------------------------------------------------------------------
    #[test]
    fn test_result_is_labeled_and_consistent() {
        let out = optimize(&problem(Objective::MinVolatility)).unwrap();
        assert!(out.converged);
        assert_eq!(out.weights.len(), 3);
        assert_eq!(out.weights[1].ticker, "B");
        let total: f64 = out.weights.iter().map(|w| w.weight).sum();
        assert!((total - 1.0).abs() < 1e-6);

        let rc_total: f64 = out.weights.iter().map(|w| w.risk_contribution).sum();
        assert!((rc_total - out.volatility).abs() < 1e-9);

        let tech = out.sector_allocation["Tech"];
        let banks = out.sector_allocation["Banks"];
        assert!((tech + banks - 1.0).abs() < 1e-6);
        assert!(out.diversification_ratio >= 1.0 - 1e-9);
        assert_eq!(out.weight_of("A"), Some(out.weights[0].weight));
    }

    #[test]
    fn test_sharpe_reported_with_problem_rate() {
        let out = optimize(&problem(Objective::MinVolatility)).unwrap();
        let expected = (out.expected_return - 0.05) / out.volatility;
        assert!((out.sharpe_ratio.unwrap() - expected).abs() < 1e-12);
    }

    // ------------------------------------------------------------------
    // 3. Objective behaviour
    // ------------------------------------------------------------------
    #[test]
    fn test_max_sharpe_beats_min_vol_on_sharpe() {
        let ms = optimize(&problem(Objective::MaxSharpe {
            risk_free_rate: 0.05,
        }))
        .unwrap();
        let mv = optimize(&problem(Objective::MinVolatility)).unwrap();
        assert!(ms.sharpe_ratio.unwrap() >= mv.sharpe_ratio.unwrap() - 1e-8);
        assert!(mv.volatility <= ms.volatility + 1e-8);
    }

    #[test]
    fn test_target_return_hit() {
        let out = optimize(&problem(Objective::TargetReturn {
            target_return: 0.11,
        }))
        .unwrap();
        assert!((out.expected_return - 0.11).abs() < 1e-6);
    }

    #[test]
    fn test_target_return_above_max_is_infeasible() {
        let out = optimize(&problem(Objective::TargetReturn {
            target_return: 0.30,
        }));
        assert!(matches!(out, Err(OptimizerError::Infeasible(_))));
    }

    #[test]
    fn test_target_risk_hit() {
        let out = optimize(&problem(Objective::TargetRisk { target_risk: 0.17 })).unwrap();
        assert!((out.volatility - 0.17).abs() < 1e-5);
    }

    #[test]
    fn test_bound_count_mismatch_rejected() {
        let mut p = problem(Objective::MinVolatility);
        p.constraints.bounds.pop();
        assert!(matches!(
            optimize(&p),
            Err(OptimizerError::InvalidInput { .. })
        ));
    }
}
