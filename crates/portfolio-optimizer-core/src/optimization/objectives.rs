use serde::{Deserialize, Serialize};

use crate::error::OptimizerError;
use crate::estimation::metrics::{
    portfolio_return, portfolio_volatility, sharpe_ratio, volatility_gradient,
};
use crate::estimation::MarketEstimates;
use crate::optimization::constraints::{Constraint, ConstraintFunction};
use crate::optimization::solver::ObjectiveFunction;
use crate::OptimizerResult;

/// The four scalarised allocation objectives. Each is minimised.
///
/// | Variant | Minimises | Extra equality |
/// |---|---|---|
/// | `MaxSharpe` | `-(return - rf) / vol` | none |
/// | `MinVolatility` | `vol` | none |
/// | `TargetReturn` | `vol` | `return = target_return` |
/// | `TargetRisk` | `-return` | `vol = target_risk` |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Objective {
    MaxSharpe { risk_free_rate: f64 },
    MinVolatility,
    TargetReturn { target_return: f64 },
    TargetRisk { target_risk: f64 },
}

impl Objective {
    pub fn name(&self) -> &'static str {
        match self {
            Objective::MaxSharpe { .. } => "Maximum Sharpe Ratio",
            Objective::MinVolatility => "Minimum Volatility",
            Objective::TargetReturn { .. } => "Target Return",
            Objective::TargetRisk { .. } => "Target Risk",
        }
    }

    pub fn value(&self, w: &[f64], est: &MarketEstimates) -> OptimizerResult<f64> {
        let mu = &est.expected_returns;
        let sigma = &est.covariance;
        match *self {
            Objective::MaxSharpe { risk_free_rate } => {
                Ok(-sharpe_ratio(w, mu, sigma, risk_free_rate)?)
            }
            Objective::MinVolatility | Objective::TargetReturn { .. } => {
                portfolio_volatility(w, sigma)
            }
            Objective::TargetRisk { .. } => Ok(-portfolio_return(w, mu)),
        }
    }

    pub fn gradient(&self, w: &[f64], est: &MarketEstimates) -> OptimizerResult<Vec<f64>> {
        let mu = &est.expected_returns;
        let sigma = &est.covariance;
        match *self {
            Objective::MaxSharpe { risk_free_rate } => {
                let vol = portfolio_volatility(w, sigma)?;
                if vol == 0.0 {
                    return Err(OptimizerError::DivisionByZero {
                        context: "sharpe gradient: portfolio volatility is zero".into(),
                    });
                }
                let excess = portfolio_return(w, mu) - risk_free_rate;
                let dvol = volatility_gradient(w, sigma, vol);
                // d/dw [-(r - rf)/vol] = -mu/vol + (r - rf) * dvol / vol^2
                Ok(mu
                    .iter()
                    .zip(dvol.iter())
                    .map(|(m, dv)| -m / vol + excess * dv / (vol * vol))
                    .collect())
            }
            Objective::MinVolatility | Objective::TargetReturn { .. } => {
                let vol = portfolio_volatility(w, sigma)?;
                Ok(volatility_gradient(w, sigma, vol))
            }
            Objective::TargetRisk { .. } => Ok(mu.iter().map(|m| -m).collect()),
        }
    }

    /// The objective-specific equality, if any.
    pub fn extra_constraint(&self, est: &MarketEstimates) -> Option<Constraint> {
        match *self {
            Objective::TargetReturn { target_return } => Some(Constraint::equality(
                "target_return",
                ConstraintFunction::Affine {
                    coefficients: est.expected_returns.clone(),
                    constant: -target_return,
                },
            )),
            Objective::TargetRisk { target_risk } => Some(Constraint::equality(
                "target_risk",
                ConstraintFunction::Volatility {
                    covariance: est.covariance.clone(),
                    target: target_risk,
                },
            )),
            Objective::MaxSharpe { .. } | Objective::MinVolatility => None,
        }
    }

    /// Pair the objective with the estimates it is evaluated against.
    pub fn bind<'a>(&self, estimates: &'a MarketEstimates) -> BoundObjective<'a> {
        BoundObjective {
            objective: *self,
            estimates,
        }
    }
}

/// An objective bound to a fixed set of market estimates.
#[derive(Debug, Clone, Copy)]
pub struct BoundObjective<'a> {
    objective: Objective,
    estimates: &'a MarketEstimates,
}

impl ObjectiveFunction for BoundObjective<'_> {
    fn value(&self, x: &[f64]) -> OptimizerResult<f64> {
        self.objective.value(x, self.estimates)
    }

    fn gradient(&self, x: &[f64]) -> OptimizerResult<Vec<f64>> {
        self.objective.gradient(x, self.estimates)
    }
}
