//! Sequential quadratic programming for smooth objectives under box bounds,
//! equality and inequality constraints.
//!
//! Each iteration linearises the constraints at the current point, solves the
//! quadratic model built from a damped BFGS approximation of the Lagrangian
//! Hessian, and walks along the QP step with a backtracking line search on
//! the L1 exact-penalty merit function.

use serde::{Deserialize, Serialize};

use crate::error::OptimizerError;
use crate::linalg::{dot, identity, mat_vec, norm_inf};
use crate::optimization::constraints::{
    Constraint, ConstraintFunction, ConstraintKind, WeightBound,
};
use crate::optimization::qp::{solve_qp, QpFailure, QpRow, QpSolution};
use crate::OptimizerResult;

/// Residual scalings tried, in order, for nonlinear constraints whose
/// linearisation is incompatible with the rest of the subproblem.
const RELAXATION_STEPS: [f64; 5] = [1.0, 0.5, 0.25, 0.1, 0.01];
const ARMIJO: f64 = 1e-4;
const MAX_BACKTRACKS: u32 = 30;
const STEP_TOLERANCE: f64 = 1e-10;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A smooth scalar function with an analytic gradient.
pub trait ObjectiveFunction {
    fn value(&self, x: &[f64]) -> OptimizerResult<f64>;
    fn gradient(&self, x: &[f64]) -> OptimizerResult<Vec<f64>>;
}

/// Solver limits and tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Iteration cap; reaching it returns the best iterate unconverged.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Relative objective change that counts as converged.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Largest constraint violation a converged point may carry.
    #[serde(default = "default_constraint_tolerance")]
    pub constraint_tolerance: f64,
}

fn default_max_iterations() -> u32 {
    200
}

fn default_tolerance() -> f64 {
    1e-10
}

fn default_constraint_tolerance() -> f64 {
    1e-8
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            constraint_tolerance: default_constraint_tolerance(),
        }
    }
}

/// Result of one solver run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverOutcome {
    pub x: Vec<f64>,
    pub objective: f64,
    pub iterations: u32,
    pub converged: bool,
    /// Largest bound or constraint violation at `x`.
    pub max_violation: f64,
}

struct Iterate {
    x: Vec<f64>,
    f: f64,
    violation: f64,
}

impl Iterate {
    /// Feasible points beat infeasible ones; then lower objective, or lower
    /// violation among infeasible points.
    fn improves_on(&self, other: &Iterate, tol: f64) -> bool {
        match (self.violation <= tol, other.violation <= tol) {
            (true, false) => true,
            (false, true) => false,
            (true, true) => self.f < other.f,
            (false, false) => self.violation < other.violation,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Minimise `objective` from `x0` subject to `constraints` and `bounds`.
///
/// Incompatible constraints are an error. Running out of iterations is
/// not: the best iterate is returned with `converged == false`.
pub fn minimize(
    objective: &dyn ObjectiveFunction,
    constraints: &[Constraint],
    bounds: &[WeightBound],
    x0: &[f64],
    settings: &SolverSettings,
) -> OptimizerResult<SolverOutcome> {
    let n = x0.len();
    validate_problem(constraints, bounds, n)?;

    let mut x: Vec<f64> = x0
        .iter()
        .zip(bounds.iter())
        .map(|(xi, b)| b.clamp(*xi))
        .collect();
    let mut f = finite(objective.value(&x)?, "objective value")?;
    let mut g = objective.gradient(&x)?;

    let m = constraints.len();
    let mut hessian = identity(n);
    let mut fresh_hessian = true;
    let mut penalties = vec![0.0; m];
    let mut best = Iterate {
        x: x.clone(),
        f,
        violation: max_violation(constraints, bounds, &x),
    };
    let mut converged = false;
    let mut iterations = 0;

    while iterations < settings.max_iterations {
        iterations += 1;

        let values: Vec<f64> = constraints.iter().map(|c| c.value(&x)).collect();
        let jacobian: Vec<Vec<f64>> = constraints.iter().map(|c| c.gradient(&x)).collect();
        let violation = max_violation(constraints, bounds, &x);

        let (step, relaxation) =
            match solve_subproblem(&hessian, &g, constraints, &values, &jacobian, bounds, &x) {
                Ok(found) => found,
                Err(QpFailure::Numerical) if !fresh_hessian => {
                    tracing::debug!(iteration = iterations, "QP subproblem degenerate, resetting Hessian");
                    hessian = identity(n);
                    fresh_hessian = true;
                    continue;
                }
                Err(QpFailure::Numerical) => {
                    return Err(OptimizerError::NumericalInstability {
                        context: format!("SQP subproblem at iteration {}", iterations),
                    });
                }
                Err(QpFailure::Infeasible) => {
                    return Err(OptimizerError::Infeasible(format!(
                        "linearised constraints are incompatible at iteration {} (max violation {:.3e})",
                        iterations, violation
                    )));
                }
            };
        let d = step.d;
        let lambdas = &step.multipliers[..m];

        // With a positive definite model, a negligible predicted decrease
        // also bounds the step.
        let predicted_decrease = -dot(&g, &d);
        if violation <= settings.constraint_tolerance
            && (norm_inf(&d) <= STEP_TOLERANCE
                || predicted_decrease.abs() <= settings.tolerance * (1.0 + f.abs()))
        {
            converged = true;
            break;
        }

        // Penalties must dominate the multipliers for the merit function to
        // be exact.
        for (rho, lambda) in penalties.iter_mut().zip(lambdas.iter()) {
            let abs = lambda.abs();
            *rho = abs.max(0.5 * (*rho + abs));
        }

        let merit_at = |f_val: f64, point: &[f64]| -> f64 {
            f_val
                + constraints
                    .iter()
                    .zip(penalties.iter())
                    .map(|(c, rho)| rho * c.violation(point))
                    .sum::<f64>()
        };
        let merit0 = merit_at(f, &x);
        let slope = (dot(&g, &d)
            - constraints
                .iter()
                .zip(penalties.iter())
                .zip(relaxation.iter())
                .map(|((c, rho), theta)| rho * theta * c.violation(&x))
                .sum::<f64>())
        .min(0.0);

        let mut alpha = 1.0;
        let mut accepted = None;
        for _ in 0..=MAX_BACKTRACKS {
            let trial: Vec<f64> = x
                .iter()
                .zip(d.iter())
                .zip(bounds.iter())
                .map(|((xi, di), b)| b.clamp(xi + alpha * di))
                .collect();
            // Trial points where the objective is undefined are rejected
            // like any other insufficient decrease.
            let f_trial = objective.value(&trial).unwrap_or(f64::NAN);
            if f_trial.is_finite() && merit_at(f_trial, &trial) <= merit0 + ARMIJO * alpha * slope {
                accepted = Some((trial, f_trial));
                break;
            }
            alpha *= 0.5;
        }

        let Some((x_new, f_new)) = accepted else {
            if fresh_hessian {
                tracing::debug!(iteration = iterations, "line search stalled");
                break;
            }
            tracing::debug!(iteration = iterations, "line search failed, resetting Hessian");
            hessian = identity(n);
            fresh_hessian = true;
            continue;
        };

        let g_new = objective.gradient(&x_new)?;
        let jacobian_new: Vec<Vec<f64>> =
            constraints.iter().map(|c| c.gradient(&x_new)).collect();

        let s: Vec<f64> = x_new.iter().zip(x.iter()).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = (0..n)
            .map(|i| {
                let lagrangian_new: f64 = jacobian_new
                    .iter()
                    .zip(lambdas.iter())
                    .map(|(row, l)| l * row[i])
                    .sum();
                let lagrangian_old: f64 = jacobian
                    .iter()
                    .zip(lambdas.iter())
                    .map(|(row, l)| l * row[i])
                    .sum();
                (g_new[i] - lagrangian_new) - (g[i] - lagrangian_old)
            })
            .collect();
        if damped_bfgs_update(&mut hessian, &s, &y) {
            fresh_hessian = false;
        }

        let f_change = (f_new - f).abs();
        x = x_new;
        f = f_new;
        g = g_new;

        let current = Iterate {
            x: x.clone(),
            f,
            violation: max_violation(constraints, bounds, &x),
        };

        tracing::debug!(
            iteration = iterations,
            objective = f,
            violation = current.violation,
            step = norm_inf(&s),
            alpha,
            "SQP iteration"
        );

        let settled = alpha == 1.0 && f_change <= settings.tolerance * (1.0 + f.abs());
        let feasible = current.violation <= settings.constraint_tolerance;
        if current.improves_on(&best, settings.constraint_tolerance) || (feasible && settled) {
            best = current;
        }
        if feasible && settled {
            converged = true;
            break;
        }
    }

    if converged {
        // The converged point is the answer even if an earlier iterate had a
        // marginally lower objective.
        let violation = max_violation(constraints, bounds, &x);
        best = Iterate { x, f, violation };
    }

    Ok(SolverOutcome {
        objective: best.f,
        max_violation: best.violation,
        x: best.x,
        iterations,
        converged,
    })
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

/// Solve the QP model, relaxing nonlinear residuals if the full
/// linearisation is incompatible. Returns the step and the residual scaling
/// applied to each constraint.
fn solve_subproblem(
    hessian: &[Vec<f64>],
    g: &[f64],
    constraints: &[Constraint],
    values: &[f64],
    jacobian: &[Vec<f64>],
    bounds: &[WeightBound],
    x: &[f64],
) -> Result<(QpSolution, Vec<f64>), QpFailure> {
    let any_nonlinear = constraints.iter().any(|c| !c.is_linear());
    let steps: &[f64] = if any_nonlinear {
        &RELAXATION_STEPS
    } else {
        &RELAXATION_STEPS[..1]
    };

    let mut last = QpFailure::Infeasible;
    for &theta in steps {
        let relaxation: Vec<f64> = constraints
            .iter()
            .zip(values.iter())
            .map(|(c, &v)| {
                let violated = match c.kind {
                    ConstraintKind::Equality => true,
                    ConstraintKind::Inequality => v < 0.0,
                };
                if !c.is_linear() && violated {
                    theta
                } else {
                    1.0
                }
            })
            .collect();
        let rows = build_rows(constraints, values, jacobian, &relaxation, bounds, x);
        match solve_qp(hessian, g, &rows) {
            Ok(sol) => return Ok((sol, relaxation)),
            Err(QpFailure::Numerical) => return Err(QpFailure::Numerical),
            Err(QpFailure::Infeasible) => {
                tracing::debug!(theta, "QP subproblem infeasible");
                last = QpFailure::Infeasible;
            }
        }
    }
    Err(last)
}

/// Linearised constraints first (in input order, so multipliers line up),
/// then the bound rows `d >= lb - x` and `-d >= x - ub`.
fn build_rows(
    constraints: &[Constraint],
    values: &[f64],
    jacobian: &[Vec<f64>],
    relaxation: &[f64],
    bounds: &[WeightBound],
    x: &[f64],
) -> Vec<QpRow> {
    let n = x.len();
    let mut rows = Vec::with_capacity(constraints.len() + 2 * n);
    for (((c, &v), grad), &theta) in constraints
        .iter()
        .zip(values.iter())
        .zip(jacobian.iter())
        .zip(relaxation.iter())
    {
        let rhs = -theta * v;
        rows.push(match c.kind {
            ConstraintKind::Equality => QpRow::equality(grad.clone(), rhs),
            ConstraintKind::Inequality => QpRow::inequality(grad.clone(), rhs),
        });
    }
    for (i, b) in bounds.iter().enumerate() {
        let mut unit = vec![0.0; n];
        unit[i] = 1.0;
        rows.push(QpRow::inequality(unit.clone(), b.min - x[i]));
        unit[i] = -1.0;
        rows.push(QpRow::inequality(unit, x[i] - b.max));
    }
    rows
}

/// BFGS update with Powell damping so the approximation stays positive
/// definite. Returns false when the step was too small to update from.
fn damped_bfgs_update(b: &mut [Vec<f64>], s: &[f64], y: &[f64]) -> bool {
    let bs = mat_vec(b, s);
    let sbs = dot(s, &bs);
    if sbs <= 1e-20 {
        return false;
    }
    let sy = dot(s, y);
    let y: Vec<f64> = if sy < 0.2 * sbs {
        let theta = 0.8 * sbs / (sbs - sy);
        y.iter()
            .zip(bs.iter())
            .map(|(yi, bsi)| theta * yi + (1.0 - theta) * bsi)
            .collect()
    } else {
        y.to_vec()
    };
    let sy = dot(s, &y);
    if sy <= 1e-20 {
        return false;
    }
    for i in 0..b.len() {
        for j in 0..b.len() {
            b[i][j] += y[i] * y[j] / sy - bs[i] * bs[j] / sbs;
        }
    }
    true
}

fn max_violation(constraints: &[Constraint], bounds: &[WeightBound], x: &[f64]) -> f64 {
    let bound_violation = bounds
        .iter()
        .zip(x.iter())
        .map(|(b, &xi)| (b.min - xi).max(xi - b.max).max(0.0))
        .fold(0.0_f64, f64::max);
    constraints
        .iter()
        .map(|c| c.violation(x))
        .fold(bound_violation, f64::max)
}

fn finite(value: f64, what: &str) -> OptimizerResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(OptimizerError::NumericalInstability {
            context: format!("{} is not finite", what),
        })
    }
}

fn validate_problem(constraints: &[Constraint], bounds: &[WeightBound], n: usize) -> OptimizerResult<()> {
    if n == 0 {
        return Err(OptimizerError::InvalidInput {
            field: "x0".into(),
            reason: "Starting point is empty".into(),
        });
    }
    if bounds.len() != n {
        return Err(OptimizerError::InvalidInput {
            field: "bounds".into(),
            reason: format!("Expected {} bounds but got {}", n, bounds.len()),
        });
    }
    if let Some((i, b)) = bounds.iter().enumerate().find(|(_, b)| b.min > b.max) {
        return Err(OptimizerError::InvalidConstraint {
            field: format!("bounds[{}]", i),
            reason: format!("min {} > max {}", b.min, b.max),
        });
    }
    for c in constraints {
        let dim = match &c.function {
            ConstraintFunction::Affine { coefficients, .. } => coefficients.len(),
            ConstraintFunction::Volatility { covariance, .. } => covariance.len(),
        };
        if dim != n {
            return Err(OptimizerError::InvalidInput {
                field: format!("constraints[{}]", c.label),
                reason: format!("Constraint has dimension {}, expected {}", dim, n),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
