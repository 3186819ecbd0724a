use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::OptimizerError;
use crate::linalg::{dot, mat_vec};
use crate::OptimizerResult;

/// Label for assets whose sector could not be resolved.
pub const UNKNOWN_SECTOR: &str = "Unknown";

const FEASIBILITY_SLACK: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Sector label -> positions of its assets in the asset list.
pub type SectorGrouping = BTreeMap<String, Vec<usize>>;

/// Fractional [min, max] allocation bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightBound {
    pub min: f64,
    pub max: f64,
}

impl WeightBound {
    pub const FULL: WeightBound = WeightBound { min: 0.0, max: 1.0 };

    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64, tolerance: f64) -> bool {
        value >= self.min - tolerance && value <= self.max + tolerance
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }
}

impl Default for WeightBound {
    fn default() -> Self {
        WeightBound::FULL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// `value(w) = 0`
    Equality,
    /// `value(w) >= 0`
    Inequality,
}

/// The scalar function a constraint restricts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintFunction {
    /// `coefficients · w + constant`
    Affine { coefficients: Vec<f64>, constant: f64 },
    /// `sqrt(wᵀ Σ w) - target`
    Volatility {
        covariance: Vec<Vec<f64>>,
        target: f64,
    },
}

/// A general constraint handed to the solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub label: String,
    pub kind: ConstraintKind,
    pub function: ConstraintFunction,
}

impl Constraint {
    pub fn equality(label: impl Into<String>, function: ConstraintFunction) -> Self {
        Self {
            label: label.into(),
            kind: ConstraintKind::Equality,
            function,
        }
    }

    pub fn inequality(label: impl Into<String>, function: ConstraintFunction) -> Self {
        Self {
            label: label.into(),
            kind: ConstraintKind::Inequality,
            function,
        }
    }

    pub fn is_linear(&self) -> bool {
        matches!(self.function, ConstraintFunction::Affine { .. })
    }

    pub fn value(&self, w: &[f64]) -> f64 {
        match &self.function {
            ConstraintFunction::Affine {
                coefficients,
                constant,
            } => dot(coefficients, w) + constant,
            ConstraintFunction::Volatility { covariance, target } => {
                dot(w, &mat_vec(covariance, w)).max(0.0).sqrt() - target
            }
        }
    }

    pub fn gradient(&self, w: &[f64]) -> Vec<f64> {
        match &self.function {
            ConstraintFunction::Affine { coefficients, .. } => coefficients.clone(),
            ConstraintFunction::Volatility { covariance, .. } => {
                let sigma_w = mat_vec(covariance, w);
                let vol = dot(w, &sigma_w).max(0.0).sqrt();
                if vol == 0.0 {
                    vec![0.0; w.len()]
                } else {
                    sigma_w.into_iter().map(|v| v / vol).collect()
                }
            }
        }
    }

    /// Amount by which `w` violates this constraint (0 when satisfied).
    pub fn violation(&self, w: &[f64]) -> f64 {
        let v = self.value(w);
        match self.kind {
            ConstraintKind::Equality => v.abs(),
            ConstraintKind::Inequality => (-v).max(0.0),
        }
    }
}

/// Aggregate bound on one sector. Owns its index list and bound values so
/// every generated constraint is independent of the others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorConstraint {
    pub sector: String,
    pub asset_indices: Vec<usize>,
    pub min_weight: f64,
    pub max_weight: f64,
}

impl SectorConstraint {
    pub fn aggregate(&self, w: &[f64]) -> f64 {
        self.asset_indices.iter().filter_map(|&i| w.get(i)).sum()
    }

    fn indicator(&self, n: usize, sign: f64) -> Vec<f64> {
        let mut coefficients = vec![0.0; n];
        for &i in &self.asset_indices {
            coefficients[i] = sign;
        }
        coefficients
    }

    /// `Σ_S w - min >= 0` and `max - Σ_S w >= 0`.
    pub fn to_constraints(&self, n: usize) -> [Constraint; 2] {
        [
            Constraint::inequality(
                format!("sector_min[{}]", self.sector),
                ConstraintFunction::Affine {
                    coefficients: self.indicator(n, 1.0),
                    constant: -self.min_weight,
                },
            ),
            Constraint::inequality(
                format!("sector_max[{}]", self.sector),
                ConstraintFunction::Affine {
                    coefficients: self.indicator(n, -1.0),
                    constant: self.max_weight,
                },
            ),
        ]
    }
}

/// Everything the solver needs besides the objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
    /// Per-asset box bounds.
    pub bounds: Vec<WeightBound>,
    /// Budget equality followed by the sector inequalities.
    pub constraints: Vec<Constraint>,
    /// The sector descriptors the inequalities were generated from.
    pub sectors: Vec<SectorConstraint>,
}

impl ConstraintSet {
    pub fn num_assets(&self) -> usize {
        self.bounds.len()
    }

    /// Largest violation of any bound or constraint at `w`.
    pub fn max_violation(&self, w: &[f64]) -> f64 {
        let bound_violation = self
            .bounds
            .iter()
            .zip(w.iter())
            .map(|(b, &wi)| (b.min - wi).max(wi - b.max).max(0.0))
            .fold(0.0_f64, f64::max);
        self.constraints
            .iter()
            .map(|c| c.violation(w))
            .fold(bound_violation, f64::max)
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Group asset positions by their sector label. Blank labels land in the
/// `"Unknown"` bucket.
pub fn group_by_sector<S: AsRef<str>>(sectors: &[S]) -> SectorGrouping {
    let mut grouping = SectorGrouping::new();
    for (i, sector) in sectors.iter().enumerate() {
        let label = sector.as_ref().trim();
        let label = if label.is_empty() {
            UNKNOWN_SECTOR
        } else {
            label
        };
        grouping.entry(label.to_string()).or_default().push(i);
    }
    grouping
}

/// The full-investment equality `Σ w - 1 = 0`.
pub fn budget_constraint(n: usize) -> Constraint {
    Constraint::equality(
        "budget",
        ConstraintFunction::Affine {
            coefficients: vec![1.0; n],
            constant: -1.0,
        },
    )
}

/// Build the solver constraint set from fractional asset bounds and
/// optional sector bounds.
///
/// Only sectors that have a bound entry and appear in the grouping are
/// constrained. Obviously infeasible combinations are rejected here; subtler
/// ones surface from the solver.
pub fn build_constraints(
    asset_bounds: &[WeightBound],
    grouping: Option<&SectorGrouping>,
    sector_bounds: &BTreeMap<String, WeightBound>,
) -> OptimizerResult<ConstraintSet> {
    let n = asset_bounds.len();
    if n == 0 {
        return Err(OptimizerError::InsufficientData(
            "At least one asset required".into(),
        ));
    }

    validate_asset_bounds(asset_bounds)?;

    let mut constraints = vec![budget_constraint(n)];
    let mut sectors = Vec::new();

    if let Some(grouping) = grouping {
        for (sector, bound) in sector_bounds {
            let Some(indices) = grouping.get(sector) else {
                tracing::debug!(sector = %sector, "sector bound has no assets, ignored");
                continue;
            };
            if let Some(&bad) = indices.iter().find(|&&i| i >= n) {
                return Err(OptimizerError::InvalidInput {
                    field: format!("sector_grouping[{}]", sector),
                    reason: format!("Asset index {} out of range (n={})", bad, n),
                });
            }
            let sc = SectorConstraint {
                sector: sector.clone(),
                asset_indices: indices.clone(),
                min_weight: bound.min,
                max_weight: bound.max,
            };
            validate_sector(&sc, asset_bounds)?;
            constraints.extend(sc.to_constraints(n));
            sectors.push(sc);
        }
        validate_sector_totals(&sectors, grouping, n)?;
    }

    Ok(ConstraintSet {
        bounds: asset_bounds.to_vec(),
        constraints,
        sectors,
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_asset_bounds(bounds: &[WeightBound]) -> OptimizerResult<()> {
    for (i, b) in bounds.iter().enumerate() {
        if !b.min.is_finite() || !b.max.is_finite() || b.min < 0.0 || b.max > 1.0 {
            return Err(OptimizerError::InvalidConstraint {
                field: format!("asset_bounds[{}]", i),
                reason: format!("Bound [{}, {}] must lie within [0, 1]", b.min, b.max),
            });
        }
        if b.min > b.max {
            return Err(OptimizerError::InvalidConstraint {
                field: format!("asset_bounds[{}]", i),
                reason: format!("min {} > max {}", b.min, b.max),
            });
        }
    }

    let min_total: f64 = bounds.iter().map(|b| b.min).sum();
    if min_total > 1.0 + FEASIBILITY_SLACK {
        return Err(OptimizerError::InvalidConstraint {
            field: "asset_bounds".into(),
            reason: format!("Asset minimums sum to {:.4}, above 100%", min_total),
        });
    }
    let max_total: f64 = bounds.iter().map(|b| b.max).sum();
    if max_total < 1.0 - FEASIBILITY_SLACK {
        return Err(OptimizerError::InvalidConstraint {
            field: "asset_bounds".into(),
            reason: format!("Asset maximums sum to {:.4}, below 100%", max_total),
        });
    }
    Ok(())
}

fn validate_sector(sc: &SectorConstraint, asset_bounds: &[WeightBound]) -> OptimizerResult<()> {
    let field = format!("sector_bounds[{}]", sc.sector);
    if !(0.0..=1.0).contains(&sc.min_weight) || !(0.0..=1.0).contains(&sc.max_weight) {
        return Err(OptimizerError::InvalidConstraint {
            field,
            reason: format!(
                "Bound [{}, {}] must lie within [0, 1]",
                sc.min_weight, sc.max_weight
            ),
        });
    }
    if sc.min_weight > sc.max_weight {
        return Err(OptimizerError::InvalidConstraint {
            field,
            reason: format!("min {} > max {}", sc.min_weight, sc.max_weight),
        });
    }

    let reachable_max: f64 = sc.asset_indices.iter().map(|&i| asset_bounds[i].max).sum();
    if sc.min_weight > reachable_max + FEASIBILITY_SLACK {
        return Err(OptimizerError::InvalidConstraint {
            field,
            reason: format!(
                "Sector minimum {:.4} exceeds the sum of its asset maximums {:.4}",
                sc.min_weight, reachable_max
            ),
        });
    }
    let forced_min: f64 = sc.asset_indices.iter().map(|&i| asset_bounds[i].min).sum();
    if sc.max_weight < forced_min - FEASIBILITY_SLACK {
        return Err(OptimizerError::InvalidConstraint {
            field,
            reason: format!(
                "Sector maximum {:.4} is below the sum of its asset minimums {:.4}",
                sc.max_weight, forced_min
            ),
        });
    }
    Ok(())
}

fn validate_sector_totals(
    sectors: &[SectorConstraint],
    grouping: &SectorGrouping,
    n: usize,
) -> OptimizerResult<()> {
    let min_total: f64 = sectors.iter().map(|s| s.min_weight).sum();
    if min_total > 1.0 + FEASIBILITY_SLACK {
        return Err(OptimizerError::InvalidConstraint {
            field: "sector_bounds".into(),
            reason: format!("Sector minimums sum to {:.4}, above 100%", min_total),
        });
    }

    // A shortfall in maximums only matters when every asset is covered.
    let covered: usize = sectors
        .iter()
        .filter_map(|s| grouping.get(&s.sector))
        .map(Vec::len)
        .sum();
    let max_total: f64 = sectors.iter().map(|s| s.max_weight).sum();
    if covered == n && max_total < 1.0 - FEASIBILITY_SLACK {
        return Err(OptimizerError::InvalidConstraint {
            field: "sector_bounds".into(),
            reason: format!("Sector maximums sum to {:.4}, below 100%", max_total),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
