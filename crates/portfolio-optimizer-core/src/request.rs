use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use crate::data::{DateRange, PriceProvider, SectorProvider};
use crate::error::OptimizerError;
use crate::estimation::{estimate_statistics, MarketEstimates};
use crate::optimization::constraints::{
    build_constraints, group_by_sector, WeightBound, UNKNOWN_SECTOR,
};
use crate::optimization::driver::{optimize, OptimizationProblem};
use crate::optimization::frontier::{compute_frontier, EfficientFrontier, FrontierSpec};
use crate::optimization::objectives::Objective;
use crate::optimization::solver::SolverSettings;
use crate::types::{with_metadata, ComputationOutput, TRADING_DAYS_PER_YEAR};
use crate::OptimizerResult;

/// Single positions above this weight are flagged.
const CONCENTRATION_WARNING: f64 = 0.40;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

fn hundred() -> Decimal {
    dec!(100)
}

pub fn default_risk_free_rate_pct() -> Decimal {
    dec!(6.389)
}

/// Target used by Target Return / Target Risk when none is given.
pub fn default_target_pct() -> Decimal {
    dec!(10)
}

/// One asset in the request. Bounds are percentages of the portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSpec {
    pub ticker: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Overrides the sector provider's classification.
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub min_pct: Decimal,
    #[serde(default = "hundred")]
    pub max_pct: Decimal,
}

impl AssetSpec {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            name: None,
            sector: None,
            min_pct: Decimal::ZERO,
            max_pct: hundred(),
        }
    }
}

/// Aggregate bound on one sector, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectorBoundSpec {
    #[serde(default)]
    pub min_pct: Decimal,
    #[serde(default = "hundred")]
    pub max_pct: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    #[default]
    MaxSharpe,
    MinVolatility,
    TargetReturn,
    TargetRisk,
}

/// Caller-facing optimisation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRequest {
    pub assets: Vec<AssetSpec>,
    /// Sector label -> aggregate bound. Sectors without an entry are free.
    #[serde(default)]
    pub sector_bounds: BTreeMap<String, SectorBoundSpec>,
    #[serde(default)]
    pub method: Method,
    /// Target return or risk in percent; 10% when omitted.
    #[serde(default)]
    pub target_pct: Option<Decimal>,
    #[serde(default = "default_risk_free_rate_pct")]
    pub risk_free_rate_pct: Decimal,
    /// Also sweep the efficient frontier over this grid.
    #[serde(default)]
    pub frontier: Option<FrontierSpec>,
    #[serde(default)]
    pub settings: SolverSettings,
}

impl PortfolioRequest {
    pub fn new(assets: Vec<AssetSpec>, method: Method) -> Self {
        Self {
            assets,
            sector_bounds: BTreeMap::new(),
            method,
            target_pct: None,
            risk_free_rate_pct: default_risk_free_rate_pct(),
            frontier: None,
            settings: SolverSettings::default(),
        }
    }

    pub fn tickers(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.ticker.clone()).collect()
    }

    pub fn validate(&self) -> OptimizerResult<()> {
        if self.assets.is_empty() {
            return Err(OptimizerError::InvalidInput {
                field: "assets".into(),
                reason: "At least one asset required".into(),
            });
        }

        let mut seen = HashSet::new();
        for (i, asset) in self.assets.iter().enumerate() {
            let ticker = asset.ticker.trim();
            if ticker.is_empty() {
                return Err(OptimizerError::InvalidInput {
                    field: format!("assets[{}].ticker", i),
                    reason: "Ticker is empty".into(),
                });
            }
            if !seen.insert(ticker) {
                return Err(OptimizerError::InvalidInput {
                    field: format!("assets[{}].ticker", i),
                    reason: format!("{} is already in the portfolio", ticker),
                });
            }
            validate_pct_range(&format!("assets[{}]", ticker), asset.min_pct, asset.max_pct)?;
        }

        for (sector, bound) in &self.sector_bounds {
            validate_pct_range(&format!("sector_bounds[{}]", sector), bound.min_pct, bound.max_pct)?;
        }

        if let Some(target) = self.target_pct {
            if target < Decimal::ZERO || target > hundred() {
                return Err(OptimizerError::InvalidInput {
                    field: "target_pct".into(),
                    reason: format!("{}% is outside [0, 100]", target),
                });
            }
        }
        if let Some(frontier) = &self.frontier {
            frontier.validate()?;
        }
        Ok(())
    }

    /// Per-asset bounds as fractions.
    pub fn asset_bounds(&self) -> OptimizerResult<Vec<WeightBound>> {
        self.assets
            .iter()
            .map(|a| {
                Ok(WeightBound::new(
                    pct_to_fraction("min_pct", a.min_pct)?,
                    pct_to_fraction("max_pct", a.max_pct)?,
                ))
            })
            .collect()
    }

    pub fn sector_weight_bounds(&self) -> OptimizerResult<BTreeMap<String, WeightBound>> {
        self.sector_bounds
            .iter()
            .map(|(sector, b)| {
                Ok((
                    sector.clone(),
                    WeightBound::new(
                        pct_to_fraction("min_pct", b.min_pct)?,
                        pct_to_fraction("max_pct", b.max_pct)?,
                    ),
                ))
            })
            .collect()
    }

    pub fn risk_free_rate(&self) -> OptimizerResult<f64> {
        pct_to_fraction("risk_free_rate_pct", self.risk_free_rate_pct)
    }

    pub fn objective(&self) -> OptimizerResult<Objective> {
        let target = || pct_to_fraction("target_pct", self.target_pct.unwrap_or_else(default_target_pct));
        Ok(match self.method {
            Method::MaxSharpe => Objective::MaxSharpe {
                risk_free_rate: self.risk_free_rate()?,
            },
            Method::MinVolatility => Objective::MinVolatility,
            Method::TargetReturn => Objective::TargetReturn {
                target_return: target()?,
            },
            Method::TargetRisk => Objective::TargetRisk {
                target_risk: target()?,
            },
        })
    }

    /// Sector per asset: the asset's own label, else the provider's, else
    /// `"Unknown"`.
    pub fn resolve_sectors(&self, sectors: &dyn SectorProvider) -> Vec<String> {
        self.assets
            .iter()
            .map(|a| {
                a.sector
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .or_else(|| sectors.sector_of(&a.ticker))
                    .unwrap_or_else(|| UNKNOWN_SECTOR.to_string())
            })
            .collect()
    }

    /// Assemble the engine problem for `estimates`, whose tickers must match
    /// the request's assets in order.
    pub fn build_problem(
        &self,
        estimates: MarketEstimates,
        sectors: &dyn SectorProvider,
    ) -> OptimizerResult<OptimizationProblem> {
        self.validate()?;
        let tickers = self.tickers();
        if estimates.tickers != tickers {
            return Err(OptimizerError::InvalidInput {
                field: "estimates.tickers".into(),
                reason: format!(
                    "Estimates cover {:?} but the request lists {:?}",
                    estimates.tickers, tickers
                ),
            });
        }

        let grouping = group_by_sector(&self.resolve_sectors(sectors));
        let constraints = build_constraints(
            &self.asset_bounds()?,
            Some(&grouping),
            &self.sector_weight_bounds()?,
        )?;

        Ok(OptimizationProblem {
            estimates,
            constraints,
            sector_grouping: grouping,
            objective: self.objective()?,
            risk_free_rate: self.risk_free_rate()?,
            settings: self.settings,
        })
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAllocation {
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub weight: f64,
    pub risk_contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub iterations: u32,
    pub converged: bool,
    pub max_violation: f64,
    pub hhi_concentration: f64,
    pub diversification_ratio: f64,
    /// Daily returns behind the estimates (0 when supplied directly).
    pub observations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioResponse {
    pub method: Method,
    pub weights: Vec<AssetAllocation>,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: Option<f64>,
    pub sector_allocation: BTreeMap<String, f64>,
    pub diagnostics: Diagnostics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frontier: Option<EfficientFrontier>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Optimise `request` against precomputed estimates.
pub fn optimize_portfolio(
    request: &PortfolioRequest,
    estimates: MarketEstimates,
    sectors: &dyn SectorProvider,
) -> OptimizerResult<ComputationOutput<PortfolioResponse>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let observations = estimates.observations;
    let problem = request.build_problem(estimates, sectors)?;
    let portfolio = optimize(&problem)?;

    let sector_labels = request.resolve_sectors(sectors);
    let weights: Vec<AssetAllocation> = request
        .assets
        .iter()
        .zip(portfolio.weights.iter())
        .zip(sector_labels)
        .map(|((asset, w), sector)| AssetAllocation {
            ticker: asset.ticker.clone(),
            name: asset.name.clone().unwrap_or_else(|| asset.ticker.clone()),
            sector,
            weight: w.weight,
            risk_contribution: w.risk_contribution,
        })
        .collect();

    let frontier = match &request.frontier {
        Some(spec) => Some(compute_frontier(&problem, spec)?),
        None => None,
    };

    // --- Warnings ---
    if !portfolio.converged {
        warnings.push(format!(
            "Optimizer did not converge within {} iterations; best iterate returned",
            portfolio.iterations
        ));
    }
    if portfolio.max_violation > problem.settings.constraint_tolerance {
        warnings.push(format!(
            "Constraints violated by up to {:.2e}",
            portfolio.max_violation
        ));
    }
    if let Some(f) = &frontier {
        if f.skipped > 0 {
            warnings.push(format!(
                "{} of {} frontier targets were unreachable and skipped",
                f.skipped,
                f.skipped + f.points.len()
            ));
        }
    }
    for aw in &weights {
        if aw.weight > CONCENTRATION_WARNING {
            warnings.push(format!(
                "Concentrated position: {} has weight {:.4}",
                aw.ticker, aw.weight
            ));
        }
    }

    let output = PortfolioResponse {
        method: request.method,
        weights,
        expected_return: portfolio.expected_return,
        volatility: portfolio.volatility,
        sharpe_ratio: portfolio.sharpe_ratio,
        sector_allocation: portfolio.sector_allocation,
        diagnostics: Diagnostics {
            iterations: portfolio.iterations,
            converged: portfolio.converged,
            max_violation: portfolio.max_violation,
            hhi_concentration: portfolio.hhi_concentration,
            diversification_ratio: portfolio.diversification_ratio,
            observations,
        },
        frontier,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        &format!("Sector-Constrained Mean-Variance Optimization ({})", portfolio.objective),
        &serde_json::json!({
            "n_assets": request.assets.len(),
            "risk_free_rate": problem.risk_free_rate,
            "annualization_factor": TRADING_DAYS_PER_YEAR,
            "returns": "simple daily, rows with missing prices dropped",
            "covariance": "sample (n-1)",
            "objective": problem.objective,
            "max_iterations": problem.settings.max_iterations,
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Fetch prices for the request's tickers over `range`, estimate, and
/// optimise.
pub fn optimize_from_prices(
    request: &PortfolioRequest,
    prices: &dyn PriceProvider,
    range: &DateRange,
    sectors: &dyn SectorProvider,
) -> OptimizerResult<ComputationOutput<PortfolioResponse>> {
    request.validate()?;
    let series = prices.closing_prices(&request.tickers(), range)?;
    let estimates = estimate_statistics(&series)?;
    optimize_portfolio(request, estimates, sectors)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_pct_range(field: &str, min: Decimal, max: Decimal) -> OptimizerResult<()> {
    for (label, pct) in [("min_pct", min), ("max_pct", max)] {
        if pct < Decimal::ZERO || pct > hundred() {
            return Err(OptimizerError::InvalidInput {
                field: format!("{}.{}", field, label),
                reason: format!("{}% is outside [0, 100]", pct),
            });
        }
    }
    if min > max {
        return Err(OptimizerError::InvalidConstraint {
            field: field.to_string(),
            reason: format!("min {}% > max {}%", min, max),
        });
    }
    Ok(())
}

fn pct_to_fraction(field: &str, pct: Decimal) -> OptimizerResult<f64> {
    (pct / hundred())
        .to_f64()
        .ok_or_else(|| OptimizerError::InvalidInput {
            field: field.to_string(),
            reason: format!("{} is not representable as f64", pct),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StaticSectorTable;
    use pretty_assertions::assert_eq;

    fn sectors() -> StaticSectorTable {
        StaticSectorTable::from_groups([("Tech", vec!["A", "C"]), ("Banks", vec!["B"])])
    }

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

    fn request(method: Method) -> PortfolioRequest {
        PortfolioRequest::new(
            vec![AssetSpec::new("A"), AssetSpec::new("B"), AssetSpec::new("C")],
            method,
        )
    }

    // ------------------------------------------------------------------
    // 1. Deserialisation defaults
    // ------------------------------------------------------------------
    #[test]
    fn test_json_defaults() {
        let req: PortfolioRequest =
            serde_json::from_str(r#"{"assets": [{"ticker": "A"}, {"ticker": "B", "max_pct": "60"}]}"#)
                .unwrap();
        assert_eq!(req.method, Method::MaxSharpe);
        assert_eq!(req.risk_free_rate_pct, dec!(6.389));
        assert_eq!(req.assets[0].max_pct, dec!(100));
        assert_eq!(req.assets[1].max_pct, dec!(60));
        assert_eq!(req.settings, SolverSettings::default());
        assert!(req.frontier.is_none());
    }

    #[test]
    fn test_method_names() {
        let req: PortfolioRequest =
            serde_json::from_str(r#"{"assets": [{"ticker": "A"}], "method": "target_risk"}"#).unwrap();
        assert_eq!(req.method, Method::TargetRisk);
    }

    // ------------------------------------------------------------------
    // 2. Validation
    // ------------------------------------------------------------------
    #[test]
    fn test_duplicate_ticker_rejected() {
        let req = PortfolioRequest::new(vec![AssetSpec::new("A"), AssetSpec::new("A")], Method::MinVolatility);
        assert!(matches!(req.validate(), Err(OptimizerError::InvalidInput { .. })));
    }

    #[test]
    fn test_min_above_max_rejected() {
        let mut req = request(Method::MinVolatility);
        req.assets[0].min_pct = dec!(50);
        req.assets[0].max_pct = dec!(40);
        assert!(matches!(req.validate(), Err(OptimizerError::InvalidConstraint { .. })));
    }

    #[test]
    fn test_percentage_out_of_range_rejected() {
        let mut req = request(Method::MinVolatility);
        req.assets[2].max_pct = dec!(120);
        assert!(matches!(req.validate(), Err(OptimizerError::InvalidInput { .. })));

        let mut req = request(Method::MinVolatility);
        req.sector_bounds.insert(
            "Tech".into(),
            SectorBoundSpec {
                min_pct: dec!(-5),
                max_pct: dec!(50),
            },
        );
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_empty_request_rejected() {
        let req = PortfolioRequest::new(Vec::new(), Method::MaxSharpe);
        assert!(req.validate().is_err());
    }

    // ------------------------------------------------------------------
    // 3. Conversion
    // ------------------------------------------------------------------
    #[test]
    fn test_percentages_become_fractions() {
        let mut req = request(Method::TargetReturn);
        req.assets[1].min_pct = dec!(10);
        req.assets[1].max_pct = dec!(35.5);
        let bounds = req.asset_bounds().unwrap();
        assert!((bounds[1].min - 0.10).abs() < 1e-15);
        assert!((bounds[1].max - 0.355).abs() < 1e-15);
        assert!((req.risk_free_rate().unwrap() - 0.06389).abs() < 1e-15);
    }

    #[test]
    fn test_target_defaults_to_ten_percent() {
        let req = request(Method::TargetReturn);
        assert_eq!(
            req.objective().unwrap(),
            Objective::TargetReturn {
                target_return: 0.10
            }
        );
        let mut req = request(Method::TargetRisk);
        req.target_pct = Some(dec!(18));
        assert_eq!(
            req.objective().unwrap(),
            Objective::TargetRisk { target_risk: 0.18 }
        );
    }

    #[test]
    fn test_sector_resolution_order() {
        let mut req = request(Method::MinVolatility);
        req.assets[0].sector = Some("Override".into());
        req.assets.push(AssetSpec::new("D"));
        assert_eq!(
            req.resolve_sectors(&sectors()),
            vec!["Override", "Banks", "Tech", UNKNOWN_SECTOR]
        );
    }

    // ------------------------------------------------------------------
    // 4. End to end
    // ------------------------------------------------------------------
    #[test]
    fn test_sector_cap_respected() {
        let mut req = request(Method::MaxSharpe);
        req.risk_free_rate_pct = dec!(5);
        req.sector_bounds.insert(
            "Tech".into(),
            SectorBoundSpec {
                min_pct: dec!(0),
                max_pct: dec!(50),
            },
        );
        let out = optimize_portfolio(&req, estimates(), &sectors()).unwrap();
        let tech = out.result.sector_allocation["Tech"];
        assert!(tech <= 0.50 + 1e-6);
        let total: f64 = out.result.weights.iter().map(|w| w.weight).sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert_eq!(out.metadata.precision, "ieee754_f64");
        assert_eq!(out.result.weights[1].sector, "Banks");
    }

    #[test]
    fn test_concentration_warning() {
        let req = request(Method::MinVolatility);
        let out = optimize_portfolio(&req, estimates(), &sectors()).unwrap();
        let b = out.result.weights[1].weight;
        assert!(b > 0.40);
        assert!(out
            .warnings
            .iter()
            .any(|w| w.starts_with("Concentrated position: B")));
    }

    #[test]
    fn test_frontier_attached_and_skips_reported() {
        let mut req = request(Method::MinVolatility);
        req.frontier = Some(FrontierSpec {
            min_return: 0.05,
            max_return: 0.13,
            points: 5,
        });
        let out = optimize_portfolio(&req, estimates(), &sectors()).unwrap();
        let frontier = out.result.frontier.unwrap();
        // 0.05 is below the lowest achievable return.
        assert!(frontier.skipped >= 1);
        assert!(out.warnings.iter().any(|w| w.contains("frontier targets")));
    }

    #[test]
    fn test_mismatched_estimates_rejected() {
        let mut req = request(Method::MinVolatility);
        req.assets.swap(0, 1);
        assert!(matches!(
            optimize_portfolio(&req, estimates(), &sectors()),
            Err(OptimizerError::InvalidInput { .. })
        ));
    }
}
