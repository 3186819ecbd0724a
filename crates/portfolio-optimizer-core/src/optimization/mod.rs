pub mod constraints;
pub mod driver;
pub mod frontier;
pub mod objectives;
pub(crate) mod qp;
pub mod solver;

pub use constraints::{build_constraints, group_by_sector, ConstraintSet, SectorGrouping, WeightBound};
pub use driver::{optimize, OptimizationProblem, OptimizedPortfolio};
pub use frontier::{compute_frontier, sweep_target_returns, EfficientFrontier, FrontierSpec};
pub use objectives::Objective;
pub use solver::{minimize, ObjectiveFunction, SolverOutcome, SolverSettings};
