//! Strictly convex quadratic programs solved with the Goldfarb-Idnani dual
//! active-set method:
//!
//! ```text
//! minimise   ½ dᵀ G d + aᵀ d
//! subject to nᵢᵀ d  = bᵢ   (equality rows)
//!            nᵢᵀ d >= bᵢ   (inequality rows)
//! ```
//!
//! `G` must be symmetric positive definite. The method starts from the
//! unconstrained minimiser and adds violated rows one at a time, so it needs
//! no feasible starting point and proves infeasibility when no dual step
//! exists. Every step re-solves the small dense systems from scratch.

use crate::linalg::{cholesky, cholesky_solve, dot, norm_inf, solve_linear};

/// Rows closer than this to their right-hand side count as satisfied.
const FEASIBILITY_EPS: f64 = 1e-11;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QpRow {
    pub normal: Vec<f64>,
    pub rhs: f64,
    pub equality: bool,
}

impl QpRow {
    pub fn equality(normal: Vec<f64>, rhs: f64) -> Self {
        Self {
            normal,
            rhs,
            equality: true,
        }
    }

    pub fn inequality(normal: Vec<f64>, rhs: f64) -> Self {
        Self {
            normal,
            rhs,
            equality: false,
        }
    }

    fn slack(&self, d: &[f64]) -> f64 {
        dot(&self.normal, d) - self.rhs
    }

    fn tolerance(&self) -> f64 {
        FEASIBILITY_EPS * (1.0 + self.rhs.abs() + norm_inf(&self.normal))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QpSolution {
    pub d: Vec<f64>,
    /// One multiplier per row, zero for inactive rows. Inequality
    /// multipliers are non-negative; equality multipliers carry a sign.
    pub multipliers: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QpFailure {
    /// The rows admit no common solution.
    Infeasible,
    /// `G` is not positive definite, or the active normals degenerated.
    Numerical,
}

struct ActiveRow {
    row: usize,
    /// -1 when an equality row entered with its sign flipped.
    sign: f64,
    multiplier: f64,
}

pub(crate) fn solve_qp(g: &[Vec<f64>], a: &[f64], rows: &[QpRow]) -> Result<QpSolution, QpFailure> {
    let n = a.len();
    let l = cholesky(g).ok_or(QpFailure::Numerical)?;
    let g_inv = |v: &[f64]| cholesky_solve(&l, v);

    let mut d: Vec<f64> = g_inv(a).into_iter().map(|v| -v).collect();
    let mut active: Vec<ActiveRow> = Vec::new();
    let mut skipped = vec![false; rows.len()];

    let mut budget = 50 * (rows.len() + n) + 100;

    loop {
        let Some((p, sign)) = pick_violated(rows, &d, &active, &skipped) else {
            break;
        };
        let normal: Vec<f64> = rows[p].normal.iter().map(|v| sign * v).collect();
        let rhs = sign * rows[p].rhs;
        let mut new_multiplier = 0.0;

        loop {
            budget = budget.checked_sub(1).ok_or(QpFailure::Numerical)?;

            let (z, r) = step_directions(&g_inv, rows, &active, &normal)?;
            let slack = dot(&normal, &d) - rhs;

            // Partial step: largest dual move keeping active inequality
            // multipliers non-negative.
            let mut t1 = f64::INFINITY;
            let mut drop_at = None;
            for (j, act) in active.iter().enumerate() {
                if rows[act.row].equality || r[j] <= 0.0 {
                    continue;
                }
                let t = act.multiplier / r[j];
                if t < t1 {
                    t1 = t;
                    drop_at = Some(j);
                }
            }

            let curvature = dot(&z, &normal);
            let reference = dot(&normal, &g_inv(&normal)).max(f64::MIN_POSITIVE);
            let t2 = if curvature <= 1e-12 * reference {
                f64::INFINITY
            } else {
                (-slack / curvature).max(0.0)
            };

            if t2.is_infinite() {
                if rows[p].equality && slack.abs() <= rows[p].tolerance() {
                    // Redundant with the active equalities.
                    skipped[p] = true;
                    break;
                }
                let Some(k) = drop_at else {
                    return Err(QpFailure::Infeasible);
                };
                for (j, act) in active.iter_mut().enumerate() {
                    act.multiplier -= t1 * r[j];
                }
                new_multiplier += t1;
                active.remove(k);
                continue;
            }

            let t = t1.min(t2);
            for (di, zi) in d.iter_mut().zip(z.iter()) {
                *di += t * zi;
            }
            for (j, act) in active.iter_mut().enumerate() {
                act.multiplier -= t * r[j];
            }
            new_multiplier += t;

            if t2 <= t1 {
                active.push(ActiveRow {
                    row: p,
                    sign,
                    multiplier: new_multiplier,
                });
                break;
            }
            if let Some(k) = drop_at {
                active.remove(k);
            }
        }
    }

    let mut multipliers = vec![0.0; rows.len()];
    for act in &active {
        multipliers[act.row] = if rows[act.row].equality {
            act.sign * act.multiplier
        } else {
            act.multiplier.max(0.0)
        };
    }
    Ok(QpSolution { d, multipliers })
}

/// Equalities enter first (flipped so that they read as violated `>=`
/// rows), then the most violated inequality.
fn pick_violated(
    rows: &[QpRow],
    d: &[f64],
    active: &[ActiveRow],
    skipped: &[bool],
) -> Option<(usize, f64)> {
    let is_active = |i: usize| active.iter().any(|a| a.row == i);

    let equality = rows
        .iter()
        .enumerate()
        .filter(|(i, row)| row.equality && !skipped[*i] && !is_active(*i))
        .map(|(i, row)| (i, row.slack(d)))
        .max_by(|x, y| x.1.abs().total_cmp(&y.1.abs()));
    if let Some((i, slack)) = equality {
        return Some((i, if slack > 0.0 { -1.0 } else { 1.0 }));
    }

    rows.iter()
        .enumerate()
        .filter(|(i, row)| !row.equality && !is_active(*i))
        .map(|(i, row)| (i, row.slack(d), row.tolerance()))
        .filter(|(_, slack, tol)| *slack < -tol)
        .min_by(|x, y| x.1.total_cmp(&y.1))
        .map(|(i, _, _)| (i, 1.0))
}

/// Primal direction `z = G⁻¹(n - N r)` and dual direction
/// `r = (Nᵀ G⁻¹ N)⁻¹ Nᵀ G⁻¹ n` for the candidate normal `n`.
fn step_directions(
    g_inv: &impl Fn(&[f64]) -> Vec<f64>,
    rows: &[QpRow],
    active: &[ActiveRow],
    normal: &[f64],
) -> Result<(Vec<f64>, Vec<f64>), QpFailure> {
    let g_inv_n = g_inv(normal);
    if active.is_empty() {
        return Ok((g_inv_n, Vec::new()));
    }

    let cols: Vec<Vec<f64>> = active
        .iter()
        .map(|act| rows[act.row].normal.iter().map(|v| act.sign * v).collect())
        .collect();
    let w: Vec<Vec<f64>> = cols.iter().map(|c| g_inv(c)).collect();

    let q = cols.len();
    let m: Vec<Vec<f64>> = (0..q)
        .map(|i| (0..q).map(|j| dot(&cols[i], &w[j])).collect())
        .collect();
    let h: Vec<f64> = w.iter().map(|wj| dot(wj, normal)).collect();
    let r = solve_linear(&m, &h).ok_or(QpFailure::Numerical)?;

    let mut z = g_inv_n;
    for (wj, rj) in w.iter().zip(r.iter()) {
        for (zi, wji) in z.iter_mut().zip(wj.iter()) {
            *zi -= rj * wji;
        }
    }
    Ok((z, r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::identity;

    #[test]
    fn test_unconstrained_minimiser() {
        let sol = solve_qp(&identity(2), &[-1.0, -2.0], &[]).unwrap();
        assert!((sol.d[0] - 1.0).abs() < 1e-12);
        assert!((sol.d[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_equality_and_active_inequality() {
        // min ½|d|² - d1 - d2  s.t.  d1 + d2 = 1,  d1 <= 0.2
        let rows = vec![
            QpRow::equality(vec![1.0, 1.0], 1.0),
            QpRow::inequality(vec![-1.0, 0.0], -0.2),
        ];
        let sol = solve_qp(&identity(2), &[-1.0, -1.0], &rows).unwrap();
        assert!((sol.d[0] - 0.2).abs() < 1e-10);
        assert!((sol.d[1] - 0.8).abs() < 1e-10);
        assert!((sol.multipliers[0] + 0.2).abs() < 1e-10);
        assert!((sol.multipliers[1] - 0.6).abs() < 1e-10);
    }

    #[test]
    fn test_inactive_inequality_has_zero_multiplier() {
        let rows = vec![
            QpRow::equality(vec![1.0, 1.0], 1.0),
            QpRow::inequality(vec![1.0, 0.0], -5.0),
        ];
        let sol = solve_qp(&identity(2), &[0.0, 0.0], &rows).unwrap();
        assert!((sol.d[0] - 0.5).abs() < 1e-10);
        assert_eq!(sol.multipliers[1], 0.0);
    }

    #[test]
    fn test_requires_dropping_a_constraint() {
        // Unconstrained optimum (3, -1) violates d2 >= 0 and d1 <= 1.
        // Optimum on the box corner is (1, 0).
        let g = vec![vec![2.0, 0.5], vec![0.5, 1.0]];
        let a = [-(2.0 * 3.0 + 0.5 * -1.0), -(0.5 * 3.0 + 1.0 * -1.0)];
        let rows = vec![
            QpRow::inequality(vec![0.0, 1.0], 0.0),
            QpRow::inequality(vec![-1.0, 0.0], -1.0),
        ];
        let sol = solve_qp(&g, &a, &rows).unwrap();
        // KKT check: stationarity with non-negative multipliers.
        for (row, u) in rows.iter().zip(sol.multipliers.iter()) {
            assert!(*u >= 0.0);
            assert!(row.slack(&sol.d) >= -1e-10);
        }
        let grad: Vec<f64> = (0..2)
            .map(|i| dot(&g[i], &sol.d) + a[i])
            .collect();
        for i in 0..2 {
            let combo: f64 = rows
                .iter()
                .zip(sol.multipliers.iter())
                .map(|(row, u)| u * row.normal[i])
                .sum();
            assert!((grad[i] - combo).abs() < 1e-9);
        }
    }

    #[test]
    fn test_contradictory_rows_infeasible() {
        let rows = vec![
            QpRow::inequality(vec![1.0, 0.0], 1.0),
            QpRow::inequality(vec![-1.0, 0.0], 0.0),
        ];
        assert_eq!(
            solve_qp(&identity(2), &[0.0, 0.0], &rows),
            Err(QpFailure::Infeasible)
        );
    }

    #[test]
    fn test_inconsistent_equalities_infeasible() {
        let rows = vec![
            QpRow::equality(vec![1.0, 1.0], 1.0),
            QpRow::equality(vec![2.0, 2.0], 3.0),
        ];
        assert_eq!(
            solve_qp(&identity(2), &[0.0, 0.0], &rows),
            Err(QpFailure::Infeasible)
        );
    }

    #[test]
    fn test_redundant_equality_skipped() {
        let rows = vec![
            QpRow::equality(vec![1.0, 1.0], 1.0),
            QpRow::equality(vec![2.0, 2.0], 2.0),
        ];
        let sol = solve_qp(&identity(2), &[0.0, 0.0], &rows).unwrap();
        assert!((sol.d[0] + sol.d[1] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_pinned_variable_from_opposing_rows() {
        // 0.5 <= d1 <= 0.5 expressed as two inequalities.
        let rows = vec![
            QpRow::equality(vec![1.0, 1.0], 1.0),
            QpRow::inequality(vec![1.0, 0.0], 0.5),
            QpRow::inequality(vec![-1.0, 0.0], -0.5),
        ];
        let sol = solve_qp(&identity(2), &[-3.0, 0.0], &rows).unwrap();
        assert!((sol.d[0] - 0.5).abs() < 1e-10);
        assert!((sol.d[1] - 0.5).abs() < 1e-10);
    }
}
