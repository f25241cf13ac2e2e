use crate::problem::{ConstraintOp, LpProblem};
use crate::solution::{Solution, SolutionStatus};

/// Two-phase simplex solver over a dense tableau.
///
/// Pivot selection scans columns left to right and takes the first most
/// positive reduced cost, so identical problems pivot identically and return
/// identical solutions.
pub struct Solver {
    /// Maximum pivots across both phases before giving up
    max_iterations: usize,
    /// Tolerance for floating point comparisons
    tolerance: f64,
}

impl Default for Solver {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 1e-9,
        }
    }
}

enum PhaseEnd {
    Converged,
    Unbounded,
    OutOfIterations,
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn solve(&self, problem: &LpProblem) -> Solution {
        let mut tableau = Tableau::build(problem);
        let mut iterations = 0;

        // Phase 1: drive artificial variables out of the basis
        if tableau.n_artificial > 0 {
            tableau.set_phase1_objective();
            match self.run_phase(&mut tableau, true, &mut iterations) {
                PhaseEnd::Converged => {}
                // No leaving row while artificials are being minimized means
                // the original constraints cannot all hold
                PhaseEnd::Unbounded => return Solution::infeasible(iterations),
                PhaseEnd::OutOfIterations => return Solution::iteration_limit(iterations),
            }
            if !tableau.artificials_cleared(self.tolerance) {
                return Solution::infeasible(iterations);
            }
            tableau.restore_objective(self.tolerance);
        }

        // Phase 2: optimize the real objective
        match self.run_phase(&mut tableau, false, &mut iterations) {
            PhaseEnd::Converged => self.extract(&tableau, problem, iterations),
            PhaseEnd::Unbounded => Solution::unbounded(iterations),
            PhaseEnd::OutOfIterations => Solution::iteration_limit(iterations),
        }
    }

    fn run_phase(
        &self,
        tableau: &mut Tableau,
        include_artificials: bool,
        iterations: &mut usize,
    ) -> PhaseEnd {
        let eligible = tableau.n_vars
            + tableau.n_slack
            + if include_artificials { tableau.n_artificial } else { 0 };

        while *iterations < self.max_iterations {
            let Some(col) = self.entering_column(tableau, eligible) else {
                return PhaseEnd::Converged;
            };
            let Some(row) = self.leaving_row(tableau, col) else {
                return PhaseEnd::Unbounded;
            };
            tableau.pivot(row, col);
            *iterations += 1;
        }

        // Budget spent. Converged only if no improving column remains.
        if self.entering_column(tableau, eligible).is_none() {
            PhaseEnd::Converged
        } else {
            PhaseEnd::OutOfIterations
        }
    }

    /// Column with the most positive reduced cost, or None at optimality
    fn entering_column(&self, tableau: &Tableau, eligible: usize) -> Option<usize> {
        let obj_row = tableau.data.len() - 1;
        let mut best_val = self.tolerance;
        let mut best_col = None;

        for j in 0..eligible {
            if tableau.data[obj_row][j] > best_val {
                best_val = tableau.data[obj_row][j];
                best_col = Some(j);
            }
        }

        best_col
    }

    /// Minimum-ratio row for the entering column, or None if unbounded
    fn leaving_row(&self, tableau: &Tableau, col: usize) -> Option<usize> {
        let n_rows = tableau.data.len() - 1;
        let rhs_col = tableau.data[0].len() - 1;

        let mut min_ratio = f64::INFINITY;
        let mut min_row = None;

        for i in 0..n_rows {
            let val = tableau.data[i][col];
            if val > self.tolerance {
                let ratio = tableau.data[i][rhs_col] / val;
                if ratio >= 0.0 && ratio < min_ratio {
                    min_ratio = ratio;
                    min_row = Some(i);
                }
            }
        }

        min_row
    }

    fn extract(&self, tableau: &Tableau, problem: &LpProblem, iterations: usize) -> Solution {
        let n_vars = problem.num_variables();
        let rhs_col = tableau.data[0].len() - 1;

        let mut values = vec![0.0; n_vars];
        for (i, &basic) in tableau.basic.iter().enumerate() {
            if basic < n_vars {
                values[basic] = tableau.data[i][rhs_col];
            }
        }

        let objective_value = values
            .iter()
            .zip(&problem.objective.coefficients)
            .map(|(x, c)| x * c)
            .sum();

        Solution {
            status: SolutionStatus::Optimal,
            values,
            objective_value,
            iterations,
        }
    }
}

struct Tableau {
    /// Constraint rows followed by the objective row; last column is the RHS
    data: Vec<Vec<f64>>,
    /// Basic variable per constraint row
    basic: Vec<usize>,
    n_vars: usize,
    n_slack: usize,
    n_artificial: usize,
    /// Original objective row, parked while phase 1 runs
    saved_objective: Vec<f64>,
}

impl Tableau {
    fn build(problem: &LpProblem) -> Self {
        let n_vars = problem.num_variables();

        // Normalize rows so every RHS is non-negative; a flipped row also
        // flips its operator (Le <-> Ge)
        let rows: Vec<(Vec<f64>, ConstraintOp, f64)> = problem
            .constraints
            .iter()
            .map(|c| {
                if c.rhs < 0.0 {
                    let coeffs = c.coefficients.iter().map(|&x| -x).collect();
                    let op = match c.op {
                        ConstraintOp::Le => ConstraintOp::Ge,
                        ConstraintOp::Ge => ConstraintOp::Le,
                        ConstraintOp::Eq => ConstraintOp::Eq,
                    };
                    (coeffs, op, -c.rhs)
                } else {
                    (c.coefficients.clone(), c.op, c.rhs)
                }
            })
            .collect();

        let mut n_slack = 0;
        let mut n_artificial = 0;
        for (_, op, _) in &rows {
            match op {
                ConstraintOp::Le => n_slack += 1,
                ConstraintOp::Ge => {
                    n_slack += 1; // surplus
                    n_artificial += 1;
                }
                ConstraintOp::Eq => n_artificial += 1,
            }
        }

        let total_cols = n_vars + n_slack + n_artificial + 1;
        let mut data = vec![vec![0.0; total_cols]; rows.len() + 1];
        let mut basic = vec![0; rows.len()];

        let mut slack_idx = n_vars;
        let mut artificial_idx = n_vars + n_slack;

        for (i, (coeffs, op, rhs)) in rows.iter().enumerate() {
            data[i][..n_vars].copy_from_slice(coeffs);
            data[i][total_cols - 1] = *rhs;

            match op {
                ConstraintOp::Le => {
                    data[i][slack_idx] = 1.0;
                    basic[i] = slack_idx;
                    slack_idx += 1;
                }
                ConstraintOp::Ge => {
                    data[i][slack_idx] = -1.0; // surplus
                    slack_idx += 1;
                    data[i][artificial_idx] = 1.0;
                    basic[i] = artificial_idx;
                    artificial_idx += 1;
                }
                ConstraintOp::Eq => {
                    data[i][artificial_idx] = 1.0;
                    basic[i] = artificial_idx;
                    artificial_idx += 1;
                }
            }
        }

        // Objective row holds the maximization form: reduced costs are
        // positive where the objective can improve
        let obj_row = rows.len();
        for (j, &coef) in problem.objective.coefficients.iter().enumerate() {
            data[obj_row][j] = if problem.objective.minimize { -coef } else { coef };
        }

        Self {
            data,
            basic,
            n_vars,
            n_slack,
            n_artificial,
            saved_objective: Vec::new(),
        }
    }

    /// Swap in the phase-1 objective: maximize minus the sum of artificials
    fn set_phase1_objective(&mut self) {
        let obj_row = self.data.len() - 1;
        let n_cols = self.data[0].len();
        let art_start = self.n_vars + self.n_slack;

        self.saved_objective = std::mem::replace(&mut self.data[obj_row], vec![0.0; n_cols]);
        for j in art_start..(art_start + self.n_artificial) {
            self.data[obj_row][j] = -1.0;
        }

        // Price out the basic artificials so the objective row is consistent
        // with the starting basis
        for i in 0..obj_row {
            if self.basic[i] >= art_start {
                for j in 0..n_cols {
                    self.data[obj_row][j] += self.data[i][j];
                }
            }
        }
    }

    /// True when every artificial still in the basis carries a ~zero value
    fn artificials_cleared(&self, tolerance: f64) -> bool {
        let art_start = self.n_vars + self.n_slack;
        let rhs_col = self.data[0].len() - 1;

        self.basic
            .iter()
            .enumerate()
            .all(|(i, &b)| b < art_start || self.data[i][rhs_col].abs() <= tolerance)
    }

    /// Put the real objective back and price out the current basis
    fn restore_objective(&mut self, tolerance: f64) {
        let obj_row = self.data.len() - 1;
        let n_cols = self.data[0].len();

        self.data[obj_row] = std::mem::take(&mut self.saved_objective);
        for i in 0..obj_row {
            let basic = self.basic[i];
            let ratio = self.data[obj_row][basic];
            if ratio.abs() > tolerance {
                for j in 0..n_cols {
                    self.data[obj_row][j] -= ratio * self.data[i][j];
                }
            }
        }
    }

    fn pivot(&mut self, row: usize, col: usize) {
        let n_rows = self.data.len();
        let n_cols = self.data[0].len();

        self.basic[row] = col;

        let pivot_val = self.data[row][col];
        for j in 0..n_cols {
            self.data[row][j] /= pivot_val;
        }

        for i in 0..n_rows {
            if i != row {
                let factor = self.data[i][col];
                if factor != 0.0 {
                    for j in 0..n_cols {
                        self.data[i][j] -= factor * self.data[row][j];
                    }
                }
            }
        }
    }
}
