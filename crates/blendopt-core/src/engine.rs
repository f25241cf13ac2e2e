use std::fmt;

use blendopt_solver::{ConstraintOp, LpProblem, SolutionStatus, Solver};
use thiserror::Error;

use crate::builder::{build_program, BlendProgram};
use crate::fallback::{self, SearchError, SearchLimits};
use crate::report::{build_report, BlendReport};
use crate::request::{BlendRequest, RequestError};
use crate::table::{Composition, Ingredient, NutrientTable};

/// Why the linear solve did not produce an optimum. Carried on approximate
/// outcomes and failures so callers can tell a genuinely over-constrained
/// request apart from a solver that gave up.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpFailure {
    Infeasible,
    Unbounded,
    NumericalFailure,
}

impl fmt::Display for LpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LpFailure::Infeasible => "infeasible",
            LpFailure::Unbounded => "unbounded",
            LpFailure::NumericalFailure => "numerically degenerate",
        })
    }
}

/// A successful optimization
#[derive(Debug, Clone)]
pub enum BlendOutcome {
    /// The linear program had an optimum
    Optimal(BlendReport),
    /// The linear program had no solution; this is the least-violating grid
    /// composition instead, and must be presented as an approximation
    Approximate {
        report: BlendReport,
        /// Summed out-of-range distance of the returned composition
        penalty: f64,
        lp_failure: LpFailure,
    },
}

impl BlendOutcome {
    pub fn report(&self) -> &BlendReport {
        match self {
            BlendOutcome::Optimal(report) => report,
            BlendOutcome::Approximate { report, .. } => report,
        }
    }
}

#[derive(Error, Debug)]
pub enum BlendError {
    /// The request itself is malformed; nothing was attempted
    #[error(transparent)]
    Request(#[from] RequestError),
    /// The linear program failed and the fallback search either found no
    /// candidate or never ran (see the source variant)
    #[error("linear solve was {lp_failure}; {source}")]
    Fallback {
        lp_failure: LpFailure,
        source: SearchError,
    },
}

/// The optimization pipeline: validate, build, solve, fall back if needed,
/// format. One `solve` call is a pure function of its inputs; nothing is
/// cached across requests.
pub struct Engine {
    solver: Solver,
    limits: SearchLimits,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            solver: Solver::new(),
            limits: SearchLimits::default(),
        }
    }

    pub fn with_solver(mut self, solver: Solver) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn solve(
        &self,
        table: &NutrientTable,
        request: &BlendRequest,
    ) -> Result<BlendOutcome, BlendError> {
        request.validate(table)?;

        let mut selection: Vec<&Ingredient> = Vec::with_capacity(request.selected.len());
        for key in &request.selected {
            let ingredient = table
                .get(key)
                .ok_or_else(|| RequestError::UnknownIngredient(key.to_string()))?;
            selection.push(ingredient);
        }

        let program = build_program(table, request)?;
        let lp = lower(&program, request);
        let solution = self.solver.solve(&lp);

        let lp_failure = match solution.status {
            SolutionStatus::Optimal => {
                let report = build_report(&selection, &solution.values, request);
                return Ok(BlendOutcome::Optimal(report));
            }
            SolutionStatus::Infeasible => LpFailure::Infeasible,
            // The equality row pins the variable sum, so this is handled
            // defensively rather than expected
            SolutionStatus::Unbounded => LpFailure::Unbounded,
            SolutionStatus::IterationLimit => LpFailure::NumericalFailure,
        };

        let compositions: Vec<Composition> =
            selection.iter().map(|i| i.composition).collect();
        match fallback::search(
            &compositions,
            &request.ingredient_ranges,
            &request.nutrient_ranges,
            &self.limits,
        ) {
            Ok(grid) => {
                let fractions: Vec<f64> =
                    grid.shares_pct.iter().map(|pct| pct / 100.0).collect();
                let report = build_report(&selection, &fractions, request);
                Ok(BlendOutcome::Approximate {
                    report,
                    penalty: grid.penalty,
                    lp_failure,
                })
            }
            Err(source) => Err(BlendError::Fallback { lp_failure, source }),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Lower the canonical form to solver rows. Variable bounds become explicit
/// rows; a zero lower bound is already implied by the solver's non-negative
/// variables and is not emitted.
fn lower(program: &BlendProgram, request: &BlendRequest) -> LpProblem {
    let variables: Vec<String> = request.selected.iter().map(|k| k.to_string()).collect();
    let mut lp = LpProblem::new(variables);
    lp.set_objective(program.objective.clone(), true);

    for ((row, &rhs), label) in program.a_ub.iter().zip(&program.b_ub).zip(&program.ub_labels) {
        lp.add_constraint(label.clone(), row.clone(), ConstraintOp::Le, rhs);
    }
    for (row, &rhs) in program.a_eq.iter().zip(&program.b_eq) {
        lp.add_constraint("total", row.clone(), ConstraintOp::Eq, rhs);
    }
    for (i, &(low, high)) in program.bounds.iter().enumerate() {
        let mut coeffs = vec![0.0; program.num_variables()];
        coeffs[i] = 1.0;
        if low > 0.0 {
            lp.add_constraint(
                format!("{}_low", lp.variables[i]),
                coeffs.clone(),
                ConstraintOp::Ge,
                low,
            );
        }
        lp.add_constraint(
            format!("{}_high", lp.variables[i]),
            coeffs,
            ConstraintOp::Le,
            high,
        );
    }

    lp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{NutrientRanges, PctRange};
    use crate::table::{IngredientKey, Nutrient};

    fn insert(
        table: &mut NutrientTable,
        name: &str,
        values: [Option<f64>; 4],
    ) {
        table
            .insert(Ingredient {
                category: "test".into(),
                key: IngredientKey::new(name, ""),
                composition: Composition::from_values(values).unwrap(),
            })
            .unwrap();
    }

    #[test]
    fn single_pinned_ingredient_echoes_its_composition() {
        let mut table = NutrientTable::new();
        insert(&mut table, "x", [Some(0.6), Some(0.2), Some(0.1), Some(0.1)]);
        let request = BlendRequest {
            selected: vec![IngredientKey::new("x", "")],
            ingredient_ranges: vec![PctRange::new(100.0, 100.0).unwrap()],
            nutrient_ranges: NutrientRanges::default(),
            maximize: Nutrient::ALL.to_vec(),
        };

        let outcome = Engine::new().solve(&table, &request).unwrap();
        let BlendOutcome::Optimal(report) = outcome else {
            panic!("expected an optimal outcome");
        };

        assert_eq!(report.shares[0].pct, 100.0);
        let per_100: Vec<f64> = report.totals.iter().map(|t| t.per_100).collect();
        assert_eq!(per_100, vec![60.0, 20.0, 10.0, 10.0]);
    }

    #[test]
    fn maximizing_protein_lands_on_the_tightest_feasible_corner() {
        // X is pure protein, Y pure carbohydrate. Carbohydrate's lower bound
        // of 40 forces Y >= 40, which caps protein at 60.
        let mut table = NutrientTable::new();
        insert(&mut table, "x", [Some(0.0), Some(1.0), Some(0.0), Some(0.0)]);
        insert(&mut table, "y", [Some(0.0), Some(0.0), Some(1.0), Some(0.0)]);
        let request = BlendRequest {
            selected: vec![IngredientKey::new("x", ""), IngredientKey::new("y", "")],
            ingredient_ranges: vec![
                PctRange::new(30.0, 70.0).unwrap(),
                PctRange::new(30.0, 70.0).unwrap(),
            ],
            nutrient_ranges: NutrientRanges {
                protein: PctRange::new(40.0, 60.0).unwrap(),
                carbohydrate: PctRange::new(40.0, 60.0).unwrap(),
                ..NutrientRanges::default()
            },
            maximize: vec![Nutrient::Protein],
        };

        let outcome = Engine::new().solve(&table, &request).unwrap();
        let BlendOutcome::Optimal(report) = outcome else {
            panic!("expected an optimal outcome");
        };

        assert!((report.shares[0].pct - 60.0).abs() < 1e-6);
        assert!((report.shares[1].pct - 40.0).abs() < 1e-6);

        // Shares sum to the whole and stay inside their ranges
        let sum: f64 = report.shares.iter().map(|s| s.pct).sum();
        assert!((sum - 100.0).abs() < 1e-6);
        for share in &report.shares {
            assert!(share.pct >= share.range.low() - 1e-6);
            assert!(share.pct <= share.range.high() + 1e-6);
        }
    }

    #[test]
    fn same_request_same_answer() {
        let mut table = NutrientTable::new();
        insert(&mut table, "x", [Some(0.1), Some(0.5), Some(0.3), Some(0.1)]);
        insert(&mut table, "y", [Some(0.3), Some(0.1), Some(0.5), Some(0.1)]);
        let request = BlendRequest {
            selected: vec![IngredientKey::new("x", ""), IngredientKey::new("y", "")],
            ingredient_ranges: vec![
                PctRange::new(10.0, 90.0).unwrap(),
                PctRange::new(10.0, 90.0).unwrap(),
            ],
            nutrient_ranges: NutrientRanges::default(),
            maximize: vec![Nutrient::Protein],
        };

        let engine = Engine::new();
        let first = engine.solve(&table, &request).unwrap();
        let second = engine.solve(&table, &request).unwrap();

        let a: Vec<f64> = first.report().shares.iter().map(|s| s.pct).collect();
        let b: Vec<f64> = second.report().shares.iter().map(|s| s.pct).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_objective_still_returns_a_feasible_blend() {
        let mut table = NutrientTable::new();
        insert(&mut table, "x", [Some(0.5), Some(0.2), Some(0.2), Some(0.1)]);
        insert(&mut table, "y", [Some(0.8), Some(0.1), Some(0.05), Some(0.05)]);
        let request = BlendRequest {
            selected: vec![IngredientKey::new("x", ""), IngredientKey::new("y", "")],
            ingredient_ranges: vec![PctRange::full(), PctRange::full()],
            nutrient_ranges: NutrientRanges::default(),
            maximize: vec![],
        };

        let outcome = Engine::new().solve(&table, &request).unwrap();
        let BlendOutcome::Optimal(report) = outcome else {
            panic!("expected an optimal outcome");
        };
        let sum: f64 = report.shares.iter().map(|s| s.pct).sum();
        assert!((sum - 100.0).abs() < 1e-6);
    }

    #[test]
    fn infeasible_with_no_grid_candidate_is_terminal() {
        // Shares capped at 10% each can never sum to 100
        let mut table = NutrientTable::new();
        insert(&mut table, "x", [Some(0.5), Some(0.2), Some(0.2), Some(0.1)]);
        insert(&mut table, "y", [Some(0.8), Some(0.1), Some(0.05), Some(0.05)]);
        let request = BlendRequest {
            selected: vec![IngredientKey::new("x", ""), IngredientKey::new("y", "")],
            ingredient_ranges: vec![
                PctRange::new(0.0, 10.0).unwrap(),
                PctRange::new(0.0, 10.0).unwrap(),
            ],
            nutrient_ranges: NutrientRanges::default(),
            maximize: vec![],
        };

        let err = Engine::new().solve(&table, &request).unwrap_err();
        assert!(matches!(
            err,
            BlendError::Fallback {
                lp_failure: LpFailure::Infeasible,
                source: SearchError::NoCandidate { .. },
            }
        ));
    }

    #[test]
    fn infeasible_nutrient_range_falls_back_to_the_closest_grid_point() {
        // The only composition is 100% pure protein, but protein is capped
        // at 10; the fallback returns it with the 90-point violation spelled
        // out instead of failing silently
        let mut table = NutrientTable::new();
        insert(&mut table, "x", [Some(0.0), Some(1.0), Some(0.0), Some(0.0)]);
        let request = BlendRequest {
            selected: vec![IngredientKey::new("x", "")],
            ingredient_ranges: vec![PctRange::new(100.0, 100.0).unwrap()],
            nutrient_ranges: NutrientRanges {
                protein: PctRange::new(0.0, 10.0).unwrap(),
                ..NutrientRanges::default()
            },
            maximize: vec![],
        };

        let outcome = Engine::new().solve(&table, &request).unwrap();
        let BlendOutcome::Approximate { report, penalty, lp_failure } = outcome else {
            panic!("expected an approximate outcome");
        };

        assert_eq!(lp_failure, LpFailure::Infeasible);
        assert!((penalty - 90.0).abs() < 1e-9);
        assert_eq!(report.shares[0].pct, 100.0);
    }

    #[test]
    fn unknown_nutrient_data_is_flagged_not_zeroed() {
        let mut table = NutrientTable::new();
        insert(&mut table, "x", [Some(0.6), None, Some(0.2), Some(0.2)]);
        let request = BlendRequest {
            selected: vec![IngredientKey::new("x", "")],
            ingredient_ranges: vec![PctRange::new(100.0, 100.0).unwrap()],
            nutrient_ranges: NutrientRanges::default(),
            maximize: vec![Nutrient::Water],
        };

        let outcome = Engine::new().solve(&table, &request).unwrap();
        let report = outcome.report();
        let protein = &report.totals[Nutrient::Protein.index()];

        assert!(!protein.is_complete());
        assert_eq!(protein.missing, vec![IngredientKey::new("x", "")]);
    }

    #[test]
    fn malformed_requests_never_reach_the_solver() {
        let table = NutrientTable::new();
        let request = BlendRequest {
            selected: vec![],
            ingredient_ranges: vec![],
            nutrient_ranges: NutrientRanges::default(),
            maximize: vec![],
        };

        let err = Engine::new().solve(&table, &request).unwrap_err();
        assert!(matches!(err, BlendError::Request(RequestError::EmptySelection)));
    }
}
