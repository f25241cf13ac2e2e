use crate::request::{BlendRequest, RequestError};
use crate::table::{Nutrient, NutrientTable};

/// The canonical linear program for one request:
///
/// ```text
/// minimize    objective . x
/// subject to  a_ub x <= b_ub
///             a_eq x == b_eq
///             bounds.0 <= x <= bounds.1
/// ```
///
/// All quantities are fractions of the whole mixture, not percentages.
#[derive(Debug, Clone)]
pub struct BlendProgram {
    /// Minimization coefficients; the semantic goal is maximization, so the
    /// objective nutrients enter negated
    pub objective: Vec<f64>,
    pub a_ub: Vec<Vec<f64>>,
    pub b_ub: Vec<f64>,
    /// Row labels parallel to `a_ub`, for diagnostics
    pub ub_labels: Vec<String>,
    pub a_eq: Vec<Vec<f64>>,
    pub b_eq: Vec<f64>,
    /// Per-variable (low, high) fraction bounds
    pub bounds: Vec<(f64, f64)>,
}

impl BlendProgram {
    pub fn num_variables(&self) -> usize {
        self.objective.len()
    }
}

/// Translate a validated request into the canonical form.
///
/// Per nutrient with range (L, H), two inequality rows are emitted: the
/// lower bound as `-sum <= -L/100` and the upper as `sum <= H/100`, with the
/// weighted per-unit fractions of each selected ingredient as coefficients.
/// Unknown fractions contribute 0.0 and are flagged downstream by the report
/// instead of failing the solve.
pub fn build_program(
    table: &NutrientTable,
    request: &BlendRequest,
) -> Result<BlendProgram, RequestError> {
    // A 0-column program is degenerate, never constructed
    if request.selected.is_empty() {
        return Err(RequestError::EmptySelection);
    }

    let n = request.selected.len();
    let mut compositions = Vec::with_capacity(n);
    for key in &request.selected {
        let ingredient = table
            .get(key)
            .ok_or_else(|| RequestError::UnknownIngredient(key.to_string()))?;
        compositions.push(ingredient.composition);
    }

    let mut a_ub = Vec::with_capacity(2 * Nutrient::COUNT);
    let mut b_ub = Vec::with_capacity(2 * Nutrient::COUNT);
    let mut ub_labels = Vec::with_capacity(2 * Nutrient::COUNT);

    for nutrient in Nutrient::ALL {
        let range = request.nutrient_ranges.get(nutrient);
        let (low, high) = range.as_fractions();
        let row: Vec<f64> = compositions
            .iter()
            .map(|c| c.known_or_zero(nutrient))
            .collect();

        a_ub.push(row.iter().map(|&v| -v).collect());
        b_ub.push(-low);
        ub_labels.push(format!("{nutrient}_min"));

        a_ub.push(row);
        b_ub.push(high);
        ub_labels.push(format!("{nutrient}_max"));
    }

    // The closed-system constraint: shares sum to the whole mixture
    let a_eq = vec![vec![1.0; n]];
    let b_eq = vec![1.0];

    let bounds = request
        .ingredient_ranges
        .iter()
        .map(|r| r.as_fractions())
        .collect();

    // Maximizing a nutrient sum means minimizing its negation. An empty
    // objective set leaves the vector all zero; any feasible point is then
    // an acceptable answer.
    let objective = compositions
        .iter()
        .map(|c| {
            -Nutrient::ALL
                .into_iter()
                .filter(|&nutrient| request.maximizes(nutrient))
                .map(|nutrient| c.known_or_zero(nutrient))
                .sum::<f64>()
        })
        .collect();

    Ok(BlendProgram {
        objective,
        a_ub,
        b_ub,
        ub_labels,
        a_eq,
        b_eq,
        bounds,
    })
}
