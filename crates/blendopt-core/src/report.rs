use crate::request::{BlendRequest, PctRange};
use crate::table::{Ingredient, IngredientKey, Nutrient};

/// Shares below this fraction cannot taint a total with their unknowns
const SHARE_EPSILON: f64 = 1e-9;

/// Round to the presentation precision of two decimal places
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One ingredient's share of the mixture, with the bounds it was asked to
/// stay inside (for charting value against range)
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct IngredientShare {
    pub ingredient: IngredientKey,
    /// Percentage of the total mixture, rounded to 2 decimals
    pub pct: f64,
    pub range: PctRange,
}

/// Aggregate amount of one nutrient per 100 units of mixture.
///
/// When a selected ingredient with a non-zero share has no data for this
/// nutrient, `per_100` holds only the known part and `missing` names the
/// ingredients whose contribution is unknown. A non-empty `missing` means
/// the number must not be presented as exact.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct NutrientTotal {
    pub nutrient: Nutrient,
    /// Known contribution per 100 units, rounded to 2 decimals
    pub per_100: f64,
    pub range: PctRange,
    pub missing: Vec<IngredientKey>,
}

impl NutrientTotal {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct BlendReport {
    pub shares: Vec<IngredientShare>,
    pub totals: Vec<NutrientTotal>,
}

/// Render a solution vector (fractions summing to 1, parallel to the
/// request's selection) into presentation form.
pub fn build_report(
    selection: &[&Ingredient],
    fractions: &[f64],
    request: &BlendRequest,
) -> BlendReport {
    debug_assert_eq!(selection.len(), fractions.len());

    let shares = selection
        .iter()
        .zip(fractions)
        .zip(&request.ingredient_ranges)
        .map(|((ingredient, &fraction), &range)| IngredientShare {
            ingredient: ingredient.key.clone(),
            pct: round2(fraction * 100.0),
            range,
        })
        .collect();

    let totals = Nutrient::ALL
        .into_iter()
        .map(|nutrient| {
            let mut known = 0.0;
            let mut missing = Vec::new();
            for (ingredient, &fraction) in selection.iter().zip(fractions) {
                match ingredient.composition.get(nutrient) {
                    Some(value) => known += fraction * value,
                    None if fraction > SHARE_EPSILON => missing.push(ingredient.key.clone()),
                    // An absent ingredient contributes exactly nothing
                    None => {}
                }
            }
            NutrientTotal {
                nutrient,
                per_100: round2(known * 100.0),
                range: request.nutrient_ranges.get(nutrient),
                missing,
            }
        })
        .collect();

    BlendReport { shares, totals }
}
