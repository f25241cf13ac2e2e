use std::collections::HashSet;

use thiserror::Error;

use crate::table::{IngredientKey, Nutrient, NutrientTable};

/// A closed percentage range within [0, 100], low <= high. Construction
/// validates; a deserialized range goes through the same check.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "(f64, f64)", into = "(f64, f64)")
)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PctRange {
    low: f64,
    high: f64,
}

impl PctRange {
    pub fn new(low: f64, high: f64) -> Result<Self, RequestError> {
        for bound in [low, high] {
            if !bound.is_finite() {
                return Err(RequestError::NonFiniteBound(bound));
            }
            if !(0.0..=100.0).contains(&bound) {
                return Err(RequestError::BoundOutOfRange(bound));
            }
        }
        if low > high {
            return Err(RequestError::InvertedRange { low, high });
        }
        Ok(Self { low, high })
    }

    /// The whole [0, 100] span
    pub fn full() -> Self {
        Self { low: 0.0, high: 100.0 }
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    /// Bounds as fractions of the whole rather than percentages
    pub fn as_fractions(&self) -> (f64, f64) {
        (self.low / 100.0, self.high / 100.0)
    }

    /// Distance from a percentage value to the nearest bound; 0 inside the
    /// range. This is the fallback search's per-nutrient penalty.
    pub fn distance_outside(&self, value: f64) -> f64 {
        if value < self.low {
            self.low - value
        } else if value > self.high {
            value - self.high
        } else {
            0.0
        }
    }
}

impl Default for PctRange {
    fn default() -> Self {
        Self::full()
    }
}

impl TryFrom<(f64, f64)> for PctRange {
    type Error = RequestError;

    fn try_from((low, high): (f64, f64)) -> Result<Self, Self::Error> {
        Self::new(low, high)
    }
}

impl From<PctRange> for (f64, f64) {
    fn from(range: PctRange) -> Self {
        (range.low, range.high)
    }
}

/// One range per tracked nutrient. The fixed field set makes a range for an
/// untracked nutrient unrepresentable.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NutrientRanges {
    #[cfg_attr(feature = "serde", serde(default))]
    pub water: PctRange,
    #[cfg_attr(feature = "serde", serde(default))]
    pub protein: PctRange,
    #[cfg_attr(feature = "serde", serde(default))]
    pub carbohydrate: PctRange,
    #[cfg_attr(feature = "serde", serde(default))]
    pub fat: PctRange,
}

impl NutrientRanges {
    pub fn get(&self, nutrient: Nutrient) -> PctRange {
        match nutrient {
            Nutrient::Water => self.water,
            Nutrient::Protein => self.protein,
            Nutrient::Carbohydrate => self.carbohydrate,
            Nutrient::Fat => self.fat,
        }
    }
}

/// Everything one optimization request needs: the decision variables, their
/// ranges, the nutrient ranges, and which nutrients to maximize. Built fresh
/// per request; the engine holds no state between requests.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct BlendRequest {
    /// Ordered decision variables, one weight per ingredient
    pub selected: Vec<IngredientKey>,
    /// Percentage share bounds, parallel to `selected`
    pub ingredient_ranges: Vec<PctRange>,
    pub nutrient_ranges: NutrientRanges,
    /// Nutrients whose summed contribution is maximized; empty means any
    /// feasible blend is acceptable
    #[cfg_attr(feature = "serde", serde(default))]
    pub maximize: Vec<Nutrient>,
}

impl BlendRequest {
    /// Surface every input problem before any solve work happens. Nothing is
    /// clamped on the caller's behalf.
    pub fn validate(&self, table: &NutrientTable) -> Result<(), RequestError> {
        if self.selected.is_empty() {
            return Err(RequestError::EmptySelection);
        }
        if self.selected.len() != self.ingredient_ranges.len() {
            return Err(RequestError::RangeCountMismatch {
                selected: self.selected.len(),
                ranges: self.ingredient_ranges.len(),
            });
        }

        let mut seen = HashSet::new();
        for key in &self.selected {
            if !seen.insert(key) {
                return Err(RequestError::DuplicateSelection(key.to_string()));
            }
            if !table.contains(key) {
                return Err(RequestError::UnknownIngredient(key.to_string()));
            }
        }

        Ok(())
    }

    /// True when `nutrient` is part of the maximization objective
    pub fn maximizes(&self, nutrient: Nutrient) -> bool {
        self.maximize.contains(&nutrient)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum RequestError {
    #[error("no ingredients selected")]
    EmptySelection,
    #[error("{selected} ingredients selected but {ranges} ranges given")]
    RangeCountMismatch { selected: usize, ranges: usize },
    #[error("ingredient selected twice: {0}")]
    DuplicateSelection(String),
    #[error("ingredient not in the table: {0}")]
    UnknownIngredient(String),
    #[error("range low {low} exceeds high {high}")]
    InvertedRange { low: f64, high: f64 },
    #[error("range bound {0} is outside [0, 100]")]
    BoundOutOfRange(f64),
    #[error("range bound {0} is not finite")]
    NonFiniteBound(f64),
}
