use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// The tracked nutrients, in the fixed order that constraint rows and
/// objective coefficients are laid out in.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nutrient {
    Water,
    Protein,
    Carbohydrate,
    Fat,
}

impl Nutrient {
    pub const COUNT: usize = 4;
    pub const ALL: [Nutrient; Nutrient::COUNT] = [
        Nutrient::Water,
        Nutrient::Protein,
        Nutrient::Carbohydrate,
        Nutrient::Fat,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Nutrient::Water => "water",
            Nutrient::Protein => "protein",
            Nutrient::Carbohydrate => "carbohydrate",
            Nutrient::Fat => "fat",
        }
    }
}

impl fmt::Display for Nutrient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-unit mass fractions of an ingredient, one per tracked nutrient.
/// `None` means the source had no usable value; it is carried through the
/// pipeline instead of being zero-filled so reports can tell "0%" apart from
/// "no data".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Composition {
    fractions: [Option<f64>; Nutrient::COUNT],
}

impl Composition {
    /// Values in the order of [`Nutrient::ALL`]. Known values must be finite
    /// and within [0, 1].
    pub fn from_values(values: [Option<f64>; Nutrient::COUNT]) -> Result<Self, TableError> {
        for (nutrient, value) in Nutrient::ALL.into_iter().zip(values) {
            if let Some(v) = value {
                if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                    return Err(TableError::FractionOutOfRange { nutrient, value: v });
                }
            }
        }
        Ok(Self { fractions: values })
    }

    pub fn get(&self, nutrient: Nutrient) -> Option<f64> {
        self.fractions[nutrient.index()]
    }

    /// Known fraction, or 0.0 for unknown. Callers that use this must flag
    /// the affected totals; see the report module.
    pub fn known_or_zero(&self, nutrient: Nutrient) -> f64 {
        self.fractions[nutrient.index()].unwrap_or(0.0)
    }

    pub fn is_complete(&self) -> bool {
        self.fractions.iter().all(Option::is_some)
    }
}

/// Composite ingredient identity. Name and description are unique together;
/// the description tells apart subtypes sharing a name.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IngredientKey {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
}

impl IngredientKey {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for IngredientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{} - {}", self.name, self.description)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ingredient {
    /// Descriptive grouping only; not part of the identity
    pub category: String,
    pub key: IngredientKey,
    pub composition: Composition,
}

/// Immutable catalog of ingredients, keyed by name + description. Built once
/// by the presentation layer and read-only for the lifetime of a request.
#[derive(Debug, Default)]
pub struct NutrientTable {
    ingredients: Vec<Ingredient>,
    index: HashMap<IngredientKey, usize>,
}

impl NutrientTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ingredient: Ingredient) -> Result<(), TableError> {
        if self.index.contains_key(&ingredient.key) {
            return Err(TableError::DuplicateIngredient(ingredient.key.to_string()));
        }
        self.index.insert(ingredient.key.clone(), self.ingredients.len());
        self.ingredients.push(ingredient);
        Ok(())
    }

    pub fn get(&self, key: &IngredientKey) -> Option<&Ingredient> {
        self.index.get(key).map(|&i| &self.ingredients[i])
    }

    pub fn contains(&self, key: &IngredientKey) -> bool {
        self.index.contains_key(key)
    }

    /// Ingredients in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Ingredient> {
        self.ingredients.iter()
    }

    pub fn len(&self) -> usize {
        self.ingredients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ingredients.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum TableError {
    #[error("duplicate ingredient: {0}")]
    DuplicateIngredient(String),
    #[error("{nutrient} fraction {value} is outside [0, 1]")]
    FractionOutOfRange { nutrient: Nutrient, value: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water_only() -> Composition {
        Composition::from_values([Some(1.0), Some(0.0), Some(0.0), Some(0.0)]).unwrap()
    }

    #[test]
    fn nutrient_order_is_stable() {
        let labels: Vec<_> = Nutrient::ALL.iter().map(|n| n.label()).collect();
        assert_eq!(labels, ["water", "protein", "carbohydrate", "fat"]);
        for (i, n) in Nutrient::ALL.into_iter().enumerate() {
            assert_eq!(n.index(), i);
        }
    }

    #[test]
    fn out_of_range_fraction_is_rejected() {
        let err = Composition::from_values([Some(1.2), None, None, None]).unwrap_err();
        assert!(matches!(err, TableError::FractionOutOfRange { nutrient: Nutrient::Water, .. }));

        let err = Composition::from_values([None, Some(-0.1), None, None]).unwrap_err();
        assert!(matches!(err, TableError::FractionOutOfRange { nutrient: Nutrient::Protein, .. }));

        assert!(Composition::from_values([None, Some(f64::NAN), None, None]).is_err());
    }

    #[test]
    fn unknown_values_stay_unknown() {
        let c = Composition::from_values([Some(0.6), None, Some(0.1), Some(0.1)]).unwrap();
        assert_eq!(c.get(Nutrient::Protein), None);
        assert_eq!(c.known_or_zero(Nutrient::Protein), 0.0);
        assert!(!c.is_complete());
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let mut table = NutrientTable::new();
        table
            .insert(Ingredient {
                category: "dairy".into(),
                key: IngredientKey::new("milk", "whole"),
                composition: water_only(),
            })
            .unwrap();
        // Same name, different description: a distinct subtype
        table
            .insert(Ingredient {
                category: "dairy".into(),
                key: IngredientKey::new("milk", "skim"),
                composition: water_only(),
            })
            .unwrap();

        let err = table
            .insert(Ingredient {
                category: "dairy".into(),
                key: IngredientKey::new("milk", "whole"),
                composition: water_only(),
            })
            .unwrap_err();
        assert!(matches!(err, TableError::DuplicateIngredient(_)));
        assert_eq!(table.len(), 2);
    }
}
