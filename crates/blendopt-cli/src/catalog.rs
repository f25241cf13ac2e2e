//! Ingredient catalog loading.
//!
//! The catalog is a delimited text file (`;` or `,`, detected from the
//! header) with the columns category, name, description and the four
//! nutrient amounts per 100 units. Decimal commas are normalized before
//! parsing; cells that still fail to parse become unknown values rather than
//! zeros, so the engine can report them as missing data.

use std::path::Path;

use blendopt_core::{Composition, Ingredient, IngredientKey, Nutrient, NutrientTable, TableError};
use thiserror::Error;

const COLUMNS: [&str; 7] = [
    "category",
    "name",
    "description",
    "water",
    "protein",
    "carbohydrate",
    "fat",
];

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} has no header row")]
    Empty { path: String },
    #[error("header is missing the {0:?} column")]
    MissingColumn(&'static str),
    #[error("line {line}: expected {expected} columns, found {found}")]
    ColumnCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: {source}")]
    Table {
        line: usize,
        #[source]
        source: TableError,
    },
}

pub fn load(path: &Path) -> Result<NutrientTable, CatalogError> {
    let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse(&text).map_err(|err| match err {
        CatalogError::Empty { .. } => CatalogError::Empty {
            path: path.display().to_string(),
        },
        other => other,
    })
}

pub fn parse(text: &str) -> Result<NutrientTable, CatalogError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line))
        .filter(|(_, line)| !line.trim().is_empty());

    let (_, header) = lines.next().ok_or(CatalogError::Empty { path: String::new() })?;
    let delimiter = if header.contains(';') { ';' } else { ',' };

    let header_fields: Vec<String> = split_record(header, delimiter)
        .into_iter()
        .map(|f| f.trim().to_lowercase())
        .collect();
    let mut positions = [0usize; COLUMNS.len()];
    for (slot, column) in positions.iter_mut().zip(COLUMNS) {
        *slot = header_fields
            .iter()
            .position(|f| f == column)
            .ok_or(CatalogError::MissingColumn(column))?;
    }
    let width = positions.iter().max().copied().unwrap_or(0) + 1;

    let mut table = NutrientTable::new();
    for (line, raw) in lines {
        let fields = split_record(raw, delimiter);
        if fields.len() < width {
            return Err(CatalogError::ColumnCount {
                line,
                expected: width,
                found: fields.len(),
            });
        }

        let cell = |i: usize| fields[positions[i]].trim();
        let mut values = [None; Nutrient::COUNT];
        for (slot, column) in values.iter_mut().zip(3..COLUMNS.len()) {
            *slot = parse_fraction(cell(column));
        }

        let composition = Composition::from_values(values)
            .map_err(|source| CatalogError::Table { line, source })?;
        table
            .insert(Ingredient {
                category: cell(0).to_string(),
                key: IngredientKey::new(cell(1), cell(2)),
                composition,
            })
            .map_err(|source| CatalogError::Table { line, source })?;
    }

    Ok(table)
}

/// Amount per 100 units -> fraction. Decimal commas are normalized first;
/// anything that still fails to parse is an unknown, not a zero.
fn parse_fraction(cell: &str) -> Option<f64> {
    if cell.is_empty() {
        return None;
    }
    cell.replace(',', ".").parse::<f64>().ok().map(|v| v / 100.0)
}

fn split_record(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_commas_are_normalized() {
        let table = parse(
            "category;name;description;water;protein;carbohydrate;fat\n\
             grain;oats;rolled;10,5;13,2;68,0;6,5\n",
        )
        .unwrap();

        let oats = table.get(&IngredientKey::new("oats", "rolled")).unwrap();
        assert!((oats.composition.get(Nutrient::Water).unwrap() - 0.105).abs() < 1e-12);
        assert!((oats.composition.get(Nutrient::Protein).unwrap() - 0.132).abs() < 1e-12);
    }

    #[test]
    fn comma_delimited_files_also_load() {
        let table = parse(
            "category,name,description,water,protein,carbohydrate,fat\n\
             grain,oats,rolled,10.5,13.2,68.0,6.5\n",
        )
        .unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn unparseable_cells_become_unknown() {
        let table = parse(
            "category;name;description;water;protein;carbohydrate;fat\n\
             dairy;milk;whole;88;3,3;;n/a\n",
        )
        .unwrap();

        let milk = table.get(&IngredientKey::new("milk", "whole")).unwrap();
        assert_eq!(milk.composition.get(Nutrient::Carbohydrate), None);
        assert_eq!(milk.composition.get(Nutrient::Fat), None);
        assert!(milk.composition.get(Nutrient::Water).is_some());
    }

    #[test]
    fn quoted_fields_may_contain_the_delimiter() {
        let table = parse(
            "category;name;description;water;protein;carbohydrate;fat\n\
             grain;oats;\"rolled; fine\";10;13;68;6\n",
        )
        .unwrap();
        assert!(table.get(&IngredientKey::new("oats", "rolled; fine")).is_some());
    }

    #[test]
    fn duplicate_rows_fail_with_the_line_number() {
        let err = parse(
            "category;name;description;water;protein;carbohydrate;fat\n\
             grain;oats;rolled;10;13;68;6\n\
             grain;oats;rolled;11;12;67;7\n",
        )
        .unwrap_err();

        assert!(matches!(
            err,
            CatalogError::Table { line: 3, source: TableError::DuplicateIngredient(_) }
        ));
    }

    #[test]
    fn out_of_scale_values_are_loud_errors() {
        // 250 per 100 units cannot be a mass fraction
        let err = parse(
            "category;name;description;water;protein;carbohydrate;fat\n\
             grain;oats;rolled;250;13;68;6\n",
        )
        .unwrap_err();

        assert!(matches!(
            err,
            CatalogError::Table { line: 2, source: TableError::FractionOutOfRange { .. } }
        ));
    }

    #[test]
    fn missing_header_column_is_reported() {
        let err = parse("category;name;water;protein;carbohydrate;fat\n").unwrap_err();
        assert!(matches!(err, CatalogError::MissingColumn("description")));
    }
}
