mod catalog;

use std::path::{Path, PathBuf};
use std::time::Duration;

use blendopt_core::{
    BlendError, BlendOutcome, BlendReport, BlendRequest, Engine, IngredientKey, LpFailure,
    Nutrient, NutrientRanges, NutrientTable, PctRange, SearchLimits,
};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "blendopt")]
#[command(about = "Blend optimizer over an ingredient catalog", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the catalog grouped by category
    Ingredients {
        /// The catalog file
        catalog: PathBuf,
        /// Show only this category
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Validate a request against a catalog without solving
    Check {
        /// The catalog file
        catalog: PathBuf,
        /// The JSON request file
        request: PathBuf,
    },
    /// Solve a blend request
    Solve {
        /// The catalog file
        catalog: PathBuf,
        /// The JSON request file
        request: PathBuf,
        /// Output format (json, pretty)
        #[arg(short, long, default_value = "pretty")]
        format: String,
        /// Fallback grid step in percentage points
        #[arg(long, default_value_t = 1.0)]
        step: f64,
        /// Ceiling on the fallback candidate space
        #[arg(long, default_value_t = 2_000_000)]
        max_candidates: u64,
        /// Wall-clock budget for the fallback search
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

/// On-disk request shape: per-ingredient entries instead of the engine's
/// parallel arrays
#[derive(Deserialize)]
struct RequestFile {
    ingredients: Vec<RequestIngredient>,
    #[serde(default)]
    nutrients: NutrientRanges,
    #[serde(default)]
    maximize: Vec<Nutrient>,
}

#[derive(Deserialize)]
struct RequestIngredient {
    name: String,
    #[serde(default)]
    description: String,
    range: PctRange,
}

impl RequestFile {
    fn into_request(self) -> BlendRequest {
        let (selected, ingredient_ranges) = self
            .ingredients
            .into_iter()
            .map(|i| (IngredientKey::new(i.name, i.description), i.range))
            .unzip();
        BlendRequest {
            selected,
            ingredient_ranges,
            nutrient_ranges: self.nutrients,
            maximize: self.maximize,
        }
    }
}

#[derive(Serialize)]
struct SolveOutput<'a> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lp_failure: Option<LpFailure>,
    report: &'a BlendReport,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ingredients { catalog, category } => {
            let table = load_catalog(&catalog);
            list_ingredients(&table, category.as_deref());
        }
        Commands::Check { catalog, request } => {
            let table = load_catalog(&catalog);
            let request = read_request(&request);
            match request.validate(&table) {
                Ok(()) => {
                    println!("✓ request is valid ({} ingredients)", request.selected.len());
                }
                Err(e) => {
                    eprintln!("✗ invalid request: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Solve {
            catalog,
            request,
            format,
            step,
            max_candidates,
            timeout_ms,
        } => {
            let table = load_catalog(&catalog);
            let request = read_request(&request);
            let limits = SearchLimits {
                step_pct: step,
                max_candidates,
                timeout: timeout_ms.map(Duration::from_millis),
            };

            match Engine::new().with_limits(limits).solve(&table, &request) {
                Ok(outcome) => {
                    if format == "json" {
                        print_json(&outcome);
                    } else {
                        print_pretty(&outcome);
                    }
                }
                Err(BlendError::Request(e)) => {
                    eprintln!("Invalid request: {}", e);
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("No solution found: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}

fn load_catalog(path: &Path) -> NutrientTable {
    match catalog::load(path) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("Error loading catalog: {}", e);
            std::process::exit(1);
        }
    }
}

fn read_request(path: &Path) -> BlendRequest {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading request: {}", e);
            std::process::exit(1);
        }
    };
    match serde_json::from_str::<RequestFile>(&text) {
        Ok(file) => file.into_request(),
        Err(e) => {
            eprintln!("Error parsing request: {}", e);
            std::process::exit(1);
        }
    }
}

fn list_ingredients(table: &NutrientTable, only: Option<&str>) {
    // Categories in first-seen order
    let mut categories: Vec<&str> = Vec::new();
    for ingredient in table.iter() {
        if !categories.contains(&ingredient.category.as_str()) {
            categories.push(&ingredient.category);
        }
    }

    for category in categories {
        if only.is_some_and(|c| c != category) {
            continue;
        }
        println!("{}", category);
        for ingredient in table.iter().filter(|i| i.category == category) {
            let cells: Vec<String> = Nutrient::ALL
                .into_iter()
                .map(|n| match ingredient.composition.get(n) {
                    Some(v) => format!("{} {:.2}", n, v * 100.0),
                    None => format!("{} ?", n),
                })
                .collect();
            println!("  {:40} {}", ingredient.key.to_string(), cells.join("  "));
        }
    }
}

fn print_json(outcome: &BlendOutcome) {
    let output = match outcome {
        BlendOutcome::Optimal(report) => SolveOutput {
            status: "optimal",
            penalty: None,
            lp_failure: None,
            report,
        },
        BlendOutcome::Approximate { report, penalty, lp_failure } => SolveOutput {
            status: "approximate",
            penalty: Some(*penalty),
            lp_failure: Some(*lp_failure),
            report,
        },
    };
    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error encoding output: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_pretty(outcome: &BlendOutcome) {
    match outcome {
        BlendOutcome::Optimal(_) => println!("Status: OPTIMAL"),
        BlendOutcome::Approximate { penalty, lp_failure, .. } => {
            println!("Status: APPROXIMATE");
            println!(
                "The linear program was {}; this is the closest grid composition \
                 (penalty {:.2}).",
                lp_failure, penalty
            );
        }
    }

    let report = outcome.report();
    println!();
    println!("Composition (% of total weight):");
    for share in &report.shares {
        println!(
            "  {:40} {:>8.2}%   [{:.0}..{:.0}]",
            share.ingredient.to_string(),
            share.pct,
            share.range.low(),
            share.range.high()
        );
    }

    println!();
    println!("Nutrition per 100 units:");
    for total in &report.totals {
        let mut line = format!(
            "  {:15} {:>8.2}   [{:.0}..{:.0}]",
            total.nutrient.to_string(),
            total.per_100,
            total.range.low(),
            total.range.high()
        );
        if !total.is_complete() {
            let names: Vec<String> =
                total.missing.iter().map(|k| k.to_string()).collect();
            line.push_str(&format!("   incomplete: no data for {}", names.join(", ")));
        }
        println!("{}", line);
    }
}
