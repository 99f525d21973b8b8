//! Per-result category counts.

use serde::Serialize;
use std::collections::HashMap;

use crate::domain::flow::ResultSpec;
use crate::domain::run::FlowRun;

/// Category name used for values that matched no configured category
pub const NO_RESPONSE_CATEGORY: &str = "No Response";

/// A single category and how many runs landed in it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    /// Category name
    pub name: String,

    /// Number of runs whose value matched this category
    pub count: u64,

    /// Share of the result's total, as a whole-number percentage
    pub pct: u64,
}

/// Category counts for one result in a flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultCategoryCounts {
    /// Result key
    pub key: String,

    /// Human name of the result
    pub name: String,

    /// Counts per category, in the order declared by the flow
    pub categories: Vec<CategoryCount>,

    /// Total runs counted for this result, no-response bucket included
    pub total: u64,
}

/// Count run values per category for each result declared by the flow.
///
/// Results are reported in the order the flow declares them and categories
/// in the order the result declares them. A run that never reached a result,
/// or recorded a value with no category, lands in [`NO_RESPONSE_CATEGORY`],
/// so every counted run contributes to exactly one bucket per result.
/// Soft-deleted runs are skipped.
pub fn category_counts<'a>(
    results: &[ResultSpec],
    runs: impl IntoIterator<Item = &'a FlowRun>,
) -> Vec<ResultCategoryCounts> {
    // key -> category name -> count
    let mut counts: HashMap<&str, HashMap<String, u64>> =
        results.iter().map(|r| (r.key.as_str(), HashMap::new())).collect();
    let mut total: u64 = 0;

    for run in runs {
        if run.is_deleted {
            continue;
        }
        total += 1;

        for spec in results {
            let category = match run.results.get(spec.key.as_str()) {
                Some(value) => value
                    .category
                    .clone()
                    .unwrap_or_else(|| NO_RESPONSE_CATEGORY.to_string()),
                None => NO_RESPONSE_CATEGORY.to_string(),
            };
            if let Some(by_category) = counts.get_mut(spec.key.as_str()) {
                *by_category.entry(category).or_default() += 1;
            }
        }
    }

    results
        .iter()
        .map(|spec| {
            let mut by_category = counts.remove(spec.key.as_str()).unwrap_or_default();

            let mut categories: Vec<CategoryCount> = spec
                .categories
                .iter()
                .map(|name| {
                    let count = by_category.remove(name).unwrap_or(0);
                    CategoryCount {
                        name: name.clone(),
                        count,
                        pct: if total > 0 { count * 100 / total } else { 0 },
                    }
                })
                .collect();

            // categories seen in run data but not declared by the flow,
            // including the no-response bucket
            let mut extras: Vec<(String, u64)> = by_category.into_iter().collect();
            extras.sort();
            for (name, count) in extras {
                categories.push(CategoryCount {
                    pct: count * 100 / total,
                    name,
                    count,
                });
            }

            ResultCategoryCounts {
                key: spec.key.clone(),
                name: spec.name.clone(),
                categories,
                total,
            }
        })
        .collect()
}
