//! Read-side aggregation over flow runs
//!
//! Everything here is a pure function over run slices so the counting
//! rules can be tested without storage.

pub mod activity;
pub mod categories;
pub mod runs;

pub use activity::{bucket_width_for_span, ActivityChart, BucketWidth};
pub use categories::{category_counts, CategoryCount, ResultCategoryCounts};
pub use runs::RunTotals;
