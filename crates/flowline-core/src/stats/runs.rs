//! Run totals by exit type.

use serde::Serialize;

use crate::domain::run::{ExitType, FlowRun};

/// Counts of a flow's runs partitioned by how they ended.
///
/// Every non-deleted run is in exactly one bucket, so the four buckets
/// always sum to `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    /// Runs still waiting on the contact
    pub active: u64,

    /// Runs that reached a terminal node
    pub completed: u64,

    /// Runs interrupted before finishing
    pub interrupted: u64,

    /// Runs that hit the inactivity expiration
    pub expired: u64,

    /// All runs
    pub total: u64,
}

impl RunTotals {
    /// Tally totals over a set of runs, ignoring soft-deleted ones
    pub fn tally<'a>(runs: impl IntoIterator<Item = &'a FlowRun>) -> Self {
        let mut totals = Self::default();

        for run in runs {
            if run.is_deleted {
                continue;
            }

            match run.exit_type {
                None => totals.active += 1,
                Some(ExitType::Completed) => totals.completed += 1,
                Some(ExitType::Interrupted) => totals.interrupted += 1,
                Some(ExitType::Expired) => totals.expired += 1,
            }
            totals.total += 1;
        }

        totals
    }

    /// Percentage of runs which completed, as a whole number
    pub fn completion_pct(&self) -> u64 {
        if self.total == 0 {
            return 0;
        }
        self.completed * 100 / self.total
    }
}
