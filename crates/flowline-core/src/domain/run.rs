//! Flow runs: one execution of a flow for one contact.
//!
//! Runs are created by the execution engine; this layer only reads them,
//! aggregates over them and soft-deletes them.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::{ContactId, FlowId, RunId};
use crate::CoreError;

/// How a run ended; an active run has no exit type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitType {
    /// The contact reached a terminal node
    Completed,

    /// The run was interrupted, e.g. by another start
    Interrupted,

    /// The run hit the flow's inactivity expiration
    Expired,
}

/// A saved result value within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultValue {
    /// Human name of the result
    pub name: String,

    /// Category the value matched, if any
    pub category: Option<String>,

    /// The raw value
    pub value: String,

    /// The input that produced the value
    pub input: Option<String>,

    /// When the value was saved
    pub time: DateTime<Utc>,
}

/// Aggregate: one execution of a flow for one contact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRun {
    /// Unique identifier
    pub id: RunId,

    /// Flow being executed
    pub flow: FlowId,

    /// Contact the flow is being executed for
    pub contact: ContactId,

    /// When the run started
    pub created_on: DateTime<Utc>,

    /// When the run was last touched
    pub modified_on: DateTime<Utc>,

    /// Whether the contact ever responded in this run
    pub responded: bool,

    /// How the run ended; `None` while still active
    pub exit_type: Option<ExitType>,

    /// When the run ended
    pub exited_on: Option<DateTime<Utc>>,

    /// Result values keyed by result key, in the order they were saved
    pub results: IndexMap<String, ResultValue>,

    /// Soft-delete flag
    pub is_deleted: bool,
}

impl FlowRun {
    /// Create a new active run
    pub fn new(flow: FlowId, contact: ContactId) -> Self {
        let now = Utc::now();

        Self {
            id: RunId::new(),
            flow,
            contact,
            created_on: now,
            modified_on: now,
            responded: false,
            exit_type: None,
            exited_on: None,
            results: IndexMap::new(),
            is_deleted: false,
        }
    }

    /// Whether the run is still active
    pub fn is_active(&self) -> bool {
        self.exit_type.is_none()
    }

    /// Terminate the run. The exit type is set exactly once and is
    /// immutable thereafter.
    pub fn exit(&mut self, exit_type: ExitType) -> Result<(), CoreError> {
        if self.exit_type.is_some() {
            return Err(CoreError::StateError(
                "Run has already exited".to_string(),
            ));
        }

        let now = Utc::now();
        self.exit_type = Some(exit_type);
        self.exited_on = Some(now);
        self.modified_on = now;
        Ok(())
    }

    /// Record a result value, replacing any previous value for the key
    pub fn save_result(&mut self, key: &str, value: ResultValue) {
        self.responded = true;
        self.modified_on = value.time;
        self.results.insert(key.to_string(), value);
    }

    /// Soft-delete the run, removing it from listings and aggregates
    pub fn mark_deleted(&mut self) {
        self.is_deleted = true;
        self.modified_on = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_run() -> FlowRun {
        FlowRun::new(FlowId::new(), ContactId::new())
    }

    #[test]
    fn test_run_creation() {
        let run = make_run();
        assert!(run.is_active());
        assert!(!run.responded);
        assert!(run.results.is_empty());
        assert!(!run.is_deleted);
    }

    #[test]
    fn test_exit_is_set_exactly_once() {
        let mut run = make_run();

        run.exit(ExitType::Completed).unwrap();
        assert!(!run.is_active());
        assert_eq!(run.exit_type, Some(ExitType::Completed));
        assert!(run.exited_on.is_some());

        let result = run.exit(ExitType::Expired);
        assert!(matches!(result, Err(CoreError::StateError(_))));
        assert_eq!(run.exit_type, Some(ExitType::Completed));
    }

    #[test]
    fn test_results_keep_insertion_order() {
        let mut run = make_run();
        let now = Utc::now();

        for key in ["color", "age", "beer"] {
            run.save_result(
                key,
                ResultValue {
                    name: key.to_string(),
                    category: Some("All Responses".to_string()),
                    value: "x".to_string(),
                    input: None,
                    time: now,
                },
            );
        }

        let keys: Vec<_> = run.results.keys().cloned().collect();
        assert_eq!(keys, vec!["color", "age", "beer"]);
        assert!(run.responded);
    }
}
