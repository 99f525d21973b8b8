//! Flow starts: requests to begin a flow for a computed set of recipients,
//! and the admission-control rules that gate them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::query::ContactQuery;
use crate::types::{ContactId, FlowId, GroupId, OrgId, StartId};
use crate::{CoreError, CoreResult};

/// Lifecycle status of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartStatus {
    /// Persisted but not yet picked up by the engine
    Pending,

    /// The engine is fanning out runs
    Starting,

    /// All recipients have been started
    Complete,

    /// The engine gave up on this start
    Failed,
}

impl StartStatus {
    /// Whether this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, StartStatus::Complete | StartStatus::Failed)
    }
}

/// Who a start should reach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum Recipients {
    /// Explicit contacts and groups
    Selection {
        /// Contacts to start
        contacts: Vec<ContactId>,
        /// Groups whose members should be started
        groups: Vec<GroupId>,
    },

    /// A contact-search query, stored normalized
    Query {
        /// The normalized query string
        query: String,
    },
}

/// Aggregate: a request to begin a flow for a set of recipients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStart {
    /// Unique identifier
    pub id: StartId,

    /// Flow to start
    pub flow: FlowId,

    /// Owning workspace
    pub org: OrgId,

    /// Username of the requester
    pub created_by: String,

    /// When the start was requested
    pub created_on: DateTime<Utc>,

    /// Current status
    pub status: StartStatus,

    /// Who to start
    pub recipients: Recipients,

    /// Restart contacts already participating in this flow
    pub restart_participants: bool,

    /// Include contacts currently active in another flow
    pub include_active: bool,

    /// How many runs the engine created, reported on completion
    pub run_count: u64,
}

impl FlowStart {
    /// Create a new pending start
    pub fn new(
        flow: FlowId,
        org: OrgId,
        created_by: &str,
        recipients: Recipients,
        restart_participants: bool,
        include_active: bool,
    ) -> Self {
        Self {
            id: StartId::new(),
            flow,
            org,
            created_by: created_by.to_string(),
            created_on: Utc::now(),
            status: StartStatus::Pending,
            recipients,
            restart_participants,
            include_active,
            run_count: 0,
        }
    }

    /// Mark the start as picked up by the engine
    pub fn begin(&mut self) -> CoreResult<()> {
        if self.status != StartStatus::Pending {
            return Err(CoreError::StateError(format!(
                "Cannot begin start in status: {:?}",
                self.status
            )));
        }

        self.status = StartStatus::Starting;
        Ok(())
    }

    /// Mark the start complete. Terminal status is set exactly once.
    pub fn complete(&mut self, run_count: u64) -> CoreResult<()> {
        self.set_terminal(StartStatus::Complete)?;
        self.run_count = run_count;
        Ok(())
    }

    /// Mark the start failed. Terminal status is set exactly once.
    pub fn fail(&mut self) -> CoreResult<()> {
        self.set_terminal(StartStatus::Failed)
    }

    fn set_terminal(&mut self, status: StartStatus) -> CoreResult<()> {
        if self.status.is_terminal() {
            return Err(CoreError::StateError(format!(
                "Start already in terminal status: {:?}",
                self.status
            )));
        }

        self.status = status;
        Ok(())
    }
}

/// Snapshot of the state admission control decides over.
///
/// Built from repository reads at request time; the check itself is a pure
/// function so the invariants are unit-testable without storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct StartSnapshot {
    /// The owning workspace is suspended
    pub org_suspended: bool,

    /// The owning workspace is flagged
    pub org_flagged: bool,

    /// The flow already has a start in a non-terminal status
    pub flow_is_starting: bool,
}

/// Decide whether a start request may proceed.
///
/// Rejections create no partial state: a flow with an unfinished start is
/// rejected regardless of recipients, suspended and flagged workspaces are
/// rejected on the same path, an empty selection is a validation error and
/// a query must parse against the contact-search grammar. On success,
/// returns the recipients with any query normalized.
pub fn check_admission(
    snapshot: &StartSnapshot,
    recipients: Recipients,
) -> CoreResult<Recipients> {
    if snapshot.flow_is_starting {
        return Err(CoreError::AlreadyStarting);
    }

    if snapshot.org_suspended {
        return Err(CoreError::WorkspaceSuspended);
    }

    if snapshot.org_flagged {
        return Err(CoreError::WorkspaceFlagged);
    }

    match recipients {
        Recipients::Selection { contacts, groups } => {
            if contacts.is_empty() && groups.is_empty() {
                return Err(CoreError::ValidationError(
                    "You must specify at least one contact or one group to start a flow"
                        .to_string(),
                ));
            }
            Ok(Recipients::Selection { contacts, groups })
        }
        Recipients::Query { query } => {
            if query.trim().is_empty() {
                return Err(CoreError::ValidationError(
                    "Contact query is required".to_string(),
                ));
            }
            let parsed = ContactQuery::parse(&query)?;
            Ok(Recipients::Query {
                query: parsed.as_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(contacts: usize, groups: usize) -> Recipients {
        Recipients::Selection {
            contacts: (0..contacts).map(|_| ContactId::new()).collect(),
            groups: (0..groups).map(|_| GroupId::new()).collect(),
        }
    }

    #[test]
    fn test_already_starting_rejected_regardless_of_recipients() {
        let snapshot = StartSnapshot {
            flow_is_starting: true,
            ..Default::default()
        };

        for recipients in [
            selection(1, 0),
            selection(0, 1),
            Recipients::Query {
                query: "age > 32".to_string(),
            },
        ] {
            let err = check_admission(&snapshot, recipients).unwrap_err();
            assert!(matches!(err, CoreError::AlreadyStarting));
        }
    }

    #[test]
    fn test_suspended_and_flagged_rejected() {
        let suspended = StartSnapshot {
            org_suspended: true,
            ..Default::default()
        };
        assert!(matches!(
            check_admission(&suspended, selection(1, 0)),
            Err(CoreError::WorkspaceSuspended)
        ));

        let flagged = StartSnapshot {
            org_flagged: true,
            ..Default::default()
        };
        assert!(matches!(
            check_admission(&flagged, selection(1, 0)),
            Err(CoreError::WorkspaceFlagged)
        ));
    }

    #[test]
    fn test_empty_selection_rejected() {
        let err = check_admission(&StartSnapshot::default(), selection(0, 0)).unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[test]
    fn test_query_is_parsed_and_normalized() {
        let ok = check_admission(
            &StartSnapshot::default(),
            Recipients::Query {
                query: "Bob".to_string(),
            },
        )
        .unwrap();
        assert_eq!(
            ok,
            Recipients::Query {
                query: "name ~ Bob".to_string()
            }
        );

        let err = check_admission(
            &StartSnapshot::default(),
            Recipients::Query {
                query: "age >".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::QueryError(_)));

        let err = check_admission(
            &StartSnapshot::default(),
            Recipients::Query {
                query: "   ".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[test]
    fn test_terminal_status_set_exactly_once() {
        let mut start = FlowStart::new(
            FlowId::new(),
            OrgId(1),
            "admin",
            selection(1, 0),
            false,
            false,
        );

        start.begin().unwrap();
        assert_eq!(start.status, StartStatus::Starting);

        start.complete(10).unwrap();
        assert_eq!(start.status, StartStatus::Complete);
        assert_eq!(start.run_count, 10);

        assert!(start.fail().is_err());
        assert!(start.complete(20).is_err());
        assert_eq!(start.run_count, 10);
    }

    #[test]
    fn test_begin_requires_pending() {
        let mut start = FlowStart::new(
            FlowId::new(),
            OrgId(1),
            "admin",
            selection(1, 0),
            false,
            false,
        );

        start.begin().unwrap();
        assert!(start.begin().is_err());
    }
}
