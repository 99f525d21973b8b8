//! Results exports: requests to materialize run results into a file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ExportId, FlowId, GroupId, OrgId};
use crate::{CoreError, CoreResult};

/// Maximum contact-field columns per export
pub const MAX_CONTACT_FIELDS: usize = 10;

/// Maximum group-membership columns per export
pub const MAX_GROUP_MEMBERSHIPS: usize = 10;

/// Lifecycle status of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    /// Persisted, waiting for a worker
    Pending,

    /// A worker is building the file
    Processing,

    /// The file is ready
    Complete,

    /// The worker gave up
    Failed,
}

/// Aggregate: a request to export run results for one or more flows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsExport {
    /// Unique identifier
    pub id: ExportId,

    /// Owning workspace
    pub org: OrgId,

    /// Username of the requester
    pub created_by: String,

    /// When the export was requested
    pub created_on: DateTime<Utc>,

    /// Flows to include
    pub flows: Vec<FlowId>,

    /// Contact-field columns to include
    pub contact_fields: Vec<String>,

    /// Group-membership columns to include
    pub group_memberships: Vec<GroupId>,

    /// URN schemes beyond the one used by the flow
    pub extra_urns: Vec<String>,

    /// Only include contacts which responded
    pub responded_only: bool,

    /// Include all messages sent and received in the flow
    pub include_msgs: bool,

    /// Current status
    pub status: ExportStatus,
}

impl ResultsExport {
    /// Create a new pending export, enforcing the column bounds
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        org: OrgId,
        created_by: &str,
        flows: Vec<FlowId>,
        contact_fields: Vec<String>,
        group_memberships: Vec<GroupId>,
        extra_urns: Vec<String>,
        responded_only: bool,
        include_msgs: bool,
    ) -> CoreResult<Self> {
        if flows.is_empty() {
            return Err(CoreError::ValidationError(
                "You must select at least one flow to export".to_string(),
            ));
        }

        if contact_fields.len() > MAX_CONTACT_FIELDS {
            return Err(CoreError::ValidationError(format!(
                "You can only include up to {} contact fields in your export",
                MAX_CONTACT_FIELDS
            )));
        }

        if group_memberships.len() > MAX_GROUP_MEMBERSHIPS {
            return Err(CoreError::ValidationError(format!(
                "You can only include up to {} groups for group memberships in your export",
                MAX_GROUP_MEMBERSHIPS
            )));
        }

        Ok(Self {
            id: ExportId::new(),
            org,
            created_by: created_by.to_string(),
            created_on: Utc::now(),
            flows,
            contact_fields,
            group_memberships,
            extra_urns,
            responded_only,
            include_msgs,
            status: ExportStatus::Pending,
        })
    }

    /// Whether the export has reached a terminal status
    pub fn is_finished(&self) -> bool {
        matches!(self.status, ExportStatus::Complete | ExportStatus::Failed)
    }
}
