//! The Flow aggregate: a versioned conversational program definition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::revision::SpecVersion;
use crate::types::{FlowId, OrgId};
use crate::CoreError;

/// Default run expiration for messaging flows, in minutes (one week)
pub const DEFAULT_EXPIRES_AFTER: u32 = 10080;

/// Default run expiration for voice flows, in minutes
pub const VOICE_EXPIRES_AFTER: u32 = 5;

/// The kind of conversational program a flow is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    /// Message based flow
    Message,

    /// IVR voice flow
    Voice,

    /// Offline survey flow
    Survey,

    /// Flow run in the background with no interaction
    Background,
}

impl FlowType {
    /// Default run expiration for this flow type
    pub fn default_expires_after(&self) -> u32 {
        match self {
            FlowType::Voice => VOICE_EXPIRES_AFTER,
            _ => DEFAULT_EXPIRES_AFTER,
        }
    }
}

/// A declared result field in a flow's definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSpec {
    /// Snaked key of the result, e.g. "favorite_color"
    pub key: String,

    /// Human name of the result
    pub name: String,

    /// Category names this result can take, in declaration order
    pub categories: Vec<String>,

    /// Nodes which can set this result
    pub node_uuids: Vec<Uuid>,
}

/// Cached metadata derived from inspecting a flow definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowMetadata {
    /// Declared result fields, in order
    #[serde(default)]
    pub results: Vec<ResultSpec>,

    /// Names of things this flow depends on (other flows, fields, groups)
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Exits where the flow waits for contact input
    #[serde(default)]
    pub waiting_exit_uuids: Vec<Uuid>,
}

/// Aggregate: a flow owned by a workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    /// Unique identifier
    pub id: FlowId,

    /// Owning workspace
    pub org: OrgId,

    /// Human-readable name
    pub name: String,

    /// The kind of flow
    pub flow_type: FlowType,

    /// Language the flow was authored in
    pub base_language: String,

    /// Minutes of inactivity before a run is force-exited
    pub expires_after_minutes: u32,

    /// Whether the flow has been archived
    pub is_archived: bool,

    /// Whether the flow is live (soft-delete flag)
    pub is_active: bool,

    /// Whether the flow is managed by the platform itself
    pub is_system: bool,

    /// Spec version of the current definition
    pub version: SpecVersion,

    /// Current revision number, bumped on every save
    pub revision: u32,

    /// Username of the last editor
    pub saved_by: String,

    /// When the flow was last saved
    pub saved_on: DateTime<Utc>,

    /// Cached metadata from the last inspection
    pub metadata: FlowMetadata,

    /// Labels applied to this flow
    pub labels: Vec<String>,

    /// Other flows this flow references
    pub dependencies: Vec<FlowId>,
}

impl Flow {
    /// Create a new flow with an empty definition at the current spec version
    pub fn new(org: OrgId, user: &str, name: &str, flow_type: FlowType) -> Self {
        let now = Utc::now();

        Self {
            id: FlowId::new(),
            org,
            name: name.to_string(),
            flow_type,
            base_language: "base".to_string(),
            expires_after_minutes: flow_type.default_expires_after(),
            is_archived: false,
            is_active: true,
            is_system: false,
            version: SpecVersion::current(),
            revision: 0,
            saved_by: user.to_string(),
            saved_on: now,
            metadata: FlowMetadata::default(),
            labels: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Whether the current definition predates the modern spec
    pub fn is_legacy(&self) -> bool {
        self.version < SpecVersion::initial_modern()
    }

    /// Make a copy of this flow for the same workspace with a fresh identity
    pub fn copy(&self, user: &str) -> Self {
        let mut copy = self.clone();
        copy.id = FlowId::new();
        copy.name = format!("Copy of {}", self.name);
        copy.revision = 0;
        copy.saved_by = user.to_string();
        copy.saved_on = Utc::now();
        copy.is_archived = false;
        copy
    }

    /// Archive the flow, hiding it from active listings
    pub fn archive(&mut self) -> Result<(), CoreError> {
        if !self.is_active {
            return Err(CoreError::StateError(
                "Cannot archive a deleted flow".to_string(),
            ));
        }

        self.is_archived = true;
        Ok(())
    }

    /// Restore an archived flow
    pub fn restore(&mut self) -> Result<(), CoreError> {
        if !self.is_active {
            return Err(CoreError::StateError(
                "Cannot restore a deleted flow".to_string(),
            ));
        }

        self.is_archived = false;
        Ok(())
    }

    /// Soft-delete the flow
    pub fn release(&mut self) {
        self.is_active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_expirations() {
        assert_eq!(FlowType::Message.default_expires_after(), 10080);
        assert_eq!(FlowType::Voice.default_expires_after(), 5);
        assert_eq!(FlowType::Survey.default_expires_after(), 10080);
        assert_eq!(FlowType::Background.default_expires_after(), 10080);
    }

    #[test]
    fn test_flow_creation() {
        let flow = Flow::new(OrgId(1), "admin", "Demographic Survey", FlowType::Message);

        assert_eq!(flow.name, "Demographic Survey");
        assert_eq!(flow.expires_after_minutes, 10080);
        assert_eq!(flow.revision, 0);
        assert!(flow.is_active);
        assert!(!flow.is_archived);
        assert!(!flow.is_legacy());
    }

    #[test]
    fn test_flow_copy() {
        let flow = Flow::new(OrgId(1), "admin", "Survey", FlowType::Message);
        let copy = flow.copy("editor");

        assert_ne!(copy.id, flow.id);
        assert_eq!(copy.name, "Copy of Survey");
        assert_eq!(copy.org, flow.org);
        assert_eq!(copy.revision, 0);
        assert_eq!(copy.saved_by, "editor");
    }

    #[test]
    fn test_archive_and_restore() {
        let mut flow = Flow::new(OrgId(1), "admin", "Survey", FlowType::Message);

        flow.archive().unwrap();
        assert!(flow.is_archived);

        flow.restore().unwrap();
        assert!(!flow.is_archived);

        flow.release();
        assert!(flow.archive().is_err());
        assert!(flow.restore().is_err());
    }
}
