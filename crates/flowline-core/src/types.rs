//! Value-object identifier types shared across the domain.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Value object: Workspace (organization) ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgId(pub i64);

/// Value object: Flow ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowId(pub Uuid);

/// Value object: Contact ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId(pub Uuid);

/// Value object: Contact group ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub Uuid);

/// Value object: Flow run ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

/// Value object: Flow start ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StartId(pub Uuid);

/// Value object: Keyword trigger ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerId(pub Uuid);

/// Value object: Results export ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExportId(pub Uuid);

macro_rules! impl_uuid_id {
    ($($id:ident),*) => {
        $(
            impl $id {
                /// Generate a new random ID
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }
            }

            impl Default for $id {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl fmt::Display for $id {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    self.0.fmt(f)
                }
            }
        )*
    };
}

impl_uuid_id!(FlowId, ContactId, GroupId, RunId, StartId, TriggerId, ExportId);

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
