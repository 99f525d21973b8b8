//! Flow revisions: immutable definition snapshots, spec-version migration
//! and save-conflict detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use super::flow::Flow;
use crate::types::FlowId;
use crate::{CoreError, CoreResult};

/// The spec version new definitions are saved at
pub const CURRENT_SPEC_VERSION: &str = "13.1";

/// Revisions at or above this version were validated by the engine on save
pub const INITIAL_MODERN_VERSION: &str = "13.0.0";

/// The last version of the legacy definition format
pub const FINAL_LEGACY_VERSION: &str = "11.12";

/// A three-part definition spec version, ordered numerically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpecVersion {
    parts: [u32; 3],
}

impl SpecVersion {
    /// The version new definitions are saved at
    pub fn current() -> Self {
        CURRENT_SPEC_VERSION.parse().unwrap()
    }

    /// The first engine-validated version
    pub fn initial_modern() -> Self {
        INITIAL_MODERN_VERSION.parse().unwrap()
    }

    /// The last legacy version
    pub fn final_legacy() -> Self {
        FINAL_LEGACY_VERSION.parse().unwrap()
    }

    /// Whether this version predates the modern, engine-validated spec
    pub fn is_legacy(&self) -> bool {
        *self < Self::initial_modern()
    }
}

impl FromStr for SpecVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = [0u32; 3];
        let mut split = s.split('.');

        for (i, slot) in parts.iter_mut().enumerate() {
            match split.next() {
                Some(p) => {
                    *slot = p.parse().map_err(|_| {
                        CoreError::ValidationError(format!("Invalid spec version: {}", s))
                    })?;
                }
                None if i > 0 => break,
                None => {
                    return Err(CoreError::ValidationError(format!(
                        "Invalid spec version: {}",
                        s
                    )))
                }
            }
        }

        if split.next().is_some() {
            return Err(CoreError::ValidationError(format!(
                "Invalid spec version: {}",
                s
            )));
        }

        Ok(Self { parts })
    }
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parts[2] == 0 {
            write!(f, "{}.{}", self.parts[0], self.parts[1])
        } else {
            write!(f, "{}.{}.{}", self.parts[0], self.parts[1], self.parts[2])
        }
    }
}

impl Serialize for SpecVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SpecVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An immutable snapshot of a flow's definition at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRevision {
    /// Flow this revision belongs to
    pub flow: FlowId,

    /// Monotonic revision number within the flow
    pub revision: u32,

    /// Spec version the definition was saved at
    pub spec_version: SpecVersion,

    /// The definition itself
    pub definition: Value,

    /// Username of the editor who saved this revision
    pub saved_by: String,

    /// When the revision was created
    pub created_on: DateTime<Utc>,
}

impl FlowRevision {
    /// Create a new revision snapshot
    pub fn new(
        flow: FlowId,
        revision: u32,
        spec_version: SpecVersion,
        definition: Value,
        saved_by: &str,
    ) -> Self {
        Self {
            flow,
            revision,
            spec_version,
            definition,
            saved_by: saved_by.to_string(),
            created_on: Utc::now(),
        }
    }

    /// Migrate this revision's definition forward to the given version.
    ///
    /// This is a pure function on the stored definition: the revision itself
    /// is never mutated and no new revision is created.
    pub fn migrated_definition(&self, to_version: &SpecVersion) -> CoreResult<Value> {
        migrate_definition(&self.definition, self.spec_version, *to_version)
    }

    /// Validate the structure of a legacy (pre-modern) definition.
    ///
    /// Recognized structural problems return `InvalidDefinition` so callers
    /// can cull the revision from listings without reporting it.
    pub fn validate_legacy_definition(definition: &Value) -> CoreResult<()> {
        let obj = definition
            .as_object()
            .ok_or_else(|| CoreError::InvalidDefinition("not an object".to_string()))?;

        if !obj.contains_key("base_language") {
            return Err(CoreError::InvalidDefinition(
                "missing base_language".to_string(),
            ));
        }

        for key in ["action_sets", "rule_sets"] {
            match obj.get(key) {
                Some(Value::Array(_)) => {}
                Some(_) => {
                    return Err(CoreError::InvalidDefinition(format!("{} is not a list", key)))
                }
                None => return Err(CoreError::InvalidDefinition(format!("missing {}", key))),
            }
        }

        // every action set must name a destination node or be terminal
        if let Some(action_sets) = obj["action_sets"].as_array() {
            for action_set in action_sets {
                if !action_set.is_object() {
                    return Err(CoreError::InvalidDefinition(
                        "action set is not an object".to_string(),
                    ));
                }
                if action_set.get("uuid").and_then(Value::as_str).is_none() {
                    return Err(CoreError::InvalidDefinition(
                        "action set missing uuid".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Summary representation for revision listings
    pub fn as_summary(&self) -> Value {
        json!({
            "revision": self.revision,
            "version": self.spec_version.to_string(),
            "user": self.saved_by,
            "created_on": self.created_on.to_rfc3339(),
        })
    }
}

/// Migrate a definition between spec versions as a pure function.
///
/// Migrating to a version at or below the definition's own version is a
/// no-op clone. Unknown future versions are rejected.
pub fn migrate_definition(
    definition: &Value,
    from: SpecVersion,
    to: SpecVersion,
) -> CoreResult<Value> {
    if to > SpecVersion::current() {
        return Err(CoreError::ValidationError(format!(
            "Unknown spec version: {}",
            to
        )));
    }

    let mut migrated = definition.clone();
    if to <= from {
        return Ok(migrated);
    }

    // each step upgrades to the named version if the target reaches it
    if from < SpecVersion::final_legacy() && to >= SpecVersion::final_legacy() {
        migrate_to_final_legacy(&mut migrated)?;
    }

    if from < SpecVersion::initial_modern() && to >= SpecVersion::initial_modern() {
        migrate_to_modern(&mut migrated)?;
    }

    if let Some(obj) = migrated.as_object_mut() {
        obj.insert("spec_version".to_string(), json!(to.to_string()));
    }

    Ok(migrated)
}

/// Normalize a legacy definition to the final legacy shape
fn migrate_to_final_legacy(definition: &mut Value) -> CoreResult<()> {
    let obj = definition
        .as_object_mut()
        .ok_or_else(|| CoreError::InvalidDefinition("not an object".to_string()))?;

    obj.entry("base_language").or_insert(json!("base"));
    obj.entry("action_sets").or_insert(json!([]));
    obj.entry("rule_sets").or_insert(json!([]));
    obj.entry("metadata").or_insert(json!({}));

    Ok(())
}

/// Convert a final-legacy definition to the modern node-based shape
fn migrate_to_modern(definition: &mut Value) -> CoreResult<()> {
    let obj = definition
        .as_object_mut()
        .ok_or_else(|| CoreError::InvalidDefinition("not an object".to_string()))?;

    let language = obj
        .remove("base_language")
        .unwrap_or_else(|| json!("base"));

    let mut nodes = Vec::new();
    for key in ["action_sets", "rule_sets"] {
        if let Some(Value::Array(sets)) = obj.remove(key) {
            for set in sets {
                let uuid = set.get("uuid").cloned().unwrap_or(Value::Null);
                let actions = set.get("actions").cloned().unwrap_or(json!([]));
                nodes.push(json!({
                    "uuid": uuid,
                    "actions": actions,
                    "exits": set.get("exits").cloned().unwrap_or(json!([])),
                }));
            }
        }
    }

    obj.insert("language".to_string(), language);
    obj.insert("nodes".to_string(), json!(nodes));
    obj.entry("localization").or_insert(json!({}));

    Ok(())
}

/// Check whether a save attempt conflicts with the flow's current state.
///
/// Returns `UserConflict` when another editor saved since the client loaded
/// the flow, and `VersionConflict` when the spec version moved forward
/// underneath the client. Neither mutates anything.
pub fn check_save_conflicts(
    flow: &Flow,
    user: &str,
    client_version: SpecVersion,
    client_revision: u32,
) -> CoreResult<()> {
    if client_revision < flow.revision && flow.saved_by != user {
        return Err(CoreError::UserConflict {
            other_user: flow.saved_by.clone(),
        });
    }

    if client_version < flow.version {
        return Err(CoreError::VersionConflict {
            server_version: flow.version.to_string(),
        });
    }

    Ok(())
}

/// Whether a revision should appear in listings.
///
/// Modern revisions are trusted as pre-validated. Legacy revisions are
/// migrated to the final legacy version and structurally validated;
/// recognized failures are culled silently, anything else is culled and
/// logged. This never returns an error.
pub fn is_listable(revision: &FlowRevision) -> bool {
    if !revision.spec_version.is_legacy() {
        return true;
    }

    match revision
        .migrated_definition(&SpecVersion::final_legacy())
        .and_then(|def| FlowRevision::validate_legacy_definition(&def))
    {
        Ok(()) => true,
        Err(CoreError::InvalidDefinition(_)) => false,
        Err(err) => {
            tracing::error!(
                flow = %revision.flow,
                revision = revision.revision,
                %err,
                "Error validating flow revision"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flow::FlowType;
    use crate::types::OrgId;

    #[test]
    fn test_spec_version_parse_and_order() {
        let v11_12: SpecVersion = "11.12".parse().unwrap();
        let v13_0: SpecVersion = "13.0.0".parse().unwrap();
        let v13_1: SpecVersion = "13.1".parse().unwrap();

        assert!(v11_12 < v13_0);
        assert!(v13_0 < v13_1);
        assert_eq!(v13_1.to_string(), "13.1");
        assert!(v11_12.is_legacy());
        assert!(!v13_1.is_legacy());

        assert!("".parse::<SpecVersion>().is_err());
        assert!("13.x".parse::<SpecVersion>().is_err());
        assert!("1.2.3.4".parse::<SpecVersion>().is_err());
    }

    #[test]
    fn test_migration_is_noop_at_or_below_own_version() {
        let def = json!({"language": "eng", "nodes": []});
        let rev = FlowRevision::new(
            FlowId::new(),
            1,
            SpecVersion::current(),
            def.clone(),
            "admin",
        );

        let migrated = rev.migrated_definition(&SpecVersion::current()).unwrap();
        assert_eq!(migrated, def);
    }

    #[test]
    fn test_migration_rejects_unknown_version() {
        let def = json!({"language": "eng", "nodes": []});
        let result = migrate_definition(
            &def,
            SpecVersion::current(),
            "99.0".parse().unwrap(),
        );
        assert!(matches!(result, Err(CoreError::ValidationError(_))));
    }

    #[test]
    fn test_legacy_migration_to_modern() {
        let legacy = json!({
            "base_language": "eng",
            "action_sets": [{"uuid": "a1", "actions": [{"type": "reply", "msg": "hi"}]}],
            "rule_sets": [],
        });

        let migrated = migrate_definition(
            &legacy,
            "11.5".parse().unwrap(),
            SpecVersion::current(),
        )
        .unwrap();

        assert_eq!(migrated["language"], json!("eng"));
        assert_eq!(migrated["nodes"].as_array().unwrap().len(), 1);
        assert_eq!(migrated["spec_version"], json!("13.1"));
        assert!(migrated.get("action_sets").is_none());
    }

    #[test]
    fn test_validate_legacy_definition() {
        let valid = json!({
            "base_language": "eng",
            "action_sets": [{"uuid": "a1"}],
            "rule_sets": [],
        });
        assert!(FlowRevision::validate_legacy_definition(&valid).is_ok());

        let missing_lang = json!({"action_sets": [], "rule_sets": []});
        assert!(matches!(
            FlowRevision::validate_legacy_definition(&missing_lang),
            Err(CoreError::InvalidDefinition(_))
        ));

        let bad_sets = json!({"base_language": "eng", "action_sets": {}, "rule_sets": []});
        assert!(FlowRevision::validate_legacy_definition(&bad_sets).is_err());

        assert!(FlowRevision::validate_legacy_definition(&json!([])).is_err());
    }

    #[test]
    fn test_is_listable_culls_invalid_legacy() {
        let flow_id = FlowId::new();

        let modern = FlowRevision::new(
            flow_id,
            3,
            SpecVersion::current(),
            json!({"language": "eng", "nodes": []}),
            "admin",
        );
        assert!(is_listable(&modern));

        let valid_legacy = FlowRevision::new(
            flow_id,
            2,
            "11.5".parse().unwrap(),
            json!({"base_language": "eng", "action_sets": [{"uuid": "a1"}], "rule_sets": []}),
            "admin",
        );
        assert!(is_listable(&valid_legacy));

        let invalid_legacy = FlowRevision::new(
            flow_id,
            1,
            "10.0".parse().unwrap(),
            json!("not an object"),
            "admin",
        );
        assert!(!is_listable(&invalid_legacy));
    }

    #[test]
    fn test_save_conflict_detection() {
        let mut flow = Flow::new(OrgId(1), "alice", "Survey", FlowType::Message);
        flow.revision = 5;

        // same user saving from an older revision is fine
        assert!(check_save_conflicts(&flow, "alice", flow.version, 4).is_ok());

        // a different user saving from an older revision conflicts
        let err = check_save_conflicts(&flow, "bob", flow.version, 4).unwrap_err();
        match err {
            CoreError::UserConflict { other_user } => assert_eq!(other_user, "alice"),
            other => panic!("Expected UserConflict, got {:?}", other),
        }

        // a stale client spec version conflicts, with no revision created
        let err =
            check_save_conflicts(&flow, "alice", "13.0.0".parse().unwrap(), 5).unwrap_err();
        assert!(matches!(err, CoreError::VersionConflict { .. }));

        // up to date save passes
        assert!(check_save_conflicts(&flow, "bob", flow.version, 5).is_ok());
    }
}
