//! Workspaces: the multi-tenant organization owning flows and triggers.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::OrgId;

/// A tenant organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    /// Unique identifier
    pub id: OrgId,

    /// Workspace name
    pub name: String,

    /// Suspended workspaces cannot start flows
    pub is_suspended: bool,

    /// Flagged workspaces cannot start flows
    pub is_flagged: bool,

    /// The workspace's primary language, if set
    pub primary_language: Option<String>,

    /// Configured language codes, primary first
    pub languages: Vec<String>,

    /// IANA timezone name
    pub timezone: String,

    /// Date formatting style, "day_first" or "month_first"
    pub date_style: String,
}

impl Workspace {
    /// Create a workspace with sane defaults
    pub fn new(id: OrgId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            is_suspended: false,
            is_flagged: false,
            primary_language: None,
            languages: Vec::new(),
            timezone: "UTC".to_string(),
            date_style: "day_first".to_string(),
        }
    }

    /// Whether the given code is a configured language
    pub fn has_language(&self, code: &str) -> bool {
        self.languages.iter().any(|l| l == code)
    }

    /// The environment descriptor sent to the execution engine
    pub fn as_environment_def(&self) -> Value {
        json!({
            "date_format": if self.date_style == "day_first" { "DD-MM-YYYY" } else { "MM-DD-YYYY" },
            "time_format": "tt:mm",
            "timezone": self.timezone,
            "default_language": self.primary_language,
            "allowed_languages": self.languages,
            "redaction_policy": "none",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_def() {
        let mut workspace = Workspace::new(OrgId(1), "Nyaruka");
        workspace.primary_language = Some("eng".to_string());
        workspace.languages = vec!["eng".to_string(), "fra".to_string()];
        workspace.timezone = "Africa/Kigali".to_string();

        let env = workspace.as_environment_def();
        assert_eq!(env["timezone"], json!("Africa/Kigali"));
        assert_eq!(env["date_format"], json!("DD-MM-YYYY"));
        assert_eq!(env["default_language"], json!("eng"));
        assert_eq!(env["allowed_languages"], json!(["eng", "fra"]));
    }

    #[test]
    fn test_has_language() {
        let mut workspace = Workspace::new(OrgId(1), "Nyaruka");
        workspace.languages = vec!["eng".to_string()];

        assert!(workspace.has_language("eng"));
        assert!(!workspace.has_language("fra"));
    }
}
