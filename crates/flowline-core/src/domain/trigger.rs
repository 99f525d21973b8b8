//! Keyword triggers and the reconciliation of a flow's keyword set.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::types::{FlowId, OrgId, TriggerId};
use crate::{CoreError, CoreResult};

/// Maximum keyword length in characters
pub const KEYWORD_MAX_LEN: usize = 16;

fn keyword_regex() -> &'static Regex {
    static KEYWORD: OnceLock<Regex> = OnceLock::new();
    KEYWORD.get_or_init(|| Regex::new(r"^\w+$").unwrap())
}

/// A keyword bound to a flow within a workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordTrigger {
    /// Unique identifier
    pub id: TriggerId,

    /// Owning workspace
    pub org: OrgId,

    /// Flow this keyword starts
    pub flow: FlowId,

    /// The normalized keyword
    pub keyword: String,

    /// Archived triggers are kept for reactivation, not deleted
    pub is_archived: bool,

    /// Soft-delete flag
    pub is_active: bool,

    /// When the trigger was created
    pub created_on: DateTime<Utc>,
}

impl KeywordTrigger {
    /// Create a new active trigger
    pub fn new(org: OrgId, flow: FlowId, keyword: &str) -> Self {
        Self {
            id: TriggerId::new(),
            org,
            flow,
            keyword: keyword.to_string(),
            is_archived: false,
            is_active: true,
            created_on: Utc::now(),
        }
    }
}

/// Normalize and validate a single keyword.
///
/// Keywords are lowercased and trimmed, must be a single word of Unicode
/// letters and digits, and at most [`KEYWORD_MAX_LEN`] characters.
pub fn clean_keyword(raw: &str) -> CoreResult<String> {
    let keyword = raw.trim().to_lowercase();

    if keyword.is_empty() {
        return Err(CoreError::ValidationError(
            "Keyword cannot be empty".to_string(),
        ));
    }

    if !keyword_regex().is_match(&keyword) || keyword.chars().count() > KEYWORD_MAX_LEN {
        return Err(CoreError::ValidationError(format!(
            "\"{}\" must be a single word, less than {} characters, containing only letters and numbers",
            keyword, KEYWORD_MAX_LEN
        )));
    }

    Ok(keyword)
}

/// Normalize and validate a submitted keyword set, checking each keyword
/// against the workspace's other flows.
///
/// `in_use_elsewhere` reports whether an active, non-archived trigger for
/// the keyword exists on a different flow in the org.
pub fn clean_keywords(
    raw: &[String],
    mut in_use_elsewhere: impl FnMut(&str) -> bool,
) -> CoreResult<BTreeSet<String>> {
    let mut wrong_format = Vec::new();
    let mut duplicates = Vec::new();
    let mut cleaned = BTreeSet::new();

    for raw_keyword in raw {
        let keyword = raw_keyword.trim().to_lowercase();
        if keyword.is_empty() {
            continue;
        }

        if !keyword_regex().is_match(&keyword) || keyword.chars().count() > KEYWORD_MAX_LEN {
            wrong_format.push(keyword);
            continue;
        }

        if in_use_elsewhere(&keyword) {
            duplicates.push(keyword);
        } else {
            cleaned.insert(keyword);
        }
    }

    if !wrong_format.is_empty() {
        return Err(CoreError::ValidationError(format!(
            "\"{}\" must be a single word, less than {} characters, containing only letters and numbers",
            wrong_format.join(", "),
            KEYWORD_MAX_LEN
        )));
    }

    if !duplicates.is_empty() {
        let message = if duplicates.len() > 1 {
            format!(
                "The keywords \"{}\" are already used for another flow",
                duplicates.join(", ")
            )
        } else {
            format!(
                "The keyword \"{}\" is already used for another flow",
                duplicates.join(", ")
            )
        };
        return Err(CoreError::ValidationError(message));
    }

    Ok(cleaned)
}

/// One operation produced by reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerChange {
    /// Archive the active trigger for this keyword
    Archive(String),

    /// Reactivate an archived trigger for this keyword
    Restore(String),

    /// Create a new trigger for this keyword
    Create(String),
}

/// Compute the minimal set of archive/restore/create operations taking a
/// flow's active keyword set to a newly submitted one.
///
/// Removed keywords are archived, never deleted. Added keywords are
/// processed in sorted order so creation order is deterministic, restoring
/// an archived trigger when one exists. Reconciling the same target set
/// twice is a no-op.
pub fn reconcile(
    existing: &BTreeSet<String>,
    archived: &BTreeSet<String>,
    new: &BTreeSet<String>,
) -> Vec<TriggerChange> {
    let mut changes = Vec::new();

    for removed in existing.difference(new) {
        changes.push(TriggerChange::Archive(removed.clone()));
    }

    // BTreeSet difference is already lexicographically ordered
    for added in new.difference(existing) {
        if archived.contains(added) {
            changes.push(TriggerChange::Restore(added.clone()));
        } else {
            changes.push(TriggerChange::Create(added.clone()));
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(keywords: &[&str]) -> BTreeSet<String> {
        keywords.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_clean_keyword() {
        assert_eq!(clean_keyword(" Start ").unwrap(), "start");
        assert_eq!(clean_keyword("unique").unwrap(), "unique");
        assert_eq!(clean_keyword("مرحبا").unwrap(), "مرحبا");

        assert!(clean_keyword("").is_err());
        assert!(clean_keyword("two words").is_err());
        assert!(clean_keyword("hyphen-ated").is_err());
        assert!(clean_keyword("seventeencharacts").is_err());
    }

    #[test]
    fn test_clean_keywords_reports_duplicates() {
        let err = clean_keywords(&["start".to_string()], |_| true).unwrap_err();
        assert!(err
            .to_string()
            .contains("The keyword \"start\" is already used for another flow"));

        let err = clean_keywords(
            &["start".to_string(), "join".to_string()],
            |_| true,
        )
        .unwrap_err();
        assert!(err.to_string().contains("keywords"));

        let ok = clean_keywords(
            &["Start".to_string(), "".to_string(), "JOIN".to_string()],
            |_| false,
        )
        .unwrap();
        assert_eq!(ok, set(&["join", "start"]));
    }

    #[test]
    fn test_clean_keywords_reports_bad_format() {
        let err = clean_keywords(
            &["ok".to_string(), "not ok".to_string()],
            |_| false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not ok"));
    }

    #[test]
    fn test_reconcile_basic() {
        let changes = reconcile(
            &set(&["start", "join"]),
            &set(&["old"]),
            &set(&["join", "old", "zebra", "apple"]),
        );

        assert_eq!(
            changes,
            vec![
                TriggerChange::Archive("start".to_string()),
                TriggerChange::Create("apple".to_string()),
                TriggerChange::Restore("old".to_string()),
                TriggerChange::Create("zebra".to_string()),
            ]
        );
    }

    #[test]
    fn test_reconcile_added_keywords_sorted() {
        let changes = reconcile(&set(&[]), &set(&[]), &set(&["zebra", "apple", "mango"]));
        assert_eq!(
            changes,
            vec![
                TriggerChange::Create("apple".to_string()),
                TriggerChange::Create("mango".to_string()),
                TriggerChange::Create("zebra".to_string()),
            ]
        );
    }

    #[test]
    fn test_reconcile_idempotent() {
        // reconciling A -> B, then applying and reconciling B -> B, is a no-op
        let existing = set(&["start", "join"]);
        let archived = set(&["old"]);
        let target = set(&["join", "old", "apple"]);

        let changes = reconcile(&existing, &archived, &target);
        assert!(!changes.is_empty());

        // apply the changes to produce the new state
        let mut new_existing = existing.clone();
        let mut new_archived = archived.clone();
        for change in changes {
            match change {
                TriggerChange::Archive(k) => {
                    new_existing.remove(&k);
                    new_archived.insert(k);
                }
                TriggerChange::Restore(k) => {
                    new_archived.remove(&k);
                    new_existing.insert(k);
                }
                TriggerChange::Create(k) => {
                    new_existing.insert(k);
                }
            }
        }

        assert_eq!(new_existing, target);
        assert_eq!(reconcile(&new_existing, &new_archived, &target), vec![]);
    }
}
