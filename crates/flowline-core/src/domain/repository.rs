//! Repository traits for the Flowline core
//!
//! These traits are the persistence seams of the core. The `memory` module
//! provides concurrent in-memory implementations used by the server wiring
//! and by tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::BTreeSet;

use super::export::ResultsExport;
use super::flow::Flow;
use super::revision::FlowRevision;
use super::run::FlowRun;
use super::start::FlowStart;
use super::trigger::{KeywordTrigger, TriggerChange};
use super::workspace::Workspace;
use crate::types::{ExportId, FlowId, OrgId, RunId, StartId};
use crate::CoreError;

/// Exports newer than this may block another export for the same workspace
const RECENT_EXPORT_WINDOW_HOURS: i64 = 4;

/// Repository for workspaces
#[async_trait]
pub trait WorkspaceRepository: Send + Sync {
    /// Find a workspace by ID
    async fn find_by_id(&self, id: OrgId) -> Result<Option<Workspace>, CoreError>;

    /// Save a workspace
    async fn save(&self, workspace: &Workspace) -> Result<(), CoreError>;
}

/// Repository for flows
#[async_trait]
pub trait FlowRepository: Send + Sync {
    /// Find a flow by ID
    async fn find_by_id(&self, id: &FlowId) -> Result<Option<Flow>, CoreError>;

    /// Save a flow
    async fn save(&self, flow: &Flow) -> Result<(), CoreError>;

    /// List active flows for a workspace, archived or not
    async fn list_for_org(&self, org: OrgId, archived: bool) -> Result<Vec<Flow>, CoreError>;

    /// Active flows which declare a dependency on the given flow
    async fn dependents_of(&self, id: &FlowId) -> Result<Vec<Flow>, CoreError>;
}

/// Repository for flow revisions
#[async_trait]
pub trait RevisionRepository: Send + Sync {
    /// Append a revision; revisions are immutable once created
    async fn create(&self, revision: &FlowRevision) -> Result<(), CoreError>;

    /// Find a specific revision of a flow
    async fn find(&self, flow: &FlowId, revision: u32) -> Result<Option<FlowRevision>, CoreError>;

    /// Revisions of a flow, newest first, up to `limit`
    async fn list_for_flow(
        &self,
        flow: &FlowId,
        limit: usize,
    ) -> Result<Vec<FlowRevision>, CoreError>;
}

/// Repository for flow runs
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Find a run by ID
    async fn find_by_id(&self, id: &RunId) -> Result<Option<FlowRun>, CoreError>;

    /// Save a run
    async fn save(&self, run: &FlowRun) -> Result<(), CoreError>;

    /// All non-deleted runs for a flow
    async fn list_for_flow(&self, flow: &FlowId) -> Result<Vec<FlowRun>, CoreError>;

    /// A page of non-deleted runs for a flow, newest modification first
    async fn page_for_flow(
        &self,
        flow: &FlowId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<FlowRun>, CoreError>;
}

/// Repository for flow starts
#[async_trait]
pub trait StartRepository: Send + Sync {
    /// Find a start by ID
    async fn find_by_id(&self, id: &StartId) -> Result<Option<FlowStart>, CoreError>;

    /// Save a start
    async fn save(&self, start: &FlowStart) -> Result<(), CoreError>;

    /// Whether the flow has a start in a non-terminal status
    async fn has_unfinished_for_flow(&self, flow: &FlowId) -> Result<bool, CoreError>;

    /// Starts for a workspace, newest first, up to `limit`
    async fn list_for_org(&self, org: OrgId, limit: usize) -> Result<Vec<FlowStart>, CoreError>;
}

/// Repository for keyword triggers
#[async_trait]
pub trait TriggerRepository: Send + Sync {
    /// Save a trigger
    async fn save(&self, trigger: &KeywordTrigger) -> Result<(), CoreError>;

    /// Active, non-archived keywords for a flow
    async fn active_keywords(&self, flow: &FlowId) -> Result<BTreeSet<String>, CoreError>;

    /// Active but archived keywords for a flow
    async fn archived_keywords(&self, flow: &FlowId) -> Result<BTreeSet<String>, CoreError>;

    /// All keywords with an active, non-archived trigger in the workspace,
    /// on flows other than `exclude`
    async fn keywords_in_use(
        &self,
        org: OrgId,
        exclude: Option<&FlowId>,
    ) -> Result<BTreeSet<String>, CoreError>;

    /// Apply reconciliation changes for a flow's keyword set
    async fn apply_changes(
        &self,
        org: OrgId,
        flow: &FlowId,
        changes: &[TriggerChange],
    ) -> Result<(), CoreError>;
}

/// Repository for results exports
#[async_trait]
pub trait ExportRepository: Send + Sync {
    /// Find an export by ID
    async fn find_by_id(&self, id: &ExportId) -> Result<Option<ResultsExport>, CoreError>;

    /// Save an export
    async fn save(&self, export: &ResultsExport) -> Result<(), CoreError>;

    /// The most recent unfinished export for a workspace, if any
    async fn recent_unfinished(&self, org: OrgId) -> Result<Option<ResultsExport>, CoreError>;
}

/// In-memory implementations backed by concurrent maps
pub mod memory {
    use super::*;
    use dashmap::DashMap;
    use uuid::Uuid;

    /// In-memory workspace repository
    #[derive(Default)]
    pub struct MemoryWorkspaceRepository {
        workspaces: DashMap<i64, Workspace>,
    }

    impl MemoryWorkspaceRepository {
        /// Create a new empty repository
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl WorkspaceRepository for MemoryWorkspaceRepository {
        async fn find_by_id(&self, id: OrgId) -> Result<Option<Workspace>, CoreError> {
            Ok(self.workspaces.get(&id.0).map(|w| w.clone()))
        }

        async fn save(&self, workspace: &Workspace) -> Result<(), CoreError> {
            self.workspaces.insert(workspace.id.0, workspace.clone());
            Ok(())
        }
    }

    /// In-memory flow repository
    #[derive(Default)]
    pub struct MemoryFlowRepository {
        flows: DashMap<Uuid, Flow>,
    }

    impl MemoryFlowRepository {
        /// Create a new empty repository
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl FlowRepository for MemoryFlowRepository {
        async fn find_by_id(&self, id: &FlowId) -> Result<Option<Flow>, CoreError> {
            Ok(self.flows.get(&id.0).map(|f| f.clone()))
        }

        async fn save(&self, flow: &Flow) -> Result<(), CoreError> {
            self.flows.insert(flow.id.0, flow.clone());
            Ok(())
        }

        async fn list_for_org(&self, org: OrgId, archived: bool) -> Result<Vec<Flow>, CoreError> {
            let mut flows: Vec<Flow> = self
                .flows
                .iter()
                .filter(|f| {
                    f.org == org && f.is_active && !f.is_system && f.is_archived == archived
                })
                .map(|f| f.clone())
                .collect();

            flows.sort_by(|a, b| b.saved_on.cmp(&a.saved_on));
            Ok(flows)
        }

        async fn dependents_of(&self, id: &FlowId) -> Result<Vec<Flow>, CoreError> {
            let mut flows: Vec<Flow> = self
                .flows
                .iter()
                .filter(|f| f.is_active && f.dependencies.contains(id))
                .map(|f| f.clone())
                .collect();

            flows.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(flows)
        }
    }

    /// In-memory revision repository
    #[derive(Default)]
    pub struct MemoryRevisionRepository {
        // revisions per flow, in creation order
        revisions: DashMap<Uuid, Vec<FlowRevision>>,
    }

    impl MemoryRevisionRepository {
        /// Create a new empty repository
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl RevisionRepository for MemoryRevisionRepository {
        async fn create(&self, revision: &FlowRevision) -> Result<(), CoreError> {
            let mut entry = self.revisions.entry(revision.flow.0).or_default();
            if entry.iter().any(|r| r.revision == revision.revision) {
                return Err(CoreError::StorageError(format!(
                    "Revision {} already exists for flow {}",
                    revision.revision, revision.flow
                )));
            }
            entry.push(revision.clone());
            Ok(())
        }

        async fn find(
            &self,
            flow: &FlowId,
            revision: u32,
        ) -> Result<Option<FlowRevision>, CoreError> {
            Ok(self
                .revisions
                .get(&flow.0)
                .and_then(|revs| revs.iter().find(|r| r.revision == revision).cloned()))
        }

        async fn list_for_flow(
            &self,
            flow: &FlowId,
            limit: usize,
        ) -> Result<Vec<FlowRevision>, CoreError> {
            let mut revs: Vec<FlowRevision> = self
                .revisions
                .get(&flow.0)
                .map(|revs| revs.clone())
                .unwrap_or_default();

            revs.sort_by(|a, b| b.revision.cmp(&a.revision));
            revs.truncate(limit);
            Ok(revs)
        }
    }

    /// In-memory run repository
    #[derive(Default)]
    pub struct MemoryRunRepository {
        runs: DashMap<Uuid, FlowRun>,
    }

    impl MemoryRunRepository {
        /// Create a new empty repository
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl RunRepository for MemoryRunRepository {
        async fn find_by_id(&self, id: &RunId) -> Result<Option<FlowRun>, CoreError> {
            Ok(self.runs.get(&id.0).map(|r| r.clone()))
        }

        async fn save(&self, run: &FlowRun) -> Result<(), CoreError> {
            self.runs.insert(run.id.0, run.clone());
            Ok(())
        }

        async fn list_for_flow(&self, flow: &FlowId) -> Result<Vec<FlowRun>, CoreError> {
            Ok(self
                .runs
                .iter()
                .filter(|r| r.flow == *flow && !r.is_deleted)
                .map(|r| r.clone())
                .collect())
        }

        async fn page_for_flow(
            &self,
            flow: &FlowId,
            offset: usize,
            limit: usize,
        ) -> Result<Vec<FlowRun>, CoreError> {
            let mut runs = self.list_for_flow(flow).await?;
            runs.sort_by(|a, b| b.modified_on.cmp(&a.modified_on));
            Ok(runs.into_iter().skip(offset).take(limit).collect())
        }
    }

    /// In-memory start repository
    #[derive(Default)]
    pub struct MemoryStartRepository {
        starts: DashMap<Uuid, FlowStart>,
    }

    impl MemoryStartRepository {
        /// Create a new empty repository
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl StartRepository for MemoryStartRepository {
        async fn find_by_id(&self, id: &StartId) -> Result<Option<FlowStart>, CoreError> {
            Ok(self.starts.get(&id.0).map(|s| s.clone()))
        }

        async fn save(&self, start: &FlowStart) -> Result<(), CoreError> {
            self.starts.insert(start.id.0, start.clone());
            Ok(())
        }

        async fn has_unfinished_for_flow(&self, flow: &FlowId) -> Result<bool, CoreError> {
            Ok(self
                .starts
                .iter()
                .any(|s| s.flow == *flow && !s.status.is_terminal()))
        }

        async fn list_for_org(
            &self,
            org: OrgId,
            limit: usize,
        ) -> Result<Vec<FlowStart>, CoreError> {
            let mut starts: Vec<FlowStart> = self
                .starts
                .iter()
                .filter(|s| s.org == org)
                .map(|s| s.clone())
                .collect();

            starts.sort_by(|a, b| b.created_on.cmp(&a.created_on));
            starts.truncate(limit);
            Ok(starts)
        }
    }

    /// In-memory trigger repository
    #[derive(Default)]
    pub struct MemoryTriggerRepository {
        triggers: DashMap<Uuid, KeywordTrigger>,
    }

    impl MemoryTriggerRepository {
        /// Create a new empty repository
        pub fn new() -> Self {
            Self::default()
        }

        fn keywords_for_flow(&self, flow: &FlowId, archived: bool) -> BTreeSet<String> {
            self.triggers
                .iter()
                .filter(|t| t.flow == *flow && t.is_active && t.is_archived == archived)
                .map(|t| t.keyword.clone())
                .collect()
        }
    }

    #[async_trait]
    impl TriggerRepository for MemoryTriggerRepository {
        async fn save(&self, trigger: &KeywordTrigger) -> Result<(), CoreError> {
            self.triggers.insert(trigger.id.0, trigger.clone());
            Ok(())
        }

        async fn active_keywords(&self, flow: &FlowId) -> Result<BTreeSet<String>, CoreError> {
            Ok(self.keywords_for_flow(flow, false))
        }

        async fn archived_keywords(&self, flow: &FlowId) -> Result<BTreeSet<String>, CoreError> {
            Ok(self.keywords_for_flow(flow, true))
        }

        async fn keywords_in_use(
            &self,
            org: OrgId,
            exclude: Option<&FlowId>,
        ) -> Result<BTreeSet<String>, CoreError> {
            Ok(self
                .triggers
                .iter()
                .filter(|t| {
                    t.org == org
                        && t.is_active
                        && !t.is_archived
                        && exclude.map_or(true, |f| t.flow != *f)
                })
                .map(|t| t.keyword.clone())
                .collect())
        }

        async fn apply_changes(
            &self,
            org: OrgId,
            flow: &FlowId,
            changes: &[TriggerChange],
        ) -> Result<(), CoreError> {
            for change in changes {
                match change {
                    TriggerChange::Archive(keyword) => {
                        for mut trigger in self.triggers.iter_mut() {
                            if trigger.flow == *flow
                                && trigger.keyword == *keyword
                                && !trigger.is_archived
                            {
                                trigger.is_archived = true;
                            }
                        }
                    }
                    TriggerChange::Restore(keyword) => {
                        for mut trigger in self.triggers.iter_mut() {
                            if trigger.flow == *flow && trigger.keyword == *keyword {
                                trigger.is_archived = false;
                            }
                        }
                    }
                    TriggerChange::Create(keyword) => {
                        let trigger = KeywordTrigger::new(org, *flow, keyword);
                        self.triggers.insert(trigger.id.0, trigger);
                    }
                }
            }
            Ok(())
        }
    }

    /// In-memory export repository
    #[derive(Default)]
    pub struct MemoryExportRepository {
        exports: DashMap<Uuid, ResultsExport>,
    }

    impl MemoryExportRepository {
        /// Create a new empty repository
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl ExportRepository for MemoryExportRepository {
        async fn find_by_id(&self, id: &ExportId) -> Result<Option<ResultsExport>, CoreError> {
            Ok(self.exports.get(&id.0).map(|e| e.clone()))
        }

        async fn save(&self, export: &ResultsExport) -> Result<(), CoreError> {
            self.exports.insert(export.id.0, export.clone());
            Ok(())
        }

        async fn recent_unfinished(
            &self,
            org: OrgId,
        ) -> Result<Option<ResultsExport>, CoreError> {
            let cutoff = Utc::now() - Duration::hours(RECENT_EXPORT_WINDOW_HOURS);

            let mut unfinished: Vec<ResultsExport> = self
                .exports
                .iter()
                .filter(|e| e.org == org && !e.is_finished() && e.created_on > cutoff)
                .map(|e| e.clone())
                .collect();

            unfinished.sort_by(|a, b| b.created_on.cmp(&a.created_on));
            Ok(unfinished.into_iter().next())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::*;
    use super::*;
    use crate::domain::flow::FlowType;
    use crate::domain::start::Recipients;
    use crate::types::ContactId;

    #[tokio::test]
    async fn test_flow_repository_listing() {
        let repo = MemoryFlowRepository::new();
        let org = OrgId(1);

        let mut active = Flow::new(org, "admin", "Active", FlowType::Message);
        let mut archived = Flow::new(org, "admin", "Archived", FlowType::Message);
        archived.archive().unwrap();
        let mut deleted = Flow::new(org, "admin", "Deleted", FlowType::Message);
        deleted.release();
        let other_org = Flow::new(OrgId(2), "admin", "Other", FlowType::Message);

        for flow in [&active, &archived, &deleted, &other_org] {
            repo.save(flow).await.unwrap();
        }

        let listed = repo.list_for_org(org, false).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Active");

        let listed = repo.list_for_org(org, true).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Archived");

        // dependencies block deletion
        active.dependencies.push(archived.id);
        repo.save(&active).await.unwrap();
        let dependents = repo.dependents_of(&archived.id).await.unwrap();
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].name, "Active");
    }

    #[tokio::test]
    async fn test_revision_repository_rejects_duplicates() {
        use crate::domain::revision::{FlowRevision, SpecVersion};

        let repo = MemoryRevisionRepository::new();
        let flow = FlowId::new();

        let rev = FlowRevision::new(
            flow,
            1,
            SpecVersion::current(),
            serde_json::json!({}),
            "admin",
        );
        repo.create(&rev).await.unwrap();
        assert!(repo.create(&rev).await.is_err());

        let listed = repo.list_for_flow(&flow, 100).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_start_repository_unfinished() {
        let repo = MemoryStartRepository::new();
        let flow = FlowId::new();

        let mut start = crate::domain::start::FlowStart::new(
            flow,
            OrgId(1),
            "admin",
            Recipients::Selection {
                contacts: vec![ContactId::new()],
                groups: vec![],
            },
            false,
            false,
        );
        repo.save(&start).await.unwrap();
        assert!(repo.has_unfinished_for_flow(&flow).await.unwrap());

        start.begin().unwrap();
        start.complete(5).unwrap();
        repo.save(&start).await.unwrap();
        assert!(!repo.has_unfinished_for_flow(&flow).await.unwrap());
    }

    #[tokio::test]
    async fn test_trigger_repository_reconciliation_roundtrip() {
        use crate::domain::trigger::reconcile;

        let repo = MemoryTriggerRepository::new();
        let org = OrgId(1);
        let flow = FlowId::new();

        let target: BTreeSet<String> =
            ["join".to_string(), "start".to_string()].into_iter().collect();

        let changes = reconcile(
            &repo.active_keywords(&flow).await.unwrap(),
            &repo.archived_keywords(&flow).await.unwrap(),
            &target,
        );
        repo.apply_changes(org, &flow, &changes).await.unwrap();
        assert_eq!(repo.active_keywords(&flow).await.unwrap(), target);

        // reconciling again against the stored state is a no-op
        let changes = reconcile(
            &repo.active_keywords(&flow).await.unwrap(),
            &repo.archived_keywords(&flow).await.unwrap(),
            &target,
        );
        assert!(changes.is_empty());

        // dropping a keyword archives it, and it can be restored later
        let smaller: BTreeSet<String> = ["join".to_string()].into_iter().collect();
        let changes = reconcile(
            &repo.active_keywords(&flow).await.unwrap(),
            &repo.archived_keywords(&flow).await.unwrap(),
            &smaller,
        );
        repo.apply_changes(org, &flow, &changes).await.unwrap();
        assert_eq!(repo.active_keywords(&flow).await.unwrap(), smaller);
        assert_eq!(
            repo.archived_keywords(&flow).await.unwrap(),
            ["start".to_string()].into_iter().collect()
        );

        let changes = reconcile(
            &repo.active_keywords(&flow).await.unwrap(),
            &repo.archived_keywords(&flow).await.unwrap(),
            &target,
        );
        assert_eq!(
            changes,
            vec![crate::domain::trigger::TriggerChange::Restore(
                "start".to_string()
            )]
        );

        // the in-use set respects the exclude filter
        repo.apply_changes(org, &flow, &changes).await.unwrap();
        assert!(repo
            .keywords_in_use(org, None)
            .await
            .unwrap()
            .contains("start"));
        assert!(repo
            .keywords_in_use(org, Some(&flow))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_export_repository_recent_unfinished() {
        use crate::domain::export::{ExportStatus, ResultsExport};

        let repo = MemoryExportRepository::new();
        let org = OrgId(1);

        assert!(repo.recent_unfinished(org).await.unwrap().is_none());

        let mut export = ResultsExport::new(
            org,
            "admin",
            vec![FlowId::new()],
            vec![],
            vec![],
            vec![],
            true,
            false,
        )
        .unwrap();
        repo.save(&export).await.unwrap();

        let existing = repo.recent_unfinished(org).await.unwrap().unwrap();
        assert_eq!(existing.id, export.id);
        assert_eq!(existing.created_by, "admin");

        export.status = ExportStatus::Complete;
        repo.save(&export).await.unwrap();
        assert!(repo.recent_unfinished(org).await.unwrap().is_none());
    }
}
