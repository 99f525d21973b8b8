//! Core server implementation
//!
//! `FlowlineServer` wires the domain repositories, the execution engine
//! client and the task queue together behind the operations the API
//! exposes.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{debug, info};

use flowline_core::domain::flow::{Flow, FlowType, ResultSpec};
use flowline_core::domain::repository::memory::{
    MemoryExportRepository, MemoryFlowRepository, MemoryRevisionRepository, MemoryRunRepository,
    MemoryStartRepository, MemoryTriggerRepository, MemoryWorkspaceRepository,
};
use flowline_core::domain::repository::{
    ExportRepository, FlowRepository, RevisionRepository, RunRepository, StartRepository,
    TriggerRepository, WorkspaceRepository,
};
use flowline_core::domain::revision::{check_save_conflicts, is_listable, FlowRevision, SpecVersion};
use flowline_core::domain::run::FlowRun;
use flowline_core::domain::start::{check_admission, FlowStart, Recipients, StartSnapshot};
use flowline_core::domain::trigger::{clean_keywords, reconcile};
use flowline_core::domain::workspace::Workspace;
use flowline_core::domain::{ExportStatus, ResultsExport};
use flowline_core::stats::{category_counts, ActivityChart, ResultCategoryCounts, RunTotals};
use flowline_core::{CoreError, FlowId, GroupId, OrgId, RunId, StartId};
use flowline_engine::{parse_info, EngineClient};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::queue::{Task, TaskQueue};

/// The persistence backends the server operates over
#[derive(Clone)]
pub struct Stores {
    /// Workspace repository
    pub workspaces: Arc<dyn WorkspaceRepository>,
    /// Flow repository
    pub flows: Arc<dyn FlowRepository>,
    /// Revision repository
    pub revisions: Arc<dyn RevisionRepository>,
    /// Run repository
    pub runs: Arc<dyn RunRepository>,
    /// Start repository
    pub starts: Arc<dyn StartRepository>,
    /// Trigger repository
    pub triggers: Arc<dyn TriggerRepository>,
    /// Export repository
    pub exports: Arc<dyn ExportRepository>,
}

impl Stores {
    /// Create a full set of in-memory stores
    pub fn in_memory() -> Self {
        Self {
            workspaces: Arc::new(MemoryWorkspaceRepository::new()),
            flows: Arc::new(MemoryFlowRepository::new()),
            revisions: Arc::new(MemoryRevisionRepository::new()),
            runs: Arc::new(MemoryRunRepository::new()),
            starts: Arc::new(MemoryStartRepository::new()),
            triggers: Arc::new(MemoryTriggerRepository::new()),
            exports: Arc::new(MemoryExportRepository::new()),
        }
    }
}

/// Parameters for requesting a results export
#[derive(Debug, Clone, Deserialize)]
pub struct ExportParams {
    /// Flows to include
    pub flows: Vec<FlowId>,

    /// Contact-field columns to include
    #[serde(default)]
    pub contact_fields: Vec<String>,

    /// Group-membership columns to include
    #[serde(default)]
    pub group_memberships: Vec<GroupId>,

    /// URN schemes beyond the one used by the flow
    #[serde(default)]
    pub extra_urns: Vec<String>,

    /// Only include contacts which responded
    #[serde(default)]
    pub responded_only: bool,

    /// Include all messages sent and received in the flow
    #[serde(default)]
    pub include_msgs: bool,
}

/// The Flowline server
#[derive(Clone)]
pub struct FlowlineServer {
    /// Server configuration
    pub config: ServerConfig,

    stores: Stores,
    engine: Arc<dyn EngineClient>,
    queue: Arc<dyn TaskQueue>,
}

impl FlowlineServer {
    /// Create a new server
    pub fn new(
        config: ServerConfig,
        stores: Stores,
        engine: Arc<dyn EngineClient>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self {
            config,
            stores,
            engine,
            queue,
        }
    }

    /// Run the server
    pub async fn run(self) -> ServerResult<()> {
        info!("Starting Flowline server");

        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        let app = crate::api::build_router(Arc::new(self));

        let listener = TcpListener::bind(&addr).await?;
        info!("Listening on {}", listener.local_addr()?);

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::InternalError(e.to_string()))?;

        Ok(())
    }

    /// Fetch a workspace or fail with not found
    pub async fn get_workspace(&self, org: OrgId) -> ServerResult<Workspace> {
        self.stores
            .workspaces
            .find_by_id(org)
            .await?
            .ok_or_else(|| CoreError::NotFound("Workspace".to_string()).into())
    }

    /// Fetch a live flow or fail with not found
    pub async fn get_flow(&self, id: &FlowId) -> ServerResult<Flow> {
        match self.stores.flows.find_by_id(id).await? {
            Some(flow) if flow.is_active => Ok(flow),
            _ => Err(CoreError::NotFound("Flow".to_string()).into()),
        }
    }

    /// List a workspace's flows, active or archived
    pub async fn list_flows(&self, org: OrgId, archived: bool) -> ServerResult<Vec<Flow>> {
        Ok(self.stores.flows.list_for_org(org, archived).await?)
    }

    /// Create a new flow with an initial empty revision and any keyword
    /// triggers
    pub async fn create_flow(
        &self,
        org: OrgId,
        user: &str,
        name: &str,
        flow_type: FlowType,
        base_language: &str,
        keywords: &[String],
    ) -> ServerResult<Flow> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::ValidationError("Flow name is required".to_string()).into());
        }

        for existing in self.stores.flows.list_for_org(org, false).await? {
            if existing.name.eq_ignore_ascii_case(name) {
                return Err(CoreError::ValidationError(format!(
                    "Already used by another flow: {}",
                    existing.name
                ))
                .into());
            }
        }

        let in_use = self.stores.triggers.keywords_in_use(org, None).await?;
        let keywords = clean_keywords(keywords, |keyword| in_use.contains(keyword))?;

        let mut flow = Flow::new(org, user, name, flow_type);
        flow.base_language = base_language.to_string();
        flow.revision = 1;

        let definition = json!({
            "uuid": flow.id.to_string(),
            "name": flow.name,
            "spec_version": flow.version.to_string(),
            "language": flow.base_language,
            "type": flow_type_as_def(flow.flow_type),
            "nodes": [],
            "revision": 1,
            "expire_after_minutes": flow.expires_after_minutes,
        });

        self.stores.flows.save(&flow).await?;
        self.stores
            .revisions
            .create(&FlowRevision::new(flow.id, 1, flow.version, definition, user))
            .await?;

        let changes = reconcile(&Default::default(), &Default::default(), &keywords);
        self.stores
            .triggers
            .apply_changes(org, &flow.id, &changes)
            .await?;

        info!(flow = %flow.id, name = %flow.name, "created flow");
        Ok(flow)
    }

    /// Update a flow's name, keyword set and expiration
    pub async fn update_flow(
        &self,
        id: &FlowId,
        name: Option<&str>,
        keywords: Option<&[String]>,
        expires_after_minutes: Option<u32>,
    ) -> ServerResult<Flow> {
        let mut flow = self.get_flow(id).await?;

        if let Some(name) = name {
            let name = name.trim();
            if name.is_empty() {
                return Err(
                    CoreError::ValidationError("Flow name is required".to_string()).into(),
                );
            }
            flow.name = name.to_string();
        }

        if let Some(expires) = expires_after_minutes {
            flow.expires_after_minutes = expires;
        }

        if let Some(keywords) = keywords {
            let in_use = self
                .stores
                .triggers
                .keywords_in_use(flow.org, Some(&flow.id))
                .await?;
            let keywords = clean_keywords(keywords, |keyword| in_use.contains(keyword))?;

            let existing = self.stores.triggers.active_keywords(&flow.id).await?;
            let archived = self.stores.triggers.archived_keywords(&flow.id).await?;
            let changes = reconcile(&existing, &archived, &keywords);
            debug!(flow = %flow.id, changes = changes.len(), "reconciling keywords");
            self.stores
                .triggers
                .apply_changes(flow.org, &flow.id, &changes)
                .await?;
        }

        self.stores.flows.save(&flow).await?;
        Ok(flow)
    }

    /// Copy a flow within its workspace, cloning its latest definition
    pub async fn copy_flow(&self, id: &FlowId, user: &str) -> ServerResult<Flow> {
        let flow = self.get_flow(id).await?;
        let mut copy = flow.copy(user);
        copy.revision = 1;

        let mut definition = self.current_definition(&flow).await?;
        if let Some(obj) = definition.as_object_mut() {
            obj.insert("uuid".to_string(), json!(copy.id.to_string()));
            obj.insert("name".to_string(), json!(copy.name));
            obj.insert("revision".to_string(), json!(1));
        }

        self.stores.flows.save(&copy).await?;
        self.stores
            .revisions
            .create(&FlowRevision::new(copy.id, 1, copy.version, definition, user))
            .await?;

        info!(source = %flow.id, copy = %copy.id, "copied flow");
        Ok(copy)
    }

    /// Soft-delete a flow, archiving its triggers and interrupting its
    /// sessions. Fails if other flows depend on it.
    pub async fn delete_flow(&self, id: &FlowId) -> ServerResult<()> {
        let mut flow = self.get_flow(id).await?;

        let dependents = self.stores.flows.dependents_of(id).await?;
        if !dependents.is_empty() {
            let names = dependents.into_iter().map(|f| f.name).collect();
            return Err(CoreError::DependentFlows(names).into());
        }

        let existing = self.stores.triggers.active_keywords(&flow.id).await?;
        let changes = reconcile(&existing, &Default::default(), &Default::default());
        self.stores
            .triggers
            .apply_changes(flow.org, &flow.id, &changes)
            .await?;

        flow.release();
        self.stores.flows.save(&flow).await?;

        self.queue
            .enqueue(Task::InterruptFlow { flow_id: flow.id })
            .await?;

        info!(flow = %flow.id, "deleted flow");
        Ok(())
    }

    /// Archive flows, archiving their keyword triggers with them
    pub async fn archive_flows(&self, ids: &[FlowId]) -> ServerResult<Vec<Flow>> {
        let mut archived = Vec::new();

        for id in ids {
            let mut flow = self.get_flow(id).await?;
            flow.archive()?;

            let existing = self.stores.triggers.active_keywords(&flow.id).await?;
            let changes = reconcile(&existing, &Default::default(), &Default::default());
            self.stores
                .triggers
                .apply_changes(flow.org, &flow.id, &changes)
                .await?;

            self.stores.flows.save(&flow).await?;
            archived.push(flow);
        }

        Ok(archived)
    }

    /// Restore archived flows. Their triggers stay archived until
    /// explicitly reactivated.
    pub async fn restore_flows(&self, ids: &[FlowId]) -> ServerResult<Vec<Flow>> {
        let mut restored = Vec::new();

        for id in ids {
            let mut flow = self.get_flow(id).await?;
            flow.restore()?;
            self.stores.flows.save(&flow).await?;
            restored.push(flow);
        }

        Ok(restored)
    }

    /// Add or remove a label on the given flows
    pub async fn label_flows(&self, ids: &[FlowId], label: &str, add: bool) -> ServerResult<()> {
        let label = label.trim();
        if label.is_empty() {
            return Err(CoreError::ValidationError("Label is required".to_string()).into());
        }

        for id in ids {
            let mut flow = self.get_flow(id).await?;
            if add {
                if !flow.labels.iter().any(|l| l == label) {
                    flow.labels.push(label.to_string());
                }
            } else {
                flow.labels.retain(|l| l != label);
            }
            self.stores.flows.save(&flow).await?;
        }

        Ok(())
    }

    /// Save a new revision of a flow's definition.
    ///
    /// The client's revision number and spec version are checked against
    /// the flow before anything is written, and the definition is inspected
    /// by the engine to refresh the flow's cached metadata. Returns the
    /// updated flow, the new revision and any issues the engine reported.
    pub async fn save_revision(
        &self,
        id: &FlowId,
        user: &str,
        mut definition: Value,
    ) -> ServerResult<(Flow, FlowRevision, Vec<Value>)> {
        let mut flow = self.get_flow(id).await?;

        let client_version: SpecVersion = definition["spec_version"]
            .as_str()
            .ok_or_else(|| CoreError::ValidationError("spec_version is required".to_string()))?
            .parse()?;
        let client_revision = definition["revision"].as_u64().unwrap_or(0) as u32;

        check_save_conflicts(&flow, user, client_version, client_revision)?;

        let inspection = self.engine.flow_inspect(Some(flow.org), &definition).await?;

        flow.metadata.results = inspection["results"]
            .as_array()
            .map(|results| {
                results
                    .iter()
                    .filter_map(|r| serde_json::from_value::<ResultSpec>(r.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        flow.metadata.dependencies = inspection["dependencies"]
            .as_array()
            .map(|deps| {
                deps.iter()
                    .filter_map(|d| d["name"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        flow.metadata.waiting_exit_uuids = inspection["waiting_exits"]
            .as_array()
            .map(|exits| {
                exits
                    .iter()
                    .filter_map(|e| e.as_str().and_then(|s| s.parse().ok()))
                    .collect()
            })
            .unwrap_or_default();

        let issues = inspection["issues"].as_array().cloned().unwrap_or_default();

        flow.revision += 1;
        flow.version = client_version;
        flow.saved_by = user.to_string();
        flow.saved_on = Utc::now();

        if let Some(obj) = definition.as_object_mut() {
            obj.insert("revision".to_string(), json!(flow.revision));
        }

        let revision = FlowRevision::new(flow.id, flow.revision, client_version, definition, user);

        self.stores.flows.save(&flow).await?;
        self.stores.revisions.create(&revision).await?;

        debug!(flow = %flow.id, revision = flow.revision, "saved revision");
        Ok((flow, revision, issues))
    }

    /// List a flow's revisions, culling legacy revisions which no longer
    /// migrate cleanly
    pub async fn list_revisions(&self, id: &FlowId) -> ServerResult<Vec<Value>> {
        let flow = self.get_flow(id).await?;

        let revisions = self
            .stores
            .revisions
            .list_for_flow(&flow.id, self.config.revision_list_limit)
            .await?;

        Ok(revisions
            .iter()
            .filter(|r| is_listable(r))
            .map(|r| r.as_summary())
            .collect())
    }

    /// A single revision's definition, migrated to the current spec version
    pub async fn get_revision_definition(
        &self,
        id: &FlowId,
        revision: u32,
    ) -> ServerResult<Value> {
        let flow = self.get_flow(id).await?;

        let revision = self
            .stores
            .revisions
            .find(&flow.id, revision)
            .await?
            .ok_or_else(|| CoreError::NotFound("Revision".to_string()))?;

        Ok(revision.migrated_definition(&SpecVersion::current())?)
    }

    /// Start a flow for a set of recipients.
    ///
    /// The start is admitted against the workspace and flow state, persisted
    /// as pending, and only then queued for the engine, exactly once.
    pub async fn start_flow(
        &self,
        id: &FlowId,
        user: &str,
        recipients: Recipients,
        restart_participants: bool,
        include_active: bool,
    ) -> ServerResult<FlowStart> {
        let flow = self.get_flow(id).await?;
        if flow.is_archived {
            return Err(
                CoreError::ValidationError("Archived flows cannot be started".to_string()).into(),
            );
        }

        let workspace = self.get_workspace(flow.org).await?;
        let snapshot = StartSnapshot {
            org_suspended: workspace.is_suspended,
            org_flagged: workspace.is_flagged,
            flow_is_starting: self.stores.starts.has_unfinished_for_flow(&flow.id).await?,
        };

        let recipients = check_admission(&snapshot, recipients)?;

        let start = FlowStart::new(
            flow.id,
            flow.org,
            user,
            recipients,
            restart_participants,
            include_active,
        );
        self.stores.starts.save(&start).await?;

        self.queue
            .enqueue(Task::StartFlow { start_id: start.id })
            .await?;

        info!(flow = %flow.id, start = %start.id, "queued flow start");
        Ok(start)
    }

    /// Fetch a start or fail with not found
    pub async fn get_start(&self, id: &StartId) -> ServerResult<FlowStart> {
        self.stores
            .starts
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::NotFound("Start".to_string()).into())
    }

    /// Recent starts for a workspace
    pub async fn list_starts(&self, org: OrgId) -> ServerResult<Vec<FlowStart>> {
        Ok(self.stores.starts.list_for_org(org, 100).await?)
    }

    /// Request a results export.
    ///
    /// At most one unfinished export may be running per workspace; the
    /// export is persisted and then queued, exactly once.
    pub async fn request_export(
        &self,
        org: OrgId,
        user: &str,
        params: ExportParams,
    ) -> ServerResult<ResultsExport> {
        if let Some(existing) = self.stores.exports.recent_unfinished(org).await? {
            return Err(ServerError::ExportInProgress {
                started_by: existing.created_by,
            });
        }

        let export = ResultsExport::new(
            org,
            user,
            params.flows,
            params.contact_fields,
            params.group_memberships,
            params.extra_urns,
            params.responded_only,
            params.include_msgs,
        )?;
        self.stores.exports.save(&export).await?;

        self.queue
            .enqueue(Task::ExportResults {
                export_id: export.id,
            })
            .await?;

        info!(org = org.0, export = %export.id, "queued results export");
        Ok(export)
    }

    /// Mark an export finished, on behalf of a worker
    pub async fn complete_export(&self, export: &mut ResultsExport, failed: bool) -> ServerResult<()> {
        export.status = if failed {
            ExportStatus::Failed
        } else {
            ExportStatus::Complete
        };
        self.stores.exports.save(export).await?;
        Ok(())
    }

    /// Start a simulation session against a flow's current definition
    pub async fn simulate_start(&self, id: &FlowId, contact: Value) -> ServerResult<Value> {
        let flow = self.get_flow(id).await?;
        let workspace = self.get_workspace(flow.org).await?;

        let definition = self.current_definition(&flow).await?;
        let is_voice = flow.flow_type == FlowType::Voice;

        let payload = flowline_engine::simulate::start_payload(
            &workspace.as_environment_def(),
            &contact,
            &[definition],
            &flow.id.to_string(),
            is_voice,
        );

        Ok(self.engine.sim_start(&payload).await?)
    }

    /// Resume a simulation session with user input
    pub async fn simulate_resume(
        &self,
        id: &FlowId,
        session: Value,
        resume: Value,
    ) -> ServerResult<Value> {
        let flow = self.get_flow(id).await?;

        let definition = self.current_definition(&flow).await?;
        let is_voice = flow.flow_type == FlowType::Voice;

        let payload =
            flowline_engine::simulate::resume_payload(&session, &resume, &[definition], is_voice);

        Ok(self.engine.sim_resume(&payload).await?)
    }

    /// Return the flow's definition rewritten so `language` becomes its
    /// base language. Nothing is saved.
    pub async fn change_language(&self, id: &FlowId, language: &str) -> ServerResult<Value> {
        let flow = self.get_flow(id).await?;
        let workspace = self.get_workspace(flow.org).await?;

        if !workspace.has_language(language) {
            return Err(CoreError::ValidationError(format!(
                "{} is not a valid language for this workspace",
                language
            ))
            .into());
        }

        let definition = self.current_definition(&flow).await?;
        Ok(self.engine.flow_change_language(&definition, language).await?)
    }

    /// Export a PO catalog of the flow's translatable texts for a language
    pub async fn export_translation(&self, id: &FlowId, language: &str) -> ServerResult<String> {
        let flow = self.get_flow(id).await?;
        let definition = self.current_definition(&flow).await?;

        Ok(self
            .engine
            .po_export(flow.org, &[definition], language)
            .await?)
    }

    /// Import a PO catalog of translations, saving the result as a new
    /// revision.
    ///
    /// The catalog must declare a language which is configured for the
    /// workspace and is not the flow's own base language.
    pub async fn import_translation(
        &self,
        id: &FlowId,
        user: &str,
        catalog: &str,
    ) -> ServerResult<(Flow, FlowRevision)> {
        let mut flow = self.get_flow(id).await?;
        let workspace = self.get_workspace(flow.org).await?;

        let info = parse_info(catalog).map_err(ServerError::Engine)?;
        let language = info.language.ok_or_else(|| {
            CoreError::ValidationError("File does not declare a language".to_string())
        })?;

        if language == flow.base_language {
            return Err(CoreError::ValidationError(
                "Translations cannot be imported for the flow base language".to_string(),
            )
            .into());
        }
        if !workspace.has_language(&language) {
            return Err(CoreError::ValidationError(format!(
                "Workspace is not configured for the language {}",
                language
            ))
            .into());
        }

        let definition = self.current_definition(&flow).await?;
        let mut updated = self
            .engine
            .po_import(flow.org, &[definition], catalog, &language)
            .await?;
        let mut definition = updated
            .drain(..)
            .next()
            .ok_or_else(|| ServerError::InternalError("Engine returned no flows".to_string()))?;

        flow.revision += 1;
        flow.saved_by = user.to_string();
        flow.saved_on = Utc::now();

        if let Some(obj) = definition.as_object_mut() {
            obj.insert("revision".to_string(), json!(flow.revision));
        }

        let revision = FlowRevision::new(flow.id, flow.revision, flow.version, definition, user);
        self.stores.flows.save(&flow).await?;
        self.stores.revisions.create(&revision).await?;

        info!(flow = %flow.id, language = %language, "imported translations");
        Ok((flow, revision))
    }

    /// The activity chart and run totals for a flow
    pub async fn flow_activity(&self, id: &FlowId) -> ServerResult<(ActivityChart, RunTotals)> {
        let flow = self.get_flow(id).await?;
        let runs = self.stores.runs.list_for_flow(&flow.id).await?;

        let chart = ActivityChart::build(&runs);
        let totals = RunTotals::tally(&runs);
        Ok((chart, totals))
    }

    /// Category counts for each of the flow's declared results
    pub async fn result_counts(&self, id: &FlowId) -> ServerResult<Vec<ResultCategoryCounts>> {
        let flow = self.get_flow(id).await?;
        let runs = self.stores.runs.list_for_flow(&flow.id).await?;

        Ok(category_counts(&flow.metadata.results, &runs))
    }

    /// A page of the flow's runs, newest first
    pub async fn list_runs(&self, id: &FlowId, offset: usize) -> ServerResult<Vec<FlowRun>> {
        let flow = self.get_flow(id).await?;
        Ok(self
            .stores
            .runs
            .page_for_flow(&flow.id, offset, self.config.run_page_size)
            .await?)
    }

    /// Soft-delete a run, removing it from listings and aggregates
    pub async fn delete_run(&self, id: &RunId) -> ServerResult<()> {
        let mut run = self
            .stores
            .runs
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::NotFound("Run".to_string()))?;

        run.mark_deleted();
        self.stores.runs.save(&run).await?;
        Ok(())
    }

    /// The flow's latest definition, migrated to the current spec version.
    /// Flows with no revisions get an empty definition.
    async fn current_definition(&self, flow: &Flow) -> ServerResult<Value> {
        let latest = self.stores.revisions.list_for_flow(&flow.id, 1).await?;

        match latest.into_iter().next() {
            Some(revision) => Ok(revision.migrated_definition(&SpecVersion::current())?),
            None => Ok(json!({
                "uuid": flow.id.to_string(),
                "name": flow.name,
                "spec_version": SpecVersion::current().to_string(),
                "language": flow.base_language,
                "type": flow_type_as_def(flow.flow_type),
                "nodes": [],
            })),
        }
    }
}

/// The definition-level name of a flow type
fn flow_type_as_def(flow_type: FlowType) -> &'static str {
    match flow_type {
        FlowType::Message => "messaging",
        FlowType::Voice => "voice",
        FlowType::Survey => "messaging_offline",
        FlowType::Background => "messaging_background",
    }
}
