//! Domain model for the Flowline core
//!
//! Aggregates (flows, revisions, runs, starts, triggers, exports,
//! workspaces), the pure functions that encode their business rules, and
//! the repository traits that persist them.

pub mod export;
pub mod flow;
pub mod query;
pub mod repository;
pub mod revision;
pub mod run;
pub mod start;
pub mod trigger;
pub mod workspace;

pub use export::{ExportStatus, ResultsExport, MAX_CONTACT_FIELDS, MAX_GROUP_MEMBERSHIPS};
pub use flow::{Flow, FlowMetadata, FlowType, ResultSpec};
pub use query::ContactQuery;
pub use repository::{
    ExportRepository, FlowRepository, RevisionRepository, RunRepository, StartRepository,
    TriggerRepository, WorkspaceRepository,
};
pub use revision::{
    check_save_conflicts, is_listable, migrate_definition, FlowRevision, SpecVersion,
    CURRENT_SPEC_VERSION, FINAL_LEGACY_VERSION, INITIAL_MODERN_VERSION,
};
pub use run::{ExitType, FlowRun, ResultValue};
pub use start::{check_admission, FlowStart, Recipients, StartSnapshot, StartStatus};
pub use trigger::{
    clean_keyword, clean_keywords, reconcile, KeywordTrigger, TriggerChange, KEYWORD_MAX_LEN,
};
pub use workspace::Workspace;
