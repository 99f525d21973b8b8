//! # Flowline Core
//!
//! Domain model and business rules for managing messaging flows: flow and
//! revision lifecycles, start admission control, keyword trigger
//! reconciliation, contact-search queries and run aggregation.
//!
//! This crate is storage-agnostic. Persistence goes through the repository
//! traits in [`domain::repository`], with in-memory implementations
//! provided for the server wiring and tests.

pub mod domain;
pub mod error;
pub mod stats;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use types::{ContactId, ExportId, FlowId, GroupId, OrgId, RunId, StartId, TriggerId};
